//! Address family merging shared by resolvers that query A and AAAA separately.

use crate::domain::errors::ResolveError;
use std::collections::HashSet;
use std::net::IpAddr;

/// Drop repeated addresses, keeping first-seen order.
pub(crate) fn dedup_addresses(addrs: impl IntoIterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    addrs.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

/// Merge the A and AAAA outcomes of one name.
///
/// One family failing is fine. The call fails only when no family produced
/// an address: the A error wins when both failed.
pub(crate) fn merge_families(
    name: &str,
    v4: Result<Vec<IpAddr>, ResolveError>,
    v6: Result<Vec<IpAddr>, ResolveError>,
) -> Result<Vec<IpAddr>, ResolveError> {
    match (v4, v6) {
        (Err(e4), Err(e6)) => {
            tracing::debug!("{}: A failed ({}), AAAA failed ({})", name, e4, e6);
            Err(e4)
        }
        (v4, v6) => {
            if let Err(e) = &v4 {
                tracing::debug!("{}: A lookup failed: {}", name, e);
            }
            if let Err(e) = &v6 {
                tracing::debug!("{}: AAAA lookup failed: {}", name, e);
            }
            let ips = dedup_addresses(
                v4.unwrap_or_default()
                    .into_iter()
                    .chain(v6.unwrap_or_default()),
            );
            if ips.is_empty() {
                return Err(ResolveError::NoAddresses {
                    name: name.to_string(),
                });
            }
            Ok(ips)
        }
    }
}
