//! Local Resolver
//!
//! Uses the operating system stub resolver for addresses and a
//! hickory-resolver built from the system configuration for name servers.

use crate::adapters::outbound::address_families::dedup_addresses;
use crate::domain::errors::ResolveError;
use crate::domain::ports::Resolver;
use crate::domain::value_objects::punycode;
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use std::net::IpAddr;
use std::time::Duration;

const PROVIDER: &str = "local";

/// System resolver.
pub struct LocalResolver {
    ns_resolver: TokioAsyncResolver,
}

impl LocalResolver {
    /// Build from `/etc/resolv.conf` (or the platform equivalent).
    ///
    /// Falls back to hickory's default upstreams when the system
    /// configuration cannot be read.
    pub fn new(timeout: Duration) -> Self {
        let ns_resolver = match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, mut opts)) => {
                opts.timeout = timeout;
                TokioAsyncResolver::tokio(config, opts)
            }
            Err(e) => {
                tracing::warn!("system resolver config unavailable ({}), using defaults", e);
                let mut opts = ResolverOpts::default();
                opts.timeout = timeout;
                TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
            }
        };
        Self { ns_resolver }
    }
}

#[async_trait]
impl Resolver for LocalResolver {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let ascii = punycode(name)?;
        tracing::debug!("{}: lookup_host {}", PROVIDER, ascii);

        let addrs = ctx
            .run(tokio::net::lookup_host((ascii.as_str(), 0u16)))
            .await
            .ok_or(ResolveError::Cancelled)?
            .map_err(|e| ResolveError::transport(PROVIDER, e))?;

        let ips = dedup_addresses(addrs.map(|addr| addr.ip()));
        if ips.is_empty() {
            return Err(ResolveError::NoAddresses { name: ascii });
        }
        Ok(ips)
    }

    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
        let ascii = punycode(name)?;
        tracing::debug!("{}: ns_lookup {}", PROVIDER, ascii);

        let lookup = ctx
            .run(self.ns_resolver.ns_lookup(format!("{}.", ascii.trim_end_matches('.'))))
            .await
            .ok_or(ResolveError::Cancelled)?
            .map_err(|e| ResolveError::transport(PROVIDER, e))?;

        Ok(lookup.iter().map(|ns| ns.0.to_ascii()).collect())
    }
}
