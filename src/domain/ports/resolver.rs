//! Resolver Port
//!
//! Defines the interface for turning a name into addresses and name servers.
//! Implementations may use the system resolver, a raw DNS server, or a
//! DNS-over-HTTPS provider.

use crate::domain::errors::ResolveError;
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use std::net::IpAddr;

/// Name resolution backend.
///
/// This is an outbound port. The orchestrator calls both methods
/// concurrently for every input name and never inspects which backend
/// is behind it.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn provider(&self) -> &'static str;

    /// Resolve IPv4 and IPv6 addresses.
    ///
    /// Succeeds when at least one address family yields an address.
    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError>;

    /// Resolve authoritative name servers.
    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError>;
}
