//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use crate::domain::errors::ResolveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

/// Default port for plain DNS servers.
pub const DNS_PORT: u16 = 53;

/// DNS response status (RCODE) as reported by an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DnsStatus(pub u16);

impl DnsStatus {
    pub const NOERROR: Self = Self(0);
    pub const FORMERR: Self = Self(1);
    pub const SERVFAIL: Self = Self(2);
    pub const NXDOMAIN: Self = Self(3);
    pub const NOTIMP: Self = Self(4);
    pub const REFUSED: Self = Self(5);

    pub fn is_success(self) -> bool {
        self == Self::NOERROR
    }
}

impl fmt::Display for DnsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NOERROR => write!(f, "DNS query completed successfully"),
            Self::FORMERR => write!(
                f,
                "DNS query error - there was a format error in the DNS query itself"
            ),
            Self::SERVFAIL => write!(
                f,
                "DNS query error - the DNS server encountered an internal error and failed to process the request"
            ),
            Self::NXDOMAIN => write!(
                f,
                "DNS query error - the requested domain name does not exist"
            ),
            Self::NOTIMP => write!(
                f,
                "DNS query error - the DNS server does not support this kind of query"
            ),
            Self::REFUSED => write!(f, "DNS query error - the DNS server refused to answer the query"),
            Self(code) => write!(f, "DNS query error - response code {code}"),
        }
    }
}

/// Which resolver backend a batch should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Operating system stub resolver
    Local,
    /// Cloudflare DNS-over-HTTPS
    Cloudflare,
    /// Google DNS-over-HTTPS
    Google,
    /// Explicit DNS server queried with the raw wire protocol
    Remote(SocketAddr),
}

impl FromStr for ResolverKind {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "local" | "system" => Ok(Self::Local),
            "cloudflare" => Ok(Self::Cloudflare),
            "google" => Ok(Self::Google),
            other => parse_server_addr(other).map(Self::Remote),
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloudflare => write!(f, "cloudflare"),
            Self::Google => write!(f, "google"),
            Self::Remote(addr) => write!(f, "{addr}"),
        }
    }
}

/// Parse `ip` or `ip:port` (`[v6]:port` for IPv6), defaulting to port 53.
pub fn parse_server_addr(s: &str) -> Result<SocketAddr, ResolveError> {
    let s = s.trim();
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, DNS_PORT))
        .map_err(|_| ResolveError::InvalidServer(s.to_string()))
}

/// How an input name should be treated before any resolver is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Matches the dotted-quad pattern; `None` when the octets are out of range
    Ipv4Literal(Option<Ipv4Addr>),
    /// A textual IPv6 address
    Ipv6Literal(Ipv6Addr),
    /// Anything else: needs resolving
    Host,
}

impl NameKind {
    pub fn classify(name: &str) -> Self {
        let name = name.trim();
        if is_ipv4_literal(name) {
            return Self::Ipv4Literal(name.parse().ok());
        }
        match name.parse::<Ipv6Addr>() {
            Ok(ip) => Self::Ipv6Literal(ip),
            Err(_) => Self::Host,
        }
    }
}

/// Textual dotted-quad check: four groups of one to three ASCII digits.
///
/// Octet ranges are not validated, so `999.999.999.999` matches.
pub fn is_ipv4_literal(s: &str) -> bool {
    let mut groups = 0;
    for group in s.trim().split('.') {
        groups += 1;
        if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    groups == 4
}

/// Convert a (possibly internationalized) domain name to its ASCII form.
///
/// Only IDNA processing is applied: numeric labels are kept verbatim, so
/// shorthand such as `127.1` is never rewritten into another address.
pub fn punycode(name: &str) -> Result<String, ResolveError> {
    let trimmed = name.trim();
    let invalid = |message: String| ResolveError::Punycode {
        name: trimmed.to_string(),
        message,
    };

    let ascii = idna::domain_to_ascii(trimmed).map_err(|e| invalid(e.to_string()))?;
    if let Some(c) = ascii
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(invalid(format!("forbidden character {c:?}")));
    }
    Ok(ascii)
}
