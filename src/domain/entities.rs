//! Domain Entities - Core business objects
//!
//! These entities represent the resolution and enrichment results produced
//! by a lookup batch. They carry no I/O and only small pieces of logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;

/// Outcome of resolving a single input name.
///
/// Populated by two concurrent sub-tasks (addresses and name servers).
/// A failure of one sub-task never erases the output of the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Resolved IPv4/IPv6 addresses
    #[serde(rename = "ip", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpAddr>,
    /// Authoritative name servers
    #[serde(rename = "ns", default, skip_serializing_if = "Vec::is_empty")]
    pub name_servers: Vec<String>,
    /// Address resolution failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_error: Option<String>,
    /// Name server resolution failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns_error: Option<String>,
    /// Time from dispatch until both sub-tasks finished
    pub duration_ms: u64,
}

impl ResolutionResult {
    /// Result for an input that was already an address literal.
    pub fn literal(ip: IpAddr) -> Self {
        Self {
            ips: vec![ip],
            ..Self::default()
        }
    }

    /// Whether both sub-tasks failed.
    pub fn is_total_failure(&self) -> bool {
        self.ip_error.is_some() && self.ns_error.is_some()
    }
}

/// Geolocation and ISP metadata for one IP address.
///
/// Field names follow the upstream ip-api JSON schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GeoRecord {
    pub status: String,
    pub continent: String,
    pub continent_code: String,
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub region_name: String,
    pub city: String,
    pub district: String,
    pub zip: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
    /// UTC offset in seconds
    pub offset: i32,
    pub currency: String,
    pub isp: String,
    pub org: String,
    /// AS number and description, e.g. "AS15169 Google LLC"
    #[serde(rename = "as")]
    pub asn: String,
    pub asname: String,
    pub reverse: String,
    pub mobile: bool,
    pub proxy: bool,
    pub hosting: bool,
    /// When this record was fetched from the upstream service
    pub fetched_at: DateTime<Utc>,
}

impl GeoRecord {
    /// A record is stale once it is older than `ttl`.
    ///
    /// Timestamps in the future are treated as fresh.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age > ttl,
            Err(_) => false,
        }
    }

    /// Map service links pointing at this record's coordinates.
    pub fn map_links(&self) -> BTreeMap<String, String> {
        let (lat, lon) = (self.lat, self.lon);
        BTreeMap::from([
            (
                "google".to_string(),
                format!("https://www.google.com/maps?q={lat:.6},{lon:.6}"),
            ),
            (
                "osm".to_string(),
                format!(
                    "https://www.openstreetmap.org/?mlat={lat:.6}&mlon={lon:.6}#map=16/{lat:.6}/{lon:.6}"
                ),
            ),
            (
                "yandex".to_string(),
                format!("https://yandex.ru/maps/?ll={lon:.6}%2C{lat:.6}&z=16"),
            ),
            (
                "2gis".to_string(),
                format!("https://2gis.ru/?query={lat:.6},{lon:.6}"),
            ),
        ])
    }
}

/// Enrichment outcome for one distinct IP address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAboutIP {
    /// The address that was looked up
    pub request_ip: IpAddr,
    /// Metadata, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<GeoRecord>,
    /// Failure description, present on error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether the metadata came from the cache
    #[serde(default)]
    pub from_cache: bool,
    /// Optional map links built from the record's coordinates
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub map_links: BTreeMap<String, String>,
}

impl ResumeAboutIP {
    pub fn success(request_ip: IpAddr, resume: GeoRecord, from_cache: bool) -> Self {
        Self {
            request_ip,
            resume: Some(resume),
            error: None,
            from_cache,
            map_links: BTreeMap::new(),
        }
    }

    pub fn failure(request_ip: IpAddr, error: impl Into<String>) -> Self {
        Self {
            request_ip,
            resume: None,
            error: Some(error.into()),
            from_cache: false,
            map_links: BTreeMap::new(),
        }
    }

    /// Fill `map_links` from the record, if there is one.
    pub fn attach_map_links(&mut self) {
        if let Some(resume) = &self.resume {
            self.map_links = resume.map_links();
        }
    }
}

/// Final per-name view: resolution output plus the matching enrichments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Resolution time of the name, in milliseconds
    pub resolve_duration_ms: u64,
    /// Addresses the name resolved to
    #[serde(rename = "ip", default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<IpAddr>,
    /// Authoritative name servers of the name
    #[serde(rename = "ns", default, skip_serializing_if = "Vec::is_empty")]
    pub name_servers: Vec<String>,
    /// Address lookup failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_error: Option<String>,
    /// Name server lookup failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns_error: Option<String>,
    /// Enrichment results for the addresses in `ips`
    #[serde(default)]
    pub resumes: Vec<ResumeAboutIP>,
}
