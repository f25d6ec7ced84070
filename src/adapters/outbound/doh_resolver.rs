//! DNS-over-HTTPS Resolvers
//!
//! Implements Resolver for Cloudflare and Google using their
//! `application/dns-json` endpoints.

use crate::adapters::outbound::address_families::merge_families;
use crate::domain::errors::ResolveError;
use crate::domain::ports::Resolver;
use crate::domain::value_objects::{punycode, DnsStatus};
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

pub const CLOUDFLARE_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";
pub const GOOGLE_ENDPOINT: &str = "https://dns.google/resolve";

const DNS_JSON: &str = "application/dns-json";

/// Build the HTTP client shared by one provider's queries.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(3)))
        .tcp_keepalive(Duration::from_secs(60))
        .pool_max_idle_per_host(256)
        .build()
}

/// JSON body returned by a DoH provider.
#[derive(Debug, Deserialize)]
pub struct DnsJsonResponse {
    #[serde(rename = "Status")]
    pub status: DnsStatus,
    #[serde(rename = "TC", default)]
    pub truncated: bool,
    #[serde(rename = "Answer", default)]
    pub answer: Vec<DnsJsonAnswer>,
}

#[derive(Debug, Deserialize)]
pub struct DnsJsonAnswer {
    #[serde(rename = "type")]
    pub record_type: u16,
    pub data: String,
}

impl DnsJsonResponse {
    /// Answer data of the requested type only; CNAME hops are skipped.
    pub fn data_of(self, record_type: RecordType) -> Vec<String> {
        let code = u16::from(record_type);
        self.answer
            .into_iter()
            .filter(|a| a.record_type == code)
            .map(|a| a.data)
            .collect()
    }
}

/// Protocol client shared by the provider-specific resolvers.
struct DohClient {
    provider: &'static str,
    endpoint: String,
    http: reqwest::Client,
}

impl DohClient {
    fn new(provider: &'static str, endpoint: String, timeout: Duration) -> Result<Self, ResolveError> {
        let http = http_client(timeout).map_err(|e| ResolveError::transport(provider, e))?;
        Ok(Self {
            provider,
            endpoint,
            http,
        })
    }

    async fn query(
        &self,
        ctx: &BatchContext,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<String>, ResolveError> {
        let ascii = punycode(name)?;
        let type_name = record_type.to_string();

        tracing::debug!("{}: query {} {}", self.provider, ascii, type_name);

        let request = self
            .http
            .get(&self.endpoint)
            .query(&[("name", ascii.as_str()), ("type", type_name.as_str())])
            .header(ACCEPT, DNS_JSON);

        let response = ctx
            .run(request.send())
            .await
            .ok_or(ResolveError::Cancelled)?
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::transport(self.provider, e))?;

        let body: DnsJsonResponse = ctx
            .run(response.json())
            .await
            .ok_or(ResolveError::Cancelled)?
            .map_err(|e| ResolveError::Decode {
                provider: self.provider,
                message: e.to_string(),
            })?;

        if !body.status.is_success() {
            return Err(ResolveError::Upstream {
                provider: self.provider,
                status: body.status,
            });
        }

        if body.truncated {
            tracing::debug!(
                "{}: truncated {} answer for {}, using the partial answer",
                self.provider,
                type_name,
                ascii
            );
        }

        Ok(body.data_of(record_type))
    }

    async fn query_addresses(
        &self,
        ctx: &BatchContext,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let data = self.query(ctx, name, record_type).await?;
        Ok(data
            .iter()
            .filter_map(|d| match d.parse::<IpAddr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    tracing::debug!("{}: skipping non-address answer {:?}", self.provider, d);
                    None
                }
            })
            .collect())
    }

    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let (v4, v6) = tokio::join!(
            self.query_addresses(ctx, name, RecordType::A),
            self.query_addresses(ctx, name, RecordType::AAAA),
        );
        merge_families(name, v4, v6)
    }

    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
        self.query(ctx, name, RecordType::NS).await
    }
}

/// Cloudflare DoH resolver (`cloudflare-dns.com`).
pub struct CloudflareResolver {
    client: DohClient,
}

impl CloudflareResolver {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        Self::with_endpoint(CLOUDFLARE_ENDPOINT, timeout)
    }

    /// Point at a different endpoint speaking the same protocol.
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        Ok(Self {
            client: DohClient::new("cloudflare", endpoint.into(), timeout)?,
        })
    }
}

#[async_trait]
impl Resolver for CloudflareResolver {
    fn provider(&self) -> &'static str {
        self.client.provider
    }

    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.client.resolve_ip(ctx, name).await
    }

    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
        self.client.resolve_ns(ctx, name).await
    }
}

/// Google DoH resolver (`dns.google`).
pub struct GoogleResolver {
    client: DohClient,
}

impl GoogleResolver {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        Self::with_endpoint(GOOGLE_ENDPOINT, timeout)
    }

    /// Point at a different endpoint speaking the same protocol.
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ResolveError> {
        Ok(Self {
            client: DohClient::new("google", endpoint.into(), timeout)?,
        })
    }
}

#[async_trait]
impl Resolver for GoogleResolver {
    fn provider(&self) -> &'static str {
        self.client.provider
    }

    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        self.client.resolve_ip(ctx, name).await
    }

    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
        self.client.resolve_ns(ctx, name).await
    }
}
