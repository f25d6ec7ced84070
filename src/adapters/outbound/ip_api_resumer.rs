//! ip-api.com Resumer
//!
//! Fetches geolocation and ISP metadata from the ip-api JSON endpoint.

use crate::domain::entities::GeoRecord;
use crate::domain::errors::ResumeError;
use crate::domain::ports::Resumer;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://ip-api.com";

/// Field mask selecting every field of `GeoRecord` plus `message`.
pub const FIELDS: u32 = 66846719;

/// Body as sent by ip-api: the record plus an error message on failure.
#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(flatten)]
    record: GeoRecord,
    #[serde(default)]
    message: Option<String>,
}

pub struct IpApiResumer {
    base_url: String,
    http: reqwest::Client,
}

impl IpApiResumer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(3)))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url_for(&self, ip: IpAddr) -> String {
        format!("{}/json/{}?fields={}", self.base_url, ip, FIELDS)
    }
}

#[async_trait]
impl Resumer for IpApiResumer {
    async fn resume_ip(&self, ip: IpAddr) -> Result<GeoRecord, ResumeError> {
        let url = self.url_for(ip);
        tracing::debug!("resume {}", url);

        let transport = |source: reqwest::Error| ResumeError::Transport {
            ip: ip.to_string(),
            source,
        };

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(transport)?;

        let body = response.text().await.map_err(transport)?;
        let decoded: IpApiResponse =
            serde_json::from_str(&body).map_err(|e| ResumeError::Decode {
                ip: ip.to_string(),
                message: e.to_string(),
            })?;

        if decoded.record.status == "fail" {
            let message = decoded
                .message
                .unwrap_or_else(|| "unknown failure".to_string());
            return Err(ResumeError::Upstream(message));
        }

        let mut record = decoded.record;
        record.fetched_at = Utc::now();
        Ok(record)
    }
}
