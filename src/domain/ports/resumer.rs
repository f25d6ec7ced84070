//! Resumer Port
//!
//! Defines the interface for fetching geolocation/ISP metadata about an IP.

use crate::domain::entities::GeoRecord;
use crate::domain::errors::ResumeError;
use async_trait::async_trait;
use std::net::IpAddr;

/// Source of geolocation metadata.
///
/// Implementations stamp `fetched_at` on every successful record and turn
/// upstream logical failures into errors.
#[async_trait]
pub trait Resumer: Send + Sync {
    async fn resume_ip(&self, ip: IpAddr) -> Result<GeoRecord, ResumeError>;
}
