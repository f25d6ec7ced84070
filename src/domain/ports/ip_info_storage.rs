//! IP Info Storage Port
//!
//! Defines the TTL cache in front of the resumer.
//! Implementations may use SQLite or an LSM key-value store.

use crate::domain::entities::GeoRecord;
use crate::domain::errors::StorageError;
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;

/// Default age after which a cached record is considered stale.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Cache of geolocation records keyed by IP address.
///
/// Implementations must be safe to call from many tasks at once and do
/// their own synchronization.
#[async_trait]
pub trait IpInfoStorage: Send + Sync {
    /// Get a fresh record for `ip`.
    ///
    /// Missing and stale records both return `Ok(None)`.
    async fn get(&self, ctx: &BatchContext, ip: IpAddr) -> Result<Option<GeoRecord>, StorageError>;

    /// Insert or replace the record for `ip`.
    async fn save(&self, ctx: &BatchContext, ip: IpAddr, record: &GeoRecord) -> Result<(), StorageError>;
}
