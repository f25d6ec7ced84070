//! LSM IP Info Storage
//!
//! Implements IpInfoStorage on a fjall keyspace. Keys are the IP's string
//! form, values are the JSON-encoded record.

use crate::domain::entities::GeoRecord;
use crate::domain::errors::StorageError;
use crate::domain::ports::IpInfoStorage;
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use chrono::Utc;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

const PARTITION: &str = "ip_data";

pub struct LsmIpStorage {
    keyspace: Keyspace,
    records: PartitionHandle,
    ttl: Duration,
}

impl LsmIpStorage {
    /// Open (or create) the keyspace directory at `path`.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition(PARTITION, PartitionCreateOptions::default())?;

        tracing::info!("lsm cache ready at {} (ttl {:?})", path.display(), ttl);

        Ok(Self {
            keyspace,
            records,
            ttl,
        })
    }
}

#[async_trait]
impl IpInfoStorage for LsmIpStorage {
    async fn get(&self, ctx: &BatchContext, ip: IpAddr) -> Result<Option<GeoRecord>, StorageError> {
        if ctx.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let records = self.records.clone();
        let key = ip.to_string();
        let task = tokio::task::spawn_blocking(move || records.get(key));
        let value = ctx.run(task).await.ok_or(StorageError::Cancelled)???;

        let Some(bytes) = value else {
            tracing::debug!("lsm cache miss for {}", ip);
            return Ok(None);
        };

        let record: GeoRecord = serde_json::from_slice(&bytes)?;
        if record.is_stale(Utc::now(), self.ttl) {
            tracing::debug!("lsm cache entry for {} is stale", ip);
            return Ok(None);
        }

        tracing::debug!("lsm cache hit for {}", ip);
        Ok(Some(record))
    }

    async fn save(&self, ctx: &BatchContext, ip: IpAddr, record: &GeoRecord) -> Result<(), StorageError> {
        if ctx.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let value = serde_json::to_vec(record)?;
        let keyspace = self.keyspace.clone();
        let records = self.records.clone();
        let key = ip.to_string();
        let task = tokio::task::spawn_blocking(move || {
            records.insert(key, value)?;
            keyspace.persist(PersistMode::Buffer)
        });

        ctx.run(task).await.ok_or(StorageError::Cancelled)???;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(30 * 60);

    fn record(city: &str, minutes_ago: i64) -> GeoRecord {
        GeoRecord {
            status: "success".to_string(),
            country: "Germany".to_string(),
            country_code: "DE".to_string(),
            city: city.to_string(),
            lat: 50.1109,
            lon: 8.6821,
            offset: 7200,
            isp: "Hetzner Online GmbH".to_string(),
            mobile: false,
            fetched_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
            ..GeoRecord::default()
        }
    }

    fn ip() -> IpAddr {
        "2a01:4f8::1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let storage = LsmIpStorage::open(dir.path(), TTL).unwrap();
        let ctx = BatchContext::new();
        let saved = record("Frankfurt", 0);

        storage.save(&ctx, ip(), &saved).await.unwrap();

        assert_eq!(storage.get(&ctx, ip()).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = LsmIpStorage::open(dir.path(), TTL).unwrap();

        assert!(storage.get(&BatchContext::new(), ip()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_record_is_none() {
        let dir = TempDir::new().unwrap();
        let storage = LsmIpStorage::open(dir.path(), TTL).unwrap();
        let ctx = BatchContext::new();

        storage.save(&ctx, ip(), &record("Frankfurt", 31)).await.unwrap();

        assert!(storage.get(&ctx, ip()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = LsmIpStorage::open(dir.path(), TTL).unwrap();
        let ctx = BatchContext::new();

        storage.save(&ctx, ip(), &record("Frankfurt", 5)).await.unwrap();
        let newer = record("Nuremberg", 0);
        storage.save(&ctx, ip(), &newer).await.unwrap();

        assert_eq!(storage.get(&ctx, ip()).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_fast() {
        let dir = TempDir::new().unwrap();
        let storage = LsmIpStorage::open(dir.path(), TTL).unwrap();
        let ctx = BatchContext::new();
        ctx.cancel();

        assert!(matches!(
            storage.get(&ctx, ip()).await,
            Err(StorageError::Cancelled)
        ));
        assert!(matches!(
            storage.save(&ctx, ip(), &record("Frankfurt", 0)).await,
            Err(StorageError::Cancelled)
        ));
    }
}
