//! SQLite IP Info Storage
//!
//! Implements IpInfoStorage on an embedded SQLite database. One row per IP
//! in table `ip_data`; writes are upserts.

use crate::domain::entities::GeoRecord;
use crate::domain::errors::StorageError;
use crate::domain::ports::IpInfoStorage;
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Idle connections kept for reuse.
const MAX_IDLE_CONNECTIONS: usize = 8;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ip_data (
    ip             TEXT PRIMARY KEY,
    status         TEXT NOT NULL DEFAULT '',
    continent      TEXT NOT NULL DEFAULT '',
    continent_code TEXT NOT NULL DEFAULT '',
    country        TEXT NOT NULL DEFAULT '',
    country_code   TEXT NOT NULL DEFAULT '',
    region         TEXT NOT NULL DEFAULT '',
    region_name    TEXT NOT NULL DEFAULT '',
    city           TEXT NOT NULL DEFAULT '',
    district       TEXT NOT NULL DEFAULT '',
    zip            TEXT NOT NULL DEFAULT '',
    lat            REAL NOT NULL DEFAULT 0,
    lon            REAL NOT NULL DEFAULT 0,
    timezone       TEXT NOT NULL DEFAULT '',
    "offset"       INTEGER NOT NULL DEFAULT 0,
    currency       TEXT NOT NULL DEFAULT '',
    isp            TEXT NOT NULL DEFAULT '',
    org            TEXT NOT NULL DEFAULT '',
    as_field       TEXT NOT NULL DEFAULT '',
    asname         TEXT NOT NULL DEFAULT '',
    reverse        TEXT NOT NULL DEFAULT '',
    mobile         INTEGER NOT NULL DEFAULT 0,
    proxy          INTEGER NOT NULL DEFAULT 0,
    hosting        INTEGER NOT NULL DEFAULT 0,
    request_time   INTEGER NOT NULL
);
"#;

const SELECT_FRESH: &str = r#"
SELECT status, continent, continent_code, country, country_code, region,
       region_name, city, district, zip, lat, lon, timezone, "offset",
       currency, isp, org, as_field, asname, reverse, mobile, proxy, hosting,
       request_time
FROM ip_data
WHERE ip = ?1 AND request_time >= ?2
"#;

const UPSERT: &str = r#"
INSERT INTO ip_data (
    ip, status, continent, continent_code, country, country_code, region,
    region_name, city, district, zip, lat, lon, timezone, "offset", currency,
    isp, org, as_field, asname, reverse, mobile, proxy, hosting, request_time
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
          ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
ON CONFLICT(ip) DO UPDATE SET
    status = excluded.status,
    continent = excluded.continent,
    continent_code = excluded.continent_code,
    country = excluded.country,
    country_code = excluded.country_code,
    region = excluded.region,
    region_name = excluded.region_name,
    city = excluded.city,
    district = excluded.district,
    zip = excluded.zip,
    lat = excluded.lat,
    lon = excluded.lon,
    timezone = excluded.timezone,
    "offset" = excluded."offset",
    currency = excluded.currency,
    isp = excluded.isp,
    org = excluded.org,
    as_field = excluded.as_field,
    asname = excluded.asname,
    reverse = excluded.reverse,
    mobile = excluded.mobile,
    proxy = excluded.proxy,
    hosting = excluded.hosting,
    request_time = excluded.request_time
"#;

/// SQLite-backed cache of geolocation records.
///
/// Connections are checked out of a small pool for each operation and the
/// statement runs on the blocking thread pool.
pub struct SqliteIpStorage {
    path: PathBuf,
    ttl: Duration,
    idle: Arc<Mutex<Vec<Connection>>>,
}

impl SqliteIpStorage {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let conn = Self::connect(&path)?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch(SCHEMA)?;

        tracing::info!("sqlite cache ready at {} (ttl {:?})", path.display(), ttl);

        Ok(Self {
            path,
            ttl,
            idle: Arc::new(Mutex::new(vec![conn])),
        })
    }

    fn connect(path: &Path) -> rusqlite::Result<Connection> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Run `op` on a pooled connection inside `spawn_blocking`.
    async fn with_conn<T, F>(&self, ctx: &BatchContext, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if ctx.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let idle = self.idle.clone();
        let path = self.path.clone();
        let task = tokio::task::spawn_blocking(move || {
            let pooled = idle.lock().pop();
            let conn = match pooled {
                Some(conn) => conn,
                None => Self::connect(&path)?,
            };
            let out = op(&conn);
            let mut idle = idle.lock();
            if idle.len() < MAX_IDLE_CONNECTIONS {
                idle.push(conn);
            }
            out
        });

        let joined = ctx.run(task).await.ok_or(StorageError::Cancelled)?;
        Ok(joined??)
    }
}

fn to_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

fn row_to_record(row: &Row) -> rusqlite::Result<GeoRecord> {
    Ok(GeoRecord {
        status: row.get(0)?,
        continent: row.get(1)?,
        continent_code: row.get(2)?,
        country: row.get(3)?,
        country_code: row.get(4)?,
        region: row.get(5)?,
        region_name: row.get(6)?,
        city: row.get(7)?,
        district: row.get(8)?,
        zip: row.get(9)?,
        lat: row.get(10)?,
        lon: row.get(11)?,
        timezone: row.get(12)?,
        offset: row.get(13)?,
        currency: row.get(14)?,
        isp: row.get(15)?,
        org: row.get(16)?,
        asn: row.get(17)?,
        asname: row.get(18)?,
        reverse: row.get(19)?,
        mobile: row.get(20)?,
        proxy: row.get(21)?,
        hosting: row.get(22)?,
        fetched_at: Utc.timestamp_nanos(row.get(23)?),
    })
}

#[async_trait]
impl IpInfoStorage for SqliteIpStorage {
    async fn get(&self, ctx: &BatchContext, ip: IpAddr) -> Result<Option<GeoRecord>, StorageError> {
        let ttl_nanos = i64::try_from(self.ttl.as_nanos()).unwrap_or(i64::MAX);
        let cutoff = to_nanos(Utc::now()).saturating_sub(ttl_nanos);
        let key = ip.to_string();

        let found = self
            .with_conn(ctx, move |conn| {
                conn.prepare_cached(SELECT_FRESH)?
                    .query_row(params![key, cutoff], row_to_record)
                    .optional()
            })
            .await?;

        tracing::debug!("sqlite cache {} for {}", if found.is_some() { "hit" } else { "miss" }, ip);
        Ok(found)
    }

    async fn save(&self, ctx: &BatchContext, ip: IpAddr, record: &GeoRecord) -> Result<(), StorageError> {
        let key = ip.to_string();
        let r = record.clone();

        self.with_conn(ctx, move |conn| {
            conn.prepare_cached(UPSERT)?.execute(params![
                key,
                r.status,
                r.continent,
                r.continent_code,
                r.country,
                r.country_code,
                r.region,
                r.region_name,
                r.city,
                r.district,
                r.zip,
                r.lat,
                r.lon,
                r.timezone,
                r.offset,
                r.currency,
                r.isp,
                r.org,
                r.asn,
                r.asname,
                r.reverse,
                r.mobile,
                r.proxy,
                r.hosting,
                to_nanos(r.fetched_at),
            ])?;
            Ok(())
        })
        .await
    }
}
