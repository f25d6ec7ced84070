//! Outbound Adapters
//!
//! Implementations of the domain ports: resolvers, the geolocation
//! resumer and the cache backends.

mod address_families;
mod doh_resolver;
mod ip_api_resumer;
mod local_resolver;
mod lsm_ip_storage;
mod remote_resolver;
mod sqlite_ip_storage;

pub use doh_resolver::{CloudflareResolver, GoogleResolver, CLOUDFLARE_ENDPOINT, GOOGLE_ENDPOINT};
pub use ip_api_resumer::{IpApiResumer, DEFAULT_BASE_URL};
pub use local_resolver::LocalResolver;
pub use lsm_ip_storage::LsmIpStorage;
pub use remote_resolver::RemoteResolver;
pub use sqlite_ip_storage::SqliteIpStorage;
