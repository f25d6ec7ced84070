mod ip_info_storage;
mod resolver;
mod resumer;

pub use ip_info_storage::{IpInfoStorage, DEFAULT_CACHE_TTL};
pub use resolver::Resolver;
pub use resumer::Resumer;
