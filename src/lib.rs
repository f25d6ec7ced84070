//! seeip Library
//!
//! Resolves host names to addresses and name servers, enriches the
//! addresses with geolocation metadata and correlates the two.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::ResolveService;
pub use config::{load_config, Args, CacheKind, Config};
pub use domain::entities::{GeoRecord, Report, ResolutionResult, ResumeAboutIP};
pub use domain::errors::{BatchError, ResolveError, ResumeError, StorageError};
pub use domain::ports::{IpInfoStorage, Resolver, Resumer};
pub use domain::services::correlate;
pub use domain::value_objects::ResolverKind;
pub use infrastructure::BatchContext;
