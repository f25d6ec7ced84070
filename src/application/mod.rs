//! Application Layer
//!
//! Use cases composed from domain ports.

mod resolve_service;

pub use resolve_service::ResolveService;
