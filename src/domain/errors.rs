//! Domain Errors
//!
//! Typed failures for each port. Per-name and per-IP failures are rendered
//! into strings on the results; only `BatchError` ever aborts a batch.

use crate::domain::value_objects::DnsStatus;
use thiserror::Error;

/// Failure of a single resolver call.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Network, HTTP or DNS exchange failure
    #[error("{provider}: transport error: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// The upstream answered with a non-NOERROR status
    #[error("{provider}: {status}")]
    Upstream {
        provider: &'static str,
        status: DnsStatus,
    },

    /// Neither address family produced an address
    #[error("no addresses found for {name}")]
    NoAddresses { name: String },

    /// The name could not be converted to its ASCII form
    #[error("invalid domain name {name:?}: {message}")]
    Punycode { name: String, message: String },

    /// The response body did not have the expected shape
    #[error("{provider}: malformed response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("invalid DNS server address {0:?}")]
    InvalidServer(String),

    #[error("cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn transport(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            provider,
            message: err.to_string(),
        }
    }
}

/// Failure of a geolocation fetch.
#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("failed to get info about ({ip}): {source}")]
    Transport {
        ip: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to decode response for ({ip}): {message}")]
    Decode { ip: String, message: String },

    /// The service reported a logical failure (private range, quota, ...)
    #[error("ip information error: {0}")]
    Upstream(String),

    #[error("cancelled")]
    Cancelled,
}

/// Failure of a cache backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("lsm store: {0}")]
    Lsm(#[from] fjall::Error),

    #[error("payload codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("cancelled")]
    Cancelled,
}

/// Batch-level structural failure; no work is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("no names to resolve")]
    EmptyInput,

    #[error("batch cancelled before dispatch")]
    Cancelled,
}
