//! Adapters
//!
//! `inbound` renders results for the caller; `outbound` implements the
//! domain ports against DNS, HTTP services and the cache backends.

pub mod inbound;
pub mod outbound;
