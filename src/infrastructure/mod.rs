//! Infrastructure Layer
//!
//! Cross-cutting concurrency primitives shared by the application and adapters.

pub mod cancellation;
pub mod ticket_pool;

pub use cancellation::BatchContext;
pub use ticket_pool::{clamp_workers, Ticket, TicketPool};
