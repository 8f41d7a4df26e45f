//! Token-bucket rate limiting
//!
//! # Modules
//!
//! - [`bucket`]: Token bucket with reservations and cancellable waits
//! - [`limiter`]: Global LLM bucket and per-host HTTP buckets
//! - [`error`]: Rate limit errors

pub mod bucket;
pub mod error;
pub mod limiter;

pub use bucket::{Reservation, TokenBucket};
pub use error::RateLimitError;
pub use limiter::{RateLimiter, host_of};
