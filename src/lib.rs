//! Turnstile - Per-Key Request Admission Control
//!
//! This crate implements a rate-limiting middleware for tower-based HTTP
//! services. It tracks how many requests a caller (by default identified by
//! client IP) has made within a rolling time window, rejects requests once a
//! configured limit is exceeded, and tells the caller when the window resets.
//! Per-key state lives behind a pluggable storage abstraction with an
//! in-process implementation provided.

pub mod error;
pub mod limiter;
pub mod middleware;
pub mod state;
pub mod store;

pub use error::{Error, Result};
pub use limiter::{Decision, Quota, RateLimiter, RateLimiterBuilder};
pub use middleware::{FailurePolicy, PeerAddr, RateLimitLayer, RateLimitService};
pub use state::RateLimitState;
pub use store::{MemoryStore, StateStore};
