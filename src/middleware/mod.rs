//! Tower middleware surface for the admission engine.
//!
//! [`RateLimitLayer`] wraps any `tower::Service` over `http` request and
//! response types. Each inbound request is checked against a shared
//! [`crate::RateLimiter`] before the inner service runs; denied requests
//! are answered locally and never reach it.

mod layer;
mod realip;

pub use layer::{FailurePolicy, RateLimitLayer, RateLimitService};
pub use realip::{client_ip, PeerAddr};

/// Response header names set by the middleware.
pub mod headers {
    use http::HeaderName;

    /// Configured limit for the window.
    pub static X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
    /// Requests remaining in the window after this request's decrement.
    pub static X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
    /// `"true"` when the quota is global rather than route-scoped.
    pub static X_RATELIMIT_GLOBAL: HeaderName = HeaderName::from_static("x-ratelimit-global");
    /// Window reset time, milliseconds since the Unix epoch.
    pub static X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
}
