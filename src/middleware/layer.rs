//! Tower layer and service wrapping the admission engine.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::request::Parts;
use http::{response, HeaderMap, HeaderValue, Request, Response, StatusCode};
use tower::{Layer, Service};
use tracing::{error, warn};

use crate::limiter::{Decision, Quota, RateLimiter};

use super::headers;
use super::realip::client_ip;

type KeyFn = Arc<dyn Fn(&Parts) -> String + Send + Sync>;
type GlobalFn = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;
type LimitReachedFn = Arc<dyn Fn(&Parts, &mut response::Parts) + Send + Sync>;

/// What to do with a request when the storage backend fails.
///
/// Never merged into the allow or deny outcomes: a backend failure is a
/// distinct, explicit service-error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Answer with 503 Service Unavailable without consulting the inner
    /// service.
    FailClosed,
    /// Forward the request unlimited, without quota headers.
    FailOpen,
}

struct Shared {
    limiter: Arc<RateLimiter>,
    key_fn: KeyFn,
    global_fn: GlobalFn,
    on_limit_reached: LimitReachedFn,
    failure_policy: FailurePolicy,
}

/// Layer that applies per-key admission control to an HTTP service.
///
/// Key extraction, the global-limit check, and the denial hook are
/// injected functions over the request head, defaulting to the client-IP
/// key, "always global", and a plain 429 respectively.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    key_fn: KeyFn,
    global_fn: GlobalFn,
    on_limit_reached: LimitReachedFn,
    failure_policy: FailurePolicy,
}

impl RateLimitLayer {
    /// Wrap requests with admission checks against `limiter`.
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            key_fn: Arc::new(client_ip),
            global_fn: Arc::new(|_| true),
            on_limit_reached: Arc::new(|_, head| {
                head.status = StatusCode::TOO_MANY_REQUESTS;
            }),
            failure_policy: FailurePolicy::FailClosed,
        }
    }

    /// Override how the per-caller key is derived from a request.
    pub fn key_fn(mut self, key_fn: impl Fn(&Parts) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Arc::new(key_fn);
        self
    }

    /// Override whether a request counts against the global quota rather
    /// than a route-scoped one.
    pub fn global_fn(mut self, global_fn: impl Fn(&Parts) -> bool + Send + Sync + 'static) -> Self {
        self.global_fn = Arc::new(global_fn);
        self
    }

    /// Override the denial hook. It runs after `Retry-After` and the quota
    /// headers are applied and is responsible for the response status.
    pub fn on_limit_reached(
        mut self,
        hook: impl Fn(&Parts, &mut response::Parts) + Send + Sync + 'static,
    ) -> Self {
        self.on_limit_reached = Arc::new(hook);
        self
    }

    /// Choose how requests are handled when the storage backend fails.
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            shared: Arc::new(Shared {
                limiter: self.limiter.clone(),
                key_fn: self.key_fn.clone(),
                global_fn: self.global_fn.clone(),
                on_limit_reached: self.on_limit_reached.clone(),
                failure_policy: self.failure_policy,
            }),
        }
    }
}

/// Service produced by [`RateLimitLayer`].
///
/// Denied requests are answered locally with a default body and never
/// reach the inner service; allowed requests are forwarded and the quota
/// headers of the decision appended to the response.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Default + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let shared = self.shared.clone();
        // Take the service that was polled ready, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let key = (shared.key_fn)(&parts);
            let global = (shared.global_fn)(&parts);

            match shared.limiter.check(&key, global).await {
                Ok(Decision::Allowed(quota)) => {
                    let request = Request::from_parts(parts, body);
                    let mut response = inner.call(request).await?;
                    apply_quota_headers(response.headers_mut(), &quota);
                    Ok(response)
                }
                Ok(Decision::Denied { quota, retry_after }) => {
                    let mut response = Response::new(ResBody::default());
                    apply_quota_headers(response.headers_mut(), &quota);
                    response.headers_mut().insert(
                        http::header::RETRY_AFTER,
                        HeaderValue::from(retry_after.as_millis() as u64),
                    );

                    let (mut head, body) = response.into_parts();
                    (shared.on_limit_reached)(&parts, &mut head);
                    Ok(Response::from_parts(head, body))
                }
                Err(err) => match shared.failure_policy {
                    FailurePolicy::FailOpen => {
                        warn!(key = %key, error = %err, "Storage failure, admitting request unlimited");
                        let request = Request::from_parts(parts, body);
                        inner.call(request).await
                    }
                    FailurePolicy::FailClosed => {
                        error!(key = %key, error = %err, "Storage failure, rejecting request");
                        let mut response = Response::new(ResBody::default());
                        *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
                        Ok(response)
                    }
                },
            }
        })
    }
}

fn apply_quota_headers(map: &mut HeaderMap, quota: &Quota) {
    map.insert(&headers::X_RATELIMIT_LIMIT, HeaderValue::from(quota.limit));
    map.insert(
        &headers::X_RATELIMIT_REMAINING,
        HeaderValue::from(quota.remaining),
    );
    map.insert(
        &headers::X_RATELIMIT_GLOBAL,
        HeaderValue::from_static(if quota.global { "true" } else { "false" }),
    );
    map.insert(
        &headers::X_RATELIMIT_RESET,
        HeaderValue::from(quota.reset_millis()),
    );
}
