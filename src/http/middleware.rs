//! Rate limiting middleware for axum.

use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, trace, warn};

use super::key::CallerKey;
use crate::ratelimit::{LimitResult, Quota, RateLimiterBackend, RouteRules};

/// Configured `max_requests` for the matched quota.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the current window.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Seconds until the current window resets.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Shared state for one rate limiting middleware instance.
pub struct RateLimitState<B: RateLimiterBackend> {
    /// The rate limiter instance
    backend: Arc<B>,
    /// Quotas by route
    rules: Arc<RouteRules>,
    /// Take the caller IP from `X-Forwarded-For`
    trust_forwarded_for: bool,
}

impl<B: RateLimiterBackend> Clone for RateLimitState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            rules: Arc::clone(&self.rules),
            trust_forwarded_for: self.trust_forwarded_for,
        }
    }
}

impl<B: RateLimiterBackend> RateLimitState<B> {
    /// Create middleware state resolving quotas from route rules.
    pub fn new(backend: Arc<B>, rules: RouteRules) -> Self {
        Self {
            backend,
            rules: Arc::new(rules),
            trust_forwarded_for: false,
        }
    }

    /// Create middleware state applying one quota to every request.
    pub fn fixed(backend: Arc<B>, quota: Quota) -> Self {
        Self::new(backend, RouteRules::new(quota))
    }

    /// Trust `X-Forwarded-For` for caller IPs.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RateLimitedBody {
    error: &'static str,
    message: String,
    reset_in: u64,
}

/// Body of a 500 response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

/// Axum middleware enforcing the rate limit.
///
/// Install with `axum::middleware::from_fn_with_state(state, rate_limit::<B>)`.
/// Allowed requests reach the inner service and get `X-RateLimit-*` headers
/// on their response; denied requests are answered with 429 here.
pub async fn rate_limit<B: RateLimiterBackend + 'static>(
    State(state): State<RateLimitState<B>>,
    req: Request,
    next: Next,
) -> Response {
    let caller = CallerKey::from_request(&req, state.trust_forwarded_for);
    let policy = state.rules.resolve(req.uri().path());
    let key = policy.key_for(&caller.to_string_key());

    let result = match state.backend.check(&key, &policy.quota) {
        Ok(result) => result,
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "Internal Server Error",
                    message: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    trace!(
        key = %key,
        allowed = result.allowed,
        remaining = result.remaining,
        reset_in = result.reset_in,
        "Rate limit decision made"
    );

    let mut response = if result.allowed {
        next.run(req).await
    } else {
        warn!(
            key = %key,
            path = %req.uri().path(),
            reset_in = result.reset_in,
            "Rate limit exceeded"
        );
        too_many_requests(&result)
    };

    insert_headers(response.headers_mut(), &policy.quota, &result);
    response
}

fn too_many_requests(result: &LimitResult) -> Response {
    let body = RateLimitedBody {
        error: "Too Many Requests",
        message: format!(
            "Rate limit exceeded. Try again in {} seconds.",
            result.reset_in
        ),
        reset_in: result.reset_in,
    };
    (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
}

fn insert_headers(headers: &mut HeaderMap, quota: &Quota, result: &LimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(quota.max_requests()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_in));
}
