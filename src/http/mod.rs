//! HTTP boundary: caller key extraction, rate limiting middleware and server.

mod key;
mod middleware;
mod server;

pub use key::{AuthenticatedUser, CallerKey};
pub use middleware::{
    rate_limit, RateLimitState, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET,
};
pub use server::HttpServer;
