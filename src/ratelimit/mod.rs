//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod limiter;
mod quota;
mod rules;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use counter::{LimitResult, WindowState};
pub use limiter::{RateLimiter, DEFAULT_IDLE_THRESHOLD};
pub use quota::{Quota, DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECONDS};
pub use rules::{Policy, RouteRule, RouteRules};
pub use sweeper::Sweeper;
