//! Tollgate - In-Memory Request Rate Limiting
//!
//! This crate decides, for each request identified by a caller key, whether
//! it is allowed under a fixed-window quota, and reports how many requests
//! remain and when the window resets. The [`ratelimit`] module holds the
//! limiter itself; [`http`] wires it into axum as middleware.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
