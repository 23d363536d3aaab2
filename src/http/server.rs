//! HTTP server implementation.

use axum::extract::Request;
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::key::AuthenticatedUser;
use super::middleware::{rate_limit, RateLimitState};
use crate::error::{Result, TollgateError};
use crate::ratelimit::{RateLimiterBackend, RouteRules};

/// HTTP server fronting the rate limiter.
///
/// `/health` is never limited; everything under `/api` passes through the
/// rate limiting middleware before reaching its handler.
pub struct HttpServer<R: RateLimiterBackend + 'static> {
    /// Address to bind to
    addr: SocketAddr,
    /// Middleware state shared by all limited routes
    state: RateLimitState<R>,
}

impl<R: RateLimiterBackend + 'static> HttpServer<R> {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, rate_limiter: Arc<R>, rules: RouteRules) -> Self {
        Self {
            addr,
            state: RateLimitState::new(rate_limiter, rules),
        }
    }

    /// Trust `X-Forwarded-For` for caller IPs.
    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.state = self.state.trust_forwarded_for(trust);
        self
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        let limited = Router::new()
            .route("/api/{*path}", any(echo))
            .route_layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                rate_limit::<R>,
            ));

        Router::new().route("/health", get(health)).merge(limited)
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serve on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let app = self.router();

        info!(
            addr = %listener.local_addr()?,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TollgateError::Io(e)
        })
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn echo(req: Request) -> Json<Value> {
    let user = req
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|AuthenticatedUser(id)| id.as_str());

    Json(json!({
        "method": req.method().as_str(),
        "path": req.uri().path(),
        "user": user,
    }))
}
