//! Caller key derivation.

use axum::extract::{ConnectInfo, Request};
use std::net::{IpAddr, SocketAddr};

/// Identity of an authenticated caller.
///
/// Inserted as a request extension by the authentication layer that runs
/// before rate limiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Header carrying the client chain when running behind a proxy.
const FORWARDED_FOR: &str = "x-forwarded-for";

/// A key that identifies the caller of a request.
///
/// Authenticated users are keyed by id, everyone else by remote address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerKey {
    /// Authenticated user id
    User(String),
    /// Remote IP address
    Ip(IpAddr),
    /// No identity could be derived
    Unknown,
}

impl CallerKey {
    /// Derive the caller key for a request.
    ///
    /// `X-Forwarded-For` is only consulted when `trust_forwarded_for` is set,
    /// since clients can send it directly.
    pub fn from_request(req: &Request, trust_forwarded_for: bool) -> Self {
        if let Some(AuthenticatedUser(id)) = req.extensions().get::<AuthenticatedUser>() {
            if !id.is_empty() {
                return CallerKey::User(id.clone());
            }
        }

        if trust_forwarded_for {
            if let Some(ip) = forwarded_ip(req) {
                return CallerKey::Ip(ip);
            }
        }

        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| CallerKey::Ip(addr.ip()))
            .unwrap_or(CallerKey::Unknown)
    }

    /// Convert the caller key to its limiter key representation.
    pub fn to_string_key(&self) -> String {
        match self {
            CallerKey::User(id) => format!("user:{}", id),
            CallerKey::Ip(ip) => format!("ip:{}", ip),
            CallerKey::Unknown => "ip:unknown".to_string(),
        }
    }
}

impl std::fmt::Display for CallerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

fn forwarded_ip(req: &Request) -> Option<IpAddr> {
    req.headers()
        .get(FORWARDED_FOR)?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 51000)))
    }

    #[test]
    fn test_authenticated_user_wins() {
        let req = http::Request::builder()
            .extension(AuthenticatedUser("42".to_string()))
            .extension(peer())
            .body(Body::empty())
            .unwrap();

        let key = CallerKey::from_request(&req, false);
        assert_eq!(key, CallerKey::User("42".to_string()));
        assert_eq!(key.to_string(), "user:42");
    }

    #[test]
    fn test_empty_user_falls_back_to_ip() {
        let req = http::Request::builder()
            .extension(AuthenticatedUser(String::new()))
            .extension(peer())
            .body(Body::empty())
            .unwrap();

        assert_eq!(CallerKey::from_request(&req, false).to_string(), "ip:10.0.0.7");
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let req = http::Request::builder()
            .header("X-Forwarded-For", "1.2.3.4, 10.0.0.1")
            .extension(peer())
            .body(Body::empty())
            .unwrap();

        assert_eq!(CallerKey::from_request(&req, true).to_string(), "ip:1.2.3.4");
        assert_eq!(CallerKey::from_request(&req, false).to_string(), "ip:10.0.0.7");
    }

    #[test]
    fn test_malformed_forwarded_for_ignored() {
        let req = http::Request::builder()
            .header("X-Forwarded-For", "not-an-ip")
            .extension(peer())
            .body(Body::empty())
            .unwrap();

        assert_eq!(CallerKey::from_request(&req, true).to_string(), "ip:10.0.0.7");
    }

    #[test]
    fn test_unknown_caller() {
        let req = http::Request::builder().body(Body::empty()).unwrap();
        let key = CallerKey::from_request(&req, true);
        assert_eq!(key, CallerKey::Unknown);
        assert_eq!(key.to_string_key(), "ip:unknown");
    }
}
