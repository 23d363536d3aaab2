//! Per-route quota rules.
//!
//! Rules are matched against the request path by longest prefix, on `/`
//! segment boundaries. Requests that match no rule get the default quota.
//! Each matched rule counts its callers separately from every other rule.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use super::quota::Quota;
use crate::error::{Result, TollgateError};

/// A complete set of route rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRules {
    /// Quota applied when no route rule matches
    #[serde(default)]
    pub default: Quota,
    /// Route specific quotas
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

/// A quota bound to a path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Path prefix, starting with `/`
    pub path: String,
    /// Quota for requests under `path`
    #[serde(flatten)]
    pub quota: Quota,
    /// Optional name/description for this rule
    #[serde(default)]
    pub name: Option<String>,
}

/// The quota resolved for one request, and the scope its counters live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy<'a> {
    /// Quota to check against
    pub quota: Quota,
    /// Path of the matched rule, `None` for the default quota
    pub scope: Option<&'a str>,
}

impl Policy<'_> {
    /// Limiter key for `caller` under this policy.
    pub fn key_for(&self, caller: &str) -> String {
        match self.scope {
            Some(scope) => format!("{}|{}", scope, caller),
            None => caller.to_string(),
        }
    }
}

impl RouteRules {
    /// Rules that apply `default` everywhere.
    pub fn new(default: Quota) -> Self {
        Self {
            default,
            routes: Vec::new(),
        }
    }

    /// Add a rule for `path`.
    pub fn with_route(mut self, path: impl Into<String>, quota: Quota) -> Self {
        self.routes.push(RouteRule {
            path: path.into(),
            quota,
            name: None,
        });
        self
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading route rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: RouteRules = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse route rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Check that every path is absolute and appears once.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for rule in &self.routes {
            if !rule.path.starts_with('/') {
                return Err(TollgateError::InvalidConfiguration(format!(
                    "route path must start with '/': {:?}",
                    rule.path
                )));
            }
            if !seen.insert(normalize(&rule.path)) {
                return Err(TollgateError::InvalidConfiguration(format!(
                    "duplicate route path: {:?}",
                    rule.path
                )));
            }
        }
        Ok(())
    }

    /// Resolve the policy for a request path.
    pub fn resolve(&self, path: &str) -> Policy<'_> {
        self.routes
            .iter()
            .filter(|rule| matches_prefix(&rule.path, path))
            .max_by_key(|rule| normalize(&rule.path).len())
            .map(|rule| Policy {
                quota: rule.quota,
                scope: Some(rule.path.as_str()),
            })
            .unwrap_or(Policy {
                quota: self.default,
                scope: None,
            })
    }
}

fn normalize(path: &str) -> &str {
    path.trim_end_matches('/')
}

fn matches_prefix(rule: &str, path: &str) -> bool {
    match path.strip_prefix(normalize(rule)) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(max: u64, window: u64) -> Quota {
        Quota::new(max, window).unwrap()
    }

    #[test]
    fn test_parse_rules() {
        let yaml = r#"
default:
  max_requests: 100
  window_seconds: 60
routes:
  - path: /api/auth/login
    max_requests: 5
    window_seconds: 60
    name: login
  - path: /api/reports
    max_requests: 10
    window_seconds: 3600
"#;
        let rules = RouteRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.default, quota(100, 60));
        assert_eq!(rules.routes.len(), 2);
        assert_eq!(rules.routes[0].quota, quota(5, 60));
        assert_eq!(rules.routes[0].name.as_deref(), Some("login"));
        assert_eq!(rules.routes[1].quota, quota(10, 3600));
    }

    #[test]
    fn test_parse_defaults_when_omitted() {
        let rules = RouteRules::from_yaml("routes: []\n").unwrap();
        assert_eq!(rules.default, Quota::default());
    }

    #[test]
    fn test_parse_rejects_zero_quota() {
        let yaml = r#"
routes:
  - path: /api
    max_requests: 0
    window_seconds: 60
"#;
        assert!(RouteRules::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_paths() {
        let relative = RouteRules::default().with_route("api", quota(1, 1));
        assert!(relative.validate().is_err());

        let duplicate = RouteRules::default()
            .with_route("/api", quota(1, 1))
            .with_route("/api/", quota(2, 1));
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_resolve_longest_prefix() {
        let rules = RouteRules::new(quota(100, 60))
            .with_route("/api", quota(50, 60))
            .with_route("/api/auth/login", quota(5, 60));

        let login = rules.resolve("/api/auth/login");
        assert_eq!(login.quota, quota(5, 60));
        assert_eq!(login.scope, Some("/api/auth/login"));

        let other = rules.resolve("/api/users/1");
        assert_eq!(other.quota, quota(50, 60));
        assert_eq!(other.scope, Some("/api"));

        let fallback = rules.resolve("/health");
        assert_eq!(fallback.quota, quota(100, 60));
        assert_eq!(fallback.scope, None);
    }

    #[test]
    fn test_resolve_respects_segment_boundaries() {
        let rules = RouteRules::default().with_route("/api/auth", quota(5, 60));

        assert_eq!(rules.resolve("/api/auth").scope, Some("/api/auth"));
        assert_eq!(rules.resolve("/api/auth/").scope, Some("/api/auth"));
        assert_eq!(rules.resolve("/api/authz").scope, None);
    }

    #[test]
    fn test_policy_key_scoping() {
        let rules = RouteRules::default().with_route("/api/auth", quota(5, 60));

        assert_eq!(
            rules.resolve("/api/auth/login").key_for("ip:10.0.0.1"),
            "/api/auth|ip:10.0.0.1"
        );
        assert_eq!(rules.resolve("/other").key_for("user:42"), "user:42");
    }
}
