//! Runtime settings for the ociauth server, read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `OCIAUTH_HTTP_ADDR` | `0.0.0.0:8200` |
//! | `OCIAUTH_DATA_DIR` | unset (in-memory storage) |
//! | `OCIAUTH_REGION` | `us-ashburn-1` |
//! | `OCI_SDK_AUTH_CLIENT_REGION_URL` | unset (derive host from region) |
//! | `OCIAUTH_IDENTITY_TIMEOUT_MS` | `10000` |
//! | `OCIAUTH_DEFAULT_LEASE_TTL_SECS` | `86400` |
//! | `OCIAUTH_MAX_LEASE_TTL_SECS` | `172800` |

use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::SystemTtls;

pub const ENV_HTTP_ADDR: &str = "OCIAUTH_HTTP_ADDR";
pub const ENV_DATA_DIR: &str = "OCIAUTH_DATA_DIR";
pub const ENV_REGION: &str = "OCIAUTH_REGION";
pub const ENV_IDENTITY_URL: &str = "OCI_SDK_AUTH_CLIENT_REGION_URL";
pub const ENV_IDENTITY_TIMEOUT_MS: &str = "OCIAUTH_IDENTITY_TIMEOUT_MS";
pub const ENV_DEFAULT_LEASE_TTL: &str = "OCIAUTH_DEFAULT_LEASE_TTL_SECS";
pub const ENV_MAX_LEASE_TTL: &str = "OCIAUTH_MAX_LEASE_TTL_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}: {}", self.field, self.message) }
}

#[derive(Debug, Error)]
#[error("invalid settings: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
pub struct SettingsError(pub Vec<FieldError>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub http_addr: String,
    #[serde(default)]
    pub data_dir: Option<String>,
    pub region: String,
    /// Replaces the region-derived identity service host, for custom routing.
    #[serde(default)]
    pub identity_url_override: Option<String>,
    pub identity_timeout_ms: u64,
    pub default_lease_ttl_secs: u64,
    pub max_lease_ttl_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8200".to_string(),
            data_dir: None,
            region: "us-ashburn-1".to_string(),
            identity_url_override: None,
            identity_timeout_ms: 10_000,
            default_lease_ttl_secs: 24 * 3600,
            max_lease_ttl_secs: 48 * 3600,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build settings from any variable source, then validate. Unparseable numbers and
    /// failed checks are all reported together.
    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, SettingsError> {
        let mut s = Settings::default();
        let mut errors: Vec<FieldError> = Vec::new();
        let non_blank = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = non_blank(ENV_HTTP_ADDR) { s.http_addr = v; }
        s.data_dir = non_blank(ENV_DATA_DIR);
        if let Some(v) = non_blank(ENV_REGION) { s.region = v; }
        s.identity_url_override = non_blank(ENV_IDENTITY_URL);

        let mut num = |key: &'static str, field: &'static str, slot: &mut u64| {
            if let Some(v) = non_blank(key) {
                match v.parse::<u64>() {
                    Ok(n) => *slot = n,
                    Err(_) => errors.push(FieldError { field, message: format!("'{}' is not a non-negative integer", v) }),
                }
            }
        };
        num(ENV_IDENTITY_TIMEOUT_MS, "identity_timeout_ms", &mut s.identity_timeout_ms);
        num(ENV_DEFAULT_LEASE_TTL, "default_lease_ttl_secs", &mut s.default_lease_ttl_secs);
        num(ENV_MAX_LEASE_TTL, "max_lease_ttl_secs", &mut s.max_lease_ttl_secs);

        errors.extend(s.validate());
        if errors.is_empty() { Ok(s) } else { Err(SettingsError(errors)) }
    }

    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.http_addr.parse::<SocketAddr>().is_err() {
            errors.push(FieldError { field: "http_addr", message: format!("'{}' is not a socket address", self.http_addr) });
        }
        if self.region.trim().is_empty() || !self.region.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            errors.push(FieldError { field: "region", message: format!("'{}' is not a region identifier", self.region) });
        }
        if let Some(u) = &self.identity_url_override {
            match reqwest::Url::parse(u) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                _ => errors.push(FieldError { field: "identity_url_override", message: format!("'{}' is not an http(s) url", u) }),
            }
        }
        if self.identity_timeout_ms == 0 {
            errors.push(FieldError { field: "identity_timeout_ms", message: "must be greater than zero".into() });
        }
        if self.default_lease_ttl_secs == 0 {
            errors.push(FieldError { field: "default_lease_ttl_secs", message: "must be greater than zero".into() });
        }
        if self.max_lease_ttl_secs < self.default_lease_ttl_secs {
            errors.push(FieldError { field: "max_lease_ttl_secs", message: "must not be less than default_lease_ttl_secs".into() });
        }
        errors
    }

    pub fn identity_host(&self) -> String {
        self.identity_url_override.clone().unwrap_or_else(|| crate::identity::client::region_host(&self.region))
    }

    pub fn identity_timeout(&self) -> Duration { Duration::from_millis(self.identity_timeout_ms) }

    pub fn system_ttls(&self) -> SystemTtls {
        SystemTtls {
            default_ttl: Duration::from_secs(self.default_lease_ttl_secs),
            max_ttl: Duration::from_secs(self.max_lease_ttl_secs),
        }
    }
}
