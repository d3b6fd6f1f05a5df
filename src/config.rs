//! Runtime configuration, read from the environment.

use std::time::Duration;

use crate::client::{Credentials, Endpoints};

pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{name}: {message}")]
    Invalid { name: &'static str, message: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// `classic.myvoltalis.com` form login, `rememberMe` cookie.
    #[default]
    Cookie,
    /// `api.myvoltalis.com` JSON login, bearer token.
    Bearer,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub auth_scheme: AuthScheme,
    pub http_timeout: Duration,
    pub endpoints: Endpoints,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let credentials = Credentials {
            username: required("VOLTALIS_USERNAME")?,
            password: required("VOLTALIS_PASSWORD")?,
        };

        let auth_scheme = match get("VOLTALIS_AUTH_SCHEME").as_deref() {
            None => AuthScheme::default(),
            Some(s) if s.eq_ignore_ascii_case("cookie") => AuthScheme::Cookie,
            Some(s) if s.eq_ignore_ascii_case("bearer") => AuthScheme::Bearer,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "VOLTALIS_AUTH_SCHEME",
                    message: format!("expected `cookie` or `bearer`, got `{}`", other),
                });
            }
        };

        let timeout_secs = match get("VOLTALIS_HTTP_TIMEOUT_SECS") {
            None => DEFAULT_HTTP_TIMEOUT_SECS,
            Some(s) => match s.parse::<u64>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "VOLTALIS_HTTP_TIMEOUT_SECS",
                        message: format!("expected a positive number of seconds, got `{}`", s),
                    });
                }
            },
        };

        let defaults = Endpoints::default();
        let url = |name: &str, fallback: String| {
            get(name)
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(fallback)
        };
        let endpoints = Endpoints {
            login_url: url("VOLTALIS_LOGIN_URL", defaults.login_url),
            base_url: url("VOLTALIS_BASE_URL", defaults.base_url),
            api_url: url("VOLTALIS_API_URL", defaults.api_url),
        };

        Ok(Config {
            credentials,
            auth_scheme,
            http_timeout: Duration::from_secs(timeout_secs),
            endpoints,
        })
    }
}
