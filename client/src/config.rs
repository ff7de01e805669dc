//! Configuration management for the sync agent.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tally_engine::{RetryPolicy, DEFAULT_MAX_RETRIES};

/// Sync agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the mutation API
    pub api_url: String,
    /// Directory holding the persisted queue, mirror and client id
    pub data_dir: PathBuf,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
    /// Attempts before a pending operation is abandoned
    pub max_retries: u32,
    /// Abandon 4xx rejections on the first attempt
    pub evict_client_errors: bool,
    /// Period of the online backstop sync
    pub sync_interval: Duration,
    /// Period of the connectivity probe
    pub probe_interval: Duration,
    /// Timeout for each HTTP request
    pub request_timeout: Duration,
}

impl Config {
    /// Defaults for everything except the API base URL.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            data_dir: PathBuf::from(".tally"),
            auth_token: None,
            max_retries: DEFAULT_MAX_RETRIES,
            evict_client_errors: false,
            sync_interval: Duration::from_secs(30),
            probe_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("TALLY_API_URL").unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
        reqwest::Url::parse(&api_url).map_err(|_| ConfigError::InvalidUrl(api_url.clone()))?;

        let mut config = Self::new(api_url);

        if let Some(dir) = lookup("TALLY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }

        config.auth_token = lookup("TALLY_AUTH_TOKEN").filter(|token| !token.trim().is_empty());

        if let Some(value) = lookup("TALLY_MAX_RETRIES") {
            config.max_retries = parse_number("TALLY_MAX_RETRIES", &value)?;
        }

        if let Some(value) = lookup("TALLY_EVICT_CLIENT_ERRORS") {
            config.evict_client_errors = parse_bool("TALLY_EVICT_CLIENT_ERRORS", &value)?;
        }

        if let Some(value) = lookup("TALLY_SYNC_INTERVAL_SECS") {
            config.sync_interval = parse_secs("TALLY_SYNC_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = lookup("TALLY_PROBE_INTERVAL_SECS") {
            config.probe_interval = parse_secs("TALLY_PROBE_INTERVAL_SECS", &value)?;
        }

        if let Some(value) = lookup("TALLY_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = parse_secs("TALLY_REQUEST_TIMEOUT_SECS", &value)?;
        }

        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            evict_on_client_error: self.evict_client_errors,
        }
    }
}

fn parse_number<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber { var })
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match parse_number::<u64>(var, value)? {
        0 => Err(ConfigError::InvalidNumber { var }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TALLY_API_URL value: {0}")]
    InvalidUrl(String),

    #[error("Invalid {var} value, expected a positive number")]
    InvalidNumber { var: &'static str },

    #[error("Invalid {var} value, expected true or false")]
    InvalidBool { var: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.api_url, "http://127.0.0.1:3000");
        assert_eq!(config.data_dir, PathBuf::from(".tally"));
        assert_eq!(config.auth_token, None);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.probe_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("TALLY_API_URL", "https://api.example.com/v1"),
            ("TALLY_DATA_DIR", "/var/lib/tally"),
            ("TALLY_AUTH_TOKEN", "secret"),
            ("TALLY_MAX_RETRIES", "5"),
            ("TALLY_EVICT_CLIENT_ERRORS", "true"),
            ("TALLY_SYNC_INTERVAL_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.api_url, "https://api.example.com/v1");
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/tally"));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(
            config.retry_policy(),
            RetryPolicy {
                max_retries: 5,
                evict_on_client_error: true
            }
        );
        assert_eq!(config.sync_interval, Duration::from_secs(60));
    }

    #[test]
    fn blank_token_is_ignored() {
        let config = load(&[("TALLY_AUTH_TOKEN", "  ")]).unwrap();
        assert_eq!(config.auth_token, None);
    }

    #[test]
    fn invalid_values() {
        assert!(matches!(
            load(&[("TALLY_API_URL", "not a url")]),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            load(&[("TALLY_MAX_RETRIES", "three")]),
            Err(ConfigError::InvalidNumber {
                var: "TALLY_MAX_RETRIES"
            })
        ));
        assert!(matches!(
            load(&[("TALLY_SYNC_INTERVAL_SECS", "0")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            load(&[("TALLY_EVICT_CLIENT_ERRORS", "maybe")]),
            Err(ConfigError::InvalidBool { .. })
        ));
    }
}
