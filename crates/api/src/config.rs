//! Application configuration loaded from environment variables.

use std::time::Duration;

use provisioning::HttpClientConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `CONTROL_PLANE_URL`: base URL of the storage appliance; unset means the
///   in-memory control plane is used
/// - `CONTROL_PLANE_API_KEY`: bearer token sent with every request
/// - `CONTROL_PLANE_TIMEOUT_SECS`: per-request timeout (default: `30`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub control_plane_url: Option<String>,
    pub control_plane_api_key: Option<String>,
    pub control_plane_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            control_plane_url: non_empty_var("CONTROL_PLANE_URL"),
            control_plane_api_key: non_empty_var("CONTROL_PLANE_API_KEY"),
            control_plane_timeout: std::env::var("CONTROL_PLANE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// HTTP client settings, or `None` when no control plane URL is configured.
    pub fn client_config(&self) -> Option<HttpClientConfig> {
        let url = self.control_plane_url.as_ref()?;
        let mut config = HttpClientConfig::new(url.clone()).with_timeout(self.control_plane_timeout);
        if let Some(key) = &self.control_plane_api_key {
            config = config.with_api_key(key.clone());
        }
        Some(config)
    }
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            control_plane_url: None,
            control_plane_api_key: None,
            control_plane_timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.control_plane_url.is_none());
        assert_eq!(config.control_plane_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_no_client_config_without_url() {
        assert!(Config::default().client_config().is_none());
    }

    #[test]
    fn test_client_config_carries_key_and_timeout() {
        let config = Config {
            control_plane_url: Some("https://nas.local".to_string()),
            control_plane_api_key: Some("secret".to_string()),
            control_plane_timeout: Duration::from_secs(5),
            ..Config::default()
        };

        let client = config.client_config().unwrap();
        assert_eq!(client.base_url, "https://nas.local");
        assert_eq!(client.api_key.as_deref(), Some("secret"));
        assert_eq!(client.timeout, Duration::from_secs(5));
    }
}
