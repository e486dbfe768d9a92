//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use agora_shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `AGORA_HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `AGORA_DB_PATH`
    /// Default: `None`, the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Page size when a history request names no limit.
    /// Env: `AGORA_PAGE_SIZE`
    /// Default: `10`
    pub page_size: u32,

    /// Largest `limit` a history request may ask for.
    /// Env: `AGORA_MAX_PAGE_SIZE`
    /// Default: `100`
    pub max_page_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("AGORA_HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid AGORA_HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("AGORA_DB_PATH") {
            if !path.trim().is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("AGORA_MAX_PAGE_SIZE") {
            match parse_page_size(&val, MAX_PAGE_SIZE) {
                Some(n) => config.max_page_size = n,
                None => tracing::warn!(value = %val, "Invalid AGORA_MAX_PAGE_SIZE, using default"),
            }
        }

        if let Some(val) = lookup("AGORA_PAGE_SIZE") {
            match parse_page_size(&val, config.max_page_size) {
                Some(n) => config.page_size = n,
                None => tracing::warn!(value = %val, "Invalid AGORA_PAGE_SIZE, using default"),
            }
        }
        config.page_size = config.page_size.min(config.max_page_size);

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// The `limit` to use for a history request.
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.page_size)
            .clamp(1, self.max_page_size)
    }
}

/// A page size in `1..=max`.
fn parse_page_size(raw: &str, max: u32) -> Option<u32> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .filter(|n| (1..=max).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]);
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.page_size, 10);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("AGORA_HTTP_ADDR", "127.0.0.1:9000"),
            ("AGORA_DB_PATH", "/tmp/agora.db"),
            ("AGORA_PAGE_SIZE", "25"),
            ("AGORA_MAX_PAGE_SIZE", "50"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/agora.db")));
        assert_eq!(config.page_size, 25);
        assert_eq!(config.max_page_size, 50);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("AGORA_HTTP_ADDR", "not an address"),
            ("AGORA_PAGE_SIZE", "0"),
            ("AGORA_MAX_PAGE_SIZE", "100000"),
        ]);
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_page_limit_is_clamped() {
        let config = load(&[("AGORA_MAX_PAGE_SIZE", "20")]);
        assert_eq!(config.page_limit(None), 10);
        assert_eq!(config.page_limit(Some(0)), 1);
        assert_eq!(config.page_limit(Some(500)), 20);
    }
}
