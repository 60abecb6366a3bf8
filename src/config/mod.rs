//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// SQLite file backing the history API
    pub database_path: PathBuf,
    /// Directory for the per-player local history files
    pub history_dir: PathBuf,
    /// Base URL of the remote history store; unset disables relaying
    pub remote_history_url: Option<String>,

    /// Browser client assets served at `/`
    pub static_dir: Option<PathBuf>,
    /// Allowed client origins for CORS (comma separated), any origin when unset
    pub client_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            log_level: "info".to_string(),
            database_path: PathBuf::from("data/aimtrainer.db"),
            history_dir: PathBuf::from("data/history"),
            remote_history_url: None,
            static_dir: None,
            client_origin: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (non_empty("PORT"), non_empty("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port.trim())
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.trim().parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        let remote_history_url = non_empty("REMOTE_HISTORY_URL").map(|url| url.trim().to_string());
        if let Some(url) = &remote_history_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid("REMOTE_HISTORY_URL"));
            }
        }

        Ok(Self {
            server_addr,
            log_level: non_empty("LOG_LEVEL").unwrap_or(defaults.log_level),
            database_path: non_empty("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            history_dir: non_empty("HISTORY_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.history_dir),
            remote_history_url,
            static_dir: non_empty("STATIC_DIR").map(PathBuf::from),
            client_origin: non_empty("CLIENT_ORIGIN"),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
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
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr.port(), 8000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_path, PathBuf::from("data/aimtrainer.db"));
        assert!(config.remote_history_url.is_none());
        assert!(config.client_origin.is_none());
    }

    #[test]
    fn test_port_wins_over_server_addr() {
        let config = load(&[("PORT", "9100"), ("SERVER_ADDR", "127.0.0.1:7000")]).unwrap();
        assert_eq!(config.server_addr.port(), 9100);

        let config = load(&[("SERVER_ADDR", "127.0.0.1:7000")]).unwrap();
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:7000");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(load(&[("PORT", "abc")]), Err(ConfigError::InvalidAddress)));
        assert!(matches!(
            load(&[("REMOTE_HISTORY_URL", "ftp://example.com")]),
            Err(ConfigError::Invalid("REMOTE_HISTORY_URL"))
        ));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = load(&[("STATIC_DIR", ""), ("REMOTE_HISTORY_URL", "  ")]).unwrap();
        assert!(config.static_dir.is_none());
        assert!(config.remote_history_url.is_none());
    }
}
