//! Runtime configuration, read from the environment (and `.env` if present).

use std::env;

/// Default port if not specified via environment variable.
pub const DEFAULT_PORT: u16 = 8000;

/// Default database path if not specified via environment variable.
pub const DEFAULT_DB_URL: &str = "sqlite:smartcampus.db?mode=rwc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// Shared secret for `POST /iot/ingest`. IoT ingestion is refused when unset.
    pub iot_api_key: Option<String>,
}

impl Config {
    /// Load from process environment, after merging a `.env` file if one exists.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("SMARTCAMPUS_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let database_url = lookup("SMARTCAMPUS_DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DB_URL.to_string());

        let iot_api_key = lookup("SMARTCAMPUS_IOT_API_KEY").filter(|key| !key.is_empty());

        Self {
            port,
            database_url,
            iot_api_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_url, DEFAULT_DB_URL);
        assert_eq!(config.iot_api_key, None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SMARTCAMPUS_PORT", "9100"),
            ("SMARTCAMPUS_DATABASE_URL", "sqlite::memory:"),
            ("SMARTCAMPUS_IOT_API_KEY", "s3cret"),
        ]);

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, 9100);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.iot_api_key.as_deref(), Some("s3cret"));
    }

    #[test]
    fn test_bad_port_and_empty_key_fall_back() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("SMARTCAMPUS_PORT", "http"), ("SMARTCAMPUS_IOT_API_KEY", "")]);

        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.iot_api_key, None);
    }
}
