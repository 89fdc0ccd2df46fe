//! Process configuration read from the environment

use std::net::SocketAddr;
use std::path::PathBuf;

use parley_core::RelayConfig;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "https://api.moonshot.cn/v1";
pub const DEFAULT_MODEL: &str = "moonshot-v1-32k";
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://parley.db?mode=rwc";
pub const DEFAULT_KNOWLEDGE_FILE: &str = "knowledge/personal_kb.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid socket address: {value}")]
    InvalidAddress { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub bind: SocketAddr,
    pub database_url: String,
    pub knowledge_file: PathBuf,
    pub max_concurrent_requests: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds settings from any variable source; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = get("PARLEY_API_KEY").ok_or(ConfigError::Missing("PARLEY_API_KEY"))?;

        let bind_value = get("PARLEY_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_value
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                name: "PARLEY_BIND",
                value: bind_value.clone(),
            })?;

        let max_concurrent_requests = match get("PARLEY_MAX_CONCURRENT_REQUESTS") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    warn!(
                        "Invalid PARLEY_MAX_CONCURRENT_REQUESTS '{}', using default {}",
                        raw,
                        RelayConfig::DEFAULT_MAX_CONCURRENT_REQUESTS
                    );
                    RelayConfig::DEFAULT_MAX_CONCURRENT_REQUESTS
                }
            },
            None => RelayConfig::DEFAULT_MAX_CONCURRENT_REQUESTS,
        };

        Ok(Self {
            api_key,
            api_base: get("PARLEY_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: get("PARLEY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            bind,
            database_url: get("PARLEY_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            knowledge_file: get("PARLEY_KNOWLEDGE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KNOWLEDGE_FILE)),
            max_concurrent_requests,
        })
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::new(&self.api_base, &self.api_key, &self.model)
            .with_max_concurrent_requests(self.max_concurrent_requests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[("PARLEY_API_KEY", "sk-1")])).unwrap();
        assert_eq!(settings.api_key, "sk-1");
        assert_eq!(settings.api_base, DEFAULT_API_BASE);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert_eq!(settings.bind, "127.0.0.1:8000".parse().unwrap());
        assert_eq!(settings.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(settings.knowledge_file, PathBuf::from(DEFAULT_KNOWLEDGE_FILE));
        assert_eq!(settings.max_concurrent_requests, 16);
    }

    #[test]
    fn test_missing_api_key() {
        assert_eq!(
            Settings::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::Missing("PARLEY_API_KEY")
        );
        assert_eq!(
            Settings::from_lookup(lookup(&[("PARLEY_API_KEY", "  ")])).unwrap_err(),
            ConfigError::Missing("PARLEY_API_KEY")
        );
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("PARLEY_API_KEY", "sk-2"),
            ("PARLEY_API_BASE", "http://localhost:9000/v1"),
            ("PARLEY_MODEL", "moonshot-v1-8k"),
            ("PARLEY_BIND", "0.0.0.0:9100"),
            ("PARLEY_DATABASE_URL", "sqlite::memory:"),
            ("PARLEY_KNOWLEDGE_FILE", "/tmp/kb.json"),
            ("PARLEY_MAX_CONCURRENT_REQUESTS", "4"),
        ]))
        .unwrap();
        assert_eq!(settings.api_base, "http://localhost:9000/v1");
        assert_eq!(settings.model, "moonshot-v1-8k");
        assert_eq!(settings.bind.port(), 9100);
        assert_eq!(settings.database_url, "sqlite::memory:");
        assert_eq!(settings.knowledge_file, PathBuf::from("/tmp/kb.json"));

        let relay = settings.relay_config();
        assert_eq!(relay.max_concurrent_requests, 4);
        assert_eq!(relay.completions_url(), "http://localhost:9000/v1/chat/completions");
    }

    #[test]
    fn test_bad_concurrency_falls_back() {
        for raw in ["many", "0", "-3"] {
            let settings = Settings::from_lookup(lookup(&[
                ("PARLEY_API_KEY", "sk"),
                ("PARLEY_MAX_CONCURRENT_REQUESTS", raw),
            ]))
            .unwrap();
            assert_eq!(settings.max_concurrent_requests, 16);
        }
    }

    #[test]
    fn test_bad_bind_address() {
        let err = Settings::from_lookup(lookup(&[
            ("PARLEY_API_KEY", "sk"),
            ("PARLEY_BIND", "localhost"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { .. }));
    }
}
