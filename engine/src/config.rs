//! YAML configuration for the engine binary.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

fn default_probe_timeout_ms() -> u64 {
    2_000
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One read endpoint in the failover chain. Order in the file is probe
/// order.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
}

/// Configuration for the [`crate::SyncEngine`] and its transports.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    pub read_endpoints: Vec<EndpointConfig>,
    pub notifications_url: String,
    pub signer_url: String,
    /// Ordered stage identities; ordinal position is the stage index.
    pub stages: Vec<String>,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.read_endpoints.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one read endpoint is required".to_string(),
            ));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one stage is required".to_string(),
            ));
        }
        for endpoint in &self.read_endpoints {
            check_scheme(&endpoint.url, &["http", "https"])
                .map_err(|reason| {
                    ConfigError::Invalid(format!("read endpoint {}: {reason}", endpoint.name))
                })?;
        }
        check_scheme(&self.notifications_url, &["ws", "wss"])
            .map_err(|reason| ConfigError::Invalid(format!("notifications_url: {reason}")))?;
        check_scheme(&self.signer_url, &["http", "https"])
            .map_err(|reason| ConfigError::Invalid(format!("signer_url: {reason}")))?;
        Ok(())
    }
}

fn check_scheme(raw: &str, allowed: &[&str]) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|err| format!("{raw}: {err}"))?;
    if !allowed.contains(&url.scheme()) {
        return Err(format!(
            "{raw}: scheme {} not allowed (expected one of {})",
            url.scheme(),
            allowed.join(", ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
read_endpoints:
  - name: primary
    url: https://rpc.example/v3/key
  - name: local
    url: http://127.0.0.1:8545
notifications_url: wss://push.example/key
signer_url: http://127.0.0.1:9545
stages:
  - "0xstage0"
  - "0xstage1"
"#;

    #[test]
    fn parses_and_defaults_probe_timeout() {
        let config: Config = serde_yaml::from_str(VALID).unwrap();
        config.validate().unwrap();
        assert_eq!(config.read_endpoints.len(), 2);
        assert_eq!(config.read_endpoints[0].name, "primary");
        assert_eq!(config.stages, vec!["0xstage0", "0xstage1"]);
        assert_eq!(config.probe_timeout(), Duration::from_millis(2_000));
    }

    #[test]
    fn explicit_probe_timeout_wins() {
        let raw = format!("{VALID}probe_timeout_ms: 500\n");
        let config: Config = serde_yaml::from_str(&raw).unwrap();
        assert_eq!(config.probe_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn rejects_empty_endpoint_list() {
        let raw = VALID.replace(
            "read_endpoints:\n  - name: primary\n    url: https://rpc.example/v3/key\n  - name: local\n    url: http://127.0.0.1:8545",
            "read_endpoints: []",
        );
        let config: Config = serde_yaml::from_str(&raw).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_http_notifications_url() {
        let raw = VALID.replace("wss://push.example/key", "https://push.example/key");
        let config: Config = serde_yaml::from_str(&raw).unwrap();
        let err = config.validate().unwrap_err();
        let ConfigError::Invalid(reason) = err else {
            panic!("expected invalid config");
        };
        assert!(reason.contains("notifications_url"));
    }

    #[test]
    fn rejects_unparseable_url() {
        let raw = VALID.replace("http://127.0.0.1:9545", "not a url");
        let config: Config = serde_yaml::from_str(&raw).unwrap();
        assert!(config.validate().is_err());
    }
}
