use crate::client::{Credentials, DEFAULT_BASE_URL};
use crate::error::ConfigError;
use crate::receiver::SignaturePolicy;
use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const API_KEY_ENV: &str = "ALLSCREENSHOTS_API_KEY";
pub const BASE_URL_ENV: &str = "ALLSCREENSHOTS_BASE_URL";

/// Settings passed by the host in `initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Externally reachable base for callback URLs. Defaults to the bound address.
    #[serde(default)]
    pub public_url: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub require_signature: bool,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind_addr() -> String {
    "127.0.0.1:0".into()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Parse `initialize` params, filling credentials from the environment
    /// when the host leaves them out.
    pub fn from_params(params: &Value) -> Result<Self, ConfigError> {
        Self::from_params_with(params, |key| std::env::var(key).ok())
    }

    /// Like [`Config::from_params`], reading fallbacks through `lookup`.
    pub fn from_params_with(
        params: &Value,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            other => other.clone(),
        };
        let config: Config =
            serde_json::from_value(params).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.with_env(lookup)
    }

    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            self.api_key = lookup(API_KEY_ENV).filter(|k| !k.is_empty());
        }
        if self.base_url.as_deref().map_or(true, str::is_empty) {
            self.base_url = lookup(BASE_URL_ENV).filter(|u| !u.is_empty());
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid(format!("bind_addr '{}': {e}", self.bind_addr)))?;
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        for url in [&self.base_url, &self.public_url].into_iter().flatten() {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "'{url}' is not an http(s) URL"
                )));
            }
        }
        Ok(())
    }

    /// Vendor credentials. Operations and registration need these; receiving does not.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let api_key = self
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("api_key"))?;
        Ok(Credentials {
            api_key,
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn signature_policy(&self) -> SignaturePolicy {
        if self.require_signature {
            SignaturePolicy::Required
        } else {
            SignaturePolicy::Opportunistic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(params: Value) -> Config {
        serde_json::from_value(params).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(json!({})).with_env(no_env).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("."));
        assert_eq!(config.bind_addr, "127.0.0.1:0");
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.signature_policy(), SignaturePolicy::Opportunistic);
        assert!(config.public_url.is_none());
    }

    #[test]
    fn test_credentials_required_for_api_calls() {
        let config = parse(json!({})).with_env(no_env).unwrap();
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::Missing("api_key"))
        ));

        let config = parse(json!({"api_key": "k"})).with_env(no_env).unwrap();
        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_env_fallback() {
        let env = |key: &str| match key {
            API_KEY_ENV => Some("from-env".to_string()),
            BASE_URL_ENV => Some("https://staging.example.com".to_string()),
            _ => None,
        };
        let config = parse(json!({"api_key": ""})).with_env(env).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(
            config.base_url.as_deref(),
            Some("https://staging.example.com")
        );

        let config = parse(json!({"api_key": "explicit"})).with_env(env).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse(json!({"bind_addr": "localhost"}))
            .with_env(no_env)
            .is_err());
        assert!(parse(json!({"request_timeout_secs": 0}))
            .with_env(no_env)
            .is_err());
        assert!(parse(json!({"public_url": "hooks.example.com"}))
            .with_env(no_env)
            .is_err());
    }

    #[test]
    fn test_require_signature() {
        let config = parse(json!({"require_signature": true}))
            .with_env(no_env)
            .unwrap();
        assert_eq!(config.signature_policy(), SignaturePolicy::Required);
    }

    #[test]
    fn test_from_params_with_custom_lookup() {
        let config =
            Config::from_params_with(&Value::Null, |key| (key == API_KEY_ENV).then(|| "k".into()))
                .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert!(config.base_url.is_none());
        assert!(Config::from_params_with(&json!({}), no_env)
            .unwrap()
            .credentials()
            .is_err());
    }

    #[test]
    fn test_from_params_rejects_wrong_types() {
        assert!(matches!(
            Config::from_params(&json!({"require_signature": "yes"})),
            Err(ConfigError::Invalid(_))
        ));
    }
}
