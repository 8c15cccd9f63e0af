//! TOML configuration with environment overrides.

use std::env;
use std::path::{Path, PathBuf};

use alchemy_engine::{CacheConfig, EngineConfig, ModelConfig, RateLimitConfig, RulesConfig};
use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub cache: CacheConfig,
    pub model: ModelConfig,
    pub engine: RulesConfig,
    pub rate_limit: RateLimitConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Browser origins allowed to call the API. `"*"` allows any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Defaults to `<data_dir>/alchemy.db`.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token for element edits and path commits. Unset means open.
    pub admin_token: Option<String>,
    /// Reject requests without an `x-caller-id` header.
    pub require_caller: bool,
}

pub fn data_dir() -> PathBuf {
    env::var("ALCHEMY_DATA_DIR")
        .ok()
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".daily-alchemy"))
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load from `explicit`, else `ALCHEMY_CONFIG`, else
    /// `<data_dir>/config.toml` if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| non_empty_env("ALCHEMY_CONFIG").map(PathBuf::from));
        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                let default = data_dir().join("config.toml");
                if default.is_file() {
                    Self::from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    fn apply_env(&mut self) {
        if let Some(key) = non_empty_env("ALCHEMY_MODEL_API_KEY") {
            self.model.api_key = Some(key);
        }
        if let Some(url) = non_empty_env("ALCHEMY_MODEL_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(token) = non_empty_env("ALCHEMY_ADMIN_TOKEN") {
            self.auth.admin_token = Some(token);
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join("alchemy.db"))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            model: self.model.clone(),
            rules: self.engine.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8787");
        assert!(config.cache.enabled);
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.model.max_attempts, 3);
        assert_eq!(config.model.context_limit, 200);
        assert!(!config.engine.allow_self_combination);
        assert!(config.engine.profanity_filter);
        assert_eq!(config.rate_limit.generate_per_minute, 5);
        assert!(config.auth.admin_token.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [model]
            primary = "test/model"
            fallbacks = []

            [engine]
            allow_self_combination = true
            extra_blocked_terms = ["gronk"]

            [auth]
            admin_token = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.model.primary, "test/model");
        assert!(config.model.fallbacks.is_empty());
        assert_eq!(config.model.max_tokens, 256);
        assert!(config.engine.allow_self_combination);
        assert_eq!(config.engine.extra_blocked_terms, ["gronk"]);
        assert_eq!(config.auth.admin_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_unknown_types_rejected() {
        assert!(Config::from_toml("[cache]\ncapacity = \"lots\"").is_err());
    }

    #[test]
    fn test_explicit_store_path() {
        let config = Config::from_toml("[store]\npath = \"/tmp/x.db\"").unwrap();
        assert_eq!(config.store_path(), PathBuf::from("/tmp/x.db"));
    }
}
