//! Application configuration (`~/.tokenwatch/config.toml`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::provider::ProviderTag;

/// Overrides the config directory (also used by tests).
pub const HOME_ENV: &str = "TOKENWATCH_HOME";

const CONFIG_DIR_NAME: &str = ".tokenwatch";
const CONFIG_FILE_NAME: &str = "config.toml";
const DATABASE_FILE_NAME: &str = "tokenwatch.db";

/// Directory holding the config file and the default database.
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(HOME_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn get_config_path() -> PathBuf {
    get_config_dir().join(CONFIG_FILE_NAME)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Defaults to `<config dir>/tokenwatch.db`
    pub database_path: Option<PathBuf>,
    /// Buffer size of the "new record" broadcast channel
    pub notify_capacity: usize,
    /// Outbound proxy for the shared HTTP client (http, https, socks5, socks5h)
    pub proxy_url: Option<String>,
    pub health: HealthConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub timeout_secs: u64,
    /// Responses slower than this are reported as degraded
    pub degraded_threshold_ms: u64,
    /// Probe URL overrides keyed by provider name (`openai`, `google`, ...)
    pub endpoints: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            notify_capacity: crate::notify::DEFAULT_CAPACITY,
            proxy_url: None,
            health: HealthConfig::default(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            degraded_threshold_ms: 3000,
            endpoints: BTreeMap::new(),
        }
    }
}

impl HealthConfig {
    pub fn default_endpoint(provider: ProviderTag) -> Option<&'static str> {
        match provider {
            ProviderTag::OpenAi => Some("https://api.openai.com/v1/models"),
            ProviderTag::Anthropic => Some("https://api.anthropic.com/v1/models"),
            ProviderTag::Google => Some("https://generativelanguage.googleapis.com/v1beta/models"),
            ProviderTag::Xai => Some("https://api.x.ai/v1/models"),
            ProviderTag::DeepSeek => Some("https://api.deepseek.com/models"),
            ProviderTag::Unknown => None,
        }
    }

    /// Probe URL for a provider: configured override, else the built-in one.
    pub fn endpoint_for(&self, provider: ProviderTag) -> Option<String> {
        self.endpoints
            .get(provider.as_str())
            .cloned()
            .or_else(|| Self::default_endpoint(provider).map(str::to_string))
    }
}

impl AppConfig {
    /// Load from the default location; a missing file yields defaults.
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&get_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::debug!("[Config] {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, AppError> {
        let path = get_config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| AppError::io(path, e))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.notify_capacity == 0 {
            return Err(AppError::Config(
                "notify_capacity must be greater than 0".to_string(),
            ));
        }
        if self.health.timeout_secs == 0 {
            return Err(AppError::Config(
                "health.timeout_secs must be greater than 0".to_string(),
            ));
        }
        for name in self.health.endpoints.keys() {
            match name.parse::<ProviderTag>() {
                Ok(tag) if tag.is_known() => {}
                _ => {
                    return Err(AppError::Config(format!(
                        "health.endpoints: '{name}' is not a known provider"
                    )))
                }
            }
        }
        crate::http_client::validate_proxy(self.proxy_url.as_deref())
            .map_err(|e| AppError::Config(format!("proxy_url: {e}")))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| get_config_dir().join(DATABASE_FILE_NAME))
    }
}
