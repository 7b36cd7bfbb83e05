use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pt_core::{CoreError, CoreResult};

use crate::{read_yaml, write_yaml, FsPantry, PANTRY_DIR_NAME};

const CONFIG_FILE_NAME: &str = "config.yaml";

/// User configuration stored in `<config_dir>/pantry/config.yaml`.
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PantryConfig {
    /// Data root, overridden by `PANTRY_PATH`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Recommendation service settings.
    #[serde(default)]
    pub recipes: RecipesConfig,
}

/// Settings for the text-completion endpoint.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RecipesConfig {
    /// Base URL of an OpenAI-compatible API.
    pub endpoint: String,
    /// Model name sent with each request.
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout.
    pub timeout_secs: u64,
}

impl Default for RecipesConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 30,
        }
    }
}

impl RecipesConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

fn config_path() -> CoreResult<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(PANTRY_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    Err(CoreError::StoreUnavailable(
        "unable to determine config directory".into(),
    ))
}

pub fn load_config() -> CoreResult<PantryConfig> {
    Ok(read_yaml(&config_path()?)?.unwrap_or_default())
}

pub fn save_config(config: &PantryConfig) -> CoreResult<()> {
    write_yaml(&config_path()?, config)
}

/// Record the data root, keeping the rest of the configuration.
pub fn set_config_path(path: &Path) -> CoreResult<()> {
    let mut config = load_config()?;
    config.path = Some(path.to_string_lossy().to_string());
    save_config(&config)
}

/// Resolve the data root from `PANTRY_PATH`, the config file, or the default.
pub fn resolve_pantry_path(config: &PantryConfig) -> CoreResult<PathBuf> {
    if let Ok(value) = std::env::var("PANTRY_PATH") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value));
        }
    }

    if let Some(path) = &config.path {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    FsPantry::default_path()
}
