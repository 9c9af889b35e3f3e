//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template store configuration
    pub store: StoreConfig,

    /// Fill defaults
    pub fill: FillConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .promptstore.yml
        let local_config = PathBuf::from(".promptstore.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/promptstore/promptstore.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("promptstore").join("promptstore.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Template store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory scanned for definition files
    #[serde(rename = "template-dir")]
    pub template_dir: PathBuf,

    /// Whether to descend into subdirectories
    pub recursive: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            recursive: true,
        }
    }
}

/// Fill defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillConfig {
    /// Default response language
    pub language: String,

    /// Default audience
    pub audience: String,
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            audience: "general".to_string(),
        }
    }
}

impl FillConfig {
    /// Build the fill context these defaults describe
    pub fn context(&self) -> crate::resolver::FillContext {
        crate::resolver::FillContext {
            language: self.language.clone(),
            audience: self.audience.clone(),
        }
    }
}
