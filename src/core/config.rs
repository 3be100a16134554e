//! Application configuration management

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

/// Viewer color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Theme (light/dark)
    pub theme: Theme,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "markview", "Markview")
}

impl AppConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_json(&content)
    }

    fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Default location of the offline resource cache
    pub fn cache_dir() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.cache_dir().join("resources"))
            .unwrap_or_else(|| PathBuf::from(".markview-cache"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_toggle() {
        assert_eq!(Theme::Dark.toggled(), Theme::Light);
        assert_eq!(Theme::Light.toggled().toggled(), Theme::Light);
    }

    #[test]
    fn test_config_json() {
        let config = AppConfig { theme: Theme::Light };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"theme":"light"}"#);
        assert_eq!(AppConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = AppConfig::from_json("{}").unwrap();
        assert_eq!(config.theme, Theme::Dark);
        assert!(AppConfig::from_json(r#"{"theme":"sepia"}"#).is_err());
    }
}
