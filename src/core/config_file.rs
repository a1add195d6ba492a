//! User configuration file handling
//!
//! Manages settings from ~/.config/pssgfont/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_FONT_SIZE: u32 = 74;
pub const DEFAULT_PXRANGE: f64 = 4.0;
pub const DEFAULT_FONT_NAME: &str = "din_cnd_bold_msdf_0";
pub const DEFAULT_ATLAS_GENERATOR: &str = "msdf-atlas-gen";
pub const DEFAULT_TEXTURE_COMPRESSOR: &str = "texconv";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_TOOL_RETRIES: u32 = 1;

/// User configuration from ~/.config/pssgfont/settings.json
///
/// These settings override built-in defaults but are overridden by CLI arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConfigFile {
    /// Atlas glyph size in pixels
    pub font_size: Option<u32>,
    /// Distance field range in pixels
    pub pxrange: Option<f64>,
    /// Shader instance and atlas image name
    pub font_name: Option<String>,
    pub atlas_generator: Option<PathBuf>,
    pub texture_compressor: Option<PathBuf>,
    pub tool_timeout_secs: Option<u64>,
    /// Extra attempts after a failed external tool run
    pub tool_retries: Option<u32>,
    /// Directory holding the `LIBRARY_*.xml` files extracted from the game
    pub template_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Every field set to its built-in default
    pub fn defaults() -> Self {
        Self {
            font_size: Some(DEFAULT_FONT_SIZE),
            pxrange: Some(DEFAULT_PXRANGE),
            font_name: Some(DEFAULT_FONT_NAME.to_string()),
            atlas_generator: Some(PathBuf::from(DEFAULT_ATLAS_GENERATOR)),
            texture_compressor: Some(PathBuf::from(DEFAULT_TEXTURE_COMPRESSOR)),
            tool_timeout_secs: Some(DEFAULT_TOOL_TIMEOUT_SECS),
            tool_retries: Some(DEFAULT_TOOL_RETRIES),
            template_dir: None,
        }
    }

    /// Get the path to the pssgfont config directory
    pub fn config_dir() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")));
        config_dir.join("pssgfont")
    }

    /// Get the path to the user config file
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("settings.json")
    }

    /// Get the path to the logs directory
    pub fn logs_dir() -> PathBuf {
        Self::config_dir().join("logs")
    }

    /// Load configuration from the user config file
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::debug!("Loaded user settings from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;

        tracing::debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn font_size(&self) -> u32 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    pub fn pxrange(&self) -> f64 {
        self.pxrange.unwrap_or(DEFAULT_PXRANGE)
    }

    pub fn font_name(&self) -> String {
        self.font_name
            .clone()
            .unwrap_or_else(|| DEFAULT_FONT_NAME.to_string())
    }

    pub fn atlas_generator(&self) -> PathBuf {
        self.atlas_generator
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ATLAS_GENERATOR))
    }

    pub fn texture_compressor(&self) -> PathBuf {
        self.texture_compressor
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEXTURE_COMPRESSOR))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS))
    }

    pub fn tool_retries(&self) -> u32 {
        self.tool_retries.unwrap_or(DEFAULT_TOOL_RETRIES)
    }

    /// Initialize the user configuration directory
    ///
    /// Creates the config directory, its logs/ directory and a settings.json
    /// with every default spelled out. An existing settings file is kept.
    pub fn initialize_config_directory() -> anyhow::Result<()> {
        let settings_path = Self::initialize_at(&Self::config_dir())?;

        println!("\nConfiguration initialized successfully!");
        println!("  - Edit settings at: {:?}", settings_path);
        println!("  - View logs in: {:?}", Self::logs_dir());
        Ok(())
    }

    pub fn initialize_at(config_dir: &Path) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(config_dir)?;
        println!("Created config directory: {:?}", config_dir);

        let logs_dir = config_dir.join("logs");
        fs::create_dir_all(&logs_dir)?;
        println!("Created logs directory: {:?}", logs_dir);

        let settings_path = config_dir.join("settings.json");
        if !settings_path.exists() {
            Self::defaults().save_to(&settings_path)?;
            println!("Created settings file: {:?}", settings_path);
        } else {
            println!("Settings file already exists: {:?}", settings_path);
        }
        Ok(settings_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_config_falls_back_to_defaults() {
        let config = ConfigFile::default();
        assert_eq!(config.font_size(), 74);
        assert_eq!(config.pxrange(), 4.0);
        assert_eq!(config.font_name(), "din_cnd_bold_msdf_0");
        assert_eq!(config.tool_timeout(), Duration::from_secs(300));
        assert_eq!(config.tool_retries(), 1);
    }

    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "font_size": 96, "template_dir": "/game/font" }"#).unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.font_size(), 96);
        assert_eq!(config.pxrange(), 4.0);
        assert_eq!(config.template_dir, Some(PathBuf::from("/game/font")));
    }

    #[test]
    fn test_unreadable_settings_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(ConfigFile::load_from(&path).is_none());
        assert!(ConfigFile::load_from(&dir.path().join("absent.json")).is_none());
    }

    #[test]
    fn test_initialize_writes_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = ConfigFile::initialize_at(dir.path()).unwrap();
        assert!(dir.path().join("logs").is_dir());
        assert_eq!(ConfigFile::load_from(&path).unwrap(), ConfigFile::defaults());

        fs::write(&path, r#"{ "font_size": 50 }"#).unwrap();
        ConfigFile::initialize_at(dir.path()).unwrap();
        assert_eq!(ConfigFile::load_from(&path).unwrap().font_size(), 50);
    }
}
