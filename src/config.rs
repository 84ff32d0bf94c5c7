// Global configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Dithering algorithm used when neither --dither nor --threshold is given
    #[serde(default = "default_dither")]
    pub dither: String,

    /// Suppress the summary and progress bar by default
    #[serde(default)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Always run the volume boost pass after fetching
    #[serde(default)]
    pub boost_volume: bool,

    /// Keep the unboosted intermediate file after boosting
    #[serde(default)]
    pub keep_intermediate: bool,
}

fn default_dither() -> String {
    "sierra3".to_string()
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            dither: default_dither(),
            quiet: false,
        }
    }
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "macos") {
            dirs::home_dir()
                .context("Could not determine home directory")?
                .join(".config")
                .join("vid2bnd")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("vid2bnd")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load config from disk, or fall back to defaults if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let contents = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            let config: Config = toml::from_str(&contents).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?;

            Ok(config)
        } else {
            let config = Config::default();

            // Best effort: a read-only config directory is not fatal
            if let Err(e) = config.save() {
                eprintln!("Warning: Could not create default config file: {}", e);
                eprintln!(
                    "Using built-in defaults. Run 'vid2bnd init-config' to create a config file."
                );
            }

            Ok(config)
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.defaults.dither, "sierra3");
        assert_eq!(config.defaults.quiet, false);
        assert_eq!(config.fetch.boost_volume, false);
        assert_eq!(config.fetch.keep_intermediate, false);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.defaults.dither, config.defaults.dither);
        assert_eq!(deserialized.fetch.boost_volume, config.fetch.boost_volume);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("[defaults]\nquiet = true\n").unwrap();
        assert_eq!(config.defaults.quiet, true);
        assert_eq!(config.defaults.dither, "sierra3");
        assert_eq!(config.fetch.boost_volume, false);
    }

    #[test]
    fn test_custom_dither_round_trip() {
        let mut config = Config::default();
        config.defaults.dither = "atkinson".to_string();

        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("atkinson"));

        let deserialized: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.defaults.dither, "atkinson");
    }
}
