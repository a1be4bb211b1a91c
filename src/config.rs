use anyhow::{Context, Result, anyhow};
use log::LevelFilter;
use std::fs;
use std::path::{Path, PathBuf};

use crate::process::procfs::DEFAULT_PROC_ROOT;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the process table to scan
    pub proc_root: PathBuf,
    /// Log level (logging is disabled when unset)
    pub log_level: Option<LevelFilter>,
    /// Write logs to this file instead of stderr
    pub log_file: Option<PathBuf>,
    /// Write logs to a timestamped file in this directory
    pub log_dir: Option<PathBuf>,
    /// Configuration file the values were read from
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            log_level: None,
            log_file: None,
            log_dir: None,
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// Without an explicit path the usual locations are searched. A missing
    /// file is not an error and yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::find_config_file()?,
        };

        let mut config = Config::default();

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            config.apply(&content);
            config.config_path = Some(config_path);
        } else if path.is_some() {
            log::warn!(
                "Configuration file {} not found, using defaults",
                config_path.display()
            );
        }

        Ok(config)
    }

    /// Apply `key: value` lines on top of the current values
    pub fn apply(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.trim() {
                "proc_root" => {
                    self.proc_root = PathBuf::from(value);
                }
                "log_level" => {
                    if let Ok(level) = value.parse::<LevelFilter>() {
                        self.log_level = Some(level);
                    }
                }
                "log_file" => {
                    self.log_file = Some(PathBuf::from(value));
                }
                "log_dir" => {
                    self.log_dir = Some(PathBuf::from(value));
                }
                _ => {
                    // Ignore unknown keys
                }
            }
        }
    }

    /// Find configuration file
    fn find_config_file() -> Result<PathBuf> {
        // Try XDG config directory first
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let xdg_path = PathBuf::from(xdg_config).join("sockowner/config.yml");
            if xdg_path.exists() {
                return Ok(xdg_path);
            }
        }

        // Try ~/.config/sockowner
        let home = Self::get_home_dir()?;
        let home_config = home.join(".config/sockowner/config.yml");
        if home_config.exists() {
            return Ok(home_config);
        }

        // Try current directory
        let current_config = PathBuf::from("config.yml");
        if current_config.exists() {
            return Ok(current_config);
        }

        // Default to home config path
        Ok(home_config)
    }

    /// Get home directory
    fn get_home_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            return Ok(PathBuf::from(home));
        }

        Err(anyhow!("Could not determine home directory"))
    }
}
