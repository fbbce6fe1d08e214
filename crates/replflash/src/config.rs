//! Configuration file parsing and merging
//!
//! This module handles parsing of `replflash.toml` and `replflash.local.toml`
//! files. The local file is merged over the base one: tables merge
//! recursively, arrays and scalars are replaced.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::deploy::{DEFAULT_TEXT_SUFFIXES, DeploySettings, TextPacing, encoder};
use crate::{Error, Result};

/// Main configuration structure for replflash
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Device settings
    pub device: DeviceConfig,

    /// Transfer settings
    pub transfer: TransferConfig,
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial device node of the board (default: "/dev/ttyACM0")
    pub port: Utf8PathBuf,

    /// Line speed (default: 115200)
    pub baud_rate: u32,

    /// Longest silence from the board before a read fails, in milliseconds (default: 5000)
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: Utf8PathBuf::from("/dev/ttyACM0"),
            baud_rate: 115_200,
            timeout_ms: 5_000,
        }
    }
}

impl DeviceConfig {
    /// Read timeout of the serial line
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Suffixes of files sent as text
    pub text_suffixes: Vec<String>,

    /// Lines sent between two flushes (default: 5)
    pub flush_every: usize,

    /// Pause after each flush in milliseconds (default: 20)
    pub pause_ms: u64,

    /// Draw a progress bar (default: true)
    pub show_progress: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            text_suffixes: DEFAULT_TEXT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            flush_every: encoder::DEFAULT_FLUSH_EVERY,
            pause_ms: encoder::DEFAULT_FLUSH_PAUSE.as_millis() as u64,
            show_progress: true,
        }
    }
}

impl Config {
    /// Load configuration from a project directory.
    ///
    /// This loads `replflash.toml` and optionally merges `replflash.local.toml` if it exists.
    pub fn load(project_root: &Utf8Path) -> Result<Self> {
        let config_path = project_root.join("replflash.toml");
        let local_config_path = project_root.join("replflash.local.toml");

        let base_config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<toml::Value>(&content)?
        } else {
            toml::Value::Table(toml::map::Map::new())
        };

        let merged = if local_config_path.exists() {
            let content = std::fs::read_to_string(&local_config_path)?;
            merge_toml_values(base_config, toml::from_str::<toml::Value>(&content)?)
        } else {
            base_config
        };

        let config: Config = merged.try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a string (for testing)
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.device.baud_rate == 0 || self.device.timeout_ms == 0 {
            return Err(Error::config(
                "device.baud_rate and device.timeout_ms must be positive",
                "Remove them from replflash.toml to use 115200 baud and a 5000 ms timeout",
            ));
        }
        if self.transfer.flush_every == 0 {
            return Err(Error::config(
                "transfer.flush_every must be at least 1",
                "Set flush_every to a positive number of lines in replflash.toml",
            ));
        }
        if let Some(suffix) = self
            .transfer
            .text_suffixes
            .iter()
            .find(|s| !s.starts_with('.'))
        {
            return Err(Error::config(
                format!("Text suffix '{}' does not start with a dot", suffix),
                "Write suffixes as in text_suffixes = [\".py\", \".txt\"]",
            ));
        }
        Ok(())
    }

    /// Settings for deployments
    pub fn deploy_settings(&self) -> DeploySettings {
        DeploySettings {
            text_suffixes: self.transfer.text_suffixes.clone(),
            pacing: TextPacing {
                flush_every: self.transfer.flush_every,
                pause: Duration::from_millis(self.transfer.pause_ms),
            },
            show_progress: self.transfer.show_progress,
        }
    }
}

/// Merge two TOML values:
/// - Tables: recursively merged
/// - Arrays: local replaces base (not merged)
/// - Primitives: local overrides base
fn merge_toml_values(base: toml::Value, local: toml::Value) -> toml::Value {
    match (base, local) {
        (toml::Value::Table(mut base_table), toml::Value::Table(local_table)) => {
            for (key, local_value) in local_table {
                if let Some(base_value) = base_table.remove(&key) {
                    base_table.insert(key, merge_toml_values(base_value, local_value));
                } else {
                    base_table.insert(key, local_value);
                }
            }
            toml::Value::Table(base_table)
        }
        (_, local) => local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.device.port, Utf8PathBuf::from("/dev/ttyACM0"));
        assert_eq!(config.device.baud_rate, 115_200);
        assert_eq!(config.device.timeout(), Duration::from_secs(5));
        assert_eq!(config.transfer.flush_every, 5);
        assert_eq!(config.transfer.pause_ms, 20);
        assert!(config.transfer.show_progress);
        assert!(config.transfer.text_suffixes.contains(&".py".to_string()));
    }

    #[test]
    fn test_parse_full_config() {
        let content = r#"
[device]
port = "/dev/ttyUSB0"

[transfer]
text_suffixes = [".py", ".toml"]
flush_every = 10
pause_ms = 0
show_progress = false
"#;

        let config = Config::parse(content).unwrap();

        assert_eq!(config.device.port, Utf8PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(config.transfer.text_suffixes, vec![".py", ".toml"]);

        let settings = config.deploy_settings();
        assert_eq!(settings.pacing.flush_every, 10);
        assert!(settings.pacing.pause.is_zero());
        assert!(!settings.show_progress);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::parse("[transfer]\nflush_every = 0\n"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            Config::parse("[transfer]\ntext_suffixes = [\"py\"]\n"),
            Err(Error::Config { .. })
        ));
        assert!(matches!(
            Config::parse("[device]\ntimeout_ms = 0\n"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_load_merges_local_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();

        std::fs::write(
            root.join("replflash.toml"),
            "[device]\nport = \"/dev/ttyACM0\"\n\n[transfer]\nflush_every = 8\ntext_suffixes = [\".py\", \".txt\"]\n",
        )
        .unwrap();
        std::fs::write(
            root.join("replflash.local.toml"),
            "[device]\nport = \"/dev/ttyACM1\"\n\n[transfer]\ntext_suffixes = [\".py\"]\n",
        )
        .unwrap();

        let config = Config::load(root).unwrap();

        assert_eq!(config.device.port, Utf8PathBuf::from("/dev/ttyACM1"));
        // Not overridden locally
        assert_eq!(config.transfer.flush_every, 8);
        // Arrays are replaced, not merged
        assert_eq!(config.transfer.text_suffixes, vec![".py"]);
    }

    #[test]
    fn test_load_missing_config_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(temp_dir.path()).unwrap();

        let config = Config::load(root).unwrap();
        assert_eq!(config.device.port, Utf8PathBuf::from("/dev/ttyACM0"));
    }
}
