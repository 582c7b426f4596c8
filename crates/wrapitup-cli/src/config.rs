//! Configuration loading from TOML files

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;
use wrapitup_core::Signal;

/// Global configuration for wrapitup
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Time limit in seconds; `None` runs without a limit.
    pub limit: Option<f64>,
    /// Seconds between SIGTERM and SIGKILL when stopping a command.
    pub grace_period: f64,
    pub poll_interval_ms: u64,
    /// Signal names; empty means the platform defaults.
    pub signals: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            limit: None,
            grace_period: 10.0,
            poll_interval_ms: 100,
            signals: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Parsed signal list, or the host defaults when none are configured.
    pub fn signals(&self) -> Result<Vec<Signal>> {
        if self.signals.is_empty() {
            return Ok(wrapitup_core::platform::host().defaults().to_vec());
        }
        self.signals
            .iter()
            .map(|name| {
                name.parse::<Signal>()
                    .with_context(|| format!("Invalid signal in config: {name}"))
            })
            .collect()
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./wrapitup.toml (current directory)
    /// 2. ~/.config/wrapitup/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("wrapitup.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "wrapitup") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.run.limit, None);
        assert_eq!(config.run.grace_period, 10.0);
        assert_eq!(config.run.poll_interval_ms, 100);
        assert_eq!(
            config.run.signals().unwrap(),
            vec![Signal::INT, Signal::TERM]
        );
    }

    #[test]
    fn parse_config_toml() {
        let toml = r#"
[run]
limit = 300.0
grace_period = 2.5
signals = ["SIGTERM", "hup"]
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.run.limit, Some(300.0));
        assert_eq!(config.run.grace_period, 2.5);
        assert_eq!(config.run.poll_interval_ms, 100);
        assert_eq!(
            config.run.signals().unwrap(),
            vec![Signal::TERM, Signal::HUP]
        );
    }

    #[test]
    fn bad_signal_name() {
        let config: Config = toml::from_str("[run]\nsignals = [\"SIGNOPE\"]\n").unwrap();
        let err = config.run.signals().unwrap_err();
        assert!(format!("{err:#}").contains("SIGNOPE"));
    }

    #[test]
    fn empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.grace_period, 10.0);
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[run]\npoll_interval_ms = 25").unwrap();
        let config = Config::from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.run.poll_interval_ms, 25);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[run]\nlimit = \"soon\"").unwrap();
        let err = Config::from_file(&file.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
