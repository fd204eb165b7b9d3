//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{RegError, Result};

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub backup: BackupConfig,
    pub scan: ScanConfig,
    pub clean: CleanConfig,
    pub log: LogConfig,
}

/// Backup journal settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory for backup files. `None` means `<data dir>/regsweep/backups`.
    pub directory: Option<PathBuf>,
    /// How many backup files to keep; oldest beyond the cap are pruned.
    pub retention: usize,
    /// Whether `clean()` snapshots by default.
    pub enabled: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            directory: None,
            retention: 10,
            enabled: true,
        }
    }
}

/// Scanner behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    /// Entry count above which an MRU key is reported as clutter.
    pub mru_threshold: usize,
    /// Entry count above which typed-URL history is reported.
    pub history_threshold: usize,
    /// Recursion cap for the empty-key walk.
    pub empty_key_depth: usize,
    /// Recursion cap for MRU subtree walks (Office trees nest deep).
    pub mru_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            mru_threshold: 10,
            history_threshold: 10,
            empty_key_depth: 4,
            mru_depth: 4,
        }
    }
}

/// Cleaning behavior knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct CleanConfig {
    /// Whether force mode (ownership/ACL escalation) is on by default.
    pub force_delete: bool,
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
#[derive(Default)]
pub struct LogConfig {
    /// JSONL activity log path. `None` disables file logging.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| RegError::io(path, &e))?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus env overrides, for hosts that carry no config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RSW_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("RSW_BACKUP_DIR") {
            if !dir.is_empty() {
                self.backup.directory = Some(PathBuf::from(dir));
            }
        }
        if let Ok(n) = env::var("RSW_BACKUP_RETENTION") {
            if let Ok(parsed) = n.parse() {
                self.backup.retention = parsed;
            }
        }
        if let Ok(n) = env::var("RSW_MRU_THRESHOLD") {
            if let Ok(parsed) = n.parse() {
                self.scan.mru_threshold = parsed;
            }
        }
        if let Ok(v) = env::var("RSW_FORCE_DELETE") {
            self.clean.force_delete = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    /// Sanity-check knob ranges.
    pub fn validate(&self) -> Result<()> {
        if self.backup.retention == 0 {
            return Err(RegError::InvalidConfig {
                details: "backup.retention must be at least 1".to_string(),
            });
        }
        if self.scan.empty_key_depth == 0 || self.scan.empty_key_depth > 10 {
            return Err(RegError::InvalidConfig {
                details: format!(
                    "scan.empty_key_depth must be in 1..=10, got {}",
                    self.scan.empty_key_depth
                ),
            });
        }
        Ok(())
    }

    /// Resolve the effective backup directory.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.backup.directory.clone().unwrap_or_else(|| {
            let base = env::var_os("LOCALAPPDATA")
                .or_else(|| env::var_os("XDG_DATA_HOME"))
                .map_or_else(env::temp_dir, PathBuf::from);
            base.join("regsweep").join("backups")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backup.retention, 10);
        assert_eq!(config.scan.mru_threshold, 10);
        assert!(!config.clean.force_delete);
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [backup]
            retention = 3

            [scan]
            mru_threshold = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.backup.retention, 3);
        assert_eq!(config.scan.mru_threshold, 25);
        // untouched sections keep defaults
        assert_eq!(config.scan.empty_key_depth, 4);
    }

    #[test]
    fn rejects_zero_retention() {
        let config: Config = toml::from_str("[backup]\nretention = 0").unwrap();
        assert!(matches!(
            config.validate(),
            Err(RegError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_depth() {
        let config: Config = toml::from_str("[scan]\nempty_key_depth = 11").unwrap();
        assert!(config.validate().is_err());
    }
}
