//! Shell configuration file.
//!
//! ```toml
//! [manager]
//! max_nesting_depth = 200
//!
//! [shell]
//! prompt = "ensh> "
//! definitions = ["defs/info.ens"]
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};

use ensemble_dispatch::ManagerConfig;
use serde::{Deserialize, Serialize};

/// Errors that can occur while loading the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level shell configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Dispatch session settings.
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Interactive shell settings.
    #[serde(default)]
    pub shell: ShellSection,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[shell]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSection {
    /// Prompt printed before each line when stdin is a terminal.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Definition files loaded at start-up, in order.
    #[serde(default)]
    pub definitions: Vec<PathBuf>,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            definitions: Vec::new(),
        }
    }
}

fn default_prompt() -> String {
    "ensh> ".to_string()
}

/// `[logging]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}

impl ShellConfig {
    /// Loads and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates TOML text.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: ShellConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manager.max_nesting_depth == 0 {
            return Err(ConfigError::Validation(
                "manager.max_nesting_depth must be at least 1".to_string(),
            ));
        }
        if self.manager.error_part.is_empty() {
            return Err(ConfigError::Validation(
                "manager.error_part must not be empty".to_string(),
            ));
        }
        let valid_levels = ["off", "error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Validation(format!(
                "logging.level must be one of {:?}, got {:?}",
                valid_levels, self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ShellConfig::default();
        assert_eq!(config.manager, ManagerConfig::default());
        assert_eq!(config.shell.prompt, "ensh> ");
        assert!(config.shell.definitions.is_empty());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_parse_partial() {
        let config = ShellConfig::parse(
            r#"
            [manager]
            max_nesting_depth = 64

            [shell]
            definitions = ["a.ens", "b.ens"]
            "#,
        )
        .unwrap();
        assert_eq!(config.manager.max_nesting_depth, 64);
        assert_eq!(config.manager.error_part, "@error");
        assert_eq!(config.shell.prompt, "ensh> ");
        assert_eq!(config.shell.definitions.len(), 2);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[logging]\nlevel = \"debug\"").unwrap();
        let config = ShellConfig::load(file.path()).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_rejects_bad_level() {
        let err = ShellConfig::parse("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = ShellConfig::parse("[manager]\nmax_nesting_depth = 0").unwrap_err();
        assert!(err.to_string().contains("max_nesting_depth"));
    }
}
