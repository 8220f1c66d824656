//! Configuration parsing and management.

use blocklab_types::{LocaleCode, SourceName};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration matching the blocklab.yml schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Sources in priority order; earlier sources shadow later ones
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceName>,

    /// Locale requested when the caller does not name one
    #[serde(default = "default_locale")]
    pub default_locale: LocaleCode,

    /// Source that fetched content is dispatched into
    #[serde(default = "default_loader_source")]
    pub loader_source: SourceName,

    /// How many times a suspended consumer may be re-driven
    #[serde(default = "default_max_redrives")]
    pub max_redrives: usize,

    /// Largest iteration count a repeating block may ask for
    #[serde(default = "default_max_repeat")]
    pub max_repeat: u64,

    // Where the config was read from, if it came from a file
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_sources() -> Vec<SourceName> {
    vec![SourceName::inline(), SourceName::content()]
}

fn default_locale() -> LocaleCode {
    LocaleCode::new("en")
}

fn default_loader_source() -> SourceName {
    SourceName::content()
}

fn default_max_repeat() -> u64 {
    1000
}

fn default_max_redrives() -> usize {
    blocklab_incremental::DEFAULT_MAX_REDRIVES
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sources: default_sources(),
            default_locale: default_locale(),
            loader_source: default_loader_source(),
            max_redrives: default_max_redrives(),
            max_repeat: default_max_repeat(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml_str(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde defaults cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Invalid("`sources` must name at least one source".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for source in &self.sources {
            if !seen.insert(source) {
                return Err(ConfigError::Invalid(format!("source '{source}' listed twice")));
            }
        }
        if self.max_redrives == 0 {
            return Err(ConfigError::Invalid("`max_redrives` must be positive".into()));
        }
        if self.max_repeat == 0 {
            return Err(ConfigError::Invalid("`max_repeat` must be positive".into()));
        }
        Ok(())
    }

    /// Path of the file this config was loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Builder-style override of the source priority order
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourceName>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_default_locale(mut self, locale: LocaleCode) -> Self {
        self.default_locale = locale;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = Config::from_yaml_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sources, vec![SourceName::inline(), SourceName::content()]);
        assert_eq!(config.default_locale.as_str(), "en");
        assert_eq!(config.max_repeat, 1000);
    }

    #[test]
    fn test_rejects_zero_repeat_cap() {
        let err = Config::from_yaml_str("max_repeat: 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sources: [studio, inline, content]\ndefault_locale: pt_BR\nmax_redrives: 8"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[0], SourceName::studio());
        assert_eq!(config.default_locale.as_str(), "pt-br");
        assert_eq!(config.max_redrives, 8);
        assert_eq!(config.config_path(), Some(file.path()));
    }

    #[test]
    fn test_rejects_duplicate_sources() {
        let err = Config::from_yaml_str("sources: [content, content]").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/blocklab.yml").unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
