//! Adapter configuration.
//!
//! A configuration is a reference to an engine configuration file plus an
//! explicit log verbosity. The file's basename carries the engine-kind
//! discriminator and its directory is the engine's working/data directory;
//! the adapter never parses the engine file itself.

use crate::errors::{BmiError, BmiResult};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_verbosity() -> LevelFilter {
    LevelFilter::Debug
}

/// Configuration passed to [`ModelAdapter::initialize`].
///
/// The verbosity is an explicit field rather than ambient global state; the
/// adapter forwards it to the engine at startup.
///
/// [`ModelAdapter::initialize`]: crate::adapter::ModelAdapter::initialize
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Full path to the engine configuration file.
    pub config_path: PathBuf,
    /// Log verbosity for the run.
    #[serde(default = "default_verbosity")]
    pub verbosity: LevelFilter,
}

impl AdapterConfig {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            verbosity: default_verbosity(),
        }
    }

    pub fn with_verbosity(mut self, verbosity: LevelFilter) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> BmiResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| BmiError::Configuration(format!("cannot read configuration: {}", e)))?;
        toml::from_str(&contents)
            .map_err(|e| BmiError::Configuration(format!("invalid configuration: {}", e)))
    }

    /// The engine's working/data directory, taken from the directory portion
    /// of the configuration path.
    pub fn data_dir(&self) -> &Path {
        self.config_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// The basename of the configuration file, which carries the engine-kind
    /// discriminator.
    pub fn file_name(&self) -> BmiResult<&str> {
        self.config_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BmiError::Configuration(format!(
                    "configuration path '{}' has no file name",
                    self.config_path.display()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_debug_verbosity() {
        let config = AdapterConfig::new("cases/rhine/sbm.ini");
        assert_eq!(config.verbosity, LevelFilter::Debug);
        assert_eq!(config.data_dir(), Path::new("cases/rhine"));
        assert_eq!(config.file_name().unwrap(), "sbm.ini");
    }

    #[test]
    fn verbosity_override() {
        let config = AdapterConfig::new("sbm.ini").with_verbosity(LevelFilter::Warn);
        assert_eq!(config.verbosity, LevelFilter::Warn);
    }

    #[test]
    fn toml_round_trip() {
        let config = AdapterConfig::new("cases/rhine/sbm.ini").with_verbosity(LevelFilter::Info);
        let serialised = toml::to_string(&config).unwrap();
        let back: AdapterConfig = toml::from_str(&serialised).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn verbosity_defaults_when_missing_from_file() {
        let config: AdapterConfig = toml::from_str(r#"config_path = "cases/hbv.ini""#).unwrap();
        assert_eq!(config.verbosity, LevelFilter::Debug);
    }

    #[test]
    fn from_file_missing_is_configuration_error() {
        let err = AdapterConfig::from_file("/nonexistent/adapter.toml").unwrap_err();
        assert!(matches!(err, crate::errors::BmiError::Configuration(_)));
    }
}
