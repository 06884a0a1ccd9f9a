// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Configuration
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Tunables for the extension dispatcher, loaded from defaults, an optional
//   TOML file and `MATRIXON_SYNC_` environment variables.
//
// =============================================================================

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{MatrixonError, Result};

/// Environment variable prefix for overrides, e.g. `MATRIXON_SYNC_LOG=debug`.
pub const ENV_PREFIX: &str = "MATRIXON_SYNC_";

/// ## Example
/// ```toml
/// to_device_default_limit = 100
/// to_device_max_limit = 1000
/// log = "info,matrixon_sliding_sync=debug"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlidingSyncConfig {
    /// Messages returned by the to-device extension when the client sends no `limit`
    pub to_device_default_limit: usize,

    /// Upper bound applied to any client supplied `limit`
    pub to_device_max_limit: usize,

    /// Tracing filter directive
    pub log: String,
}

impl Default for SlidingSyncConfig {
    fn default() -> Self {
        Self {
            to_device_default_limit: 100,
            to_device_max_limit: 1000,
            log: "info".to_owned(),
        }
    }
}

impl SlidingSyncConfig {
    /// Loads the configuration, layering an optional TOML file and then the
    /// environment over the defaults.
    #[instrument(level = "debug")]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            debug!("📁 Reading sliding sync config from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed(ENV_PREFIX)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the limits are usable.
    pub fn validate(&self) -> Result<()> {
        if self.to_device_default_limit == 0 {
            return Err(MatrixonError::InvalidConfig(
                "to_device_default_limit must be greater than zero".to_owned(),
            ));
        }
        if self.to_device_default_limit > self.to_device_max_limit {
            return Err(MatrixonError::InvalidConfig(format!(
                "to_device_default_limit ({}) exceeds to_device_max_limit ({})",
                self.to_device_default_limit, self.to_device_max_limit
            )));
        }
        Ok(())
    }

    /// Installs the global tracing subscriber using the configured `log` filter.
    /// `RUST_LOG` still wins when it is set.
    pub fn init_logging(&self) -> Result<()> {
        matrixon_common::logging::init(&self.log)
    }

    /// Resolves the effective to-device limit for a request.
    pub fn to_device_limit(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(0) | None => self.to_device_default_limit,
            Some(limit) => limit.min(self.to_device_max_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use test_log::test;

    #[test]
    fn test_config_default() {
        let config = SlidingSyncConfig::default();
        assert_eq!(config.to_device_default_limit, 100);
        assert_eq!(config.to_device_max_limit, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SlidingSyncConfig::default();
        config.to_device_default_limit = 0;
        assert!(config.validate().is_err());

        config.to_device_default_limit = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_init_logging_rejects_bad_filter() {
        let config = SlidingSyncConfig {
            log: "sliding_sync=loud".to_owned(),
            ..Default::default()
        };
        // a subscriber is already installed by the test harness, so either
        // the filter or the install step fails
        let err = config.init_logging().unwrap_err();
        assert!(matches!(err, MatrixonError::Logging(_)));
    }

    #[test]
    fn test_to_device_limit_resolution() {
        let config = SlidingSyncConfig::default();
        assert_eq!(config.to_device_limit(None), 100);
        assert_eq!(config.to_device_limit(Some(0)), 100);
        assert_eq!(config.to_device_limit(Some(5)), 5);
        assert_eq!(config.to_device_limit(Some(50_000)), 1000);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "to_device_default_limit = 25").unwrap();
        writeln!(file, "log = \"debug\"").unwrap();

        let config = SlidingSyncConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.to_device_default_limit, 25);
        assert_eq!(config.to_device_max_limit, 1000);
        assert_eq!(config.log, "debug");
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "to_device_default_limit = \"lots\"").unwrap();

        let err = SlidingSyncConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, MatrixonError::InvalidConfig(_)));
    }
}
