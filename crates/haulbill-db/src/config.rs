//! # Billing Configuration File
//!
//! Runtime settings for the billing pipeline.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     HAULBILL_DB_PATH=/var/lib/haulbill/haulbill.db                     │
//! │     HAULBILL_MAX_CONNECTIONS=8                                         │
//! │     HAULBILL_SEQUENCE_MAX_BLOCK=100                                    │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/haulbill/billing.toml (Linux)                            │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "haulbill.db"
//! max_connections = 5
//!
//! [matching]
//! source_location = 21
//! stream = 13
//! well_classification = 8
//! service_type = 5
//! substance = 3
//!
//! [allocation]
//! max_retries = 10
//! initial_backoff_ms = 5
//! max_backoff_ms = 200
//!
//! [sequences.ScaleTicket]
//! seed = 10000
//! suffix = "-LF"
//! max_request_block_size = 50
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use haulbill_core::{CriterionWeights, SequenceSettings, SequenceType};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("haulbill.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Retry policy for optimistic sequence counter updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Attempts after the first one before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_backoff() -> u64 {
    5
}

fn default_max_backoff() -> u64 {
    200
}

impl Default for AllocationSettings {
    fn default() -> Self {
        AllocationSettings {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl AllocationSettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

// =============================================================================
// Root
// =============================================================================

/// Complete billing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HaulbillConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub matching: CriterionWeights,

    #[serde(default)]
    pub allocation: AllocationSettings,

    /// Per sequence type, keyed by `SequenceType::config_key()`.
    #[serde(default)]
    pub sequences: BTreeMap<String, SequenceSettings>,
}

impl HaulbillConfig {
    /// Loads configuration: defaults → TOML file → environment, then
    /// validates the result.
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading billing config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> DbResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Checks value ranges and sequence table names.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.max_connections == 0 {
            return Err(DbError::Config("database.max_connections must be > 0".into()));
        }

        if self.matching.total() == 0 {
            return Err(DbError::Config(
                "matching weights must contain at least one positive value".into(),
            ));
        }

        for (key, settings) in &self.sequences {
            if SequenceType::from_config_key(key).is_none() {
                return Err(DbError::Config(format!("unknown sequence type '{}'", key)));
            }
            if settings.max_request_block_size <= 0 {
                return Err(DbError::Config(format!(
                    "sequences.{}.max_request_block_size must be > 0",
                    key
                )));
            }
            if settings.seed < 0 {
                return Err(DbError::Config(format!("sequences.{}.seed must be >= 0", key)));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("HAULBILL_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("HAULBILL_MAX_CONNECTIONS") {
            if let Ok(max) = value.parse::<u32>() {
                self.database.max_connections = max;
            }
        }

        if let Ok(value) = std::env::var("HAULBILL_SEQUENCE_MAX_BLOCK") {
            if let Ok(max) = value.parse::<i64>() {
                debug!(max_block = max, "Overriding sequence block size from environment");
                for sequence_type in SequenceType::ALL {
                    self.sequences
                        .entry(sequence_type.config_key().to_string())
                        .or_default()
                        .max_request_block_size = max;
                }
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "haulbill", "haulbill")
            .map(|dirs| dirs.config_dir().join("billing.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Numbering settings for a sequence type; defaults when not configured.
    pub fn sequence(&self, sequence_type: SequenceType) -> SequenceSettings {
        self.sequences
            .get(sequence_type.config_key())
            .cloned()
            .unwrap_or_default()
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = HaulbillConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.matching.source_location, 21);
        assert_eq!(config.allocation.max_retries, 10);

        let invoice = config.sequence(SequenceType::Invoice);
        assert_eq!(invoice.seed, 10000);
        assert_eq!(invoice.max_request_block_size, 50);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[database]
path = "billing.db"

[matching]
substance = 0

[sequences.ScaleTicket]
seed = 500
suffix = "-LF"
max_request_block_size = 20
padding = 6
"#
        )
        .unwrap();

        let config = HaulbillConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.database.path, PathBuf::from("billing.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.matching.substance, 0);
        assert_eq!(config.matching.stream, 13);

        let scale = config.sequence(SequenceType::ScaleTicket);
        assert_eq!(scale.seed, 500);
        assert_eq!(scale.suffix, "-LF");
        assert_eq!(scale.padding, 6);
        assert_eq!(config.sequence(SequenceType::WorkTicket), SequenceSettings::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = HaulbillConfig::default();
        config.sequences.insert(
            "ScaleTicket".to_string(),
            SequenceSettings {
                max_request_block_size: 0,
                ..SequenceSettings::default()
            },
        );
        assert!(matches!(config.validate(), Err(DbError::Config(_))));

        let mut config = HaulbillConfig::default();
        config.sequences.insert("Receipt".to_string(), SequenceSettings::default());
        assert!(config.validate().is_err());

        let mut config = HaulbillConfig::default();
        config.matching = CriterionWeights {
            source_location: 0,
            stream: 0,
            well_classification: 0,
            service_type: 0,
            substance: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database\npath = ").unwrap();
        assert!(matches!(
            HaulbillConfig::from_file(file.path()),
            Err(DbError::Config(_))
        ));
    }
}
