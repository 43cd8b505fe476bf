// System Configuration
//
// Process-wide settings read once at startup. The enable flag gates every
// dispatch and scheduling operation; there is no runtime toggle.

use std::path::Path;

use chrono::{Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::record::{RecordId, MAX_RECORDS};

/// Japan Standard Time, the zone the reset schedule is anchored to.
pub const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Minimum spacing of throttled progress saves.
pub const DEFAULT_SAVE_INTERVAL_SECS: u32 = 15;

/// Record a player must have completed before daily and timed records apply.
pub const UNLOCK_RECORD: RecordId = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub enabled: bool,
    pub utc_offset_secs: i32,
    pub save_interval_secs: u32,
    pub unlock_record: RecordId,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            utc_offset_secs: JST_OFFSET_SECS,
            save_interval_secs: DEFAULT_SAVE_INTERVAL_SECS,
            unlock_record: UNLOCK_RECORD,
        }
    }
}

impl SystemConfig {
    /// Defaults with the system switched on.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = serde_json::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if FixedOffset::east_opt(self.utc_offset_secs).is_none() {
            return Err(ConfigError::Invalid(format!(
                "utc_offset_secs {} is outside +/-24h",
                self.utc_offset_secs
            )));
        }
        if usize::from(self.unlock_record) >= MAX_RECORDS {
            return Err(ConfigError::Invalid(format!(
                "unlock_record {} is outside the record space",
                self.unlock_record
            )));
        }
        Ok(())
    }

    /// Offset of the scheduling timezone. Falls back to UTC when invalid.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_secs).unwrap_or_else(|| {
            tracing::error!(
                offset = self.utc_offset_secs,
                "invalid timezone offset, scheduling in UTC"
            );
            Utc.fix()
        })
    }

    pub fn save_interval(&self) -> Duration {
        Duration::seconds(i64::from(self.save_interval_secs))
    }
}
