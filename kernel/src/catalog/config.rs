// Catalog Configuration Documents
//
// Raw, unvalidated shapes of the record catalog and the weekly timed
// schedule as they arrive from configuration. Validation happens while
// parsing into a `RecordCatalog`, one field at a time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// One catalog row as configured.
///
/// Numeric fields are kept wide so that out-of-range values reach the
/// parser and get reported instead of failing the whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEntry {
    #[serde(default)]
    pub trigger: Option<i64>,

    #[serde(default)]
    pub notify: Option<u32>,

    #[serde(default)]
    pub flags: Option<Vec<String>>,
}

/// Record ID → catalog row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogConfig {
    pub records: BTreeMap<u32, RecordEntry>,
}

/// Day (1-7, Sunday first) → four-hour block (1-6) → record ID.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleConfig {
    pub days: BTreeMap<u32, BTreeMap<u32, u32>>,
}

impl CatalogConfig {
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl ScheduleConfig {
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}
