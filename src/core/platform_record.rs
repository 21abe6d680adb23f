use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

/// A cached gaming platform
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformRecord {
    /// Upstream-assigned identifier, unique within the platforms collection
    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub abbreviation: Option<String>,

    #[serde(default = "Utc::now")]
    pub last_synced: DateTime<Utc>,
}

impl PlatformRecord {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            abbreviation: None,
            last_synced: Utc::now(),
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = Some(abbreviation.into());
        self
    }

    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_synced = at;
        self
    }

    /// Short label, falling back to the full name
    pub fn label(&self) -> &str {
        self.abbreviation.as_deref().unwrap_or(&self.name)
    }
}
