use serde::{Deserialize, Serialize};
use chrono::{DateTime, Datelike, Duration, Utc};
use std::cmp::Ordering;

use crate::error::{Result, TrackerError};

/// Default cover size used when rendering IGDB image URLs
pub const DEFAULT_COVER_SIZE: &str = "cover_big";

/// Platform reference embedded in a game record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformRef {
    pub id: u64,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub abbreviation: Option<String>,
}

impl PlatformRef {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            abbreviation: None,
        }
    }

    /// Abbreviation when known, else the full name
    pub fn label(&self) -> &str {
        self.abbreviation.as_deref().unwrap_or(&self.name)
    }
}

/// Per-platform release entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseDate {
    pub id: u64,

    #[serde(default)]
    pub date: Option<DateTime<Utc>>,

    /// Upstream human-readable form ("Q3 2026", "Nov 14, 2026")
    #[serde(default)]
    pub human: Option<String>,

    #[serde(default)]
    pub platform: Option<PlatformRef>,
}

/// A cached game as served to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    /// Upstream-assigned identifier, unique within the games collection
    pub id: u64,

    pub name: String,

    #[serde(default)]
    pub summary: Option<String>,

    /// Aggregated rating (0.0-100.0)
    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub first_release_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub platforms: Vec<PlatformRef>,

    #[serde(default)]
    pub release_dates: Vec<ReleaseDate>,

    /// Cover image URL fragment as returned upstream (`//images.igdb.com/.../t_thumb/x.jpg`)
    #[serde(default)]
    pub cover: Option<String>,

    /// When this record was last written from an upstream fetch
    #[serde(default = "Utc::now")]
    pub last_synced: DateTime<Utc>,
}

impl GameRecord {
    /// Create a new record with required fields
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            summary: None,
            rating: None,
            first_release_date: None,
            platforms: Vec::new(),
            release_dates: Vec::new(),
            cover: None,
            last_synced: Utc::now(),
        }
    }

    /// Replace the sync stamp
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_synced = at;
        self
    }

    /// True when the record carries no dated release information at all
    pub fn is_undated(&self) -> bool {
        self.first_release_date.is_none() && self.release_dates.iter().all(|rd| rd.date.is_none())
    }

    /// Whether this game belongs to the given release window.
    ///
    /// Undated (TBA) games are always members; they sort after dated ones.
    pub fn falls_within(&self, window: &ReleaseWindow) -> bool {
        if self.is_undated() {
            return true;
        }

        self.first_release_date
            .iter()
            .chain(self.release_dates.iter().filter_map(|rd| rd.date.as_ref()))
            .any(|ts| window.contains(*ts))
    }

    /// Whether any listed platform (or release-date platform) is in `platform_ids`
    pub fn has_any_platform(&self, platform_ids: &[u64]) -> bool {
        self.platforms.iter().any(|p| platform_ids.contains(&p.id))
            || self
                .release_dates
                .iter()
                .filter_map(|rd| rd.platform.as_ref())
                .any(|p| platform_ids.contains(&p.id))
    }

    /// Absolute cover URL at the given IGDB image size (e.g. `cover_big`, `720p`)
    pub fn cover_url(&self, size: &str) -> Option<String> {
        self.cover.as_ref().map(|fragment| {
            let sized = fragment.replace("t_thumb", &format!("t_{}", size));
            if sized.starts_with("//") {
                format!("https:{}", sized)
            } else {
                sized
            }
        })
    }

    /// Get display name (for logging/UI)
    pub fn display_name(&self) -> String {
        match self.first_release_date {
            Some(date) => format!("{} ({})", self.name, date.year()),
            None => self.name.clone(),
        }
    }
}

/// Ascending by first release; undated records last, ties broken by name
pub fn release_order(a: &GameRecord, b: &GameRecord) -> Ordering {
    match (a.first_release_date, b.first_release_date) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    }
}

/// Closed time window `[start, end]` used for upcoming-release queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReleaseWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window `[now, now + days]`; fails when the end is past chrono's range
    pub fn days_ahead(now: DateTime<Utc>, days: u32) -> Result<Self> {
        let end = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| TrackerError::Validation(format!("{} days ahead is out of range", days)))?;
        Ok(Self::new(now, end))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}
