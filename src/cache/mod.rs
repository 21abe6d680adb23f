pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crate::core::{GameRecord, PlatformRecord, ReleaseWindow};
use crate::error::Result;

pub use sqlite::SqliteCache;

/// Trait for the persistent games/platforms cache.
///
/// Every write is an upsert keyed by the upstream identifier: the stored
/// record is replaced as a whole, so applying the same record twice leaves
/// the store unchanged and concurrent writers resolve as last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Insert or replace games by id; returns how many were written
    async fn upsert_games(&self, games: &[GameRecord]) -> Result<usize>;

    /// Insert or replace platforms by id
    async fn upsert_platforms(&self, platforms: &[PlatformRecord]) -> Result<usize>;

    /// Drop every cached game and store `games` in its place, atomically.
    ///
    /// Recorded coverage is dropped with the games it described.
    async fn replace_games(&self, games: &[GameRecord]) -> Result<usize>;

    /// Drop every cached platform and store `platforms` in its place, atomically
    async fn replace_platforms(&self, platforms: &[PlatformRecord]) -> Result<usize>;

    /// Games inside `window`, optionally limited to those on any of `platform_ids`
    async fn games_in_window(
        &self,
        window: &ReleaseWindow,
        platform_ids: Option<&[u64]>,
    ) -> Result<Vec<GameRecord>>;

    /// Cached games whose name contains `query` (case-insensitive)
    async fn search_games(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>>;

    /// Get cached game by id
    async fn get_game(&self, id: u64) -> Result<Option<GameRecord>>;

    /// All cached platforms
    async fn platforms(&self) -> Result<Vec<PlatformRecord>>;

    /// Remember how far an upcoming-games fetch reached, replacing any
    /// earlier entry for the same scope
    async fn record_coverage(&self, coverage: &Coverage) -> Result<()>;

    /// Coverage recorded for `scope`, if any
    async fn coverage(&self, scope: &str) -> Result<Option<Coverage>>;

    /// Connectivity check
    async fn ping(&self) -> Result<()>;

    /// Get cache statistics
    async fn stats(&self) -> Result<CacheStats>;
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_games: u64,
    pub total_platforms: u64,
    pub oldest_sync: Option<DateTime<Utc>>,
    pub newest_sync: Option<DateTime<Utc>>,
}

/// Scope key of an upcoming-games fetch without a platform filter
pub const ALL_PLATFORMS: &str = "all";

/// Extent of one upcoming-games fetch.
///
/// Records alone cannot tell whether the cache answers a query: an undated
/// search hit matches every window, and a 7-day fetch says nothing about day
/// 120. The orchestrator only trusts the cache for windows and limits a fresh
/// coverage entry spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    /// [`ALL_PLATFORMS`] or the sorted platform ids, comma-separated
    pub scope: String,
    /// Window length fetched, counted from `synced_at`
    pub days_ahead: u32,
    /// Limit sent upstream
    pub fetch_limit: usize,
    /// Upstream returned fewer than `fetch_limit` records, so nothing was cut off
    pub complete: bool,
    pub synced_at: DateTime<Utc>,
}

impl Coverage {
    pub fn new(
        platform_ids: Option<&[u64]>,
        days_ahead: u32,
        fetch_limit: usize,
        fetched: usize,
        synced_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope: Self::scope_key(platform_ids),
            days_ahead,
            fetch_limit,
            complete: fetched < fetch_limit,
            synced_at,
        }
    }

    /// Normalized key for a platform filter
    pub fn scope_key(platform_ids: Option<&[u64]>) -> String {
        match platform_ids {
            Some(ids) if !ids.is_empty() => {
                let mut ids = ids.to_vec();
                ids.sort_unstable();
                ids.dedup();
                ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",")
            }
            _ => ALL_PLATFORMS.to_string(),
        }
    }

    /// Whether this fetch spans `days_ahead` days and `limit` results
    pub fn spans(&self, days_ahead: u32, limit: usize) -> bool {
        self.days_ahead >= days_ahead && (self.complete || limit <= self.fetch_limit)
    }
}

/// Time-to-live applied to cached records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    ttl: Duration,
}

impl FreshnessPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn from_secs(secs: u64) -> Self {
        let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
        Self::new(Duration::seconds(secs))
    }

    /// A record is stale once `now - last_synced > ttl`
    pub fn is_stale(&self, last_synced: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - last_synced > self.ttl
    }

    /// True when any of `stamps` is past the TTL
    pub fn any_stale<I>(&self, stamps: I, now: DateTime<Utc>) -> bool
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        stamps.into_iter().any(|stamp| self.is_stale(stamp, now))
    }

    /// True when at least one record exists and none of them is stale
    pub fn all_fresh<I>(&self, stamps: I, now: DateTime<Utc>) -> bool
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let mut seen = false;
        for stamp in stamps {
            if self.is_stale(stamp, now) {
                return false;
            }
            seen = true;
        }
        seen
    }
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from_secs(3600)
    }
}
