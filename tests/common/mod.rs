#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use game_release_tracker::cache::{CacheStats, CacheStore, Coverage, SqliteCache};
use game_release_tracker::clock::ManualClock;
use game_release_tracker::core::{GameRecord, PlatformRecord, PlatformRef, ReleaseWindow};
use game_release_tracker::providers::CatalogProvider;
use game_release_tracker::{FreshnessPolicy, ReleaseTracker, Result, SyncScope, TrackerError};

pub const TTL_SECS: i64 = 3600;

/// In-process catalog standing in for IGDB
#[derive(Default)]
pub struct StubCatalog {
    pub games: Mutex<Vec<GameRecord>>,
    pub platforms: Mutex<Vec<PlatformRecord>>,
    pub failing: AtomicBool,
    pub auth_failing: AtomicBool,
    pub upcoming_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub platform_calls: AtomicUsize,
}

impl StubCatalog {
    pub fn set_games(&self, games: Vec<GameRecord>) {
        *self.games.lock().unwrap() = games;
    }

    pub fn set_platforms(&self, platforms: Vec<PlatformRecord>) {
        *self.platforms.lock().unwrap() = platforms;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_auth_failing(&self, failing: bool) {
        self.auth_failing.store(failing, Ordering::SeqCst);
    }

    pub fn upcoming_calls(&self) -> usize {
        self.upcoming_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    fn outage(&self) -> Result<()> {
        if self.auth_failing.load(Ordering::SeqCst) {
            return Err(TrackerError::UpstreamAuth(
                "invalid_client for client_secret=s3cr3t".to_string(),
            ));
        }
        if self.failing.load(Ordering::SeqCst) {
            Err(TrackerError::UpstreamRequest("upstream returned HTTP 503".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CatalogProvider for StubCatalog {
    async fn fetch_upcoming(
        &self,
        window: ReleaseWindow,
        platform_ids: Option<&[u64]>,
        limit: usize,
    ) -> Result<Vec<GameRecord>> {
        self.upcoming_calls.fetch_add(1, Ordering::SeqCst);
        self.outage()?;

        Ok(self
            .games
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.falls_within(&window))
            .filter(|g| platform_ids.map_or(true, |ids| g.has_any_platform(ids)))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.outage()?;

        let needle = query.to_lowercase();
        Ok(self
            .games
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.name.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_platforms(&self) -> Result<Vec<PlatformRecord>> {
        self.platform_calls.fetch_add(1, Ordering::SeqCst);
        self.outage()?;
        Ok(self.platforms.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "stub"
    }

    async fn is_available(&self) -> bool {
        !self.failing.load(Ordering::SeqCst) && !self.auth_failing.load(Ordering::SeqCst)
    }
}

/// Cache store whose database cannot be reached
pub struct UnreachableCache;

impl UnreachableCache {
    fn down<T>() -> Result<T> {
        Err(TrackerError::CacheUnavailable(
            "cannot open /var/lib/tracker/private.db: permission denied".to_string(),
        ))
    }
}

#[async_trait]
impl CacheStore for UnreachableCache {
    async fn upsert_games(&self, _games: &[GameRecord]) -> Result<usize> {
        Self::down()
    }

    async fn upsert_platforms(&self, _platforms: &[PlatformRecord]) -> Result<usize> {
        Self::down()
    }

    async fn replace_games(&self, _games: &[GameRecord]) -> Result<usize> {
        Self::down()
    }

    async fn replace_platforms(&self, _platforms: &[PlatformRecord]) -> Result<usize> {
        Self::down()
    }

    async fn games_in_window(
        &self,
        _window: &ReleaseWindow,
        _platform_ids: Option<&[u64]>,
    ) -> Result<Vec<GameRecord>> {
        Self::down()
    }

    async fn search_games(&self, _query: &str, _limit: usize) -> Result<Vec<GameRecord>> {
        Self::down()
    }

    async fn get_game(&self, _id: u64) -> Result<Option<GameRecord>> {
        Self::down()
    }

    async fn platforms(&self) -> Result<Vec<PlatformRecord>> {
        Err(TrackerError::Database(rusqlite::Error::InvalidQuery))
    }

    async fn record_coverage(&self, _coverage: &Coverage) -> Result<()> {
        Self::down()
    }

    async fn coverage(&self, _scope: &str) -> Result<Option<Coverage>> {
        Self::down()
    }

    async fn ping(&self) -> Result<()> {
        Self::down()
    }

    async fn stats(&self) -> Result<CacheStats> {
        Self::down()
    }
}

/// Tracker over [`UnreachableCache`] and a healthy stub catalog
pub fn tracker_without_cache() -> (Arc<ReleaseTracker>, Arc<StubCatalog>) {
    let catalog = Arc::new(StubCatalog::default());
    let tracker = Arc::new(ReleaseTracker::new(
        Arc::new(UnreachableCache),
        catalog.clone(),
        Arc::new(ManualClock::new(Utc::now())),
        FreshnessPolicy::default(),
        SyncScope::default(),
    ));
    (tracker, catalog)
}

pub struct Harness {
    pub tracker: Arc<ReleaseTracker>,
    pub cache: Arc<SqliteCache>,
    pub catalog: Arc<StubCatalog>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Self {
        let cache = Arc::new(SqliteCache::new(":memory:").await.unwrap());
        let catalog = Arc::new(StubCatalog::default());
        let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(0)));

        let tracker = Arc::new(ReleaseTracker::new(
            cache.clone(),
            catalog.clone(),
            clock.clone(),
            FreshnessPolicy::new(Duration::seconds(TTL_SECS)),
            SyncScope::default(),
        ));

        Self {
            tracker,
            cache,
            catalog,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        use game_release_tracker::clock::Clock;
        self.clock.now()
    }

    /// Cache `games` as the result of an unfiltered `days_ahead` fetch made now
    pub async fn seed(&self, games: &[GameRecord], days_ahead: u32) {
        self.cache.upsert_games(games).await.unwrap();
        self.cache
            .record_coverage(&Coverage::new(None, days_ahead, 500, games.len(), self.now()))
            .await
            .unwrap();
    }
}

/// Game releasing `days` from `now`
pub fn game(id: u64, name: &str, now: DateTime<Utc>, days: i64) -> GameRecord {
    let mut game = GameRecord::new(id, name);
    game.first_release_date = Some(now + Duration::days(days));
    game.last_synced = now;
    game
}

pub fn on_platform(mut game: GameRecord, id: u64, name: &str) -> GameRecord {
    game.platforms.push(PlatformRef::new(id, name));
    game
}
