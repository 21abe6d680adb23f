//! Cache-backed synchronization between the upstream catalog and the cache store.
//!
//! Per query type the orchestrator picks one of two paths:
//!
//! - **fresh cache**: a fresh coverage entry spans the requested window and
//!   filter, no dated record in it is older than the TTL and no refresh was
//!   forced, so the cache answers directly;
//! - **refresh**: the provider is called, every returned record is stamped
//!   with the current time and upserted, the fetch's coverage is recorded,
//!   and the answer is re-read from the cache.
//!
//! Undated (TBA) games are returned with every window but never count as
//! coverage. When the refresh path fails upstream, previously cached records
//! are served instead. The error only surfaces when there is nothing cached to
//! fall back on. Search always takes the refresh path.

use std::sync::Arc;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStore, Coverage, FreshnessPolicy, ALL_PLATFORMS};
use crate::clock::Clock;
use crate::core::{GameRecord, PlatformRecord, ReleaseWindow};
use crate::error::{Result, TrackerError};
use crate::providers::CatalogProvider;

/// Where a result set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    /// Served from cache under a fresh coverage entry
    Cache,
    /// Fetched upstream and written through the cache
    Upstream,
    /// Upstream failed; served whatever the cache had
    StaleCache,
}

/// Records plus the path that produced them
#[derive(Debug, Clone)]
pub struct Synced<T> {
    pub records: Vec<T>,
    pub source: DataSource,
}

impl<T> Synced<T> {
    fn new(records: Vec<T>, source: DataSource) -> Self {
        Self { records, source }
    }
}

/// Outcome of a full forced sync
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub platforms: usize,
    pub games: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: f64,
}

/// Scope of a full sync
#[derive(Debug, Clone, Copy)]
pub struct SyncScope {
    pub days_ahead: u32,
    pub limit: usize,
}

impl Default for SyncScope {
    fn default() -> Self {
        Self {
            days_ahead: 180,
            limit: 500,
        }
    }
}

/// Decides between cache and upstream and reconciles fetched records
pub struct SyncOrchestrator {
    cache: Arc<dyn CacheStore>,
    provider: Arc<dyn CatalogProvider>,
    clock: Arc<dyn Clock>,
    policy: FreshnessPolicy,
}

impl SyncOrchestrator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        provider: Arc<dyn CatalogProvider>,
        clock: Arc<dyn Clock>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            cache,
            provider,
            clock,
            policy,
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub fn provider(&self) -> &Arc<dyn CatalogProvider> {
        &self.provider
    }

    /// Games releasing within `days_ahead` days, refreshed from upstream when needed
    pub async fn upcoming(
        &self,
        days_ahead: u32,
        platform_ids: Option<&[u64]>,
        limit: usize,
        force_refresh: bool,
    ) -> Result<Synced<GameRecord>> {
        let now = self.clock.now();
        let window = ReleaseWindow::days_ahead(now, days_ahead)?;
        let cached = self.cache.games_in_window(&window, platform_ids).await?;

        if !force_refresh && self.is_covered(platform_ids, days_ahead, limit, now).await? {
            let dated = cached.iter().filter(|g| !g.is_undated()).map(|g| g.last_synced);
            if !self.policy.any_stale(dated, now) {
                tracing::debug!("Serving {} upcoming games from cache", cached.len());
                return Ok(Synced::new(cached, DataSource::Cache));
            }
        }

        tracing::info!(
            "Refreshing upcoming games from {} (cached: {}, forced: {})",
            self.provider.name(),
            cached.len(),
            force_refresh
        );

        match self.provider.fetch_upcoming(window, platform_ids, limit).await {
            Ok(fetched) => {
                let fetched_count = fetched.len();
                self.store_games(fetched).await?;
                self.cache
                    .record_coverage(&Coverage::new(
                        platform_ids,
                        days_ahead,
                        limit,
                        fetched_count,
                        now,
                    ))
                    .await?;

                let refreshed = self.cache.games_in_window(&window, platform_ids).await?;
                Ok(Synced::new(refreshed, DataSource::Upstream))
            }
            Err(e) => self.degrade(e, cached, "upcoming games"),
        }
    }

    /// A fresh coverage entry for this filter, or for all platforms, spans the query
    async fn is_covered(
        &self,
        platform_ids: Option<&[u64]>,
        days_ahead: u32,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut scopes = vec![Coverage::scope_key(platform_ids)];
        if scopes[0] != ALL_PLATFORMS {
            scopes.push(ALL_PLATFORMS.to_string());
        }

        for scope in &scopes {
            if let Some(coverage) = self.cache.coverage(scope).await? {
                if !self.policy.is_stale(coverage.synced_at, now) && coverage.spans(days_ahead, limit) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Upstream search; results keep upstream order and are written to the cache
    pub async fn search(&self, query: &str, limit: usize) -> Result<Synced<GameRecord>> {
        match self.provider.search(query, limit).await {
            Ok(fetched) => {
                let stamped = self.store_games(fetched).await?;
                Ok(Synced::new(stamped, DataSource::Upstream))
            }
            Err(e) => {
                let cached = self.cache.search_games(query, limit).await?;
                self.degrade(e, cached, "search results")
            }
        }
    }

    /// Platform catalog, refreshed from upstream when needed
    pub async fn platforms(&self, force_refresh: bool) -> Result<Synced<PlatformRecord>> {
        let cached = self.cache.platforms().await?;
        let now = self.clock.now();

        if !force_refresh && self.policy.all_fresh(cached.iter().map(|p| p.last_synced), now) {
            tracing::debug!("Serving {} platforms from cache", cached.len());
            return Ok(Synced::new(cached, DataSource::Cache));
        }

        tracing::info!(
            "Refreshing platforms (cached: {}, forced: {})",
            cached.len(),
            force_refresh
        );

        match self.provider.list_platforms().await {
            Ok(fetched) => {
                let now = self.clock.now();
                let stamped: Vec<PlatformRecord> =
                    fetched.into_iter().map(|p| p.stamped(now)).collect();
                self.cache.upsert_platforms(&stamped).await?;
                Ok(Synced::new(self.cache.platforms().await?, DataSource::Upstream))
            }
            Err(e) => self.degrade(e, cached, "platforms"),
        }
    }

    /// Forced refresh of everything: platforms first, then the upcoming window.
    ///
    /// Each collection is replaced wholesale once its fetch succeeds, which is
    /// the only way records ever leave the cache.
    pub async fn sync_all(&self, scope: SyncScope) -> Result<SyncReport> {
        let started_at = self.clock.now();
        let start = Instant::now();
        tracing::info!("Starting full sync ({} days, limit {})", scope.days_ahead, scope.limit);

        let platforms: Vec<PlatformRecord> = self
            .provider
            .list_platforms()
            .await?
            .into_iter()
            .map(|p| p.stamped(started_at))
            .collect();
        let platform_count = self.cache.replace_platforms(&platforms).await?;

        let now = self.clock.now();
        let window = ReleaseWindow::days_ahead(now, scope.days_ahead)?;
        let games = self
            .provider
            .fetch_upcoming(window, None, scope.limit)
            .await?;
        let games: Vec<GameRecord> = games.into_iter().map(|g| g.stamped(now)).collect();
        let game_count = self.cache.replace_games(&games).await?;
        self.cache
            .record_coverage(&Coverage::new(None, scope.days_ahead, scope.limit, game_count, now))
            .await?;

        let report = SyncReport {
            platforms: platform_count,
            games: game_count,
            started_at,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
        };

        tracing::info!(
            "Full sync completed: {} platforms, {} games in {:.0}ms",
            report.platforms,
            report.games,
            report.duration_ms
        );
        Ok(report)
    }

    /// Stamp with the current time and upsert; returns the stamped records
    async fn store_games(&self, fetched: Vec<GameRecord>) -> Result<Vec<GameRecord>> {
        let now = self.clock.now();
        let stamped: Vec<GameRecord> = fetched.into_iter().map(|g| g.stamped(now)).collect();

        if !stamped.is_empty() {
            self.cache.upsert_games(&stamped).await?;
        }
        Ok(stamped)
    }

    fn degrade<T>(&self, error: TrackerError, cached: Vec<T>, what: &str) -> Result<Synced<T>> {
        if cached.is_empty() {
            tracing::error!(
                "{} failed for {} with nothing cached: {}",
                self.provider.name(),
                what,
                error
            );
            return Err(error);
        }

        tracing::warn!(
            "{} failed for {}, serving {} cached records: {}",
            self.provider.name(),
            what,
            cached.len(),
            error
        );
        Ok(Synced::new(cached, DataSource::StaleCache))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SqliteCache;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Provider returning canned data and counting calls
    #[derive(Default)]
    struct FakeCatalog {
        games: Vec<GameRecord>,
        platforms: Vec<PlatformRecord>,
        failing: AtomicBool,
        upcoming_calls: AtomicUsize,
        search_calls: AtomicUsize,
        platform_calls: AtomicUsize,
    }

    impl FakeCatalog {
        fn with_games(games: Vec<GameRecord>) -> Self {
            Self {
                games,
                ..Default::default()
            }
        }

        fn fail(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }

        fn check(&self) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                Err(TrackerError::UpstreamRequest("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CatalogProvider for FakeCatalog {
        async fn fetch_upcoming(
            &self,
            _window: ReleaseWindow,
            _platform_ids: Option<&[u64]>,
            limit: usize,
        ) -> Result<Vec<GameRecord>> {
            self.upcoming_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self.games.iter().take(limit).cloned().collect())
        }

        async fn search(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            let needle = query.to_lowercase();
            Ok(self
                .games
                .iter()
                .filter(|g| g.name.to_lowercase().contains(&needle))
                .take(limit)
                .cloned()
                .collect())
        }

        async fn list_platforms(&self) -> Result<Vec<PlatformRecord>> {
            self.platform_calls.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            Ok(self.platforms.clone())
        }

        fn name(&self) -> &str {
            "fake"
        }

        async fn is_available(&self) -> bool {
            !self.failing.load(Ordering::SeqCst)
        }
    }

    const TTL_SECS: i64 = 3600;

    async fn setup(
        catalog: FakeCatalog,
    ) -> (SyncOrchestrator, Arc<SqliteCache>, Arc<FakeCatalog>, Arc<ManualClock>) {
        let cache = Arc::new(SqliteCache::new(":memory:").await.unwrap());
        let catalog = Arc::new(catalog);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let orchestrator = SyncOrchestrator::new(
            cache.clone(),
            catalog.clone(),
            clock.clone(),
            FreshnessPolicy::new(Duration::seconds(TTL_SECS)),
        );
        (orchestrator, cache, catalog, clock)
    }

    fn releasing(id: u64, name: &str, now: DateTime<Utc>, days: i64) -> GameRecord {
        let mut game = GameRecord::new(id, name);
        game.first_release_date = Some(now + Duration::days(days));
        game
    }

    async fn cover(cache: &SqliteCache, platform_ids: Option<&[u64]>, days: u32, at: DateTime<Utc>) {
        cache
            .record_coverage(&Coverage::new(platform_ids, days, 500, 0, at))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_record_triggers_one_fetch() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        let stale = releasing(1, "Stale", now, 5)
            .stamped(now - Duration::seconds(TTL_SECS) - Duration::seconds(1));
        cache.upsert_games(&[stale]).await.unwrap();
        cover(&cache, None, 30, now).await;

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.source, DataSource::Upstream);
        // upstream returned nothing, the stale record is still cached
        assert_eq!(result.records.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_record_served_without_fetch() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        cache
            .upsert_games(&[releasing(1, "Fresh", now, 5).stamped(now)])
            .await
            .unwrap();
        cover(&cache, None, 30, now).await;

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.source, DataSource::Cache);
        assert_eq!(result.records[0].name, "Fresh");
    }

    #[tokio::test]
    async fn test_undated_records_do_not_count_as_coverage() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        cache
            .upsert_games(&[GameRecord::new(1, "Unannounced").stamped(now)])
            .await
            .unwrap();

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);
        // still returned with the window
        assert_eq!(result.records[0].name, "Unannounced");
    }

    #[tokio::test]
    async fn test_stale_undated_record_does_not_force_refresh() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        cache
            .upsert_games(&[GameRecord::new(1, "Someday").stamped(now - Duration::days(30))])
            .await
            .unwrap();
        cover(&cache, None, 30, now).await;

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(result.source, DataSource::Cache);
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_coverage_must_span_window_and_filter() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();
        cover(&cache, Some(&[6]), 30, now).await;

        // narrower window, same filter
        orchestrator.upcoming(7, Some(&[6]), 50, false).await.unwrap();
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 0);

        // wider window
        orchestrator.upcoming(90, Some(&[6]), 50, false).await.unwrap();
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);

        // a filtered fetch says nothing about other platforms
        orchestrator.upcoming(7, None, 50, false).await.unwrap();
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 2);

        // the unfiltered fetch just recorded covers any filter
        orchestrator.upcoming(7, Some(&[130]), 50, false).await.unwrap();
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_coverage_refetches() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        cover(&cache, None, 30, clock.now()).await;

        clock.advance(Duration::seconds(TTL_SECS + 1));
        orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_always_fetches() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        cache
            .upsert_games(&[releasing(1, "Fresh", now, 5).stamped(now)])
            .await
            .unwrap();

        orchestrator.upcoming(30, None, 50, true).await.unwrap();
        orchestrator.upcoming(30, None, 50, true).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_empty_cache_fetches_and_stamps() {
        let now = Utc::now();
        let catalog = FakeCatalog::with_games(vec![releasing(10, "New", now, 3).stamped(now - Duration::days(3))]);
        let (orchestrator, cache, catalog, clock) = setup(catalog).await;
        clock.set(now);

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.records.len(), 1);

        let stored = cache.get_game(10).await.unwrap().unwrap();
        assert_eq!(stored.last_synced, now);

        // second call inside TTL stays on the cache
        clock.advance(Duration::minutes(10));
        let again = orchestrator.upcoming(30, None, 50, false).await.unwrap();
        assert_eq!(again.source, DataSource::Cache);
        assert_eq!(catalog.upcoming_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_serves_stale_cache() {
        let (orchestrator, cache, catalog, clock) = setup(FakeCatalog::default()).await;
        let now = clock.now();

        cache
            .upsert_games(&[releasing(1, "Old news", now, 5).stamped(now - Duration::days(2))])
            .await
            .unwrap();
        catalog.fail();

        let result = orchestrator.upcoming(30, None, 50, false).await.unwrap();

        assert_eq!(result.source, DataSource::StaleCache);
        assert_eq!(result.records[0].name, "Old news");
    }

    #[tokio::test]
    async fn test_upstream_failure_without_cache_errors() {
        let (orchestrator, _cache, catalog, clock) = setup(FakeCatalog::default()).await;
        catalog.fail();

        let err = orchestrator.upcoming(30, None, 50, false).await.unwrap_err();

        assert!(matches!(err, TrackerError::UpstreamRequest(_)));
    }

    #[tokio::test]
    async fn test_search_bypasses_freshness_and_upserts() {
        let now = Utc::now();
        let catalog = FakeCatalog::with_games(vec![
            GameRecord::new(1, "Hades II"),
            GameRecord::new(2, "Hades"),
        ]);
        let (orchestrator, cache, catalog, clock) = setup(catalog).await;
        clock.set(now);

        orchestrator.search("hades", 10).await.unwrap();
        let result = orchestrator.search("hades", 10).await.unwrap();

        assert_eq!(catalog.search_calls.load(Ordering::SeqCst), 2);
        let names: Vec<&str> = result.records.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Hades II", "Hades"]);
        assert_eq!(cache.get_game(2).await.unwrap().unwrap().last_synced, now);
    }

    #[tokio::test]
    async fn test_search_failure_falls_back_to_cached_names() {
        let (orchestrator, cache, catalog, _clock) = setup(FakeCatalog::default()).await;
        cache
            .upsert_games(&[GameRecord::new(1, "Hollow Knight"), GameRecord::new(2, "Celeste")])
            .await
            .unwrap();
        catalog.fail();

        let result = orchestrator.search("hollow", 10).await.unwrap();
        assert_eq!(result.source, DataSource::StaleCache);
        assert_eq!(result.records.len(), 1);

        assert!(orchestrator.search("doom", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_platforms_refresh_and_cache() {
        let catalog = FakeCatalog {
            platforms: vec![
                PlatformRecord::new(6, "PC (Microsoft Windows)"),
                PlatformRecord::new(130, "Nintendo Switch"),
            ],
            ..Default::default()
        };
        let (orchestrator, _cache, catalog, clock) = setup(catalog).await;

        let first = orchestrator.platforms(false).await.unwrap();
        assert_eq!(first.source, DataSource::Upstream);
        assert_eq!(first.records.len(), 2);

        let second = orchestrator.platforms(false).await.unwrap();
        assert_eq!(second.source, DataSource::Cache);
        assert_eq!(catalog.platform_calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::seconds(TTL_SECS + 1));
        let third = orchestrator.platforms(false).await.unwrap();
        assert_eq!(third.source, DataSource::Upstream);
        assert_eq!(catalog.platform_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sync_all_replaces_collections() {
        let now = Utc::now();
        let catalog = FakeCatalog {
            games: vec![releasing(2, "Fresh pick", now, 20)],
            platforms: vec![PlatformRecord::new(167, "PlayStation 5")],
            ..Default::default()
        };
        let (orchestrator, cache, _catalog, clock) = setup(catalog).await;
        clock.set(now);

        cache.upsert_games(&[GameRecord::new(1, "Leftover")]).await.unwrap();
        cache
            .upsert_platforms(&[PlatformRecord::new(11, "Xbox")])
            .await
            .unwrap();

        let report = orchestrator.sync_all(SyncScope::default()).await.unwrap();

        assert_eq!(report.platforms, 1);
        assert_eq!(report.games, 1);
        assert!(cache.get_game(1).await.unwrap().is_none());
        assert_eq!(cache.get_game(2).await.unwrap().unwrap().last_synced, now);
        assert_eq!(cache.platforms().await.unwrap()[0].id, 167);

        let coverage = cache.coverage(ALL_PLATFORMS).await.unwrap().unwrap();
        assert_eq!(coverage.days_ahead, SyncScope::default().days_ahead);
        assert_eq!(coverage.synced_at.timestamp_micros(), now.timestamp_micros());
    }

    #[tokio::test]
    async fn test_sync_all_failure_keeps_cache() {
        let (orchestrator, cache, catalog, _clock) = setup(FakeCatalog::default()).await;
        cache.upsert_games(&[GameRecord::new(1, "Survivor")]).await.unwrap();
        catalog.fail();

        assert!(orchestrator.sync_all(SyncScope::default()).await.is_err());
        assert!(cache.get_game(1).await.unwrap().is_some());
    }
}
