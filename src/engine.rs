use crate::cache::{CacheStats, CacheStore, FreshnessPolicy, SqliteCache};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::core::{release_order, GameRecord, HealthReport, PlatformRecord};
use crate::error::{Result, TrackerError};
use crate::providers::{CatalogProvider, IgdbProvider};
use crate::ratelimit::RateLimiter;
use crate::sync::{SyncOrchestrator, SyncReport, SyncScope};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

pub const MAX_DAYS_AHEAD: u32 = 365;
pub const MAX_UPCOMING_LIMIT: usize = 500;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const MIN_SEARCH_CHARS: usize = 2;

/// Query service answering read requests over the synchronized cache
pub struct ReleaseTracker {
    orchestrator: Arc<SyncOrchestrator>,
    sync_scope: SyncScope,
}

/// Upcoming-releases query parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpcomingQuery {
    pub days_ahead: u32,
    pub limit: usize,
    pub platform_ids: Option<Vec<u64>>,
    pub force_refresh: bool,
}

impl Default for UpcomingQuery {
    fn default() -> Self {
        Self {
            days_ahead: 90,
            limit: 50,
            platform_ids: None,
            force_refresh: false,
        }
    }
}

impl UpcomingQuery {
    pub fn validate(&self) -> Result<()> {
        if self.days_ahead < 1 || self.days_ahead > MAX_DAYS_AHEAD {
            return Err(TrackerError::Validation(format!(
                "days_ahead must be between 1 and {}",
                MAX_DAYS_AHEAD
            )));
        }
        if self.limit < 1 || self.limit > MAX_UPCOMING_LIMIT {
            return Err(TrackerError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_UPCOMING_LIMIT
            )));
        }
        Ok(())
    }
}

/// Parse `"6,48, 167"` into ids; an empty string means no filter
pub fn parse_platform_ids(raw: &str) -> Result<Option<Vec<u64>>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<u64>()
                .map_err(|_| TrackerError::Validation("Invalid platform IDs format".to_string()))
        })
        .collect::<Result<Vec<u64>>>()
        .map(Some)
}

/// Handle to a background sync task.
///
/// Await it with [`SyncHandle::wait`] or drop it to let the sync finish detached.
pub struct SyncHandle {
    inner: JoinHandle<Result<SyncReport>>,
}

impl SyncHandle {
    pub async fn wait(self) -> Result<SyncReport> {
        self.inner
            .await
            .map_err(|e| TrackerError::Other(format!("sync task failed: {}", e)))?
    }
}

impl ReleaseTracker {
    /// Build the production stack: SQLite cache, IGDB provider, shared rate limiter
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let cache = Arc::new(SqliteCache::new(&settings.database_url).await?);
        let limiter = Arc::new(RateLimiter::new(settings.requests_per_second)?);
        let spacing = limiter.interval();
        let provider = Arc::new(IgdbProvider::new(settings.igdb(), limiter, clock.clone())?);

        tracing::info!(
            "Release tracker ready (db: {}, ttl: {}s, one request per {:?})",
            settings.database_url,
            settings.cache_ttl,
            spacing
        );

        Ok(Self::new(
            cache,
            provider,
            clock,
            FreshnessPolicy::from_secs(settings.cache_ttl),
            settings.sync_scope(),
        ))
    }

    pub fn new(
        cache: Arc<dyn CacheStore>,
        provider: Arc<dyn CatalogProvider>,
        clock: Arc<dyn Clock>,
        policy: FreshnessPolicy,
        sync_scope: SyncScope,
    ) -> Self {
        Self {
            orchestrator: Arc::new(SyncOrchestrator::new(cache, provider, clock, policy)),
            sync_scope,
        }
    }

    /// Upcoming releases in `[now, now + days_ahead]`, soonest first, undated last
    pub async fn get_upcoming(&self, query: &UpcomingQuery) -> Result<Vec<GameRecord>> {
        query.validate()?;
        let start = Instant::now();

        let platform_ids = query.platform_ids.as_deref().filter(|ids| !ids.is_empty());

        let synced = self
            .orchestrator
            .upcoming(query.days_ahead, platform_ids, query.limit, query.force_refresh)
            .await?;

        let mut games: Vec<GameRecord> = synced
            .records
            .into_iter()
            .filter(|g| platform_ids.map_or(true, |ids| g.has_any_platform(ids)))
            .collect();
        games.sort_by(release_order);
        games.truncate(query.limit);

        tracing::info!(
            "Upcoming ({} days) -> {} games via {:?} in {:.1}ms",
            query.days_ahead,
            games.len(),
            synced.source,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(games)
    }

    /// Free-text search in upstream relevance order
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_CHARS {
            return Err(TrackerError::Validation(format!(
                "query must be at least {} characters",
                MIN_SEARCH_CHARS
            )));
        }
        if limit < 1 || limit > MAX_SEARCH_LIMIT {
            return Err(TrackerError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }

        let synced = self.orchestrator.search(query, limit).await?;
        let mut games = synced.records;
        games.truncate(limit);

        tracing::info!("Search {:?} -> {} games via {:?}", query, games.len(), synced.source);
        Ok(games)
    }

    /// Full platform catalog
    pub async fn list_platforms(&self, force_refresh: bool) -> Result<Vec<PlatformRecord>> {
        let synced = self.orchestrator.platforms(force_refresh).await?;
        tracing::debug!("Platforms -> {} via {:?}", synced.records.len(), synced.source);
        Ok(synced.records)
    }

    /// Start a forced refresh of every collection in the background
    pub fn trigger_sync(&self) -> SyncHandle {
        let orchestrator = self.orchestrator.clone();
        let scope = self.sync_scope;

        let inner = tokio::spawn(async move {
            let result = orchestrator.sync_all(scope).await;
            match &result {
                Err(e) if e.is_upstream() => {
                    tracing::warn!("Background sync aborted, cache left as it was: {}", e)
                }
                Err(e) => tracing::error!("Background sync failed: {}", e),
                Ok(_) => {}
            }
            result
        });

        SyncHandle { inner }
    }

    /// Upstream and database connectivity
    pub async fn health(&self) -> HealthReport {
        let database = match self.orchestrator.cache().ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Cache ping failed: {}", e);
                false
            }
        };
        let upstream_api = self.orchestrator.provider().is_available().await;

        HealthReport::new(upstream_api, database)
    }

    /// Get cache statistics
    pub async fn cache_stats(&self) -> Result<CacheStats> {
        self.orchestrator.cache().stats().await
    }
}
