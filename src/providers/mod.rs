pub mod igdb;

use async_trait::async_trait;
use crate::core::{GameRecord, PlatformRecord, ReleaseWindow};
use crate::error::Result;

pub use igdb::{IgdbConfig, IgdbProvider, TokenState};

/// Trait for upstream game catalog providers
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Games with a release inside `window`, optionally restricted to platforms
    async fn fetch_upcoming(
        &self,
        window: ReleaseWindow,
        platform_ids: Option<&[u64]>,
        limit: usize,
    ) -> Result<Vec<GameRecord>>;

    /// Free-text search, in upstream relevance order
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>>;

    /// Full platform catalog
    async fn list_platforms(&self) -> Result<Vec<PlatformRecord>>;

    /// Get provider name
    fn name(&self) -> &str;

    /// Check if provider is reachable with the configured credentials
    async fn is_available(&self) -> bool;
}
