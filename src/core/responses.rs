use serde::{Deserialize, Serialize};
use crate::core::{GameRecord, PlatformRecord};

/// `{games, count}` envelope for listing and search endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamesResponse {
    pub games: Vec<GameRecord>,
    pub count: usize,
}

impl GamesResponse {
    pub fn new(games: Vec<GameRecord>) -> Self {
        let count = games.len();
        Self { games, count }
    }
}

/// `{platforms, count}` envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsResponse {
    pub platforms: Vec<PlatformRecord>,
    pub count: usize,
}

impl PlatformsResponse {
    pub fn new(platforms: Vec<PlatformRecord>) -> Self {
        let count = platforms.len();
        Self { platforms, count }
    }
}

/// Connectivity report for `/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    pub status: String,
    pub upstream_api: bool,
    pub database: bool,
}

impl HealthReport {
    pub fn new(upstream_api: bool, database: bool) -> Self {
        let status = if upstream_api && database { "healthy" } else { "unhealthy" };
        Self {
            status: status.to_string(),
            upstream_api,
            database,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.upstream_api && self.database
    }
}
