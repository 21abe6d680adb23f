//! # Game Release Tracker
//!
//! Upcoming video game releases backed by the IGDB catalog:
//! - Rate-limited IGDB client with client-credentials token lifecycle
//! - SQLite cache with per-record TTL freshness
//! - Sync orchestrator that degrades to stale cache when upstream fails
//! - Interfaces: Rust library, HTTP API, CLI
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use game_release_tracker::{ReleaseTracker, Settings, UpcomingQuery};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let tracker = ReleaseTracker::from_settings(&settings).await?;
//!
//!     let games = tracker.get_upcoming(&UpcomingQuery {
//!         days_ahead: 30,
//!         platform_ids: Some(vec![6]),
//!         ..Default::default()
//!     }).await?;
//!
//!     for game in games {
//!         println!("{}", game.display_name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod cache;
pub mod clock;
pub mod config;
pub mod providers;
pub mod ratelimit;
pub mod sync;
pub mod engine;
pub mod error;

#[cfg(feature = "server")]
pub mod api;

// Re-export primary types
pub use core::{GameRecord, GamesResponse, HealthReport, PlatformRecord, PlatformsResponse, ReleaseWindow};
pub use engine::{ReleaseTracker, SyncHandle, UpcomingQuery};
pub use config::Settings;
pub use error::{TrackerError, Result};
pub use cache::{CacheStore, FreshnessPolicy};
pub use sync::{DataSource, SyncOrchestrator, SyncReport, SyncScope};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
