pub mod game_record;
pub mod platform_record;
pub mod responses;

pub use game_record::{release_order, GameRecord, PlatformRef, ReleaseDate, ReleaseWindow, DEFAULT_COVER_SIZE};
pub use platform_record::PlatformRecord;
pub use responses::{GamesResponse, HealthReport, PlatformsResponse};
