use clap::{Parser, Subcommand};
use game_release_tracker::{core::DEFAULT_COVER_SIZE, ReleaseTracker, Settings, UpcomingQuery};
use game_release_tracker::engine::parse_platform_ids;

#[derive(Parser)]
#[command(name = "game-tracker-cli")]
#[command(about = "Game Release Tracker CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database path (overrides DATABASE_URL)
    #[arg(short, long)]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List upcoming releases
    Upcoming {
        /// Days to look ahead
        #[arg(short, long, default_value = "90")]
        days_ahead: u32,

        /// Maximum results
        #[arg(short, long, default_value = "50")]
        limit: usize,

        /// Comma-separated platform ids
        #[arg(short, long)]
        platforms: Option<String>,

        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },

    /// Search games by name
    Search {
        /// Search query
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// List known platforms
    Platforms {
        /// Bypass the cache
        #[arg(long)]
        force: bool,
    },

    /// Refresh every cached collection from upstream
    Sync,

    /// Get cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(db) = cli.db {
        settings.database_url = db;
    }

    let tracker = ReleaseTracker::from_settings(&settings).await?;

    match cli.command {
        Commands::Upcoming { days_ahead, limit, platforms, force } => {
            let query = UpcomingQuery {
                days_ahead,
                limit,
                platform_ids: match platforms.as_deref() {
                    Some(raw) => parse_platform_ids(raw)?,
                    None => None,
                },
                force_refresh: force,
            };

            let games = tracker.get_upcoming(&query).await?;

            println!("📅 {} upcoming releases in the next {} days:", games.len(), days_ahead);
            for game in &games {
                let date = game
                    .first_release_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "TBA".to_string());
                let platforms: Vec<&str> = game.platforms.iter().map(|p| p.label()).collect();

                println!("   {}  {} [{}]", date, game.name, platforms.join(", "));
            }
        }

        Commands::Search { query, limit } => {
            println!("🔍 Searching for: {}", query);

            let games = tracker.search(&query, limit).await?;

            for (i, game) in games.iter().enumerate() {
                println!("   {}. {}", i + 1, game.display_name());
                if let Some(rating) = game.rating {
                    println!("      Rating: {:.0}/100", rating);
                }
                if let Some(cover) = game.cover_url(DEFAULT_COVER_SIZE) {
                    println!("      Cover: {}", cover);
                }
            }
        }

        Commands::Platforms { force } => {
            let platforms = tracker.list_platforms(force).await?;

            println!("🕹️ {} platforms:", platforms.len());
            for platform in &platforms {
                println!("   {:>4}  {:<8} {}", platform.id, platform.label(), platform.name);
            }
        }

        Commands::Sync => {
            println!("🔄 Syncing platforms and upcoming games...");

            let report = tracker.trigger_sync().wait().await?;

            println!(
                "✅ Synced {} platforms and {} games in {:.0}ms",
                report.platforms, report.games, report.duration_ms
            );
        }

        Commands::Stats => {
            let stats = tracker.cache_stats().await?;

            println!("📊 Cache Statistics:");
            println!("   Games: {}", stats.total_games);
            println!("   Platforms: {}", stats.total_platforms);

            if let Some(oldest) = stats.oldest_sync {
                println!("   Oldest sync: {}", oldest.format("%Y-%m-%d %H:%M:%S"));
            }

            if let Some(newest) = stats.newest_sync {
                println!("   Newest sync: {}", newest.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }

    Ok(())
}
