use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::cache::{CacheStats, CacheStore, Coverage};
use crate::core::{GameRecord, PlatformRecord, ReleaseWindow};
use crate::error::{Result, TrackerError};

/// SQLite-backed cache store
///
/// Schema:
/// ```sql
/// CREATE TABLE games (
///     id INTEGER PRIMARY KEY,
///     name TEXT NOT NULL,
///     first_release_date INTEGER,   -- unix seconds, NULL when TBA
///     last_synced TEXT NOT NULL,    -- RFC 3339, UTC
///     data TEXT NOT NULL            -- full record as JSON
/// );
/// CREATE TABLE platforms (
///     id INTEGER PRIMARY KEY,
///     name TEXT NOT NULL,
///     abbreviation TEXT,
///     last_synced TEXT NOT NULL
/// );
/// CREATE TABLE sync_log (
///     scope TEXT PRIMARY KEY,       -- 'all' or sorted platform ids
///     days_ahead INTEGER NOT NULL,
///     fetch_limit INTEGER NOT NULL,
///     complete INTEGER NOT NULL,
///     synced_at TEXT NOT NULL
/// );
/// ```
///
/// Batch writes run in one transaction, so a reader sees either the whole
/// batch or none of it.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open (or create) the cache at `db_path`; `:memory:` is accepted
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| {
            TrackerError::CacheUnavailable(format!("cannot open {}: {}", db_path, e))
        })?;

        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS games (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                first_release_date INTEGER,
                last_synced TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_games_release ON games(first_release_date);
            CREATE INDEX IF NOT EXISTS idx_games_name ON games(name);
            CREATE INDEX IF NOT EXISTS idx_games_last_synced ON games(last_synced);

            CREATE TABLE IF NOT EXISTS platforms (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                abbreviation TEXT,
                last_synced TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_platforms_name ON platforms(name);

            CREATE TABLE IF NOT EXISTS sync_log (
                scope TEXT PRIMARY KEY,
                days_ahead INTEGER NOT NULL,
                fetch_limit INTEGER NOT NULL,
                complete INTEGER NOT NULL,
                synced_at TEXT NOT NULL
            );",
        )?;

        tracing::debug!("Opened cache database at {}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TrackerError::CacheUnavailable("connection lock poisoned".to_string()))
    }

    fn write_games(tx: &Transaction<'_>, games: &[GameRecord]) -> Result<usize> {
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO games (id, name, first_release_date, last_synced, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;

        for game in games {
            stmt.execute(params![
                game.id as i64,
                game.name,
                game.first_release_date.map(|d| d.timestamp()),
                format_timestamp(game.last_synced),
                serde_json::to_string(game)?,
            ])?;
        }

        Ok(games.len())
    }

    fn write_platforms(tx: &Transaction<'_>, platforms: &[PlatformRecord]) -> Result<usize> {
        let mut stmt = tx.prepare_cached(
            "INSERT OR REPLACE INTO platforms (id, name, abbreviation, last_synced)
             VALUES (?1, ?2, ?3, ?4)",
        )?;

        for platform in platforms {
            stmt.execute(params![
                platform.id as i64,
                platform.name,
                platform.abbreviation,
                format_timestamp(platform.last_synced),
            ])?;
        }

        Ok(platforms.len())
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn game_from_row(row: &Row<'_>) -> rusqlite::Result<GameRecord> {
    let json: String = row.get(0)?;
    serde_json::from_str(&json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

fn coverage_from_row(row: &Row<'_>) -> rusqlite::Result<Coverage> {
    let days_ahead: i64 = row.get(1)?;
    let fetch_limit: i64 = row.get(2)?;
    let synced_at: String = row.get(4)?;

    Ok(Coverage {
        scope: row.get(0)?,
        days_ahead: u32::try_from(days_ahead).unwrap_or(0),
        fetch_limit: usize::try_from(fetch_limit).unwrap_or(0),
        complete: row.get(3)?,
        synced_at: parse_timestamp(&synced_at, 4)?,
    })
}

fn platform_from_row(row: &Row<'_>) -> rusqlite::Result<PlatformRecord> {
    let id: i64 = row.get(0)?;
    let last_synced: String = row.get(3)?;

    Ok(PlatformRecord {
        id: id as u64,
        name: row.get(1)?,
        abbreviation: row.get(2)?,
        last_synced: parse_timestamp(&last_synced, 3)?,
    })
}

/// `%term%` with LIKE metacharacters escaped by `\`
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn upsert_games(&self, games: &[GameRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let written = Self::write_games(&tx, games)?;
        tx.commit()?;

        tracing::debug!("Upserted {} games", written);
        Ok(written)
    }

    async fn upsert_platforms(&self, platforms: &[PlatformRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let written = Self::write_platforms(&tx, platforms)?;
        tx.commit()?;

        tracing::debug!("Upserted {} platforms", written);
        Ok(written)
    }

    async fn replace_games(&self, games: &[GameRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let dropped = tx.execute("DELETE FROM games", [])?;
        tx.execute("DELETE FROM sync_log", [])?;
        let written = Self::write_games(&tx, games)?;
        tx.commit()?;

        tracing::info!("Replaced games collection ({} dropped, {} written)", dropped, written);
        Ok(written)
    }

    async fn replace_platforms(&self, platforms: &[PlatformRecord]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let dropped = tx.execute("DELETE FROM platforms", [])?;
        let written = Self::write_platforms(&tx, platforms)?;
        tx.commit()?;

        tracing::info!("Replaced platforms collection ({} dropped, {} written)", dropped, written);
        Ok(written)
    }

    async fn games_in_window(
        &self,
        window: &ReleaseWindow,
        platform_ids: Option<&[u64]>,
    ) -> Result<Vec<GameRecord>> {
        let conn = self.conn()?;

        // first_release_date is the earliest release, so anything starting
        // after the window end cannot have a release inside it
        let mut stmt = conn.prepare_cached(
            "SELECT data FROM games
             WHERE first_release_date IS NULL OR first_release_date <= ?1",
        )?;

        let candidates = stmt
            .query_map(params![window.end.timestamp()], game_from_row)?
            .collect::<rusqlite::Result<Vec<GameRecord>>>()?;

        Ok(candidates
            .into_iter()
            .filter(|game| game.falls_within(window))
            .filter(|game| match platform_ids {
                Some(ids) if !ids.is_empty() => game.has_any_platform(ids),
                _ => true,
            })
            .collect())
    }

    async fn search_games(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT data FROM games WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT ?2",
        )?;

        let games = stmt
            .query_map(
                params![like_pattern(query), i64::try_from(limit).unwrap_or(i64::MAX)],
                game_from_row,
            )?
            .collect::<rusqlite::Result<Vec<GameRecord>>>()?;

        Ok(games)
    }

    async fn get_game(&self, id: u64) -> Result<Option<GameRecord>> {
        let conn = self.conn()?;

        let game = conn
            .query_row(
                "SELECT data FROM games WHERE id = ?1",
                params![id as i64],
                game_from_row,
            )
            .optional()?;

        Ok(game)
    }

    async fn platforms(&self) -> Result<Vec<PlatformRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(
            "SELECT id, name, abbreviation, last_synced FROM platforms ORDER BY name",
        )?;

        let platforms = stmt
            .query_map([], platform_from_row)?
            .collect::<rusqlite::Result<Vec<PlatformRecord>>>()?;

        Ok(platforms)
    }

    async fn record_coverage(&self, coverage: &Coverage) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO sync_log (scope, days_ahead, fetch_limit, complete, synced_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                coverage.scope,
                i64::from(coverage.days_ahead),
                i64::try_from(coverage.fetch_limit).unwrap_or(i64::MAX),
                coverage.complete,
                format_timestamp(coverage.synced_at),
            ],
        )?;

        tracing::debug!("Recorded coverage for {} ({} days)", coverage.scope, coverage.days_ahead);
        Ok(())
    }

    async fn coverage(&self, scope: &str) -> Result<Option<Coverage>> {
        let conn = self.conn()?;

        let coverage = conn
            .query_row(
                "SELECT scope, days_ahead, fetch_limit, complete, synced_at
                 FROM sync_log WHERE scope = ?1",
                params![scope],
                coverage_from_row,
            )
            .optional()?;

        Ok(coverage)
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let conn = self.conn()?;

        let total_games: i64 = conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        let total_platforms: i64 =
            conn.query_row("SELECT COUNT(*) FROM platforms", [], |row| row.get(0))?;

        let (oldest, newest): (Option<String>, Option<String>) = conn.query_row(
            "SELECT MIN(ts), MAX(ts) FROM (
                SELECT last_synced AS ts FROM games
                UNION ALL
                SELECT last_synced AS ts FROM platforms
            )",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CacheStats {
            total_games: total_games as u64,
            total_platforms: total_platforms as u64,
            oldest_sync: oldest.as_deref().map(|s| parse_timestamp(s, 0)).transpose()?,
            newest_sync: newest.as_deref().map(|s| parse_timestamp(s, 1)).transpose()?,
        })
    }
}
