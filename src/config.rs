//! Process configuration, read once from the environment at start-up.

use std::str::FromStr;
use std::time::Duration;

use crate::engine::{MAX_DAYS_AHEAD, MAX_UPCOMING_LIMIT};
use crate::error::{Result, TrackerError};
use crate::providers::igdb::{IgdbConfig, DEFAULT_BASE_URL, DEFAULT_TOKEN_URL};
use crate::sync::SyncScope;

#[derive(Debug, Clone)]
pub struct Settings {
    pub igdb_client_id: String,
    pub igdb_client_secret: String,
    pub igdb_base_url: String,
    pub igdb_token_url: String,
    pub database_url: String,
    /// Cache time-to-live in seconds
    pub cache_ttl: u64,
    /// Outbound requests per second, below the upstream's 4/s
    pub requests_per_second: f64,
    pub http_timeout: Duration,
    pub host: String,
    pub port: u16,
    pub sync_days_ahead: u32,
    pub sync_limit: usize,
}

impl Settings {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| TrackerError::Config(format!("{} must be set", key)))
        };

        let settings = Self {
            igdb_client_id: required("IGDB_CLIENT_ID")?,
            igdb_client_secret: required("IGDB_CLIENT_SECRET")?,
            igdb_base_url: lookup("IGDB_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            igdb_token_url: lookup("IGDB_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "gametracker.db".to_string()),
            cache_ttl: parse_or(&lookup, "CACHE_TTL", 3600)?,
            requests_per_second: parse_or(&lookup, "REQUESTS_PER_SECOND", 3.5)?,
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 8001)?,
            sync_days_ahead: parse_or(&lookup, "SYNC_DAYS_AHEAD", 180)?,
            sync_limit: parse_or(&lookup, "SYNC_LIMIT", 500)?,
        };

        check_range("SYNC_DAYS_AHEAD", settings.sync_days_ahead as usize, MAX_DAYS_AHEAD as usize)?;
        check_range("SYNC_LIMIT", settings.sync_limit, MAX_UPCOMING_LIMIT)?;

        Ok(settings)
    }

    pub fn igdb(&self) -> IgdbConfig {
        IgdbConfig {
            client_id: self.igdb_client_id.clone(),
            client_secret: self.igdb_client_secret.clone(),
            base_url: self.igdb_base_url.clone(),
            token_url: self.igdb_token_url.clone(),
            timeout: self.http_timeout,
        }
    }

    pub fn sync_scope(&self) -> SyncScope {
        SyncScope {
            days_ahead: self.sync_days_ahead,
            limit: self.sync_limit,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| TrackerError::Config(format!("{}={:?} is invalid: {}", key, raw, e))),
    }
}

fn check_range(key: &str, value: usize, max: usize) -> Result<()> {
    if value < 1 || value > max {
        return Err(TrackerError::Config(format!(
            "{}={} must be between 1 and {}",
            key, value, max
        )));
    }
    Ok(())
}
