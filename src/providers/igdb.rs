use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::clock::Clock;
use crate::core::{GameRecord, PlatformRecord, PlatformRef, ReleaseDate, ReleaseWindow};
use crate::error::{Result, TrackerError};
use crate::providers::CatalogProvider;
use crate::ratelimit::RateLimiter;

pub const DEFAULT_BASE_URL: &str = "https://api.igdb.com/v4";
pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";

/// Largest page the upstream accepts for a single query
pub const MAX_PAGE_SIZE: usize = 500;

/// Tokens are treated as expired this long before their declared expiry
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 300;

/// Declared lifetimes are capped here (Twitch issues roughly 60 days)
const MAX_TOKEN_LIFETIME_SECS: i64 = 86_400 * 60;

const GAME_FIELDS: &str = "name,summary,rating,first_release_date,cover.url,\
release_dates.date,release_dates.human,release_dates.platform.name,\
release_dates.platform.abbreviation,platforms.name,platforms.abbreviation";

/// Connection settings for the IGDB provider
#[derive(Debug, Clone)]
pub struct IgdbConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub token_url: String,
    pub timeout: Duration,
}

impl IgdbConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Bearer token lifecycle: `Unauthenticated -> Authenticated(expiry) -> Expired`.
///
/// `Expired` is entered either when the clock passes the (margin-adjusted)
/// expiry or when the upstream rejects the token with a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Authenticated {
        access_token: String,
        expires_at: DateTime<Utc>,
    },
    Expired,
}

impl TokenState {
    /// Move `Authenticated` to `Expired` once `now` reaches the expiry
    pub fn observe(&mut self, now: DateTime<Utc>) {
        if let TokenState::Authenticated { expires_at, .. } = self {
            if now >= *expires_at {
                *self = TokenState::Expired;
            }
        }
    }

    /// Usable token, if any
    pub fn token(&self) -> Option<&str> {
        match self {
            TokenState::Authenticated { access_token, .. } => Some(access_token),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct IgdbPlatform {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    abbreviation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgdbReleaseDate {
    id: u64,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    human: Option<String>,
    #[serde(default)]
    platform: Option<IgdbPlatform>,
}

#[derive(Debug, Deserialize)]
struct IgdbCover {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IgdbGame {
    id: u64,
    name: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    first_release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    release_dates: Vec<IgdbReleaseDate>,
    #[serde(default)]
    platforms: Vec<IgdbPlatform>,
    #[serde(default)]
    cover: Option<IgdbCover>,
}

impl From<IgdbPlatform> for PlatformRef {
    fn from(p: IgdbPlatform) -> Self {
        PlatformRef {
            id: p.id,
            name: p.name,
            abbreviation: p.abbreviation,
        }
    }
}

impl IgdbGame {
    fn into_record(self, synced_at: DateTime<Utc>) -> GameRecord {
        GameRecord {
            id: self.id,
            name: self.name,
            summary: self.summary,
            rating: self.rating.map(|r| r.clamp(0.0, 100.0)),
            first_release_date: self.first_release_date,
            platforms: self.platforms.into_iter().map(PlatformRef::from).collect(),
            release_dates: self
                .release_dates
                .into_iter()
                .map(|rd| ReleaseDate {
                    id: rd.id,
                    date: rd.date,
                    human: rd.human,
                    platform: rd.platform.map(PlatformRef::from),
                })
                .collect(),
            cover: self.cover.and_then(|c| c.url),
            last_synced: synced_at,
        }
    }
}

/// Outcome of a single HTTP attempt, before retry policy is applied
#[derive(Debug)]
enum AttemptError {
    Unauthorized,
    Transient(String),
    Fatal(String),
}

/// IGDB (Twitch) catalog provider
pub struct IgdbProvider {
    client: Client,
    config: IgdbConfig,
    limiter: Arc<RateLimiter>,
    clock: Arc<dyn Clock>,
    token: Mutex<TokenState>,
}

impl IgdbProvider {
    /// Create new IGDB provider sharing the process-wide rate limiter
    pub fn new(config: IgdbConfig, limiter: Arc<RateLimiter>, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            config,
            limiter,
            clock,
            token: Mutex::new(TokenState::Unauthenticated),
        })
    }

    /// Current token lifecycle state
    pub async fn token_state(&self) -> TokenState {
        let mut state = self.token.lock().await;
        state.observe(self.clock.now());
        state.clone()
    }

    /// Exchange client credentials for a fresh bearer token
    pub async fn authenticate(&self) -> Result<String> {
        let mut state = self.token.lock().await;
        self.exchange_credentials(&mut state).await
    }

    async fn exchange_credentials(&self, state: &mut TokenState) -> Result<String> {
        tracing::info!("Fetching new IGDB access token");

        let response = self
            .client
            .post(&self.config.token_url)
            .query(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                *state = TokenState::Unauthenticated;
                tracing::error!("Token request failed: {}", e);
                TrackerError::UpstreamAuth("token endpoint unreachable".to_string())
            })?;

        if !response.status().is_success() {
            *state = TokenState::Unauthenticated;
            tracing::error!("Token endpoint returned HTTP {}", response.status());
            return Err(TrackerError::UpstreamAuth(format!(
                "credential exchange rejected (HTTP {})",
                response.status().as_u16()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            *state = TokenState::Unauthenticated;
            tracing::error!("Token response was not understood: {}", e);
            TrackerError::UpstreamAuth("malformed token response".to_string())
        })?;

        let expires_at = self
            .clock
            .now()
            .checked_add_signed(token_lifetime(token.expires_in))
            .ok_or_else(|| {
                *state = TokenState::Unauthenticated;
                TrackerError::UpstreamAuth("malformed token response".to_string())
            })?;

        *state = TokenState::Authenticated {
            access_token: token.access_token.clone(),
            expires_at,
        };

        tracing::info!("Obtained IGDB access token (valid until {})", expires_at);
        Ok(token.access_token)
    }

    /// Cached token, refreshing it when missing or expired
    async fn bearer_token(&self) -> Result<String> {
        let mut state = self.token.lock().await;
        state.observe(self.clock.now());

        if let Some(token) = state.token() {
            return Ok(token.to_string());
        }
        self.exchange_credentials(&mut state).await
    }

    /// Mark `rejected` as expired unless another caller already replaced it
    async fn expire_token(&self, rejected: &str) {
        let mut state = self.token.lock().await;
        if state.token() == Some(rejected) {
            *state = TokenState::Expired;
        }
    }

    /// POST an Apicalypse query, applying the retry policy:
    /// one token refresh on 401, one retry on transport errors, 429 and 5xx.
    async fn post_query(&self, endpoint: &str, body: &str) -> Result<Vec<serde_json::Value>> {
        let mut refreshed = false;
        let mut retried = false;

        loop {
            self.limiter.acquire().await;
            let token = self.bearer_token().await?;

            match self.send_once(endpoint, body, &token).await {
                Ok(values) => return Ok(values),
                Err(AttemptError::Unauthorized) if !refreshed => {
                    tracing::warn!("IGDB rejected bearer token on /{}, refreshing", endpoint);
                    refreshed = true;
                    self.expire_token(&token).await;
                }
                Err(AttemptError::Unauthorized) => {
                    return Err(TrackerError::UpstreamAuth(
                        "token rejected after refresh".to_string(),
                    ));
                }
                Err(AttemptError::Transient(reason)) if !retried => {
                    tracing::warn!("IGDB /{} failed ({}), retrying once", endpoint, reason);
                    retried = true;
                }
                Err(AttemptError::Transient(reason)) | Err(AttemptError::Fatal(reason)) => {
                    tracing::error!("IGDB /{} failed: {}", endpoint, reason);
                    return Err(TrackerError::UpstreamRequest(reason));
                }
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        body: &str,
        token: &str,
    ) -> std::result::Result<Vec<serde_json::Value>, AttemptError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let response = self
            .client
            .post(&url)
            .header("Client-ID", &self.config.client_id)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "text/plain")
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request to /{} failed: {}", endpoint, e)))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AttemptError::Unauthorized);
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(AttemptError::Transient(format!("/{} returned HTTP {}", endpoint, status)));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(format!("/{} returned HTTP {}", endpoint, status)));
        }

        response
            .json::<Vec<serde_json::Value>>()
            .await
            .map_err(|e| AttemptError::Fatal(format!("/{} returned malformed JSON: {}", endpoint, e)))
    }
}

/// Usable lifetime for a declared `expires_in`, minus the safety margin
fn token_lifetime(expires_in: i64) -> ChronoDuration {
    let declared = expires_in.clamp(0, MAX_TOKEN_LIFETIME_SECS);
    ChronoDuration::seconds((declared - TOKEN_EXPIRY_MARGIN_SECS).max(declared / 2))
}

/// Decode each element on its own, skipping the ones that do not parse
fn decode_lenient<T: DeserializeOwned>(endpoint: &str, values: Vec<serde_json::Value>) -> Vec<T> {
    let total = values.len();
    let decoded: Vec<T> = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping malformed /{} record: {}", endpoint, e);
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::warn!("Kept {} of {} /{} records", decoded.len(), total, endpoint);
    }
    decoded
}

fn upcoming_query(window: &ReleaseWindow, platform_ids: Option<&[u64]>, limit: usize) -> String {
    let mut filter = format!(
        "where release_dates.date >= {} & release_dates.date <= {}",
        window.start.timestamp(),
        window.end.timestamp()
    );

    if let Some(ids) = platform_ids.filter(|ids| !ids.is_empty()) {
        let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        filter.push_str(&format!(" & release_dates.platform = ({})", joined));
    }

    format!(
        "fields {}; {}; sort first_release_date asc; limit {};",
        GAME_FIELDS,
        filter,
        limit.clamp(1, MAX_PAGE_SIZE)
    )
}

fn search_query(term: &str, limit: usize) -> String {
    let escaped = term.trim().replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "search \"{}\"; fields {}; limit {};",
        escaped,
        GAME_FIELDS,
        limit.clamp(1, MAX_PAGE_SIZE)
    )
}

fn platforms_query() -> String {
    format!(
        "fields name,abbreviation; where category = (1,5,6); sort name asc; limit {};",
        MAX_PAGE_SIZE
    )
}

#[async_trait]
impl CatalogProvider for IgdbProvider {
    async fn fetch_upcoming(
        &self,
        window: ReleaseWindow,
        platform_ids: Option<&[u64]>,
        limit: usize,
    ) -> Result<Vec<GameRecord>> {
        let query = upcoming_query(&window, platform_ids, limit);
        tracing::debug!("Fetching upcoming games: {}", query);

        let values = self.post_query("games", &query).await?;
        let now = self.clock.now();
        let games: Vec<GameRecord> = decode_lenient::<IgdbGame>("games", values)
            .into_iter()
            .map(|g| g.into_record(now))
            .collect();

        tracing::info!("Fetched {} upcoming games from IGDB", games.len());
        Ok(games)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GameRecord>> {
        let values = self.post_query("games", &search_query(query, limit)).await?;
        let now = self.clock.now();

        Ok(decode_lenient::<IgdbGame>("games", values)
            .into_iter()
            .map(|g| g.into_record(now))
            .collect())
    }

    async fn list_platforms(&self) -> Result<Vec<PlatformRecord>> {
        let values = self.post_query("platforms", &platforms_query()).await?;
        let now = self.clock.now();

        Ok(decode_lenient::<IgdbPlatform>("platforms", values)
            .into_iter()
            .map(|p| PlatformRecord {
                id: p.id,
                name: p.name,
                abbreviation: p.abbreviation,
                last_synced: now,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "igdb"
    }

    async fn is_available(&self) -> bool {
        match self.bearer_token().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("IGDB unavailable: {}", e);
                false
            }
        }
    }
}
