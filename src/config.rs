//! Configuration management for Trackteller.
//!
//! This module handles loading and accessing configuration values from environment
//! variables and `.env` files. Credentials are the only required values; every
//! endpoint has a default that can be overridden for testing against a local
//! stand-in.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)
//!
//! Missing credentials never abort the process. Each accessor returns a
//! [`ConfigError`] that the owning subsystem reports when it is used.

use std::{env, net::Ipv4Addr, path::PathBuf, time::Duration};

use crate::error::ConfigError;

/// Loopback host the callback server binds to.
pub const CALLBACK_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Port registered with Spotify as part of the redirect URI.
pub const CALLBACK_PORT: u16 = 8888;

/// Path of the single route served by the callback server.
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes requested during authorization.
pub const SPOTIFY_SCOPES: [&str; 3] = [
    "user-read-playback-state",
    "user-modify-playback-state",
    "user-read-currently-playing",
];

/// Interval between two scheduled playback polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Delay before the extra refresh that follows a control action.
pub const RESYNC_DELAY: Duration = Duration::from_millis(500);

/// Access tokens expiring within this window are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 240;

/// How long an authorization attempt waits for the browser redirect.
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(120);

const APP_DIR: &str = "trackteller";

/// Loads environment variables from a `.env` file in the local data directory.
///
/// Creates the data directory if needed and loads `trackteller/.env` from the
/// platform-specific local data directory:
/// - Linux: `~/.local/share/trackteller/.env`
/// - macOS: `~/Library/Application Support/trackteller/.env`
/// - Windows: `%LOCALAPPDATA%/trackteller/.env`
///
/// A missing `.env` file is not an error; values may come from the process
/// environment instead.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created or an existing
/// `.env` file cannot be parsed.
pub async fn load_env() -> Result<(), String> {
    let path = data_dir().join(".env");
    if let Some(parent) = path.parent() {
        async_fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }

    if path.is_file() {
        dotenv::from_path(&path).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Root of every file Trackteller persists.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(APP_DIR);
    path
}

/// Location of the persisted session.
pub fn token_path() -> PathBuf {
    data_dir().join("cache").join("token.json")
}

/// Location of the insight database.
pub fn insights_db_path() -> PathBuf {
    data_dir().join("insights.sqlite")
}

/// Returns the Spotify client ID registered for this application.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if `SPOTIFY_CLIENT_ID` is unset or empty.
pub fn spotify_client_id() -> Result<String, ConfigError> {
    required("SPOTIFY_CLIENT_ID")
}

/// Returns the Spotify client secret registered for this application.
///
/// The secret is sent to the token endpoint only and never logged.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if `SPOTIFY_CLIENT_SECRET` is unset or empty.
pub fn spotify_client_secret() -> Result<String, ConfigError> {
    required("SPOTIFY_CLIENT_SECRET")
}

/// Returns the API key used for insight generation.
///
/// # Errors
///
/// Returns [`ConfigError::Missing`] if `OPENAI_API_KEY` is unset or empty.
pub fn openai_api_key() -> Result<String, ConfigError> {
    required("OPENAI_API_KEY")
}

/// Base URL of the Spotify Web API, e.g. `https://api.spotify.com/v1`.
pub fn spotify_api_url() -> String {
    optional("SPOTIFY_API_URL", "https://api.spotify.com/v1")
}

/// Spotify authorization endpoint the browser is sent to.
pub fn spotify_auth_url() -> String {
    optional("SPOTIFY_AUTH_URL", "https://accounts.spotify.com/authorize")
}

/// Spotify token endpoint used for code exchange and refresh.
pub fn spotify_token_url() -> String {
    optional("SPOTIFY_TOKEN_URL", "https://accounts.spotify.com/api/token")
}

/// Chat-completions endpoint used for insight generation.
pub fn openai_api_url() -> String {
    optional(
        "OPENAI_API_URL",
        "https://api.openai.com/v1/chat/completions",
    )
}

/// Model requested for insight generation.
pub fn openai_model() -> String {
    optional("OPENAI_MODEL", "gpt-4o")
}

/// Upper bound on the length of a generated insight, in tokens.
pub fn openai_max_tokens() -> u32 {
    env::var("OPENAI_MAX_TOKENS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(5000)
}

/// Whether `debug!` output is enabled.
pub fn debug_enabled() -> bool {
    env::var("TRACKTELLER_DEBUG").is_ok_and(|v| !v.is_empty() && v != "0")
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
