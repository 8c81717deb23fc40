//! Error types.
//!
//! Every subsystem recovers its own failures at its boundary and turns them
//! into observable state: a flag, a message or a log line. These enums are
//! what crosses that boundary.

use std::{io, net::SocketAddr};

/// A required configuration value is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Failures of the authorization and session lifecycle.
///
/// All of them leave the coordinator in the unauthenticated state.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    Config(#[from] ConfigError),
    #[error("Cannot listen on {addr}, is another instance running? ({source})")]
    PortInUse {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("An authorization attempt is already in progress")]
    InProgress,
    #[error("No authorization attempt is waiting for a callback")]
    NoPendingAuthorization,
    #[error("Malformed callback URL: {0}")]
    InvalidCallback(String),
    #[error("Authorization was denied: {0}")]
    ConsentDenied(String),
    #[error("Callback did not contain an authorization code")]
    MissingCode,
    #[error("Callback state does not match the pending authorization request")]
    StateMismatch,
    #[error("Authorization timed out waiting for the browser")]
    TimedOut,
    #[error("Code exchange failed: {0}")]
    Exchange(String),
    #[error("Token refresh failed: {0}")]
    Refresh(String),
    #[error("Not connected to Spotify")]
    NotConnected,
}

/// Transient failures talking to the player API.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PlaybackError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Player API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Volume must be between 0 and 100, got {0}")]
    InvalidVolume(u8),
}

/// Failures calling the text-generation service.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GenerationError {
    #[error("Missing credentials: {0}")]
    Config(#[from] ConfigError),
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Service returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Service returned no text")]
    EmptyResponse,
}

/// Failures of the insight database. Logged and treated as a cache miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Cannot prepare database location: {0}")]
    Io(#[from] io::Error),
    #[error("Insight cache is unavailable")]
    Unavailable,
}

/// Failures persisting the session.
#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
