use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode, header::CONTENT_LENGTH};
use serde::Deserialize;

use crate::{
    config,
    error::PlaybackError,
    types::{CurrentPlaybackResponse, PlaybackSnapshot},
};

/// Playback endpoints of the player API. Every call is one request.
#[async_trait]
pub trait PlaybackApi: Send + Sync {
    async fn current_playback(&self, token: &str) -> Result<PlaybackSnapshot, PlaybackError>;

    async fn pause(&self, token: &str) -> Result<(), PlaybackError>;

    async fn resume(&self, token: &str) -> Result<(), PlaybackError>;

    async fn skip_to_next(&self, token: &str) -> Result<(), PlaybackError>;

    async fn skip_to_previous(&self, token: &str) -> Result<(), PlaybackError>;

    /// `percent` must be within `0..=100`.
    async fn set_volume(&self, token: &str, percent: u8) -> Result<(), PlaybackError>;
}

/// Without `episode` here the API reports podcast playback with a null item.
const ADDITIONAL_TYPES: &str = "track,episode";

/// Spotify Web API player client.
pub struct SpotifyPlayer {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl SpotifyPlayer {
    /// Creates a client for the Web API rooted at `api_url`.
    ///
    /// # Arguments
    ///
    /// * `api_url` - Base URL such as `https://api.spotify.com/v1`; a trailing
    ///   slash is ignored
    pub fn new(api_url: String) -> Self {
        SpotifyPlayer {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client for the configured Web API endpoint.
    pub fn from_env() -> Self {
        Self::new(config::spotify_api_url())
    }

    async fn command(
        &self,
        method: Method,
        path: &str,
        token: &str,
    ) -> Result<(), PlaybackError> {
        let res = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        check_status(res).await.map(|_| ())
    }
}

async fn check_status(res: Response) -> Result<Response, PlaybackError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
    Err(PlaybackError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl PlaybackApi for SpotifyPlayer {
    async fn current_playback(&self, token: &str) -> Result<PlaybackSnapshot, PlaybackError> {
        let res = self
            .client
            .get(format!("{}/me/player", self.api_url))
            .query(&[("additional_types", ADDITIONAL_TYPES)])
            .bearer_auth(token)
            .send()
            .await?;

        let res = check_status(res).await?;
        if res.status() == StatusCode::NO_CONTENT {
            return Ok(PlaybackSnapshot::idle());
        }

        let playback = res.json::<CurrentPlaybackResponse>().await?;
        Ok(PlaybackSnapshot::from(playback))
    }

    async fn pause(&self, token: &str) -> Result<(), PlaybackError> {
        self.command(Method::PUT, "/me/player/pause", token).await
    }

    async fn resume(&self, token: &str) -> Result<(), PlaybackError> {
        self.command(Method::PUT, "/me/player/play", token).await
    }

    async fn skip_to_next(&self, token: &str) -> Result<(), PlaybackError> {
        self.command(Method::POST, "/me/player/next", token).await
    }

    async fn skip_to_previous(&self, token: &str) -> Result<(), PlaybackError> {
        self.command(Method::POST, "/me/player/previous", token).await
    }

    async fn set_volume(&self, token: &str, percent: u8) -> Result<(), PlaybackError> {
        if percent > 100 {
            return Err(PlaybackError::InvalidVolume(percent));
        }
        let path = format!("/me/player/volume?volume_percent={}", percent);
        self.command(Method::PUT, &path, token).await
    }
}
