//! Insight generation.
//!
//! One chat-completions request per invocation. There is no retry here: the
//! poller or a manual refresh decides whether to ask again.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{
    config, debug,
    error::{ConfigError, GenerationError},
    types::InsightKey,
};

/// Produces descriptive text about a track.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, key: &InsightKey) -> Result<String, GenerationError>;
}

const SYSTEM_PROMPT: &str =
    "You are a knowledgeable music expert who provides interesting insights about songs.";

/// Request text sent for `key`.
pub fn build_prompt(key: &InsightKey) -> String {
    format!(
        "Find information about this music track {track} - {artist} {album}, look for the following information:

1. Song details:
    What is this song about?
    Is there a general topic of the whole album?
    Provide full quotes to better describe the plot and set the context.

2. Analyze the musical part, highlight features.
3. Analyze the album cover picture.
4. Find information about the album:
    Is there a story related to writing the song or the album?
    Is there an influence of this song or the album?

5. Provide up to 3 related songs or albums you suggest to listen to after this one.",
        track = key.track,
        artist = key.artist,
        album = key.album,
    )
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Chat-completions client.
pub struct OpenAiGenerator {
    client: Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(api_url: String, api_key: Option<String>, model: String, max_tokens: u32) -> Self {
        OpenAiGenerator {
            client: Client::new(),
            api_url,
            api_key,
            model,
            max_tokens,
        }
    }

    /// Builds the generator from configuration.
    ///
    /// A missing API key does not fail here; every generation then reports
    /// [`GenerationError::Config`] instead.
    pub fn from_env() -> Self {
        Self::new(
            config::openai_api_url(),
            config::openai_api_key().ok(),
            config::openai_model(),
            config::openai_max_tokens(),
        )
    }
}

#[async_trait]
impl InsightGenerator for OpenAiGenerator {
    async fn generate(&self, key: &InsightKey) -> Result<String, GenerationError> {
        let Some(api_key) = &self.api_key else {
            return Err(ConfigError::Missing("OPENAI_API_KEY").into());
        };

        let prompt = build_prompt(key);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
        };

        debug!(
            "Requesting insight for {} - {} ({})",
            key.track, key.artist, key.album
        );
        let res = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response = res.json::<ChatResponse>().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}
