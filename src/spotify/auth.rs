use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::{config, error::AuthError, types::TokenGrant};

/// Token endpoint operations of the OAuth 2.0 authorization code grant.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges an authorization code for an access/refresh token pair.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError>;

    /// Obtains a new access token with a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// Opens URLs outside the application, normally in the user's browser.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), String>;
}

/// The system's default browser.
pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        webbrowser::open(url).map_err(|e| e.to_string())
    }
}

/// Client for the Spotify accounts service.
///
/// Authenticates to the token endpoint with HTTP Basic client credentials.
pub struct SpotifyAccounts {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl SpotifyAccounts {
    /// # Arguments
    ///
    /// * `client_id` - Application id from the developer dashboard
    /// * `client_secret` - Secret paired with `client_id`
    /// * `token_url` - Token endpoint used for both grant types
    pub fn new(client_id: String, client_secret: String, token_url: String) -> Self {
        SpotifyAccounts {
            client: Client::new(),
            token_url,
            client_id,
            client_secret,
        }
    }

    /// Builds the client from `SPOTIFY_CLIENT_ID` / `SPOTIFY_CLIENT_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if either credential is missing.
    pub fn from_env() -> Result<Self, AuthError> {
        Ok(Self::new(
            config::spotify_client_id()?,
            config::spotify_client_secret()?,
            config::spotify_token_url(),
        ))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn request_grant(&self, form: &[(&str, &str)]) -> Result<TokenGrant, String> {
        let res = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{} ({})", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("token endpoint returned {}", status),
            });
        }

        res.json::<TokenGrant>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TokenExchange for SpotifyAccounts {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError> {
        self.request_grant(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("code_verifier", code_verifier),
        ])
        .await
        .map_err(AuthError::Exchange)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        self.request_grant(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
        .map_err(AuthError::Refresh)
    }
}

/// Builds the URL the user is sent to for consent.
///
/// `show_dialog` forces the consent dialog even when the user approved the
/// application before, so a different account can be picked.
///
/// # Errors
///
/// Returns [`AuthError::InvalidCallback`] if `auth_url` is not a valid URL.
pub fn authorization_url(
    auth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    code_challenge: &str,
) -> Result<String, AuthError> {
    let scope = scopes.join(" ");
    let url = Url::parse_with_params(
        auth_url,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("show_dialog", "true"),
            ("state", state),
            ("code_challenge_method", "S256"),
            ("code_challenge", code_challenge),
        ],
    )
    .map_err(|e| AuthError::InvalidCallback(format!("authorization URL {}: {}", auth_url, e)))?;

    Ok(url.into())
}
