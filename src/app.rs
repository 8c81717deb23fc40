//! Production wiring.
//!
//! Builds the coordinator, the poller and the insight cache from
//! configuration. The cache works without any credentials, so commands that
//! only read it open it directly instead of going through [`App`].

use std::sync::Arc;

use crate::{
    config,
    error::AuthError,
    management::{
        AuthCoordinator, AuthSettings, FileTokenStore, InsightCache, PlaybackPoller,
        PollerSettings,
    },
    openai::OpenAiGenerator,
    spotify::{
        auth::{SpotifyAccounts, SystemBrowser},
        player::SpotifyPlayer,
    },
    warning,
};

/// Wiring of the coordinator, poller and cache shared by the commands.
pub struct App {
    pub coordinator: Arc<AuthCoordinator>,
    pub poller: Arc<PlaybackPoller>,
    pub cache: Arc<InsightCache>,
}

impl App {
    /// # Errors
    ///
    /// [`AuthError::Config`] when the Spotify credentials are missing. A
    /// missing OpenAI key is only warned about; generation reports it per
    /// track.
    pub fn from_env() -> Result<Self, AuthError> {
        let accounts = SpotifyAccounts::from_env()?;
        let settings = AuthSettings::new(accounts.client_id().to_string());

        let coordinator = Arc::new(AuthCoordinator::new(
            settings,
            Arc::new(accounts),
            Arc::new(FileTokenStore::default()),
            Arc::new(SystemBrowser),
        ));

        if let Err(e) = config::openai_api_key() {
            warning!("{}, insights cannot be generated", e);
        }

        let cache = Arc::new(InsightCache::open_default());
        let poller = Arc::new(PlaybackPoller::new(
            Arc::clone(&coordinator),
            Arc::new(SpotifyPlayer::from_env()),
            Arc::clone(&cache) as _,
            Arc::new(OpenAiGenerator::from_env()),
            PollerSettings::default(),
        ));

        Ok(App {
            coordinator,
            poller,
            cache,
        })
    }
}
