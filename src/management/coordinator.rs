use std::{net::SocketAddr, sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::Url;
use tokio::{
    sync::{Mutex, mpsc, watch},
    time::timeout,
};

use crate::{
    config, debug,
    error::AuthError,
    management::TokenStore,
    server::CallbackServer,
    spotify::auth::{TokenExchange, UrlOpener, authorization_url},
    success,
    types::{AuthorizationRequest, Session},
    utils, warning,
};

/// Lifecycle of the connection to the account.
///
/// Any failure while authorizing or exchanging the code returns to
/// `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authorizing,
    ExchangingCode,
    Authenticated,
}

/// Fixed parameters of the authorization flow.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub client_id: String,
    pub auth_url: String,
    /// Where the callback server binds. Port `0` picks an ephemeral port.
    pub callback_addr: SocketAddr,
    pub scopes: Vec<String>,
    pub refresh_margin_secs: i64,
    pub authorization_timeout: Duration,
}

impl AuthSettings {
    /// Defaults from [`config`] for everything but the client id.
    pub fn new(client_id: String) -> Self {
        AuthSettings {
            client_id,
            auth_url: config::spotify_auth_url(),
            callback_addr: SocketAddr::from((config::CALLBACK_HOST, config::CALLBACK_PORT)),
            scopes: config::SPOTIFY_SCOPES.iter().map(|s| s.to_string()).collect(),
            refresh_margin_secs: config::REFRESH_MARGIN_SECS,
            authorization_timeout: config::AUTHORIZATION_TIMEOUT,
        }
    }
}

struct Inner {
    state: AuthState,
    session: Option<Session>,
    pending: Option<AuthorizationRequest>,
    server: Option<CallbackServer>,
    /// Bumped by every new attempt and by sign-out; results of older
    /// attempts are discarded.
    attempt: u64,
    last_error: Option<String>,
}

/// Owner of the session and of the authorization flow.
///
/// Consumers observe authorization through [`AuthCoordinator::subscribe`] and
/// obtain access tokens through [`AuthCoordinator::access_token`], which
/// refreshes the session when it is about to expire.
pub struct AuthCoordinator {
    settings: AuthSettings,
    exchange: Arc<dyn TokenExchange>,
    store: Arc<dyn TokenStore>,
    browser: Arc<dyn UrlOpener>,
    inner: Mutex<Inner>,
    refresh_gate: Mutex<()>,
    authorized: watch::Sender<bool>,
}

impl AuthCoordinator {
    /// Creates an unauthenticated coordinator. Call
    /// [`AuthCoordinator::restore`] to pick up a stored session.
    ///
    /// # Arguments
    ///
    /// * `settings` - Client id, endpoints, scopes and timing of the flow
    /// * `exchange` - Token endpoint used for code exchange and refresh
    /// * `store` - Where the session is persisted between runs
    /// * `browser` - Opens the consent page
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use trackteller::{
    ///     management::{AuthCoordinator, AuthSettings, MemoryTokenStore},
    ///     spotify::auth::{SpotifyAccounts, SystemBrowser},
    /// };
    ///
    /// let coordinator = AuthCoordinator::new(
    ///     AuthSettings::new("client-id".to_string()),
    ///     Arc::new(SpotifyAccounts::new(
    ///         "client-id".to_string(),
    ///         "client-secret".to_string(),
    ///         "https://accounts.spotify.com/api/token".to_string(),
    ///     )),
    ///     Arc::new(MemoryTokenStore::new(None)),
    ///     Arc::new(SystemBrowser),
    /// );
    /// ```
    pub fn new(
        settings: AuthSettings,
        exchange: Arc<dyn TokenExchange>,
        store: Arc<dyn TokenStore>,
        browser: Arc<dyn UrlOpener>,
    ) -> Self {
        let (authorized, _) = watch::channel(false);
        AuthCoordinator {
            settings,
            exchange,
            store,
            browser,
            inner: Mutex::new(Inner {
                state: AuthState::Unauthenticated,
                session: None,
                pending: None,
                server: None,
                attempt: 0,
                last_error: None,
            }),
            refresh_gate: Mutex::new(()),
            authorized,
        }
    }

    /// Picks up the session persisted by an earlier run.
    ///
    /// A stored session inside the refresh margin is refreshed first; if that
    /// fails the coordinator stays unauthenticated. Returns whether the
    /// coordinator is authorized afterwards.
    pub async fn restore(&self) -> bool {
        let Some(stored) = self.store.load().await else {
            debug!("No stored session to restore");
            return self.is_authorized().await;
        };

        let session = if stored.needs_refresh(now(), self.settings.refresh_margin_secs) {
            debug!("Stored session is about to expire, refreshing");
            match self.exchange.refresh(&stored.refresh_token).await {
                Ok(grant) => {
                    let session = Session::from_grant(grant, Some(stored.refresh_token), now());
                    self.persist(&session).await;
                    session
                }
                Err(e) => {
                    warning!("Stored session could not be refreshed: {}", e);
                    self.inner.lock().await.last_error = Some(e.to_string());
                    return false;
                }
            }
        } else {
            stored
        };

        let mut inner = self.inner.lock().await;
        if inner.state == AuthState::Unauthenticated {
            inner.state = AuthState::Authenticated;
            inner.session = Some(session);
            inner.last_error = None;
            self.publish(&inner);
        }
        drop(inner);
        self.is_authorized().await
    }

    /// Starts an authorization attempt and returns the consent URL.
    ///
    /// Binds the callback server, opens the consent page in the browser and
    /// waits in the background for the redirect. Allowed while
    /// unauthenticated and, for re-authorization, while authenticated.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InProgress`] if an attempt is already running
    /// - [`AuthError::PortInUse`] if the callback port is taken; the browser is
    ///   not opened and the state does not change
    pub async fn authorize(self: &Arc<Self>) -> Result<String, AuthError> {
        let mut inner = self.inner.lock().await;
        if matches!(
            inner.state,
            AuthState::Authorizing | AuthState::ExchangingCode
        ) {
            return Err(AuthError::InProgress);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let server = match CallbackServer::start(self.settings.callback_addr, sender).await {
            Ok(server) => server,
            Err(e) => {
                inner.last_error = Some(e.to_string());
                return Err(e);
            }
        };

        let redirect_uri = server.redirect_uri();
        let state = utils::generate_state();
        let code_verifier = utils::generate_code_verifier();
        let url = authorization_url(
            &self.settings.auth_url,
            &self.settings.client_id,
            &redirect_uri,
            &self.settings.scopes,
            &state,
            &utils::generate_code_challenge(&code_verifier),
        )?;

        inner.attempt += 1;
        let attempt = inner.attempt;
        inner.pending = Some(AuthorizationRequest {
            state,
            code_verifier,
            redirect_uri,
        });
        inner.server = Some(server);
        inner.state = AuthState::Authorizing;
        inner.last_error = None;
        self.publish(&inner);
        drop(inner);

        if let Err(e) = self.browser.open(&url) {
            warning!(
                "Failed to open browser ({}). Please navigate to the following URL manually:\n{}",
                e,
                url
            );
        }

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.await_callback(receiver, attempt).await;
        });

        Ok(url)
    }

    /// Completes the pending attempt with the redirect URL the provider sent.
    ///
    /// A `state` parameter that does not match the pending request rejects the
    /// callback before any token exchange. The callback server is stopped
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoPendingAuthorization`] if no attempt is waiting, or the
    /// reason the attempt failed.
    pub async fn handle_callback(&self, url: &str) -> Result<(), AuthError> {
        let mut inner = self.inner.lock().await;
        if inner.state != AuthState::Authorizing {
            return Err(AuthError::NoPendingAuthorization);
        }
        let Some(pending) = inner.pending.take() else {
            return Err(AuthError::NoPendingAuthorization);
        };

        let code = match parse_callback(url, &pending.state) {
            Ok(code) => code,
            Err(e) => {
                let server = self.reset(&mut inner, &e);
                drop(inner);
                stop_server(server).await;
                return Err(e);
            }
        };

        inner.state = AuthState::ExchangingCode;
        let attempt = inner.attempt;
        drop(inner);

        debug!("Exchanging authorization code");
        let result = self
            .exchange
            .exchange_code(&code, &pending.redirect_uri, &pending.code_verifier)
            .await
            .and_then(|grant| match grant.refresh_token {
                Some(_) => Ok(Session::from_grant(grant, None, now())),
                None => Err(AuthError::Exchange(
                    "token response did not contain a refresh token".to_string(),
                )),
            });

        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt {
            debug!("Discarding code exchange result of a cancelled attempt");
            return Err(AuthError::NotConnected);
        }

        match result {
            Ok(session) => {
                // persisted before anyone observes the flag
                self.persist(&session).await;
                inner.state = AuthState::Authenticated;
                inner.session = Some(session);
                inner.last_error = None;
                let server = inner.server.take();
                self.publish(&inner);
                drop(inner);

                stop_server(server).await;
                success!("Connected to Spotify");
                Ok(())
            }
            Err(e) => {
                let server = self.reset(&mut inner, &e);
                drop(inner);
                stop_server(server).await;
                Err(e)
            }
        }
    }

    /// Returns an access token valid for at least the refresh margin.
    ///
    /// Refreshes the session first when it is about to expire. A failed
    /// refresh drops the session and leaves the coordinator unauthenticated.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotConnected`] when not authenticated, or
    /// [`AuthError::Refresh`] when the refresh failed.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let _gate = self.refresh_gate.lock().await;

        let (refresh_token, attempt) = {
            let inner = self.inner.lock().await;
            let session = match (&inner.state, &inner.session) {
                (AuthState::Authenticated, Some(session)) => session,
                _ => return Err(AuthError::NotConnected),
            };
            if !session.needs_refresh(now(), self.settings.refresh_margin_secs) {
                return Ok(session.access_token.clone());
            }
            (session.refresh_token.clone(), inner.attempt)
        };

        debug!("Access token expires soon, refreshing");
        let refreshed = self.exchange.refresh(&refresh_token).await;

        let mut inner = self.inner.lock().await;
        if inner.state != AuthState::Authenticated || inner.attempt != attempt {
            return Err(AuthError::NotConnected);
        }

        match refreshed {
            Ok(grant) => {
                let session = Session::from_grant(grant, Some(refresh_token), now());
                inner.session = Some(session.clone());
                self.publish(&inner);
                drop(inner);

                self.persist(&session).await;
                Ok(session.access_token)
            }
            Err(e) => {
                let e = match e {
                    AuthError::Refresh(_) => e,
                    other => AuthError::Refresh(other.to_string()),
                };
                warning!("Session could not be refreshed, reconnect required: {}", e);
                let server = self.reset(&mut inner, &e);
                drop(inner);
                stop_server(server).await;
                Err(e)
            }
        }
    }

    /// Disconnects: cancels any pending attempt, drops the session and
    /// removes it from the token store.
    pub async fn sign_out(&self) {
        let mut inner = self.inner.lock().await;
        inner.attempt += 1;
        inner.state = AuthState::Unauthenticated;
        inner.session = None;
        inner.pending = None;
        inner.last_error = None;
        let server = inner.server.take();
        self.publish(&inner);
        drop(inner);

        stop_server(server).await;
        if let Err(e) = self.store.clear().await {
            warning!("Failed to remove stored session: {}", e);
        }
    }

    /// True iff authenticated with an access token that has not expired.
    pub async fn is_authorized(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state == AuthState::Authenticated
            && inner
                .session
                .as_ref()
                .is_some_and(|s| !s.is_expired(now()))
    }

    /// Transitions of the authorized flag.
    ///
    /// The flag is recomputed, expiry included, whenever the state or the
    /// session changes. Expiry alone does not flip it: a session that lapses
    /// unused reads `true` here until the next [`AuthCoordinator::access_token`]
    /// refreshes or drops it. Use [`AuthCoordinator::is_authorized`] for a
    /// point-in-time answer.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authorized.subscribe()
    }

    /// Current step of the authorization state machine.
    pub async fn state(&self) -> AuthState {
        self.inner.lock().await.state
    }

    /// Why the last attempt or refresh failed, until the next success.
    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    async fn await_callback(&self, mut receiver: mpsc::UnboundedReceiver<String>, attempt: u64) {
        match timeout(self.settings.authorization_timeout, receiver.recv()).await {
            Ok(Some(url)) => {
                if let Err(e) = self.handle_callback(&url).await {
                    warning!("Authorization failed: {}", e);
                }
            }
            // the server was stopped: the attempt ended some other way
            Ok(None) => {}
            Err(_) => {
                let mut inner = self.inner.lock().await;
                if inner.attempt == attempt && inner.state == AuthState::Authorizing {
                    let e = AuthError::TimedOut;
                    warning!("{}", e);
                    let server = self.reset(&mut inner, &e);
                    drop(inner);
                    stop_server(server).await;
                }
            }
        }
    }

    fn reset(&self, inner: &mut Inner, cause: &AuthError) -> Option<CallbackServer> {
        inner.state = AuthState::Unauthenticated;
        inner.session = None;
        inner.pending = None;
        inner.last_error = Some(cause.to_string());
        self.publish(inner);
        inner.server.take()
    }

    fn publish(&self, inner: &Inner) {
        let authorized = inner.state == AuthState::Authenticated
            && inner
                .session
                .as_ref()
                .is_some_and(|s| !s.is_expired(now()));
        self.authorized.send_if_modified(|current| {
            if *current == authorized {
                return false;
            }
            *current = authorized;
            true
        });
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session).await {
            warning!("Failed to save session: {}", e);
        }
    }
}

async fn stop_server(server: Option<CallbackServer>) {
    if let Some(server) = server {
        server.stop().await;
    }
}

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Extracts the authorization code from a redirect URL.
///
/// The `state` parameter, when present, must equal `expected_state`.
fn parse_callback(url: &str, expected_state: &str) -> Result<String, AuthError> {
    let url = Url::parse(url).map_err(|e| AuthError::InvalidCallback(e.to_string()))?;

    let mut code = None;
    let mut state = None;
    let mut denied = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => denied = Some(value.into_owned()),
            _ => {}
        }
    }

    if state.is_some_and(|s| s != expected_state) {
        return Err(AuthError::StateMismatch);
    }
    if let Some(reason) = denied {
        return Err(AuthError::ConsentDenied(reason));
    }
    code.filter(|c| !c.is_empty()).ok_or(AuthError::MissingCode)
}
