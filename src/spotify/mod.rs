//! # Spotify Integration Module
//!
//! Clients for the two Spotify services Trackteller talks to, each behind a
//! narrow trait so the session and polling logic can run against fakes.
//!
//! ## Architecture
//!
//! ```text
//! AuthCoordinator ──► TokenExchange ──► accounts.spotify.com/api/token
//!        │
//!        └────────► UrlOpener ──────► system browser (consent page)
//!
//! PlaybackPoller ───► PlaybackApi ────► api.spotify.com/v1/me/player
//! ```
//!
//! ### Authentication
//!
//! [`auth`] implements the token endpoint side of the OAuth 2.0 authorization
//! code grant:
//! - **Authorization URL**: client id, redirect URI, scopes, `show_dialog`,
//!   the anti-CSRF `state` nonce and a PKCE S256 challenge
//! - **Code Exchange**: code + redirect URI + verifier for a token pair
//! - **Refresh**: refresh token for a new access token
//!
//! Client credentials travel as HTTP Basic authentication. Endpoint errors are
//! reduced to the `error`/`error_description` pair Spotify returns.
//!
//! ### Player
//!
//! [`player`] covers the playback surface the poller needs: fetch the current
//! playback, pause, resume, skip forward and back, and set the device volume.
//! `204 No Content` from the playback endpoint means nothing is playing and
//! maps to an idle snapshot. Nothing here retries; the poller's next tick is
//! the retry.
//!
//! ## API Coverage
//!
//! - `POST /api/token` - code exchange and refresh
//! - `GET /me/player` - current playback
//! - `PUT /me/player/pause`, `PUT /me/player/play`
//! - `POST /me/player/next`, `POST /me/player/previous`
//! - `PUT /me/player/volume?volume_percent={0..100}`

pub mod auth;
pub mod player;
