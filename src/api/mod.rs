//! # API Module
//!
//! HTTP handlers served by the local callback server while an authorization
//! attempt is pending.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the OAuth redirect from Spotify's authorization
//!   server. The handler does not judge the callback itself: it rebuilds the
//!   full redirect URL, hands it to the authorization coordinator through a
//!   channel and answers the browser with a static page. Whether the callback
//!   is accepted is reported inside the application, not in the page.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use axum::{Extension, Router, routing::get};
//! use trackteller::api::{CallbackTarget, callback};
//!
//! let app = Router::new()
//!     .route("/callback", get(callback).layer(Extension(target)));
//! ```

mod callback;

pub use callback::{CallbackSender, CallbackTarget, SUCCESS_PAGE, callback};
