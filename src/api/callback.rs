use axum::{
    Extension,
    extract::RawQuery,
    response::Html,
};
use tokio::sync::mpsc;

use crate::debug;

/// Channel end receiving reconstructed redirect URLs.
pub type CallbackSender = mpsc::UnboundedSender<String>;

/// Where a callback is forwarded and how its URL is rebuilt.
#[derive(Debug, Clone)]
pub struct CallbackTarget {
    /// Redirect URI the provider was given, without query.
    pub redirect_uri: String,
    pub sender: CallbackSender,
}

pub const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Spotify Authorization</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; text-align: center; padding-top: 50px; }
        h1 { color: #1DB954; }
    </style>
</head>
<body>
    <h1>Authorization received</h1>
    <p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

pub async fn callback(
    RawQuery(query): RawQuery,
    Extension(target): Extension<CallbackTarget>,
) -> Html<&'static str> {
    let url = match query {
        Some(q) if !q.is_empty() => format!("{}?{}", target.redirect_uri, q),
        _ => target.redirect_uri.clone(),
    };

    if target.sender.send(url).is_err() {
        debug!("Callback arrived after the authorization attempt ended");
    }

    Html(SUCCESS_PAGE)
}
