use crate::{app::App, success};

pub async fn logout(app: &App) {
    app.coordinator.sign_out().await;
    success!("Disconnected from Spotify, stored session removed.");
}
