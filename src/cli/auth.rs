use std::time::Duration;

use tokio::time::sleep;

use crate::{
    app::App,
    error, info,
    management::{AuthCoordinator, AuthState},
    success,
};

pub async fn auth(app: &App) {
    if app.coordinator.restore().await {
        info!("Already connected, authorizing again");
    }

    if let Err(e) = app.coordinator.authorize().await {
        error!("Cannot start authorization. Err: {}", e);
        return;
    }

    let pb = super::spinner("Waiting for authorization in the browser...");
    let outcome = wait_for_outcome(&app.coordinator).await;
    pb.finish_and_clear();

    match outcome {
        Ok(()) => success!("Authorization successful! Session saved."),
        Err(reason) => error!("Authorization failed: {}", reason),
    }
}

/// Waits until the pending attempt either authenticates or falls back to
/// unauthenticated.
pub(crate) async fn wait_for_outcome(coordinator: &AuthCoordinator) -> Result<(), String> {
    let mut authorized = coordinator.subscribe();
    loop {
        match coordinator.state().await {
            AuthState::Authenticated => return Ok(()),
            AuthState::Unauthenticated => {
                return Err(coordinator
                    .last_error()
                    .await
                    .unwrap_or_else(|| "attempt was cancelled".to_string()));
            }
            AuthState::Authorizing | AuthState::ExchangingCode => {}
        }

        tokio::select! {
            _ = authorized.changed() => {}
            _ = sleep(Duration::from_millis(250)) => {}
        }
    }
}
