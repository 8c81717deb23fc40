use axum::{Extension, Router, routing::get};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::{
    net::TcpListener,
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

use crate::{
    api::{self, CallbackSender, CallbackTarget},
    config, debug,
    error::AuthError,
    warning,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Loopback listener receiving the OAuth redirect.
///
/// Serves the single `/callback` route until [`CallbackServer::stop`] is
/// called or the value is dropped.
pub struct CallbackServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Binds `addr` and starts serving in a background task.
    ///
    /// Port `0` binds an ephemeral port; [`CallbackServer::redirect_uri`]
    /// reflects the port actually bound.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::PortInUse`] if the address cannot be bound.
    pub async fn start(addr: SocketAddr, sender: CallbackSender) -> Result<Self, AuthError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| AuthError::PortInUse { addr, source })?;
        let addr = listener.local_addr().unwrap_or(addr);

        let target = CallbackTarget {
            redirect_uri: redirect_uri_for(addr),
            sender,
        };
        let app = Router::new().route(
            config::CALLBACK_PATH,
            get(api::callback).layer(Extension(target)),
        );

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.await;
                })
                .await;
            if let Err(e) = served {
                warning!("Callback server stopped with error: {}", e);
            }
        });

        debug!("Callback server listening on {}", addr);
        Ok(CallbackServer {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Address actually bound. Differs from the requested one when port 0
    /// was asked for.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// The `redirect_uri` registered with the consent request, e.g.
    /// `http://127.0.0.1:8888/callback`.
    pub fn redirect_uri(&self) -> String {
        redirect_uri_for(self.addr)
    }

    /// Stops accepting connections and waits for the listener to close.
    ///
    /// Connections the browser keeps open are given [`SHUTDOWN_GRACE`] to
    /// finish before the server task is aborted.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(mut task) = self.task.take() {
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        debug!("Callback server on {} stopped", self.addr);
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn redirect_uri_for(addr: SocketAddr) -> String {
    format!("http://{}{}", addr, config::CALLBACK_PATH)
}
