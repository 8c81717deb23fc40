mod common;

use std::{
    net::TcpListener,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use reqwest::Url;
use tokio::time::{sleep, timeout};

use common::{FakeBrowser, FakeExchange, coordinator, session, settings};
use trackteller::{
    error::AuthError,
    management::{AuthCoordinator, AuthState, MemoryTokenStore, TokenStore},
    utils::generate_code_challenge,
};

struct Flow {
    exchange: Arc<FakeExchange>,
    store: Arc<MemoryTokenStore>,
    browser: Arc<FakeBrowser>,
    coordinator: Arc<AuthCoordinator>,
}

fn flow(stored: Option<trackteller::types::Session>) -> Flow {
    let exchange = Arc::new(FakeExchange::default());
    let store = Arc::new(MemoryTokenStore::new(stored));
    let browser = Arc::new(FakeBrowser::default());
    let coordinator = coordinator(settings(), &exchange, &store, &browser);
    Flow {
        exchange,
        store,
        browser,
        coordinator,
    }
}

fn query_param(url: &str, name: &str) -> String {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| panic!("{name} missing from {url}"))
}

async fn wait_for_state(coordinator: &AuthCoordinator, expected: AuthState) {
    timeout(Duration::from_secs(5), async {
        while coordinator.state().await != expected {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("coordinator never reached {expected:?}"));
}

#[tokio::test]
async fn test_browser_redirect_completes_authorization() {
    let f = flow(None);
    let mut authorized = f.coordinator.subscribe();

    let url = f.coordinator.authorize().await.unwrap();
    assert_eq!(f.browser.opened(), vec![url.clone()]);
    assert_eq!(f.coordinator.state().await, AuthState::Authorizing);
    assert!(!f.coordinator.is_authorized().await);

    let redirect_uri = query_param(&url, "redirect_uri");
    let state = query_param(&url, "state");
    assert!(redirect_uri.starts_with("http://127.0.0.1:"));
    assert!(redirect_uri.ends_with("/callback"));

    let page = reqwest::get(format!("{redirect_uri}?code=abc&state={state}"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("close"));

    timeout(Duration::from_secs(5), authorized.wait_for(|flag| *flag))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(f.coordinator.state().await, AuthState::Authenticated);
    assert_eq!(f.exchange.exchanges.load(Ordering::SeqCst), 1);
    assert_eq!(f.coordinator.access_token().await.unwrap(), "access-abc-1");

    let verifier = f.exchange.verifiers.lock().unwrap()[0].clone();
    assert_eq!(
        generate_code_challenge(&verifier),
        query_param(&url, "code_challenge")
    );

    let saved = f.store.load().await.unwrap();
    assert_eq!(saved.access_token, "access-abc-1");
    assert_eq!(saved.refresh_token, "fresh-refresh");
}

#[tokio::test]
async fn test_foreign_state_is_rejected_before_exchange() {
    let f = flow(None);
    let url = f.coordinator.authorize().await.unwrap();
    let redirect_uri = query_param(&url, "redirect_uri");

    reqwest::get(format!("{redirect_uri}?code=abc&state=forged"))
        .await
        .unwrap();

    wait_for_state(&f.coordinator, AuthState::Unauthenticated).await;
    assert_eq!(f.exchange.exchanges.load(Ordering::SeqCst), 0);
    assert!(!f.coordinator.is_authorized().await);
    assert!(f.coordinator.last_error().await.unwrap().contains("state"));
    assert!(f.store.load().await.is_none());
}

#[tokio::test]
async fn test_failed_code_exchange_stops_callback_server() {
    let f = flow(None);
    f.exchange.fail_exchange.store(true, Ordering::SeqCst);
    let url = f.coordinator.authorize().await.unwrap();
    let redirect_uri = query_param(&url, "redirect_uri");
    let state = query_param(&url, "state");

    reqwest::get(format!("{redirect_uri}?code=abc&state={state}"))
        .await
        .unwrap();

    wait_for_state(&f.coordinator, AuthState::Unauthenticated).await;
    assert_eq!(f.exchange.exchanges.load(Ordering::SeqCst), 1);
    assert!(!f.coordinator.is_authorized().await);
    assert!(
        f.coordinator
            .last_error()
            .await
            .unwrap()
            .contains("invalid_grant")
    );
    assert!(f.store.load().await.is_none());

    timeout(Duration::from_secs(5), async {
        while reqwest::get(&redirect_uri).await.is_ok() {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("callback server kept listening after the failed exchange");
}

#[tokio::test]
async fn test_denied_consent_returns_to_unauthenticated() {
    let f = flow(None);
    let url = f.coordinator.authorize().await.unwrap();
    let redirect_uri = query_param(&url, "redirect_uri");
    let state = query_param(&url, "state");

    reqwest::get(format!("{redirect_uri}?error=access_denied&state={state}"))
        .await
        .unwrap();

    wait_for_state(&f.coordinator, AuthState::Unauthenticated).await;
    assert_eq!(f.exchange.exchanges.load(Ordering::SeqCst), 0);
    assert!(
        f.coordinator
            .last_error()
            .await
            .unwrap()
            .contains("access_denied")
    );
}

#[tokio::test]
async fn test_occupied_port_fails_without_opening_browser() {
    let occupied = TcpListener::bind("127.0.0.1:0").unwrap();
    let exchange = Arc::new(FakeExchange::default());
    let store = Arc::new(MemoryTokenStore::default());
    let browser = Arc::new(FakeBrowser::default());
    let mut settings = settings();
    settings.callback_addr = occupied.local_addr().unwrap();
    let coordinator = coordinator(settings, &exchange, &store, &browser);

    let err = coordinator.authorize().await.unwrap_err();

    assert!(matches!(err, AuthError::PortInUse { .. }));
    assert!(browser.opened().is_empty());
    assert_eq!(coordinator.state().await, AuthState::Unauthenticated);
    assert!(!*coordinator.subscribe().borrow());
}

#[tokio::test]
async fn test_second_attempt_while_waiting_is_refused() {
    let f = flow(None);
    f.coordinator.authorize().await.unwrap();

    let err = f.coordinator.authorize().await.unwrap_err();
    assert!(matches!(err, AuthError::InProgress));
    assert_eq!(f.browser.opened().len(), 1);

    f.coordinator.sign_out().await;
    assert_eq!(f.coordinator.state().await, AuthState::Unauthenticated);
    assert!(f.coordinator.authorize().await.is_ok());
    f.coordinator.sign_out().await;
}

#[tokio::test]
async fn test_abandoned_attempt_times_out() {
    let exchange = Arc::new(FakeExchange::default());
    let store = Arc::new(MemoryTokenStore::default());
    let browser = Arc::new(FakeBrowser::default());
    let mut settings = settings();
    settings.authorization_timeout = Duration::from_millis(200);
    let coordinator = coordinator(settings, &exchange, &store, &browser);

    coordinator.authorize().await.unwrap();
    wait_for_state(&coordinator, AuthState::Unauthenticated).await;

    assert!(coordinator.last_error().await.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_callback_without_pending_attempt_is_rejected() {
    let f = flow(None);
    let err = f
        .coordinator
        .handle_callback("http://127.0.0.1:8888/callback?code=abc")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::NoPendingAuthorization));
}

#[tokio::test]
async fn test_restore_uses_valid_stored_session() {
    let f = flow(Some(session(3600)));

    assert!(f.coordinator.restore().await);
    assert!(*f.coordinator.subscribe().borrow());
    assert_eq!(f.coordinator.access_token().await.unwrap(), "stored-access");
    assert_eq!(f.exchange.refreshes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_restore_refreshes_session_about_to_expire() {
    let f = flow(Some(session(60)));

    assert!(f.coordinator.restore().await);
    assert_eq!(f.exchange.refreshes.load(Ordering::SeqCst), 1);

    let saved = f.store.load().await.unwrap();
    assert_eq!(saved.access_token, "refreshed-1");
    assert_eq!(saved.refresh_token, "stored-refresh");
}

#[tokio::test]
async fn test_restore_with_failing_refresh_stays_unauthenticated() {
    let f = flow(Some(session(60)));
    f.exchange.fail_refresh.store(true, Ordering::SeqCst);

    assert!(!f.coordinator.restore().await);
    assert_eq!(f.coordinator.state().await, AuthState::Unauthenticated);
}

#[tokio::test]
async fn test_published_flag_accounts_for_expiry() {
    let f = flow(Some(session(60)));
    // the refreshed token is already past its expiry
    f.exchange.expires_in.store(-5, Ordering::SeqCst);
    let authorized = f.coordinator.subscribe();

    assert!(!f.coordinator.restore().await);
    assert_eq!(f.coordinator.state().await, AuthState::Authenticated);
    assert!(!*authorized.borrow());

    f.exchange.expires_in.store(0, Ordering::SeqCst);
    assert_eq!(f.coordinator.access_token().await.unwrap(), "refreshed-2");
    assert!(f.coordinator.is_authorized().await);
    assert!(*authorized.borrow());
}

#[tokio::test]
async fn test_failed_refresh_degrades_to_unauthenticated() {
    let f = flow(Some(session(60)));
    // refreshed tokens land inside the margin again
    f.exchange.expires_in.store(100, Ordering::SeqCst);
    assert!(f.coordinator.restore().await);

    assert_eq!(f.coordinator.access_token().await.unwrap(), "refreshed-2");

    f.exchange.fail_refresh.store(true, Ordering::SeqCst);
    let err = f.coordinator.access_token().await.unwrap_err();

    assert!(matches!(err, AuthError::Refresh(_)));
    assert_eq!(f.coordinator.state().await, AuthState::Unauthenticated);
    assert!(!f.coordinator.is_authorized().await);
    assert!(!*f.coordinator.subscribe().borrow());
    assert!(matches!(
        f.coordinator.access_token().await,
        Err(AuthError::NotConnected)
    ));
}

#[tokio::test]
async fn test_sign_out_clears_stored_session() {
    let f = flow(Some(session(3600)));
    assert!(f.coordinator.restore().await);

    f.coordinator.sign_out().await;

    assert!(!f.coordinator.is_authorized().await);
    assert!(f.store.load().await.is_none());
}
