#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::watch;

use trackteller::{
    error::{AuthError, GenerationError, PlaybackError},
    management::{
        AuthCoordinator, AuthSettings, InsightCache, InsightStore, MemoryTokenStore,
        playback::NowPlaying,
    },
    openai::InsightGenerator,
    spotify::{
        auth::{TokenExchange, UrlOpener},
        player::PlaybackApi,
    },
    types::{Album, ArtistRef, Image, InsightKey, MediaItem, PlaybackSnapshot, Session, TokenGrant, Track},
};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn session(expires_in: i64) -> Session {
    Session {
        access_token: "stored-access".to_string(),
        refresh_token: "stored-refresh".to_string(),
        expires_at: now() + expires_in,
    }
}

pub fn settings() -> AuthSettings {
    let mut settings = AuthSettings::new("client-id".to_string());
    settings.auth_url = "https://accounts.example.com/authorize".to_string();
    settings.callback_addr = "127.0.0.1:0".parse().unwrap();
    settings
}

pub fn coordinator(
    settings: AuthSettings,
    exchange: &Arc<FakeExchange>,
    store: &Arc<MemoryTokenStore>,
    browser: &Arc<FakeBrowser>,
) -> Arc<AuthCoordinator> {
    Arc::new(AuthCoordinator::new(
        settings,
        Arc::clone(exchange) as _,
        Arc::clone(store) as _,
        Arc::clone(browser) as _,
    ))
}

/// Coordinator restored from a stored session valid for an hour.
pub async fn connected_coordinator() -> Arc<AuthCoordinator> {
    let coordinator = coordinator(
        settings(),
        &Arc::new(FakeExchange::default()),
        &Arc::new(MemoryTokenStore::new(Some(session(3600)))),
        &Arc::new(FakeBrowser::default()),
    );
    assert!(coordinator.restore().await);
    coordinator
}

pub fn track(id: &str) -> PlaybackSnapshot {
    PlaybackSnapshot {
        track_id: Some(id.to_string()),
        is_playing: true,
        device_volume_percent: Some(50),
        item: Some(MediaItem::Track(Track {
            id: Some(id.to_string()),
            name: format!("Song {id}"),
            artists: vec![ArtistRef {
                name: "The Band".to_string(),
            }],
            album: Some(Album {
                name: "Record".to_string(),
                release_date: Some("1999".to_string()),
                images: vec![Image {
                    url: format!("https://img.example.com/{id}"),
                }],
            }),
            duration_ms: 180_000,
        })),
    }
}

pub fn key_of(id: &str) -> InsightKey {
    InsightKey::new(&format!("Song {id}"), "The Band", "Record 1999")
}

#[derive(Default)]
pub struct FakeExchange {
    pub exchanges: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub fail_exchange: AtomicBool,
    /// Lifetime of issued tokens; 0 means an hour.
    pub expires_in: AtomicI64,
    pub verifiers: Mutex<Vec<String>>,
}

impl FakeExchange {
    fn lifetime(&self) -> i64 {
        match self.expires_in.load(Ordering::SeqCst) {
            0 => 3600,
            secs => secs,
        }
    }
}

#[async_trait]
impl TokenExchange for FakeExchange {
    async fn exchange_code(
        &self,
        code: &str,
        _redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<TokenGrant, AuthError> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        self.verifiers.lock().unwrap().push(code_verifier.to_string());
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AuthError::Exchange("invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("access-{code}-{n}"),
            refresh_token: Some("fresh-refresh".to_string()),
            expires_in: self.lifetime(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::Refresh("invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("refreshed-{n}"),
            refresh_token: None,
            expires_in: self.lifetime(),
        })
    }
}

#[derive(Default)]
pub struct FakeBrowser {
    opened: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for FakeBrowser {
    fn open(&self, url: &str) -> Result<(), String> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Player whose state is set by the test. Controls mutate it the way the
/// real service would.
#[derive(Default)]
pub struct FakePlayer {
    current: Mutex<PlaybackSnapshot>,
    pub fetches: AtomicUsize,
    pub controls: Mutex<Vec<String>>,
    pub fail_controls: AtomicBool,
    pub fail_fetch: AtomicBool,
    /// Latency of every fetch.
    pub delay: Mutex<Option<Duration>>,
}

impl FakePlayer {
    pub fn playing(snapshot: PlaybackSnapshot) -> Self {
        let player = FakePlayer::default();
        player.set(snapshot);
        player
    }

    pub fn set(&self, snapshot: PlaybackSnapshot) {
        *self.current.lock().unwrap() = snapshot;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn controls(&self) -> Vec<String> {
        self.controls.lock().unwrap().clone()
    }

    fn control(&self, name: String, apply: impl FnOnce(&mut PlaybackSnapshot)) -> Result<(), PlaybackError> {
        if self.fail_controls.load(Ordering::SeqCst) {
            return Err(PlaybackError::Api {
                status: 404,
                message: "No active device found".to_string(),
            });
        }
        self.controls.lock().unwrap().push(name);
        apply(&mut self.current.lock().unwrap());
        Ok(())
    }
}

#[async_trait]
impl PlaybackApi for FakePlayer {
    async fn current_playback(&self, _token: &str) -> Result<PlaybackSnapshot, PlaybackError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PlaybackError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(self.current.lock().unwrap().clone())
    }

    async fn pause(&self, _token: &str) -> Result<(), PlaybackError> {
        self.control("pause".to_string(), |s| s.is_playing = false)
    }

    async fn resume(&self, _token: &str) -> Result<(), PlaybackError> {
        self.control("resume".to_string(), |s| s.is_playing = true)
    }

    async fn skip_to_next(&self, _token: &str) -> Result<(), PlaybackError> {
        self.control("next".to_string(), |_| {})
    }

    async fn skip_to_previous(&self, _token: &str) -> Result<(), PlaybackError> {
        self.control("previous".to_string(), |_| {})
    }

    async fn set_volume(&self, _token: &str, percent: u8) -> Result<(), PlaybackError> {
        self.control(format!("volume {percent}"), |s| {
            s.device_volume_percent = Some(percent)
        })
    }
}

/// Generator answering `insight about <track>`. Records what the display
/// showed while it was running when given an observer.
#[derive(Default)]
pub struct FakeGenerator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    /// Time every generation takes.
    pub delay: Mutex<Option<Duration>>,
    pub observer: OnceLock<watch::Receiver<NowPlaying>>,
    pub observed: Mutex<Vec<NowPlaying>>,
}

impl FakeGenerator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InsightGenerator for FakeGenerator {
    async fn generate(&self, key: &InsightKey) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(observer) = self.observer.get() {
            self.observed.lock().unwrap().push(observer.borrow().clone());
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Api {
                status: 429,
                message: "Rate limit reached".to_string(),
            });
        }
        Ok(format!("insight about {}", key.track))
    }
}

/// In-memory cache counting lookups and writes.
pub struct CountingStore {
    pub cache: InsightCache,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        CountingStore {
            cache: InsightCache::in_memory(),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

impl InsightStore for CountingStore {
    fn get(&self, key: &InsightKey) -> Option<String> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.cache.get(key)
    }

    fn put(&self, key: &InsightKey, insight: &str) {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.cache.put(key, insight);
    }
}
