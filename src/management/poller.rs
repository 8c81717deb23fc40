use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config, debug,
    error::PlaybackError,
    management::{
        AuthCoordinator, InsightStore,
        playback::{Effect, GENERATING_TEXT, NowPlaying, reduce},
    },
    openai::InsightGenerator,
    spotify::player::PlaybackApi,
    types::InsightKey,
    warning,
};

/// Timing of the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    /// Delay of the single extra refresh after a successful control action.
    pub resync_delay: Duration,
}

impl Default for PollerSettings {
    fn default() -> Self {
        PollerSettings {
            interval: config::POLL_INTERVAL,
            resync_delay: config::RESYNC_DELAY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Pause,
    Resume,
    Next,
    Previous,
    Volume(u8),
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Control::Pause => write!(f, "Pause"),
            Control::Resume => write!(f, "Resume"),
            Control::Next => write!(f, "Skip to next"),
            Control::Previous => write!(f, "Skip to previous"),
            Control::Volume(percent) => write!(f, "Set volume to {}%", percent),
        }
    }
}

/// Mirrors the player's state while the account is authorized.
///
/// Fetches run one at a time: a scheduled tick that finds a fetch in flight
/// is skipped, an out-of-band refresh waits for it. Insight resolution for a
/// new track happens inside the tick that detected the change.
pub struct PlaybackPoller {
    auth: Arc<AuthCoordinator>,
    player: Arc<dyn PlaybackApi>,
    insights: Arc<dyn InsightStore>,
    generator: Arc<dyn InsightGenerator>,
    settings: PollerSettings,
    display: watch::Sender<NowPlaying>,
    fetch_gate: Mutex<()>,
    /// Cancels the running timer; `None` while not polling.
    timer: std::sync::Mutex<Option<CancellationToken>>,
    /// Bumped when polling stops so fetches started before are discarded.
    epoch: AtomicU64,
    shutdown: CancellationToken,
}

impl PlaybackPoller {
    /// Creates an idle poller. Nothing is fetched until [`PlaybackPoller::run`]
    /// sees the account authorized, or a fetch is requested explicitly.
    ///
    /// # Arguments
    ///
    /// * `auth` - Source of access tokens and of the authorized flag
    /// * `player` - Player API the snapshots are fetched from
    /// * `insights` - Cache consulted before generating
    /// * `generator` - Produces insights on a cache miss
    /// * `settings` - Poll interval and resync delay
    pub fn new(
        auth: Arc<AuthCoordinator>,
        player: Arc<dyn PlaybackApi>,
        insights: Arc<dyn InsightStore>,
        generator: Arc<dyn InsightGenerator>,
        settings: PollerSettings,
    ) -> Self {
        let (display, _) = watch::channel(NowPlaying::default());
        PlaybackPoller {
            auth,
            player,
            insights,
            generator,
            settings,
            display,
            fetch_gate: Mutex::new(()),
            timer: std::sync::Mutex::new(None),
            epoch: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Follows the authorized flag: polls while it is true, stops when it
    /// turns false. Runs until [`PlaybackPoller::shutdown`].
    pub fn run(self: &Arc<Self>) -> JoinHandle<()> {
        let poller = Arc::clone(self);
        let mut authorized = self.auth.subscribe();

        tokio::spawn(async move {
            loop {
                if *authorized.borrow_and_update() {
                    poller.start_polling();
                } else {
                    poller.stop_polling();
                }

                tokio::select! {
                    changed = authorized.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    () = poller.shutdown.cancelled() => break,
                }
            }
            poller.stop_polling();
        })
    }

    /// Stops polling for good, e.g. when the view goes away.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_polling();
    }

    /// Whether the interval timer is running.
    pub fn is_polling(&self) -> bool {
        self.timer_slot().is_some()
    }

    /// Changes of the displayed state.
    pub fn subscribe(&self) -> watch::Receiver<NowPlaying> {
        self.display.subscribe()
    }

    /// Copy of the currently displayed state.
    pub fn now_playing(&self) -> NowPlaying {
        self.display.borrow().clone()
    }

    /// One scheduled tick. Skipped if a fetch is already in flight.
    ///
    /// Returns whether a fetched snapshot was applied.
    pub async fn poll_once(&self) -> bool {
        let Ok(_fetching) = self.fetch_gate.try_lock() else {
            debug!("Playback fetch still in flight, skipping tick");
            return false;
        };
        self.fetch_and_apply().await
    }

    /// Out-of-band refresh. Waits for an in-flight fetch instead of skipping.
    pub async fn refresh(&self) -> bool {
        let _fetching = self.fetch_gate.lock().await;
        self.fetch_and_apply().await
    }

    /// Regenerates the insight of the current item, bypassing the cache
    /// lookup. The result replaces the cached entry.
    pub async fn refresh_insight(&self) -> bool {
        let _fetching = self.fetch_gate.lock().await;
        let epoch = self.epoch.load(Ordering::SeqCst);
        let Some(key) = self.display.borrow().item().map(|item| item.insight_key()) else {
            return false;
        };
        self.generate_insight(&key, epoch).await;
        true
    }

    /// Pauses when playing, resumes otherwise.
    ///
    /// On success the displayed state flips right away and one refresh
    /// follows after the resync delay.
    ///
    /// # Errors
    ///
    /// The [`PlaybackError`] of the token lookup or the API call. Nothing is
    /// retried and the display is left as it was.
    pub async fn toggle_play_pause(self: &Arc<Self>) -> Result<(), PlaybackError> {
        let control = if self.display.borrow().is_playing {
            Control::Pause
        } else {
            Control::Resume
        };
        self.control(control).await
    }

    /// Skips to the next item. Errors and resync as for
    /// [`PlaybackPoller::toggle_play_pause`].
    pub async fn skip_to_next(self: &Arc<Self>) -> Result<(), PlaybackError> {
        self.control(Control::Next).await
    }

    /// Skips to the previous item. Errors and resync as for
    /// [`PlaybackPoller::toggle_play_pause`].
    pub async fn skip_to_previous(self: &Arc<Self>) -> Result<(), PlaybackError> {
        self.control(Control::Previous).await
    }

    /// Sets the device volume to `percent`.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::InvalidVolume`] above 100, without calling the API.
    /// Otherwise as for [`PlaybackPoller::toggle_play_pause`].
    pub async fn set_volume(self: &Arc<Self>, percent: u8) -> Result<(), PlaybackError> {
        if percent > 100 {
            return Err(PlaybackError::InvalidVolume(percent));
        }
        self.control(Control::Volume(percent)).await
    }

    fn start_polling(self: &Arc<Self>) {
        let mut timer = self.timer_slot();
        if timer.is_some() {
            return;
        }

        let cancel = self.shutdown.child_token();
        let poller = Arc::clone(self);
        let stopped = cancel.clone();
        tokio::spawn(async move {
            let mut ticks = interval(poller.settings.interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = stopped.cancelled() => break,
                    _ = ticks.tick() => {
                        poller.poll_once().await;
                    }
                }
            }
        });

        *timer = Some(cancel);
        debug!(
            "Polling playback every {} ms",
            self.settings.interval.as_millis()
        );
    }

    fn stop_polling(&self) {
        if let Some(cancel) = self.timer_slot().take() {
            self.epoch.fetch_add(1, Ordering::SeqCst);
            cancel.cancel();
            debug!("Polling stopped");
        }
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch_and_apply(&self) -> bool {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let token = match self.auth.access_token().await {
            Ok(token) => token,
            Err(e) => {
                debug!("Skipping playback fetch: {}", e);
                return false;
            }
        };

        let fetched = match self.player.current_playback(&token).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warning!("Failed to fetch playback state: {}", e);
                return false;
            }
        };

        if !self.is_current(epoch).await {
            debug!("Discarding playback fetched before deauthorization");
            return false;
        }

        let (next, effects) = reduce(&self.display.borrow(), fetched);
        self.display.send_replace(next);

        for effect in effects {
            match effect {
                Effect::ResolveInsight(key) => self.resolve_insight(&key, epoch).await,
            }
        }
        true
    }

    /// True while nothing has deauthorized since `epoch` was read.
    async fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch && self.auth.is_authorized().await
    }

    async fn resolve_insight(&self, key: &InsightKey, epoch: u64) {
        if let Some(insight) = self.insights.get(key) {
            if !self.is_current(epoch).await {
                return;
            }
            debug!("Insight for {} - {} served from cache", key.track, key.artist);
            self.display.send_modify(|d| {
                d.insight = insight;
                d.is_loading_insights = false;
            });
            return;
        }
        self.generate_insight(key, epoch).await;
    }

    /// Generates the insight for `key` and shows it. A result arriving after
    /// deauthorization is dropped, neither shown nor cached.
    async fn generate_insight(&self, key: &InsightKey, epoch: u64) {
        self.display.send_modify(|d| {
            d.insight = GENERATING_TEXT.to_string();
            d.is_loading_insights = true;
        });

        let generated = self.generator.generate(key).await;
        if !self.is_current(epoch).await {
            debug!("Discarding insight generated before deauthorization");
            return;
        }

        let text = match generated {
            Ok(insight) => {
                self.insights.put(key, &insight);
                insight
            }
            Err(e) => {
                warning!("Insight generation failed: {}", e);
                format!("Error generating insights: {}", e)
            }
        };

        self.display.send_modify(|d| {
            d.insight = text;
            d.is_loading_insights = false;
        });
    }

    async fn control(self: &Arc<Self>, control: Control) -> Result<(), PlaybackError> {
        let result = async {
            let token = self.auth.access_token().await?;
            match control {
                Control::Pause => self.player.pause(&token).await,
                Control::Resume => self.player.resume(&token).await,
                Control::Next => self.player.skip_to_next(&token).await,
                Control::Previous => self.player.skip_to_previous(&token).await,
                Control::Volume(percent) => self.player.set_volume(&token, percent).await,
            }
        }
        .await;

        match result {
            Ok(()) => {
                debug!("{} succeeded", control);
                self.display.send_modify(|d| match control {
                    Control::Pause => d.is_playing = false,
                    Control::Resume => d.is_playing = true,
                    Control::Volume(percent) => d.volume_percent = Some(percent),
                    Control::Next | Control::Previous => {}
                });
                self.schedule_resync();
                Ok(())
            }
            Err(e) => {
                warning!("{} failed: {}", control, e);
                Err(e)
            }
        }
    }

    fn schedule_resync(self: &Arc<Self>) {
        let poller = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = poller.shutdown.cancelled() => {}
                () = sleep(poller.settings.resync_delay) => {
                    poller.refresh().await;
                }
            }
        });
    }
}
