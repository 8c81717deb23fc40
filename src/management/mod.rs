mod auth;
mod coordinator;
mod insights;
pub mod playback;
mod poller;

pub use auth::FileTokenStore;
pub use auth::MemoryTokenStore;
pub use auth::TokenStore;
pub use coordinator::AuthCoordinator;
pub use coordinator::AuthSettings;
pub use coordinator::AuthState;
pub use insights::InsightCache;
pub use insights::InsightStore;
pub use poller::PlaybackPoller;
pub use poller::PollerSettings;
