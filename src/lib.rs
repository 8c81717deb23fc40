//! Trackteller Library
//!
//! This library connects to a Spotify account through the OAuth 2.0
//! authorization code flow, mirrors the account's playback state by polling,
//! and attaches AI-generated insights to every track that starts playing.
//! Generated insights are cached per track so a track is only described once.
//!
//! # Modules
//!
//! - `api` - HTTP handlers for the local OAuth callback server
//! - `app` - Wiring of the production services from configuration
//! - `cli` - Command-line interface implementations
//! - `config` - Configuration management and environment variables
//! - `error` - Error types for every subsystem
//! - `management` - Session lifecycle, playback polling and the insight cache
//! - `openai` - Insight generation through a chat-completions endpoint
//! - `server` - Local HTTP server for OAuth callbacks
//! - `spotify` - Spotify accounts and player API clients
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use trackteller::{app::App, config};
//!
//! #[tokio::main]
//! async fn main() -> trackteller::Res<()> {
//!     config::load_env().await?;
//!     let app = App::from_env()?;
//!     app.coordinator.restore().await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod management;
pub mod openai;
pub mod server;
pub mod spotify;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Used at the command-line boundary where errors from different subsystems
/// meet. Library operations return their specific error types from
/// [`error`] instead.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Starting authentication process...");
/// info!("Polling every {} seconds", 5);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("Authentication completed successfully");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark.
///
/// Errors are reported, never fatal: the macro returns normally and the
/// caller decides how to continue.
///
/// # Example
///
/// ```
/// error!("Failed to load configuration: {}", e);
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recovered failures: a failed poll tick, a cache that could not
/// be written, a browser that could not be opened.
///
/// # Example
///
/// ```
/// warning!("Playback fetch failed, keeping previous state: {}", e);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a dimmed diagnostic message when `TRACKTELLER_DEBUG` is set.
#[macro_export]
macro_rules! debug {
  ($($arg:tt)*) => ({
    if $crate::config::debug_enabled() {
      use colored::Colorize;
      println!("[{}] {}", "·".dimmed(), std::format_args!($($arg)*));
    }
  })
}
