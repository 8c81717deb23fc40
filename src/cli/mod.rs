//! # CLI Module
//!
//! Command implementations of the `trackteller` binary. Every command reports
//! its own failures through the logging macros and returns normally; nothing
//! here terminates the process.
//!
//! ## Commands
//!
//! - [`auth`] - Connects the Spotify account through the browser
//! - [`watch`] - Follows playback, prints insights and accepts player commands
//! - [`list_insights`] - Table of cached insights with optional search
//! - [`show_insight`] - Full text of one cached insight
//! - [`logout`] - Disconnects and forgets the stored session
//!
//! ## Usage
//!
//! ```bash
//! trackteller auth                  # Connect to Spotify
//! trackteller watch                 # Follow playback
//! trackteller insights --search pink
//! trackteller insights show --track "Time" --artist "Pink Floyd" --album "The Dark Side of the Moon 1973-03-01"
//! ```

mod auth;
mod insights;
mod logout;
mod watch;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub use auth::auth;
pub use insights::list_insights;
pub use insights::show_insight;
pub use logout::logout;
pub use watch::watch;

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    if let Ok(style) = ProgressStyle::with_template("{spinner:.blue} {msg}") {
        pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    pb
}
