use std::sync::Arc;

use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    app::App,
    debug, error,
    error::PlaybackError,
    info,
    management::{PlaybackPoller, playback::NowPlaying},
    utils, warning,
};

const HELP: &str = "Commands: p play/pause, n next, b previous, v <0-100> volume, r regenerate insight, q quit";

enum Command {
    TogglePlayPause,
    Next,
    Previous,
    Volume(u8),
    RegenerateInsight,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };

    let command = match name {
        "p" => Command::TogglePlayPause,
        "n" => Command::Next,
        "b" => Command::Previous,
        "r" => Command::RegenerateInsight,
        "h" | "?" => Command::Help,
        "q" => Command::Quit,
        "v" => {
            let percent = parts
                .next()
                .and_then(|v| v.parse::<u8>().ok())
                .filter(|v| *v <= 100)
                .ok_or_else(|| "Volume must be a number between 0 and 100".to_string())?;
            Command::Volume(percent)
        }
        other => return Err(format!("Unknown command '{}'. {}", other, HELP)),
    };
    Ok(Some(command))
}

pub async fn watch(app: &App) {
    if !app.coordinator.restore().await {
        info!("Not connected yet, opening Spotify authorization in the browser");
        if let Err(e) = app.coordinator.authorize().await {
            error!("Cannot start authorization. Err: {}", e);
            return;
        }
        let pb = super::spinner("Waiting for authorization in the browser...");
        let outcome = super::auth::wait_for_outcome(&app.coordinator).await;
        pb.finish_and_clear();
        if let Err(reason) = outcome {
            error!("Authorization failed: {}", reason);
            return;
        }
    }

    let runner = app.poller.run();
    let mut display = app.poller.subscribe();
    let mut previous = NowPlaying::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    info!("{}", HELP);

    loop {
        tokio::select! {
            changed = display.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = display.borrow_and_update().clone();
                render(&previous, &current);
                previous = current;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(Command::Help)) => info!("{}", HELP),
                    Ok(Some(command)) => dispatch(&app.poller, command),
                    Ok(None) => {}
                    Err(message) => warning!("{}", message),
                },
                Ok(None) => break,
                Err(e) => {
                    warning!("Cannot read commands. Err: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    app.poller.shutdown();
    if let Err(e) = runner.await {
        warning!("Poller stopped abnormally. Err: {}", e);
    }
    info!("Bye");
}

/// Runs `command` in the background so the display keeps updating while
/// it is in flight.
fn dispatch(poller: &Arc<PlaybackPoller>, command: Command) {
    let poller = Arc::clone(poller);
    tokio::spawn(async move {
        // the poller already printed the warning
        if let Err(e) = execute(&poller, command).await {
            debug!("Player command failed: {}", e);
        }
    });
}

async fn execute(poller: &Arc<PlaybackPoller>, command: Command) -> Result<(), PlaybackError> {
    match command {
        Command::TogglePlayPause => poller.toggle_play_pause().await,
        Command::Next => poller.skip_to_next().await,
        Command::Previous => poller.skip_to_previous().await,
        Command::Volume(percent) => poller.set_volume(percent).await,
        Command::RegenerateInsight => {
            if !poller.refresh_insight().await {
                warning!("Nothing is playing");
            }
            Ok(())
        }
        Command::Help | Command::Quit => Ok(()),
    }
}

fn render(previous: &NowPlaying, current: &NowPlaying) {
    let track_changed = previous.snapshot.is_none() || previous.track_id() != current.track_id();

    if track_changed {
        match current.item() {
            Some(item) => {
                println!();
                println!(
                    "{} {}",
                    item.name().bold(),
                    format!("({})", utils::format_duration(item.duration_ms())).dimmed()
                );
                println!("{}", item.artist_line());
                if !current.album_label.is_empty() {
                    println!("{}", current.album_label.italic());
                }
                if let Some(cover) = &current.cover_art_url {
                    println!("{}", cover.dimmed());
                }
            }
            None => info!("Nothing is playing"),
        }
    }

    if track_changed
        || previous.is_playing != current.is_playing
        || previous.volume_percent != current.volume_percent
    {
        let status = if current.is_playing {
            "Playing".green()
        } else {
            "Paused".yellow()
        };
        match current.volume_percent {
            Some(volume) => println!("{} | Volume {}%", status, volume),
            None => println!("{}", status),
        }
    }

    if previous.insight != current.insight && !current.insight.is_empty() {
        if current.is_loading_insights {
            info!("{}", current.insight);
        } else {
            println!("\n{}\n", current.insight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AuthError,
        management::{AuthCoordinator, AuthSettings, InsightCache, MemoryTokenStore, PollerSettings},
        openai::OpenAiGenerator,
        spotify::{
            auth::{SpotifyAccounts, SystemBrowser},
            player::SpotifyPlayer,
        },
    };

    fn disconnected_poller() -> Arc<PlaybackPoller> {
        let unreachable = "http://127.0.0.1:9".to_string();
        let coordinator = Arc::new(AuthCoordinator::new(
            AuthSettings::new("client".to_string()),
            Arc::new(SpotifyAccounts::new(
                "client".to_string(),
                "secret".to_string(),
                unreachable.clone(),
            )),
            Arc::new(MemoryTokenStore::new(None)),
            Arc::new(SystemBrowser),
        ));
        Arc::new(PlaybackPoller::new(
            coordinator,
            Arc::new(SpotifyPlayer::new(unreachable.clone())),
            Arc::new(InsightCache::disabled()),
            Arc::new(OpenAiGenerator::new(unreachable, None, "gpt-4o".to_string(), 10)),
            PollerSettings::default(),
        ))
    }

    #[tokio::test]
    async fn test_player_commands_report_failures() {
        let poller = disconnected_poller();

        let err = execute(&poller, Command::Next).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Auth(AuthError::NotConnected)));
        assert!(execute(&poller, Command::Volume(101)).await.is_err());
        assert!(execute(&poller, Command::RegenerateInsight).await.is_ok());
    }

    #[test]
    fn test_parse_volume_command() {
        assert!(matches!(parse_command("v 42"), Ok(Some(Command::Volume(42)))));
        assert!(parse_command("v 101").is_err());
        assert!(parse_command("v loud").is_err());
        assert!(parse_command("v").is_err());
    }

    #[test]
    fn test_parse_blank_and_unknown_lines() {
        assert!(matches!(parse_command("   "), Ok(None)));
        assert!(parse_command("x").is_err());
        assert!(matches!(parse_command(" q "), Ok(Some(Command::Quit))));
    }
}
