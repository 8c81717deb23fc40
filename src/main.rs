use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};

use trackteller::{app::App, cli, config, error};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect your Spotify account
    Auth,

    /// Follow playback and show insights for every track
    Watch,

    /// Browse cached insights
    Insights(InsightsOptions),

    /// Disconnect and remove the stored session
    Logout,

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
#[command(
    about = "Browse cached insights",
    args_conflicts_with_subcommands = true // disallow mixing --search with `show`
)]
pub struct InsightsOptions {
    /// Filter by track, artist or album
    #[clap(long)]
    pub search: Option<String>,

    #[command(subcommand)]
    pub command: Option<InsightsSubcommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum InsightsSubcommand {
    /// Print the full insight of one track
    Show(ShowOpts),
}

#[derive(Parser, Debug, Clone)]
pub struct ShowOpts {
    #[clap(long)]
    pub track: String,
    #[clap(long)]
    pub artist: String,
    /// Album label as shown by `watch`, e.g. "OK Computer 1997-05-21"
    #[clap(long)]
    pub album: String,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

#[tokio::main]
async fn main() {
    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let cli = Cli::parse();

    match cli.command {
        Command::Insights(opt) => match opt.command {
            Some(InsightsSubcommand::Show(s)) => cli::show_insight(s.track, s.artist, s.album).await,
            None => cli::list_insights(opt.search).await,
        },
        Command::Completions(opt) => {
            let mut cmd = Cli::command_for_update();
            let name = cmd.get_name().to_string();
            generate(opt.shell, &mut cmd, name, &mut std::io::stdout())
        }
        command => {
            let app = match App::from_env() {
                Ok(app) => app,
                Err(e) => {
                    error!("Spotify is not configured. Err: {}", e);
                    return;
                }
            };
            match command {
                Command::Auth => cli::auth(&app).await,
                Command::Watch => cli::watch(&app).await,
                Command::Logout => cli::logout(&app).await,
                Command::Insights(_) | Command::Completions(_) => {}
            }
        }
    }
}
