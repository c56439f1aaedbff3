mod config;
mod error;
mod http_server;
mod itunes;
mod logging;
mod matching;
mod platform;
mod ports;
mod retry;
mod services;
mod spotify;
#[cfg(test)]
mod test_utils;
mod transcode;
mod youtube;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context, eyre::eyre};

use crate::{
    config::Config,
    http_server::{app::HttpServerConfig, state::AppState},
    logging::{SERVICE_NAME, init_tracing},
    platform::SourceUrl,
    spotify::auth::SpotifyApiCredentials,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "WAVCON_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `wavcon=debug,tower_http=info`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// OTLP gRPC endpoint to export traces to
    #[arg(long, env = "OTLP_ENDPOINT", global = true)]
    otlp_endpoint: Option<String>,

    /// The port to run the server on
    #[arg(short, long, default_value = "10000", env = "PORT", global = true)]
    port: u16,

    /// Spotify app client id (client credentials flow)
    #[arg(long, env = "SPOTIFY_CLIENT_ID", global = true)]
    spotify_client_id: Option<String>,

    /// Spotify app client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", global = true, hide_env_values = true)]
    spotify_client_secret: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve,
    /// Match a Spotify track against YouTube and print the score trace
    Match {
        /// Spotify track url or `spotify:track:` uri
        url: String,

        /// Print the selection as JSON
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

impl Args {
    /// CLI/env credentials win over the config file.
    fn spotify_credentials(&self, config: &Config) -> Option<SpotifyApiCredentials> {
        let client_id = self
            .spotify_client_id
            .clone()
            .or_else(|| config.spotify.client_id.clone())?;
        let client_secret = self
            .spotify_client_secret
            .clone()
            .or_else(|| config.spotify.client_secret.clone())?;
        Some(SpotifyApiCredentials::new(client_id, client_secret))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let tracer_provider = init_tracing(
        SERVICE_NAME,
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    let result = run(args).await;

    if let Some(provider) = tracer_provider
        && let Err(error) = provider.shutdown()
    {
        log::warn!("Failed to flush traces: {}", error);
    }

    result
}

async fn run(mut args: Args) -> Result<()> {
    log::debug!("WavCon starting");

    match args.command.take().unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let port = args.port;
            let app_state = load_app_state(&args)?;
            log::info!("Starting HTTP server on port: {}", port);
            http_server::app::start(HttpServerConfig { port, app_state }).await?;
        }
        Commands::Match { url, json } => {
            let track_id = match platform::detect(&url)? {
                SourceUrl::SpotifyTrack { id } => id,
                SourceUrl::Youtube { .. } => {
                    return Err(eyre!("Only Spotify track urls can be matched"));
                }
            };
            let app_state = load_app_state(&args)?;
            let found = app_state.resolver.match_spotify_track(&track_id).await?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&found.selection)
                        .wrap_err("Failed to serialize selection")?
                );
            } else {
                print_match(&found);
            }
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = args
                    .config
                    .clone()
                    .or_else(Config::config_path)
                    .ok_or_else(|| eyre!("No default config path found"))?;
                log::debug!("Creating default config at {}", path.display());
                Config::create_default(&path)?;
                log::info!("Default config created at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}

fn load_app_state(args: &Args) -> Result<AppState> {
    log::debug!("Loading configuration");
    let config =
        Config::load(args.config.as_deref()).wrap_err("Failed to load wavcon config")?;
    config.check_tools()?;

    let credentials = args.spotify_credentials(&config);
    AppState::new(config, credentials)
}

fn print_match(found: &services::resolver::SpotifyMatch) {
    let track = &found.track;
    println!(
        "{} - {} ({:.0}s)",
        track.artist_display(),
        track.name,
        track.duration_ms as f64 / 1000.0
    );
    println!("query: {}", found.query);
    println!();
    for (index, scored) in found.selection.trace.iter().enumerate() {
        let marker = if index == found.selection.winner_index {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:>7.1}  diff {:>6.1}s  {}  {} [{}]",
            marker,
            scored.score,
            scored.duration_diff,
            if scored.within_tolerance { "in " } else { "out" },
            scored.candidate.title,
            scored.candidate.channel_name
        );
    }
    println!();
    println!(
        "{} ({}): {}",
        found.selection.winner.title, found.selection.kind, found.selection.winner.url
    );
}
