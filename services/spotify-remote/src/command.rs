//! Command-line playback commands

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use spotify_player::{CommandOutcome, PlayerClient};

/// Command-line remote for Spotify playback
#[derive(Debug, Parser)]
#[command(name = "spotify-remote", version)]
pub struct Cli {
    /// Config file (defaults to $CONFIG_PATH, then spotify-remote.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// List available playback devices
    Devices,
    /// Play a track, album or playlist URI
    Play {
        /// Spotify URI, e.g. spotify:track:4uLU6hMCjMI75M1A2tKUQC
        uri: String,
        /// Device to play on (defaults to the active device)
        device_id: Option<String>,
    },
    /// Pause playback
    Pause,
    /// Skip to the next track
    Next,
    /// Go back to the previous track
    Previous,
    /// Move playback to another device
    Transfer {
        device_id: String,
        /// Start playing on the new device
        #[arg(long)]
        play: bool,
    },
}

impl Command {
    /// Run against `player`, printing the result. A command the API did not
    /// apply is an error so the process exits non-zero.
    pub async fn run(&self, player: &PlayerClient) -> Result<()> {
        match self {
            Command::Devices => {
                let outcome = player.list_devices().await?;
                match outcome {
                    CommandOutcome::Success(body) => {
                        println!("{body}");
                        Ok(())
                    }
                    other => bail!("devices: {other}"),
                }
            }
            Command::Play { uri, device_id } => {
                report("play", player.play(uri, device_id.as_deref()).await?)
            }
            Command::Pause => report("pause", player.pause().await?),
            Command::Next => report("next", player.next().await?),
            Command::Previous => report("previous", player.previous().await?),
            Command::Transfer { device_id, play } => {
                report("transfer", player.transfer(device_id, *play).await?)
            }
        }
    }
}

fn report(name: &str, outcome: CommandOutcome) -> Result<()> {
    match outcome {
        CommandOutcome::Success(()) => {
            println!("{name}: ok");
            Ok(())
        }
        other => bail!("{name}: {other}"),
    }
}
