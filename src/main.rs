//! pusher-channels - channel layer developer tool.
//!
//! Replays recorded protocol frames through a [`Channel`] and prints every
//! event that reaches application bindings. See the `pusher_channels`
//! library for the channel layer itself.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pusher_channels::{Channel, ClientOptions, Connection, Frame};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "pusher-channels")]
#[command(version, about = "Inspect Pusher-style channel behavior", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay newline-delimited JSON frames through a channel
    Replay {
        /// Channel name (prefix selects public/private/presence)
        #[arg(long)]
        channel: String,

        /// Frames file (reads stdin when omitted)
        #[arg(long)]
        frames: Option<PathBuf>,

        /// Client options JSON file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Cancel the subscription before replaying
        #[arg(long)]
        cancel: bool,

        /// Simulate an unavailable transport
        #[arg(long)]
        offline: bool,
    },
}

/// Connection that logs outbound traffic instead of sending it.
struct LoggingConnection {
    online: bool,
}

impl Connection for LoggingConnection {
    fn send_event(&self, event: &str, data: &Value, channel: Option<&str>) -> bool {
        log::info!("send '{}' (channel: {:?}): {}", event, channel, data);
        self.online
    }

    fn unsubscribe(&self, channel: &str) {
        log::info!("unsubscribe {}", channel);
    }
}

fn open_frames(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    Ok(match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open frames file {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn replay(
    name: &str,
    frames: Option<&Path>,
    config: Option<&Path>,
    cancel: bool,
    offline: bool,
) -> Result<()> {
    let options = ClientOptions::load(config)?;
    let connection = Arc::new(LoggingConnection { online: !offline });
    let channel = Channel::new(name, connection, Arc::new(options));

    channel.bind_global(|event, data, metadata| {
        let line = json!({ "event": event, "data": data, "metadata": metadata });
        // Write errors (e.g. a closed pipe) are dropped; replay continues.
        let _ = writeln!(io::stdout().lock(), "{line}");
    });

    if cancel {
        channel.cancel_subscription();
    }

    let mut replayed = 0usize;
    for (index, line) in open_frames(frames)?.lines().enumerate() {
        let line = line.context("Failed to read frame")?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = serde_json::from_str(&line)
            .with_context(|| format!("Invalid frame on line {}", index + 1))?;

        if let Some(target) = frame.channel.as_deref() {
            if target != channel.name() {
                log::debug!("Skipping frame for {}", target);
                continue;
            }
        }

        channel.handle_event(&frame);
        replayed += 1;
    }

    println!(
        "{}",
        json!({
            "summary": {
                "channel": channel.name(),
                "frames": replayed,
                "subscribed": channel.is_subscribed(),
                "subscription_pending": channel.is_subscription_pending(),
                "subscription_cancelled": channel.is_subscription_cancelled(),
            }
        })
    );
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            channel,
            frames,
            config,
            cancel,
            offline,
        } => replay(
            &channel,
            frames.as_deref(),
            config.as_deref(),
            cancel,
            offline,
        ),
    }
}
