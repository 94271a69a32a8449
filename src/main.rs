//! basic-bot - An example Matrix bot built on `matrix_basic_bot`.
//!
//! The bot logs every event it receives and answers `!echo <text>` with a
//! notice carrying `<text>`, in plaintext and encrypted rooms alike.
//!
//! # Usage
//!
//! ```bash
//! basic-bot --config config.yaml --data ./bot-data
//! ```
//!
//! See [`matrix_basic_bot::config`] for the configuration file format.
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - Controls logging level (default: `info`)
//! - `BASIC_BOT_*` - Override configuration values, e.g. `BASIC_BOT_MATRIX__PASSWORD`

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use matrix_basic_bot::{
    BotEvent, BotIdentity, MatrixBot, MessageEnvelope, config::Config,
};
use tokio::sync::broadcast::{self, error::RecvError};

/// Prefix of the echo command.
const ECHO_COMMAND: &str = "!echo ";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long)]
    config: String,

    /// Path to the directory for storing persistent data.
    ///
    /// This directory will contain:
    /// - `credentials.json` - access token, user and device ids, sync token
    /// - `sqlite/` - Matrix state and encryption stores
    ///
    /// It holds the bot's authentication and encryption keys. Restrict its
    /// permissions.
    #[arg(short, long)]
    data: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Put logger at info level by default
    let env = Env::default().filter_or("RUST_LOG", "info");
    env_logger::init_from_env(env);

    info!("Starting basic-bot {}...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = Config::load(&args.config).context("failed to load config file")?;

    let identity = BotIdentity::new(
        config.matrix.user_id,
        config.matrix.password,
        config.matrix.homeserver_url,
        args.data,
    )?;
    let mut bot = MatrixBot::with_matrix(identity, config.options).await?;

    let events = bot.subscribe();
    bot.start().await.context("failed to start bot")?;

    tokio::select! {
        _ = handle_events(&bot, events) => warn!("event stream closed"),
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                error!("failed to listen for ctrl-c: {err}");
            }
            info!("ctrl-c received, stopping");
        }
    }

    bot.stop().await;
    Ok(())
}

/// Logs events and answers echo commands until the stream closes.
async fn handle_events(bot: &MatrixBot, mut events: broadcast::Receiver<BotEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("skipped {skipped} event(s)");
                continue;
            }
            Err(RecvError::Closed) => return,
        };

        match event {
            BotEvent::Connected => info!("connected as {}", bot.user_id().unwrap_or_default()),
            BotEvent::Error(err) => error!("bot error: {err}"),
            BotEvent::Membership(membership) => info!(
                "{} is now {} in {}",
                membership.user_id, membership.membership, membership.room_id
            ),
            BotEvent::Message(message) => {
                debug!("message from {}", message.sender.user_id);
                echo(bot, &message).await;
            }
            BotEvent::E2eMessage(message) => {
                debug!("encrypted message from {}", message.sender.user_id);
                echo(bot, &message).await;
            }
        }
    }
}

async fn echo(bot: &MatrixBot, message: &MessageEnvelope) {
    let Some(text) = message.content.body.strip_prefix(ECHO_COMMAND) else {
        return;
    };
    if text.trim().is_empty() {
        return;
    }

    if let Err(err) = bot.send_notice(&message.sender.room_id, text, None).await {
        error!("failed to echo in {}: {err}", message.sender.room_id);
    }
}
