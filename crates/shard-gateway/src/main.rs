//! Gateway shard entry point
//!
//! Run with:
//! ```bash
//! DISCORD_TOKEN=... cargo run -p shard-gateway
//! ```
//!
//! Configuration is loaded from environment variables (and `.env`).

use anyhow::Context;
use shard_common::{try_init_tracing_with_config, ClientConfig, TracingConfig};
use shard_gateway::events::{MessageCreateEvent, ReadyEvent};
use shard_gateway::{ConnectionNotice, Session, SessionBuilder};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Gateway shard failed");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("failed to load configuration")?;

    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_log_level(config.log_level)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        shard_id = config.shard.id,
        shard_count = config.shard.count,
        log_level = %config.log_level,
        "Configuration loaded"
    );

    let session = SessionBuilder::from_config(&config)?.build()?;
    register_handlers(&session);

    let notices = tokio::spawn(log_notices(session.notices()));

    session.open().await.context("failed to open gateway session")?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    session.close().await?;
    notices.abort();

    Ok(())
}

fn register_handlers(session: &Session) {
    let _ready = session.on::<ReadyEvent, _>(|_, ready| {
        info!(
            user = %ready.user.username,
            guilds = ready.guilds.len(),
            "Logged in"
        );
    });

    let _messages = session.on::<MessageCreateEvent, _>(|_, message| {
        info!(
            channel_id = %message.channel_id,
            author = %message.author.username,
            "Message received"
        );
    });

    let _all = session.on_any(|session, event| {
        tracing::debug!(event_type = event.name(), seq = ?session.sequence(), "Event");
    });
}

async fn log_notices(mut notices: tokio::sync::broadcast::Receiver<ConnectionNotice>) {
    loop {
        match notices.recv().await {
            Ok(ConnectionNotice::ReconnectFailed { fatal: true, error, .. }) => {
                error!(error = %error, "Gateway gave up on the session");
            }
            Ok(notice) => info!(notice = %notice, "Connection notice"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed connection notices"),
            Err(RecvError::Closed) => return,
        }
    }
}
