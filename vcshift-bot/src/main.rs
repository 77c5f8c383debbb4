//! vcshift: lobby overflow bot.
//!
//! Connects to the gateway, keeps a presence cache, and feeds voice-state
//! transitions to the transfer orchestrator. Operator slash commands:
//!
//!   /create-transfer <name> <limit>  — create a lobby
//!   /remove-transfer <channel>       — forget a lobby
//!   /list-transfers                  — list lobbies
//!   /sync-commands                   — re-register commands in this guild
//!
//! Requires DISCORD_TOKEN. Run with `--register` to only register commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use vcshift_bot::commands::{self, CommandHandler, CommandSync, Permissions, RestCommandSync};
use vcshift_bot::config::{BotConfig, StoreBackendKind};
use vcshift_bot::directory::LiveDirectory;
use vcshift_bot::events::PresenceFeed;
use vcshift_bot::orchestrator::TransferOrchestrator;
use vcshift_bot::scheduler::TokioScheduler;
use vcshift_bot::store::{ConfigStore, JsonFileBackend, SqliteBackend, StorageBackend};
use vcshift_sdk::cache::PresenceCache;
use vcshift_sdk::event::Event;
use vcshift_sdk::gateway::{self, ConnectConfig};
use vcshift_sdk::rest::RestClient;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = BotConfig::parse();

    // JSON logs in production (VCSHIFT_LOG_JSON=1), human-readable otherwise
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vcshift_bot=info,vcshift_sdk=info".into());
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    for warning in config.warnings() {
        tracing::warn!("[config] {warning}");
    }

    let rest = RestClient::with_base(config.token.clone(), config.api_base.clone());
    let sync: Arc<dyn CommandSync> = Arc::new(RestCommandSync::new(
        rest.clone(),
        config.application_id.clone().unwrap_or_default(),
    ));
    let guilds = config.command_guilds();

    if config.register {
        let ok = commands::register_guilds(sync.as_ref(), &guilds).await;
        tracing::info!(registered = ok, total = guilds.len(), "Command registration finished");
        return Ok(());
    }

    let backend: Box<dyn StorageBackend> = match config.store_backend {
        StoreBackendKind::Json => Box::new(JsonFileBackend::new(&config.store)),
        StoreBackendKind::Sqlite => {
            if let Some(dir) = config.store.parent()
                && !dir.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(dir).await?;
            }
            Box::new(SqliteBackend::open(&config.store)?)
        }
    };
    let store = ConfigStore::open(backend);

    let cache = Arc::new(PresenceCache::new());
    let directory = Arc::new(LiveDirectory::new(rest.clone(), Arc::clone(&cache)));
    let orchestrator = Arc::new(
        TransferOrchestrator::new(store, directory, Arc::new(TokioScheduler))
            .with_cleanup_delay(config.cleanup_delay()),
    );
    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&orchestrator),
        Arc::clone(&sync),
        Permissions {
            allowed_user_id: config.allowed_user_id.clone(),
            allowed_role_id: config.allowed_role_id.clone(),
        },
    ));
    let feed = PresenceFeed::new();
    orchestrator.attach(&feed);

    tracing::info!(
        store = %config.store.display(),
        lobbies = orchestrator.lobbies().len(),
        "Starting vcshift"
    );

    let connect_config = ConnectConfig {
        gateway_url: config.gateway_url.clone(),
        ..ConnectConfig::new(config.token.clone())
    };
    let mut backoff = Duration::from_secs(2);

    loop {
        let (handle, mut events) = gateway::connect(connect_config.clone());

        let reason = loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break "event channel closed".to_string() };
                    if let Event::Disconnected { reason } = event {
                        break reason;
                    }
                    if matches!(event, Event::Ready { .. }) {
                        backoff = Duration::from_secs(2);
                    }
                    handle_event(event, &cache, &feed, &handler, &rest, &sync, &guilds);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                    let _ = handle.shutdown().await;
                    return Ok(());
                }
            }
        };

        tracing::warn!(reason = %reason, retry_in_secs = backoff.as_secs(), "Gateway disconnected");
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn handle_event(
    event: Event,
    cache: &PresenceCache,
    feed: &PresenceFeed,
    handler: &Arc<CommandHandler>,
    rest: &RestClient,
    sync: &Arc<dyn CommandSync>,
    guilds: &[String],
) {
    // Cache first: provisioning snapshots occupants from it.
    let change = cache.apply(&event);

    match event {
        Event::Connected => tracing::debug!("Gateway connected"),
        Event::Ready { user_id, user_name } => {
            tracing::info!(user = %user_name, id = %user_id, "Logged in");
            let sync = Arc::clone(sync);
            let guilds = guilds.to_vec();
            tokio::spawn(async move {
                commands::register_guilds(sync.as_ref(), &guilds).await;
            });
        }
        Event::GuildAvailable { guild_id, .. } => {
            tracing::info!(guild = %guild_id, "Guild available");
        }
        Event::Interaction(interaction) => {
            let handler = Arc::clone(handler);
            let rest = rest.clone();
            tokio::spawn(async move {
                let Some(reply) = handler.handle(&interaction).await else {
                    return;
                };
                if let Err(e) = rest
                    .reply_interaction(&interaction.id, &interaction.token, &reply.content, reply.ephemeral)
                    .await
                {
                    tracing::error!(command = %interaction.command_name, error = %e, "Failed to reply to interaction");
                }
            });
        }
        _ => {}
    }

    if let Some(change) = change {
        feed.publish(change);
    }
}
