//! Operator slash commands.
//!
//! Commands:
//!
//!   /create-transfer <name> <limit>  — create a lobby voice channel
//!   /remove-transfer <channel>       — stop treating a channel as a lobby
//!   /list-transfers                  — show configured lobbies
//!   /sync-commands                   — re-register commands in this guild
//!
//! Handlers return a [`CommandReply`]; sending it is the caller's job, so
//! everything here runs against the [`Directory`] and [`CommandSync`] seams.

use std::sync::Arc;

use async_trait::async_trait;
use vcshift_sdk::model::Interaction;
use vcshift_sdk::rest::{RestClient, RestError};

use crate::directory::NewVoiceChannel;
use crate::orchestrator::{RegisterError, TransferOrchestrator};

/// Platform message length limit.
const MAX_MESSAGE_LEN: usize = 2000;

const LOBBY_REASON: &str = "Transfer VC (lobby)";
const ROLLBACK_REASON: &str = "Transfer VC (lobby) registration failed";

// Permission bits for `default_member_permissions`.
const MANAGE_CHANNELS: u64 = 1 << 4;
const MANAGE_GUILD: u64 = 1 << 5;

// Option types.
const OPT_STRING: u8 = 3;
const OPT_INTEGER: u8 = 4;
const OPT_CHANNEL: u8 = 7;

/// A reply to send back for an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReply {
    pub content: String,
    /// Visible only to the invoking operator.
    pub ephemeral: bool,
}

impl CommandReply {
    fn public(content: impl Into<String>) -> Self {
        Self { content: content.into(), ephemeral: false }
    }

    fn private(content: impl Into<String>) -> Self {
        Self { content: content.into(), ephemeral: true }
    }
}

/// Slash-command definitions, as sent to the bulk-overwrite endpoint.
pub fn definitions() -> serde_json::Value {
    serde_json::json!([
        {
            "name": "create-transfer",
            "description": "Create a lobby voice channel; joiners are moved to a fresh channel",
            "default_member_permissions": MANAGE_CHANNELS.to_string(),
            "dm_permission": false,
            "options": [
                {
                    "name": "name",
                    "description": "Lobby channel name (also the prefix for generated channels)",
                    "type": OPT_STRING,
                    "required": true
                },
                {
                    "name": "limit",
                    "description": "Member limit for generated channels (0 = unlimited)",
                    "type": OPT_INTEGER,
                    "required": true,
                    "min_value": 0,
                    "max_value": 99
                }
            ]
        },
        {
            "name": "remove-transfer",
            "description": "Stop treating a channel as a transfer lobby",
            "default_member_permissions": MANAGE_CHANNELS.to_string(),
            "dm_permission": false,
            "options": [
                {
                    "name": "channel",
                    "description": "The lobby channel",
                    "type": OPT_CHANNEL,
                    "required": true
                }
            ]
        },
        {
            "name": "list-transfers",
            "description": "List configured transfer lobbies",
            "default_member_permissions": MANAGE_CHANNELS.to_string(),
            "dm_permission": false
        },
        {
            "name": "sync-commands",
            "description": "Re-register this bot's slash commands in this server",
            "default_member_permissions": MANAGE_GUILD.to_string(),
            "dm_permission": false
        }
    ])
}

/// Registers command definitions with the platform.
#[async_trait]
pub trait CommandSync: Send + Sync {
    async fn sync_guild(&self, guild_id: &str) -> Result<(), RestError>;
}

/// [`CommandSync`] over the REST API.
pub struct RestCommandSync {
    rest: RestClient,
    application_id: String,
}

impl RestCommandSync {
    pub fn new(rest: RestClient, application_id: impl Into<String>) -> Self {
        Self { rest, application_id: application_id.into() }
    }
}

#[async_trait]
impl CommandSync for RestCommandSync {
    async fn sync_guild(&self, guild_id: &str) -> Result<(), RestError> {
        self.rest
            .put_guild_commands(&self.application_id, guild_id, &definitions())
            .await
    }
}

/// Register commands in every configured guild. Failures are logged per guild.
///
/// Returns how many guilds succeeded.
pub async fn register_guilds(sync: &dyn CommandSync, guild_ids: &[String]) -> usize {
    if guild_ids.is_empty() {
        tracing::info!("No guild ids configured; skipped command registration");
        return 0;
    }
    let mut ok = 0;
    for guild_id in guild_ids {
        match sync.sync_guild(guild_id).await {
            Ok(()) => {
                tracing::info!(guild = %guild_id, "Slash commands registered");
                ok += 1;
            }
            Err(e) => tracing::error!(guild = %guild_id, error = %e, "Slash command registration failed"),
        }
    }
    ok
}

/// Who may run operator commands.
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    pub allowed_user_id: Option<String>,
    pub allowed_role_id: Option<String>,
}

impl Permissions {
    pub fn is_allowed(&self, interaction: &Interaction) -> bool {
        if self.allowed_user_id.as_deref() == Some(interaction.user_id.as_str()) {
            return true;
        }
        match &self.allowed_role_id {
            Some(role) => interaction.member_roles.iter().any(|r| r == role),
            None => false,
        }
    }
}

pub struct CommandHandler {
    orchestrator: Arc<TransferOrchestrator>,
    sync: Arc<dyn CommandSync>,
    permissions: Permissions,
}

impl CommandHandler {
    pub fn new(
        orchestrator: Arc<TransferOrchestrator>,
        sync: Arc<dyn CommandSync>,
        permissions: Permissions,
    ) -> Self {
        Self { orchestrator, sync, permissions }
    }

    /// Handle an interaction. `None` for commands this bot doesn't own.
    pub async fn handle(&self, interaction: &Interaction) -> Option<CommandReply> {
        let reply = match interaction.command_name.as_str() {
            "create-transfer" => self.create_transfer(interaction).await,
            "remove-transfer" => self.remove_transfer(interaction),
            "list-transfers" => self.list_transfers(interaction),
            "sync-commands" => self.sync_commands(interaction).await,
            _ => return None,
        };
        tracing::debug!(
            command = %interaction.command_name,
            user = %interaction.user_id,
            ephemeral = reply.ephemeral,
            "Command handled"
        );
        Some(reply)
    }

    async fn create_transfer(&self, interaction: &Interaction) -> CommandReply {
        if !self.permissions.is_allowed(interaction) {
            return CommandReply::private("Only the designated user or role can run this command.");
        }
        let Some(guild_id) = interaction.guild_id.as_deref() else {
            return CommandReply::private("This command only works inside a server.");
        };
        let name = interaction.string_option("name").unwrap_or_default().trim().to_string();
        let Some(limit) = interaction.integer_option("limit") else {
            return CommandReply::private("Missing required option: limit.");
        };

        if let Err(e) = self.orchestrator.validate_lobby(&name, limit) {
            return CommandReply::private(register_error_text(&e));
        }

        let directory = self.orchestrator.directory();
        match directory.list_channels(guild_id).await {
            Ok(channels) => {
                if let Some(existing) = channels.iter().find(|ch| ch.is_voice() && ch.name == name) {
                    return CommandReply::private(format!(
                        "A voice channel with that name already exists: <#{}>",
                        existing.id
                    ));
                }
            }
            Err(e) => {
                tracing::error!(guild = %guild_id, error = %e, "Failed to list channels for create-transfer");
                return CommandReply::private(creation_failed_text());
            }
        }

        let request = NewVoiceChannel {
            name: name.clone(),
            user_limit: 0,
            parent_id: interaction.channel_parent_id.clone(),
            reason: LOBBY_REASON.to_string(),
        };
        let lobby_id = match directory.create_voice_channel(guild_id, request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(guild = %guild_id, name = %name, error = %e, "Failed to create lobby channel");
                return CommandReply::private(creation_failed_text());
            }
        };

        match self.orchestrator.register_lobby(&lobby_id, &name, limit) {
            Ok(config) => CommandReply::public(format!(
                "Created transfer lobby <#{lobby_id}>.\nAnyone who joins it is moved, together with everyone else there, into a new voice channel (member limit: **{}**).",
                limit_text(config.user_limit)
            )),
            Err(e) => {
                // Lost a race with another create-transfer; don't leave an unmanaged channel behind.
                tracing::warn!(lobby = %lobby_id, error = %e, "Lobby registration failed, removing the new channel");
                if let Err(del) = directory.delete_channel(&lobby_id, ROLLBACK_REASON).await {
                    tracing::error!(lobby = %lobby_id, error = %del, "Failed to remove unregistered lobby channel");
                    return CommandReply::private(format!(
                        "{} The channel <#{lobby_id}> was created but could not be removed; delete it by hand.",
                        register_error_text(&e)
                    ));
                }
                CommandReply::private(register_error_text(&e))
            }
        }
    }

    fn remove_transfer(&self, interaction: &Interaction) -> CommandReply {
        if !self.permissions.is_allowed(interaction) {
            return CommandReply::private("Only the designated user or role can run this command.");
        }
        let Some(channel_id) = interaction.string_option("channel") else {
            return CommandReply::private("Missing required option: channel.");
        };
        match self.orchestrator.unregister_lobby(channel_id) {
            Some(config) => CommandReply::private(format!(
                "<#{channel_id}> is no longer a transfer lobby (was `{}`).",
                config.base_name
            )),
            None => CommandReply::private(format!("<#{channel_id}> is not a transfer lobby.")),
        }
    }

    fn list_transfers(&self, interaction: &Interaction) -> CommandReply {
        if !self.permissions.is_allowed(interaction) {
            return CommandReply::private("Only the designated user or role can run this command.");
        }
        let lobbies = self.orchestrator.lobbies();
        if lobbies.is_empty() {
            return CommandReply::private("No transfer lobbies configured.");
        }
        let lines: Vec<String> = lobbies
            .iter()
            .map(|(id, cfg)| {
                format!("<#{id}> → `{}-NNN` (limit: {})", cfg.base_name, limit_text(cfg.user_limit))
            })
            .collect();
        let header = format!(
            "Transfer lobbies ({}), generated channels live: {}",
            lobbies.len(),
            self.orchestrator.generated_channels().len()
        );
        CommandReply::private(fit_message(&header, &lines, MAX_MESSAGE_LEN))
    }

    async fn sync_commands(&self, interaction: &Interaction) -> CommandReply {
        if !self.permissions.is_allowed(interaction) {
            return CommandReply::private("You don't have permission to do that.");
        }
        let Some(guild_id) = interaction.guild_id.as_deref() else {
            return CommandReply::private("This command only works inside a server.");
        };
        match self.sync.sync_guild(guild_id).await {
            Ok(()) => {
                tracing::info!(guild = %guild_id, "Slash commands re-synced on request");
                CommandReply::private(format!("Commands synced for this server ({guild_id})."))
            }
            Err(e) => {
                tracing::error!(guild = %guild_id, error = %e, "Command sync failed");
                CommandReply::private(
                    "Sync failed. Check the bot's application id, permissions, and environment.",
                )
            }
        }
    }
}

fn limit_text(limit: u32) -> String {
    if limit == 0 { "unlimited".to_string() } else { limit.to_string() }
}

fn creation_failed_text() -> &'static str {
    "Failed to create the channel. Make sure the bot has the Manage Channels and Move Members permissions."
}

fn register_error_text(e: &RegisterError) -> String {
    match e {
        RegisterError::EmptyName => "The lobby name must not be empty.".to_string(),
        RegisterError::LimitOutOfRange(n) => format!("Limit must be between 0 and 99 (got {n})."),
        RegisterError::AlreadyRegistered(id) => format!("<#{id}> is already a transfer lobby."),
        RegisterError::NameTaken { channel_id, name } => {
            format!("Lobby <#{channel_id}> already uses the name `{name}`.")
        }
    }
}

/// Join `lines` under `header`, cutting off with "... and N more" past `max_len`.
fn fit_message(header: &str, lines: &[String], max_len: usize) -> String {
    let mut out = header.to_string();
    for (i, line) in lines.iter().enumerate() {
        let remaining = lines.len() - i;
        let footer = format!("\n... and {remaining} more");
        if out.len() + 1 + line.len() + footer.len() > max_len && remaining > 1 {
            out.push_str(&footer);
            return out;
        }
        out.push('\n');
        out.push_str(line);
    }
    out
}
