//! The guild directory as the transfer core sees it.
//!
//! [`Directory`] is the seam between the orchestrator and the platform.
//! [`LiveDirectory`] answers it from the REST API plus the gateway-fed
//! presence cache; tests substitute an in-memory fake.

use std::sync::Arc;

use async_trait::async_trait;
use vcshift_sdk::cache::PresenceCache;
use vcshift_sdk::model::{Channel, ChannelKind, CreateChannel};
use vcshift_sdk::rest::{RestClient, RestError};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error("channel {0} not found")]
    NotFound(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Request for a new voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoiceChannel {
    pub name: String,
    pub user_limit: u32,
    pub parent_id: Option<String>,
    /// Audit-log reason.
    pub reason: String,
}

/// A channel's live occupancy, re-read right before deciding to delete it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveChannel {
    pub id: String,
    pub occupants: Vec<String>,
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// All channels in a guild.
    async fn list_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DirectoryError>;
    /// Members currently connected to a voice channel.
    async fn occupants(&self, channel_id: &str) -> Result<Vec<String>, DirectoryError>;
    /// Create a voice channel and return its id.
    async fn create_voice_channel(
        &self,
        guild_id: &str,
        request: NewVoiceChannel,
    ) -> Result<String, DirectoryError>;
    /// Move one connected member into `channel_id`.
    async fn move_member(
        &self,
        guild_id: &str,
        member_id: &str,
        channel_id: &str,
    ) -> Result<(), DirectoryError>;
    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), DirectoryError>;
    /// Re-read a channel's state from the platform.
    async fn fetch_channel(&self, channel_id: &str) -> Result<LiveChannel, DirectoryError>;
}

/// Directory backed by the REST API and the presence cache.
pub struct LiveDirectory {
    rest: RestClient,
    cache: Arc<PresenceCache>,
}

impl LiveDirectory {
    pub fn new(rest: RestClient, cache: Arc<PresenceCache>) -> Self {
        Self { rest, cache }
    }
}

#[async_trait]
impl Directory for LiveDirectory {
    async fn list_channels(&self, guild_id: &str) -> Result<Vec<Channel>, DirectoryError> {
        match self.rest.list_guild_channels(guild_id).await {
            Ok(channels) => Ok(channels),
            Err(e) => {
                // The cache mirrors channel events, so it is a usable fallback.
                tracing::warn!(guild = %guild_id, error = %e, "Channel list failed, using cache");
                let cached = self.cache.guild_channels(guild_id);
                if cached.is_empty() {
                    return Err(e.into());
                }
                Ok(cached)
            }
        }
    }

    async fn occupants(&self, channel_id: &str) -> Result<Vec<String>, DirectoryError> {
        // Voice membership is only observable through gateway events.
        Ok(self.cache.occupants(channel_id))
    }

    async fn create_voice_channel(
        &self,
        guild_id: &str,
        request: NewVoiceChannel,
    ) -> Result<String, DirectoryError> {
        let body = CreateChannel {
            name: request.name,
            kind: ChannelKind::Voice,
            user_limit: request.user_limit,
            parent_id: request.parent_id,
        };
        let mut channel = self.rest.create_channel(guild_id, &body, &request.reason).await?;
        channel.guild_id.get_or_insert_with(|| guild_id.to_string());
        let id = channel.id.clone();
        self.cache.upsert_channel(channel);
        Ok(id)
    }

    async fn move_member(
        &self,
        guild_id: &str,
        member_id: &str,
        channel_id: &str,
    ) -> Result<(), DirectoryError> {
        self.rest.move_member(guild_id, member_id, channel_id).await?;
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), DirectoryError> {
        self.rest.delete_channel(channel_id, reason).await?;
        self.cache.remove_channel(channel_id);
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<LiveChannel, DirectoryError> {
        let channel = self.rest.get_channel(channel_id).await.map_err(|e| {
            if e.is_not_found() {
                DirectoryError::NotFound(channel_id.to_string())
            } else {
                e.into()
            }
        })?;
        Ok(LiveChannel {
            occupants: self.cache.occupants(&channel.id),
            id: channel.id,
        })
    }
}
