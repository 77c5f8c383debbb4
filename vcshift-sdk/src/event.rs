//! Events emitted by the gateway client for the bot layer to consume.

use crate::model::{Channel, Interaction, VoiceState};

/// Events that the SDK emits to the consumer.
#[derive(Debug, Clone)]
pub enum Event {
    /// Websocket is open and HELLO was received.
    Connected,

    /// IDENTIFY accepted. `user_id` is the bot's own account.
    Ready {
        user_id: String,
        user_name: String,
    },

    /// Full guild snapshot, sent once per guild after READY (and when the bot
    /// is added to a new guild).
    GuildAvailable {
        guild_id: String,
        channels: Vec<Channel>,
        voice_states: Vec<VoiceState>,
    },

    /// A member's voice state changed (joined, left, or switched channel).
    VoiceStateUpdate(VoiceState),

    ChannelCreated(Channel),
    ChannelUpdated(Channel),
    ChannelDeleted(Channel),

    /// A slash command was invoked.
    Interaction(Interaction),

    /// Session ended.
    Disconnected {
        reason: String,
    },
}

/// A voice-presence transition, resolved against the previous state.
///
/// This is what the transfer core consumes: the gateway only reports the new
/// channel, the presence cache fills in where the member came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub member_id: String,
    pub guild_id: String,
    pub previous_channel_id: Option<String>,
    pub new_channel_id: Option<String>,
}

impl PresenceChange {
    /// Channel the member entered, if any.
    pub fn joined(&self) -> Option<&str> {
        self.new_channel_id.as_deref()
    }

    /// Channel the member left, if any.
    pub fn left(&self) -> Option<&str> {
        self.previous_channel_id.as_deref()
    }
}
