//! In-process presence cache.
//!
//! The gateway reports a member's *new* voice channel only. To know which
//! channel they left, and who currently occupies a channel, the client keeps
//! the last known state here, fed from gateway events.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::event::{Event, PresenceChange};
use crate::model::{Channel, VoiceState};

#[derive(Debug, Clone)]
struct Presence {
    guild_id: String,
    channel_id: String,
}

#[derive(Default)]
struct Inner {
    /// user id → current voice channel. Absent while not in voice.
    voice: HashMap<String, Presence>,
    /// channel id → channel
    channels: HashMap<String, Channel>,
}

#[derive(Default)]
pub struct PresenceCache {
    inner: Mutex<Inner>,
}

impl PresenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a gateway event. Returns the presence transition for voice updates
    /// that actually moved the member.
    pub fn apply(&self, event: &Event) -> Option<PresenceChange> {
        match event {
            Event::GuildAvailable {
                guild_id,
                channels,
                voice_states,
            } => {
                self.load_guild(guild_id, channels, voice_states);
                None
            }
            Event::VoiceStateUpdate(state) => self.apply_voice_state(state),
            Event::ChannelCreated(ch) | Event::ChannelUpdated(ch) => {
                self.upsert_channel(ch.clone());
                None
            }
            Event::ChannelDeleted(ch) => {
                self.remove_channel(&ch.id);
                None
            }
            _ => None,
        }
    }

    /// Replace everything known about one guild with a fresh snapshot.
    pub fn load_guild(&self, guild_id: &str, channels: &[Channel], voice_states: &[VoiceState]) {
        let mut inner = self.inner.lock();
        inner
            .channels
            .retain(|_, ch| ch.guild_id.as_deref() != Some(guild_id));
        inner.voice.retain(|_, p| p.guild_id != guild_id);

        for ch in channels {
            let mut ch = ch.clone();
            ch.guild_id.get_or_insert_with(|| guild_id.to_string());
            inner.channels.insert(ch.id.clone(), ch);
        }
        for vs in voice_states {
            if let Some(channel_id) = &vs.channel_id {
                inner.voice.insert(
                    vs.user_id.clone(),
                    Presence {
                        guild_id: guild_id.to_string(),
                        channel_id: channel_id.clone(),
                    },
                );
            }
        }
        tracing::debug!(
            guild = %guild_id,
            channels = channels.len(),
            in_voice = voice_states.len(),
            "Guild snapshot loaded"
        );
    }

    /// Record a voice state and return the transition it represents.
    ///
    /// Returns `None` when the member's channel did not change (mute/deafen
    /// toggles arrive as voice state updates too).
    pub fn apply_voice_state(&self, state: &VoiceState) -> Option<PresenceChange> {
        let mut inner = self.inner.lock();
        let previous = inner.voice.get(&state.user_id).cloned();
        let guild_id = state
            .guild_id
            .clone()
            .or_else(|| previous.as_ref().map(|p| p.guild_id.clone()))?;

        let previous_channel_id = previous.map(|p| p.channel_id);
        if previous_channel_id == state.channel_id {
            return None;
        }

        match &state.channel_id {
            Some(channel_id) => {
                inner.voice.insert(
                    state.user_id.clone(),
                    Presence {
                        guild_id: guild_id.clone(),
                        channel_id: channel_id.clone(),
                    },
                );
            }
            None => {
                inner.voice.remove(&state.user_id);
            }
        }

        Some(PresenceChange {
            member_id: state.user_id.clone(),
            guild_id,
            previous_channel_id,
            new_channel_id: state.channel_id.clone(),
        })
    }

    /// Members currently in a voice channel, sorted by id.
    pub fn occupants(&self, channel_id: &str) -> Vec<String> {
        let inner = self.inner.lock();
        let mut members: Vec<String> = inner
            .voice
            .iter()
            .filter(|(_, p)| p.channel_id == channel_id)
            .map(|(user, _)| user.clone())
            .collect();
        members.sort();
        members
    }

    pub fn channel(&self, channel_id: &str) -> Option<Channel> {
        self.inner.lock().channels.get(channel_id).cloned()
    }

    pub fn guild_channels(&self, guild_id: &str) -> Vec<Channel> {
        let inner = self.inner.lock();
        let mut channels: Vec<Channel> = inner
            .channels
            .values()
            .filter(|ch| ch.guild_id.as_deref() == Some(guild_id))
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.id.cmp(&b.id));
        channels
    }

    pub fn upsert_channel(&self, channel: Channel) {
        self.inner.lock().channels.insert(channel.id.clone(), channel);
    }

    /// Forget a channel and everyone the cache still placed in it.
    pub fn remove_channel(&self, channel_id: &str) {
        let mut inner = self.inner.lock();
        inner.channels.remove(channel_id);
        inner.voice.retain(|_, p| p.channel_id != channel_id);
    }
}
