//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;

use vcshift_bot::directory::{Directory, DirectoryError, LiveChannel, NewVoiceChannel};
use vcshift_bot::orchestrator::TransferOrchestrator;
use vcshift_bot::scheduler::Scheduler;
use vcshift_bot::store::{ConfigStore, MemoryBackend};
use vcshift_sdk::event::PresenceChange;
use vcshift_sdk::model::{Channel, ChannelKind};

pub const GUILD: &str = "g1";
pub const CATEGORY: &str = "cat1";

#[derive(Default)]
pub struct FakeState {
    next_id: u64,
    pub channels: Vec<Channel>,
    pub occupants: HashMap<String, Vec<String>>,
    pub created: Vec<NewVoiceChannel>,
    pub moves: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub fail_create: bool,
    pub fail_list: bool,
    pub fail_fetch: bool,
    pub fail_delete: bool,
    pub fail_moves_for: HashSet<String>,
}

/// In-memory guild. Every call yields once so concurrent handlers interleave
/// the way they do against a real network.
#[derive(Default)]
pub struct FakeDirectory {
    pub state: Mutex<FakeState>,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_voice_channel(&self, id: &str, name: &str, parent: Option<&str>) {
        self.state.lock().channels.push(Channel {
            id: id.into(),
            kind: ChannelKind::Voice,
            guild_id: Some(GUILD.into()),
            name: name.into(),
            parent_id: parent.map(str::to_string),
            user_limit: 0,
        });
    }

    pub fn add_text_channel(&self, id: &str, name: &str) {
        self.state.lock().channels.push(Channel {
            id: id.into(),
            kind: ChannelKind::Text,
            guild_id: Some(GUILD.into()),
            name: name.into(),
            parent_id: None,
            user_limit: 0,
        });
    }

    /// Put members into a channel (without any event).
    pub fn seat(&self, channel_id: &str, members: &[&str]) {
        let mut st = self.state.lock();
        let seats = st.occupants.entry(channel_id.to_string()).or_default();
        seats.extend(members.iter().map(|m| m.to_string()));
    }

    pub fn unseat(&self, channel_id: &str, member: &str) {
        if let Some(seats) = self.state.lock().occupants.get_mut(channel_id) {
            seats.retain(|m| m != member);
        }
    }

    pub fn occupants_of(&self, channel_id: &str) -> Vec<String> {
        self.state.lock().occupants.get(channel_id).cloned().unwrap_or_default()
    }

    pub fn channel_named(&self, name: &str) -> Option<Channel> {
        self.state.lock().channels.iter().find(|c| c.name == name).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.state.lock().created.len()
    }
}

#[async_trait]
impl Directory for FakeDirectory {
    async fn list_channels(&self, _guild_id: &str) -> Result<Vec<Channel>, DirectoryError> {
        tokio::task::yield_now().await;
        let st = self.state.lock();
        if st.fail_list {
            return Err(DirectoryError::Unavailable("list refused".into()));
        }
        Ok(st.channels.clone())
    }

    async fn occupants(&self, channel_id: &str) -> Result<Vec<String>, DirectoryError> {
        tokio::task::yield_now().await;
        Ok(self.occupants_of(channel_id))
    }

    async fn create_voice_channel(
        &self,
        guild_id: &str,
        request: NewVoiceChannel,
    ) -> Result<String, DirectoryError> {
        tokio::task::yield_now().await;
        let mut st = self.state.lock();
        if st.fail_create {
            return Err(DirectoryError::Unavailable("create refused".into()));
        }
        st.next_id += 1;
        let id = format!("gen{}", st.next_id);
        st.channels.push(Channel {
            id: id.clone(),
            kind: ChannelKind::Voice,
            guild_id: Some(guild_id.to_string()),
            name: request.name.clone(),
            parent_id: request.parent_id.clone(),
            user_limit: request.user_limit,
        });
        st.created.push(request);
        Ok(id)
    }

    async fn move_member(
        &self,
        _guild_id: &str,
        member_id: &str,
        channel_id: &str,
    ) -> Result<(), DirectoryError> {
        tokio::task::yield_now().await;
        let mut st = self.state.lock();
        if st.fail_moves_for.contains(member_id) {
            return Err(DirectoryError::Unavailable(format!("cannot move {member_id}")));
        }
        for seats in st.occupants.values_mut() {
            seats.retain(|m| m != member_id);
        }
        st.occupants
            .entry(channel_id.to_string())
            .or_default()
            .push(member_id.to_string());
        st.moves.push((member_id.to_string(), channel_id.to_string()));
        Ok(())
    }

    async fn delete_channel(&self, channel_id: &str, _reason: &str) -> Result<(), DirectoryError> {
        tokio::task::yield_now().await;
        let mut st = self.state.lock();
        if st.fail_delete {
            return Err(DirectoryError::Unavailable("delete refused".into()));
        }
        st.channels.retain(|c| c.id != channel_id);
        st.occupants.remove(channel_id);
        st.deleted.push(channel_id.to_string());
        Ok(())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<LiveChannel, DirectoryError> {
        tokio::task::yield_now().await;
        let st = self.state.lock();
        if st.fail_fetch {
            return Err(DirectoryError::Unavailable("fetch refused".into()));
        }
        if !st.channels.iter().any(|c| c.id == channel_id) {
            return Err(DirectoryError::NotFound(channel_id.to_string()));
        }
        Ok(LiveChannel {
            id: channel_id.to_string(),
            occupants: st.occupants.get(channel_id).cloned().unwrap_or_default(),
        })
    }
}

/// Scheduler that holds tasks until the test runs them.
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<(Duration, BoxFuture<'static, ()>)>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.pending.lock().iter().map(|(d, _)| *d).collect()
    }

    /// Run every pending task to completion, in scheduling order.
    pub async fn run_all(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.pending.lock());
        for (_, task) in tasks {
            task.await;
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: BoxFuture<'static, ()>) {
        self.pending.lock().push((delay, task));
    }
}

pub fn orchestrator_with(
    directory: Arc<FakeDirectory>,
    scheduler: Arc<dyn Scheduler>,
) -> Arc<TransferOrchestrator> {
    let store = ConfigStore::open(Box::new(MemoryBackend::new()));
    Arc::new(TransferOrchestrator::new(store, directory, scheduler))
}

pub fn join(member: &str, channel: &str) -> PresenceChange {
    PresenceChange {
        member_id: member.into(),
        guild_id: GUILD.into(),
        previous_channel_id: None,
        new_channel_id: Some(channel.into()),
    }
}

pub fn leave(member: &str, channel: &str) -> PresenceChange {
    PresenceChange {
        member_id: member.into(),
        guild_id: GUILD.into(),
        previous_channel_id: Some(channel.into()),
        new_channel_id: None,
    }
}
