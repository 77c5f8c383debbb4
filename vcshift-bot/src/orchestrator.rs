//! Transfer orchestrator: lobby joins spawn overflow channels, leaves reclaim them.
//!
//! Per lobby the orchestrator is either `Idle` or `Provisioning`; the
//! [`CreationLock`] is that state. A provisioning pass is:
//!
//! ```text
//! join into lobby → lock → snapshot occupants → next name → create channel
//!                 → register channel → move everyone (best effort) → unlock
//! ```
//!
//! Leaves from a generated channel schedule a delayed recheck; the channel is
//! deleted only if it is still empty when the recheck runs.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use vcshift_sdk::event::PresenceChange;

use crate::directory::{Directory, DirectoryError, NewVoiceChannel};
use crate::events::EventSource;
use crate::lock::{CreationGuard, CreationLock};
use crate::naming::{next_auto_name, suffix_of};
use crate::registry::GeneratedChannelRegistry;
use crate::scheduler::Scheduler;
use crate::store::{ConfigStore, LobbyConfig};

/// Delay between a leave and the emptiness recheck.
pub const DEFAULT_CLEANUP_DELAY: Duration = Duration::from_millis(1500);
/// Highest accepted generated-channel capacity.
pub const MAX_USER_LIMIT: i64 = 99;

const CREATE_REASON: &str = "Auto-generated by transfer VC bot";
const DELETE_REASON: &str = "Auto-delete empty generated VC";

/// Result of handling one join event.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The joined channel has no lobby configuration.
    NotALobby,
    /// A pass for this lobby is already running; it will pick this member up.
    Busy,
    /// Everyone had already left by the time the pass looked.
    EmptyLobby,
    Transferred(TransferReport),
    /// Snapshot, listing, or channel creation failed; nothing was created.
    Failed(DirectoryError),
}

/// What one provisioning pass did.
#[derive(Debug)]
pub struct TransferReport {
    pub lobby_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub moved: Vec<String>,
    /// Members whose move failed, each with its own error.
    pub failed: Vec<(String, DirectoryError)>,
}

/// Result of one cleanup recheck.
#[derive(Debug)]
pub enum CleanupOutcome {
    Deleted,
    /// Someone is in the channel again; it stays tracked.
    Occupied,
    /// Not (or no longer) a generated channel.
    Untracked,
    /// The channel no longer exists on the platform; dropped from tracking.
    Gone,
    /// Fetch or delete failed; the channel stays tracked for a later leave.
    Failed(DirectoryError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("user limit {0} is outside 0..=99")]
    LimitOutOfRange(i64),
    #[error("channel {0} is already a lobby")]
    AlreadyRegistered(String),
    #[error("lobby {channel_id} already uses the name {name}")]
    NameTaken { channel_id: String, name: String },
}

/// A provisioning pass that has passed the gate and holds the lobby lock.
#[derive(Debug)]
pub struct ProvisionPass {
    guard: CreationGuard,
    guild_id: String,
    config: LobbyConfig,
}

impl ProvisionPass {
    pub fn lobby_id(&self) -> &str {
        self.guard.lobby_id()
    }
}

pub struct TransferOrchestrator {
    store: ConfigStore,
    directory: Arc<dyn Directory>,
    scheduler: Arc<dyn Scheduler>,
    locks: CreationLock,
    generated: GeneratedChannelRegistry,
    /// Highest suffix handed out per base name, so deleted numbers stay retired.
    issued: Mutex<HashMap<String, u32>>,
    cleanup_delay: Duration,
}

impl TransferOrchestrator {
    pub fn new(
        store: ConfigStore,
        directory: Arc<dyn Directory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            store,
            directory,
            scheduler,
            locks: CreationLock::new(),
            generated: GeneratedChannelRegistry::new(),
            issued: Mutex::new(HashMap::new()),
            cleanup_delay: DEFAULT_CLEANUP_DELAY,
        }
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    // ── Lobby configuration ─────────────────────────────────────────────

    /// Check a prospective lobby's settings without persisting anything.
    pub fn validate_lobby(&self, base_name: &str, user_limit: i64) -> Result<LobbyConfig, RegisterError> {
        let base_name = base_name.trim();
        if base_name.is_empty() {
            return Err(RegisterError::EmptyName);
        }
        if !(0..=MAX_USER_LIMIT).contains(&user_limit) {
            return Err(RegisterError::LimitOutOfRange(user_limit));
        }
        if let Some((existing, _)) = self
            .store
            .snapshot()
            .into_iter()
            .find(|(_, cfg)| cfg.base_name == base_name)
        {
            return Err(RegisterError::NameTaken {
                channel_id: existing,
                name: base_name.to_string(),
            });
        }
        Ok(LobbyConfig {
            base_name: base_name.to_string(),
            user_limit: user_limit as u32,
        })
    }

    /// Validate and persist a new lobby.
    pub fn register_lobby(
        &self,
        channel_id: &str,
        base_name: &str,
        user_limit: i64,
    ) -> Result<LobbyConfig, RegisterError> {
        if self.store.contains(channel_id) {
            return Err(RegisterError::AlreadyRegistered(channel_id.to_string()));
        }
        let config = self.validate_lobby(base_name, user_limit)?;
        self.store.set(channel_id, config.clone());
        tracing::info!(lobby = %channel_id, base_name = %config.base_name, user_limit = config.user_limit, "Lobby registered");
        Ok(config)
    }

    /// Forget a lobby. Generated channels it already spawned stay tracked.
    pub fn unregister_lobby(&self, channel_id: &str) -> Option<LobbyConfig> {
        let removed = self.store.remove(channel_id);
        if removed.is_some() {
            tracing::info!(lobby = %channel_id, "Lobby unregistered");
        }
        removed
    }

    pub fn lobby(&self, channel_id: &str) -> Option<LobbyConfig> {
        self.store.get(channel_id)
    }

    pub fn lobbies(&self) -> BTreeMap<String, LobbyConfig> {
        self.store.snapshot()
    }

    pub fn is_provisioning(&self, lobby_id: &str) -> bool {
        self.locks.is_held(lobby_id)
    }

    pub fn is_generated(&self, channel_id: &str) -> bool {
        self.generated.contains(channel_id)
    }

    pub fn generated_channels(&self) -> Vec<String> {
        self.generated.snapshot()
    }

    /// Highest generated-channel number this instance has created for `base_name`.
    pub fn highest_issued(&self, base_name: &str) -> u32 {
        self.issued.lock().get(base_name).copied().unwrap_or(0)
    }

    fn record_issued(&self, base_name: &str, name: &str) {
        if let Some(n) = suffix_of(base_name, name) {
            let mut issued = self.issued.lock();
            let high = issued.entry(base_name.to_string()).or_insert(0);
            *high = (*high).max(n);
        }
    }

    // ── Event entry points ──────────────────────────────────────────────

    /// Event-shell entry point.
    ///
    /// The join gate (lobby lookup and lock) runs synchronously here, in event
    /// arrival order; the rest of the pass and the leave handling run as tasks.
    pub fn dispatch(self: &Arc<Self>, change: PresenceChange) {
        if change.joined().is_some() {
            match self.begin_join(&change) {
                Ok(pass) => {
                    let this = Arc::clone(self);
                    tokio::spawn(async move {
                        this.provision(pass).await;
                    });
                }
                Err(JoinOutcome::Busy) => {
                    tracing::debug!(member = %change.member_id, "Lobby busy, joiner rides the running pass");
                }
                Err(_) => {}
            }
        }
        self.handle_leave(&change);
    }

    /// Feed every transition from `source` into [`dispatch`](Self::dispatch).
    /// The source must publish from inside a tokio runtime.
    pub fn attach(self: &Arc<Self>, source: &dyn EventSource) {
        let this = Arc::clone(self);
        source.subscribe(Arc::new(move |change: PresenceChange| this.dispatch(change)));
    }

    /// Handle a join event end to end.
    pub async fn handle_join(&self, change: &PresenceChange) -> JoinOutcome {
        match self.begin_join(change) {
            Ok(pass) => self.provision(pass).await,
            Err(outcome) => outcome,
        }
    }

    /// Gate a join: is it a lobby, and is the lobby idle? Takes the lock on success.
    ///
    /// Never suspends, so two joins cannot both pass the gate.
    pub fn begin_join(&self, change: &PresenceChange) -> Result<ProvisionPass, JoinOutcome> {
        let lobby_id = change.joined().ok_or(JoinOutcome::NotALobby)?;
        let config = self.store.get(lobby_id).ok_or(JoinOutcome::NotALobby)?;
        let guard = self.locks.try_acquire(lobby_id).ok_or(JoinOutcome::Busy)?;
        Ok(ProvisionPass {
            guard,
            guild_id: change.guild_id.clone(),
            config,
        })
    }

    /// Run a gated pass. The lock is released when `pass` drops, on every path.
    pub async fn provision(&self, pass: ProvisionPass) -> JoinOutcome {
        let lobby_id = pass.lobby_id().to_string();
        let guild_id = pass.guild_id.as_str();

        let members = match self.directory.occupants(&lobby_id).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(lobby = %lobby_id, error = %e, "Failed to snapshot lobby occupants");
                return JoinOutcome::Failed(e);
            }
        };
        if members.is_empty() {
            tracing::debug!(lobby = %lobby_id, "Lobby emptied before provisioning, nothing to do");
            return JoinOutcome::EmptyLobby;
        }

        let channels = match self.directory.list_channels(guild_id).await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(lobby = %lobby_id, guild = %guild_id, error = %e, "Failed to list guild channels");
                return JoinOutcome::Failed(e);
            }
        };
        let parent_id = channels
            .iter()
            .find(|ch| ch.id == lobby_id)
            .and_then(|ch| ch.parent_id.clone());
        let base_name = pass.config.base_name.as_str();
        let name = next_auto_name(
            base_name,
            channels.iter().filter(|ch| ch.is_voice()).map(|ch| ch.name.as_str()),
            self.highest_issued(base_name),
        );

        let request = NewVoiceChannel {
            name: name.clone(),
            user_limit: pass.config.user_limit,
            parent_id,
            reason: CREATE_REASON.to_string(),
        };
        let channel_id = match self.directory.create_voice_channel(guild_id, request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(lobby = %lobby_id, name = %name, error = %e, "Failed to create overflow channel");
                return JoinOutcome::Failed(e);
            }
        };
        self.generated.insert(&channel_id);
        self.record_issued(base_name, &name);
        tracing::info!(
            lobby = %lobby_id,
            channel = %channel_id,
            name = %name,
            members = members.len(),
            "Overflow channel created"
        );

        let results = join_all(members.into_iter().map(|member| {
            let channel_id = channel_id.as_str();
            async move {
                let result = self.directory.move_member(guild_id, &member, channel_id).await;
                (member, result)
            }
        }))
        .await;

        let mut moved = Vec::new();
        let mut failed = Vec::new();
        for (member, result) in results {
            match result {
                Ok(()) => moved.push(member),
                Err(e) => {
                    tracing::warn!(lobby = %lobby_id, channel = %channel_id, member = %member, error = %e, "Failed to move member");
                    failed.push((member, e));
                }
            }
        }
        tracing::info!(
            lobby = %lobby_id,
            channel = %channel_id,
            moved = moved.len(),
            failed = failed.len(),
            "Transfer complete"
        );

        drop(pass);
        JoinOutcome::Transferred(TransferReport {
            lobby_id,
            channel_id,
            channel_name: name,
            moved,
            failed,
        })
    }

    /// Schedule an emptiness recheck if the member left a generated channel.
    ///
    /// Returns whether a recheck was scheduled.
    pub fn handle_leave(self: &Arc<Self>, change: &PresenceChange) -> bool {
        let Some(left) = change.left() else {
            return false;
        };
        if !self.generated.contains(left) {
            return false;
        }

        let this = Arc::clone(self);
        let channel_id = left.to_string();
        tracing::debug!(channel = %channel_id, delay_ms = self.cleanup_delay.as_millis() as u64, "Scheduling cleanup recheck");
        self.scheduler.schedule_once(
            self.cleanup_delay,
            Box::pin(async move {
                this.recheck(&channel_id).await;
            }),
        );
        true
    }

    /// Delete a generated channel if it is empty right now.
    pub async fn recheck(&self, channel_id: &str) -> CleanupOutcome {
        if !self.generated.contains(channel_id) {
            return CleanupOutcome::Untracked;
        }

        let live = match self.directory.fetch_channel(channel_id).await {
            Ok(live) => live,
            Err(DirectoryError::NotFound(_)) => {
                tracing::info!(channel = %channel_id, "Generated channel already gone");
                self.generated.remove(channel_id);
                return CleanupOutcome::Gone;
            }
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "Cleanup fetch failed, keeping channel tracked");
                return CleanupOutcome::Failed(e);
            }
        };
        if !live.occupants.is_empty() {
            tracing::debug!(channel = %channel_id, occupants = live.occupants.len(), "Channel occupied again, keeping it");
            return CleanupOutcome::Occupied;
        }

        match self.directory.delete_channel(channel_id, DELETE_REASON).await {
            Ok(()) => {
                self.generated.remove(channel_id);
                tracing::info!(channel = %channel_id, "Empty generated channel deleted");
                CleanupOutcome::Deleted
            }
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "Cleanup delete failed, keeping channel tracked");
                CleanupOutcome::Failed(e)
            }
        }
    }
}
