//! vcshift-bot: lobby overflow for voice channels.
//!
//! An operator designates a lobby channel. When people join it, the bot
//! creates a fresh sibling voice channel (`<name>-001`, `-002`, ...), moves
//! everyone in the lobby there, and deletes the channel again once it empties.
//!
//! - `store`: durable lobby configuration
//! - `naming`: sequential generated-channel names
//! - `lock` / `registry`: per-lobby creation lock, generated-channel set
//! - `orchestrator`: join/leave handling, provisioning, cleanup
//! - `directory` / `scheduler` / `events`: seams to the platform, to timers
//!   and to the presence feed
//! - `commands` / `config`: the operator-facing shell

pub mod commands;
pub mod config;
pub mod directory;
pub mod events;
pub mod lock;
pub mod naming;
pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod store;
