//! Command-line and environment configuration.
//!
//! Every setting can come from a flag or from the environment; a `.env`
//! file in the working directory is loaded first.

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};

use vcshift_sdk::gateway::DEFAULT_GATEWAY_URL;
use vcshift_sdk::rest::DEFAULT_API_BASE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackendKind {
    /// Pretty-printed JSON file.
    Json,
    /// SQLite database.
    Sqlite,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "vcshift", about = "Lobby overflow bot: moves lobby joiners into fresh voice channels")]
pub struct BotConfig {
    /// Bot token.
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Application (client) id, used for command registration.
    #[arg(long, env = "APPLICATION_ID")]
    pub application_id: Option<String>,

    /// Single guild to register commands in.
    #[arg(long, env = "GUILD_ID")]
    pub guild_id: Option<String>,

    /// Comma-separated guilds to register commands in (takes precedence over GUILD_ID).
    #[arg(long, env = "GUILD_IDS", value_delimiter = ',')]
    pub guild_ids: Vec<String>,

    /// User allowed to run operator commands.
    #[arg(long, env = "ALLOWED_USER_ID")]
    pub allowed_user_id: Option<String>,

    /// Role allowed to run operator commands.
    #[arg(long, env = "ALLOWED_ROLE_ID")]
    pub allowed_role_id: Option<String>,

    /// Lobby store location.
    #[arg(long, env = "VCSHIFT_STORE", default_value = "transfer_channels.json")]
    pub store: PathBuf,

    /// Lobby store format.
    #[arg(long, env = "VCSHIFT_STORE_BACKEND", value_enum, default_value = "json")]
    pub store_backend: StoreBackendKind,

    /// Delay before checking whether a vacated generated channel is empty.
    #[arg(long, env = "VCSHIFT_CLEANUP_DELAY_MS", default_value = "1500")]
    pub cleanup_delay_ms: u64,

    /// Gateway websocket URL.
    #[arg(long, env = "VCSHIFT_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// REST API base URL.
    #[arg(long, env = "VCSHIFT_API_BASE", default_value = DEFAULT_API_BASE)]
    pub api_base: String,

    /// Register slash commands in the configured guilds and exit.
    #[arg(long)]
    pub register: bool,

    /// JSON log output. The environment form accepts 1/0, true/false, yes/no, on/off.
    #[arg(long, env = "VCSHIFT_LOG_JSON", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    pub log_json: bool,
}

impl BotConfig {
    /// Guilds to register commands in: GUILD_IDS if set, else GUILD_ID.
    pub fn command_guilds(&self) -> Vec<String> {
        let listed: Vec<String> = self
            .guild_ids
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if !listed.is_empty() {
            return listed;
        }
        self.guild_id
            .iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.cleanup_delay_ms)
    }

    /// Human-facing configuration mistakes. None of these stop the bot.
    pub fn warnings(&self) -> Vec<String> {
        let mut out = Vec::new();
        match self.application_id.as_deref() {
            Some(id) if is_snowflake(id) => {
                if self.allowed_user_id.as_deref() == Some(id) {
                    out.push(
                        "APPLICATION_ID equals ALLOWED_USER_ID. Use the bot's application (client) id, not a user id."
                            .to_string(),
                    );
                }
            }
            _ => out.push(
                "APPLICATION_ID is missing or invalid. Set your application (client) id.".to_string(),
            ),
        }
        if self.allowed_user_id.is_none() && self.allowed_role_id.is_none() {
            out.push("Neither ALLOWED_USER_ID nor ALLOWED_ROLE_ID is set; nobody can run operator commands.".to_string());
        }
        out
    }
}

/// Platform ids are 17+ digit numbers.
fn is_snowflake(s: &str) -> bool {
    s.len() >= 17 && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BotConfig {
        let mut argv = vec!["vcshift", "--token", "t"];
        argv.extend_from_slice(args);
        BotConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.store, PathBuf::from("transfer_channels.json"));
        assert_eq!(cfg.store_backend, StoreBackendKind::Json);
        assert_eq!(cfg.cleanup_delay(), Duration::from_millis(1500));
        assert!(!cfg.register);
    }

    #[test]
    fn guild_list_wins_over_single_guild() {
        let cfg = parse(&["--guild-id", "1", "--guild-ids", "2, 3,,"]);
        assert_eq!(cfg.command_guilds(), vec!["2", "3"]);

        let single = parse(&["--guild-id", "1"]);
        assert_eq!(single.command_guilds(), vec!["1"]);
        assert!(parse(&[]).command_guilds().is_empty());
    }

    #[test]
    fn application_id_sanity_warnings() {
        let missing = parse(&["--allowed-role-id", "r"]);
        assert_eq!(missing.warnings().len(), 1);

        let same = parse(&[
            "--application-id", "716667546241335328",
            "--allowed-user-id", "716667546241335328",
        ]);
        assert!(same.warnings()[0].contains("ALLOWED_USER_ID"));

        let fine = parse(&["--application-id", "123456789012345678", "--allowed-role-id", "r"]);
        assert!(fine.warnings().is_empty());
    }

    #[test]
    fn log_json_accepts_numeric_env_value() {
        // SAFETY: no other test here sets VCSHIFT_LOG_JSON or asserts on log_json.
        unsafe { std::env::set_var("VCSHIFT_LOG_JSON", "1") };
        let on = BotConfig::try_parse_from(["vcshift", "--token", "t"]);
        unsafe { std::env::set_var("VCSHIFT_LOG_JSON", "0") };
        let off = BotConfig::try_parse_from(["vcshift", "--token", "t"]);
        unsafe { std::env::remove_var("VCSHIFT_LOG_JSON") };

        assert!(on.unwrap().log_json);
        assert!(!off.unwrap().log_json);
        assert!(parse(&["--log-json"]).log_json);
    }

    #[test]
    fn sqlite_backend_flag() {
        let cfg = parse(&["--store-backend", "sqlite", "--store", "lobbies.db"]);
        assert_eq!(cfg.store_backend, StoreBackendKind::Sqlite);
    }
}
