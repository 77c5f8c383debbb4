//! Gateway client: the websocket event stream.
//!
//! Manages the websocket connection, IDENTIFY, heartbeating, and translation
//! of DISPATCH frames into [`Event`]s.
//!
//! ## Reconnection
//!
//! Sessions are not resumed. When the server asks for a reconnect, sends
//! INVALID_SESSION, misses heartbeat ACKs, or closes the socket, the client
//! emits [`Event::Disconnected`] and stops. Consumers should reconnect with
//! exponential backoff (e.g., 2→4→8→16→30s cap) and rely on the fresh
//! `GuildAvailable` snapshots to rebuild state.

use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::event::Event;
use crate::model::{Channel, Interaction, VoiceState};

pub const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// GUILDS | GUILD_VOICE_STATES
pub const INTENTS: u64 = (1 << 0) | (1 << 7);

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

/// Configuration for connecting to the gateway.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Websocket URL.
    pub gateway_url: String,
    /// Bot token.
    pub token: String,
    /// Gateway intents bitmask.
    pub intents: u64,
}

impl ConnectConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            token: token.into(),
            intents: INTENTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway closed before HELLO")]
    NoHello,
    #[error("server requested reconnect")]
    ReconnectRequested,
    #[error("session invalidated")]
    InvalidSession,
    #[error("heartbeat not acknowledged")]
    HeartbeatTimeout,
    #[error("gateway closed: {0}")]
    Closed(String),
}

/// Commands the consumer can send to the client.
#[derive(Debug)]
pub enum Command {
    Shutdown,
}

/// A handle to a running gateway session.
#[derive(Clone)]
pub struct GatewayHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl GatewayHandle {
    pub async fn shutdown(&self) -> Result<()> {
        self.cmd_tx.send(Command::Shutdown).await?;
        Ok(())
    }
}

/// Raw gateway frame.
#[derive(Debug, Deserialize)]
struct Frame {
    op: u8,
    #[serde(default)]
    d: serde_json::Value,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

/// Connect to the gateway and run the session.
///
/// Returns a handle for sending commands and a receiver for events.
/// The connection runs in a spawned task.
pub fn connect(config: ConnectConfig) -> (GatewayHandle, mpsc::Receiver<Event>) {
    let (event_tx, event_rx) = mpsc::channel(4096);
    let (cmd_tx, cmd_rx) = mpsc::channel(16);

    let handle = GatewayHandle { cmd_tx };

    tokio::spawn(async move {
        let reason = match run_gateway(&config, event_tx.clone(), cmd_rx).await {
            Ok(()) => "shutdown".to_string(),
            Err(e) => e.to_string(),
        };
        let _ = event_tx.send(Event::Disconnected { reason }).await;
    });

    (handle, event_rx)
}

async fn run_gateway(
    config: &ConnectConfig,
    event_tx: mpsc::Sender<Event>,
    mut cmd_rx: mpsc::Receiver<Command>,
) -> Result<()> {
    tracing::debug!(url = %config.gateway_url, "Connecting to gateway");
    let (ws, _resp) = tokio_tungstenite::connect_async(config.gateway_url.as_str())
        .await
        .map_err(|e| anyhow::anyhow!("Gateway connect to {} failed: {e}", config.gateway_url))?;
    let (mut write, mut read) = ws.split();

    // First frame must be HELLO with the heartbeat interval.
    let interval_ms = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame: Frame = serde_json::from_str(&text)?;
                if frame.op == OP_HELLO {
                    break frame
                        .d
                        .get("heartbeat_interval")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(41_250);
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(GatewayError::NoHello.into()),
        }
    };
    let _ = event_tx.send(Event::Connected).await;

    let identify = serde_json::json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": config.token,
            "intents": config.intents,
            "properties": { "os": std::env::consts::OS, "browser": "vcshift", "device": "vcshift" },
        }
    });
    write.send(Message::Text(identify.to_string())).await?;

    let interval = Duration::from_millis(interval_ms);
    // First beat is jittered so a fleet of restarting bots doesn't beat in lockstep.
    let jitter = rand::thread_rng().gen_range(0.0..1.0);
    let first_beat = tokio::time::Instant::now() + interval.mul_f64(jitter);
    let mut heartbeat = tokio::time::interval_at(first_beat, interval);
    let mut last_seq: Option<u64> = None;
    let mut awaiting_ack = false;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if awaiting_ack {
                    return Err(GatewayError::HeartbeatTimeout.into());
                }
                let beat = serde_json::json!({ "op": OP_HEARTBEAT, "d": last_seq });
                write.send(Message::Text(beat.to_string())).await?;
                awaiting_ack = true;
            }
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame.map(|f| format!("{} {}", u16::from(f.code), f.reason)).unwrap_or_default();
                        return Err(GatewayError::Closed(reason).into());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(GatewayError::Closed("EOF".to_string()).into()),
                };
                let frame: Frame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        tracing::warn!(error = %e, "Unparseable gateway frame");
                        continue;
                    }
                };
                if frame.s.is_some() {
                    last_seq = frame.s;
                }
                match frame.op {
                    OP_DISPATCH => {
                        let Some(t) = frame.t.as_deref() else { continue };
                        if let Some(event) = parse_dispatch(t, &frame.d) {
                            if event_tx.send(event).await.is_err() {
                                return Ok(());
                            }
                        }
                    }
                    OP_HEARTBEAT => {
                        let beat = serde_json::json!({ "op": OP_HEARTBEAT, "d": last_seq });
                        write.send(Message::Text(beat.to_string())).await?;
                    }
                    OP_HEARTBEAT_ACK => awaiting_ack = false,
                    OP_RECONNECT => return Err(GatewayError::ReconnectRequested.into()),
                    OP_INVALID_SESSION => return Err(GatewayError::InvalidSession.into()),
                    other => tracing::trace!(op = other, "Ignoring gateway opcode"),
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Shutdown) | None => {
                        let _ = write.send(Message::Close(None)).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Translate one DISPATCH frame into an [`Event`]. Unknown types are dropped.
pub fn parse_dispatch(t: &str, d: &serde_json::Value) -> Option<Event> {
    match t {
        "READY" => {
            let user = d.get("user")?;
            Some(Event::Ready {
                user_id: user.get("id")?.as_str()?.to_string(),
                user_name: user
                    .get("username")
                    .and_then(|u| u.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
        }
        "GUILD_CREATE" => {
            if d.get("unavailable").and_then(|u| u.as_bool()) == Some(true) {
                return None;
            }
            let guild_id = d.get("id")?.as_str()?.to_string();
            let channels: Vec<Channel> = d
                .get("channels")
                .and_then(|c| serde_json::from_value(c.clone()).ok())
                .unwrap_or_default();
            let voice_states: Vec<VoiceState> = d
                .get("voice_states")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default();
            Some(Event::GuildAvailable {
                guild_id,
                channels,
                voice_states,
            })
        }
        "VOICE_STATE_UPDATE" => serde_json::from_value(d.clone())
            .map(Event::VoiceStateUpdate)
            .ok(),
        "CHANNEL_CREATE" => serde_json::from_value(d.clone()).map(Event::ChannelCreated).ok(),
        "CHANNEL_UPDATE" => serde_json::from_value(d.clone()).map(Event::ChannelUpdated).ok(),
        "CHANNEL_DELETE" => serde_json::from_value(d.clone()).map(Event::ChannelDeleted).ok(),
        "INTERACTION_CREATE" => Interaction::from_dispatch(d).map(Event::Interaction),
        _ => None,
    }
}
