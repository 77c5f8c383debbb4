//! Wire models shared by the gateway and REST clients.
//!
//! Snowflake ids are kept as strings, the way the platform serializes them.

use serde::{Deserialize, Serialize};

/// Channel type as carried on the wire (numeric `type` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Stage,
    Other(u8),
}

impl From<u8> for ChannelKind {
    fn from(value: u8) -> Self {
        match value {
            0 => ChannelKind::Text,
            2 => ChannelKind::Voice,
            4 => ChannelKind::Category,
            13 => ChannelKind::Stage,
            other => ChannelKind::Other(other),
        }
    }
}

impl From<ChannelKind> for u8 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Text => 0,
            ChannelKind::Voice => 2,
            ChannelKind::Category => 4,
            ChannelKind::Stage => 13,
            ChannelKind::Other(n) => n,
        }
    }
}

/// A guild channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Category the channel is grouped under.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Voice capacity; 0 is unlimited.
    #[serde(default)]
    pub user_limit: u32,
}

impl Channel {
    pub fn is_voice(&self) -> bool {
        self.kind == ChannelKind::Voice
    }
}

/// A member's voice connection state.
///
/// `channel_id` is `None` when the member disconnected from voice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceState {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    pub user_id: String,
}

/// Body for creating a guild channel.
#[derive(Debug, Clone, Serialize)]
pub struct CreateChannel {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub user_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Value of a slash-command option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Integer(i64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionOption {
    pub name: String,
    #[serde(default)]
    pub value: Option<OptionValue>,
}

/// A slash-command invocation, flattened from the wire `INTERACTION_CREATE` payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    /// Category of the channel the command was invoked from, when the platform sent it.
    pub channel_parent_id: Option<String>,
    pub user_id: String,
    pub member_roles: Vec<String>,
    pub command_name: String,
    pub options: Vec<InteractionOption>,
}

impl Interaction {
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
            Some(OptionValue::String(s)) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn integer_option(&self, name: &str) -> Option<i64> {
        self.options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
            Some(OptionValue::Integer(n)) => Some(*n),
            _ => None,
        })
    }

    /// Parse the `d` field of an `INTERACTION_CREATE` dispatch.
    ///
    /// Returns `None` for anything that is not an application command.
    pub fn from_dispatch(d: &serde_json::Value) -> Option<Self> {
        // type 2 = APPLICATION_COMMAND
        if d.get("type").and_then(|t| t.as_u64()) != Some(2) {
            return None;
        }
        let str_at = |v: &serde_json::Value, key: &str| {
            v.get(key).and_then(|x| x.as_str()).map(str::to_string)
        };

        let member = d.get("member");
        let user_id = member
            .and_then(|m| m.get("user"))
            .or_else(|| d.get("user"))
            .and_then(|u| str_at(u, "id"))?;
        let member_roles = member
            .and_then(|m| m.get("roles"))
            .and_then(|r| serde_json::from_value::<Vec<String>>(r.clone()).ok())
            .unwrap_or_default();

        let data = d.get("data")?;
        let options = data
            .get("options")
            .and_then(|o| serde_json::from_value::<Vec<InteractionOption>>(o.clone()).ok())
            .unwrap_or_default();

        Some(Interaction {
            id: str_at(d, "id")?,
            token: str_at(d, "token")?,
            guild_id: str_at(d, "guild_id"),
            channel_id: str_at(d, "channel_id"),
            channel_parent_id: d.get("channel").and_then(|c| str_at(c, "parent_id")),
            user_id,
            member_roles,
            command_name: str_at(data, "name")?,
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_kind_maps_wire_numbers() {
        let ch: Channel = serde_json::from_value(serde_json::json!({
            "id": "10", "type": 2, "guild_id": "1", "name": "General", "parent_id": "5", "user_limit": 4
        }))
        .unwrap();
        assert!(ch.is_voice());
        assert_eq!(ch.parent_id.as_deref(), Some("5"));
        assert_eq!(ch.user_limit, 4);

        let other: ChannelKind = serde_json::from_value(serde_json::json!(15)).unwrap();
        assert_eq!(other, ChannelKind::Other(15));
        assert_eq!(serde_json::to_value(ChannelKind::Category).unwrap(), serde_json::json!(4));
    }

    #[test]
    fn interaction_from_guild_command() {
        let d = serde_json::json!({
            "id": "900", "token": "tok", "type": 2,
            "guild_id": "1", "channel_id": "20",
            "channel": { "id": "20", "type": 0, "parent_id": "5" },
            "member": { "user": { "id": "77" }, "roles": ["r1", "r2"] },
            "data": { "name": "create-transfer", "options": [
                { "name": "name", "type": 3, "value": "General" },
                { "name": "limit", "type": 4, "value": 5 }
            ]}
        });
        let i = Interaction::from_dispatch(&d).unwrap();
        assert_eq!(i.user_id, "77");
        assert_eq!(i.member_roles, vec!["r1", "r2"]);
        assert_eq!(i.channel_parent_id.as_deref(), Some("5"));
        assert_eq!(i.string_option("name"), Some("General"));
        assert_eq!(i.integer_option("limit"), Some(5));
        assert_eq!(i.integer_option("name"), None);
    }

    #[test]
    fn non_command_interactions_are_skipped() {
        let d = serde_json::json!({ "id": "1", "token": "t", "type": 3, "data": { "name": "x" } });
        assert!(Interaction::from_dispatch(&d).is_none());
    }
}
