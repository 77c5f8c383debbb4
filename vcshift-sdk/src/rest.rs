//! REST client for the platform's HTTP API (v10).
//!
//! Only the handful of calls a voice-channel bot needs. Every method maps a
//! non-2xx answer to [`RestError::Api`] with the response body kept for logs.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{Channel, CreateChannel};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Header carrying the human-readable reason shown in the guild audit log.
const AUDIT_LOG_REASON: &str = "X-Audit-Log-Reason";

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RestError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Authenticated HTTP client. Cheap to clone.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl RestClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    pub fn with_base(token: impl Into<String>, base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub async fn list_guild_channels(&self, guild_id: &str) -> Result<Vec<Channel>, RestError> {
        self.request_json(Method::GET, &format!("/guilds/{guild_id}/channels"), None::<&()>, None)
            .await
    }

    pub async fn get_channel(&self, channel_id: &str) -> Result<Channel, RestError> {
        self.request_json(Method::GET, &format!("/channels/{channel_id}"), None::<&()>, None)
            .await
    }

    pub async fn create_channel(
        &self,
        guild_id: &str,
        body: &CreateChannel,
        reason: &str,
    ) -> Result<Channel, RestError> {
        self.request_json(
            Method::POST,
            &format!("/guilds/{guild_id}/channels"),
            Some(body),
            Some(reason),
        )
        .await
    }

    /// Move a member who is connected to voice into `channel_id`.
    pub async fn move_member(
        &self,
        guild_id: &str,
        user_id: &str,
        channel_id: &str,
    ) -> Result<(), RestError> {
        let body = serde_json::json!({ "channel_id": channel_id });
        self.request(
            Method::PATCH,
            &format!("/guilds/{guild_id}/members/{user_id}"),
            Some(&body),
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn delete_channel(&self, channel_id: &str, reason: &str) -> Result<(), RestError> {
        self.request(Method::DELETE, &format!("/channels/{channel_id}"), None::<&()>, Some(reason))
            .await
            .map(|_| ())
    }

    /// Bulk-overwrite the application's commands in one guild.
    pub async fn put_guild_commands(
        &self,
        application_id: &str,
        guild_id: &str,
        commands: &serde_json::Value,
    ) -> Result<(), RestError> {
        self.request(
            Method::PUT,
            &format!("/applications/{application_id}/guilds/{guild_id}/commands"),
            Some(commands),
            None,
        )
        .await
        .map(|_| ())
    }

    /// Answer a slash-command interaction with a message.
    pub async fn reply_interaction(
        &self,
        interaction_id: &str,
        token: &str,
        content: &str,
        ephemeral: bool,
    ) -> Result<(), RestError> {
        // type 4 = CHANNEL_MESSAGE_WITH_SOURCE, flag 64 = EPHEMERAL
        let mut data = serde_json::json!({ "content": content });
        if ephemeral {
            data["flags"] = serde_json::json!(64);
        }
        let body = serde_json::json!({ "type": 4, "data": data });
        self.request(
            Method::POST,
            &format!("/interactions/{interaction_id}/{token}/callback"),
            Some(&body),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        reason: Option<&str>,
    ) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.request(method, path, body, reason).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        reason: Option<&str>,
    ) -> Result<String, RestError>
    where
        B: Serialize + ?Sized,
    {
        let url = format!("{}{path}", self.base);
        tracing::debug!(%method, %url, "REST request");

        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.token))
            .header("User-Agent", "DiscordBot (vcshift, 0.1)");
        if let Some(reason) = reason {
            req = req.header(AUDIT_LOG_REASON, encode_reason(reason));
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RestError::Api { status, body: text });
        }
        Ok(text)
    }
}

/// Audit-log reasons travel URL-encoded in a header.
const REASON_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

fn encode_reason(reason: &str) -> String {
    utf8_percent_encode(reason, REASON_SET).to_string()
}
