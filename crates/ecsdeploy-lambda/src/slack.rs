//! Slack Web API: `chat.postMessage` and `chat.update`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const SLACK_API_BASE: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum SlackError {
    #[error("Slack request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Slack answered `ok: false`
    #[error("Slack {method} failed: {error}")]
    Api { method: &'static str, error: String },
}

/// A legacy message button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Button {
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<&'static str>,
}

impl Button {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            text: name.to_string(),
            kind: "button",
            value: value.to_string(),
            style: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.style = Some("primary");
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Button>,
}

/// `chat.postMessage` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub channel: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// `chat.update` body; `ts` names the message being replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageUpdate {
    pub channel: String,
    pub ts: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Returns the posted message's `ts`
    async fn post_message(&self, message: &PostMessage) -> Result<String, SlackError>;

    async fn update_message(&self, update: &MessageUpdate) -> Result<(), SlackError>;
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    error: Option<String>,
    ts: Option<String>,
}

/// [`SlackApi`] over HTTPS with a bot token
#[derive(Clone)]
pub struct SlackClient {
    http: reqwest::Client,
    token: String,
    base_url: String,
}

impl std::fmt::Debug for SlackClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            token: token.into(),
            base_url: SLACK_API_BASE.to_string(),
        })
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: &'static str,
        body: &B,
    ) -> Result<SlackResponse, SlackError> {
        let response: SlackResponse = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.ok {
            return Err(SlackError::Api {
                method,
                error: response.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }
        debug!(method, "Slack call succeeded");
        Ok(response)
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    async fn post_message(&self, message: &PostMessage) -> Result<String, SlackError> {
        let response = self.call("chat.postMessage", message).await?;
        Ok(response.ts.unwrap_or_default())
    }

    async fn update_message(&self, update: &MessageUpdate) -> Result<(), SlackError> {
        self.call("chat.update", update).await.map(|_| ())
    }
}
