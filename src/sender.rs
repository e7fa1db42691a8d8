//! Messenger Send API client

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::types::{MessagingType, OutgoingMessage, OutgoingText, Recipient};

/// Longest text the Send API accepts, in characters.
pub const MAX_TEXT_CHARS: usize = 2000;

/// Delivers a text reply to a user. Failures are logged and reported as `None`.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient_id: &str, text: &str) -> Option<Value>;
}

#[derive(Clone)]
pub struct SendApiClient {
    client: Client,
    access_token: String,
    url: String,
}

impl SendApiClient {
    pub fn new(client: Client, access_token: Option<&str>, url: &str) -> Result<Self> {
        let access_token = access_token.ok_or(Error::MissingSetting("PAGE_ACCESS_TOKEN"))?;
        Ok(Self {
            client,
            access_token: access_token.to_string(),
            url: url.to_string(),
        })
    }

    pub async fn try_send(&self, recipient_id: &str, text: &str) -> Result<Value> {
        let body = OutgoingMessage {
            messaging_type: MessagingType::Response,
            recipient: Recipient {
                id: recipient_id.to_owned(),
            },
            message: OutgoingText {
                text: truncate_chars(text, MAX_TEXT_CHARS).to_string(),
            },
            access_token: self.access_token.clone(),
        };

        let res = self
            .client
            .post(&self.url)
            .query(&[("access_token", &self.access_token)])
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        Ok(res.json::<Value>().await?)
    }
}

#[async_trait]
impl MessageSender for SendApiClient {
    async fn send(&self, recipient_id: &str, text: &str) -> Option<Value> {
        match self.try_send(recipient_id, text).await {
            Ok(response) => {
                info!(recipient = recipient_id, text, "message sent");
                debug!(response = %response, "send API response");
                Some(response)
            }
            Err(Error::Api { status, body }) => {
                error!(recipient = recipient_id, %status, body = %body, "failed to send message");
                None
            }
            Err(e) => {
                error!(recipient = recipient_id, error = %e, "error sending message");
                None
            }
        }
    }
}

/// Stand-in used when the real client could not be built at startup.
#[derive(Debug, Clone)]
pub struct UnavailableSender {
    pub reason: String,
}

#[async_trait]
impl MessageSender for UnavailableSender {
    async fn send(&self, recipient_id: &str, _text: &str) -> Option<Value> {
        error!(recipient = recipient_id, reason = %self.reason, "send client unavailable");
        None
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
