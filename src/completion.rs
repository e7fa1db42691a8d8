//! Reply generation through the OpenAI chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::types::{OpenAIMessage, OpenAIRequest, OpenAIResponse};

pub const MODEL: &str = "gpt-3.5-turbo";
pub const MAX_TOKENS: u32 = 150;
pub const TEMPERATURE: f32 = 0.7;
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant for a Facebook Business Page. \
Provide concise, friendly, and informative responses.";
pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble responding right now. Please try again!";

/// Turns a user's message into reply text. Never fails: implementations fall
/// back to [`FALLBACK_REPLY`].
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, user_text: &str) -> String;
}

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    api_key: String,
    url: String,
}

impl OpenAIClient {
    pub fn new(client: Client, api_key: Option<&str>, url: &str) -> Result<Self> {
        let api_key = api_key.ok_or(Error::MissingSetting("OPENAI_KEY"))?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            url: url.to_string(),
        })
    }

    pub async fn try_complete(&self, user_text: &str) -> Result<String> {
        debug!(text = user_text, "requesting completion");

        let res = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&OpenAIRequest {
                model: MODEL.to_string(),
                messages: vec![
                    OpenAIMessage::system(SYSTEM_PROMPT),
                    OpenAIMessage::user(user_text),
                ],
                max_tokens: MAX_TOKENS,
                temperature: TEMPERATURE,
            })
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        let content = res
            .json::<OpenAIResponse>()
            .await?
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(Error::EmptyCompletion)?;

        let reply = content.trim().to_string();
        debug!(reply = %reply, "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl Completion for OpenAIClient {
    async fn complete(&self, user_text: &str) -> String {
        match self.try_complete(user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(error = %e, "error generating completion");
                FALLBACK_REPLY.to_string()
            }
        }
    }
}

/// Stand-in used when the real client could not be built at startup.
#[derive(Debug, Clone)]
pub struct UnavailableCompletion {
    pub reason: String,
}

#[async_trait]
impl Completion for UnavailableCompletion {
    async fn complete(&self, _user_text: &str) -> String {
        error!(reason = %self.reason, "completion client unavailable");
        FALLBACK_REPLY.to_string()
    }
}
