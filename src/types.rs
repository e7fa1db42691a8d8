use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Webhook delivery body posted by the Messenger platform.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

/// Only the object tag, read before the full envelope so that deliveries for
/// other objects are acknowledged regardless of their shape.
#[derive(Debug, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(default)]
    pub object: Option<Value>,
}

impl EnvelopeHeader {
    /// The tag, when it is a string.
    pub fn object_tag(&self) -> Option<&str> {
        self.object.as_ref().and_then(Value::as_str)
    }
}

/// Events stay raw here and are decoded one at a time, so a single odd event
/// cannot reject the rest of the delivery.
#[derive(Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub messaging: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Option<Sender>,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

impl MessagingEvent {
    /// Sender id and text, when the event is a text message from a known sender.
    pub fn text_message(&self) -> Option<(&str, &str)> {
        let text = self.message.as_ref()?.text.as_deref()?;
        let sender = self.sender.as_ref()?;
        Some((sender.id.as_str(), text))
    }
}

#[derive(Debug, Deserialize)]
pub struct Sender {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutgoingMessage {
    pub messaging_type: MessagingType,
    pub recipient: Recipient,
    pub message: OutgoingText,
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessagingType {
    Response,
}

#[derive(Debug, Serialize)]
pub struct Recipient {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct OutgoingText {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Serialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

impl OpenAIMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    pub choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoice {
    pub message: OpenAIChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}
