//! Webhook verification and delivery handling.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::completion::Completion;
use crate::error::{Error, Result};
use crate::sender::MessageSender;
use crate::signature::{verify_signature, SIGNATURE_HEADER};
use crate::types::{EnvelopeHeader, MessagingEvent, WebhookEnvelope};

pub const PAGE_OBJECT: &str = "page";
pub const EVENT_RECEIVED: &str = "EVENT_RECEIVED";
pub const TOKEN_MISMATCH: &str = "Verification token mismatch";
pub const INTERNAL_ERROR: &str = "Internal server error";
pub const INVALID_SIGNATURE: &str = "Invalid signature";

/// Status and body returned to the platform.
pub type Reply = (StatusCode, String);

/// Query parameters of a subscription handshake.
#[derive(Debug, PartialEq, Eq)]
pub struct VerificationRequest<'a> {
    pub mode: &'a str,
    pub token: &'a str,
    pub challenge: &'a str,
}

impl<'a> VerificationRequest<'a> {
    pub fn parse(
        mode: Option<&'a str>,
        token: Option<&'a str>,
        challenge: Option<&'a str>,
    ) -> Result<Self> {
        Ok(Self {
            mode: mode.ok_or(Error::MissingParameter("hub.mode"))?,
            token: token.ok_or(Error::MissingParameter("hub.verify_token"))?,
            challenge: challenge.ok_or(Error::MissingParameter("hub.challenge"))?,
        })
    }
}

/// Relays text messages from webhook deliveries to the completion service and
/// sends the replies back. Shared by all requests; holds no mutable state.
pub struct Bridge {
    verify_token: Option<String>,
    app_secret: Option<String>,
    completion: Arc<dyn Completion>,
    sender: Arc<dyn MessageSender>,
}

impl Bridge {
    pub fn new(
        verify_token: Option<String>,
        app_secret: Option<String>,
        completion: Arc<dyn Completion>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            verify_token,
            app_secret,
            completion,
            sender,
        }
    }

    /// Answers the platform's subscription handshake.
    pub fn verify(
        &self,
        mode: Option<&str>,
        token: Option<&str>,
        challenge: Option<&str>,
    ) -> Reply {
        let request = match VerificationRequest::parse(mode, token, challenge) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "error in webhook verification");
                return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string());
            }
        };
        debug!(mode = request.mode, challenge = request.challenge, "verification request");

        let token_matches = self.verify_token.as_deref() == Some(request.token);
        if request.mode == "subscribe" && token_matches {
            info!("webhook verified");
            (StatusCode::OK, request.challenge.to_string())
        } else {
            warn!(mode = request.mode, "webhook verification failed");
            (StatusCode::FORBIDDEN, TOKEN_MISMATCH.to_string())
        }
    }

    /// Checks the delivery signature. Always passes when no app secret is configured.
    pub fn signature_ok(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(secret) = self.app_secret.as_deref() else {
            return true;
        };
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let valid = verify_signature(secret, body, header);
        if !valid {
            warn!(
                signature = if header.is_empty() { "missing" } else { "invalid" },
                "webhook signature verification failed"
            );
        }
        valid
    }

    /// Handles a raw delivery body and produces the acknowledgment.
    pub async fn deliver(&self, body: &[u8]) -> Reply {
        let envelope = match parse_envelope(body) {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return (StatusCode::OK, EVENT_RECEIVED.to_string()),
            Err(e) => {
                error!(error = %e, "error in webhook delivery");
                return (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string());
            }
        };

        let sent = self.process(&envelope).await;
        debug!(sent, "delivery processed");
        (StatusCode::OK, EVENT_RECEIVED.to_string())
    }

    /// Replies to every text message in the envelope, in order. Returns the
    /// number of send attempts made.
    pub async fn process(&self, envelope: &WebhookEnvelope) -> usize {
        let mut attempts = 0;
        for raw in envelope.entry.iter().flat_map(|entry| &entry.messaging) {
            let event = match MessagingEvent::deserialize(raw) {
                Ok(event) => event,
                Err(e) => {
                    warn!(error = %e, "skipping malformed messaging event");
                    continue;
                }
            };
            let text_present = event
                .message
                .as_ref()
                .map_or(false, |message| message.text.is_some());
            let Some((sender_id, text)) = event.text_message() else {
                if text_present {
                    warn!("text message without a sender id, skipping");
                } else {
                    debug!("ignoring non-text event");
                }
                continue;
            };

            let mid = event.message.as_ref().and_then(|m| m.mid.as_deref());
            info!(sender = sender_id, mid, text, "received message");

            let reply = self.completion.complete(text).await;
            // Failures are logged by the sender and must not stop later events.
            let _ = self.sender.send(sender_id, &reply).await;
            attempts += 1;
        }
        attempts
    }
}

/// `Ok(None)` for deliveries about objects other than pages.
fn parse_envelope(body: &[u8]) -> Result<Option<WebhookEnvelope>> {
    let header: EnvelopeHeader = serde_json::from_slice(body)?;
    if header.object_tag() != Some(PAGE_OBJECT) {
        debug!(object = ?header.object, "ignoring delivery for unrecognized object");
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(body)?))
}

pub fn router(bridge: Arc<Bridge>) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/webhook", get(verify_webhook).post(post_webhook))
        .layer(middleware::from_fn(log_request))
        .with_state(bridge)
}

async fn log_request<B>(request: Request<B>, next: Next<B>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    info!(%method, path, status = %response.status(), "handled request");

    response
}

async fn verify_webhook(
    State(bridge): State<Arc<Bridge>>,
    Query(params): Query<HashMap<String, String>>,
) -> Reply {
    bridge.verify(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    )
}

async fn post_webhook(
    State(bridge): State<Arc<Bridge>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    if !bridge.signature_ok(&headers, &body) {
        return (StatusCode::UNAUTHORIZED, INVALID_SIGNATURE.to_string());
    }
    bridge.deliver(&body).await
}
