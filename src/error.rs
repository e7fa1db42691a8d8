//! Error types for messenger-relay

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} is not set")]
    MissingSetting(&'static str),

    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    Api { status: StatusCode, body: String },

    #[error("completion returned no text")]
    EmptyCompletion,
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
