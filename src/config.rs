//! Environment configuration, read once at startup.

use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_SEND_API_URL: &str = "https://graph.facebook.com/v17.0/me/messages";
pub const DEFAULT_COMPLETION_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct Config {
    pub page_access_token: Option<String>,
    pub verify_token: Option<String>,
    pub openai_key: Option<String>,
    /// Enables `X-Hub-Signature-256` checking of webhook deliveries.
    pub app_secret: Option<String>,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub port: u16,
    pub environment: Environment,
    pub ngrok_authtoken: Option<String>,
    pub send_api_url: String,
    pub completion_api_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Served through an ngrok tunnel.
    Dev,
    Production,
}

impl Config {
    /// Load from the process environment. `main` reads `.env` beforehand.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(value = %raw, default = DEFAULT_PORT, "invalid PORT, using default");
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        let environment = match get("ENVIRONMENT").as_deref() {
            Some("dev") => Environment::Dev,
            _ => Environment::Production,
        };

        Self {
            page_access_token: get("PAGE_ACCESS_TOKEN"),
            verify_token: get("VERIFY_TOKEN"),
            openai_key: get("OPENAI_KEY"),
            app_secret: get("APP_SECRET"),
            tls_cert_path: get("CERT_PERM_PATH").map(PathBuf::from),
            tls_key_path: get("KEY_PERM_PATH").map(PathBuf::from),
            port,
            environment,
            ngrok_authtoken: get("NGROK_AUTHTOKEN"),
            send_api_url: get("SEND_API_URL").unwrap_or_else(|| DEFAULT_SEND_API_URL.to_string()),
            completion_api_url: get("COMPLETION_API_URL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_API_URL.to_string()),
        }
    }

    /// Log every missing setting. None of them stop the server from starting.
    pub fn warn_missing(&self) {
        if self.page_access_token.is_none() {
            warn!("PAGE_ACCESS_TOKEN is not set, replies cannot be delivered");
        }
        if self.verify_token.is_none() {
            warn!("VERIFY_TOKEN is not set, webhook verification will always fail");
        }
        if self.openai_key.is_none() {
            warn!("OPENAI_KEY is not set, every reply will be the fallback text");
        }
        if self.app_secret.is_none() {
            warn!("APP_SECRET is not set, webhook signatures are not checked");
        }
    }

    /// Certificate and key paths, when both are configured.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }
}
