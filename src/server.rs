//! Startup wiring and transport: TLS, plain HTTP, or an ngrok tunnel in dev.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use ngrok::{prelude::TunnelBuilder, tunnel::UrlTunnel};
use reqwest::Client;
use tracing::{error, info, warn};

use crate::completion::{Completion, OpenAIClient, UnavailableCompletion};
use crate::config::{Config, Environment};
use crate::sender::{MessageSender, SendApiClient, UnavailableSender};
use crate::webhook::{self, Bridge};

/// Builds the bridge with both outbound clients. A client that cannot be built
/// is logged and replaced by a stand-in so the server still comes up.
pub fn build_bridge(config: &Config) -> Bridge {
    let http = match Client::builder().build() {
        Ok(client) => Some(client),
        Err(e) => {
            error!(error = %e, "failed to initialize HTTP client");
            None
        }
    };

    let completion: Arc<dyn Completion> = match http
        .clone()
        .ok_or_else(|| "HTTP client unavailable".to_string())
        .and_then(|client| {
            OpenAIClient::new(client, config.openai_key.as_deref(), &config.completion_api_url)
                .map_err(|e| e.to_string())
        }) {
        Ok(client) => {
            info!("completion client initialized");
            Arc::new(client)
        }
        Err(reason) => {
            error!(reason = %reason, "failed to initialize completion client");
            Arc::new(UnavailableCompletion { reason })
        }
    };

    let sender: Arc<dyn MessageSender> = match http
        .ok_or_else(|| "HTTP client unavailable".to_string())
        .and_then(|client| {
            SendApiClient::new(client, config.page_access_token.as_deref(), &config.send_api_url)
                .map_err(|e| e.to_string())
        }) {
        Ok(client) => {
            info!("send API client initialized");
            Arc::new(client)
        }
        Err(reason) => {
            error!(reason = %reason, "failed to initialize send API client");
            Arc::new(UnavailableSender { reason })
        }
    };

    Bridge::new(
        config.verify_token.clone(),
        config.app_secret.clone(),
        completion,
        sender,
    )
}

/// Serves the webhook until the server stops.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let bridge = Arc::new(build_bridge(&config));
    let app = webhook::router(bridge);

    if config.environment == Environment::Dev {
        return serve_ngrok(&config, app).await;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    match config.tls_paths() {
        Some((cert, key)) => serve_tls(addr, &cert, &key, app).await,
        None => {
            warn!("CERT_PERM_PATH/KEY_PERM_PATH not set, serving plain HTTP");
            serve_plain(addr, app).await
        }
    }
}

async fn serve_tls(addr: SocketAddr, cert: &Path, key: &Path, app: Router) -> anyhow::Result<()> {
    let tls = RustlsConfig::from_pem_file(cert, key)
        .await
        .with_context(|| format!("failed to load TLS certificate {}", cert.display()))?;

    info!(%addr, cert = %cert.display(), "serving HTTPS");
    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .context("TLS server failed")
}

async fn serve_plain(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    info!(%addr, "serving HTTP");
    axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(app.into_make_service())
        .await
        .context("HTTP server failed")
}

async fn serve_ngrok(config: &Config, app: Router) -> anyhow::Result<()> {
    let authtoken = config
        .ngrok_authtoken
        .clone()
        .context("NGROK_AUTHTOKEN is required when ENVIRONMENT=dev")?;

    let tun = ngrok::Session::builder()
        .authtoken(authtoken)
        .connect()
        .await?
        .http_endpoint()
        .listen()
        .await?;
    info!(url = tun.url(), "ngrok tunnel started");

    axum::Server::builder(tun)
        .serve(app.into_make_service())
        .await
        .context("tunnel server failed")
}
