// src/main.rs

use anyhow::Context;
use chat_presence::{config::Config, routes::build_router, state::AppState};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// The main entry point for the presence server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_presence=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Presence lives for the whole process and is never torn down.
    let state = AppState::from_config(&config).context("invalid origin allowlist")?;
    let app = build_router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        allowed_origins = ?config.allowed_origins,
        "presence server listening on ws://{addr}/ws"
    );

    axum::serve(listener, app.into_make_service())
        .await
        .context("server error")?;
    Ok(())
}
