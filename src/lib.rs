//! alertscope -- analytics over exported security alert data.
//!
//! This crate provides the core library for alert normalization, filtering,
//! aggregation, cohort-relative anomaly scoring, and report export.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod filter;
pub mod ingest;
pub mod record;
pub mod report;
pub mod session;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::session::Engine;

/// Start the alertscope API server: initial load, then serve until stopped.
pub async fn serve(config: AppConfig) -> Result<()> {
    // 1. Initial snapshot, bounded like any other source read
    let source = config.source.clone();
    tracing::info!(path = %source.path.display(), kind = ?source.kind, "Loading alert source");
    let limit = Duration::from_secs(source.read_timeout_secs.max(1));
    let engine = tokio::time::timeout(
        limit,
        tokio::task::spawn_blocking(move || Engine::open(source)),
    )
    .await
    .with_context(|| format!("initial source read exceeded {}s", limit.as_secs()))???;

    // 2. Start API server
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;
    let state = api::state::AppState::new(Arc::new(engine), config);
    let app = api::router(state);

    tracing::info!(%addr, "alertscope listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
