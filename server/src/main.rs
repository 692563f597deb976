mod api;
mod board;
mod config;
mod error;
mod journal;
mod loader;
mod map_cache;
mod painter;
mod snapshot;
mod validator;
mod ws;

use anyhow::Context;
use common::{Torus, ValkeyStore};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            let _ = ctrl_c.await;
            tracing::info!("Received SIGINT, shutting down...");
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("server=info".parse()?),
        )
        .init();

    let config = config::Config::from_env()?;
    tracing::info!("Starting server on {}", config.listen_addr);

    let store = ValkeyStore::connect(&config.valkey_url)
        .await
        .with_context(|| format!("connect to {}", config.valkey_url))?;

    let settings = board::BoardSettings {
        torus: Torus::new(config.map_width, config.map_height),
        scale: config.pixel_scale,
        sea_range: config.sea_range,
        load_concurrency: config.load_concurrency,
    };
    let board = board::Board::bootstrap(store, settings, config.rebuild_on_start)
        .await
        .context("bootstrap canvas")?;

    let (broadcast_tx, _) = broadcast::channel::<String>(4096);
    let journal = journal::Journal::new(config.journal_capacity);

    let (painter, painter_handle) = painter::Painter::spawn(
        board,
        painter::Feed {
            journal: journal.clone(),
            broadcast_tx: broadcast_tx.clone(),
        },
    );

    let state = api::AppState {
        painter,
        journal,
        broadcast_tx,
    };

    let app = api::router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("Server listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Open WebSockets may still hold painter handles; give queued commands a moment.
    if tokio::time::timeout(std::time::Duration::from_secs(5), painter_handle)
        .await
        .is_err()
    {
        tracing::warn!("Painter still busy at shutdown");
    }

    tracing::info!("Server stopped.");
    Ok(())
}
