//! # Heritage API Server
//!
//! REST backend for private family heritage sites: families and their
//! members, invitations, categorized content with a publication workflow,
//! media uploads, quizzes, genealogy trees and in-app notifications.
//!
//! ## Architecture
//!
//! The server is built with Axum and provides:
//! - JWT authentication with access/refresh token pairs
//! - Per-family role checks (admin, editor, reader)
//! - Local-disk media storage served under `/uploads`
//! - A background sweeper that expires stale invitations
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/heritage JWT_SECRET=... cargo run -p heritage-api
//! ```

use heritage_api::{
    app::{self, AppState},
    config::{Config, LogFormat},
    sweeper::InvitationSweeper,
};
use heritage_shared::{
    db::{
        migrations::run_migrations,
        pool::{close_pool, create_pool},
    },
    storage::local::LocalMediaStore,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let json = config.logging.format == LogFormat::Json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heritage_api=debug,heritage_shared=info,tower_http=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!(
        "Heritage API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let pool = create_pool(&config.pool_config()).await?;
    run_migrations(&pool).await?;

    let store = LocalMediaStore::new(&config.uploads.dir, app::UPLOADS_PREFIX);
    store.ensure_root().await?;
    tracing::info!(dir = %config.uploads.dir.display(), "Media storage ready");

    let sweeper = InvitationSweeper::new(pool.clone(), config.invitations.sweep_interval());
    let sweeper_shutdown = sweeper.shutdown_token();
    let sweeper_handle = tokio::spawn(async move { sweeper.run().await });

    let address = config.bind_address();
    let state = AppState::new(pool.clone(), config, Arc::new(store));
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown signal received, draining background tasks...");

    sweeper_shutdown.cancel();
    match sweeper_handle.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Invitation sweeper failed"),
        Err(e) => tracing::error!(error = %e, "Invitation sweeper task panicked"),
        Ok(Ok(())) => {}
    }

    close_pool(pool).await;
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
