use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{fs, io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    blob_path::BlobPathResolver,
    event_handler::ThumbnailEventHandler,
    storage_service::LocalBlobStore,
    thumbnail_service::{THUMBNAIL_EXTENSION, ThumbnailGenerator},
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {}", err);
        }
    }
    let (cfg, migrate) =
        config::AppConfig::from_env_and_args().context("invalid configuration")?;

    tracing::info!("Starting image-thumbnailer with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize blob metadata database ---
    let connect_options = SqliteConnectOptions::from_str(&cfg.database_url)
        .with_context(|| format!("parsing database url `{}`", cfg.database_url))?
        .create_if_missing(true);
    if let Some(parent) = Path::new(connect_options.get_filename()).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?,
    );

    let store = LocalBlobStore::new(db, cfg.storage_dir.clone());
    let applied = store.migrate().await?;
    tracing::debug!("Applied {} schema statements", applied);

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Wire the event pipeline ---
    let generator = Arc::new(ThumbnailGenerator::new(cfg.thumbnail_bounds));
    let paths = BlobPathResolver::new(
        cfg.originals_folder.clone(),
        cfg.thumbnails_folder.clone(),
        THUMBNAIL_EXTENSION,
    );
    let events = ThumbnailEventHandler::new(Arc::new(store.clone()), generator, paths);
    let shutdown = CancellationToken::new();

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state::AppState {
        events,
        store,
        shutdown: shutdown.clone(),
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!(
        "Listening for events on http://{}/api/events",
        listener.local_addr()?
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, cancelling in-flight storage calls.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
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

    tracing::info!("Shutdown requested; cancelling in-flight storage calls");
    shutdown.cancel();
}
