use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use storage_reorg::config::AppConfig;
use storage_reorg::reconcile::{Reconciler, RunMode};
use storage_reorg::resolve::KeyResolver;
use storage_reorg::services::catalog::{CatalogService, run_migrations};
use storage_reorg::services::object_store::FsObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::info!("Starting storage-reorg with config: {:?}", cfg);

    // --- Ensure store root exists ---
    if !Path::new(&cfg.store_root).exists() {
        fs::create_dir_all(&cfg.store_root)?;
        tracing::info!("Created store root at {}", cfg.store_root);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let db = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&cfg.database_url)
        .await?;

    // --- Handle migration mode ---
    if cfg.migrate {
        run_migrations(&db).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize services ---
    let catalog = CatalogService::probe(Arc::new(db)).await?;
    let store = Arc::new(FsObjectStore::new(&cfg.store_root));
    let resolver = KeyResolver::new(cfg.public_base_url.clone(), cfg.scan_cap);
    let reconciler = Reconciler::new(catalog, store, resolver, cfg.public_base_url.clone());

    // --- Cancellation: stop between items on Ctrl-C ---
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; stopping after the current item");
            signal_cancel.cancel();
        }
    });

    // --- Run the requested passes ---
    let mode = if cfg.execute {
        RunMode::Execute
    } else {
        RunMode::DryRun
    };
    let report = reconciler.run(mode, cfg.hygiene_only, &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
