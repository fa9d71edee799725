use std::sync::Arc;

use anyhow::Context;
use points_backend::{
    api::{self, AppState, identity::GatewayHeaderIdentity},
    config::AppConfig,
    db::Db,
    logger::init_tracing,
    progress::{
        model::CatalogModule,
        service::CompletionService,
        store::DocumentStore,
        store_memory::InMemoryDocumentStore,
        store_sqlx::SqlxDocumentStore,
    },
};

/// Builds the process-wide store client once; everything downstream gets
/// it injected.
async fn init_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if cfg.uses_memory_store() {
        tracing::warn!("using in-memory document store; nothing survives a restart");
        return Ok(Arc::new(InMemoryDocumentStore::new()));
    }

    let db = Db::connect(&cfg.database_url, cfg.db_max_connections).await?;
    db.migrate().await?;

    Ok(Arc::new(SqlxDocumentStore::new(db.pool)))
}

/// Upserts catalog modules from a JSON array file. Authoring happens
/// elsewhere; this only mirrors an exported catalog into the store.
async fn seed_catalog(store: &dyn DocumentStore, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read catalog seed {path}"))?;
    let modules: Vec<CatalogModule> =
        serde_json::from_str(&raw).with_context(|| format!("malformed catalog seed {path}"))?;

    for module in &modules {
        store.put_module(module).await?;
    }

    tracing::info!(count = modules.len(), path, "catalog seeded");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("Starting points backend...");

    let cfg = AppConfig::from_env();

    let store = init_store(&cfg).await?;

    if let Some(path) = &cfg.catalog_seed_path {
        seed_catalog(store.as_ref(), path).await?;
    }

    let service =
        Arc::new(CompletionService::new(store).with_slow_store_threshold(cfg.store_slow_threshold));
    let identity = Arc::new(GatewayHeaderIdentity::new(&cfg.identity_header)?);

    let app = api::router(AppState { service, identity });

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "completion endpoints listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
