use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tariff_service::{
    api::{self, AppState},
    config::AppConfig,
    metrics_server,
    observability,
    resolver::{ResolverSettings, TariffResolver},
    sources::CuentaDeLaLuzExtractor,
    store::PgRegionStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let store = PgRegionStore::new(pool.clone());
    if cfg.database.apply_schema {
        store.apply_schema().await?;
    }

    let resolver = TariffResolver::new(
        Arc::new(store),
        Arc::new(CuentaDeLaLuzExtractor::new(cfg.source.clone())),
        ResolverSettings {
            max_age: cfg.freshness.max_age(),
            lease_deadline: cfg.refresh.lease_deadline(),
        },
    );

    let state = AppState {
        resolver: Arc::new(resolver),
        request_timeout: cfg.http.request_timeout(),
    };
    api::serve(&cfg.http.bind_addr, state).await?;

    pool.close().await;
    tracing::info!("tariff API stopped");

    Ok(())
}
