use anyhow::{bail, Result};
use futures::StreamExt;
use sqlx::postgres::PgPoolOptions;
use std::{env, sync::Arc};
use tariff_service::{
    config::AppConfig,
    observability,
    resolver::{RefreshReport, ResolverSettings, TariffResolver},
    sources::{CuentaDeLaLuzExtractor, RegionListFile},
    store::PgRegionStore,
};

/// Refresh the cached tariffs of every region listed in a CSV file.
///
/// Regions are processed one at a time with `batch.inter_region_delay_ms`
/// between them so the external site is not hammered.
///
/// Usage:
///   refresh_all_tariffs <regions_csv_path>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: refresh_all_tariffs <regions_csv_path>");
    }
    let file_path = &args[1];

    // Load configuration (TARIFF_CONFIG can point to a batch-specific file).
    let cfg = AppConfig::load()?;

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
    let delay = cfg.batch.inter_region_delay();

    tracing::info!(file = %file_path, ?delay, "starting tariff refresh");

    let mut regions = RegionListFile::new(file_path).stream();
    let mut processed = 0usize;
    let mut succeeded = 0usize;
    let mut failures: Vec<(String, String)> = Vec::new();

    while let Some(item) = regions.next().await {
        let region = match item {
            Ok(region) => region,
            Err(e) if !e.is_fatal() => {
                tracing::error!(error = %e, "skipping region list entry");
                failures.push(("<unreadable entry>".to_string(), e.to_string()));
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if processed > 0 {
            tokio::time::sleep(delay).await;
        }
        processed += 1;

        match resolver.refresh(&region).await {
            Ok(RefreshReport::Replaced { providers, rows }) => {
                succeeded += 1;
                tracing::info!(%region, providers, rows, "region refreshed");
            }
            Ok(RefreshReport::AlreadyFresh) => {
                succeeded += 1;
                tracing::info!(%region, "region already fresh");
            }
            Err(e) => {
                tracing::error!(%region, error = %e, "region refresh failed");
                failures.push((region, e.to_string()));
            }
        }
    }

    tracing::info!(
        processed,
        succeeded,
        failed = failures.len(),
        "tariff refresh finished"
    );
    for (region, error) in &failures {
        tracing::warn!(%region, %error, "failed region");
    }

    pool.close().await;
    Ok(())
}
