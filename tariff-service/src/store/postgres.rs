use sqlx::postgres::PgPool;
use tariff_client::{
    db::{self, price_row_queries, region_queries},
    domain::{PriceRow, ProviderGroup, Region},
};

use super::{RegionStore, StoreError};

/// PostgreSQL-backed store. The pool is owned by the process entry point and
/// handed in here.
#[derive(Clone)]
pub struct PgRegionStore {
    pool: PgPool,
}

impl PgRegionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        db::apply_schema(&self.pool).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RegionStore for PgRegionStore {
    async fn find_region(&self, normalized_name: &str) -> Result<Option<Region>, StoreError> {
        Ok(region_queries::find_region(&self.pool, normalized_name).await?)
    }

    async fn upsert_region(&self, normalized_name: &str) -> Result<i64, StoreError> {
        Ok(region_queries::upsert_region(&self.pool, normalized_name).await?)
    }

    async fn replace_price_rows(&self, region_id: i64, groups: &[ProviderGroup]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let inserted = price_row_queries::replace_price_rows(&mut *tx, region_id, groups).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn read_price_rows(&self, normalized_name: &str) -> Result<Vec<PriceRow>, StoreError> {
        Ok(price_row_queries::read_price_rows(&self.pool, normalized_name).await?)
    }

    async fn refresh_region(&self, normalized_name: &str, groups: &[ProviderGroup]) -> Result<u64, StoreError> {
        let inserted = db::refresh_region(&self.pool, normalized_name, groups).await?;
        metrics::counter!("tariff_refresh_rows_total").increment(inserted);
        tracing::info!(
            region = normalized_name,
            providers = groups.len(),
            rows = inserted,
            "region price table replaced"
        );
        Ok(inserted)
    }
}
