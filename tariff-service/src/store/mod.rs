//! Persistence gateway for regions and their price tables.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use tariff_client::domain::{PriceRow, ProviderGroup, Region};

pub use memory::MemoryRegionStore;
pub use postgres::PgRegionStore;

#[derive(thiserror::Error, Debug, Clone)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] Arc<sqlx::Error>),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(Arc::new(e))
    }
}

/// Region and price-row storage shared by every resolution.
///
/// All names passed in are expected to be normalized already
/// (see [`tariff_client::domain::normalize_region_name`]).
#[async_trait::async_trait]
pub trait RegionStore: Send + Sync {
    async fn find_region(&self, normalized_name: &str) -> Result<Option<Region>, StoreError>;

    /// Create the region stamped with the current time or re-stamp it.
    async fn upsert_region(&self, normalized_name: &str) -> Result<i64, StoreError>;

    /// Swap the whole price table of `region_id` for `groups`.
    async fn replace_price_rows(&self, region_id: i64, groups: &[ProviderGroup]) -> Result<u64, StoreError>;

    async fn read_price_rows(&self, normalized_name: &str) -> Result<Vec<PriceRow>, StoreError>;

    /// Record a successful refresh: upsert the region and replace its rows.
    ///
    /// Implementations backed by a transactional store must perform both
    /// steps atomically.
    async fn refresh_region(&self, normalized_name: &str, groups: &[ProviderGroup]) -> Result<u64, StoreError> {
        let region_id = self.upsert_region(normalized_name).await?;
        self.replace_price_rows(region_id, groups).await
    }
}
