use std::collections::HashMap;

use tariff_client::domain::{normalize_region_name, PriceRow, ProviderGroup, Region};
use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{RegionStore, StoreError};

#[derive(Debug, Clone)]
struct StoredRow {
    region_id: i64,
    tier_label: String,
    unit_price: f64,
    fixed_charge: f64,
    provider_name: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_region_id: i64,
    regions: HashMap<String, Region>,
    rows: Vec<StoredRow>,
}

impl State {
    fn upsert(&mut self, name: &str, refreshed_at: Option<OffsetDateTime>) -> i64 {
        let key = normalize_region_name(name);
        if let Some(region) = self.regions.get_mut(&key) {
            region.last_refreshed_at = refreshed_at;
            return region.id;
        }

        self.next_region_id += 1;
        let id = self.next_region_id;
        self.regions.insert(
            key.clone(),
            Region {
                id,
                normalized_name: key,
                last_refreshed_at: refreshed_at,
            },
        );
        id
    }

    fn replace(&mut self, region_id: i64, groups: &[ProviderGroup]) -> u64 {
        self.rows.retain(|r| r.region_id != region_id);

        let mut inserted = 0;
        for group in groups {
            for tier in &group.tiers {
                self.rows.push(StoredRow {
                    region_id,
                    tier_label: tier.tier_label.clone(),
                    unit_price: tier.unit_price,
                    fixed_charge: group.fixed_charge,
                    provider_name: group.provider_name.clone(),
                });
                inserted += 1;
            }
        }
        inserted
    }
}

/// Process-local store with the same contract as [`super::PgRegionStore`].
///
/// Every mutation runs under one write lock, so a refresh is atomic for
/// readers.
#[derive(Debug, Default)]
pub struct MemoryRegionStore {
    state: RwLock<State>,
}

impl MemoryRegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a price table with an explicit refresh time, e.g. to start from
    /// data that is already stale.
    pub async fn seed(&self, name: &str, groups: &[ProviderGroup], refreshed_at: Option<OffsetDateTime>) {
        let mut state = self.state.write().await;
        let id = state.upsert(name, refreshed_at);
        state.replace(id, groups);
    }

    pub async fn region_count(&self) -> usize {
        self.state.read().await.regions.len()
    }
}

#[async_trait::async_trait]
impl RegionStore for MemoryRegionStore {
    async fn find_region(&self, normalized_name: &str) -> Result<Option<Region>, StoreError> {
        let key = normalize_region_name(normalized_name);
        Ok(self.state.read().await.regions.get(&key).cloned())
    }

    async fn upsert_region(&self, normalized_name: &str) -> Result<i64, StoreError> {
        Ok(self
            .state
            .write()
            .await
            .upsert(normalized_name, Some(OffsetDateTime::now_utc())))
    }

    async fn replace_price_rows(&self, region_id: i64, groups: &[ProviderGroup]) -> Result<u64, StoreError> {
        Ok(self.state.write().await.replace(region_id, groups))
    }

    async fn read_price_rows(&self, normalized_name: &str) -> Result<Vec<PriceRow>, StoreError> {
        let key = normalize_region_name(normalized_name);
        let state = self.state.read().await;
        let Some(region) = state.regions.get(&key) else {
            return Ok(Vec::new());
        };

        Ok(state
            .rows
            .iter()
            .filter(|r| r.region_id == region.id)
            .map(|r| PriceRow {
                tier_label: r.tier_label.clone(),
                unit_price: r.unit_price,
                fixed_charge: r.fixed_charge,
                provider_name: r.provider_name.clone(),
                last_refreshed_at: region.last_refreshed_at,
            })
            .collect())
    }

    async fn refresh_region(&self, normalized_name: &str, groups: &[ProviderGroup]) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let id = state.upsert(normalized_name, Some(OffsetDateTime::now_utc()));
        Ok(state.replace(id, groups))
    }
}
