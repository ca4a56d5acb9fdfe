//! End-to-end resolution: region name and device profile in, cost
//! simulation out.
//!
//! ```text
//! validate -> normalize -> classify -> [refresh under lease] -> read rows -> compute
//! ```
//!
//! A refresh that fails or comes back empty is absorbed when the region
//! already has (stale) rows; the response is then flagged `degraded`. Without
//! prior rows the request fails with [`ResolveError::NoDataAvailable`].

pub mod lease;

use std::{sync::Arc, time::Duration};

use tariff_client::domain::normalize_region_name;
use time::OffsetDateTime;

use crate::{
    calculator::{self, CalculationError, DeviceProfile, Simulation, SimulationMeta},
    freshness::{self, Freshness},
    sources::TariffExtractor,
    store::{RegionStore, StoreError},
};
use lease::{LeaseRole, RefreshOutcome, RegionLeases};

#[derive(thiserror::Error, Debug, Clone)]
pub enum ResolveError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no tariff data available for region '{region}'")]
    NoDataAvailable { region: String },
    #[error("tariff refresh failed for region '{region}': {reason}")]
    ExtractionFailed { region: String, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse classification used by the HTTP layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NoDataAvailable,
    UpstreamFailure,
    Store,
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::NoDataAvailable { .. } => ErrorKind::NoDataAvailable,
            Self::ExtractionFailed { .. } => ErrorKind::UpstreamFailure,
            Self::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<CalculationError> for ResolveError {
    fn from(e: CalculationError) -> Self {
        match e {
            CalculationError::InvalidInput(msg) => Self::InvalidInput(msg),
        }
    }
}

/// What a forced refresh stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReport {
    Replaced { providers: usize, rows: u64 },
    /// Joined a refresh that found the region already up to date.
    AlreadyFresh,
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_age: time::Duration,
    pub lease_deadline: Duration,
}

pub struct TariffResolver {
    store: Arc<dyn RegionStore>,
    extractor: Arc<dyn TariffExtractor>,
    leases: RegionLeases,
    max_age: time::Duration,
}

impl TariffResolver {
    pub fn new(store: Arc<dyn RegionStore>, extractor: Arc<dyn TariffExtractor>, settings: ResolverSettings) -> Self {
        Self {
            store,
            extractor,
            leases: RegionLeases::new(settings.lease_deadline),
            max_age: settings.max_age,
        }
    }

    /// Cost of running a device in `region` for a month.
    pub async fn resolve(
        &self,
        region: &str,
        watts: f64,
        hours_per_day: f64,
        days_per_month: f64,
    ) -> Result<Simulation, ResolveError> {
        metrics::counter!("resolve_requests_total").increment(1);

        let profile = DeviceProfile {
            watts,
            hours_per_day,
            days_per_month,
        };
        calculator::validate_profile(&profile)?;
        let key = region_key(region)?;

        let existing = self.store.find_region(&key).await?;
        let freshness = freshness::classify(existing.as_ref(), OffsetDateTime::now_utc(), self.max_age);

        let mut degraded = false;
        if freshness.needs_refresh() {
            tracing::info!(region = %key, ?freshness, "cached tariffs need refresh");

            match self.refresh_under_lease(&key, region.trim(), false).await {
                RefreshOutcome::Replaced { .. } | RefreshOutcome::AlreadyFresh => {}
                RefreshOutcome::StoreFailed(e) => return Err(e.into()),
                outcome if freshness == Freshness::Stale => {
                    tracing::warn!(region = %key, ?outcome, "refresh failed, serving stale tariffs");
                    metrics::counter!("tariff_degraded_responses_total").increment(1);
                    degraded = true;
                }
                outcome => {
                    tracing::warn!(region = %key, ?outcome, "refresh failed and no cached tariffs exist");
                    return Err(ResolveError::NoDataAvailable { region: key });
                }
            }
        }

        let rows = self.store.read_price_rows(&key).await?;
        let Some(first) = rows.first() else {
            return Err(ResolveError::NoDataAvailable { region: key });
        };

        let meta = SimulationMeta {
            region: region.trim().to_uppercase(),
            last_refreshed_at: first.last_refreshed_at,
            degraded,
        };
        Ok(calculator::compute(&profile, meta, &rows)?)
    }

    /// Pull the region from the source now, regardless of freshness.
    pub async fn refresh(&self, region: &str) -> Result<RefreshReport, ResolveError> {
        let key = region_key(region)?;

        match self.refresh_under_lease(&key, region.trim(), true).await {
            RefreshOutcome::Replaced { providers, rows } => Ok(RefreshReport::Replaced { providers, rows }),
            RefreshOutcome::AlreadyFresh => Ok(RefreshReport::AlreadyFresh),
            RefreshOutcome::StoreFailed(e) => Err(e.into()),
            RefreshOutcome::Empty => Err(ResolveError::ExtractionFailed {
                region: key,
                reason: "source returned no tariffs".to_string(),
            }),
            RefreshOutcome::ExtractionFailed(reason) => Err(ResolveError::ExtractionFailed { region: key, reason }),
            RefreshOutcome::DeadlineExceeded(deadline) => Err(ResolveError::ExtractionFailed {
                region: key,
                reason: format!("refresh exceeded {deadline:?}"),
            }),
        }
    }

    async fn refresh_under_lease(&self, key: &str, display_name: &str, force: bool) -> RefreshOutcome {
        let store = Arc::clone(&self.store);
        let extractor = Arc::clone(&self.extractor);
        let max_age = self.max_age;
        let key_owned = key.to_string();
        let display_name = display_name.to_string();

        let refresh = async move {
            // A refresh for this region may have completed between our
            // classification and taking the lease.
            if !force {
                match store.find_region(&key_owned).await {
                    Ok(region) => {
                        if freshness::classify(region.as_ref(), OffsetDateTime::now_utc(), max_age) == Freshness::Fresh {
                            return RefreshOutcome::AlreadyFresh;
                        }
                    }
                    Err(e) => return RefreshOutcome::StoreFailed(e),
                }
            }

            metrics::counter!("tariff_extractions_total").increment(1);
            let groups = match extractor.extract(&display_name).await {
                Ok(groups) => groups,
                Err(e) => {
                    metrics::counter!("tariff_extraction_failures_total").increment(1);
                    tracing::warn!(region = %key_owned, error = %e, "tariff extraction failed");
                    return RefreshOutcome::ExtractionFailed(e.to_string());
                }
            };

            if groups.iter().all(|g| g.tiers.is_empty()) {
                metrics::counter!("tariff_extraction_failures_total").increment(1);
                tracing::warn!(region = %key_owned, providers = groups.len(), "source returned no tier prices");
                return RefreshOutcome::Empty;
            }

            match store.refresh_region(&key_owned, &groups).await {
                Ok(rows) => RefreshOutcome::Replaced {
                    providers: groups.len(),
                    rows,
                },
                Err(e) => {
                    tracing::error!(region = %key_owned, error = %e, "failed to store refreshed tariffs");
                    RefreshOutcome::StoreFailed(e)
                }
            }
        };

        let (outcome, role) = self.leases.run(key, refresh).await;
        if role == LeaseRole::Follower {
            tracing::debug!(region = %key, "joined in-flight refresh");
        }
        outcome
    }
}

fn region_key(region: &str) -> Result<String, ResolveError> {
    let key = normalize_region_name(region);
    if key.is_empty() {
        return Err(ResolveError::InvalidInput("region must not be empty".to_string()));
    }
    Ok(key)
}
