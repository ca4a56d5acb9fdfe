use tariff_client::domain::Region;
use time::{Duration, OffsetDateTime};

/// Whether the cached price table of a region can be used as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// No region record exists.
    Missing,
    /// Refreshed within the allowed age.
    Fresh,
    /// Older than the allowed age, or never stamped.
    Stale,
}

impl Freshness {
    pub fn needs_refresh(self) -> bool {
        !matches!(self, Freshness::Fresh)
    }
}

/// Classify a region's cached data against `max_age` at instant `now`.
///
/// Data exactly `max_age` old is still fresh; it goes stale strictly after.
pub fn classify(region: Option<&Region>, now: OffsetDateTime, max_age: Duration) -> Freshness {
    let Some(region) = region else {
        return Freshness::Missing;
    };

    match region.last_refreshed_at {
        Some(refreshed_at) if now - refreshed_at <= max_age => Freshness::Fresh,
        _ => Freshness::Stale,
    }
}
