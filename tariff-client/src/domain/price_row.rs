use time::OffsetDateTime;

/// One persisted tier price joined with the owning region's refresh time.
///
/// `fixed_charge` belongs to the provider group but is stored on every row of
/// that group.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PriceRow {
    pub tier_label: String,
    pub unit_price: f64,
    pub fixed_charge: f64,
    pub provider_name: Option<String>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_refreshed_at: Option<OffsetDateTime>,
}

/// A single consumption bracket as published by the external source.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TierPrice {
    pub tier_label: String,
    pub unit_price: f64,
}

/// Everything one utility provider publishes for a region.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ProviderGroup {
    pub provider_name: Option<String>,
    pub fixed_charge: f64,
    pub tiers: Vec<TierPrice>,
}
