//! Monthly cost simulation for a single device against a region's price table.
//!
//! Everything here is pure: the resolver hands in the rows it read from the
//! store and gets back either a [`Simulation`] or [`CalculationError`].

use std::collections::HashMap;

use serde::Serialize;
use tariff_client::domain::PriceRow;
use time::OffsetDateTime;

/// Label used for rows whose provider was not published.
pub const GENERIC_PROVIDER: &str = "Generic Provider";

const MAX_HOURS_PER_DAY: f64 = 24.0;
const MAX_DAYS_PER_MONTH: f64 = 31.0;
const KWH_DISPLAY_DECIMALS: i32 = 4;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalculationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// How a device draws power over a month.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceProfile {
    pub watts: f64,
    pub hours_per_day: f64,
    pub days_per_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationMeta {
    pub region: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refreshed_at: Option<OffsetDateTime>,
    /// Set when a refresh was due but failed and the stored table was used.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSummary {
    pub watts: f64,
    pub monthly_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierSimulation {
    pub tier_label: String,
    pub unit_price: f64,
    pub variable_cost: f64,
    pub total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSimulation {
    pub provider_name: String,
    pub fixed_charge: f64,
    pub tiers: Vec<TierSimulation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Simulation {
    pub meta: SimulationMeta,
    pub device: DeviceSummary,
    pub groups: Vec<ProviderSimulation>,
}

/// Reject profiles that cannot describe a real month of usage.
///
/// Rules:
/// - watts must be positive.
/// - hours per day must be in (0, 24].
/// - days per month must be in (0, 31].
pub fn validate_profile(profile: &DeviceProfile) -> Result<(), CalculationError> {
    let DeviceProfile {
        watts,
        hours_per_day,
        days_per_month,
    } = *profile;

    if !watts.is_finite() || watts <= 0.0 {
        return Err(CalculationError::InvalidInput("watts must be positive".to_string()));
    }
    if !hours_per_day.is_finite() || hours_per_day <= 0.0 || hours_per_day > MAX_HOURS_PER_DAY {
        return Err(CalculationError::InvalidInput(
            "hours per day must be greater than 0 and at most 24".to_string(),
        ));
    }
    if !days_per_month.is_finite() || days_per_month <= 0.0 || days_per_month > MAX_DAYS_PER_MONTH {
        return Err(CalculationError::InvalidInput(
            "days per month must be greater than 0 and at most 31".to_string(),
        ));
    }

    Ok(())
}

/// Energy used per month in kWh, unrounded.
pub fn monthly_kwh(profile: &DeviceProfile) -> f64 {
    profile.watts * profile.hours_per_day * profile.days_per_month / 1000.0
}

/// Build the per-provider cost breakdown.
///
/// Groups appear in the order their provider is first seen in `rows`, and
/// tiers keep their row order inside each group. The variable cost is carried
/// unrounded; only `total` (variable cost plus fixed charge) is rounded to a
/// whole currency unit, half away from zero.
pub fn compute(
    profile: &DeviceProfile,
    meta: SimulationMeta,
    rows: &[PriceRow],
) -> Result<Simulation, CalculationError> {
    validate_profile(profile)?;

    let kwh = monthly_kwh(profile);
    let mut groups: Vec<ProviderSimulation> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let provider_name = provider_label(row.provider_name.as_deref());
        let slot = *index.entry(provider_name.clone()).or_insert_with(|| {
            groups.push(ProviderSimulation {
                provider_name,
                fixed_charge: row.fixed_charge,
                tiers: Vec::new(),
            });
            groups.len() - 1
        });

        let variable_cost = kwh * row.unit_price;
        groups[slot].tiers.push(TierSimulation {
            tier_label: row.tier_label.clone(),
            unit_price: row.unit_price,
            variable_cost,
            total: round_currency(variable_cost + row.fixed_charge),
        });
    }

    Ok(Simulation {
        meta,
        device: DeviceSummary {
            watts: profile.watts,
            monthly_kwh: round_to(kwh, KWH_DISPLAY_DECIMALS),
        },
        groups,
    })
}

fn provider_label(name: Option<&str>) -> String {
    match name.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => GENERIC_PROVIDER.to_string(),
    }
}

// f64::round already rounds half away from zero.
fn round_currency(amount: f64) -> i64 {
    amount.round() as i64
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(watts: f64, hours_per_day: f64, days_per_month: f64) -> DeviceProfile {
        DeviceProfile {
            watts,
            hours_per_day,
            days_per_month,
        }
    }

    fn meta() -> SimulationMeta {
        SimulationMeta {
            region: "ALGARROBO".to_string(),
            last_refreshed_at: None,
            degraded: false,
        }
    }

    fn row(provider: Option<&str>, tier: &str, unit_price: f64, fixed_charge: f64) -> PriceRow {
        PriceRow {
            tier_label: tier.to_string(),
            unit_price,
            fixed_charge,
            provider_name: provider.map(str::to_string),
            last_refreshed_at: None,
        }
    }

    #[test]
    fn monthly_kwh_follows_watts_hours_days() {
        for (w, h, d) in [(1000.0, 1.0, 1.0), (60.0, 5.5, 30.0), (7.0, 3.0, 31.0), (2200.0, 0.25, 12.0)] {
            let expected = w * h * d / 1000.0;
            assert!((monthly_kwh(&profile(w, h, d)) - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn validation_rejects_each_bad_parameter_independently() {
        assert!(validate_profile(&profile(100.0, 25.0, 1.0)).is_err());
        assert!(validate_profile(&profile(0.0, 1.0, 1.0)).is_err());
        assert!(validate_profile(&profile(100.0, 1.0, 32.0)).is_err());
        assert!(validate_profile(&profile(-5.0, 1.0, 1.0)).is_err());
        assert!(validate_profile(&profile(100.0, 0.0, 1.0)).is_err());
        assert!(validate_profile(&profile(f64::NAN, 1.0, 1.0)).is_err());
    }

    #[test]
    fn validation_rejects_non_positive_days() {
        assert!(validate_profile(&profile(100.0, 1.0, 0.0)).is_err());
        assert!(validate_profile(&profile(100.0, 1.0, -3.0)).is_err());
    }

    #[test]
    fn validation_accepts_boundaries() {
        assert!(validate_profile(&profile(1.0, 24.0, 31.0)).is_ok());
        assert!(validate_profile(&profile(1.0, 0.5, 1.0)).is_ok());
    }

    #[test]
    fn one_kilowatt_for_one_hour_one_day_costs_unit_price() {
        let rows = [row(Some("CGE"), "Consumo Base", 100.0, 1000.0)];
        let sim = compute(&profile(1000.0, 1.0, 1.0), meta(), &rows).expect("valid input");

        assert_eq!(sim.device.monthly_kwh, 1.0);
        assert_eq!(sim.groups.len(), 1);
        let tier = &sim.groups[0].tiers[0];
        assert_eq!(tier.variable_cost, 100.0);
        assert_eq!(tier.total, 1100);
        assert_eq!(sim.groups[0].fixed_charge, 1000.0);
    }

    #[test]
    fn groups_keep_first_seen_provider_order() {
        let rows = [
            row(Some("ENEL"), "BT1 hasta 350 kWh", 110.0, 1000.0),
            row(Some("CGE"), "BT1", 115.0, 1200.0),
            row(Some("ENEL"), "BT1 sobre 350 kWh", 130.0, 1000.0),
            row(Some("CHILQUINTA"), "BT1", 105.0, 1100.0),
        ];
        let sim = compute(&profile(1000.0, 1.0, 1.0), meta(), &rows).expect("valid input");

        let names: Vec<&str> = sim.groups.iter().map(|g| g.provider_name.as_str()).collect();
        assert_eq!(names, ["ENEL", "CGE", "CHILQUINTA"]);
        assert_eq!(sim.groups[0].tiers.len(), 2);
        assert_eq!(sim.groups[0].tiers[1].tier_label, "BT1 sobre 350 kWh");
    }

    #[test]
    fn missing_or_blank_provider_uses_generic_label() {
        let rows = [row(None, "BT1", 100.0, 0.0), row(Some("  "), "BT2", 120.0, 0.0)];
        let sim = compute(&profile(1000.0, 1.0, 1.0), meta(), &rows).expect("valid input");

        assert_eq!(sim.groups.len(), 1);
        assert_eq!(sim.groups[0].provider_name, GENERIC_PROVIDER);
        assert_eq!(sim.groups[0].tiers.len(), 2);
    }

    #[test]
    fn total_rounds_sum_half_away_from_zero_without_prerounding_variable_cost() {
        // 0.63 kWh * 150.5 = 94.815 -> +0.2 fixed = 95.015 -> 95.
        let rows = [row(Some("SAESA"), "BT1", 150.5, 0.2)];
        let sim = compute(&profile(7.0, 3.0, 30.0), meta(), &rows).expect("valid input");
        let tier = &sim.groups[0].tiers[0];
        assert!((tier.variable_cost - 94.815).abs() < 1e-9);
        assert_eq!(tier.total, 95);

        // 1 kWh * 10.25 + 0.25 = 10.5 -> 11. Pre-rounding 10.25 to 10 would give 10.
        let rows = [row(Some("SAESA"), "BT1", 10.25, 0.25)];
        let sim = compute(&profile(1000.0, 1.0, 1.0), meta(), &rows).expect("valid input");
        assert_eq!(sim.groups[0].tiers[0].total, 11);
    }

    #[test]
    fn reported_kwh_is_rounded_to_four_decimals() {
        let sim = compute(&profile(1.0, 1.0, 1.0), meta(), &[]).expect("valid input");
        assert_eq!(sim.device.monthly_kwh, 0.001);

        let sim = compute(&profile(0.33333, 1.0, 1.0), meta(), &[]).expect("valid input");
        assert_eq!(sim.device.monthly_kwh, 0.0003);
    }

    #[test]
    fn compute_refuses_invalid_profile() {
        let rows = [row(Some("CGE"), "BT1", 100.0, 0.0)];
        let res = compute(&profile(100.0, 1.0, 32.0), meta(), &rows);
        assert!(matches!(res, Err(CalculationError::InvalidInput(_))));
    }
}
