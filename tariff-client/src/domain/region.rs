use time::OffsetDateTime;

/// A cached pricing region, keyed by its normalized name.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Region {
    pub id: i64,
    pub normalized_name: String,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_refreshed_at: Option<OffsetDateTime>,
}

/// Canonical cache key for a region name: trimmed and case-folded, so that
/// "  Ancud " and "ANCUD" address the same row.
pub fn normalize_region_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_collapses_case_and_outer_whitespace() {
        assert_eq!(normalize_region_name("  Ancud "), "ancud");
        assert_eq!(normalize_region_name("ALGARROBO"), "algarrobo");
        assert_eq!(normalize_region_name("Puerto Montt"), "puerto montt");
    }

    #[test]
    fn normalization_folds_non_ascii_letters() {
        assert_eq!(normalize_region_name("ÑUÑOA"), "ñuñoa");
        assert_eq!(normalize_region_name("Conchalí"), normalize_region_name("CONCHALÍ"));
    }
}
