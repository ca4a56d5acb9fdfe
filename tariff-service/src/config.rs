use serde::Deserialize;
use std::{fs, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    pub max_connections: u32,
    /// Run `CREATE TABLE IF NOT EXISTS` for the tariff tables on startup.
    #[serde(default = "default_true")]
    pub apply_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FreshnessConfig {
    /// Cached prices older than this are refreshed before use.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
        }
    }
}

impl FreshnessConfig {
    pub fn max_age(&self) -> time::Duration {
        time::Duration::days(i64::from(self.max_age_days))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_result_timeout_secs")]
    pub result_timeout_secs: u64,
    /// Pause between picking the region and submitting the search.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Chrome or Chromium binary; looked up on the PATH when unset.
    #[serde(default)]
    pub chrome_executable: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            result_timeout_secs: default_result_timeout_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            chrome_executable: None,
        }
    }
}

impl SourceConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn result_timeout(&self) -> Duration {
        Duration::from_secs(self.result_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Longest a single region refresh may hold its lease.
    #[serde(default = "default_lease_deadline_secs")]
    pub lease_deadline_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            lease_deadline_secs: default_lease_deadline_secs(),
        }
    }
}

impl RefreshConfig {
    pub fn lease_deadline(&self) -> Duration {
        Duration::from_secs(self.lease_deadline_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_inter_region_delay_ms")]
    pub inter_region_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            inter_region_delay_ms: default_inter_region_delay_ms(),
        }
    }
}

impl BatchConfig {
    pub fn inter_region_delay(&self) -> Duration {
        Duration::from_millis(self.inter_region_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("TARIFF_CONFIG").unwrap_or_else(|_| "tariff-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    90
}

fn default_max_age_days() -> u32 {
    15
}

fn default_base_url() -> String {
    "https://cuentadelaluz.cl/".to_string()
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

fn default_result_timeout_secs() -> u64 {
    20
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_lease_deadline_secs() -> u64 {
    120
}

fn default_inter_region_delay_ms() -> u64 {
    3000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://localhost/tariffs"
            max_connections = 4

            [http]
            bind_addr = "0.0.0.0:3000"
            "#,
        )
        .expect("config should parse");

        assert!(cfg.database.apply_schema);
        assert_eq!(cfg.freshness.max_age_days, 15);
        assert_eq!(cfg.freshness.max_age(), time::Duration::days(15));
        assert_eq!(cfg.source.navigation_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.source.result_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.batch.inter_region_delay(), Duration::from_secs(3));
        assert_eq!(cfg.source.chrome_executable, None);
        assert!(cfg.metrics.is_none());
    }

    #[test]
    fn explicit_sections_override_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [database]
            uri = "postgres://db/tariffs"
            max_connections = 10
            apply_schema = false

            [http]
            bind_addr = "127.0.0.1:8080"
            request_timeout_secs = 30

            [freshness]
            max_age_days = 7

            [source]
            chrome_executable = "/usr/bin/chromium"

            [refresh]
            lease_deadline_secs = 45

            [metrics]
            bind_addr = "127.0.0.1:9100"
            "#,
        )
        .expect("config should parse");

        assert!(!cfg.database.apply_schema);
        assert_eq!(cfg.http.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.freshness.max_age(), time::Duration::days(7));
        assert_eq!(cfg.source.chrome_executable.as_deref(), Some("/usr/bin/chromium"));
        assert_eq!(cfg.source.result_timeout(), Duration::from_secs(20));
        assert_eq!(cfg.refresh.lease_deadline(), Duration::from_secs(45));
        assert_eq!(cfg.metrics.map(|m| m.bind_addr).as_deref(), Some("127.0.0.1:9100"));
    }

    #[test]
    fn missing_database_section_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [http]
            bind_addr = "0.0.0.0:3000"
            "#,
        );
        assert!(res.is_err());
    }
}
