//! Adapters that pull tariff data from outside the service.

pub mod cuentadelaluz;
pub mod locale;
pub mod region_list;

use std::time::Duration;

use tariff_client::domain::ProviderGroup;

pub use cuentadelaluz::CuentaDeLaLuzExtractor;
pub use region_list::RegionListFile;

#[derive(thiserror::Error, Debug)]
pub enum ExtractionError {
    #[error("tariff page did not load within {0:?}")]
    NavigationTimeout(Duration),
    #[error("region '{0}' not found in the source's region list")]
    RegionNotFound(String),
    #[error("tariff results did not appear within {0:?}")]
    ResultTimeout(Duration),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),
    #[error("unexpected page markup: {0}")]
    Markup(String),
}

/// Fetches the current price table of one region from an external source.
///
/// An `Ok` with an empty list means the source answered but published no
/// prices; it is not a failure.
#[async_trait::async_trait]
pub trait TariffExtractor: Send + Sync {
    async fn extract(&self, region: &str) -> Result<Vec<ProviderGroup>, ExtractionError>;
}
