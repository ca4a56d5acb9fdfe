mod price_row;
mod region;

pub use price_row::{PriceRow, ProviderGroup, TierPrice};
pub use region::{normalize_region_name, Region};
