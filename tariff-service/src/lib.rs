pub mod api;
pub mod calculator;
pub mod config;
pub mod freshness;
pub mod metrics_server;
pub mod observability;
pub mod resolver;
pub mod sources;
pub mod store;

pub use resolver::{ResolveError, TariffResolver};
