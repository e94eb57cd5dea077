pub mod config;
pub mod cycle;
pub mod gauge;

use daygauge_core::storage::open_store;
use daygauge_core::{Config, GaugeService};

/// Load the configuration and open the configured store.
pub fn open_service() -> Result<GaugeService, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = open_store(&config.storage)?;
    Ok(GaugeService::new(store, config.gauge)?)
}
