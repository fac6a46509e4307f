//! Broker adapters and the startup-time factory (spec §4.5).

mod alpaca;
mod oanda;

pub use alpaca::AlpacaBroker;
pub use oanda::OandaBroker;

use std::sync::Arc;

use crate::application::ports::{BrokerPort, ConfigLookup};

/// Build the single active broker for this process from `broker.name`.
///
/// Fails fast: an unset or unknown name, or missing credentials for the
/// chosen broker, abort startup rather than defer the failure to the
/// first signal (spec §4.5 "Instantiation").
pub fn build_broker(config: &dyn ConfigLookup) -> Result<Arc<dyn BrokerPort>, anyhow::Error> {
    let name = config.get_string("broker.name", "");
    match name.to_ascii_lowercase().as_str() {
        "oanda" => Ok(Arc::new(OandaBroker::from_config(config)?)),
        "alpaca" => Ok(Arc::new(AlpacaBroker::from_config(config)?)),
        "" => anyhow::bail!("broker.name is not set; cannot determine which broker to use"),
        other => anyhow::bail!("unknown broker.name: {other}"),
    }
}
