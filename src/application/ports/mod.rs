//! Interfaces to external systems (broker, configuration).

mod broker_port;
mod config_port;
mod store_port;

pub use broker_port::{BrokerError, BrokerPort, BrokerReply};
pub use config_port::ConfigLookup;
pub use store_port::OrderStorePort;
