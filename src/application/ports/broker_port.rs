//! Broker capability interface (spec §4.5) and reconciliation types (§9).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use thiserror::Error;

/// Error classification for a broker call (spec §4.5 "Error
/// classification").
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Connection refused, timed out, or otherwise failed to reach the
    /// broker.
    #[error("transport error: {0}")]
    Transport(String),

    /// A non-2xx response carrying a broker-shaped refusal body.
    #[error("broker refusal: {0}")]
    Refusal(String),

    /// The capability is not supported by this broker implementation.
    #[error("unimplemented: {0}")]
    Unimplemented(String),

    /// Anything uncategorized in an exceptional path.
    #[error("internal broker error: {0}")]
    Internal(String),
}

/// The normalized outcome of reconciling a broker reply or error (spec
/// §9, "Dynamic payload shapes").
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerReply {
    /// An immediate or later fill.
    Fill {
        broker_order_id: String,
        broker_trade_id: Option<String>,
        fill_price: Decimal,
        fill_quantity: Decimal,
    },
    /// The broker accepted a resting order (limit/stop, not yet filled).
    Accepted { broker_order_id: String },
    /// The order was cancelled (either by request, or by the broker).
    CancelReply {
        broker_order_id: Option<String>,
        reason: String,
    },
    /// The broker rejected the order outright.
    RejectReply { reason: String },
    /// A reply was received but did not match any recognized shape.
    Unrecognized,
}

/// Capability interface over a single configured brokerage (spec §4.5).
///
/// The HTTP surface holds exactly one implementation, chosen at startup
/// by the broker factory (spec §4.5 "Instantiation").
#[async_trait]
pub trait BrokerPort: Send + Sync {
    /// Succeeds iff `get_account_summary` succeeds.
    async fn check_connection(&self) -> Result<(), BrokerError> {
        self.get_account_summary().await.map(|_| ())
    }

    /// Reads identity/balance-ish data; opaque to the engine except for
    /// diagnostics.
    async fn get_account_summary(&self) -> Result<Json, BrokerError>;

    async fn place_market_order(
        &self,
        instrument: &str,
        units: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError>;

    async fn place_limit_order(
        &self,
        instrument: &str,
        units: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError>;

    async fn place_stop_order(
        &self,
        instrument: &str,
        units: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError>;

    async fn cancel_order(&self, broker_order_id: &str) -> Result<Json, BrokerError>;

    /// Optional capability; the default rejects with `Unimplemented`.
    async fn get_order_status(&self, _broker_order_id: &str) -> Result<Json, BrokerError> {
        Err(BrokerError::Unimplemented(
            "get_order_status is not supported by this broker".to_string(),
        ))
    }

    /// Classify a broker reply or error into a normalized outcome (spec
    /// §4.2's reconciliation map, §9's tagged-variant classifier). Mirrors
    /// the `(reply, error)` pair taken by the order store's
    /// `apply_reply`.
    fn classify(&self, reply: Option<&Json>, error: Option<&BrokerError>) -> BrokerReply;
}
