//! The order aggregate (spec §3) and its lifecycle state machine (§4.2).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use super::errors::EngineError;
use super::identifiers::InternalId;
use super::timestamp::Timestamp;

/// Normalized order type, as produced by the signal processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

impl OrderType {
    #[must_use]
    pub const fn requires_price(self) -> bool {
        !matches!(self, Self::Market)
    }
}

impl std::str::FromStr for OrderType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            "STOP" => Ok(Self::Stop),
            other => Err(EngineError::ClientError(format!(
                "unknown order type: {other}"
            ))),
        }
    }
}

/// Normalized trade parameters (spec §3 `params`, §4.4 output).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeParams {
    pub instrument: String,
    /// Signed quantity: positive = buy, negative = sell.
    pub units: Decimal,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
}

impl TradeParams {
    #[must_use]
    pub fn is_buy(&self) -> bool {
        self.units.is_sign_positive()
    }

    #[must_use]
    pub fn quantity(&self) -> Decimal {
        self.units.abs()
    }
}

/// Lifecycle status (spec §4.2 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingSubmission,
    OrderAccepted,
    SubmittedToBroker,
    Filled,
    Cancelled,
    RejectedByBroker,
    ErrorSubmitting,
}

impl OrderStatus {
    /// Terminal statuses never transition out (invariant 2).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::RejectedByBroker | Self::ErrorSubmitting
        )
    }
}

/// The central entity: one row per submitted signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub internal_id: InternalId,
    pub received_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub signal: Json,
    pub params: TradeParams,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub broker_trade_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub fill_quantity: Option<Decimal>,
    pub broker_reply: Option<Json>,
    pub error_message: Option<String>,
}

impl Order {
    /// Construct a freshly-created order in `PENDING_SUBMISSION`.
    #[must_use]
    pub fn new(signal: Json, params: TradeParams) -> Self {
        let now = Timestamp::now();
        Self {
            internal_id: InternalId::generate(),
            received_at: now,
            created_at: now,
            updated_at: now,
            signal,
            params,
            status: OrderStatus::PendingSubmission,
            broker_order_id: None,
            broker_trade_id: None,
            fill_price: None,
            fill_quantity: None,
            broker_reply: None,
            error_message: None,
        }
    }

    /// Record a new `broker_order_id`, enforcing invariant 3 (set at most
    /// once; later updates must match by equality).
    pub fn assign_broker_order_id(&mut self, id: String) -> Result<(), EngineError> {
        match &self.broker_order_id {
            None => {
                self.broker_order_id = Some(id);
                Ok(())
            }
            Some(existing) if *existing == id => Ok(()),
            Some(existing) => Err(EngineError::Conflict(format!(
                "broker_order_id already set to {existing}, refusing to overwrite with {id}"
            ))),
        }
    }

    /// Transition to a new status, rejecting any attempt to leave a
    /// terminal state (invariant 2).
    pub fn transition(&mut self, new_status: OrderStatus) -> Result<(), EngineError> {
        if self.status.is_terminal() {
            return Err(EngineError::Conflict(format!(
                "order {} is already terminal ({:?}), refusing transition to {:?}",
                self.internal_id, self.status, new_status
            )));
        }
        self.status = new_status;
        self.updated_at = Timestamp::now();
        Ok(())
    }
}
