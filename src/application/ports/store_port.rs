//! Order store interface (spec §4.2, component B).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use std::collections::HashMap;

use crate::application::ports::BrokerReply;
use crate::domain::{EngineError, InternalId, Order, TradeParams};

/// Durable append-with-update store for orders.
#[async_trait]
pub trait OrderStorePort: Send + Sync {
    /// Write a new row with status `PENDING_SUBMISSION`. Returns the
    /// generated id.
    async fn create(&self, signal: Json, params: TradeParams) -> Result<InternalId, EngineError>;

    /// Compute the new status from the reconciliation outcome and write
    /// an atomic update. The sole path for status transitions after
    /// creation.
    async fn apply_reply(
        &self,
        internal_id: InternalId,
        reply: &BrokerReply,
        raw_reply: Option<Json>,
        broker_error: Option<&str>,
    ) -> Result<Order, EngineError>;

    async fn get(&self, internal_id: InternalId) -> Result<Order, EngineError>;

    /// Ordered by `created_at` descending.
    async fn list_all(&self) -> Result<Vec<Order>, EngineError>;

    /// Signed net position for one instrument; zero if no fills.
    async fn position(&self, instrument: &str) -> Result<Decimal, EngineError>;

    /// Non-zero net positions for every instrument with at least one
    /// fill.
    async fn positions(&self) -> Result<HashMap<String, Decimal>, EngineError>;
}
