//! Durable order store backed by turso (spec §4.2, component B).
//!
//! Grounded on `execution/persistence.rs`'s `turso::{Builder, Database,
//! Row, Value}` usage, and on
//! `original_source/src/order_management/manager.py`'s `orders` table
//! shape and reconciliation semantics.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use turso::{Builder, Database, Value as TursoValue};

use crate::application::ports::{BrokerReply, OrderStorePort};
use crate::domain::{EngineError, InternalId, Order, OrderStatus, OrderType, TradeParams};

const CREATE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS orders (
    internal_id      TEXT PRIMARY KEY,
    received_at      TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    signal           TEXT NOT NULL,
    instrument       TEXT NOT NULL,
    units            TEXT NOT NULL,
    order_type       TEXT NOT NULL,
    price            TEXT,
    stop_loss        TEXT,
    take_profit      TEXT,
    status           TEXT NOT NULL,
    broker_order_id  TEXT,
    broker_trade_id  TEXT,
    fill_price       TEXT,
    fill_quantity    TEXT,
    broker_reply     TEXT,
    error_message    TEXT
);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders (status);
CREATE INDEX IF NOT EXISTS idx_orders_instrument ON orders (instrument);
";

/// turso-backed implementation of the order store.
pub struct TursoOrderStore {
    db: Database,
}

impl TursoOrderStore {
    /// Open (creating if absent) a local database file and run
    /// migrations.
    pub async fn new_local(path: &str) -> Result<Self, EngineError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let store = Self { db };
        store.run_migrations().await?;
        Ok(store)
    }

    /// In-memory database, for tests.
    pub async fn new_in_memory() -> Result<Self, EngineError> {
        Self::new_local(":memory:").await
    }

    async fn run_migrations(&self) -> Result<(), EngineError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(CREATE_TABLE)
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn fetch_row(&self, internal_id: InternalId) -> Result<Order, EngineError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT internal_id, received_at, created_at, updated_at, signal, instrument, \
                 units, order_type, price, stop_loss, take_profit, status, broker_order_id, \
                 broker_trade_id, fill_price, fill_quantity, broker_reply, error_message \
                 FROM orders WHERE internal_id = ?",
                vec![TursoValue::Text(internal_id.to_string())],
            )
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let row = rows
            .next()
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(internal_id.to_string()))?;
        row_to_order(&row)
    }

    async fn write_row(&self, order: &Order) -> Result<(), EngineError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let params = vec![
            TursoValue::Text(order.internal_id.to_string()),
            TursoValue::Text(order.received_at.to_rfc3339()),
            TursoValue::Text(order.created_at.to_rfc3339()),
            TursoValue::Text(order.updated_at.to_rfc3339()),
            TursoValue::Text(order.signal.to_string()),
            TursoValue::Text(order.params.instrument.clone()),
            TursoValue::Text(order.params.units.to_string()),
            TursoValue::Text(order_type_text(order.params.order_type).to_string()),
            opt_text(order.params.price.map(|d| d.to_string())),
            opt_text(order.params.stop_loss.map(|d| d.to_string())),
            opt_text(order.params.take_profit.map(|d| d.to_string())),
            TursoValue::Text(status_text(order.status).to_string()),
            opt_text(order.broker_order_id.clone()),
            opt_text(order.broker_trade_id.clone()),
            opt_text(order.fill_price.map(|d| d.to_string())),
            opt_text(order.fill_quantity.map(|d| d.to_string())),
            opt_text(order.broker_reply.as_ref().map(ToString::to_string)),
            opt_text(order.error_message.clone()),
        ];
        conn.execute(
            "INSERT OR REPLACE INTO orders (internal_id, received_at, created_at, updated_at, \
             signal, instrument, units, order_type, price, stop_loss, take_profit, status, \
             broker_order_id, broker_trade_id, fill_price, fill_quantity, broker_reply, \
             error_message) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
            params,
        )
        .await
        .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }
}

fn opt_text(value: Option<String>) -> TursoValue {
    value.map_or(TursoValue::Null, TursoValue::Text)
}

fn order_type_text(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "MARKET",
        OrderType::Limit => "LIMIT",
        OrderType::Stop => "STOP",
    }
}

fn status_text(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::PendingSubmission => "PENDING_SUBMISSION",
        OrderStatus::OrderAccepted => "ORDER_ACCEPTED",
        OrderStatus::SubmittedToBroker => "SUBMITTED_TO_BROKER",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Cancelled => "CANCELLED",
        OrderStatus::RejectedByBroker => "REJECTED_BY_BROKER",
        OrderStatus::ErrorSubmitting => "ERROR_SUBMITTING",
    }
}

fn status_from_text(text: &str) -> Result<OrderStatus, EngineError> {
    Ok(match text {
        "PENDING_SUBMISSION" => OrderStatus::PendingSubmission,
        "ORDER_ACCEPTED" => OrderStatus::OrderAccepted,
        "SUBMITTED_TO_BROKER" => OrderStatus::SubmittedToBroker,
        "FILLED" => OrderStatus::Filled,
        "CANCELLED" => OrderStatus::Cancelled,
        "REJECTED_BY_BROKER" => OrderStatus::RejectedByBroker,
        "ERROR_SUBMITTING" => OrderStatus::ErrorSubmitting,
        other => {
            return Err(EngineError::Internal(format!(
                "unrecognized persisted status: {other}"
            )));
        }
    })
}

fn row_to_order(row: &turso::Row) -> Result<Order, EngineError> {
    let get_text = |idx: usize| -> Result<String, EngineError> {
        row.get::<String>(idx)
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))
    };
    let get_opt_text = |idx: usize| -> Option<String> { row.get::<String>(idx).ok() };
    let get_opt_decimal = |idx: usize| -> Option<Decimal> {
        get_opt_text(idx).and_then(|s| s.parse().ok())
    };

    let internal_id = InternalId::parse(&get_text(0)?)
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let received_at = crate::domain::Timestamp::parse(&get_text(1)?)
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let created_at = crate::domain::Timestamp::parse(&get_text(2)?)
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let updated_at = crate::domain::Timestamp::parse(&get_text(3)?)
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let signal: Json = serde_json::from_str(&get_text(4)?)
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let instrument = get_text(5)?;
    let units: Decimal = get_text(6)?
        .parse()
        .map_err(|_| EngineError::Internal("unparsable units".to_string()))?;
    let order_type = get_text(7)?
        .parse::<OrderType>()
        .map_err(|e| EngineError::Internal(e.to_string()))?;
    let price = get_opt_decimal(8);
    let stop_loss = get_opt_decimal(9);
    let take_profit = get_opt_decimal(10);
    let status = status_from_text(&get_text(11)?)?;
    let broker_order_id = get_opt_text(12);
    let broker_trade_id = get_opt_text(13);
    let fill_price = get_opt_decimal(14);
    let fill_quantity = get_opt_decimal(15);
    let broker_reply = get_opt_text(16).and_then(|s| serde_json::from_str(&s).ok());
    let error_message = get_opt_text(17);

    Ok(Order {
        internal_id,
        received_at,
        created_at,
        updated_at,
        signal,
        params: TradeParams {
            instrument,
            units,
            order_type,
            price,
            stop_loss,
            take_profit,
        },
        status,
        broker_order_id,
        broker_trade_id,
        fill_price,
        fill_quantity,
        broker_reply,
        error_message,
    })
}

#[async_trait]
impl OrderStorePort for TursoOrderStore {
    async fn create(&self, signal: Json, params: TradeParams) -> Result<InternalId, EngineError> {
        let order = Order::new(signal, params);
        let id = order.internal_id;
        self.write_row(&order).await?;
        Ok(id)
    }

    async fn apply_reply(
        &self,
        internal_id: InternalId,
        reply: &BrokerReply,
        raw_reply: Option<Json>,
        broker_error: Option<&str>,
    ) -> Result<Order, EngineError> {
        let mut order = self.fetch_row(internal_id).await?;
        order.broker_reply = raw_reply.or(order.broker_reply);
        if let Some(message) = broker_error {
            order.error_message = Some(message.to_string());
        }

        let transition_result = (|| -> Result<(), EngineError> {
            match reply {
                BrokerReply::Fill {
                    broker_order_id,
                    broker_trade_id,
                    fill_price,
                    fill_quantity,
                } => {
                    order.assign_broker_order_id(broker_order_id.clone())?;
                    order.broker_trade_id = broker_trade_id.clone().or(order.broker_trade_id.clone());
                    order.fill_price = Some(*fill_price);
                    order.fill_quantity = Some(*fill_quantity);
                    order.transition(OrderStatus::Filled)
                }
                BrokerReply::Accepted { broker_order_id } => {
                    order.assign_broker_order_id(broker_order_id.clone())?;
                    order.transition(OrderStatus::OrderAccepted)
                }
                BrokerReply::CancelReply {
                    broker_order_id,
                    reason,
                } => {
                    if let Some(id) = broker_order_id {
                        order.assign_broker_order_id(id.clone())?;
                    }
                    order.error_message = Some(reason.clone());
                    order.transition(OrderStatus::Cancelled)
                }
                BrokerReply::RejectReply { reason } => {
                    order.error_message = Some(reason.clone());
                    order.transition(OrderStatus::RejectedByBroker)
                }
                BrokerReply::Unrecognized => {
                    if broker_error.is_some() {
                        order.transition(OrderStatus::ErrorSubmitting)
                    } else {
                        tracing::warn!(internal_id = %internal_id, "unrecognized broker reply shape");
                        order.transition(OrderStatus::SubmittedToBroker)
                    }
                }
            }
        })();

        if let Err(EngineError::Conflict(reason)) = &transition_result {
            tracing::warn!(internal_id = %internal_id, reason = %reason, "rejected conflicting order update");
            return self.fetch_row(internal_id).await;
        }
        transition_result?;

        self.write_row(&order).await?;
        Ok(order)
    }

    async fn get(&self, internal_id: InternalId) -> Result<Order, EngineError> {
        self.fetch_row(internal_id).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, EngineError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;
        let mut rows = conn
            .query(
                "SELECT internal_id, received_at, created_at, updated_at, signal, instrument, \
                 units, order_type, price, stop_loss, take_profit, status, broker_order_id, \
                 broker_trade_id, fill_price, fill_quantity, broker_reply, error_message \
                 FROM orders ORDER BY created_at DESC",
                (),
            )
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?;

        let mut orders = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| EngineError::StoreUnavailable(e.to_string()))?
        {
            orders.push(row_to_order(&row)?);
        }
        Ok(orders)
    }

    async fn position(&self, instrument: &str) -> Result<Decimal, EngineError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|o| o.status == OrderStatus::Filled && o.params.instrument == instrument)
            .filter_map(|o| o.fill_quantity)
            .sum())
    }

    async fn positions(&self) -> Result<HashMap<String, Decimal>, EngineError> {
        let mut out: HashMap<String, Decimal> = HashMap::new();
        for order in self.list_all().await? {
            if order.status == OrderStatus::Filled {
                if let Some(qty) = order.fill_quantity {
                    *out.entry(order.params.instrument).or_default() += qty;
                }
            }
        }
        out.retain(|_, v| !v.is_zero());
        Ok(out)
    }
}
