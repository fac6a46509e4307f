//! Response DTOs (spec §4.6): every body carries a `status ∈
//! {success, error}` discriminator.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as Json;

use crate::domain::Order;

fn enum_str(value: impl Serialize) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct OrderBody {
    pub internal_id: String,
    pub received_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub instrument: String,
    pub units: Decimal,
    pub order_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<Decimal>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_trade_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_quantity: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_reply: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<&Order> for OrderBody {
    fn from(order: &Order) -> Self {
        Self {
            internal_id: order.internal_id.to_string(),
            received_at: order.received_at.to_rfc3339(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
            instrument: order.params.instrument.clone(),
            units: order.params.units,
            order_type: enum_str(order.params.order_type),
            price: order.params.price,
            stop_loss: order.params.stop_loss,
            take_profit: order.params.take_profit,
            status: enum_str(order.status),
            broker_order_id: order.broker_order_id.clone(),
            broker_trade_id: order.broker_trade_id.clone(),
            fill_price: order.fill_price,
            fill_quantity: order.fill_quantity,
            broker_reply: order.broker_reply.clone(),
            error_message: order.error_message.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub internal_order_id: String,
    pub order: OrderBody,
}

#[derive(Debug, Serialize)]
pub struct OrdersListResponse {
    pub status: &'static str,
    pub orders: Vec<OrderBody>,
}

#[derive(Debug, Serialize)]
pub struct PositionsResponse {
    pub status: &'static str,
    pub positions: HashMap<String, Decimal>,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub status: &'static str,
    pub instrument: String,
    pub position: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub status: &'static str,
    pub config: Json,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_error: Option<String>,
}
