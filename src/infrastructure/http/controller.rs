//! HTTP Controller (Driver Adapter), spec §4.6 (component F).
//!
//! Axum-based REST surface that delegates to the application use cases.
//! Every body carries a `status` discriminator; this is the only layer
//! in the crate that maps `EngineError` to a status code.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value as Json_;

use crate::application::ports::{BrokerPort, ConfigLookup, OrderStorePort};
use crate::application::use_cases::{CancelOrderUseCase, SubmitSignalUseCase};
use crate::domain::{EngineError, InternalId, Order, OrderStatus};
use crate::infrastructure::config::ConfigStore;

use super::request::constant_time_eq;
use super::response::{
    ConfigResponse, ErrorBody, HealthResponse, OrderBody, OrdersListResponse, PositionResponse,
    PositionsResponse, SubmitResponse,
};

/// Application state shared across handlers (spec §5: configuration and
/// the broker are process-wide; the store opens its own connection per
/// call).
pub struct AppState {
    pub submit_signal: Arc<SubmitSignalUseCase>,
    pub cancel_order: Arc<CancelOrderUseCase>,
    pub store: Arc<dyn OrderStorePort>,
    pub config: Arc<ConfigStore>,
    pub version: String,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            submit_signal: Arc::clone(&self.submit_signal),
            cancel_order: Arc::clone(&self.cancel_order),
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
            version: self.version.clone(),
        }
    }
}

/// Build the router with all nine endpoints of spec §4.6.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{internal_id}", get(get_order))
        .route("/orders/{internal_id}/cancel", post(cancel_order))
        .route("/positions", get(list_positions))
        .route("/positions/{instrument}", get(get_position))
        .route("/config", get(get_config).post(post_config))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let _ = &state;
    Json(HealthResponse { status: "success" })
}

fn error_body(message: impl Into<String>, broker_error: Option<String>) -> ErrorBody {
    ErrorBody {
        status: "error",
        message: message.into(),
        broker_error,
    }
}

/// Map an `EngineError` raised before any broker call (signal validation,
/// store I/O, lookup) to a status code. Broker-call outcomes are instead
/// reconciled into the order's own status (see `submit_outcome`).
fn client_side_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::ClientError(_) => StatusCode::BAD_REQUEST,
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::StoreUnavailable(_)
        | EngineError::BrokerRefusal(_)
        | EngineError::Transport(_)
        | EngineError::Conflict(_)
        | EngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render the result of a submit/cancel use case: a `ClientError` never
/// persists (400); any other `Err` is a 5xx; an `Ok(order)` whose status
/// landed on `REJECTED_BY_BROKER`/`ERROR_SUBMITTING` is a 5xx carrying
/// `broker_error`, everything else is the success status given.
fn submit_outcome(
    result: Result<Order, EngineError>,
    success_status: StatusCode,
) -> (StatusCode, Json<SubmitResponse>) {
    match result {
        Ok(order) => {
            let failed = matches!(
                order.status,
                OrderStatus::RejectedByBroker | OrderStatus::ErrorSubmitting
            );
            let status = if failed {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                success_status
            };
            (
                status,
                Json(SubmitResponse {
                    status: if failed { "error" } else { "success" },
                    internal_order_id: order.internal_id.to_string(),
                    order: OrderBody::from(&order),
                }),
            )
        }
        Err(err) => {
            let status = client_side_status(&err);
            // ClientError never creates a record, so there is no order body
            // to carry; respond with an empty placeholder internal id.
            (
                status,
                Json(SubmitResponse {
                    status: "error",
                    internal_order_id: String::new(),
                    order: OrderBody {
                        internal_id: String::new(),
                        received_at: String::new(),
                        created_at: String::new(),
                        updated_at: String::new(),
                        instrument: String::new(),
                        units: rust_decimal::Decimal::ZERO,
                        order_type: String::new(),
                        price: None,
                        stop_loss: None,
                        take_profit: None,
                        status: String::new(),
                        broker_order_id: None,
                        broker_trade_id: None,
                        fill_price: None,
                        fill_quantity: None,
                        broker_reply: None,
                        error_message: Some(err.to_string()),
                    },
                }),
            )
        }
    }
}

fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Json_, (StatusCode, Json<ErrorBody>)> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with("application/json") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(error_body("Content-Type must be application/json", None)),
        ));
    }
    serde_json::from_slice(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(error_body(format!("malformed JSON body: {e}"), None)),
        )
    })
}

/// `POST /webhook` -- authenticate via the `webhook_secret` field, then
/// delegate to the signal processor and submit use case (spec §4.6
/// "Webhook handler contract").
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let mut signal = match parse_body(&headers, &body) {
        Ok(v) => v,
        Err(resp) => return resp.into_response(),
    };

    let configured_secret = state.config.get_string("WEBHOOK_SHARED_SECRET", "");
    if !configured_secret.is_empty() {
        let provided = signal
            .get("webhook_secret")
            .and_then(Json_::as_str)
            .unwrap_or("");
        if !constant_time_eq(provided, &configured_secret) {
            return (
                StatusCode::FORBIDDEN,
                Json(error_body("invalid webhook_secret", None)),
            )
                .into_response();
        }
    }
    if let Some(map) = signal.as_object_mut() {
        map.remove("webhook_secret");
    }

    tracing::info!(path = "/webhook", "signal received");
    let result = state.submit_signal.execute(signal, &*state.config).await;
    let (status, body) = submit_outcome(result, StatusCode::OK);
    tracing::info!(path = "/webhook", status = %status, "signal processed");
    (status, body).into_response()
}

/// `POST /orders` -- operator-submitted signal, no secret check, 201 on
/// success (spec §4.6).
async fn create_order(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let signal = match parse_body(&headers, &body) {
        Ok(v) => v,
        Err(resp) => return resp.into_response(),
    };
    tracing::info!(path = "/orders", "manual order received");
    let result = state.submit_signal.execute(signal, &*state.config).await;
    let (status, body) = submit_outcome(result, StatusCode::CREATED);
    tracing::info!(path = "/orders", status = %status, "manual order processed");
    (status, body).into_response()
}

/// `GET /orders` -- newest first (spec §4.2 `list_all`).
async fn list_orders(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_all().await {
        Ok(orders) => (
            StatusCode::OK,
            Json(OrdersListResponse {
                status: "success",
                orders: orders.iter().map(OrderBody::from).collect(),
            }),
        )
            .into_response(),
        Err(err) => (
            client_side_status(&err),
            Json(error_body(err.to_string(), None)),
        )
            .into_response(),
    }
}

/// `GET /orders/{internal_id}`.
async fn get_order(State(state): State<AppState>, Path(internal_id): Path<String>) -> impl IntoResponse {
    let Ok(id) = InternalId::parse(&internal_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("internal_id is not a valid identifier", None)),
        )
            .into_response();
    };
    match state.store.get(id).await {
        Ok(order) => (
            StatusCode::OK,
            Json(SubmitResponse {
                status: "success",
                internal_order_id: order.internal_id.to_string(),
                order: OrderBody::from(&order),
            }),
        )
            .into_response(),
        Err(err) => (
            client_side_status(&err),
            Json(error_body(err.to_string(), None)),
        )
            .into_response(),
    }
}

/// `POST /orders/{internal_id}/cancel` (spec §4.6 "Cancel handler
/// contract").
async fn cancel_order(State(state): State<AppState>, Path(internal_id): Path<String>) -> impl IntoResponse {
    let Ok(id) = InternalId::parse(&internal_id) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(error_body("internal_id is not a valid identifier", None)),
        )
            .into_response();
    };
    tracing::info!(internal_id = %id, path = "/orders/{id}/cancel", "cancel requested");
    let result = state.cancel_order.execute(id).await;
    let (status, body) = submit_outcome(result, StatusCode::OK);
    tracing::info!(internal_id = %id, status = %status, "cancel processed");
    (status, body).into_response()
}

/// `GET /positions` -- non-zero net positions (spec §4.3).
async fn list_positions(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.positions().await {
        Ok(positions) => (
            StatusCode::OK,
            Json(PositionsResponse {
                status: "success",
                positions,
            }),
        )
            .into_response(),
        Err(err) => (
            client_side_status(&err),
            Json(error_body(err.to_string(), None)),
        )
            .into_response(),
    }
}

/// `GET /positions/{instrument}` -- signed net position, zero if empty.
async fn get_position(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> impl IntoResponse {
    let instrument = instrument.to_ascii_uppercase();
    match state.store.position(&instrument).await {
        Ok(position) => (
            StatusCode::OK,
            Json(PositionResponse {
                status: "success",
                instrument,
                position,
            }),
        )
            .into_response(),
        Err(err) => (
            client_side_status(&err),
            Json(error_body(err.to_string(), None)),
        )
            .into_response(),
    }
}

/// `GET /config` -- the current effective (file-portion) configuration.
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.config.snapshot();
    match serde_json::to_value(&snapshot) {
        Ok(config) => (
            StatusCode::OK,
            Json(ConfigResponse {
                status: "success",
                config,
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_body(format!("failed to render config: {err}"), None)),
        )
            .into_response(),
    }
}

/// `POST /config` -- replace the configuration file and reload.
/// `broker.name` changes require a process restart to take effect (spec
/// §4.1, §9).
async fn post_config(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let new_config = match parse_body(&headers, &body) {
        Ok(v) => v,
        Err(resp) => return resp.into_response(),
    };
    let yaml: serde_yaml_bw::Value = match serde_json::from_value(new_config) {
        Ok(v) => v,
        Err(err) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(error_body(format!("invalid config document: {err}"), None)),
            )
                .into_response();
        }
    };
    match state.config.save(&yaml) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "success",
                "message": "configuration reloaded; changes to broker.name require a process restart",
            })),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(error_body(format!("failed to save config: {err}"), None)),
        )
            .into_response(),
    }
}
