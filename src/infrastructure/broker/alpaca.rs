//! Alpaca v2 broker adapter.
//!
//! Structurally grounded on the teacher's
//! `infrastructure/broker/alpaca/{adapter.rs,http_client.rs,api_types.rs,
//! config.rs,error.rs}`: an HTTP client wrapper holding `reqwest::Client`
//! plus credentials and base URL, an adapter translating requests into
//! wire DTOs, and reply normalization into a tagged outcome. Issues
//! exactly one attempt per call; the teacher's exponential-backoff retry
//! loop is not ported (spec §7/§9 forbid automatic broker retries).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value as Json, json};

use crate::application::ports::{BrokerError, BrokerPort, BrokerReply, ConfigLookup};

/// Spec §5 "Cancellation/timeout": mutating calls get 15s, overriding
/// the client's 10s read default.
const MUTATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub struct AlpacaBroker {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    secret_key: String,
    default_time_in_force: String,
}

impl AlpacaBroker {
    pub fn from_config(config: &dyn ConfigLookup) -> Result<Self, anyhow::Error> {
        let key_id = config.get_string("ALPACA_API_KEY_ID", "");
        let secret_key = config.get_string("ALPACA_API_SECRET_KEY", "");
        if key_id.is_empty() || secret_key.is_empty() {
            anyhow::bail!(
                "ALPACA_API_KEY_ID and ALPACA_API_SECRET_KEY must both be set for broker.name=alpaca"
            );
        }
        let base_url = config.get_string(
            "brokers.alpaca.base_url",
            "https://paper-api.alpaca.markets",
        );
        let default_time_in_force = config
            .get_string("trading.defaults.time_in_force", "gtc")
            .to_ascii_lowercase();
        // Spec default: 10s reads. Mutating calls (order placement,
        // cancellation) override this per-request to 15s below.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build alpaca http client: {e}"))?;
        Ok(Self {
            client,
            base_url,
            key_id,
            secret_key,
            default_time_in_force,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/v2/orders", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Json, BrokerError> {
        let response = request
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "alpaca request failed in transport");
                BrokerError::Transport(e.to_string())
            })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            tracing::debug!(error = %e, "alpaca response body read failed");
            BrokerError::Transport(e.to_string())
        })?;
        let body: Json = if bytes.is_empty() {
            json!({})
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| json!({}))
        };
        tracing::debug!(%status, reply = %body, "alpaca response received");

        if status.is_success() {
            return Ok(body);
        }
        if status.is_client_error() {
            let message = body
                .get("message")
                .and_then(Json::as_str)
                .unwrap_or("alpaca rejected the request")
                .to_string();
            return Err(BrokerError::Refusal(message));
        }
        Err(BrokerError::Internal(format!(
            "alpaca returned {status}: {body}"
        )))
    }

    fn order_body(
        &self,
        order_type: &str,
        instrument: &str,
        units: Decimal,
        price: Option<Decimal>,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Json {
        let mut body = json!({
            "symbol": instrument,
            "qty": units.abs().to_string(),
            "side": if units.is_sign_positive() { "buy" } else { "sell" },
            "type": order_type,
            "time_in_force": if order_type == "market" { "day" } else { self.default_time_in_force.as_str() },
        });
        if let Some(price) = price {
            let key = if order_type == "stop" { "stop_price" } else { "limit_price" };
            body[key] = json!(price.to_string());
        }
        if stop_loss.is_some() || take_profit.is_some() {
            body["order_class"] = json!("bracket");
            if let Some(stop_loss) = stop_loss {
                body["stop_loss"] = json!({ "stop_price": stop_loss.to_string() });
            }
            if let Some(take_profit) = take_profit {
                body["take_profit"] = json!({ "limit_price": take_profit.to_string() });
            }
        }
        tracing::debug!(request = %body, "alpaca order request built");
        body
    }
}

#[async_trait]
impl BrokerPort for AlpacaBroker {
    async fn get_account_summary(&self) -> Result<Json, BrokerError> {
        let url = format!("{}/v2/account", self.base_url);
        self.send(self.client.get(url)).await
    }

    async fn place_market_order(
        &self,
        instrument: &str,
        units: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError> {
        let body = self.order_body("market", instrument, units, None, stop_loss, take_profit);
        self.send(
            self.client
                .post(self.orders_url())
                .timeout(MUTATION_TIMEOUT)
                .json(&body),
        )
        .await
    }

    async fn place_limit_order(
        &self,
        instrument: &str,
        units: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError> {
        let body = self.order_body(
            "limit",
            instrument,
            units,
            Some(price),
            stop_loss,
            take_profit,
        );
        self.send(
            self.client
                .post(self.orders_url())
                .timeout(MUTATION_TIMEOUT)
                .json(&body),
        )
        .await
    }

    async fn place_stop_order(
        &self,
        instrument: &str,
        units: Decimal,
        price: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError> {
        let body = self.order_body(
            "stop",
            instrument,
            units,
            Some(price),
            stop_loss,
            take_profit,
        );
        self.send(
            self.client
                .post(self.orders_url())
                .timeout(MUTATION_TIMEOUT)
                .json(&body),
        )
        .await
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<Json, BrokerError> {
        let url = format!("{}/{}", self.orders_url(), broker_order_id);
        let reply = self
            .send(self.client.delete(url).timeout(MUTATION_TIMEOUT))
            .await?;
        if reply.as_object().is_some_and(serde_json::Map::is_empty) {
            return Ok(json!({
                "status": "cancellation_requested",
                "id": broker_order_id,
            }));
        }
        Ok(reply)
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<Json, BrokerError> {
        let url = format!("{}/{}", self.orders_url(), broker_order_id);
        self.send(self.client.get(url)).await
    }

    fn classify(&self, reply: Option<&Json>, error: Option<&BrokerError>) -> BrokerReply {
        if let Some(BrokerError::Refusal(reason)) = error {
            return BrokerReply::RejectReply {
                reason: reason.clone(),
            };
        }
        if error.is_some() {
            return BrokerReply::Unrecognized;
        }
        let Some(reply) = reply else {
            return BrokerReply::Unrecognized;
        };

        let status = reply.get("status").and_then(Json::as_str).unwrap_or("");
        let broker_order_id = reply
            .get("id")
            .and_then(Json::as_str)
            .unwrap_or_default()
            .to_string();

        match status {
            "filled" => {
                let fill_price = reply
                    .get("filled_avg_price")
                    .and_then(Json::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                let fill_quantity: Decimal = reply
                    .get("filled_qty")
                    .and_then(Json::as_str)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_default();
                // Alpaca reports `filled_qty` as an unsigned magnitude;
                // direction lives in `side`.
                let fill_quantity = if reply.get("side").and_then(Json::as_str) == Some("sell") {
                    -fill_quantity
                } else {
                    fill_quantity
                };
                BrokerReply::Fill {
                    broker_order_id,
                    broker_trade_id: None,
                    fill_price,
                    fill_quantity,
                }
            }
            "accepted" | "new" | "pending_new" | "held" => {
                BrokerReply::Accepted { broker_order_id }
            }
            "canceled" | "cancellation_requested" | "pending_cancel" => BrokerReply::CancelReply {
                broker_order_id: Some(broker_order_id),
                reason: status.to_string(),
            },
            "rejected" | "expired" => BrokerReply::RejectReply {
                reason: reply
                    .get("rejected_reason")
                    .and_then(Json::as_str)
                    .unwrap_or(status)
                    .to_string(),
            },
            _ => BrokerReply::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> AlpacaBroker {
        AlpacaBroker {
            client: reqwest::Client::new(),
            base_url: "https://paper-api.alpaca.markets".to_string(),
            key_id: "test-key".to_string(),
            secret_key: "test-secret".to_string(),
            default_time_in_force: "gtc".to_string(),
        }
    }

    #[test]
    fn classify_filled_buy_extracts_positive_quantity() {
        let reply = json!({
            "id": "order-1",
            "status": "filled",
            "side": "buy",
            "filled_avg_price": "109.50",
            "filled_qty": "100"
        });
        let outcome = broker().classify(Some(&reply), None);
        assert_eq!(
            outcome,
            BrokerReply::Fill {
                broker_order_id: "order-1".to_string(),
                broker_trade_id: None,
                fill_price: Decimal::new(10950, 2),
                fill_quantity: Decimal::new(100, 0),
            }
        );
    }

    #[test]
    fn classify_filled_sell_negates_quantity() {
        let reply = json!({
            "id": "order-4",
            "status": "filled",
            "side": "sell",
            "filled_avg_price": "109.50",
            "filled_qty": "100"
        });
        let outcome = broker().classify(Some(&reply), None);
        assert_eq!(
            outcome,
            BrokerReply::Fill {
                broker_order_id: "order-4".to_string(),
                broker_trade_id: None,
                fill_price: Decimal::new(10950, 2),
                fill_quantity: Decimal::new(-100, 0),
            }
        );
    }

    #[test]
    fn classify_new_is_accepted() {
        let reply = json!({"id": "order-2", "status": "new"});
        let outcome = broker().classify(Some(&reply), None);
        assert_eq!(
            outcome,
            BrokerReply::Accepted {
                broker_order_id: "order-2".to_string()
            }
        );
    }

    #[test]
    fn classify_rejected_carries_reason() {
        let reply = json!({"id": "order-3", "status": "rejected", "rejected_reason": "insufficient buying power"});
        let outcome = broker().classify(Some(&reply), None);
        assert_eq!(
            outcome,
            BrokerReply::RejectReply {
                reason: "insufficient buying power".to_string()
            }
        );
    }

    #[test]
    fn order_body_market_buy_has_no_bracket_when_no_sl_tp() {
        let body = broker().order_body(
            "market",
            "AAPL",
            Decimal::new(10, 0),
            None,
            None,
            None,
        );
        assert_eq!(body["side"], "buy");
        assert_eq!(body["qty"], "10");
        assert!(body.get("order_class").is_none());
    }

    #[test]
    fn order_body_sell_with_bracket_sets_class_and_legs() {
        let body = broker().order_body(
            "limit",
            "AAPL",
            Decimal::new(-10, 0),
            Some(Decimal::new(15000, 2)),
            Some(Decimal::new(14000, 2)),
            Some(Decimal::new(16000, 2)),
        );
        assert_eq!(body["side"], "sell");
        assert_eq!(body["order_class"], "bracket");
        assert_eq!(body["limit_price"], "150.00");
        assert_eq!(body["stop_loss"]["stop_price"], "140.00");
        assert_eq!(body["take_profit"]["limit_price"], "160.00");
        assert_eq!(body["time_in_force"], "gtc");
    }

    #[test]
    fn order_body_market_uses_day_time_in_force() {
        let body = broker().order_body("market", "AAPL", Decimal::new(10, 0), None, None, None);
        assert_eq!(body["time_in_force"], "day");
    }
}
