//! Oanda v20 broker adapter.
//!
//! No teacher repo implements Oanda; wire shape (endpoints, the
//! `{"order": {...}}` envelope, stringified signed units, `FOK`/`GTC`
//! defaults, transaction-keyed reply bodies) is grounded on
//! `original_source/src/broker_interface/oanda_implementation.py`,
//! expressed with the same HTTP-client-wrapper idiom as the Alpaca
//! adapter. Issues exactly one attempt per call; no retry/backoff.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::{Value as Json, json};

use crate::application::ports::{BrokerError, BrokerPort, BrokerReply, ConfigLookup};

/// Spec §5 "Cancellation/timeout": mutating calls get 15s, overriding
/// the client's 10s read default.
const MUTATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub struct OandaBroker {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
    api_key: String,
    default_time_in_force: String,
}

impl OandaBroker {
    pub fn from_config(config: &dyn ConfigLookup) -> Result<Self, anyhow::Error> {
        let api_key = config.get_string("OANDA_API_KEY", "");
        let account_id = config.get_string("OANDA_ACCOUNT_ID", "");
        if api_key.is_empty() || account_id.is_empty() {
            anyhow::bail!("OANDA_API_KEY and OANDA_ACCOUNT_ID must both be set for broker.name=oanda");
        }
        let base_url = config.get_string(
            "OANDA_API_URL",
            &config.get_string("brokers.oanda.base_url", "https://api-fxpractice.oanda.com"),
        );
        let default_time_in_force = config.get_string("trading.defaults.time_in_force", "GTC");
        // Spec default: 10s reads. Mutating calls (order placement,
        // cancellation) override this per-request to 15s below.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build oanda http client: {e}"))?;
        Ok(Self {
            client,
            base_url,
            account_id,
            api_key,
            default_time_in_force,
        })
    }

    fn orders_url(&self) -> String {
        format!("{}/v3/accounts/{}/orders", self.base_url, self.account_id)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Json, BrokerError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "oanda request failed in transport");
                BrokerError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body: Json = response
            .json()
            .await
            .unwrap_or_else(|_| json!({}));
        tracing::debug!(%status, reply = %body, "oanda response received");

        if status.is_success() {
            return Ok(body);
        }
        if status.is_client_error() {
            let message = body
                .get("errorMessage")
                .and_then(Json::as_str)
                .unwrap_or("oanda rejected the request")
                .to_string();
            return Err(BrokerError::Refusal(message));
        }
        Err(BrokerError::Internal(format!(
            "oanda returned {status}: {body}"
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
        let mut order = json!({
            "type": order_type,
            "instrument": instrument,
            "units": units.to_string(),
            "timeInForce": if order_type == "MARKET" { "FOK" } else { self.default_time_in_force.as_str() },
            "positionFill": "DEFAULT",
        });
        if let Some(price) = price {
            order["price"] = json!(price.to_string());
        }
        if let Some(stop_loss) = stop_loss {
            order["stopLossOnFill"] = json!({"price": stop_loss.to_string()});
        }
        if let Some(take_profit) = take_profit {
            order["takeProfitOnFill"] = json!({"price": take_profit.to_string()});
        }
        let wrapped = json!({ "order": order });
        tracing::debug!(request = %wrapped, "oanda order request built");
        wrapped
    }
}

#[async_trait]
impl BrokerPort for OandaBroker {
    async fn get_account_summary(&self) -> Result<Json, BrokerError> {
        let url = format!(
            "{}/v3/accounts/{}/summary",
            self.base_url, self.account_id
        );
        self.send(self.client.get(url)).await
    }

    async fn place_market_order(
        &self,
        instrument: &str,
        units: Decimal,
        stop_loss: Option<Decimal>,
        take_profit: Option<Decimal>,
    ) -> Result<Json, BrokerError> {
        let body = self.order_body("MARKET", instrument, units, None, stop_loss, take_profit);
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
            "LIMIT",
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
            "STOP",
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
        let url = format!(
            "{}/v3/accounts/{}/orders/{}/cancel",
            self.base_url, self.account_id, broker_order_id
        );
        self.send(self.client.put(url).timeout(MUTATION_TIMEOUT)).await
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<Json, BrokerError> {
        let url = format!(
            "{}/v3/accounts/{}/orders/{}",
            self.base_url, self.account_id, broker_order_id
        );
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

        if let Some(fill) = reply.get("orderFillTransaction") {
            let broker_order_id = fill
                .get("orderID")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            let broker_trade_id = fill
                .get("tradeOpened")
                .and_then(|t| t.get("tradeID"))
                .and_then(Json::as_str)
                .map(str::to_string);
            let fill_price = fill
                .get("price")
                .and_then(Json::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();
            let fill_quantity = fill
                .get("units")
                .and_then(Json::as_str)
                .and_then(|s| s.parse::<Decimal>().ok())
                .unwrap_or_default();
            return BrokerReply::Fill {
                broker_order_id,
                broker_trade_id,
                fill_price,
                fill_quantity,
            };
        }

        if let Some(cancel) = reply.get("orderCancelTransaction") {
            let broker_order_id = cancel
                .get("orderID")
                .and_then(Json::as_str)
                .map(str::to_string);
            let reason = cancel
                .get("reason")
                .and_then(Json::as_str)
                .unwrap_or("ORDER_CANCELLED")
                .to_string();
            return BrokerReply::CancelReply {
                broker_order_id,
                reason,
            };
        }

        if let Some(reject) = reply.get("orderRejectTransaction") {
            let reason = reject
                .get("rejectReason")
                .and_then(Json::as_str)
                .unwrap_or("ORDER_REJECTED")
                .to_string();
            return BrokerReply::RejectReply { reason };
        }

        if let Some(create) = reply.get("orderCreateTransaction") {
            let broker_order_id = create
                .get("id")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            return BrokerReply::Accepted { broker_order_id };
        }

        BrokerReply::Unrecognized
    }
}
