//! Accept a signal, normalize it, persist it, route it to the broker,
//! and reconcile the reply (spec §2 control flow, §4.6 webhook/orders
//! handler contracts).

use std::sync::Arc;

use serde_json::Value as Json;

use crate::application::ports::{BrokerPort, ConfigLookup, OrderStorePort};
use crate::application::signal_processor::process_signal;
use crate::domain::{EngineError, Order, OrderType};

/// Orchestrates D -> B.create -> E -> B.apply_reply for both `/webhook`
/// and `/orders`.
pub struct SubmitSignalUseCase {
    store: Arc<dyn OrderStorePort>,
    broker: Arc<dyn BrokerPort>,
}

impl SubmitSignalUseCase {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStorePort>, broker: Arc<dyn BrokerPort>) -> Self {
        Self { store, broker }
    }

    /// `signal` must already have `webhook_secret` stripped by the
    /// caller (the HTTP surface authenticates before this runs).
    pub async fn execute(
        &self,
        signal: Json,
        config: &dyn ConfigLookup,
    ) -> Result<Order, EngineError> {
        let params = process_signal(&signal, config)?;
        let internal_id = self.store.create(signal, params.clone()).await?;

        let call_result = match params.order_type {
            OrderType::Market => {
                self.broker
                    .place_market_order(
                        &params.instrument,
                        params.units,
                        params.stop_loss,
                        params.take_profit,
                    )
                    .await
            }
            OrderType::Limit => {
                self.broker
                    .place_limit_order(
                        &params.instrument,
                        params.units,
                        params.price.expect("validated by signal processor"),
                        params.stop_loss,
                        params.take_profit,
                    )
                    .await
            }
            OrderType::Stop => {
                self.broker
                    .place_stop_order(
                        &params.instrument,
                        params.units,
                        params.price.expect("validated by signal processor"),
                        params.stop_loss,
                        params.take_profit,
                    )
                    .await
            }
        };

        let (reply_json, error_message) = match &call_result {
            Ok(reply) => (Some(reply.clone()), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let broker_error = call_result.as_ref().err();
        let outcome = self.broker.classify(reply_json.as_ref(), broker_error);

        self.store
            .apply_reply(internal_id, &outcome, reply_json, error_message.as_deref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{BrokerError, BrokerReply};
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::domain::{OrderStatus, TradeParams};

    struct StubBroker {
        reply: Result<Json, BrokerError>,
    }

    #[async_trait]
    impl BrokerPort for StubBroker {
        async fn get_account_summary(&self) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }

        async fn place_market_order(
            &self,
            _instrument: &str,
            _units: Decimal,
            _stop_loss: Option<Decimal>,
            _take_profit: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            self.reply.clone()
        }

        async fn place_limit_order(
            &self,
            _instrument: &str,
            _units: Decimal,
            _price: Decimal,
            _stop_loss: Option<Decimal>,
            _take_profit: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            self.reply.clone()
        }

        async fn place_stop_order(
            &self,
            _instrument: &str,
            _units: Decimal,
            _price: Decimal,
            _stop_loss: Option<Decimal>,
            _take_profit: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            self.reply.clone()
        }

        async fn cancel_order(&self, _broker_order_id: &str) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }

        fn classify(&self, reply: Option<&Json>, error: Option<&BrokerError>) -> BrokerReply {
            if let Some(err) = error {
                return BrokerReply::RejectReply {
                    reason: err.to_string(),
                };
            }
            if reply.and_then(|r| r.get("filled")).is_some() {
                return BrokerReply::Fill {
                    broker_order_id: "o1".to_string(),
                    broker_trade_id: None,
                    fill_price: Decimal::new(11, 1),
                    fill_quantity: Decimal::new(100, 0),
                };
            }
            BrokerReply::Accepted {
                broker_order_id: "o1".to_string(),
            }
        }
    }

    struct InMemoryStore {
        orders: Mutex<HashMap<String, Order>>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self {
                orders: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl OrderStorePort for InMemoryStore {
        async fn create(
            &self,
            signal: Json,
            params: TradeParams,
        ) -> Result<crate::domain::InternalId, EngineError> {
            let order = Order::new(signal, params);
            let id = order.internal_id;
            self.orders.lock().unwrap().insert(id.to_string(), order);
            Ok(id)
        }

        async fn apply_reply(
            &self,
            internal_id: crate::domain::InternalId,
            reply: &BrokerReply,
            raw_reply: Option<Json>,
            broker_error: Option<&str>,
        ) -> Result<Order, EngineError> {
            let mut orders = self.orders.lock().unwrap();
            let order = orders
                .get_mut(&internal_id.to_string())
                .ok_or_else(|| EngineError::NotFound(internal_id.to_string()))?;
            order.broker_reply = raw_reply;
            order.error_message = broker_error.map(ToString::to_string);
            match reply {
                BrokerReply::Fill {
                    broker_order_id,
                    fill_price,
                    fill_quantity,
                    ..
                } => {
                    order.assign_broker_order_id(broker_order_id.clone())?;
                    order.fill_price = Some(*fill_price);
                    order.fill_quantity = Some(*fill_quantity);
                    order.transition(OrderStatus::Filled)?;
                }
                BrokerReply::Accepted { broker_order_id } => {
                    order.assign_broker_order_id(broker_order_id.clone())?;
                    order.transition(OrderStatus::OrderAccepted)?;
                }
                BrokerReply::RejectReply { .. } => {
                    order.transition(OrderStatus::RejectedByBroker)?;
                }
                BrokerReply::CancelReply { .. } => {
                    order.transition(OrderStatus::Cancelled)?;
                }
                BrokerReply::Unrecognized => {
                    order.transition(OrderStatus::SubmittedToBroker)?;
                }
            }
            Ok(order.clone())
        }

        async fn get(&self, internal_id: crate::domain::InternalId) -> Result<Order, EngineError> {
            self.orders
                .lock()
                .unwrap()
                .get(&internal_id.to_string())
                .cloned()
                .ok_or_else(|| EngineError::NotFound(internal_id.to_string()))
        }

        async fn list_all(&self) -> Result<Vec<Order>, EngineError> {
            Ok(self.orders.lock().unwrap().values().cloned().collect())
        }

        async fn position(&self, instrument: &str) -> Result<Decimal, EngineError> {
            Ok(self
                .orders
                .lock()
                .unwrap()
                .values()
                .filter(|o| o.status == OrderStatus::Filled && o.params.instrument == instrument)
                .filter_map(|o| o.fill_quantity)
                .sum())
        }

        async fn positions(&self) -> Result<HashMap<String, Decimal>, EngineError> {
            let mut out: HashMap<String, Decimal> = HashMap::new();
            for order in self.orders.lock().unwrap().values() {
                if order.status == OrderStatus::Filled {
                    if let Some(qty) = order.fill_quantity {
                        *out.entry(order.params.instrument.clone()).or_default() += qty;
                    }
                }
            }
            out.retain(|_, v| !v.is_zero());
            Ok(out)
        }
    }

    struct EmptyConfig;
    impl ConfigLookup for EmptyConfig {
        fn get_string(&self, _key_path: &str, default: &str) -> String {
            default.to_string()
        }
        fn get_decimal(&self, _key_path: &str, default: Decimal) -> Decimal {
            default
        }
        fn get_string_list(&self, _key_path: &str) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn market_buy_reconciles_to_filled() {
        let store: Arc<dyn OrderStorePort> = Arc::new(InMemoryStore::new());
        let broker: Arc<dyn BrokerPort> = Arc::new(StubBroker {
            reply: Ok(json!({"filled": true})),
        });
        let use_case = SubmitSignalUseCase::new(store, broker);
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 100});
        let order = use_case.execute(signal, &EmptyConfig).await.unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.broker_order_id.as_deref(), Some("o1"));
    }

    #[tokio::test]
    async fn broker_refusal_reconciles_to_rejected() {
        let store: Arc<dyn OrderStorePort> = Arc::new(InMemoryStore::new());
        let broker: Arc<dyn BrokerPort> = Arc::new(StubBroker {
            reply: Err(BrokerError::Refusal("INSUFFICIENT_MARGIN".to_string())),
        });
        let use_case = SubmitSignalUseCase::new(store, broker);
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 100});
        let order = use_case.execute(signal, &EmptyConfig).await.unwrap();
        assert_eq!(order.status, OrderStatus::RejectedByBroker);
        assert!(order.error_message.unwrap().contains("INSUFFICIENT_MARGIN"));
    }

    #[tokio::test]
    async fn invalid_signal_never_creates_a_record() {
        let store: Arc<dyn OrderStorePort> = Arc::new(InMemoryStore::new());
        let broker: Arc<dyn BrokerPort> = Arc::new(StubBroker {
            reply: Ok(json!({})),
        });
        let use_case = SubmitSignalUseCase::new(Arc::clone(&store), broker);
        let signal = json!({"action": "buy", "quantity": 100});
        let result = use_case.execute(signal, &EmptyConfig).await;
        assert!(matches!(result, Err(EngineError::ClientError(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
