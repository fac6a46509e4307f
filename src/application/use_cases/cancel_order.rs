//! Cancel a pending/accepted order (spec §4.6 "Cancel handler
//! contract").

use std::sync::Arc;

use crate::application::ports::{BrokerPort, OrderStorePort};
use crate::domain::{EngineError, InternalId, Order, OrderStatus};

pub struct CancelOrderUseCase {
    store: Arc<dyn OrderStorePort>,
    broker: Arc<dyn BrokerPort>,
}

impl CancelOrderUseCase {
    #[must_use]
    pub fn new(store: Arc<dyn OrderStorePort>, broker: Arc<dyn BrokerPort>) -> Self {
        Self { store, broker }
    }

    pub async fn execute(&self, internal_id: InternalId) -> Result<Order, EngineError> {
        let order = self.store.get(internal_id).await?;

        let Some(broker_order_id) = &order.broker_order_id else {
            return Err(EngineError::ClientError(
                "order has no broker_order_id; nothing to cancel".to_string(),
            ));
        };
        if order.status != OrderStatus::OrderAccepted {
            return Err(EngineError::ClientError(format!(
                "order is not cancellable in status {:?}",
                order.status
            )));
        }

        let call_result = self.broker.cancel_order(broker_order_id).await;
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
    use serde_json::{Value as Json, json};
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::domain::TradeParams;

    struct StubBroker;

    #[async_trait]
    impl BrokerPort for StubBroker {
        async fn get_account_summary(&self) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }
        async fn place_market_order(
            &self,
            _i: &str,
            _u: Decimal,
            _sl: Option<Decimal>,
            _tp: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }
        async fn place_limit_order(
            &self,
            _i: &str,
            _u: Decimal,
            _p: Decimal,
            _sl: Option<Decimal>,
            _tp: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }
        async fn place_stop_order(
            &self,
            _i: &str,
            _u: Decimal,
            _p: Decimal,
            _sl: Option<Decimal>,
            _tp: Option<Decimal>,
        ) -> Result<Json, BrokerError> {
            Ok(json!({}))
        }
        async fn cancel_order(&self, _broker_order_id: &str) -> Result<Json, BrokerError> {
            Ok(json!({"cancelled": true, "reason": "CLIENT_REQUESTED_CANCELLATION"}))
        }
        fn classify(&self, reply: Option<&Json>, _error: Option<&BrokerError>) -> BrokerReply {
            let reason = reply
                .and_then(|r| r.get("reason"))
                .and_then(Json::as_str)
                .unwrap_or("cancelled")
                .to_string();
            BrokerReply::CancelReply {
                broker_order_id: Some("o2".to_string()),
                reason,
            }
        }
    }

    struct InMemoryStore {
        orders: Mutex<HashMap<String, Order>>,
    }

    #[async_trait]
    impl OrderStorePort for InMemoryStore {
        async fn create(
            &self,
            signal: Json,
            params: TradeParams,
        ) -> Result<InternalId, EngineError> {
            let order = Order::new(signal, params);
            let id = order.internal_id;
            self.orders.lock().unwrap().insert(id.to_string(), order);
            Ok(id)
        }
        async fn apply_reply(
            &self,
            internal_id: InternalId,
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
            if let BrokerReply::CancelReply { .. } = reply {
                order.transition(OrderStatus::Cancelled)?;
            }
            Ok(order.clone())
        }
        async fn get(&self, internal_id: InternalId) -> Result<Order, EngineError> {
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
        async fn position(&self, _instrument: &str) -> Result<Decimal, EngineError> {
            Ok(Decimal::ZERO)
        }
        async fn positions(&self) -> Result<HashMap<String, Decimal>, EngineError> {
            Ok(HashMap::new())
        }
    }

    fn accepted_order() -> Order {
        let mut order = Order::new(
            json!({}),
            TradeParams {
                instrument: "EUR_USD".to_string(),
                units: Decimal::new(-50, 0),
                order_type: crate::domain::OrderType::Limit,
                price: Some(Decimal::new(11, 1)),
                stop_loss: None,
                take_profit: None,
            },
        );
        order.assign_broker_order_id("o2".to_string()).unwrap();
        order.transition(OrderStatus::OrderAccepted).unwrap();
        order
    }

    #[tokio::test]
    async fn cancel_accepted_order_reconciles_to_cancelled() {
        let store = InMemoryStore {
            orders: Mutex::new(HashMap::new()),
        };
        let order = accepted_order();
        let id = order.internal_id;
        store.orders.lock().unwrap().insert(id.to_string(), order);
        let store: Arc<dyn OrderStorePort> = Arc::new(store);
        let broker: Arc<dyn BrokerPort> = Arc::new(StubBroker);
        let use_case = CancelOrderUseCase::new(store, broker);

        let result = use_case.execute(id).await.unwrap();
        assert_eq!(result.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_without_broker_order_id_is_client_error() {
        let store = InMemoryStore {
            orders: Mutex::new(HashMap::new()),
        };
        let order = Order::new(
            json!({}),
            TradeParams {
                instrument: "EUR_USD".to_string(),
                units: Decimal::new(50, 0),
                order_type: crate::domain::OrderType::Market,
                price: None,
                stop_loss: None,
                take_profit: None,
            },
        );
        let id = order.internal_id;
        store.orders.lock().unwrap().insert(id.to_string(), order);
        let store: Arc<dyn OrderStorePort> = Arc::new(store);
        let broker: Arc<dyn BrokerPort> = Arc::new(StubBroker);
        let use_case = CancelOrderUseCase::new(store, broker);

        let result = use_case.execute(id).await;
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }
}
