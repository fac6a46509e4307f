//! Signal validation and normalization (spec §4.4, component D).
//!
//! Pure: never talks to the broker or the store. Grounded on
//! `original_source/src/signal_processor/processor.py`'s validation
//! order and quantity-resolution fallback chain, extended per this
//! spec to support LIMIT/STOP order types with price/SL/TP (the Python
//! original only logged a warning and downgraded anything but MARKET).

use rust_decimal::Decimal;
use serde_json::Value as Json;

use crate::application::ports::ConfigLookup;
use crate::domain::{EngineError, OrderType, TradeParams};

/// Validate and normalize a raw signal into `TradeParams`.
///
/// Validation order: required fields present -> instrument allowed ->
/// action valid -> type valid -> price/SL/TP well-formed -> quantity
/// resolution -> per-instrument min/max bounds. The first failure
/// returns a descriptive error and aborts.
pub fn process_signal(
    signal: &Json,
    config: &dyn ConfigLookup,
) -> Result<TradeParams, EngineError> {
    let instrument = required_str(signal, "instrument")?.to_ascii_uppercase();
    let action = required_str(signal, "action")?.to_ascii_lowercase();

    let allowed = config.get_string_list("trading.allowed_instruments");
    if !allowed.is_empty() && !allowed.iter().any(|a| a == &instrument) {
        return Err(EngineError::ClientError(format!(
            "instrument {instrument} is not in the allowed list"
        )));
    }

    let is_buy = match action.as_str() {
        "buy" => true,
        "sell" => false,
        other => {
            return Err(EngineError::ClientError(format!(
                "action must be \"buy\" or \"sell\", got \"{other}\""
            )));
        }
    };

    let order_type = match signal.get("type").and_then(Json::as_str) {
        Some(t) => t.parse::<OrderType>()?,
        None => config
            .get_string("trading.defaults.order_type", "MARKET")
            .parse::<OrderType>()?,
    };

    let price = optional_positive_decimal(signal, "price")?;
    if order_type.requires_price() && price.is_none() {
        return Err(EngineError::ClientError(format!(
            "price is required for order_type {order_type:?}"
        )));
    }

    let stop_loss = optional_positive_decimal(signal, "stop_loss")?;
    let take_profit = optional_positive_decimal(signal, "take_profit")?;

    let quantity = resolve_quantity(signal, &instrument, config)?;

    let units = if is_buy { quantity } else { -quantity };

    Ok(TradeParams {
        instrument,
        units,
        order_type,
        price,
        stop_loss,
        take_profit,
    })
}

fn required_str<'a>(signal: &'a Json, key: &str) -> Result<&'a str, EngineError> {
    signal
        .get(key)
        .and_then(Json::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::ClientError(format!("missing required field: {key}")))
}

fn optional_positive_decimal(signal: &Json, key: &str) -> Result<Option<Decimal>, EngineError> {
    let Some(value) = signal.get(key) else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let parsed = json_to_decimal(value)
        .ok_or_else(|| EngineError::ClientError(format!("{key} must be a number")))?;
    if parsed <= Decimal::ZERO {
        return Err(EngineError::ClientError(format!("{key} must be > 0")));
    }
    Ok(Some(parsed))
}

fn json_to_decimal(value: &Json) -> Option<Decimal> {
    match value {
        Json::Number(n) => n.to_string().parse().ok(),
        Json::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn resolve_quantity(
    signal: &Json,
    instrument: &str,
    config: &dyn ConfigLookup,
) -> Result<Decimal, EngineError> {
    let quantity = match signal.get("quantity") {
        Some(value) if !value.is_null() => {
            json_to_decimal(value)
                .ok_or_else(|| EngineError::ClientError("quantity must be a number".to_string()))?
        }
        _ => {
            let per_instrument_key = format!("trading.instrument_settings.{instrument}.default_quantity");
            let per_instrument_default = config.get_decimal(&per_instrument_key, Decimal::ZERO);
            if per_instrument_default > Decimal::ZERO {
                per_instrument_default
            } else {
                config.get_decimal("trading.defaults.quantity", Decimal::ONE)
            }
        }
    };

    if quantity <= Decimal::ZERO {
        return Err(EngineError::ClientError(
            "quantity must be a positive number".to_string(),
        ));
    }

    let min_key = format!("trading.instrument_settings.{instrument}.min_quantity");
    let max_key = format!("trading.instrument_settings.{instrument}.max_quantity");
    let min = config.get_decimal(&min_key, Decimal::ZERO);
    let max = config.get_decimal(&max_key, Decimal::ZERO);

    if min > Decimal::ZERO && quantity < min {
        return Err(EngineError::ClientError(format!(
            "quantity {quantity} is below the configured minimum {min} for {instrument}"
        )));
    }
    if max > Decimal::ZERO && quantity > max {
        return Err(EngineError::ClientError(format!(
            "quantity {quantity} exceeds the configured maximum {max} for {instrument}"
        )));
    }

    Ok(quantity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct TestConfig {
        strings: HashMap<&'static str, &'static str>,
        decimals: HashMap<&'static str, Decimal>,
        lists: HashMap<&'static str, Vec<String>>,
    }

    impl TestConfig {
        fn empty() -> Self {
            Self {
                strings: HashMap::new(),
                decimals: HashMap::new(),
                lists: HashMap::new(),
            }
        }
    }

    impl ConfigLookup for TestConfig {
        fn get_string(&self, key_path: &str, default: &str) -> String {
            self.strings
                .get(key_path)
                .map(ToString::to_string)
                .unwrap_or_else(|| default.to_string())
        }

        fn get_decimal(&self, key_path: &str, default: Decimal) -> Decimal {
            self.decimals.get(key_path).copied().unwrap_or(default)
        }

        fn get_string_list(&self, key_path: &str) -> Vec<String> {
            self.lists.get(key_path).cloned().unwrap_or_default()
        }
    }

    #[test]
    fn market_buy_resolves_defaults() {
        let config = TestConfig::empty();
        let signal = json!({"instrument": "eur_usd", "action": "buy", "quantity": 100});
        let params = process_signal(&signal, &config).unwrap();
        assert_eq!(params.instrument, "EUR_USD");
        assert_eq!(params.units, Decimal::new(100, 0));
        assert_eq!(params.order_type, OrderType::Market);
        assert!(params.price.is_none());
    }

    #[test]
    fn sell_produces_negative_units() {
        let config = TestConfig::empty();
        let signal = json!({"instrument": "EUR_USD", "action": "sell", "quantity": 50});
        let params = process_signal(&signal, &config).unwrap();
        assert_eq!(params.units, Decimal::new(-50, 0));
    }

    #[test]
    fn limit_without_price_is_client_error() {
        let config = TestConfig::empty();
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 50, "type": "limit"});
        let result = process_signal(&signal, &config);
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }

    #[test]
    fn limit_with_sl_tp_passes_through() {
        let config = TestConfig::empty();
        let signal = json!({
            "instrument": "EUR_USD", "action": "sell", "quantity": 50,
            "type": "limit", "price": 1.1000, "stop_loss": 1.1050, "take_profit": 1.0900
        });
        let params = process_signal(&signal, &config).unwrap();
        assert_eq!(params.order_type, OrderType::Limit);
        assert_eq!(params.price, Some(Decimal::new(11000, 4)));
        assert_eq!(params.stop_loss, Some(Decimal::new(11050, 4)));
        assert_eq!(params.take_profit, Some(Decimal::new(10900, 4)));
    }

    #[test]
    fn instrument_outside_allow_list_is_rejected() {
        let mut config = TestConfig::empty();
        config
            .lists
            .insert("trading.allowed_instruments", vec!["EUR_USD".to_string()]);
        let signal = json!({"instrument": "GBP_USD", "action": "buy", "quantity": 10});
        let result = process_signal(&signal, &config);
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }

    #[test]
    fn missing_instrument_is_rejected_before_anything_else() {
        let config = TestConfig::empty();
        let signal = json!({"action": "buy", "quantity": 10});
        let result = process_signal(&signal, &config);
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let config = TestConfig::empty();
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 0});
        let result = process_signal(&signal, &config);
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }

    #[test]
    fn quantity_falls_back_to_per_instrument_then_global_default() {
        let mut config = TestConfig::empty();
        config
            .decimals
            .insert("trading.defaults.quantity", Decimal::new(7, 0));
        let signal = json!({"instrument": "EUR_USD", "action": "buy"});
        let params = process_signal(&signal, &config).unwrap();
        assert_eq!(params.units, Decimal::new(7, 0));
    }

    #[test]
    fn quantity_outside_configured_bounds_is_rejected() {
        let mut config = TestConfig::empty();
        config.decimals.insert(
            "trading.instrument_settings.EUR_USD.max_quantity",
            Decimal::new(10, 0),
        );
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 100});
        let result = process_signal(&signal, &config);
        assert!(matches!(result, Err(EngineError::ClientError(_))));
    }

    #[test]
    fn is_deterministic_for_identical_input() {
        let config = TestConfig::empty();
        let signal = json!({"instrument": "EUR_USD", "action": "buy", "quantity": 100, "type": "market"});
        let first = process_signal(&signal, &config).unwrap();
        let second = process_signal(&signal, &config).unwrap();
        assert_eq!(first, second);
    }
}
