//! Account balance lookup and normalization.
//!
//! Exchange clients report balances in several shapes (a bare number, an
//! `asset -> amount` map, an `asset -> {free, ...}` map, or a list of per-asset records).
//! [`extract_balance`] is the single place those shapes are turned into a decimal amount.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::BalanceError;

/// Fields holding the spendable amount, in order of preference.
const AMOUNT_FIELDS: [&str; 6] = [
    "availableBalance",
    "available",
    "free",
    "maxWithdrawAmount",
    "walletBalance",
    "balance",
];

/// Fields naming the asset inside a per-asset record.
const ASSET_FIELDS: [&str; 3] = ["asset", "currency", "coin"];

/// Available capacity provider: spot wallet or derivative margin balance.
pub trait BalanceSource: Send + Sync {
    fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError>;
}

/// Fixed balances, e.g. for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticBalances {
    balances: HashMap<String, Decimal>,
}

impl StaticBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, asset: impl Into<String>, amount: Decimal) -> Self {
        self.balances.insert(asset.into(), amount);
        self
    }
}

impl BalanceSource for StaticBalances {
    fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError> {
        self.balances
            .get(asset)
            .copied()
            .ok_or_else(|| BalanceError::AssetNotFound(asset.to_string()))
    }
}

/// Balance payload as returned by an exchange client.
#[derive(Debug, Clone)]
pub struct BalancePayload {
    payload: Value,
}

impl BalancePayload {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }
}

impl BalanceSource for BalancePayload {
    fn get_balance(&self, asset: &str) -> Result<Decimal, BalanceError> {
        extract_balance(&self.payload, asset)
    }
}

/// Extract the available amount of `asset` from any supported payload shape.
pub fn extract_balance(payload: &Value, asset: &str) -> Result<Decimal, BalanceError> {
    match payload {
        Value::Number(_) | Value::String(_) => parse_amount(asset, payload),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_object)
            .find(|record| record_names_asset(record, asset))
            .ok_or_else(|| BalanceError::AssetNotFound(asset.to_string()))
            .and_then(|record| amount_from_record(asset, record)),
        Value::Object(map) => {
            let entry = map.get(asset).or_else(|| {
                map.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(asset))
                    .map(|(_, value)| value)
            });

            match entry {
                Some(value @ (Value::Number(_) | Value::String(_))) => parse_amount(asset, value),
                Some(Value::Object(record)) => amount_from_record(asset, record),
                Some(other) => Err(unsupported(asset, other)),
                // A single record: {"asset": "USDT", "free": "12.5"}
                None if record_names_asset(map, asset) => amount_from_record(asset, map),
                None => Err(BalanceError::AssetNotFound(asset.to_string())),
            }
        }
        Value::Null | Value::Bool(_) => Err(unsupported(asset, payload)),
    }
}

fn record_names_asset(record: &Map<String, Value>, asset: &str) -> bool {
    ASSET_FIELDS.iter().any(|field| {
        record
            .get(*field)
            .and_then(Value::as_str)
            .is_some_and(|name| name.eq_ignore_ascii_case(asset))
    })
}

fn amount_from_record(asset: &str, record: &Map<String, Value>) -> Result<Decimal, BalanceError> {
    AMOUNT_FIELDS
        .iter()
        .find_map(|field| record.get(*field))
        .ok_or_else(|| BalanceError::UnsupportedShape {
            asset: asset.to_string(),
            shape: "record without an amount field".to_string(),
        })
        .and_then(|value| parse_amount(asset, value))
}

fn parse_amount(asset: &str, value: &Value) -> Result<Decimal, BalanceError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        other => return Err(unsupported(asset, other)),
    };

    let amount = Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|_| BalanceError::InvalidAmount {
            asset: asset.to_string(),
            raw: raw.clone(),
        })?;

    if amount.is_sign_negative() {
        return Err(BalanceError::InvalidAmount {
            asset: asset.to_string(),
            raw,
        });
    }

    Ok(amount)
}

fn unsupported(asset: &str, value: &Value) -> BalanceError {
    let shape = match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    BalanceError::UnsupportedShape {
        asset: asset.to_string(),
        shape: shape.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_plain_amounts() {
        assert_eq!(extract_balance(&json!(1250.5), "USDT").unwrap(), dec!(1250.5));
        assert_eq!(extract_balance(&json!(" 42.10 "), "USDT").unwrap(), dec!(42.10));
    }

    #[test]
    fn test_asset_map() {
        let payload = json!({"USDT": "5000", "BTC": 0.25});
        assert_eq!(extract_balance(&payload, "USDT").unwrap(), dec!(5000));
        assert_eq!(extract_balance(&payload, "btc").unwrap(), dec!(0.25));
        assert_eq!(
            extract_balance(&payload, "ETH"),
            Err(BalanceError::AssetNotFound("ETH".to_string()))
        );
    }

    #[test]
    fn test_nested_asset_map_prefers_available() {
        let payload = json!({"USDT": {"walletBalance": "900", "availableBalance": "750.25"}});
        assert_eq!(extract_balance(&payload, "USDT").unwrap(), dec!(750.25));
    }

    #[test]
    fn test_record_list() {
        let payload = json!([
            {"asset": "BNB", "free": "1.2"},
            {"asset": "USDT", "free": "320.75", "locked": "10"}
        ]);
        assert_eq!(extract_balance(&payload, "USDT").unwrap(), dec!(320.75));
    }

    #[test]
    fn test_single_record() {
        let payload = json!({"coin": "USDT", "available": 99});
        assert_eq!(extract_balance(&payload, "USDT").unwrap(), dec!(99));
    }

    #[test]
    fn test_scientific_notation() {
        assert_eq!(extract_balance(&json!("1e-3"), "BTC").unwrap(), dec!(0.001));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(matches!(
            extract_balance(&json!(null), "USDT"),
            Err(BalanceError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            extract_balance(&json!({"USDT": [1, 2]}), "USDT"),
            Err(BalanceError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            extract_balance(&json!([{"asset": "USDT", "locked": "3"}]), "USDT"),
            Err(BalanceError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            extract_balance(&json!("-5"), "USDT"),
            Err(BalanceError::InvalidAmount { .. })
        ));
        assert!(matches!(
            extract_balance(&json!("abc"), "USDT"),
            Err(BalanceError::InvalidAmount { .. })
        ));
    }

    #[test]
    fn test_balance_sources() {
        let balances = StaticBalances::new().with_balance("USDT", dec!(1000));
        assert_eq!(balances.get_balance("USDT").unwrap(), dec!(1000));
        assert!(balances.get_balance("USDC").is_err());

        let payload = BalancePayload::new(json!([{"currency": "USDC", "balance": "12"}]));
        assert_eq!(payload.get_balance("USDC").unwrap(), dec!(12));
    }
}
