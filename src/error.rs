//! Error types surfaced by the decision engine.
//!
//! Only sizing failures are terminal for a signal. Catalog and balance errors come from
//! external collaborators; the leverage path degrades on them instead of failing.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::Regime;

/// Terminal sizing failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SizingError {
    /// The allocation table has neither a regime entry nor a default for the symbol
    #[error("no allocation configured for {symbol} in {regime} regime")]
    NoAllocation { regime: Regime, symbol: String },

    /// Available capacity cannot carry the minimum viable order
    #[error("insufficient balance for {symbol}: required {required}, available {available}")]
    InsufficientBalance {
        symbol: String,
        required: Decimal,
        available: Decimal,
    },

    #[error("invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: Decimal },

    #[error("invalid leverage for {symbol}: {leverage}")]
    InvalidLeverage { symbol: String, leverage: u32 },

    #[error("arithmetic overflow while sizing {symbol}")]
    Overflow { symbol: String },
}

impl SizingError {
    /// Configuration gaps need an operator; balance failures clear up on their own.
    pub fn is_configuration_gap(&self) -> bool {
        matches!(self, SizingError::NoAllocation { .. })
    }
}

/// Leverage catalog lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("leverage catalog unavailable: {0}")]
    Unavailable(String),

    #[error("symbol not listed in leverage catalog: {0}")]
    UnknownSymbol(String),
}

/// Balance lookup and normalization failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("asset {0} not present in balance payload")]
    AssetNotFound(String),

    #[error("unsupported balance payload for {asset}: {shape}")]
    UnsupportedShape { asset: String, shape: String },

    #[error("invalid balance amount for {asset}: {raw}")]
    InvalidAmount { asset: String, raw: String },

    #[error("balance source unavailable: {0}")]
    Unavailable(String),
}

/// Invalid session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid leverage config: {0}")]
    Leverage(String),

    #[error("invalid sizing config: {0}")]
    Sizing(String),

    #[error("invalid exit config: {0}")]
    Exits(String),

    #[error("invalid allocation for {regime}/{symbol}: {quantity}")]
    Allocation {
        regime: String,
        symbol: String,
        quantity: Decimal,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sizing_error_messages() {
        let err = SizingError::NoAllocation {
            regime: Regime::Ranging,
            symbol: "DOGE-USDT".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no allocation configured for DOGE-USDT in ranging regime"
        );
        assert!(err.is_configuration_gap());

        let err = SizingError::InsufficientBalance {
            symbol: "BTC-USDT".to_string(),
            required: dec!(102),
            available: dec!(50),
        };
        assert!(err.to_string().contains("required 102"));
        assert!(!err.is_configuration_gap());
    }
}
