//! Trade signal model: the upstream input to every sizing and leverage decision.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "long",
            Side::Short => "short",
        }
    }

    /// The side that closes a position opened on this side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "long" | "buy" => Ok(Side::Long),
            "short" | "sell" => Ok(Side::Short),
            other => Err(format!("unknown side: {other}")),
        }
    }
}

/// Market-condition classification produced by the upstream regime detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
    Trending,
    Ranging,
    Choppy,
}

impl Regime {
    pub const ALL: [Regime; 3] = [Regime::Trending, Regime::Ranging, Regime::Choppy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Trending => "trending",
            Regime::Ranging => "ranging",
            Regime::Choppy => "choppy",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trending" | "trend" => Ok(Regime::Trending),
            "ranging" | "range" => Ok(Regime::Ranging),
            "choppy" | "chop" => Ok(Regime::Choppy),
            other => Err(format!("unknown regime: {other}")),
        }
    }
}

/// Signal handed over by the signal generator for a single decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    /// Exchange symbol (e.g., "BTC-USDT")
    pub symbol: String,

    /// Direction of the proposed position
    pub side: Side,

    /// Signal quality, nominally 0.0 to 1.0
    pub strength: f64,

    /// Market regime at signal time
    pub regime: Regime,

    /// ATR / price ratio (e.g., 0.02 = 2%)
    #[serde(default)]
    pub volatility: Option<f64>,

    /// ATR in price units, used for exit levels
    #[serde(default)]
    pub atr: Option<Decimal>,
}

impl TradeSignal {
    pub fn new(symbol: impl Into<String>, side: Side, strength: f64, regime: Regime) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            strength,
            regime,
            volatility: None,
            atr: None,
        }
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = Some(volatility);
        self
    }

    pub fn with_atr(mut self, atr: Decimal) -> Self {
        self.atr = Some(atr);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_parsing() {
        assert_eq!("LONG".parse::<Side>().unwrap(), Side::Long);
        assert_eq!("sell".parse::<Side>().unwrap(), Side::Short);
        assert!("flat".parse::<Side>().is_err());
        assert_eq!(Side::Long.opposite(), Side::Short);
    }

    #[test]
    fn test_regime_parsing() {
        assert_eq!("Trending".parse::<Regime>().unwrap(), Regime::Trending);
        assert_eq!("range".parse::<Regime>().unwrap(), Regime::Ranging);
        assert!("sideways".parse::<Regime>().is_err());
    }

    #[test]
    fn test_signal_deserializes_without_optionals() {
        let signal: TradeSignal = serde_json::from_str(
            r#"{"symbol":"ETH-USDT","side":"short","strength":0.6,"regime":"choppy"}"#,
        )
        .unwrap();

        assert_eq!(signal.side, Side::Short);
        assert_eq!(signal.regime, Regime::Choppy);
        assert!(signal.volatility.is_none());
        assert!(signal.atr.is_none());
    }
}
