//! Decision engine configuration.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Regime;

/// One signal-quality bucket and the leverage it maps to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageTier {
    pub name: String,

    /// Inclusive lower bound on adjusted strength
    pub min_strength: f64,

    pub leverage: u32,
}

impl LeverageTier {
    pub fn new(name: &str, min_strength: f64, leverage: u32) -> Self {
        Self {
            name: name.to_string(),
            min_strength,
            leverage,
        }
    }
}

/// Configuration for adaptive leverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    /// Lowest leverage the engine will ever return
    pub min_leverage: u32,

    /// Highest leverage the engine will ever return
    pub max_leverage: u32,

    /// Strength multiplier per regime
    pub trending_multiplier: f64,
    pub ranging_multiplier: f64,
    pub choppy_multiplier: f64,

    /// Volatility above this de-risks the signal
    pub high_volatility_threshold: f64,
    pub high_volatility_multiplier: f64,

    /// Volatility below this boosts confidence
    pub low_volatility_threshold: f64,
    pub low_volatility_multiplier: f64,

    /// Hard cap applied in ranging markets after tier selection
    pub ranging_cap: u32,

    /// Quality tiers, ascending by `min_strength`
    pub tiers: Vec<LeverageTier>,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            min_leverage: 3,
            max_leverage: 30,
            trending_multiplier: 1.2,
            ranging_multiplier: 0.8,
            choppy_multiplier: 0.8,
            high_volatility_threshold: 0.05, // 5% ATR/price
            high_volatility_multiplier: 0.7,
            low_volatility_threshold: 0.01, // 1% ATR/price
            low_volatility_multiplier: 1.3,
            ranging_cap: 10,
            tiers: vec![
                LeverageTier::new("very_weak", 0.0, 3),
                LeverageTier::new("weak", 0.3, 5),
                LeverageTier::new("moderate", 0.5, 10),
                LeverageTier::new("strong", 0.7, 20),
                LeverageTier::new("very_strong", 0.9, 30),
            ],
        }
    }
}

impl LeverageConfig {
    pub fn regime_multiplier(&self, regime: Regime) -> f64 {
        match regime {
            Regime::Trending => self.trending_multiplier,
            Regime::Ranging => self.ranging_multiplier,
            Regime::Choppy => self.choppy_multiplier,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_leverage == 0 || self.min_leverage > self.max_leverage {
            return Err(ConfigError::Leverage(format!(
                "bounds must satisfy 0 < min <= max, got {}..={}",
                self.min_leverage, self.max_leverage
            )));
        }

        let multipliers = [
            self.trending_multiplier,
            self.ranging_multiplier,
            self.choppy_multiplier,
            self.high_volatility_multiplier,
            self.low_volatility_multiplier,
        ];
        if multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return Err(ConfigError::Leverage(
                "multipliers must be finite and positive".to_string(),
            ));
        }

        if self.low_volatility_threshold > self.high_volatility_threshold {
            return Err(ConfigError::Leverage(
                "low volatility threshold exceeds high threshold".to_string(),
            ));
        }

        let Some(first) = self.tiers.first() else {
            return Err(ConfigError::Leverage("at least one tier is required".to_string()));
        };
        if first.min_strength > 0.0 {
            return Err(ConfigError::Leverage(
                "first tier must start at strength 0".to_string(),
            ));
        }
        // Ascending thresholds and non-decreasing leverage keep the mapping monotonic
        for pair in self.tiers.windows(2) {
            if pair[1].min_strength <= pair[0].min_strength || pair[1].leverage < pair[0].leverage
            {
                return Err(ConfigError::Leverage(format!(
                    "tier {} must follow {} with a higher threshold and no lower leverage",
                    pair[1].name, pair[0].name
                )));
            }
        }

        Ok(())
    }
}

/// What the available balance pays for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMode {
    /// Derivative margin: the balance must cover notional / leverage
    Margin,
    /// Spot wallet: the balance must cover the full notional
    Spot,
}

/// Configuration for allocation-based position sizing and exit levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub mode: SizingMode,

    /// Asset the balance is denominated in
    pub quote_asset: String,

    /// Smallest order notional the exchange accepts
    pub min_order_value: Decimal,

    /// Extra headroom when scaling up to the minimum (0.02 = +2%)
    pub min_order_safety_margin: Decimal,

    /// Lot-size decimal places per symbol
    pub lot_precision: HashMap<String, u32>,

    /// Lot-size decimal places for symbols not listed above
    pub default_lot_precision: u32,

    /// Fixed take-profit distance when no ATR is available (0.004 = 0.4%)
    pub take_profit_pct: Decimal,

    /// Fixed stop-loss distance when no ATR is available (0.003 = 0.3%)
    pub stop_loss_pct: Decimal,

    /// Take-profit distance in ATRs
    pub atr_take_profit_multiplier: Decimal,

    /// Stop-loss distance in ATRs
    pub atr_stop_loss_multiplier: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: SizingMode::Margin,
            quote_asset: "USDT".to_string(),
            min_order_value: dec!(100),        // USDT-M minimum notional for majors
            min_order_safety_margin: dec!(0.02), // +2%
            lot_precision: HashMap::new(),
            default_lot_precision: 3,
            take_profit_pct: dec!(0.004),
            stop_loss_pct: dec!(0.003),
            atr_take_profit_multiplier: dec!(2.0),
            atr_stop_loss_multiplier: dec!(1.5),
        }
    }
}

impl SizingConfig {
    pub fn lot_precision(&self, symbol: &str) -> u32 {
        self.lot_precision
            .get(symbol)
            .copied()
            .unwrap_or(self.default_lot_precision)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_order_value.is_sign_negative() || self.min_order_safety_margin.is_sign_negative()
        {
            return Err(ConfigError::Sizing(
                "minimum order value and safety margin must not be negative".to_string(),
            ));
        }
        let distances = [
            self.take_profit_pct,
            self.stop_loss_pct,
            self.atr_take_profit_multiplier,
            self.atr_stop_loss_multiplier,
        ];
        if distances.iter().any(|d| *d <= Decimal::ZERO) {
            return Err(ConfigError::Sizing(
                "exit distances and ATR multipliers must be positive".to_string(),
            ));
        }
        // Decimal supports at most 28 fractional digits
        if let Some((symbol, p)) = self.lot_precision.iter().find(|(_, p)| **p > 28) {
            return Err(ConfigError::Sizing(format!(
                "lot precision {p} for {symbol} exceeds 28"
            )));
        }
        if self.default_lot_precision > 28 {
            return Err(ConfigError::Sizing("default lot precision exceeds 28".to_string()));
        }
        Ok(())
    }
}

/// Rules the exit monitors apply to open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitRulesConfig {
    /// Loss on margin that triggers an emergency close (0.10 = 10%)
    pub emergency_loss_pct: Decimal,

    /// Favourable move needed before the trailing stop arms
    pub trailing_activation_pct: Decimal,

    /// Retracement from the best price that fires the trailing stop
    pub trailing_distance_pct: Decimal,

    /// Maximum holding period in minutes
    pub max_holding_minutes: i64,
}

impl Default for ExitRulesConfig {
    fn default() -> Self {
        Self {
            emergency_loss_pct: dec!(0.10),
            trailing_activation_pct: dec!(0.005),
            trailing_distance_pct: dec!(0.003),
            max_holding_minutes: 240, // 4 hours
        }
    }
}

impl ExitRulesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.emergency_loss_pct <= Decimal::ZERO
            || self.trailing_activation_pct <= Decimal::ZERO
            || self.trailing_distance_pct <= Decimal::ZERO
        {
            return Err(ConfigError::Exits(
                "exit thresholds must be positive".to_string(),
            ));
        }
        if self.max_holding_minutes <= 0 {
            return Err(ConfigError::Exits(
                "max holding time must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
