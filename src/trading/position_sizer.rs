//! Allocation-based position sizing and exit price levels.
//!
//! Sizing flow:
//! 1. quantity from the allocation table (regime entry, else `default` section)
//! 2. scale up to the exchange minimum notional (+ safety margin) if the balance allows
//! 3. round to the symbol's lot precision
//! 4. confirm the balance carries the final order (margin or full notional)

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SizingError;
use crate::models::{Regime, Side};

use super::{AllocationSource, AllocationTable, SizingConfig, SizingMode};

/// Inputs for one sizing call.
#[derive(Debug, Clone, PartialEq)]
pub struct SizingRequest {
    pub symbol: String,
    pub price: Decimal,
    pub regime: Regime,

    /// Available capacity in the quote asset
    pub balance: Decimal,

    /// Leverage the order will be placed with
    pub leverage: u32,

    pub side: Side,

    /// ATR in price units for exit levels
    pub atr: Option<Decimal>,
}

impl SizingRequest {
    pub fn new(symbol: impl Into<String>, price: Decimal, regime: Regime, balance: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            regime,
            balance,
            leverage: 1,
            side: Side::Long,
            atr: None,
        }
    }

    pub fn with_leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn with_atr(mut self, atr: Option<Decimal>) -> Self {
        self.atr = atr;
        self
    }
}

/// Why the fixed-percentage branch produced the exit levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixedLevelReason {
    /// No ATR supplied
    NoAtr,
    NonPositiveAtr,
    /// ATR distance overflowed decimal range
    Overflow,
    /// ATR distance pushed a level to zero or below
    NonPositiveLevel,
}

/// How exit levels were computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum LevelMethod {
    Atr { atr: Decimal },
    Fixed { reason: FixedLevelReason },
}

/// Take-profit and stop-loss prices for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub method: LevelMethod,
}

impl ExitLevels {
    /// True when an ATR was supplied but could not be used.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self.method,
            LevelMethod::Fixed { reason } if reason != FixedLevelReason::NoAtr
        )
    }
}

/// Result of a successful sizing call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingDecision {
    pub symbol: String,
    pub regime: Regime,

    /// Order size in base units, rounded to lot precision
    pub quantity: Decimal,

    /// quantity * price
    pub notional: Decimal,

    pub leverage: u32,

    /// notional / leverage
    pub margin_required: Decimal,

    pub take_profit: Decimal,
    pub stop_loss: Decimal,
    pub level_method: LevelMethod,

    pub allocation_source: AllocationSource,

    /// Quantity was raised to meet the minimum order value
    pub scaled_to_minimum: bool,
}

/// Risk-based position sizer.
#[derive(Debug, Clone)]
pub struct RiskPositionSizer {
    config: SizingConfig,
}

impl RiskPositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Size an order for `request` from the allocation table.
    pub fn size(
        &self,
        request: &SizingRequest,
        allocations: &AllocationTable,
    ) -> Result<SizingDecision, SizingError> {
        let symbol = request.symbol.as_str();

        if request.price <= Decimal::ZERO {
            return Err(SizingError::InvalidPrice {
                symbol: symbol.to_string(),
                price: request.price,
            });
        }
        if request.leverage == 0 {
            return Err(SizingError::InvalidLeverage {
                symbol: symbol.to_string(),
                leverage: request.leverage,
            });
        }

        let allocation = allocations.resolve(request.regime, symbol).ok_or_else(|| {
            warn!(symbol = %symbol, regime = %request.regime, "No allocation configured");
            SizingError::NoAllocation {
                regime: request.regime,
                symbol: symbol.to_string(),
            }
        })?;
        if allocation.source == AllocationSource::Fallback {
            info!(symbol = %symbol, regime = %request.regime, "Using default allocation");
        }

        let precision = self.config.lot_precision(symbol).min(28);
        let overflow = || SizingError::Overflow {
            symbol: symbol.to_string(),
        };

        // Round to the lot first; the minimum check applies to what would be sent
        let mut lot_quantity = allocation
            .quantity
            .round_dp_with_strategy(precision, RoundingStrategy::ToZero);

        // Allocation smaller than one lot: trade a single lot if the balance allows
        if lot_quantity.is_zero() {
            lot_quantity = Decimal::new(1, precision);
        }

        let lot_notional = lot_quantity
            .checked_mul(request.price)
            .ok_or_else(overflow)?;

        let mut scaled_to_minimum = false;
        let quantity = if lot_notional < self.config.min_order_value {
            let headroom = Decimal::ONE
                .checked_add(self.config.min_order_safety_margin)
                .ok_or_else(overflow)?;
            let target = self
                .config
                .min_order_value
                .checked_mul(headroom)
                .ok_or_else(overflow)?;
            let required = self.required_capacity(target, request.leverage);
            if required > request.balance {
                warn!(
                    symbol = %symbol,
                    notional = %lot_notional,
                    minimum = %self.config.min_order_value,
                    required = %required,
                    balance = %request.balance,
                    "Balance cannot carry minimum order"
                );
                return Err(SizingError::InsufficientBalance {
                    symbol: symbol.to_string(),
                    required,
                    available: request.balance,
                });
            }

            scaled_to_minimum = true;
            let scaled = target.checked_div(request.price).ok_or_else(overflow)?;
            info!(
                symbol = %symbol,
                from = %lot_quantity,
                to = %scaled,
                "Scaling quantity up to minimum order value"
            );
            // Round up so the rounded order still clears the minimum
            scaled.round_dp_with_strategy(precision, RoundingStrategy::AwayFromZero)
        } else {
            lot_quantity
        };

        let notional = quantity.checked_mul(request.price).ok_or_else(overflow)?;
        let margin_required = notional / Decimal::from(request.leverage);
        let required = match self.config.mode {
            SizingMode::Margin => margin_required,
            SizingMode::Spot => notional,
        };
        if required > request.balance {
            warn!(
                symbol = %symbol,
                quantity = %quantity,
                required = %required,
                balance = %request.balance,
                "Insufficient balance for order"
            );
            return Err(SizingError::InsufficientBalance {
                symbol: symbol.to_string(),
                required,
                available: request.balance,
            });
        }

        let levels = self.levels(request.price, request.side, request.atr);

        debug!(
            symbol = %symbol,
            quantity = %quantity,
            notional = %notional,
            margin = %margin_required,
            leverage = request.leverage,
            "Sized position"
        );

        Ok(SizingDecision {
            symbol: symbol.to_string(),
            regime: request.regime,
            quantity,
            notional,
            leverage: request.leverage,
            margin_required,
            take_profit: levels.take_profit,
            stop_loss: levels.stop_loss,
            level_method: levels.method,
            allocation_source: allocation.source,
            scaled_to_minimum,
        })
    }

    /// Take-profit / stop-loss prices for an entry. Never fails: when the ATR is
    /// missing or unusable the fixed percentage distances are used instead.
    pub fn levels(&self, entry: Decimal, side: Side, atr: Option<Decimal>) -> ExitLevels {
        let reason = match atr {
            None => FixedLevelReason::NoAtr,
            Some(a) if a <= Decimal::ZERO => FixedLevelReason::NonPositiveAtr,
            Some(a) => match self.atr_levels(entry, side, a) {
                Ok(levels) => return levels,
                Err(reason) => reason,
            },
        };

        if reason != FixedLevelReason::NoAtr {
            warn!(entry = %entry, atr = ?atr, reason = ?reason, "Falling back to fixed exit levels");
        }
        self.fixed_levels(entry, side, reason)
    }

    fn atr_levels(&self, entry: Decimal, side: Side, atr: Decimal) -> Result<ExitLevels, FixedLevelReason> {
        let tp_distance = atr
            .checked_mul(self.config.atr_take_profit_multiplier)
            .ok_or(FixedLevelReason::Overflow)?;
        let sl_distance = atr
            .checked_mul(self.config.atr_stop_loss_multiplier)
            .ok_or(FixedLevelReason::Overflow)?;

        let (take_profit, stop_loss) = match side {
            Side::Long => (entry.checked_add(tp_distance), entry.checked_sub(sl_distance)),
            Side::Short => (entry.checked_sub(tp_distance), entry.checked_add(sl_distance)),
        };
        let (take_profit, stop_loss) = take_profit
            .zip(stop_loss)
            .ok_or(FixedLevelReason::Overflow)?;

        if take_profit <= Decimal::ZERO || stop_loss <= Decimal::ZERO {
            return Err(FixedLevelReason::NonPositiveLevel);
        }

        Ok(ExitLevels {
            take_profit,
            stop_loss,
            method: LevelMethod::Atr { atr },
        })
    }

    fn fixed_levels(&self, entry: Decimal, side: Side, reason: FixedLevelReason) -> ExitLevels {
        let tp_distance = entry.saturating_mul(self.config.take_profit_pct);
        let sl_distance = entry.saturating_mul(self.config.stop_loss_pct);

        let (take_profit, stop_loss) = match side {
            Side::Long => (
                entry.saturating_add(tp_distance),
                entry.saturating_sub(sl_distance),
            ),
            Side::Short => (
                entry.saturating_sub(tp_distance),
                entry.saturating_add(sl_distance),
            ),
        };

        ExitLevels {
            take_profit,
            stop_loss,
            method: LevelMethod::Fixed { reason },
        }
    }

    /// Balance needed to carry `notional` at `leverage` in the configured mode.
    fn required_capacity(&self, notional: Decimal, leverage: u32) -> Decimal {
        match self.config.mode {
            SizingMode::Margin => notional / Decimal::from(leverage.max(1)),
            SizingMode::Spot => notional,
        }
    }
}

impl Default for RiskPositionSizer {
    fn default() -> Self {
        Self::new(SizingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn allocations() -> AllocationTable {
        AllocationTable::new()
            .with_quantity(Regime::Ranging, "BTC-USDT", dec!(0.01))
            .with_quantity(Regime::Trending, "BTC-USDT", dec!(0.001))
            .with_quantity(Regime::Trending, "ETH-USDT", dec!(0.5678))
            .with_fallback("SOL-USDT", dec!(2))
    }

    #[test]
    fn test_allocation_above_minimum_is_used_as_is() {
        let sizer = RiskPositionSizer::default();
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(50000));

        let decision = sizer.size(&request, &allocations()).unwrap();

        assert_eq!(decision.quantity, dec!(0.01));
        assert_eq!(decision.notional, dec!(600));
        assert_eq!(decision.margin_required, dec!(600));
        assert!(!decision.scaled_to_minimum);
        assert_eq!(decision.allocation_source, AllocationSource::Regime);
    }

    #[test]
    fn test_margin_required_uses_leverage() {
        let sizer = RiskPositionSizer::default();
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(100))
            .with_leverage(10);

        let decision = sizer.size(&request, &allocations()).unwrap();

        assert_eq!(decision.margin_required, dec!(60));
        assert_eq!(decision.leverage, 10);
    }

    #[test]
    fn test_scales_up_to_minimum_order_value() {
        let sizer = RiskPositionSizer::default();
        // 0.001 * 60000 = 60 < 100 minimum -> target 102
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Trending, dec!(1000))
            .with_leverage(5);

        let decision = sizer.size(&request, &allocations()).unwrap();

        assert!(decision.scaled_to_minimum);
        // 102 / 60000 = 0.0017 -> rounded up at 3 dp
        assert_eq!(decision.quantity, dec!(0.002));
        assert_eq!(decision.notional, dec!(120));
        assert!(decision.notional >= dec!(100));
        assert_eq!(decision.margin_required, dec!(24));
    }

    #[test]
    fn test_scaling_refused_when_balance_too_small() {
        let sizer = RiskPositionSizer::default();
        // Needs 102 / 5 = 20.4 of margin
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Trending, dec!(20))
            .with_leverage(5);

        let err = sizer.size(&request, &allocations()).unwrap_err();

        assert_eq!(
            err,
            SizingError::InsufficientBalance {
                symbol: "BTC-USDT".to_string(),
                required: dec!(20.4),
                available: dec!(20),
            }
        );
    }

    #[test]
    fn test_insufficient_balance_without_scaling() {
        let sizer = RiskPositionSizer::default();
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(500));

        let err = sizer.size(&request, &allocations()).unwrap_err();
        assert!(matches!(err, SizingError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_spot_mode_requires_full_notional() {
        let sizer = RiskPositionSizer::new(SizingConfig {
            mode: SizingMode::Spot,
            ..Default::default()
        });
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(599))
            .with_leverage(20);

        assert!(matches!(
            sizer.size(&request, &allocations()),
            Err(SizingError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn test_no_allocation() {
        let sizer = RiskPositionSizer::default();
        let request = SizingRequest::new("ETH-USDT", dec!(3000), Regime::Choppy, dec!(10000));

        let err = sizer.size(&request, &allocations()).unwrap_err();
        assert_eq!(
            err,
            SizingError::NoAllocation {
                regime: Regime::Choppy,
                symbol: "ETH-USDT".to_string(),
            }
        );
    }

    #[test]
    fn test_fallback_allocation() {
        let sizer = RiskPositionSizer::default();
        let request = SizingRequest::new("SOL-USDT", dec!(150), Regime::Choppy, dec!(10000));

        let decision = sizer.size(&request, &allocations()).unwrap();
        assert_eq!(decision.quantity, dec!(2));
        assert_eq!(decision.allocation_source, AllocationSource::Fallback);
    }

    #[test]
    fn test_quantity_rounded_down_to_lot_precision() {
        let mut config = SizingConfig::default();
        config.lot_precision.insert("ETH-USDT".to_string(), 2);
        let sizer = RiskPositionSizer::new(config);
        let request = SizingRequest::new("ETH-USDT", dec!(3000), Regime::Trending, dec!(10000));

        let decision = sizer.size(&request, &allocations()).unwrap();
        assert_eq!(decision.quantity, dec!(0.56));
        assert_eq!(decision.notional, dec!(1680));
    }

    #[test]
    fn test_sub_lot_allocation_trades_one_lot() {
        let sizer = RiskPositionSizer::new(SizingConfig {
            min_order_value: dec!(5),
            ..Default::default()
        });
        let table = AllocationTable::new().with_quantity(Regime::Trending, "BTC-USDT", dec!(0.0004));
        // 0.0004 * 100000 = 40 >= 5, but rounds to zero at 3 dp
        let request = SizingRequest::new("BTC-USDT", dec!(100000), Regime::Trending, dec!(1000));

        let decision = sizer.size(&request, &table).unwrap();
        assert_eq!(decision.quantity, dec!(0.001));
    }

    #[test]
    fn test_sub_lot_in_spot_mode_needs_full_notional() {
        let sizer = RiskPositionSizer::new(SizingConfig {
            mode: SizingMode::Spot,
            min_order_value: Decimal::ZERO,
            ..Default::default()
        });
        let table = AllocationTable::new().with_quantity(Regime::Trending, "BTC-USDT", dec!(0.0004));
        // Raised to one lot of 0.001 -> 100 of notional against 50 of balance
        let request = SizingRequest::new("BTC-USDT", dec!(100000), Regime::Trending, dec!(50))
            .with_leverage(20);

        let err = sizer.size(&request, &table).unwrap_err();
        assert_eq!(
            err,
            SizingError::InsufficientBalance {
                symbol: "BTC-USDT".to_string(),
                required: dec!(100),
                available: dec!(50),
            }
        );
    }

    #[test]
    fn test_rounding_below_minimum_scales_up() {
        let sizer = RiskPositionSizer::default();
        // 0.0019 * 60000 = 114, but 0.001 after lot rounding is only 60
        let table = AllocationTable::new().with_quantity(Regime::Ranging, "BTC-USDT", dec!(0.0019));
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(50000));

        let decision = sizer.size(&request, &table).unwrap();
        assert!(decision.scaled_to_minimum);
        assert_eq!(decision.quantity, dec!(0.002));
        assert_eq!(decision.notional, dec!(120));
        assert!(decision.notional >= dec!(100));
    }

    #[test]
    fn test_invalid_inputs() {
        let sizer = RiskPositionSizer::default();

        let zero_price = SizingRequest::new("BTC-USDT", Decimal::ZERO, Regime::Ranging, dec!(100));
        assert!(matches!(
            sizer.size(&zero_price, &allocations()),
            Err(SizingError::InvalidPrice { .. })
        ));

        let zero_leverage =
            SizingRequest::new("BTC-USDT", dec!(60000), Regime::Ranging, dec!(100)).with_leverage(0);
        assert!(matches!(
            sizer.size(&zero_leverage, &allocations()),
            Err(SizingError::InvalidLeverage { .. })
        ));
    }

    #[test]
    fn test_sizing_is_idempotent() {
        let sizer = RiskPositionSizer::default();
        let table = allocations();
        let request = SizingRequest::new("BTC-USDT", dec!(60000), Regime::Trending, dec!(1000))
            .with_leverage(5)
            .with_atr(Some(dec!(300)));

        assert_eq!(sizer.size(&request, &table), sizer.size(&request, &table));
    }

    #[test]
    fn test_fixed_levels_without_atr() {
        let sizer = RiskPositionSizer::default();

        let long = sizer.levels(dec!(60000), Side::Long, None);
        assert_eq!(long.take_profit, dec!(60240));
        assert_eq!(long.stop_loss, dec!(59820));
        assert_eq!(
            long.method,
            LevelMethod::Fixed {
                reason: FixedLevelReason::NoAtr
            }
        );
        assert!(!long.is_fallback());

        let short = sizer.levels(dec!(60000), Side::Short, None);
        assert_eq!(short.take_profit, dec!(59760));
        assert_eq!(short.stop_loss, dec!(60180));
    }

    #[test]
    fn test_atr_levels_are_mirrored() {
        let sizer = RiskPositionSizer::default();

        let long = sizer.levels(dec!(2000), Side::Long, Some(dec!(20)));
        let short = sizer.levels(dec!(2000), Side::Short, Some(dec!(20)));

        assert_eq!(long.take_profit, dec!(2040));
        assert_eq!(long.stop_loss, dec!(1970));
        assert_eq!(short.take_profit, dec!(1960));
        assert_eq!(short.stop_loss, dec!(2030));
        assert_eq!(long.method, LevelMethod::Atr { atr: dec!(20) });
    }

    #[test]
    fn test_unusable_atr_falls_back() {
        let sizer = RiskPositionSizer::default();

        let negative = sizer.levels(dec!(2000), Side::Long, Some(dec!(-5)));
        assert!(negative.is_fallback());
        assert_eq!(
            negative.method,
            LevelMethod::Fixed {
                reason: FixedLevelReason::NonPositiveAtr
            }
        );

        // 1.5 * 1500 pushes the long stop below zero
        let huge = sizer.levels(dec!(2000), Side::Long, Some(dec!(1500)));
        assert_eq!(
            huge.method,
            LevelMethod::Fixed {
                reason: FixedLevelReason::NonPositiveLevel
            }
        );
        assert_eq!(huge.stop_loss, dec!(1994));

        let overflow = sizer.levels(dec!(2000), Side::Short, Some(Decimal::MAX));
        assert_eq!(
            overflow.method,
            LevelMethod::Fixed {
                reason: FixedLevelReason::Overflow
            }
        );
    }
}
