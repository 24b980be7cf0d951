//! Adaptive leverage: signal quality, regime and volatility mapped to an
//! exchange-valid leverage step.
//!
//! Pipeline:
//! 1. clamp strength to [0, 1]
//! 2. regime multiplier, then volatility multiplier
//! 3. clamp the adjusted strength to [0, 1] and pick the quality tier
//! 4. ranging cap, then the engine's global bounds
//! 5. round to a step the exchange lists for the symbol
//!
//! Each step that moves the value is recorded in [`LeverageDecision::adjustments`].
//! Catalog problems never fail the decision; they are reported through
//! [`RoundingOutcome::Skipped`] or [`RoundingOutcome::OutsideBounds`].

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{LeverageBrackets, LeverageCatalog};
use crate::models::{Regime, TradeSignal};

use super::LeverageConfig;

/// A step of the pipeline that changed the working value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum LeverageAdjustment {
    StrengthClamped { from: f64, to: f64 },
    RegimeMultiplier { regime: Regime, multiplier: f64 },
    VolatilityMultiplier { volatility: f64, multiplier: f64 },
    /// Negative or non-finite volatility treated as absent
    VolatilityIgnored { volatility: f64 },
    AdjustedStrengthClamped { from: f64, to: f64 },
    RangingCap { from: u32, to: u32 },
    BoundsClamped { from: u32, to: u32 },
}

/// Why catalog rounding was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum RoundingSkip {
    CatalogUnavailable { error: String },
    EmptyCatalog,
    /// Every listed step is above the symbol maximum
    NoStepUnderMaximum { max_leverage: u32 },
}

/// Result of rounding the requested leverage to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RoundingOutcome {
    /// Requested value is itself a listed step
    Exact,
    Rounded { from: u32, to: u32 },
    /// No listed step lies inside the engine bounds; the nearest step under the
    /// symbol maximum was used anyway
    OutsideBounds {
        from: u32,
        to: u32,
        min_leverage: u32,
        max_leverage: u32,
    },
    Skipped(RoundingSkip),
}

/// Leverage chosen for one signal, with its audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageDecision {
    pub symbol: String,

    /// Final leverage to use
    pub leverage: u32,

    /// Leverage before catalog rounding
    pub requested: u32,

    /// Strength after multipliers and clamping
    pub adjusted_strength: f64,

    /// Name of the selected quality tier
    pub tier: String,

    pub adjustments: Vec<LeverageAdjustment>,

    pub rounding: RoundingOutcome,
}

impl LeverageDecision {
    /// True when catalog rounding was skipped or left the engine bounds.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self.rounding,
            RoundingOutcome::Skipped(_) | RoundingOutcome::OutsideBounds { .. }
        )
    }
}

/// Leverage before catalog rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestedLeverage {
    pub leverage: u32,
    pub adjusted_strength: f64,
    pub tier: String,
    pub adjustments: Vec<LeverageAdjustment>,
}

/// Adaptive leverage calculator.
#[derive(Debug, Clone)]
pub struct AdaptiveLeverage {
    config: LeverageConfig,
}

impl AdaptiveLeverage {
    pub fn new(config: LeverageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LeverageConfig {
        &self.config
    }

    /// Compute the leverage for `signal`, rounded to the symbol's catalog when possible.
    pub fn compute(&self, signal: &TradeSignal, catalog: &dyn LeverageCatalog) -> LeverageDecision {
        let requested = self.requested_leverage(signal);

        let (leverage, rounding) = match catalog.available_leverages(&signal.symbol) {
            Ok(brackets) => self.round_to_catalog(requested.leverage, &brackets),
            Err(e) => (
                requested.leverage,
                RoundingOutcome::Skipped(RoundingSkip::CatalogUnavailable {
                    error: e.to_string(),
                }),
            ),
        };

        match &rounding {
            RoundingOutcome::Skipped(skip) => warn!(
                symbol = %signal.symbol,
                leverage = leverage,
                skip = ?skip,
                "Leverage catalog rounding skipped, using computed leverage"
            ),
            RoundingOutcome::OutsideBounds { from, to, .. } => warn!(
                symbol = %signal.symbol,
                from = from,
                to = to,
                "No catalog step inside engine bounds, using nearest listed step"
            ),
            RoundingOutcome::Rounded { from, to } => debug!(
                symbol = %signal.symbol,
                from = from,
                to = to,
                "Rounded leverage to catalog step"
            ),
            RoundingOutcome::Exact => {}
        }

        LeverageDecision {
            symbol: signal.symbol.clone(),
            leverage,
            requested: requested.leverage,
            adjusted_strength: requested.adjusted_strength,
            tier: requested.tier,
            adjustments: requested.adjustments,
            rounding,
        }
    }

    /// Leverage the signal asks for, before catalog rounding.
    pub fn requested_leverage(&self, signal: &TradeSignal) -> RequestedLeverage {
        let config = &self.config;
        let mut adjustments = Vec::new();

        let raw = if signal.strength.is_finite() {
            signal.strength
        } else {
            0.0
        };
        let strength = raw.clamp(0.0, 1.0);
        if strength != signal.strength {
            adjustments.push(LeverageAdjustment::StrengthClamped {
                from: signal.strength,
                to: strength,
            });
        }

        let regime_multiplier = config.regime_multiplier(signal.regime);
        if regime_multiplier != 1.0 {
            adjustments.push(LeverageAdjustment::RegimeMultiplier {
                regime: signal.regime,
                multiplier: regime_multiplier,
            });
        }

        let volatility_multiplier = match signal.volatility {
            Some(v) if !v.is_finite() || v < 0.0 => {
                warn!(symbol = %signal.symbol, volatility = v, "Ignoring invalid volatility");
                adjustments.push(LeverageAdjustment::VolatilityIgnored { volatility: v });
                1.0
            }
            Some(v) => {
                let multiplier = if v > config.high_volatility_threshold {
                    config.high_volatility_multiplier
                } else if v < config.low_volatility_threshold {
                    config.low_volatility_multiplier
                } else {
                    1.0
                };
                if multiplier != 1.0 {
                    adjustments.push(LeverageAdjustment::VolatilityMultiplier {
                        volatility: v,
                        multiplier,
                    });
                }
                multiplier
            }
            None => 1.0,
        };

        let unclamped = strength * regime_multiplier * volatility_multiplier;
        let adjusted_strength = unclamped.clamp(0.0, 1.0);
        if adjusted_strength != unclamped {
            adjustments.push(LeverageAdjustment::AdjustedStrengthClamped {
                from: unclamped,
                to: adjusted_strength,
            });
        }

        let (tier, mut leverage) = match config
            .tiers
            .iter()
            .rev()
            .find(|t| adjusted_strength >= t.min_strength)
        {
            Some(t) => (t.name.clone(), t.leverage),
            None => ("below_tiers".to_string(), config.min_leverage),
        };

        // Ranging cap sits after tier selection and before the global bounds
        if signal.regime == Regime::Ranging && leverage > config.ranging_cap {
            adjustments.push(LeverageAdjustment::RangingCap {
                from: leverage,
                to: config.ranging_cap,
            });
            leverage = config.ranging_cap;
        }

        let bounded = leverage.clamp(config.min_leverage, config.max_leverage);
        if bounded != leverage {
            adjustments.push(LeverageAdjustment::BoundsClamped {
                from: leverage,
                to: bounded,
            });
        }

        debug!(
            symbol = %signal.symbol,
            strength = signal.strength,
            adjusted = adjusted_strength,
            tier = %tier,
            leverage = bounded,
            "Computed requested leverage"
        );

        RequestedLeverage {
            leverage: bounded,
            adjusted_strength,
            tier,
            adjustments,
        }
    }

    /// Largest listed step not above `requested`, else the smallest eligible step.
    ///
    /// Eligible steps lie within the engine bounds and under the symbol maximum. When
    /// none do, the same rule runs over every step under the symbol maximum and the
    /// result is reported as [`RoundingOutcome::OutsideBounds`].
    fn round_to_catalog(&self, requested: u32, brackets: &LeverageBrackets) -> (u32, RoundingOutcome) {
        if brackets.is_empty() {
            return (
                clamp_to_symbol_max(requested, brackets.max_leverage),
                RoundingOutcome::Skipped(RoundingSkip::EmptyCatalog),
            );
        }

        let listed: Vec<u32> = brackets
            .available
            .iter()
            .copied()
            .filter(|l| *l <= brackets.max_leverage)
            .collect();
        if listed.is_empty() {
            return (
                clamp_to_symbol_max(requested, brackets.max_leverage),
                RoundingOutcome::Skipped(RoundingSkip::NoStepUnderMaximum {
                    max_leverage: brackets.max_leverage,
                }),
            );
        }

        let eligible: Vec<u32> = listed
            .iter()
            .copied()
            .filter(|l| *l >= self.config.min_leverage && *l <= self.config.max_leverage)
            .collect();

        if let Some(l) = nearest_step(&eligible, requested) {
            if l == requested {
                return (l, RoundingOutcome::Exact);
            }
            return (l, RoundingOutcome::Rounded { from: requested, to: l });
        }

        // `listed` is non-empty, so this always finds a step
        let l = nearest_step(&listed, requested).unwrap_or(requested);
        (
            l,
            RoundingOutcome::OutsideBounds {
                from: requested,
                to: l,
                min_leverage: self.config.min_leverage,
                max_leverage: self.config.max_leverage,
            },
        )
    }
}

/// Largest step not above `requested`, else the smallest step. `steps` is ascending.
fn nearest_step(steps: &[u32], requested: u32) -> Option<u32> {
    steps
        .iter()
        .rev()
        .find(|l| **l <= requested)
        .or_else(|| steps.first())
        .copied()
}

/// A zero maximum means the exchange did not report one.
fn clamp_to_symbol_max(requested: u32, max_leverage: u32) -> u32 {
    if max_leverage == 0 {
        requested
    } else {
        requested.min(max_leverage)
    }
}

impl Default for AdaptiveLeverage {
    fn default() -> Self {
        Self::new(LeverageConfig::default())
    }
}
