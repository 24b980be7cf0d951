//! Static per-regime, per-symbol allocation table.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Regime;

/// Where a resolved allocation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
    /// Listed under the signal's regime
    Regime,
    /// Taken from the `default` section
    Fallback,
}

/// A resolved quantity-per-trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub quantity: Decimal,
    pub source: AllocationSource,
}

/// Quantity per trade in base units, keyed by regime then symbol.
///
/// Deserializes from `{trending: {SYMBOL: qty}, ranging: {...}, choppy: {...}, default: {...}}`.
/// The `default` section is the only fallback; pairs missing from both are unresolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationTable {
    #[serde(default)]
    trending: HashMap<String, Decimal>,

    #[serde(default)]
    ranging: HashMap<String, Decimal>,

    #[serde(default)]
    choppy: HashMap<String, Decimal>,

    #[serde(default)]
    default: HashMap<String, Decimal>,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quantity(mut self, regime: Regime, symbol: impl Into<String>, quantity: Decimal) -> Self {
        self.section_mut(regime).insert(symbol.into(), quantity);
        self
    }

    pub fn with_fallback(mut self, symbol: impl Into<String>, quantity: Decimal) -> Self {
        self.default.insert(symbol.into(), quantity);
        self
    }

    /// Resolve the quantity for `(regime, symbol)`, falling back to the default section.
    pub fn resolve(&self, regime: Regime, symbol: &str) -> Option<Allocation> {
        if let Some(quantity) = self.section(regime).get(symbol) {
            return Some(Allocation {
                quantity: *quantity,
                source: AllocationSource::Regime,
            });
        }
        self.default.get(symbol).map(|quantity| Allocation {
            quantity: *quantity,
            source: AllocationSource::Fallback,
        })
    }

    /// Every symbol that appears in any section.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .trending
            .keys()
            .chain(self.ranging.keys())
            .chain(self.choppy.keys())
            .chain(self.default.keys())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// `(regime, symbol)` pairs that resolve to nothing, for symbols the table knows.
    pub fn gaps(&self) -> Vec<(Regime, String)> {
        let symbols = self.symbols();
        Regime::ALL
            .iter()
            .flat_map(|regime| {
                symbols
                    .iter()
                    .filter(|symbol| self.resolve(*regime, symbol).is_none())
                    .map(|symbol| (*regime, symbol.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols().is_empty()
    }

    /// Quantities must be positive; a zero entry would silently size nothing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sections = [
            ("trending", &self.trending),
            ("ranging", &self.ranging),
            ("choppy", &self.choppy),
            ("default", &self.default),
        ];
        for (regime, section) in sections {
            if let Some((symbol, quantity)) = section.iter().find(|(_, q)| **q <= Decimal::ZERO) {
                return Err(ConfigError::Allocation {
                    regime: regime.to_string(),
                    symbol: symbol.clone(),
                    quantity: *quantity,
                });
            }
        }
        Ok(())
    }

    fn section(&self, regime: Regime) -> &HashMap<String, Decimal> {
        match regime {
            Regime::Trending => &self.trending,
            Regime::Ranging => &self.ranging,
            Regime::Choppy => &self.choppy,
        }
    }

    fn section_mut(&mut self, regime: Regime) -> &mut HashMap<String, Decimal> {
        match regime {
            Regime::Trending => &mut self.trending,
            Regime::Ranging => &mut self.ranging,
            Regime::Choppy => &mut self.choppy,
        }
    }
}
