//! Exchange leverage catalog: which discrete leverage steps a symbol supports.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Leverage steps supported by the exchange for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawBrackets")]
pub struct LeverageBrackets {
    /// Supported leverage values, ascending and de-duplicated
    pub available: Vec<u32>,

    /// Maximum leverage the exchange allows for the symbol
    pub max_leverage: u32,
}

#[derive(Deserialize)]
struct RawBrackets {
    available: Vec<u32>,
    max_leverage: Option<u32>,
}

impl From<RawBrackets> for LeverageBrackets {
    fn from(raw: RawBrackets) -> Self {
        match raw.max_leverage {
            Some(max) => Self::new(raw.available, max),
            None => Self::from_steps(raw.available),
        }
    }
}

impl LeverageBrackets {
    pub fn new(mut available: Vec<u32>, max_leverage: u32) -> Self {
        available.sort_unstable();
        available.dedup();
        Self {
            available,
            max_leverage,
        }
    }

    /// Brackets whose maximum is the largest listed step.
    pub fn from_steps(available: Vec<u32>) -> Self {
        let max = available.iter().copied().max().unwrap_or(0);
        Self::new(available, max)
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

/// Source of per-symbol leverage brackets.
///
/// Implementations are expected to cache exchange data; lookups may still fail and the
/// leverage engine degrades gracefully when they do.
pub trait LeverageCatalog: Send + Sync {
    fn available_leverages(&self, symbol: &str) -> Result<LeverageBrackets, CatalogError>;
}

/// Catalog loaded from configuration or a cached exchange snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticLeverageCatalog {
    symbols: HashMap<String, LeverageBrackets>,
}

impl StaticLeverageCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>, brackets: LeverageBrackets) -> Self {
        self.symbols.insert(symbol.into(), brackets);
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl LeverageCatalog for StaticLeverageCatalog {
    fn available_leverages(&self, symbol: &str) -> Result<LeverageBrackets, CatalogError> {
        self.symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| CatalogError::UnknownSymbol(symbol.to_string()))
    }
}

/// Stand-in used when no catalog has been loaded for the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissingCatalog;

impl LeverageCatalog for MissingCatalog {
    fn available_leverages(&self, _symbol: &str) -> Result<LeverageBrackets, CatalogError> {
        Err(CatalogError::Unavailable("no leverage catalog loaded".to_string()))
    }
}
