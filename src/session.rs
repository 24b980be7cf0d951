//! Session-scoped reference data and its atomic refresh.
//!
//! A [`SessionSnapshot`] bundles everything the decision components read: configuration,
//! allocation table, leverage catalog and priority tables. Snapshots are immutable; a
//! refresh builds a new one and swaps it into the [`SessionStore`] in one step, so readers
//! always see either the old or the new data in full.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{LeverageCatalog, MissingCatalog, StaticBalances, StaticLeverageCatalog};
use crate::error::ConfigError;
use crate::trading::{
    AdaptiveLeverage, AllocationTable, ExitMonitor, ExitRulesConfig, LeverageConfig,
    PriorityConfig, PriorityResolver, RiskPositionSizer, SizingConfig,
};

/// On-disk session configuration. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub leverage: LeverageConfig,
    pub sizing: SizingConfig,
    pub exits: ExitRulesConfig,

    /// Quantity per trade by regime and symbol
    pub allocations: AllocationTable,

    /// Cached exchange leverage brackets; rounding is skipped when absent
    pub catalog: Option<StaticLeverageCatalog>,

    pub priorities: PriorityConfig,

    /// Fixed balances for dry runs
    pub balances: HashMap<String, Decimal>,
}

impl SessionConfig {
    /// Load from a TOML or JSON file (chosen by extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&raw),
            _ => Self::from_toml_str(&raw),
        }
        .with_context(|| format!("Failed to parse config {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.leverage.validate()?;
        self.sizing.validate()?;
        self.exits.validate()?;
        self.allocations.validate()?;
        Ok(())
    }

    pub fn static_balances(&self) -> StaticBalances {
        self.balances
            .iter()
            .fold(StaticBalances::new(), |balances, (asset, amount)| {
                balances.with_balance(asset.clone(), *amount)
            })
    }
}

/// Immutable view of the session used by one evaluation.
pub struct SessionSnapshot {
    pub leverage: AdaptiveLeverage,
    pub sizer: RiskPositionSizer,
    pub exits: ExitMonitor,
    pub resolver: PriorityResolver,
    pub allocations: AllocationTable,
    pub catalog: Arc<dyn LeverageCatalog>,

    /// Increments on every replacement
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

impl SessionSnapshot {
    pub fn from_config(config: SessionConfig) -> Self {
        let catalog: Arc<dyn LeverageCatalog> = match config.catalog {
            Some(catalog) => Arc::new(catalog),
            None => {
                warn!("No leverage catalog configured, leverage will not be rounded");
                Arc::new(MissingCatalog)
            }
        };

        let gaps = config.allocations.gaps();
        if !gaps.is_empty() {
            let missing: Vec<String> = gaps
                .iter()
                .map(|(regime, symbol)| format!("{regime}/{symbol}"))
                .collect();
            warn!(missing = ?missing, "Allocation table has unresolved pairs");
        }

        Self {
            leverage: AdaptiveLeverage::new(config.leverage),
            sizer: RiskPositionSizer::new(config.sizing),
            exits: ExitMonitor::new(config.exits),
            resolver: PriorityResolver::new(config.priorities),
            allocations: config.allocations,
            catalog,
            generation: 0,
            loaded_at: Utc::now(),
        }
    }

    /// Replace the catalog, e.g. with a live exchange-backed implementation.
    pub fn with_catalog(mut self, catalog: Arc<dyn LeverageCatalog>) -> Self {
        self.catalog = catalog;
        self
    }
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self::from_config(SessionConfig::default())
    }
}

/// Holder of the current snapshot. Lock-free for readers; writers are serialized so
/// published generations only ever increase.
pub struct SessionStore {
    current: ArcSwap<SessionSnapshot>,
    writer: Mutex<()>,
}

impl SessionStore {
    pub fn new(snapshot: SessionSnapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(config: SessionConfig) -> Self {
        Self::new(SessionSnapshot::from_config(config))
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.current.load_full()
    }

    /// Swap in a new snapshot. Readers holding the old one keep using it.
    pub fn replace(&self, mut snapshot: SessionSnapshot) -> u64 {
        // The guard protects no data, so a poisoned lock is still usable
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = self.current.load().generation + 1;
        snapshot.generation = generation;
        self.current.store(Arc::new(snapshot));
        info!(generation, "Session snapshot replaced");
        generation
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }
}
