//! Full decision pipeline for a signal: leverage, then size and exit levels.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::api::BalanceSource;
use crate::error::{BalanceError, SizingError};
use crate::models::{ExitCandidate, OpenPosition, TradeSignal};
use crate::session::SessionStore;
use crate::trading::{LeverageDecision, SizingDecision, SizingRequest};

/// Everything needed to place an order for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub signal: TradeSignal,
    pub leverage: LeverageDecision,
    pub sizing: SizingDecision,
    pub generation: u64,
}

/// Failures of [`DecisionEngine::plan_with_balances`].
#[derive(Debug, Error)]
pub enum PlanError {
    #[error(transparent)]
    Sizing(#[from] SizingError),

    #[error("balance lookup failed: {0}")]
    Balance(#[from] BalanceError),
}

/// Entry point used by trading loops. Cheap to clone; clones share the session.
#[derive(Clone)]
pub struct DecisionEngine {
    store: Arc<SessionStore>,
}

impl DecisionEngine {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Plan an order for `signal` at `price` with `balance` of available capacity.
    pub fn plan(
        &self,
        signal: &TradeSignal,
        price: Decimal,
        balance: Decimal,
    ) -> Result<TradePlan, SizingError> {
        let session = self.store.snapshot();

        let leverage = session.leverage.compute(signal, session.catalog.as_ref());

        let request = SizingRequest::new(signal.symbol.clone(), price, signal.regime, balance)
            .with_leverage(leverage.leverage)
            .with_side(signal.side)
            .with_atr(signal.atr);
        let sizing = session.sizer.size(&request, &session.allocations)?;

        info!(
            symbol = %signal.symbol,
            side = %signal.side,
            leverage = leverage.leverage,
            quantity = %sizing.quantity,
            notional = %sizing.notional,
            take_profit = %sizing.take_profit,
            stop_loss = %sizing.stop_loss,
            "Trade planned"
        );

        Ok(TradePlan {
            signal: signal.clone(),
            leverage,
            sizing,
            generation: session.generation,
        })
    }

    /// Like [`plan`](Self::plan), reading the balance of the configured quote asset.
    pub fn plan_with_balances(
        &self,
        signal: &TradeSignal,
        price: Decimal,
        balances: &dyn BalanceSource,
    ) -> Result<TradePlan, PlanError> {
        let asset = self.store.snapshot().sizer.config().quote_asset.clone();
        let balance = balances.get_balance(&asset)?;
        debug!(asset = %asset, balance = %balance, "Fetched balance");
        Ok(self.plan(signal, price, balance)?)
    }

    /// Run the exit rules for `position` and return the candidate that should be acted on.
    pub fn check_exit(
        &self,
        position: &OpenPosition,
        mark: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ExitCandidate> {
        let session = self.store.snapshot();
        let candidates = session.exits.evaluate(position, mark, now);
        let winner = session.resolver.resolve_exit(candidates)?;
        info!(symbol = %position.symbol, reason = %winner.reason, mark = %mark, "Exit selected");
        Some(winner)
    }
}
