//! Open futures position as seen by the exit monitors.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Side;

/// A position opened from a trade plan, tracked until it closes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenPosition {
    /// Exchange symbol
    pub symbol: String,

    /// Position direction
    pub side: Side,

    /// Average entry price
    pub entry_price: Decimal,

    /// Position size in base units
    pub quantity: Decimal,

    /// Leverage the position was opened with
    pub leverage: u32,

    /// Take-profit trigger price
    pub take_profit: Decimal,

    /// Stop-loss trigger price
    pub stop_loss: Decimal,

    /// Most favourable mark price seen since entry
    pub best_price: Decimal,

    /// When the position was opened
    pub opened_at: DateTime<Utc>,
}

impl OpenPosition {
    pub fn new(
        symbol: impl Into<String>,
        side: Side,
        entry_price: Decimal,
        quantity: Decimal,
        leverage: u32,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            quantity,
            leverage,
            take_profit: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            best_price: entry_price,
            opened_at,
        }
    }

    pub fn with_levels(mut self, take_profit: Decimal, stop_loss: Decimal) -> Self {
        self.take_profit = take_profit;
        self.stop_loss = stop_loss;
        self
    }

    /// Record a new mark price, keeping the best price seen.
    pub fn update_price(&mut self, mark: Decimal) {
        let improved = match self.side {
            Side::Long => mark > self.best_price,
            Side::Short => mark < self.best_price,
        };
        if improved {
            self.best_price = mark;
        }
    }

    /// Unleveraged return at `mark`, positive when the position is in profit.
    ///
    /// `None` when the entry price is zero or the result does not fit a `Decimal`.
    pub fn return_pct(&self, mark: Decimal) -> Option<Decimal> {
        let change = mark
            .checked_sub(self.entry_price)?
            .checked_div(self.entry_price)?;
        Some(match self.side {
            Side::Long => change,
            Side::Short => -change,
        })
    }

    /// Return on margin at `mark`.
    pub fn leveraged_return_pct(&self, mark: Decimal) -> Option<Decimal> {
        self.return_pct(mark)?
            .checked_mul(Decimal::from(self.leverage.max(1)))
    }

    /// Favourable excursion of the best price relative to entry.
    pub fn best_return_pct(&self) -> Option<Decimal> {
        self.return_pct(self.best_price)
    }

    pub fn unrealized_pnl(&self, mark: Decimal) -> Option<Decimal> {
        let pnl = mark
            .checked_sub(self.entry_price)?
            .checked_mul(self.quantity)?;
        Some(match self.side {
            Side::Long => pnl,
            Side::Short => -pnl,
        })
    }

    pub fn holding_duration(&self, now: DateTime<Utc>) -> Duration {
        now - self.opened_at
    }
}
