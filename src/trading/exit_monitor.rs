//! Exit rules for open positions.
//!
//! Every rule is evaluated independently; each one that fires proposes an `ExitCandidate`.
//! Picking the one to act on is left to the `PriorityResolver`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::models::{Candidate, ExitCandidate, ExitReason, OpenPosition, Side};

use super::ExitRulesConfig;

/// Stateless evaluator for the built-in exit rules.
#[derive(Debug, Clone, Default)]
pub struct ExitMonitor {
    config: ExitRulesConfig,
}

impl ExitMonitor {
    pub fn new(config: ExitRulesConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExitRulesConfig {
        &self.config
    }

    /// Evaluate `position` at `mark`. Returns one candidate per rule that fires.
    pub fn evaluate(
        &self,
        position: &OpenPosition,
        mark: Decimal,
        now: DateTime<Utc>,
    ) -> Vec<ExitCandidate> {
        if mark <= Decimal::ZERO || position.entry_price <= Decimal::ZERO {
            warn!(symbol = %position.symbol, mark = %mark, "Skipping exit checks for invalid price");
            return Vec::new();
        }

        let mut candidates = Vec::new();

        // Emergency loss on margin
        let leveraged_return = position.leveraged_return_pct(mark);
        if leveraged_return.is_none() {
            warn!(symbol = %position.symbol, mark = %mark, "Return out of range, skipping emergency check");
        }
        if let Some(leveraged_return) =
            leveraged_return.filter(|r| *r <= -self.config.emergency_loss_pct)
        {
            warn!(
                symbol = %position.symbol,
                return_pct = %leveraged_return,
                limit = %self.config.emergency_loss_pct,
                "Emergency loss protection triggered"
            );
            candidates.push(Candidate::new(ExitReason::EmergencyLossProtection).with_payload(
                json!({
                    "mark": mark,
                    "leveraged_return": leveraged_return,
                    "limit": self.config.emergency_loss_pct,
                }),
            ));
        }

        if self.stop_loss_hit(position, mark) {
            debug!(symbol = %position.symbol, mark = %mark, stop = %position.stop_loss, "Stop loss hit");
            candidates.push(Candidate::new(ExitReason::StopLoss).with_payload(json!({
                "mark": mark,
                "level": position.stop_loss,
            })));
        }

        if self.take_profit_hit(position, mark) {
            debug!(symbol = %position.symbol, mark = %mark, target = %position.take_profit, "Take profit hit");
            candidates.push(Candidate::new(ExitReason::TakeProfit).with_payload(json!({
                "mark": mark,
                "level": position.take_profit,
            })));
        }

        if let Some(candidate) = self.trailing_stop(position, mark) {
            candidates.push(candidate);
        }

        // Max holding period
        let held = position.holding_duration(now).num_minutes();
        if held >= self.config.max_holding_minutes {
            info!(
                symbol = %position.symbol,
                minutes = held,
                max = self.config.max_holding_minutes,
                "Max holding period reached"
            );
            candidates.push(Candidate::new(ExitReason::MaxHoldingTime).with_payload(json!({
                "held_minutes": held,
                "max_minutes": self.config.max_holding_minutes,
            })));
        }

        candidates
    }

    fn stop_loss_hit(&self, position: &OpenPosition, mark: Decimal) -> bool {
        if position.stop_loss <= Decimal::ZERO {
            return false;
        }
        match position.side {
            Side::Long => mark <= position.stop_loss,
            Side::Short => mark >= position.stop_loss,
        }
    }

    fn take_profit_hit(&self, position: &OpenPosition, mark: Decimal) -> bool {
        if position.take_profit <= Decimal::ZERO {
            return false;
        }
        match position.side {
            Side::Long => mark >= position.take_profit,
            Side::Short => mark <= position.take_profit,
        }
    }

    /// Arms once the best price is far enough in profit, then fires on a retracement.
    fn trailing_stop(&self, position: &OpenPosition, mark: Decimal) -> Option<ExitCandidate> {
        let best = match position.side {
            Side::Long => position.best_price.max(mark),
            Side::Short => position.best_price.min(mark),
        };
        if best <= Decimal::ZERO {
            return None;
        }

        let excursion = position.return_pct(best)?;
        if excursion < self.config.trailing_activation_pct {
            return None;
        }

        let retrace = match position.side {
            Side::Long => (best - mark).checked_div(best)?,
            Side::Short => (mark - best).checked_div(best)?,
        };
        if retrace < self.config.trailing_distance_pct {
            return None;
        }

        debug!(
            symbol = %position.symbol,
            best = %best,
            mark = %mark,
            retrace = %retrace,
            "Trailing stop hit"
        );
        Some(Candidate::new(ExitReason::TrailingStop).with_payload(json!({
            "mark": mark,
            "best_price": best,
            "retrace": retrace,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::PriorityResolver;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn reasons(candidates: &[ExitCandidate]) -> Vec<ExitReason> {
        candidates.iter().map(|c| c.reason.clone()).collect()
    }

    fn long_position(now: DateTime<Utc>) -> OpenPosition {
        OpenPosition::new(
            "BTC-USDT",
            Side::Long,
            dec!(60000),
            dec!(0.01),
            10,
            now - Duration::minutes(10),
        )
        .with_levels(dec!(60240), dec!(59820))
    }

    #[test]
    fn test_quiet_position() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        assert!(monitor.evaluate(&long_position(now), dec!(60000), now).is_empty());
    }

    #[test]
    fn test_stop_loss() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();

        let candidates = monitor.evaluate(&long_position(now), dec!(59800), now);
        assert_eq!(reasons(&candidates), vec![ExitReason::StopLoss]);
        assert_eq!(candidates[0].payload["level"], json!(dec!(59820)));
    }

    #[test]
    fn test_emergency_loss_wins_over_stop_loss() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();

        // -1.67% at 10x is a 16.7% loss on margin
        let candidates = monitor.evaluate(&long_position(now), dec!(59000), now);
        assert_eq!(
            reasons(&candidates),
            vec![ExitReason::EmergencyLossProtection, ExitReason::StopLoss]
        );

        let winner = PriorityResolver::default().resolve_exit(candidates).unwrap();
        assert_eq!(winner.reason, ExitReason::EmergencyLossProtection);
    }

    #[test]
    fn test_take_profit() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();

        let candidates = monitor.evaluate(&long_position(now), dec!(60300), now);
        assert_eq!(reasons(&candidates), vec![ExitReason::TakeProfit]);
    }

    #[test]
    fn test_trailing_stop_after_activation() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        let mut position = long_position(now).with_levels(dec!(61000), dec!(59000));

        position.update_price(dec!(60600));
        // 1% excursion arms the trail; 200 / 60600 is a 0.33% retrace
        let candidates = monitor.evaluate(&position, dec!(60400), now);
        assert_eq!(reasons(&candidates), vec![ExitReason::TrailingStop]);

        // Not armed: best price only 0.2% above entry
        let mut quiet = long_position(now).with_levels(dec!(61000), dec!(59000));
        quiet.update_price(dec!(60120));
        assert!(monitor.evaluate(&quiet, dec!(59900), now).is_empty());
    }

    #[test]
    fn test_max_holding_time() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        let mut position = long_position(now);
        position.opened_at = now - Duration::minutes(241);

        let candidates = monitor.evaluate(&position, dec!(60000), now);
        assert_eq!(reasons(&candidates), vec![ExitReason::MaxHoldingTime]);
        assert_eq!(candidates[0].payload["held_minutes"], 241);
    }

    #[test]
    fn test_short_position_levels() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        let position = OpenPosition::new("ETH-USDT", Side::Short, dec!(2000), dec!(1), 5, now)
            .with_levels(dec!(1960), dec!(2030));

        assert_eq!(
            reasons(&monitor.evaluate(&position, dec!(2035), now)),
            vec![ExitReason::StopLoss]
        );
        assert_eq!(
            reasons(&monitor.evaluate(&position, dec!(1955), now)),
            vec![ExitReason::TakeProfit]
        );
    }

    #[test]
    fn test_invalid_mark_is_ignored() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        assert!(monitor.evaluate(&long_position(now), Decimal::ZERO, now).is_empty());
    }

    #[test]
    fn test_out_of_range_returns_propose_nothing() {
        let now = Utc::now();
        let monitor = ExitMonitor::default();
        let position = OpenPosition::new("BTC-USDT", Side::Long, Decimal::new(1, 28), dec!(1), 20, now);

        assert!(monitor.evaluate(&position, dec!(1000000), now).is_empty());
        assert!(monitor.evaluate(&position, Decimal::MAX, now).is_empty());
    }
}
