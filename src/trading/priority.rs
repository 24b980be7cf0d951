//! Conflict resolution between simultaneously proposed actions.
//!
//! Each family (exit, entry, risk) has its own rank table; lower rank wins. Reasons missing
//! from a table rank last (`WORST_RANK`) and are reported so the table can be completed.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{
    Candidate, EntryCandidate, EntryReason, ExitCandidate, ExitReason, Reason, RiskCandidate,
    RiskReason,
};

/// Rank given to reasons a table does not list.
pub const WORST_RANK: u32 = u32::MAX;

/// Reason → rank mapping. Deserializes from a plain `{reason_name: rank}` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    transparent,
    bound(
        serialize = "R: Serialize + Eq + Hash",
        deserialize = "R: Deserialize<'de> + Eq + Hash"
    )
)]
pub struct PriorityTable<R: Eq + Hash> {
    ranks: HashMap<R, u32>,
}

/// Outcome of a selection, with the bookkeeping callers may want to surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<R> {
    pub winner: Option<Candidate<R>>,

    /// Rank of the winner (`WORST_RANK` when it was unranked)
    pub rank: Option<u32>,

    /// Distinct reasons among the candidates that the table does not rank
    pub unranked: Vec<R>,

    pub considered: usize,
}

impl<R: Reason> PriorityTable<R> {
    pub fn new() -> Self {
        Self {
            ranks: HashMap::new(),
        }
    }

    /// Rank reasons 1, 2, 3, ... in iteration order.
    pub fn ranked_in_order(reasons: impl IntoIterator<Item = R>) -> Self {
        let ranks = reasons
            .into_iter()
            .zip(1u32..)
            .collect::<HashMap<_, _>>();
        Self { ranks }
    }

    pub fn with_rank(mut self, reason: R, rank: u32) -> Self {
        self.ranks.insert(reason, rank);
        self
    }

    pub fn rank(&self, reason: &R) -> Option<u32> {
        self.ranks.get(reason).copied()
    }

    pub fn rank_or_worst(&self, reason: &R) -> u32 {
        self.rank(reason).unwrap_or(WORST_RANK)
    }

    /// Pick the lowest-ranked candidate. Equal ranks go to the earliest candidate.
    pub fn select(&self, candidates: impl IntoIterator<Item = Candidate<R>>) -> Resolution<R> {
        let mut unranked: Vec<R> = Vec::new();
        let mut considered = 0;
        let mut best: Option<(u32, Candidate<R>)> = None;

        for candidate in candidates {
            considered += 1;
            let rank = match self.rank(&candidate.reason) {
                Some(rank) => rank,
                None => {
                    if !unranked.contains(&candidate.reason) {
                        unranked.push(candidate.reason.clone());
                    }
                    WORST_RANK
                }
            };
            // Strict comparison keeps the first-seen candidate on ties
            let better = match &best {
                Some((best_rank, _)) => rank < *best_rank,
                None => true,
            };
            if better {
                best = Some((rank, candidate));
            }
        }

        let (rank, winner) = match best {
            Some((rank, candidate)) => (Some(rank), Some(candidate)),
            None => (None, None),
        };

        Resolution {
            winner,
            rank,
            unranked,
            considered,
        }
    }

    /// Known reasons the table does not rank.
    pub fn gaps(&self) -> Vec<R> {
        R::known()
            .into_iter()
            .filter(|reason| !self.ranks.contains_key(reason))
            .collect()
    }

    /// Entries sorted by rank, then label.
    pub fn entries(&self) -> Vec<(R, u32)> {
        let mut entries: Vec<(R, u32)> = self
            .ranks
            .iter()
            .map(|(reason, rank)| (reason.clone(), *rank))
            .collect();
        entries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.label().cmp(b.0.label())));
        entries
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl<R: Reason> Default for PriorityTable<R> {
    fn default() -> Self {
        Self::ranked_in_order(R::known())
    }
}

/// The three rank tables. Sections left out of a config file keep their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    pub exit: PriorityTable<ExitReason>,
    pub entry: PriorityTable<EntryReason>,
    pub risk: PriorityTable<RiskReason>,
}

/// Arbitrates between candidates proposed in the same evaluation tick.
#[derive(Debug, Clone)]
pub struct PriorityResolver {
    config: PriorityConfig,
}

impl PriorityResolver {
    pub fn new(config: PriorityConfig) -> Self {
        report_gaps("exit", &config.exit);
        report_gaps("entry", &config.entry);
        report_gaps("risk", &config.risk);
        Self { config }
    }

    pub fn config(&self) -> &PriorityConfig {
        &self.config
    }

    pub fn resolve_exit(
        &self,
        candidates: impl IntoIterator<Item = ExitCandidate>,
    ) -> Option<ExitCandidate> {
        self.resolve_exit_detailed(candidates).winner
    }

    pub fn resolve_entry(
        &self,
        candidates: impl IntoIterator<Item = EntryCandidate>,
    ) -> Option<EntryCandidate> {
        self.resolve_entry_detailed(candidates).winner
    }

    pub fn resolve_risk(
        &self,
        candidates: impl IntoIterator<Item = RiskCandidate>,
    ) -> Option<RiskCandidate> {
        self.resolve_risk_detailed(candidates).winner
    }

    pub fn resolve_exit_detailed(
        &self,
        candidates: impl IntoIterator<Item = ExitCandidate>,
    ) -> Resolution<ExitReason> {
        resolve_logged("exit", &self.config.exit, candidates)
    }

    pub fn resolve_entry_detailed(
        &self,
        candidates: impl IntoIterator<Item = EntryCandidate>,
    ) -> Resolution<EntryReason> {
        resolve_logged("entry", &self.config.entry, candidates)
    }

    pub fn resolve_risk_detailed(
        &self,
        candidates: impl IntoIterator<Item = RiskCandidate>,
    ) -> Resolution<RiskReason> {
        resolve_logged("risk", &self.config.risk, candidates)
    }
}

impl Default for PriorityResolver {
    fn default() -> Self {
        Self::new(PriorityConfig::default())
    }
}

fn resolve_logged<R: Reason>(
    family: &str,
    table: &PriorityTable<R>,
    candidates: impl IntoIterator<Item = Candidate<R>>,
) -> Resolution<R> {
    let resolution = table.select(candidates);
    for reason in &resolution.unranked {
        warn!(family, reason = %reason, "Unranked reason, using lowest priority");
    }
    resolution
}

fn report_gaps<R: Reason>(family: &str, table: &PriorityTable<R>) {
    let gaps = table.gaps();
    if !gaps.is_empty() {
        let missing: Vec<&str> = gaps.iter().map(|r| r.label()).collect();
        warn!(family, missing = ?missing, "Priority table is incomplete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exit(label: &str) -> ExitCandidate {
        Candidate::new(ExitReason::from(label.to_string()))
    }

    #[test]
    fn test_lower_rank_wins() {
        let table: PriorityTable<ExitReason> =
            serde_json::from_value(json!({"sl_reached": 2, "tp_reached": 3})).unwrap();

        let winner = table
            .select(vec![exit("tp_reached"), exit("sl_reached")])
            .winner
            .unwrap();

        assert_eq!(winner.reason, ExitReason::StopLoss);
    }

    #[test]
    fn test_empty_input() {
        let resolver = PriorityResolver::default();
        assert!(resolver.resolve_exit(Vec::new()).is_none());

        let resolution = resolver.resolve_risk_detailed(Vec::new());
        assert_eq!(resolution.considered, 0);
        assert!(resolution.rank.is_none());
    }

    #[test]
    fn test_default_exit_ordering() {
        let resolver = PriorityResolver::default();
        let winner = resolver
            .resolve_exit(vec![
                exit("max_holding_time"),
                exit("trailing_stop"),
                exit("take_profit"),
                exit("emergency_loss_protection"),
                exit("stop_loss"),
            ])
            .unwrap();
        assert_eq!(winner.reason, ExitReason::EmergencyLossProtection);
    }

    #[test]
    fn test_order_independent() {
        let resolver = PriorityResolver::default();
        let candidates = vec![exit("take_profit"), exit("stop_loss"), exit("trailing_stop")];

        let mut reversed = candidates.clone();
        reversed.reverse();
        let mut rotated = candidates.clone();
        rotated.rotate_left(1);

        for order in [candidates, reversed, rotated] {
            assert_eq!(
                resolver.resolve_exit(order).unwrap().reason,
                ExitReason::StopLoss
            );
        }
    }

    #[test]
    fn test_ties_go_to_first_seen() {
        let table = PriorityTable::<ExitReason>::default();
        let first = exit("stop_loss").with_payload(json!({"monitor": "hard"}));
        let second = exit("sl").with_payload(json!({"monitor": "soft"}));

        let winner = table.select(vec![first.clone(), second]).winner.unwrap();
        assert_eq!(winner, first);
    }

    #[test]
    fn test_unranked_reason_ranks_last() {
        let resolver = PriorityResolver::default();

        let resolution =
            resolver.resolve_exit_detailed(vec![exit("funding_spike"), exit("take_profit")]);
        assert_eq!(resolution.winner.unwrap().reason, ExitReason::TakeProfit);
        assert_eq!(resolution.rank, Some(3));
        assert_eq!(
            resolution.unranked,
            vec![ExitReason::Unspecified("funding_spike".to_string())]
        );

        let alone = resolver.resolve_exit_detailed(vec![exit("funding_spike")]);
        assert_eq!(alone.rank, Some(WORST_RANK));
        assert!(alone.winner.is_some());
    }

    #[test]
    fn test_entry_and_risk_tables() {
        let resolver = PriorityResolver::default();

        let entry = resolver
            .resolve_entry(vec![
                Candidate::new(EntryReason::Pyramid),
                Candidate::new(EntryReason::Breakout),
            ])
            .unwrap();
        assert_eq!(entry.reason, EntryReason::Breakout);

        let risk = resolver
            .resolve_risk(vec![
                Candidate::new(RiskReason::Cooldown),
                Candidate::new(RiskReason::LiquidationRisk),
                Candidate::new(RiskReason::MaxDrawdown),
            ])
            .unwrap();
        assert_eq!(risk.reason, RiskReason::LiquidationRisk);
    }

    #[test]
    fn test_gaps() {
        let table = PriorityTable::new()
            .with_rank(RiskReason::EmergencyStop, 1)
            .with_rank(RiskReason::Cooldown, 2);

        let gaps = table.gaps();
        assert_eq!(gaps.len(), 4);
        assert!(gaps.contains(&RiskReason::DailyLossLimit));
        assert!(PriorityTable::<RiskReason>::default().gaps().is_empty());
    }

    #[test]
    fn test_config_sections_default_independently() {
        let config: PriorityConfig = toml::from_str(
            r#"
            [exit]
            take_profit = 1
            stop_loss = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.exit.len(), 2);
        assert_eq!(config.entry, PriorityTable::default());

        let resolver = PriorityResolver::new(config);
        let winner = resolver
            .resolve_exit(vec![exit("stop_loss"), exit("take_profit")])
            .unwrap();
        assert_eq!(winner.reason, ExitReason::TakeProfit);
    }

    #[test]
    fn test_entries_sorted_by_rank() {
        let entries = PriorityTable::<EntryReason>::default().entries();
        assert_eq!(entries[0], (EntryReason::ReversalSignal, 1));
        assert_eq!(entries[4], (EntryReason::Pyramid, 5));
    }
}
