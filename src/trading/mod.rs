//! Decision logic: adaptive leverage, position sizing, exit rules and priority resolution.

mod allocation;
mod config;
mod exit_monitor;
mod leverage;
mod position_sizer;
mod priority;

pub use allocation::{Allocation, AllocationSource, AllocationTable};
pub use config::{ExitRulesConfig, LeverageConfig, LeverageTier, SizingConfig, SizingMode};
pub use exit_monitor::ExitMonitor;
pub use leverage::{
    AdaptiveLeverage, LeverageAdjustment, LeverageDecision, RequestedLeverage, RoundingOutcome,
    RoundingSkip,
};
pub use position_sizer::{
    ExitLevels, FixedLevelReason, LevelMethod, RiskPositionSizer, SizingDecision, SizingRequest,
};
pub use priority::{PriorityConfig, PriorityResolver, PriorityTable, Resolution, WORST_RANK};
