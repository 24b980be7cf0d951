//! Reasons proposed by independent monitors, and the candidates that carry them.
//!
//! Each reason family is a closed enumeration with an `Unspecified` variant that keeps
//! the raw label, so free-form labels coming from older producers still take part in
//! priority resolution (ranked last unless a table names them).

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Common behaviour of exit, entry and risk reasons.
pub trait Reason: Clone + Eq + Hash + fmt::Debug + fmt::Display + From<String> {
    /// Every reason the engine itself can emit (excludes `Unspecified`), most urgent first.
    fn known() -> Vec<Self>;

    /// Canonical snake_case label.
    fn label(&self) -> &str;

    fn is_unspecified(&self) -> bool;
}

/// Why a position should be closed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExitReason {
    EmergencyLossProtection,
    StopLoss,
    TakeProfit,
    TrailingStop,
    MaxHoldingTime,
    SmartExitReversal,
    SmartExitPattern,
    PartialTakeProfit,
    ExtendTakeProfit,
    Unspecified(String),
}

impl From<String> for ExitReason {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "emergency_loss_protection" | "emergency_exit" => Self::EmergencyLossProtection,
            "stop_loss" | "sl_reached" | "sl" => Self::StopLoss,
            "take_profit" | "tp_reached" | "tp" => Self::TakeProfit,
            "trailing_stop" | "trailing_stop_hit" => Self::TrailingStop,
            "max_holding_time" | "time_limit" | "max_holding_period" => Self::MaxHoldingTime,
            "smart_exit_reversal" => Self::SmartExitReversal,
            "smart_exit_pattern" => Self::SmartExitPattern,
            "partial_take_profit" | "partial_tp" => Self::PartialTakeProfit,
            "extend_take_profit" | "extend_tp" => Self::ExtendTakeProfit,
            _ => Self::Unspecified(raw),
        }
    }
}

impl From<ExitReason> for String {
    fn from(reason: ExitReason) -> Self {
        reason.label().to_string()
    }
}

impl Reason for ExitReason {
    fn known() -> Vec<Self> {
        vec![
            Self::EmergencyLossProtection,
            Self::StopLoss,
            Self::TakeProfit,
            Self::TrailingStop,
            Self::MaxHoldingTime,
            Self::SmartExitReversal,
            Self::SmartExitPattern,
            Self::PartialTakeProfit,
            Self::ExtendTakeProfit,
        ]
    }

    fn label(&self) -> &str {
        match self {
            Self::EmergencyLossProtection => "emergency_loss_protection",
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::TrailingStop => "trailing_stop",
            Self::MaxHoldingTime => "max_holding_time",
            Self::SmartExitReversal => "smart_exit_reversal",
            Self::SmartExitPattern => "smart_exit_pattern",
            Self::PartialTakeProfit => "partial_take_profit",
            Self::ExtendTakeProfit => "extend_take_profit",
            Self::Unspecified(raw) => raw,
        }
    }

    fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified(_))
    }
}

/// Why a position should be opened (or added to).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntryReason {
    ReversalSignal,
    TrendContinuation,
    Breakout,
    ReEntry,
    Pyramid,
    Unspecified(String),
}

impl From<String> for EntryReason {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "reversal_signal" | "reversal" => Self::ReversalSignal,
            "trend_continuation" | "trend" => Self::TrendContinuation,
            "breakout" => Self::Breakout,
            "re_entry" | "reentry" => Self::ReEntry,
            "pyramid" | "pyramiding" => Self::Pyramid,
            _ => Self::Unspecified(raw),
        }
    }
}

impl From<EntryReason> for String {
    fn from(reason: EntryReason) -> Self {
        reason.label().to_string()
    }
}

impl Reason for EntryReason {
    fn known() -> Vec<Self> {
        vec![
            Self::ReversalSignal,
            Self::TrendContinuation,
            Self::Breakout,
            Self::ReEntry,
            Self::Pyramid,
        ]
    }

    fn label(&self) -> &str {
        match self {
            Self::ReversalSignal => "reversal_signal",
            Self::TrendContinuation => "trend_continuation",
            Self::Breakout => "breakout",
            Self::ReEntry => "re_entry",
            Self::Pyramid => "pyramid",
            Self::Unspecified(raw) => raw,
        }
    }

    fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified(_))
    }
}

/// Portfolio-level risk actions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RiskReason {
    EmergencyStop,
    LiquidationRisk,
    DailyLossLimit,
    MaxDrawdown,
    ExposureLimit,
    Cooldown,
    Unspecified(String),
}

impl From<String> for RiskReason {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().replace('-', "_").as_str() {
            "emergency_stop" | "kill_switch" => Self::EmergencyStop,
            "liquidation_risk" | "margin_call" => Self::LiquidationRisk,
            "daily_loss_limit" | "daily_loss" => Self::DailyLossLimit,
            "max_drawdown" | "drawdown" => Self::MaxDrawdown,
            "exposure_limit" | "max_exposure" => Self::ExposureLimit,
            "cooldown" | "loss_cooloff" => Self::Cooldown,
            _ => Self::Unspecified(raw),
        }
    }
}

impl From<RiskReason> for String {
    fn from(reason: RiskReason) -> Self {
        reason.label().to_string()
    }
}

impl Reason for RiskReason {
    fn known() -> Vec<Self> {
        vec![
            Self::EmergencyStop,
            Self::LiquidationRisk,
            Self::DailyLossLimit,
            Self::MaxDrawdown,
            Self::ExposureLimit,
            Self::Cooldown,
        ]
    }

    fn label(&self) -> &str {
        match self {
            Self::EmergencyStop => "emergency_stop",
            Self::LiquidationRisk => "liquidation_risk",
            Self::DailyLossLimit => "daily_loss_limit",
            Self::MaxDrawdown => "max_drawdown",
            Self::ExposureLimit => "exposure_limit",
            Self::Cooldown => "cooldown",
            Self::Unspecified(raw) => raw,
        }
    }

    fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified(_))
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for EntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Display for RiskReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A proposed action with its reason-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate<R> {
    pub reason: R,

    /// Reason-specific details (observed price, elapsed time, ...)
    #[serde(default)]
    pub payload: Value,
}

impl<R> Candidate<R> {
    pub fn new(reason: R) -> Self {
        Self {
            reason,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

pub type ExitCandidate = Candidate<ExitReason>;
pub type EntryCandidate = Candidate<EntryReason>;
pub type RiskCandidate = Candidate<RiskReason>;
