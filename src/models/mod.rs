//! Data models for signals, positions and proposed actions.

mod position;
mod reason;
mod signal;

pub use position::OpenPosition;
pub use reason::{
    Candidate, EntryCandidate, EntryReason, ExitCandidate, ExitReason, Reason, RiskCandidate,
    RiskReason,
};
pub use signal::{Regime, Side, TradeSignal};
