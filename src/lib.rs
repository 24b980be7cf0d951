//! Risk and decision engine for leveraged futures trading.
//!
//! Sits between signal generation and order placement:
//! - [`AdaptiveLeverage`] turns signal quality, regime and volatility into an
//!   exchange-valid leverage step
//! - [`RiskPositionSizer`] turns an allocation table and the available balance into an
//!   order size with take-profit / stop-loss levels
//! - [`PriorityResolver`] picks one action when several monitors fire in the same tick
//!
//! All decision functions are synchronous and pure over the current [`SessionSnapshot`].

pub mod api;
pub mod engine;
pub mod error;
pub mod models;
pub mod session;
pub mod trading;

pub use engine::{DecisionEngine, PlanError, TradePlan};
pub use error::{BalanceError, CatalogError, ConfigError, SizingError};
pub use session::{SessionConfig, SessionSnapshot, SessionStore};
pub use trading::{AdaptiveLeverage, PriorityResolver, RiskPositionSizer};
