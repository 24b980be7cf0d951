//! Boundaries to exchange-side collaborators: leverage catalog and balances.

mod balance;
mod catalog;

pub use balance::{extract_balance, BalancePayload, BalanceSource, StaticBalances};
pub use catalog::{LeverageBrackets, LeverageCatalog, MissingCatalog, StaticLeverageCatalog};
