//! Reports module for Ledgerwise
//!
//! Read-only aggregations over a user's book: net worth, budget status and
//! the financial health score. Nothing here is stored; every figure is
//! recomputed from the ledger on each call.

pub mod budget_status;
pub mod health;
pub mod net_worth;

pub use budget_status::{BudgetStatusReport, CategorySpending};
pub use health::{
    monthly_surplus, score, whole_score, HealthComponents, HealthRating, HealthReport,
};
pub use net_worth::{AccountBalance, AccountTypeGroup, NetWorthReport, NetWorthSummary};
