//! Core data models for Ledgerwise
//!
//! This module contains the data structures of the ledger domain: accounts,
//! hierarchical categories, transactions, recurrences, budgets and goals.

pub mod account;
pub mod budget;
pub mod category;
pub mod goal;
pub mod ids;
pub mod money;
pub mod period;
pub mod recurrence;
pub mod transaction;

pub use account::{Account, AccountType, CreditCardDetails};
pub use budget::{Budget, BudgetFilters};
pub use category::{BuiltinCategory, Category, CategoryKind, DefaultCategory, DEFAULT_CATEGORIES};
pub use goal::{
    Allocation, Goal, GoalProgress, GoalProjection, GoalStatus, GoalType, ProjectionStatus,
    MILESTONES,
};
pub use ids::{
    AccountId, AllocationId, BudgetId, CategoryId, GoalId, RecurrenceId, TransactionId, UserId,
};
pub use money::Money;
pub use period::{DateRange, Frequency, PeriodType};
pub use recurrence::{
    AdvancePlan, CatchUpPolicy, RecurrenceDefinition, RecurrenceState, RecurrenceTemplate,
};
pub use transaction::{SpecialType, Transaction, TransactionPatch};
