//! Service layer for Ledgerwise
//!
//! The service layer provides business logic on top of the storage layer,
//! handling validation, derived fields, and cross-entity operations. Every
//! command stages its changes in a unit of work and commits them at once.

pub mod account;
pub mod budget;
pub mod category;
pub mod goal;
pub mod recurrence;
pub mod suggest;
pub mod transaction;
pub mod transfer;

pub use account::{AccountDeletion, AccountService, AccountUpdate, BalanceCheck};
pub use budget::{BudgetService, NewBudget};
pub use category::{CategoryNode, CategoryService};
pub use goal::{AllocationResult, GoalService};
pub use recurrence::{AdvanceResult, BatchAdvance, NewRecurrence, RecurrenceService, UpcomingEntry};
pub use suggest::{AdvisorError, CategoryAdvisor, SuggestionSource, Suggestions};
pub use transaction::{DeleteResult, NewTransaction, PostResult, TransactionFilter, TransactionService};
pub use transfer::{TransferResult, TransferService};
