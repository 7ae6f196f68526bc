//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the service layer.

pub mod account;
pub mod audit;
pub mod budget;
pub mod category;
pub mod goal;
pub mod recurrence;
pub mod report;
pub mod tool;
pub mod transaction;
pub mod transfer;

pub use account::{handle_account_command, AccountCommands};
pub use audit::{handle_audit_command, AuditCommands};
pub use budget::{handle_budget_command, BudgetCommands};
pub use category::{handle_category_command, CategoryCommands};
pub use goal::{handle_goal_command, GoalCommands};
pub use recurrence::{handle_recurrence_command, RecurrenceCommands};
pub use report::{handle_report_command, ReportCommands};
pub use tool::handle_tool_command;
pub use transaction::{handle_transaction_command, TransactionCommands};
pub use transfer::handle_transfer_command;

use std::str::FromStr;

use chrono::NaiveDate;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Account, Category, Money, UserId};
use crate::services::{AccountService, CategoryService};
use crate::storage::Storage;

/// Parse a `YYYY-MM-DD` date, defaulting to today
pub(crate) fn parse_date(date: Option<&str>) -> LedgerResult<NaiveDate> {
    match date {
        Some(date_str) => parse_date_str(date_str),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

pub(crate) fn parse_date_str(date_str: &str) -> LedgerResult<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
        LedgerError::Validation(format!("Invalid date format: '{}'. Use YYYY-MM-DD", date_str))
    })
}

/// Parse an amount such as "-50.00" or "100"
pub(crate) fn parse_amount(amount: &str) -> LedgerResult<Money> {
    Money::parse(amount).map_err(|e| {
        LedgerError::InvalidAmount(format!(
            "Invalid amount format: '{}'. Use format like '100.00' or '100'. Error: {}",
            amount, e
        ))
    })
}

/// Parse an entity ID given in full or in its prefixed display form
pub(crate) fn parse_id<T: FromStr>(entity: &str, id: &str) -> LedgerResult<T> {
    id.parse()
        .map_err(|_| LedgerError::Validation(format!("Invalid {} ID: '{}'", entity, id)))
}

pub(crate) fn find_account(storage: &Storage, user_id: UserId, identifier: &str) -> LedgerResult<Account> {
    AccountService::new(storage, user_id)
        .find(identifier)?
        .ok_or_else(|| LedgerError::account_not_found(identifier))
}

pub(crate) fn find_category(
    storage: &Storage,
    user_id: UserId,
    identifier: &str,
) -> LedgerResult<Category> {
    CategoryService::new(storage, user_id)
        .find(identifier)?
        .ok_or_else(|| LedgerError::category_not_found(identifier))
}

/// Format an amount with the configured currency symbol
pub(crate) fn money(storage: &Storage, amount: Money) -> String {
    amount.format_with_symbol(&storage.settings().currency_symbol)
}
