//! Net Worth Report
//!
//! Sums account balances, either as stored or at the end of a given day.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::LedgerResult;
use crate::models::{AccountId, AccountType, Money, UserId};
use crate::storage::{Book, Storage};

/// Balance of a single account
#[derive(Debug, Clone, Serialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub account_name: String,
    pub account_type: AccountType,
    pub balance: Money,
    pub archived: bool,
}

/// Accounts of one type
#[derive(Debug, Clone, Serialize)]
pub struct AccountTypeGroup {
    pub account_type: AccountType,
    pub accounts: Vec<AccountBalance>,
    pub total_balance: Money,
}

impl AccountTypeGroup {
    /// Create a new account type group
    pub fn new(account_type: AccountType) -> Self {
        Self {
            account_type,
            accounts: Vec::new(),
            total_balance: Money::zero(),
        }
    }

    /// Add an account to this group
    pub fn add_account(&mut self, account: AccountBalance) -> LedgerResult<()> {
        self.total_balance = self.total_balance.checked_add(account.balance)?;
        self.accounts.push(account);
        Ok(())
    }
}

/// Net Worth Summary
#[derive(Debug, Clone, Serialize)]
pub struct NetWorthSummary {
    /// Total of asset accounts
    pub total_assets: Money,
    /// Total of liability accounts (negative when money is owed)
    pub total_liabilities: Money,
    /// Net worth (assets plus liabilities)
    pub net_worth: Money,
}

/// Net Worth Report
#[derive(Debug, Clone, Serialize)]
pub struct NetWorthReport {
    /// Day the balances are taken at, `None` for current balances
    pub as_of: Option<NaiveDate>,
    pub groups: Vec<AccountTypeGroup>,
    pub summary: NetWorthSummary,
    pub include_archived: bool,
}

impl NetWorthReport {
    /// Compute the report from a book
    ///
    /// With `as_of`, each balance is the opening balance plus the amounts
    /// dated on or before that day; accounts opened later count as zero.
    /// Totals that do not fit in the cent range are `InvalidAmount`.
    pub fn compute(book: &Book, as_of: Option<NaiveDate>, include_archived: bool) -> LedgerResult<Self> {
        let mut groups: HashMap<AccountType, AccountTypeGroup> = HashMap::new();
        let mut total_assets = Money::zero();
        let mut total_liabilities = Money::zero();

        for account in book.accounts().filter(|a| include_archived || !a.archived) {
            let balance = match as_of {
                Some(day) => book.balance_as_of(account, day),
                None => account.balance,
            };

            if account.account_type.is_liability() {
                total_liabilities = total_liabilities.checked_add(balance)?;
            } else {
                total_assets = total_assets.checked_add(balance)?;
            }

            groups
                .entry(account.account_type)
                .or_insert_with(|| AccountTypeGroup::new(account.account_type))
                .add_account(AccountBalance {
                    account_id: account.id,
                    account_name: account.name.clone(),
                    account_type: account.account_type,
                    balance,
                    archived: account.archived,
                })?;
        }

        let mut groups: Vec<_> = groups.into_values().collect();
        groups.sort_by_key(|g| account_type_sort_order(g.account_type));
        for group in &mut groups {
            group
                .accounts
                .sort_by(|a, b| a.account_name.to_lowercase().cmp(&b.account_name.to_lowercase()));
        }

        Ok(Self {
            as_of,
            groups,
            summary: NetWorthSummary {
                total_assets,
                total_liabilities,
                net_worth: total_assets.checked_add(total_liabilities)?,
            },
            include_archived,
        })
    }

    /// Generate a net worth report for a user
    pub fn generate(
        storage: &Storage,
        user_id: UserId,
        as_of: Option<NaiveDate>,
        include_archived: bool,
    ) -> LedgerResult<Self> {
        storage.read(user_id, |book| Self::compute(book, as_of, include_archived))
    }

    /// Format the report for terminal display
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();

        match self.as_of {
            Some(day) => output.push_str(&format!("Net Worth Report as of {}\n", day)),
            None => output.push_str("Net Worth Report\n"),
        }
        output.push_str(&"=".repeat(50));
        output.push('\n');

        output.push_str(&format!(
            "Total Assets:      {:>15}\n",
            self.summary.total_assets
        ));
        output.push_str(&format!(
            "Total Liabilities: {:>15}\n",
            self.summary.total_liabilities.abs()
        ));
        output.push_str(&"-".repeat(35));
        output.push('\n');
        output.push_str(&format!(
            "Net Worth:         {:>15}\n",
            self.summary.net_worth
        ));

        for group in &self.groups {
            output.push_str(&format!("\n{}\n", group.account_type.to_string().to_uppercase()));
            for account in &group.accounts {
                let marker = if account.archived { "A" } else { " " };
                output.push_str(&format!(
                    "{} {:<30} {:>14}\n",
                    marker, account.account_name, account.balance
                ));
            }
            output.push_str(&format!("  {:<30} {:>14}\n", "Subtotal:", group.total_balance));
        }

        if self.include_archived {
            output.push_str(&"-".repeat(50));
            output.push_str("\nA = Archived account\n");
        }

        output
    }

    /// Get total number of accounts
    pub fn account_count(&self) -> usize {
        self.groups.iter().map(|g| g.accounts.len()).sum()
    }
}

/// Assets first, then liabilities
fn account_type_sort_order(account_type: AccountType) -> i32 {
    match account_type {
        AccountType::Checking => 0,
        AccountType::Savings => 1,
        AccountType::Cash => 2,
        AccountType::Investment => 3,
        AccountType::Other => 4,
        AccountType::CreditCard => 10,
    }
}
