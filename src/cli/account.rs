//! Account CLI commands
//!
//! Implements CLI commands for account management.

use clap::Subcommand;

use crate::config::AccountDeletePolicy;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{AccountType, UserId};
use crate::services::{AccountService, AccountUpdate};
use crate::storage::Storage;

use super::{find_account, money, parse_amount, parse_date};

/// Account subcommands
#[derive(Subcommand)]
pub enum AccountCommands {
    /// Create a new account
    Create {
        /// Account name
        name: String,
        /// Account type (checking, savings, credit_card, cash, investment, other)
        #[arg(short = 't', long, default_value = "checking")]
        account_type: String,
        /// Opening balance (e.g., "1000.00" or "1000")
        #[arg(short, long, default_value = "0", allow_negative_numbers = true)]
        balance: String,
        /// Date the account was opened (YYYY-MM-DD), defaults to today
        #[arg(long)]
        opened: Option<String>,
    },
    /// List all accounts
    List {
        /// Show archived accounts
        #[arg(short, long)]
        all: bool,
    },
    /// Show account details
    Show {
        /// Account name or ID
        account: String,
    },
    /// Edit an account
    Edit {
        /// Account name or ID
        account: String,
        /// New name
        #[arg(short, long)]
        name: Option<String>,
        /// New notes
        #[arg(long)]
        notes: Option<String>,
    },
    /// Delete an account
    Delete {
        /// Account name or ID
        account: String,
        /// Deletion policy (block, cascade, archive); defaults to the configured one
        #[arg(short, long)]
        policy: Option<String>,
    },
    /// Post a balance correction so the balance matches a target
    Correct {
        /// Account name or ID
        account: String,
        /// Target balance
        #[arg(allow_negative_numbers = true)]
        target: String,
        /// Correction date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Compare stored balances with the transaction history
    Verify {
        /// Rewrite drifted balances
        #[arg(long)]
        repair: bool,
    },
}

/// Handle an account command
pub fn handle_account_command(
    storage: &Storage,
    user_id: UserId,
    cmd: AccountCommands,
) -> LedgerResult<()> {
    let service = AccountService::new(storage, user_id);

    match cmd {
        AccountCommands::Create {
            name,
            account_type,
            balance,
            opened,
        } => {
            let account_type = AccountType::parse(&account_type).ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Invalid account type: '{}'. Valid types: checking, savings, credit_card, cash, investment, other",
                    account_type
                ))
            })?;
            let opening_balance = parse_amount(&balance)?;
            let opened_on = parse_date(opened.as_deref())?;

            let account = service.create(&name, account_type, opening_balance, opened_on, None)?;

            println!("Created account: {}", account.name);
            println!("  Type: {}", account.account_type);
            println!("  Opening Balance: {}", money(storage, account.opening_balance));
            println!("  ID: {}", account.id);
        }

        AccountCommands::List { all } => {
            let accounts = service.list(all)?;
            if accounts.is_empty() {
                println!("No accounts found.");
                return Ok(());
            }
            println!("{:<24} {:<12} {:>14}  ID", "Name", "Type", "Balance");
            for account in accounts {
                println!(
                    "{:<24} {:<12} {:>14}  {}{}",
                    account.name,
                    account.account_type.to_string(),
                    money(storage, account.balance),
                    account.id,
                    if account.archived { " (archived)" } else { "" }
                );
            }
        }

        AccountCommands::Show { account } => {
            let found = find_account(storage, user_id, &account)?;
            println!("{}", found);
            println!("  ID: {}", found.id.full());
            println!("  Balance: {}", money(storage, found.balance));
            println!("  Opening Balance: {}", money(storage, found.opening_balance));
            println!("  Opened: {}", found.opened_on);
            if let Some(credit) = &found.credit {
                if let Some(limit) = credit.credit_limit {
                    println!("  Credit Limit: {}", money(storage, limit));
                }
                if let Some(apr) = credit.apr {
                    println!("  APR: {:.2}%", apr);
                }
            }
            if found.archived {
                println!("  Archived: Yes");
            }
            if !found.notes.is_empty() {
                println!("  Notes: {}", found.notes);
            }
        }

        AccountCommands::Edit {
            account,
            name,
            notes,
        } => {
            let found = find_account(storage, user_id, &account)?;
            if name.is_none() && notes.is_none() {
                println!("No changes specified. Use --name or --notes.");
                return Ok(());
            }
            let updated = service.update(
                found.id,
                &AccountUpdate {
                    name,
                    notes,
                    credit: None,
                },
            )?;
            println!("Updated account: {}", updated.name);
        }

        AccountCommands::Delete { account, policy } => {
            let found = find_account(storage, user_id, &account)?;
            let deletion = match policy {
                Some(policy) => {
                    let policy = AccountDeletePolicy::parse(&policy).ok_or_else(|| {
                        LedgerError::Validation(format!(
                            "Invalid policy: '{}'. Valid policies: block, cascade, archive",
                            policy
                        ))
                    })?;
                    service.delete_with_policy(found.id, policy)?
                }
                None => service.delete(found.id)?,
            };
            match deletion.policy {
                AccountDeletePolicy::Archive => println!("Archived account: {}", found.name),
                _ => println!("Deleted account: {}", found.name),
            }
            if !deletion.removed_transactions.is_empty() {
                println!(
                    "  Removed {} transaction(s)",
                    deletion.removed_transactions.len()
                );
            }
            if deletion.removed_recurrences > 0 {
                println!("  Removed {} recurrence(s)", deletion.removed_recurrences);
            }
        }

        AccountCommands::Correct {
            account,
            target,
            date,
        } => {
            let found = find_account(storage, user_id, &account)?;
            let target = parse_amount(&target)?;
            match service.correct_balance(found.id, target, parse_date(date.as_deref())?)? {
                Some(txn) => println!(
                    "Posted correction of {} to {}",
                    money(storage, txn.amount),
                    found.name
                ),
                None => println!("{} already has balance {}", found.name, money(storage, target)),
            }
        }

        AccountCommands::Verify { repair } => {
            let checks = if repair {
                service.repair_balances()?
            } else {
                service.verify_balances()?
            };
            let drifted: Vec<_> = checks.iter().filter(|c| !c.is_consistent()).collect();
            if drifted.is_empty() {
                println!("All {} account balance(s) match their history.", checks.len());
            }
            for check in drifted {
                println!(
                    "{}: stored {} computed {} (drift {}){}",
                    check.name,
                    money(storage, check.stored),
                    money(storage, check.computed),
                    money(storage, check.drift()),
                    if repair { " - repaired" } else { "" }
                );
            }
        }
    }

    Ok(())
}
