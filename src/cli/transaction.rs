//! Transaction CLI commands
//!
//! Implements CLI commands for transaction management.

use clap::Subcommand;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{GoalId, SpecialType, TransactionId, TransactionPatch, UserId};
use crate::services::{NewTransaction, TransactionFilter, TransactionService};
use crate::storage::Storage;

use super::{find_account, find_category, money, parse_amount, parse_date, parse_date_str, parse_id};

/// Transaction subcommands
#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Add a new transaction
    Add {
        /// Account name or ID
        account: String,
        /// Amount (e.g., "-50.00" for outflow, "100.00" for inflow)
        #[arg(allow_negative_numbers = true)]
        amount: String,
        /// Category path, name or ID (e.g., "home/groceries")
        #[arg(short, long)]
        category: String,
        /// Transaction date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<String>,
        /// Description
        #[arg(short, long, default_value = "")]
        memo: String,
        /// Special type (default, upcoming, subscription, repetitive, credit, debt)
        #[arg(short = 't', long, default_value = "default")]
        special: String,
        /// Goal ID to credit; required for credit and debt
        #[arg(short, long)]
        goal: Option<String>,
    },
    /// List transactions
    List {
        /// Filter by account name or ID
        #[arg(short, long)]
        account: Option<String>,
        /// Filter by category path, name or ID
        #[arg(short = 'C', long)]
        category: Option<String>,
        /// Include descendants of the category
        #[arg(long)]
        descendants: bool,
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },
    /// Show transaction details
    Show {
        /// Transaction ID
        id: String,
    },
    /// Edit a transaction's description or category
    Edit {
        /// Transaction ID
        id: String,
        /// New category
        #[arg(short, long)]
        category: Option<String>,
        /// New description
        #[arg(short, long)]
        memo: Option<String>,
    },
    /// Delete a transaction
    Delete {
        /// Transaction ID
        id: String,
    },
}

/// Handle a transaction command
pub fn handle_transaction_command(
    storage: &Storage,
    user_id: UserId,
    cmd: TransactionCommands,
) -> LedgerResult<()> {
    let service = TransactionService::new(storage, user_id);

    match cmd {
        TransactionCommands::Add {
            account,
            amount,
            category,
            date,
            memo,
            special,
            goal,
        } => {
            let account = find_account(storage, user_id, &account)?;
            let category = find_category(storage, user_id, &category)?;
            let special_type = SpecialType::parse(&special).ok_or_else(|| {
                LedgerError::Validation(format!("Invalid special type: '{}'", special))
            })?;
            let goal_id = goal
                .map(|g| parse_id::<GoalId>("goal", &g))
                .transpose()?;

            let result = service.post(NewTransaction {
                account_id: account.id,
                amount: parse_amount(&amount)?,
                category_id: category.id,
                special_type,
                description: memo,
                date: parse_date(date.as_deref())?,
                goal_id,
            })?;

            println!("Created transaction:");
            println!("  ID:       {}", result.transaction.id);
            println!("  Date:     {}", result.transaction.date);
            println!("  Amount:   {}", money(storage, result.transaction.amount));
            println!("  Category: {}", category);
            println!("  Balance:  {}", money(storage, result.account_balance));
            if let Some(allocation) = result.allocation {
                println!("  Goal:     {} allocated", money(storage, allocation.amount));
            }
        }

        TransactionCommands::List {
            account,
            category,
            descendants,
            limit,
            from,
            to,
        } => {
            let filter = TransactionFilter {
                account_id: account
                    .map(|a| find_account(storage, user_id, &a).map(|a| a.id))
                    .transpose()?,
                category_id: category
                    .map(|c| find_category(storage, user_id, &c).map(|c| c.id))
                    .transpose()?,
                include_descendants: descendants,
                from: from.as_deref().map(parse_date_str).transpose()?,
                to: to.as_deref().map(parse_date_str).transpose()?,
                limit: Some(limit),
                ..Default::default()
            };

            let transactions = service.list(&filter)?;
            if transactions.is_empty() {
                println!("No transactions found.");
                return Ok(());
            }
            for txn in transactions {
                println!(
                    "{}  {:<12} {:>12}  {}{}",
                    txn.id,
                    txn.date,
                    money(storage, txn.amount),
                    txn.description,
                    if txn.is_transfer() { " [transfer]" } else { "" }
                );
            }
        }

        TransactionCommands::Show { id } => {
            let txn = service.get(parse_id::<TransactionId>("transaction", &id)?)?;
            println!("Transaction {}", txn.id.full());
            println!("  Date:        {}", txn.date);
            println!("  Amount:      {}", money(storage, txn.amount));
            println!("  Description: {}", txn.description);
            println!("  Type:        {}", txn.special_type);
            if let Some(paired) = txn.paired_transaction_id {
                println!("  Transfer:    paired with {}", paired);
            }
            if let Some(recurrence) = txn.recurrence_id {
                println!("  Recurrence:  {}", recurrence);
            }
        }

        TransactionCommands::Edit { id, category, memo } => {
            let id = parse_id::<TransactionId>("transaction", &id)?;
            if category.is_none() && memo.is_none() {
                println!("No changes specified. Use --category or --memo.");
                return Ok(());
            }
            let patch = TransactionPatch {
                description: memo,
                category_id: category
                    .map(|c| find_category(storage, user_id, &c).map(|c| c.id))
                    .transpose()?,
                ..Default::default()
            };
            let txn = service.update(id, &patch)?;
            println!("Updated transaction: {}", txn);
        }

        TransactionCommands::Delete { id } => {
            let result = service.delete(parse_id::<TransactionId>("transaction", &id)?)?;
            println!("Deleted {} transaction(s)", result.removed.len());
            for (account_id, balance) in result.balances {
                println!("  {} balance: {}", account_id, money(storage, balance));
            }
        }
    }

    Ok(())
}
