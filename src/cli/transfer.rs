//! CLI command handler for account transfers
//!
//! Handles transferring funds between accounts, creating linked
//! transaction pairs that maintain balance consistency.

use crate::error::LedgerResult;
use crate::models::UserId;
use crate::services::TransferService;
use crate::storage::Storage;

use super::{find_account, money, parse_amount, parse_date};

/// Handle the transfer command
pub fn handle_transfer_command(
    storage: &Storage,
    user_id: UserId,
    from: &str,
    to: &str,
    amount: &str,
    date: Option<&str>,
    memo: &str,
) -> LedgerResult<()> {
    let from_account = find_account(storage, user_id, from)?;
    let to_account = find_account(storage, user_id, to)?;
    let amount = parse_amount(amount)?;
    let date = parse_date(date)?;

    let result = TransferService::new(storage, user_id).post_transfer(
        from_account.id,
        to_account.id,
        amount,
        date,
        memo,
    )?;

    println!("Transfer created:");
    println!(
        "  From: {} ({}, balance {})",
        from_account.name,
        money(storage, result.from_transaction.amount),
        money(storage, result.from_balance)
    );
    println!(
        "  To:   {} ({}, balance {})",
        to_account.name,
        money(storage, result.to_transaction.amount),
        money(storage, result.to_balance)
    );
    println!("  Date: {}", date);

    Ok(())
}
