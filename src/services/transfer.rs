//! Transfer service
//!
//! Transfers create linked transaction pairs - an outflow from the source
//! account and an inflow to the destination account - posted in a single
//! commit, so no reader ever sees one leg without the other.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{AccountId, Money, Transaction, UserId};
use crate::storage::{LastCommit, Storage};

use super::transaction::{active_account, LedgerChanges};

/// Service for managing transfers between accounts
pub struct TransferService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

/// Result of creating a transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    /// The outflow transaction (from source account)
    pub from_transaction: Transaction,
    /// The inflow transaction (to destination account)
    pub to_transaction: Transaction,
    pub from_balance: Money,
    pub to_balance: Money,
}

impl<'a> TransferService<'a> {
    /// Create a new transfer service
    pub fn new(storage: &'a Storage, user_id: UserId) -> Self {
        Self {
            storage,
            user_id,
            last_commit: LastCommit::default(),
        }
    }

    /// Book version written by this service's latest commit
    pub fn committed_version(&self) -> Option<u64> {
        self.last_commit.version()
    }

    /// Move `amount` (positive) from one account to another
    pub fn post_transfer(
        &self,
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: Money,
        date: NaiveDate,
        description: &str,
    ) -> LedgerResult<TransferResult> {
        if from_account_id == to_account_id {
            return Err(LedgerError::SameAccount(from_account_id.to_string()));
        }
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }

        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                let from_account = active_account(book, from_account_id)?;
                let to_account = active_account(book, to_account_id)?;

                let describe = |fallback: String| {
                    let description = description.trim();
                    if description.is_empty() {
                        fallback
                    } else {
                        description.to_string()
                    }
                };

                let mut from_txn =
                    Transaction::new(self.user_id, from_account_id, -amount, None, date)
                        .with_description(describe(format!("Transfer to {}", to_account.name)));
                let mut to_txn = Transaction::new(self.user_id, to_account_id, amount, None, date)
                    .with_description(describe(format!("Transfer from {}", from_account.name)));

                // Link them together
                from_txn.paired_transaction_id = Some(to_txn.id);
                to_txn.paired_transaction_id = Some(from_txn.id);

                for txn in [&from_txn, &to_txn] {
                    txn.validate()
                        .map_err(|e| LedgerError::Validation(e.to_string()))?;
                }

                let mut changes = LedgerChanges::new(book);
                changes.post(from_txn.clone())?;
                changes.post(to_txn.clone())?;
                let from_balance = changes.balance(from_account_id).unwrap_or_default();
                let to_balance = changes.balance(to_account_id).unwrap_or_default();
                let (uow, _) = changes.finish();

                Ok((
                    uow,
                    TransferResult {
                        from_transaction: Transaction {
                            version: 1,
                            ..from_txn
                        },
                        to_transaction: Transaction { version: 1, ..to_txn },
                        from_balance,
                        to_balance,
                    },
                ))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(result)
        })?;

        info!(
            user = %self.user_id,
            from = %from_account_id,
            to = %to_account_id,
            amount = %amount,
            "posted transfer"
        );
        Ok(result)
    }

    /// Get the other leg of a transfer, `None` for ordinary transactions
    pub fn linked_transaction(&self, transaction: &Transaction) -> LedgerResult<Option<Transaction>> {
        let Some(pair_id) = transaction.paired_transaction_id else {
            return Ok(None);
        };
        self.storage
            .read(self.user_id, |book| Ok(book.transaction(pair_id).cloned()))
    }
}
