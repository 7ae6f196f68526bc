//! Transaction service
//!
//! Posting, editing, deleting and listing transactions. Every posting moves
//! the stored account balance by its amount in the same commit, so the balance
//! always equals the opening balance plus the posted amounts.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Account, AccountId, Allocation, CategoryId, GoalId, GoalType, Money, SpecialType,
    Transaction, TransactionId, TransactionPatch, UserId,
};
use crate::storage::{Book, EntityKey, LastCommit, Storage, UnitOfWork};

use super::category::active_category;

/// Look up an account that can take new postings
pub(crate) fn active_account(book: &Book, id: AccountId) -> LedgerResult<&Account> {
    let account = book
        .account(id)
        .ok_or_else(|| LedgerError::account_not_found(id.to_string()))?;
    if account.archived {
        return Err(LedgerError::Validation(format!(
            "Account '{}' is archived",
            account.name
        )));
    }
    Ok(account)
}

/// Accumulates the ledger side effects of one command
///
/// Account balances are adjusted on working copies so several postings to
/// the same account in one command compose; `finish` stages each touched
/// account and goal exactly once.
pub(crate) struct LedgerChanges<'b> {
    book: &'b Book,
    uow: UnitOfWork,
    accounts: HashMap<AccountId, Account>,
    /// Net change of each touched goal's current amount
    goals: HashMap<GoalId, Money>,
    removed: Vec<TransactionId>,
}

impl<'b> LedgerChanges<'b> {
    pub fn new(book: &'b Book) -> Self {
        Self {
            book,
            uow: UnitOfWork::new(),
            accounts: HashMap::new(),
            goals: HashMap::new(),
            removed: Vec::new(),
        }
    }

    pub fn uow_mut(&mut self) -> &mut UnitOfWork {
        &mut self.uow
    }

    fn account_mut(&mut self, id: AccountId) -> LedgerResult<&mut Account> {
        if !self.accounts.contains_key(&id) {
            let account = self
                .book
                .account(id)
                .ok_or_else(|| LedgerError::account_not_found(id.to_string()))?;
            self.accounts.insert(id, account.clone());
        }
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| LedgerError::account_not_found(id.to_string()))
    }

    pub fn adjust_balance(&mut self, id: AccountId, delta: Money) -> LedgerResult<Money> {
        let account = self.account_mut(id)?;
        account.balance = account.balance.checked_add(delta)?;
        account.updated_at = Utc::now();
        Ok(account.balance)
    }

    /// Working balance of an account, including changes staged so far
    pub fn balance(&self, id: AccountId) -> Option<Money> {
        self.accounts
            .get(&id)
            .or_else(|| self.book.account(id))
            .map(|a| a.balance)
    }

    /// Record a change of a goal's current amount; the goal is re-staged on
    /// `finish` with its status settled
    pub fn credit_goal(&mut self, id: GoalId, delta: Money) {
        *self.goals.entry(id).or_default() += delta;
    }

    /// Stage a new transaction with its balance and usage effects
    pub fn post(&mut self, txn: Transaction) -> LedgerResult<()> {
        self.adjust_balance(txn.account_id, txn.amount)?;
        if let Some(category_id) = txn.category_id {
            self.uow.increment_usage(category_id);
        }
        self.uow.put(txn);
        Ok(())
    }

    /// Stage a new allocation of part of a transaction to a goal
    pub fn allocate(&mut self, allocation: Allocation) {
        self.credit_goal(allocation.goal_id, allocation.amount);
        self.uow.put(allocation);
    }

    /// Stage the removal of a transaction together with its transfer pair,
    /// reversing balances and dropping allocations
    pub fn remove_transaction(&mut self, id: TransactionId) -> LedgerResult<()> {
        if self.removed.contains(&id) {
            return Ok(());
        }
        let txn = self
            .book
            .transaction(id)
            .ok_or_else(|| LedgerError::transaction_not_found(id.to_string()))?;

        let mut legs = vec![txn];
        if let Some(pair_id) = txn.paired_transaction_id {
            if let Some(pair) = self.book.transaction(pair_id) {
                legs.push(pair);
            }
        }

        for leg in legs {
            if self.removed.contains(&leg.id) {
                continue;
            }
            self.adjust_balance(leg.account_id, -leg.amount)?;
            for allocation in self.book.allocations_for_transaction(leg.id) {
                self.credit_goal(allocation.goal_id, -allocation.amount);
                self.uow
                    .remove(EntityKey::Allocation(allocation.id), allocation.version);
            }
            self.uow.remove(EntityKey::Transaction(leg.id), leg.version);
            self.removed.push(leg.id);
        }
        Ok(())
    }

    pub fn removed(&self) -> &[TransactionId] {
        &self.removed
    }

    /// Stage every touched account and goal
    pub fn finish(mut self) -> (UnitOfWork, Vec<Account>) {
        let mut accounts: Vec<Account> = self.accounts.into_values().collect();
        accounts.sort_by_key(|a| a.id);
        for account in &accounts {
            self.uow.put(account.clone());
        }
        for (goal_id, delta) in self.goals {
            if let Some(goal) = self.book.goal(goal_id) {
                let mut goal = goal.clone();
                goal.settle_status(self.book.goal_current_amount(goal_id) + delta);
                goal.updated_at = Utc::now();
                self.uow.put(goal);
            }
        }
        (self.uow, accounts)
    }
}

/// A new posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub amount: Money,
    pub category_id: CategoryId,
    #[serde(default)]
    pub special_type: SpecialType,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    /// Goal to credit the full magnitude to; required for credit and debt
    #[serde(default)]
    pub goal_id: Option<GoalId>,
}

/// Result of posting a transaction
#[derive(Debug, Clone, Serialize)]
pub struct PostResult {
    pub transaction: Transaction,
    pub account_balance: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Allocation>,
}

/// Result of deleting a transaction
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub removed: Vec<TransactionId>,
    pub balances: Vec<(AccountId, Money)>,
}

/// Criteria for listing transactions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub account_id: Option<AccountId>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    /// Also match descendants of `category_id`
    #[serde(default)]
    pub include_descendants: bool,
    #[serde(default)]
    pub special_type: Option<SpecialType>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Service for transaction management
pub struct TransactionService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

impl<'a> TransactionService<'a> {
    /// Create a new transaction service
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

    /// Post a transaction to an account
    pub fn post(&self, new: NewTransaction) -> LedgerResult<PostResult> {
        if new.amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "transaction amount must not be zero".into(),
            ));
        }

        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                active_account(book, new.account_id)?;
                active_category(book, new.category_id)?;

                let allocation_goal = match (new.special_type.requires_goal_link(), new.goal_id) {
                    (true, None) => {
                        return Err(LedgerError::Validation(format!(
                            "{} transactions must reference a loan goal",
                            new.special_type
                        )))
                    }
                    (_, Some(goal_id)) => {
                        let goal = book
                            .goal(goal_id)
                            .ok_or_else(|| LedgerError::goal_not_found(goal_id.to_string()))?;
                        if !goal.accepts_allocations() {
                            return Err(LedgerError::Validation(format!(
                                "Goal '{}' is {}",
                                goal.name, goal.status
                            )));
                        }
                        if new.special_type.requires_goal_link() && goal.goal_type != GoalType::Loan {
                            return Err(LedgerError::Validation(format!(
                                "{} transactions must reference a loan goal, '{}' is a {} goal",
                                new.special_type, goal.name, goal.goal_type
                            )));
                        }
                        Some(goal_id)
                    }
                    (false, None) => None,
                };

                let mut txn = Transaction::new(
                    self.user_id,
                    new.account_id,
                    new.amount,
                    Some(new.category_id),
                    new.date,
                )
                .with_description(new.description.trim())
                .with_special_type(new.special_type);
                txn.goal_id = allocation_goal;
                txn.validate()
                    .map_err(|e| LedgerError::Validation(e.to_string()))?;

                let mut changes = LedgerChanges::new(book);
                changes.post(txn.clone())?;
                let allocation = allocation_goal.map(|goal_id| {
                    let allocation =
                        Allocation::new(self.user_id, goal_id, txn.id, txn.amount.abs());
                    changes.allocate(allocation.clone());
                    allocation
                });
                let account_balance = changes.balance(txn.account_id).unwrap_or_default();
                let (uow, _) = changes.finish();

                Ok((
                    uow,
                    PostResult {
                        transaction: Transaction { version: 1, ..txn },
                        account_balance,
                        allocation: allocation.map(|a| Allocation { version: 1, ..a }),
                    },
                ))
            })?;

            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(result)
        })?;

        debug!(
            user = %self.user_id,
            transaction = %result.transaction.id,
            amount = %result.transaction.amount,
            "posted transaction"
        );
        Ok(result)
    }

    /// Get a transaction by ID
    pub fn get(&self, id: TransactionId) -> LedgerResult<Transaction> {
        self.storage.read(self.user_id, |book| {
            book.transaction(id)
                .cloned()
                .ok_or_else(|| LedgerError::transaction_not_found(id.to_string()))
        })
    }

    /// Change the description or category of a posted transaction
    ///
    /// Any other field in the patch fails with `Immutable`.
    pub fn update(&self, id: TransactionId, patch: &TransactionPatch) -> LedgerResult<Transaction> {
        if let Some(field) = patch.immutable_field() {
            return Err(LedgerError::Immutable { field });
        }

        self.storage.with_retry(|| {
            let txn = self.storage.read(self.user_id, |book| {
                let mut txn = book
                    .transaction(id)
                    .cloned()
                    .ok_or_else(|| LedgerError::transaction_not_found(id.to_string()))?;

                if let Some(description) = &patch.description {
                    txn.description = description.trim().to_string();
                }
                if let Some(category_id) = patch.category_id {
                    if txn.is_transfer() {
                        return Err(LedgerError::Validation(
                            "Transfer legs carry no category".into(),
                        ));
                    }
                    active_category(book, category_id)?;
                    txn.category_id = Some(category_id);
                }
                txn.validate()
                    .map_err(|e| LedgerError::Validation(e.to_string()))?;
                txn.updated_at = Utc::now();
                Ok(txn)
            })?;

            let mut uow = UnitOfWork::new();
            uow.put(txn.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(Transaction {
                version: txn.version + 1,
                ..txn
            })
        })
    }

    /// Delete a transaction; a transfer leg takes its pair with it
    pub fn delete(&self, id: TransactionId) -> LedgerResult<DeleteResult> {
        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                let mut changes = LedgerChanges::new(book);
                changes.remove_transaction(id)?;
                let removed = changes.removed().to_vec();
                let (uow, accounts) = changes.finish();
                let balances = accounts.iter().map(|a| (a.id, a.balance)).collect();
                Ok((uow, DeleteResult { removed, balances }))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(result)
        })?;

        info!(user = %self.user_id, transaction = %id, legs = result.removed.len(), "deleted transaction");
        Ok(result)
    }

    /// List transactions matching `filter`, newest first
    pub fn list(&self, filter: &TransactionFilter) -> LedgerResult<Vec<Transaction>> {
        self.storage.read(self.user_id, |book| {
            let categories: Option<HashSet<CategoryId>> = filter.category_id.map(|id| {
                if filter.include_descendants {
                    book.category_subtree(id).into_iter().collect()
                } else {
                    std::iter::once(id).collect()
                }
            });

            let source: Vec<&Transaction> = match filter.account_id {
                Some(account_id) => book.transactions_for_account(account_id),
                None => book.transactions().collect(),
            };

            let mut matched: Vec<Transaction> = source
                .into_iter()
                .filter(|t| {
                    categories
                        .as_ref()
                        .map_or(true, |set| t.category_id.is_some_and(|c| set.contains(&c)))
                })
                .filter(|t| filter.special_type.map_or(true, |s| t.special_type == s))
                .filter(|t| filter.from.map_or(true, |from| t.date >= from))
                .filter(|t| filter.to.map_or(true, |to| t.date <= to))
                .cloned()
                .collect();

            matched.sort_by(|a, b| {
                b.date
                    .cmp(&a.date)
                    .then(b.created_at.cmp(&a.created_at))
                    .then(a.id.cmp(&b.id))
            });
            if let Some(limit) = filter.limit {
                matched.truncate(limit);
            }
            Ok(matched)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountType, Goal};
    use crate::services::{AccountService, CategoryService, TransferService};

    struct Fixture {
        storage: Storage,
        user: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Storage::in_memory();
            let user = UserId::new();
            storage.create_user(user).unwrap();
            CategoryService::new(&storage, user).seed_defaults().unwrap();
            Self { storage, user }
        }

        fn account(&self, name: &str, opening: i64) -> Account {
            AccountService::new(&self.storage, self.user)
                .create(
                    name,
                    AccountType::Checking,
                    Money::from_cents(opening),
                    date(1),
                    None,
                )
                .unwrap()
        }

        fn category(&self, path: &str) -> CategoryId {
            CategoryService::new(&self.storage, self.user)
                .find(path)
                .unwrap()
                .unwrap()
                .id
        }

        fn service(&self) -> TransactionService<'_> {
            TransactionService::new(&self.storage, self.user)
        }

        fn new_txn(&self, account: AccountId, cents: i64, category: &str) -> NewTransaction {
            NewTransaction {
                account_id: account,
                amount: Money::from_cents(cents),
                category_id: self.category(category),
                special_type: SpecialType::Default,
                description: "test".into(),
                date: date(10),
                goal_id: None,
            }
        }

        fn balance(&self, id: AccountId) -> Money {
            AccountService::new(&self.storage, self.user)
                .get(id)
                .unwrap()
                .balance
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap()
    }

    #[test]
    fn test_post_updates_balance_and_usage() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 10000);

        let result = fx
            .service()
            .post(fx.new_txn(checking.id, -2500, "home/groceries"))
            .unwrap();
        assert_eq!(result.account_balance, Money::from_cents(7500));
        assert_eq!(fx.balance(checking.id), Money::from_cents(7500));

        let groceries = CategoryService::new(&fx.storage, fx.user)
            .get(fx.category("home/groceries"))
            .unwrap();
        assert_eq!(groceries.usage_count, 1);
    }

    #[test]
    fn test_post_rejects_zero_and_missing_refs() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 0);

        let err = fx
            .service()
            .post(fx.new_txn(checking.id, 0, "food"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let mut new = fx.new_txn(checking.id, -100, "food");
        new.account_id = AccountId::new();
        assert!(fx.service().post(new).unwrap_err().is_not_found());

        let mut new = fx.new_txn(checking.id, -100, "food");
        new.category_id = CategoryId::new();
        assert!(fx.service().post(new).unwrap_err().is_not_found());
    }

    #[test]
    fn test_post_to_disabled_category_is_not_found() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 0);
        let food = fx.category("food");
        CategoryService::new(&fx.storage, fx.user).disable(food).unwrap();

        let err = fx
            .service()
            .post(fx.new_txn(checking.id, -100, "food/coffee_shops"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_debt_requires_loan_goal_and_allocates() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 0);

        let mut new = fx.new_txn(checking.id, 50000, "income/gifts");
        new.special_type = SpecialType::Debt;
        assert!(fx.service().post(new.clone()).unwrap_err().is_validation());

        let loan = Goal::new(fx.user, "Car loan", GoalType::Loan, Money::from_cents(50000), date(28));
        let mut uow = UnitOfWork::new();
        uow.put(loan.clone());
        fx.storage.commit(fx.user, uow).unwrap();

        new.goal_id = Some(loan.id);
        let result = fx.service().post(new).unwrap();
        let allocation = result.allocation.unwrap();
        assert_eq!(allocation.amount, Money::from_cents(50000));
        assert_eq!(
            fx.storage
                .read(fx.user, |book| Ok(book.goal_current_amount(loan.id)))
                .unwrap(),
            Money::from_cents(50000)
        );
    }

    #[test]
    fn test_update_allows_only_description_and_category() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 0);
        let posted = fx
            .service()
            .post(fx.new_txn(checking.id, -900, "food"))
            .unwrap()
            .transaction;

        let patch = TransactionPatch {
            description: Some("Lunch".into()),
            category_id: Some(fx.category("food/dining_out")),
            ..Default::default()
        };
        let updated = fx.service().update(posted.id, &patch).unwrap();
        assert_eq!(updated.description, "Lunch");
        assert_eq!(updated.version, 2);

        let patch = TransactionPatch {
            amount: Some(12.0),
            ..Default::default()
        };
        let err = fx.service().update(posted.id, &patch).unwrap_err();
        assert!(matches!(err, LedgerError::Immutable { field: "amount" }));
        assert_eq!(fx.service().get(posted.id).unwrap().amount, Money::from_cents(-900));
    }

    #[test]
    fn test_delete_reverses_balance_and_is_pair_aware() {
        let fx = Fixture::new();
        let a = fx.account("A", 100000);
        let b = fx.account("B", 50000);

        let transfer = TransferService::new(&fx.storage, fx.user)
            .post_transfer(a.id, b.id, Money::from_cents(20000), date(5), "move")
            .unwrap();

        let result = fx.service().delete(transfer.to_transaction.id).unwrap();
        assert_eq!(result.removed.len(), 2);
        assert_eq!(fx.balance(a.id), Money::from_cents(100000));
        assert_eq!(fx.balance(b.id), Money::from_cents(50000));
        assert!(fx.service().get(transfer.from_transaction.id).unwrap_err().is_not_found());

        assert!(fx
            .service()
            .delete(transfer.from_transaction.id)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_list_filters() {
        let fx = Fixture::new();
        let checking = fx.account("Checking", 0);
        let service = fx.service();
        service.post(fx.new_txn(checking.id, -100, "food/coffee_shops")).unwrap();
        service.post(fx.new_txn(checking.id, -200, "food/dining_out")).unwrap();
        let mut early = fx.new_txn(checking.id, -300, "home/groceries");
        early.date = date(2);
        service.post(early).unwrap();

        let filter = TransactionFilter {
            category_id: Some(fx.category("food")),
            include_descendants: true,
            ..Default::default()
        };
        assert_eq!(service.list(&filter).unwrap().len(), 2);

        let filter = TransactionFilter {
            category_id: Some(fx.category("food")),
            ..Default::default()
        };
        assert!(service.list(&filter).unwrap().is_empty());

        let all = service.list(&TransactionFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.last().unwrap().date, date(2));

        let filter = TransactionFilter {
            to: Some(date(5)),
            ..Default::default()
        };
        assert_eq!(service.list(&filter).unwrap().len(), 1);
    }
}
