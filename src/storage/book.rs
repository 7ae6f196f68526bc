//! The per-user book
//!
//! A `Book` holds every entity of one user together with secondary indexes.
//! It is only ever mutated inside `Storage::commit`, on a private copy that
//! replaces the shared one once it has been persisted.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    Account, AccountId, Allocation, AllocationId, Budget, BudgetId, BuiltinCategory, Category,
    CategoryId, Goal, GoalId, Money, RecurrenceDefinition, RecurrenceId, Transaction,
    TransactionId, UserId,
};

/// Serializable form of a book, one file per user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct BookData {
    pub user_id: UserId,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub usage_seq: u64,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub recurrences: Vec<RecurrenceDefinition>,
    #[serde(default)]
    pub budgets: Vec<Budget>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
}

/// All data owned by one user
#[derive(Debug, Clone)]
pub struct Book {
    user_id: UserId,
    /// Logical version, bumped by every commit
    version: u64,
    /// Counter handing out category recency stamps
    usage_seq: u64,
    pub(crate) accounts: HashMap<AccountId, Account>,
    pub(crate) categories: HashMap<CategoryId, Category>,
    pub(crate) transactions: HashMap<TransactionId, Transaction>,
    pub(crate) recurrences: HashMap<RecurrenceId, RecurrenceDefinition>,
    pub(crate) budgets: HashMap<BudgetId, Budget>,
    pub(crate) goals: HashMap<GoalId, Goal>,
    pub(crate) allocations: HashMap<AllocationId, Allocation>,
    /// Index: account_id -> transaction_ids
    by_account: HashMap<AccountId, Vec<TransactionId>>,
    /// Index: category_id -> transaction_ids
    by_category: HashMap<CategoryId, Vec<TransactionId>>,
    /// Index: transaction_id -> allocation_ids
    allocations_by_txn: HashMap<TransactionId, Vec<AllocationId>>,
}

impl Book {
    /// Create an empty book
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            version: 0,
            usage_seq: 0,
            accounts: HashMap::new(),
            categories: HashMap::new(),
            transactions: HashMap::new(),
            recurrences: HashMap::new(),
            budgets: HashMap::new(),
            goals: HashMap::new(),
            allocations: HashMap::new(),
            by_account: HashMap::new(),
            by_category: HashMap::new(),
            allocations_by_txn: HashMap::new(),
        }
    }

    pub(crate) fn from_data(data: BookData) -> Self {
        let mut book = Self::new(data.user_id);
        book.version = data.version;
        book.usage_seq = data.usage_seq;
        book.accounts = data.accounts.into_iter().map(|a| (a.id, a)).collect();
        book.categories = data.categories.into_iter().map(|c| (c.id, c)).collect();
        book.transactions = data.transactions.into_iter().map(|t| (t.id, t)).collect();
        book.recurrences = data.recurrences.into_iter().map(|r| (r.id, r)).collect();
        book.budgets = data.budgets.into_iter().map(|b| (b.id, b)).collect();
        book.goals = data.goals.into_iter().map(|g| (g.id, g)).collect();
        book.allocations = data.allocations.into_iter().map(|a| (a.id, a)).collect();
        book.rebuild_indexes();
        book
    }

    pub(crate) fn to_data(&self) -> BookData {
        fn sorted<T: Clone, K>(map: &HashMap<K, T>, key: impl Fn(&T) -> String) -> Vec<T> {
            let mut items: Vec<T> = map.values().cloned().collect();
            items.sort_by_key(|item| key(item));
            items
        }

        let mut transactions: Vec<Transaction> = self.transactions.values().cloned().collect();
        transactions.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));

        BookData {
            user_id: self.user_id,
            version: self.version,
            usage_seq: self.usage_seq,
            accounts: sorted(&self.accounts, |a| a.id.full()),
            categories: sorted(&self.categories, |c| c.id.full()),
            transactions,
            recurrences: sorted(&self.recurrences, |r| r.id.full()),
            budgets: sorted(&self.budgets, |b| b.id.full()),
            goals: sorted(&self.goals, |g| g.id.full()),
            allocations: sorted(&self.allocations, |a| a.id.full()),
        }
    }

    /// Rebuild all secondary indexes from the primary maps
    pub(crate) fn rebuild_indexes(&mut self) {
        self.by_account.clear();
        self.by_category.clear();
        self.allocations_by_txn.clear();

        let Self {
            transactions,
            allocations,
            by_account,
            by_category,
            allocations_by_txn,
            ..
        } = self;

        for txn in transactions.values() {
            by_account.entry(txn.account_id).or_default().push(txn.id);
            if let Some(cat_id) = txn.category_id {
                by_category.entry(cat_id).or_default().push(txn.id);
            }
        }
        for allocation in allocations.values() {
            allocations_by_txn
                .entry(allocation.transaction_id)
                .or_default()
                .push(allocation.id);
        }
    }

    pub(crate) fn index_transaction(&mut self, txn: &Transaction, old: Option<&Transaction>) {
        if let Some(old) = old {
            self.unindex_transaction(old);
        }
        self.by_account.entry(txn.account_id).or_default().push(txn.id);
        if let Some(cat_id) = txn.category_id {
            self.by_category.entry(cat_id).or_default().push(txn.id);
        }
    }

    pub(crate) fn unindex_transaction(&mut self, txn: &Transaction) {
        if let Some(ids) = self.by_account.get_mut(&txn.account_id) {
            ids.retain(|&id| id != txn.id);
        }
        if let Some(cat_id) = txn.category_id {
            if let Some(ids) = self.by_category.get_mut(&cat_id) {
                ids.retain(|&id| id != txn.id);
            }
        }
    }

    pub(crate) fn index_allocation(&mut self, allocation: &Allocation, is_new: bool) {
        if is_new {
            self.allocations_by_txn
                .entry(allocation.transaction_id)
                .or_default()
                .push(allocation.id);
        }
    }

    pub(crate) fn unindex_allocation(&mut self, allocation: &Allocation) {
        if let Some(ids) = self.allocations_by_txn.get_mut(&allocation.transaction_id) {
            ids.retain(|&id| id != allocation.id);
        }
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    pub(crate) fn next_usage_seq(&mut self) -> u64 {
        self.usage_seq += 1;
        self.usage_seq
    }

    // ---- read access ----

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Logical version of the book
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn category(&self, id: CategoryId) -> Option<&Category> {
        self.categories.get(&id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.values()
    }

    pub fn builtin_category(&self, builtin: BuiltinCategory) -> Option<&Category> {
        self.categories
            .values()
            .find(|c| c.builtin == Some(builtin))
    }

    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction> {
        self.transactions.get(&id)
    }

    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.values()
    }

    /// Transactions of an account, in no particular order
    pub fn transactions_for_account(&self, account_id: AccountId) -> Vec<&Transaction> {
        self.by_account
            .get(&account_id)
            .map(|ids| ids.iter().filter_map(|id| self.transactions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Transactions posted to exactly this category
    pub fn transactions_for_category(&self, category_id: CategoryId) -> Vec<&Transaction> {
        self.by_category
            .get(&category_id)
            .map(|ids| ids.iter().filter_map(|id| self.transactions.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn recurrence(&self, id: RecurrenceId) -> Option<&RecurrenceDefinition> {
        self.recurrences.get(&id)
    }

    pub fn recurrences(&self) -> impl Iterator<Item = &RecurrenceDefinition> {
        self.recurrences.values()
    }

    pub fn budget(&self, id: BudgetId) -> Option<&Budget> {
        self.budgets.get(&id)
    }

    pub fn budgets(&self) -> impl Iterator<Item = &Budget> {
        self.budgets.values()
    }

    pub fn goal(&self, id: GoalId) -> Option<&Goal> {
        self.goals.get(&id)
    }

    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.goals.values()
    }

    pub fn allocation(&self, id: AllocationId) -> Option<&Allocation> {
        self.allocations.get(&id)
    }

    /// Allocations drawing on one transaction
    pub fn allocations_for_transaction(&self, transaction_id: TransactionId) -> Vec<&Allocation> {
        self.allocations_by_txn
            .get(&transaction_id)
            .map(|ids| ids.iter().filter_map(|id| self.allocations.get(id)).collect())
            .unwrap_or_default()
    }

    /// Allocations credited to one goal
    pub fn allocations_for_goal(&self, goal_id: GoalId) -> Vec<&Allocation> {
        self.allocations
            .values()
            .filter(|a| a.goal_id == goal_id)
            .collect()
    }

    /// Current amount of a goal: the sum of its allocations
    pub fn goal_current_amount(&self, goal_id: GoalId) -> Money {
        self.allocations_for_goal(goal_id)
            .into_iter()
            .map(|a| a.amount)
            .sum()
    }

    /// Ids of a category and all of its descendants
    pub fn category_subtree(&self, root: CategoryId) -> Vec<CategoryId> {
        let mut children: HashMap<CategoryId, Vec<CategoryId>> = HashMap::new();
        for category in self.categories.values() {
            if let Some(parent) = category.parent_id {
                children.entry(parent).or_default().push(category.id);
            }
        }
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.categories.contains_key(&id) || result.contains(&id) {
                continue;
            }
            result.push(id);
            if let Some(kids) = children.get(&id) {
                stack.extend(kids.iter().copied());
            }
        }
        result
    }

    /// Ancestors of a category, root first and the category itself last
    ///
    /// Stops at a missing parent or if the chain loops back on itself.
    pub fn category_path(&self, id: CategoryId) -> Vec<&Category> {
        let mut path = Vec::new();
        let mut current = self.categories.get(&id);
        while let Some(category) = current {
            if path.iter().any(|c: &&Category| c.id == category.id) {
                break;
            }
            path.push(category);
            current = category.parent_id.and_then(|p| self.categories.get(&p));
        }
        path.reverse();
        path
    }

    /// Balance an account had at the end of `as_of`
    ///
    /// Zero for accounts opened after `as_of`.
    pub fn balance_as_of(&self, account: &Account, as_of: NaiveDate) -> Money {
        if account.opened_on > as_of {
            return Money::zero();
        }
        let posted: Money = self
            .transactions_for_account(account.id)
            .into_iter()
            .filter(|t| t.date <= as_of)
            .map(|t| t.amount)
            .sum();
        account.opening_balance + posted
    }

    /// Opening balance plus every posted amount
    pub fn recomputed_balance(&self, account: &Account) -> Money {
        let posted: Money = self
            .transactions_for_account(account.id)
            .into_iter()
            .map(|t| t.amount)
            .sum();
        account.opening_balance + posted
    }
}
