//! Account service
//!
//! Provides business logic for account management including CRUD operations,
//! the configured deletion policy, balance corrections and balance
//! verification.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AccountDeletePolicy;
use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Account, AccountId, AccountType, BuiltinCategory, CreditCardDetails, Money, RecurrenceState,
    Transaction, TransactionId, UserId,
};
use crate::storage::{EntityKey, LastCommit, Storage, UnitOfWork};

use super::transaction::{active_account, LedgerChanges};

/// Service for account management
pub struct AccountService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

/// Editable account fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub credit: Option<CreditCardDetails>,
}

/// What an account deletion did
#[derive(Debug, Clone, Serialize)]
pub struct AccountDeletion {
    pub account_id: AccountId,
    pub policy: AccountDeletePolicy,
    /// Transactions removed, including paired legs in other accounts
    pub removed_transactions: Vec<TransactionId>,
    pub removed_recurrences: usize,
    /// New balances of other accounts touched by removed transfer legs
    pub balances: Vec<(AccountId, Money)>,
}

/// Stored balance compared with the recomputed one
#[derive(Debug, Clone, Serialize)]
pub struct BalanceCheck {
    pub account_id: AccountId,
    pub name: String,
    pub stored: Money,
    pub computed: Money,
}

impl BalanceCheck {
    pub fn drift(&self) -> Money {
        self.stored - self.computed
    }

    pub fn is_consistent(&self) -> bool {
        self.stored == self.computed
    }
}

impl<'a> AccountService<'a> {
    /// Create a new account service
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

    /// Create a new account
    pub fn create(
        &self,
        name: &str,
        account_type: AccountType,
        opening_balance: Money,
        opened_on: NaiveDate,
        credit: Option<CreditCardDetails>,
    ) -> LedgerResult<Account> {
        let name = name.trim();

        let mut account = Account::with_opening_balance(
            self.user_id,
            name,
            account_type,
            opened_on,
            opening_balance,
        );
        account.credit = credit;
        account
            .validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        self.storage.with_retry(|| {
            let duplicate = self.storage.read(self.user_id, |book| {
                Ok(book
                    .accounts()
                    .any(|a| !a.archived && a.name.eq_ignore_ascii_case(name)))
            })?;
            if duplicate {
                return Err(LedgerError::Validation(format!(
                    "An account named '{}' already exists",
                    name
                )));
            }

            let mut uow = UnitOfWork::new();
            uow.put(account.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)
        })?;

        info!(user = %self.user_id, account = %account.id, "created account");
        account.version = 1;
        Ok(account)
    }

    /// Get an account by ID
    pub fn get(&self, id: AccountId) -> LedgerResult<Account> {
        self.storage.read(self.user_id, |book| {
            book.account(id)
                .cloned()
                .ok_or_else(|| LedgerError::account_not_found(id.to_string()))
        })
    }

    /// Find an account by name (case-insensitive) or ID string
    pub fn find(&self, identifier: &str) -> LedgerResult<Option<Account>> {
        self.storage.read(self.user_id, |book| {
            if let Some(account) = book
                .accounts()
                .filter(|a| !a.archived)
                .find(|a| a.name.eq_ignore_ascii_case(identifier))
            {
                return Ok(Some(account.clone()));
            }
            Ok(identifier
                .parse::<AccountId>()
                .ok()
                .and_then(|id| book.account(id))
                .cloned())
        })
    }

    /// List accounts sorted by type then name
    pub fn list(&self, include_archived: bool) -> LedgerResult<Vec<Account>> {
        self.storage.read(self.user_id, |book| {
            let mut accounts: Vec<Account> = book
                .accounts()
                .filter(|a| include_archived || !a.archived)
                .cloned()
                .collect();
            accounts.sort_by(|a, b| {
                a.account_type
                    .cmp(&b.account_type)
                    .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            });
            Ok(accounts)
        })
    }

    /// Update name, notes or credit card details
    pub fn update(&self, id: AccountId, update: &AccountUpdate) -> LedgerResult<Account> {
        self.storage.with_retry(|| {
            let account = self.storage.read(self.user_id, |book| {
                let mut account = book
                    .account(id)
                    .cloned()
                    .ok_or_else(|| LedgerError::account_not_found(id.to_string()))?;

                if let Some(name) = &update.name {
                    let name = name.trim();
                    if book
                        .accounts()
                        .any(|a| a.id != id && !a.archived && a.name.eq_ignore_ascii_case(name))
                    {
                        return Err(LedgerError::Validation(format!(
                            "An account named '{}' already exists",
                            name
                        )));
                    }
                    account.name = name.to_string();
                }
                if let Some(notes) = &update.notes {
                    account.notes.clone_from(notes);
                }
                if let Some(credit) = &update.credit {
                    account.credit = Some(credit.clone());
                }

                account
                    .validate()
                    .map_err(|e| LedgerError::Validation(e.to_string()))?;
                account.updated_at = Utc::now();
                Ok(account)
            })?;

            let mut uow = UnitOfWork::new();
            uow.put(account.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(Account {
                version: account.version + 1,
                ..account
            })
        })
    }

    /// Delete an account according to the configured policy
    pub fn delete(&self, id: AccountId) -> LedgerResult<AccountDeletion> {
        self.delete_with_policy(id, self.storage.settings().account_delete_policy)
    }

    /// Delete an account with an explicit policy
    ///
    /// - `Block` fails with `InUse` while transactions or scheduled
    ///   recurrences reference the account.
    /// - `Cascade` removes its transactions (and their transfer pairs,
    ///   reversing the other accounts' balances), their allocations and its
    ///   recurrences together with the account.
    /// - `Archive` keeps everything and hides the account.
    pub fn delete_with_policy(
        &self,
        id: AccountId,
        policy: AccountDeletePolicy,
    ) -> LedgerResult<AccountDeletion> {
        let deletion = self.storage.with_retry(|| {
            let (uow, deletion) = self.storage.read(self.user_id, |book| {
                let account = book
                    .account(id)
                    .ok_or_else(|| LedgerError::account_not_found(id.to_string()))?;
                let transactions = book.transactions_for_account(id);
                let recurrences: Vec<_> = book
                    .recurrences()
                    .filter(|r| r.template.account_id == id)
                    .collect();

                let mut deletion = AccountDeletion {
                    account_id: id,
                    policy,
                    removed_transactions: Vec::new(),
                    removed_recurrences: 0,
                    balances: Vec::new(),
                };

                let uow = match policy {
                    AccountDeletePolicy::Block => {
                        let scheduled = recurrences
                            .iter()
                            .filter(|r| r.state == RecurrenceState::Scheduled)
                            .count();
                        if !transactions.is_empty() || scheduled > 0 {
                            return Err(LedgerError::InUse(format!(
                                "Account '{}' has {} transactions and {} scheduled recurrences",
                                account.name,
                                transactions.len(),
                                scheduled
                            )));
                        }
                        let mut uow = UnitOfWork::new();
                        for recurrence in &recurrences {
                            uow.remove(EntityKey::Recurrence(recurrence.id), recurrence.version);
                            deletion.removed_recurrences += 1;
                        }
                        uow.remove(EntityKey::Account(id), account.version);
                        uow
                    }
                    AccountDeletePolicy::Cascade => {
                        let mut changes = LedgerChanges::new(book);
                        for txn in &transactions {
                            changes.remove_transaction(txn.id)?;
                        }
                        for recurrence in &recurrences {
                            changes
                                .uow_mut()
                                .remove(EntityKey::Recurrence(recurrence.id), recurrence.version);
                            deletion.removed_recurrences += 1;
                        }
                        deletion.removed_transactions = changes.removed().to_vec();
                        let (mut uow, accounts) = changes.finish();
                        deletion.balances = accounts
                            .iter()
                            .filter(|a| a.id != id)
                            .map(|a| (a.id, a.balance))
                            .collect();
                        uow.remove(EntityKey::Account(id), account.version);
                        uow
                    }
                    AccountDeletePolicy::Archive => {
                        let mut archived = account.clone();
                        archived.archive();
                        let mut uow = UnitOfWork::new();
                        uow.put(archived);
                        uow
                    }
                };
                Ok((uow, deletion))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(deletion)
        })?;

        info!(
            user = %self.user_id,
            account = %id,
            policy = ?policy,
            transactions = deletion.removed_transactions.len(),
            "deleted account"
        );
        Ok(deletion)
    }

    /// Bring the balance to `target` with a balance-correction posting
    ///
    /// Returns `None` when the balance already matches.
    pub fn correct_balance(
        &self,
        id: AccountId,
        target: Money,
        date: NaiveDate,
    ) -> LedgerResult<Option<Transaction>> {
        let posted = self.storage.with_retry(|| {
            let staged = self.storage.read(self.user_id, |book| {
                let account = active_account(book, id)?;
                let delta = target.checked_sub(account.balance)?;
                if delta.is_zero() {
                    return Ok(None);
                }
                let category = book
                    .builtin_category(BuiltinCategory::BalanceCorrection)
                    .ok_or_else(|| {
                        LedgerError::category_not_found(BuiltinCategory::BalanceCorrection.name())
                    })?;

                let txn = Transaction::new(self.user_id, id, delta, Some(category.id), date)
                    .with_description(format!("Balance correction to {}", target));
                let mut changes = LedgerChanges::new(book);
                changes.post(txn.clone())?;
                let (uow, _) = changes.finish();
                Ok(Some((uow, txn)))
            })?;

            match staged {
                Some((uow, txn)) => {
                    self.last_commit.commit(self.storage, self.user_id, uow)?;
                    Ok(Some(Transaction { version: 1, ..txn }))
                }
                None => Ok(None),
            }
        })?;

        if let Some(txn) = &posted {
            info!(user = %self.user_id, account = %id, delta = %txn.amount, "corrected balance");
        }
        Ok(posted)
    }

    /// Recompute every account balance from its postings and compare with
    /// the stored one
    pub fn verify_balances(&self) -> LedgerResult<Vec<BalanceCheck>> {
        let checks = self.storage.read(self.user_id, |book| {
            let mut checks: Vec<BalanceCheck> = book
                .accounts()
                .map(|a| BalanceCheck {
                    account_id: a.id,
                    name: a.name.clone(),
                    stored: a.balance,
                    computed: book.recomputed_balance(a),
                })
                .collect();
            checks.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(checks)
        })?;

        for check in checks.iter().filter(|c| !c.is_consistent()) {
            warn!(
                user = %self.user_id,
                account = %check.account_id,
                stored = %check.stored,
                computed = %check.computed,
                "account balance drift"
            );
        }
        Ok(checks)
    }

    /// Overwrite drifted stored balances with the recomputed ones
    pub fn repair_balances(&self) -> LedgerResult<Vec<BalanceCheck>> {
        self.storage.with_retry(|| {
            let (uow, repaired) = self.storage.read(self.user_id, |book| {
                let mut uow = UnitOfWork::new();
                let mut repaired = Vec::new();
                for account in book.accounts() {
                    let computed = book.recomputed_balance(account);
                    if computed != account.balance {
                        repaired.push(BalanceCheck {
                            account_id: account.id,
                            name: account.name.clone(),
                            stored: account.balance,
                            computed,
                        });
                        let mut fixed = account.clone();
                        fixed.balance = computed;
                        fixed.updated_at = Utc::now();
                        uow.put(fixed);
                    }
                }
                Ok((uow, repaired))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(repaired)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::services::transaction::NewTransaction;
    use crate::services::{CategoryService, TransactionService, TransferService};
    use crate::models::{CategoryId, SpecialType};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, day).unwrap()
    }

    fn setup_with(settings: Settings) -> (Storage, UserId) {
        let storage = Storage::in_memory_with(settings);
        let user = UserId::new();
        storage.create_user(user).unwrap();
        CategoryService::new(&storage, user).seed_defaults().unwrap();
        (storage, user)
    }

    fn setup() -> (Storage, UserId) {
        setup_with(Settings::default())
    }

    fn groceries(storage: &Storage, user: UserId) -> CategoryId {
        CategoryService::new(storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id
    }

    fn spend(storage: &Storage, user: UserId, account: AccountId, cents: i64) -> Transaction {
        TransactionService::new(storage, user)
            .post(NewTransaction {
                account_id: account,
                amount: Money::from_cents(cents),
                category_id: groceries(storage, user),
                special_type: SpecialType::Default,
                description: String::new(),
                date: date(3),
                goal_id: None,
            })
            .unwrap()
            .transaction
    }

    #[test]
    fn test_create_account() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);

        let account = service
            .create("Checking", AccountType::Checking, Money::from_cents(100000), date(1), None)
            .unwrap();
        assert_eq!(account.balance, Money::from_cents(100000));
        assert_eq!(account.version, 1);

        let err = service
            .create("checking", AccountType::Savings, Money::zero(), date(1), None)
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_credit_details_only_on_credit_cards() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let details = CreditCardDetails {
            credit_limit: Some(Money::from_cents(500000)),
            apr: Some(19.99),
            ..Default::default()
        };

        assert!(service
            .create("Savings", AccountType::Savings, Money::zero(), date(1), Some(details.clone()))
            .unwrap_err()
            .is_validation());

        let card = service
            .create(
                "Visa",
                AccountType::CreditCard,
                Money::from_cents(-125000),
                date(1),
                Some(details),
            )
            .unwrap();
        assert_eq!(card.available_credit(), Some(Money::from_cents(375000)));
        assert_eq!(card.utilization(), Some(0.25));
    }

    #[test]
    fn test_update_and_find() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let account = service
            .create("Checking", AccountType::Checking, Money::zero(), date(1), None)
            .unwrap();

        let update = AccountUpdate {
            name: Some("Main Checking".into()),
            notes: Some("joint".into()),
            ..Default::default()
        };
        let updated = service.update(account.id, &update).unwrap();
        assert_eq!(updated.name, "Main Checking");
        assert_eq!(updated.version, 2);

        assert_eq!(service.find("main checking").unwrap().unwrap().id, account.id);
        assert!(service.find("nope").unwrap().is_none());
    }

    #[test]
    fn test_block_policy_refuses_referenced_account() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let account = service
            .create("Checking", AccountType::Checking, Money::zero(), date(1), None)
            .unwrap();
        spend(&storage, user, account.id, -500);

        let err = service
            .delete_with_policy(account.id, AccountDeletePolicy::Block)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InUse(_)));

        let empty = service
            .create("Spare", AccountType::Cash, Money::zero(), date(1), None)
            .unwrap();
        service
            .delete_with_policy(empty.id, AccountDeletePolicy::Block)
            .unwrap();
        assert!(service.get(empty.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_cascade_policy_removes_transfer_pairs() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let a = service
            .create("A", AccountType::Checking, Money::from_cents(100000), date(1), None)
            .unwrap();
        let b = service
            .create("B", AccountType::Savings, Money::from_cents(50000), date(1), None)
            .unwrap();
        spend(&storage, user, a.id, -500);
        TransferService::new(&storage, user)
            .post_transfer(a.id, b.id, Money::from_cents(20000), date(2), "")
            .unwrap();

        let deletion = service
            .delete_with_policy(a.id, AccountDeletePolicy::Cascade)
            .unwrap();
        assert_eq!(deletion.removed_transactions.len(), 3);
        assert_eq!(deletion.balances, vec![(b.id, Money::from_cents(50000))]);
        assert_eq!(service.get(b.id).unwrap().balance, Money::from_cents(50000));
        assert!(service.get(a.id).unwrap_err().is_not_found());
        assert!(storage
            .read(user, |book| Ok(book.transactions().count()))
            .unwrap()
            == 0);
    }

    #[test]
    fn test_archive_policy_hides_account() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let account = service
            .create("Old", AccountType::Checking, Money::zero(), date(1), None)
            .unwrap();
        spend(&storage, user, account.id, -500);

        service
            .delete_with_policy(account.id, AccountDeletePolicy::Archive)
            .unwrap();
        assert!(service.list(false).unwrap().is_empty());
        assert_eq!(service.list(true).unwrap().len(), 1);
        assert!(service
            .correct_balance(account.id, Money::zero(), date(5))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_correct_balance_posts_delta() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let account = service
            .create("Checking", AccountType::Checking, Money::from_cents(10000), date(1), None)
            .unwrap();

        let txn = service
            .correct_balance(account.id, Money::from_cents(12345), date(5))
            .unwrap()
            .unwrap();
        assert_eq!(txn.amount, Money::from_cents(2345));
        assert_eq!(service.get(account.id).unwrap().balance, Money::from_cents(12345));
        assert!(service
            .correct_balance(account.id, Money::from_cents(12345), date(6))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_verify_and_repair_balances() {
        let (storage, user) = setup();
        let service = AccountService::new(&storage, user);
        let account = service
            .create("Checking", AccountType::Checking, Money::from_cents(10000), date(1), None)
            .unwrap();
        spend(&storage, user, account.id, -2500);
        assert!(service.verify_balances().unwrap().iter().all(BalanceCheck::is_consistent));

        // simulate drift in the stored balance
        let mut drifted = service.get(account.id).unwrap();
        drifted.balance = Money::from_cents(1);
        let mut uow = UnitOfWork::new();
        uow.put(drifted);
        storage.commit(user, uow).unwrap();

        let checks = service.verify_balances().unwrap();
        assert_eq!(checks[0].drift(), Money::from_cents(1 - 7500));

        assert_eq!(service.repair_balances().unwrap().len(), 1);
        assert_eq!(service.get(account.id).unwrap().balance, Money::from_cents(7500));
    }
}
