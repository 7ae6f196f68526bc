//! Goal service
//!
//! Goals track savings targets and loans. Progress is derived from the
//! allocations that credit parts of transactions to a goal; allocations of one
//! transaction never exceed its magnitude.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    Allocation, Goal, GoalId, GoalProgress, GoalProjection, GoalStatus, GoalType, Money,
    TransactionId, UserId,
};
use crate::reports::monthly_surplus;
use crate::storage::{Book, EntityKey, LastCommit, Storage, UnitOfWork};

use super::transaction::LedgerChanges;

/// Result of an allocation change
#[derive(Debug, Clone, Serialize)]
pub struct AllocationResult {
    /// The allocation after the change, `None` once unlinked
    pub allocation: Option<Allocation>,
    pub progress: GoalProgress,
}

/// Service for goals and allocations
pub struct GoalService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

fn find_goal(book: &Book, id: GoalId) -> LedgerResult<&Goal> {
    book.goal(id)
        .ok_or_else(|| LedgerError::goal_not_found(id.to_string()))
}

impl<'a> GoalService<'a> {
    /// Create a new goal service
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

    /// Create a goal
    pub fn create(
        &self,
        name: &str,
        goal_type: GoalType,
        target: Money,
        target_date: NaiveDate,
        priority: Option<u32>,
    ) -> LedgerResult<Goal> {
        if !target.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "goal target must be positive, got {}",
                target
            )));
        }
        let mut goal = Goal::new(self.user_id, name.trim(), goal_type, target, target_date);
        if let Some(priority) = priority {
            goal.priority = priority;
        }
        goal.validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        self.storage.with_retry(|| {
            let mut uow = UnitOfWork::new();
            uow.put(goal.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)
        })?;

        info!(user = %self.user_id, goal = %goal.id, kind = %goal_type, "created goal");
        Ok(Goal { version: 1, ..goal })
    }

    /// Get a goal by ID
    pub fn get(&self, id: GoalId) -> LedgerResult<Goal> {
        self.storage
            .read(self.user_id, |book| find_goal(book, id).cloned())
    }

    /// List goals, highest priority first, then by target date
    pub fn list(&self, include_abandoned: bool) -> LedgerResult<Vec<Goal>> {
        self.storage.read(self.user_id, |book| {
            let mut goals: Vec<Goal> = book
                .goals()
                .filter(|g| include_abandoned || g.status != GoalStatus::Abandoned)
                .cloned()
                .collect();
            goals.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.target_date.cmp(&b.target_date))
                    .then_with(|| a.name.cmp(&b.name))
            });
            Ok(goals)
        })
    }

    /// Credit `amount` of a transaction to a goal
    ///
    /// Allocating again to the same goal from the same transaction adds to
    /// the existing allocation.
    pub fn allocate(
        &self,
        goal_id: GoalId,
        transaction_id: TransactionId,
        amount: Money,
    ) -> LedgerResult<AllocationResult> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "allocation amount must be positive, got {}",
                amount
            )));
        }

        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                let goal = find_goal(book, goal_id)?;
                if !goal.accepts_allocations() {
                    return Err(LedgerError::Validation(format!(
                        "Goal '{}' is abandoned",
                        goal.name
                    )));
                }
                let txn = book
                    .transaction(transaction_id)
                    .ok_or_else(|| LedgerError::transaction_not_found(transaction_id.to_string()))?;

                let existing = book.allocations_for_transaction(transaction_id);
                let allocated: Money = existing.iter().map(|a| a.amount).sum();
                let magnitude = txn.amount.abs();
                let total = allocated.checked_add(amount)?;
                if total > magnitude {
                    return Err(LedgerError::ExceedsTransaction {
                        transaction: transaction_id.to_string(),
                        allocated: allocated.cents(),
                        requested: amount.cents(),
                        available: (magnitude - allocated).cents(),
                    });
                }

                let allocation = match existing.iter().find(|a| a.goal_id == goal_id) {
                    Some(current) => Allocation {
                        amount: current.amount + amount,
                        updated_at: Utc::now(),
                        ..(*current).clone()
                    },
                    None => Allocation::new(self.user_id, goal_id, transaction_id, amount),
                };

                let mut changes = LedgerChanges::new(book);
                changes.credit_goal(goal_id, amount);
                // Re-staging the transaction serializes allocators of one transaction
                changes.uow_mut().put(txn.clone());
                changes.uow_mut().put(allocation.clone());
                let (uow, _) = changes.finish();

                let current = book.goal_current_amount(goal_id) + amount;
                Ok((
                    uow,
                    AllocationResult {
                        allocation: Some(Allocation {
                            version: allocation.version + 1,
                            ..allocation
                        }),
                        progress: GoalProgress::compute(goal_id, current, goal.target_amount),
                    },
                ))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(result)
        })?;

        info!(
            user = %self.user_id,
            goal = %goal_id,
            transaction = %transaction_id,
            amount = %amount,
            "allocated to goal"
        );
        Ok(result)
    }

    /// Remove the allocation linking a transaction to a goal
    pub fn unlink(
        &self,
        goal_id: GoalId,
        transaction_id: TransactionId,
    ) -> LedgerResult<AllocationResult> {
        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                let goal = find_goal(book, goal_id)?;
                let allocation = book
                    .allocations_for_transaction(transaction_id)
                    .into_iter()
                    .find(|a| a.goal_id == goal_id)
                    .ok_or_else(|| {
                        LedgerError::allocation_not_found(format!(
                            "{} -> {}",
                            transaction_id, goal_id
                        ))
                    })?;

                let mut changes = LedgerChanges::new(book);
                changes.credit_goal(goal_id, -allocation.amount);
                changes
                    .uow_mut()
                    .remove(EntityKey::Allocation(allocation.id), allocation.version);
                let (uow, _) = changes.finish();

                let current = book.goal_current_amount(goal_id) - allocation.amount;
                Ok((
                    uow,
                    AllocationResult {
                        allocation: None,
                        progress: GoalProgress::compute(goal_id, current, goal.target_amount),
                    },
                ))
            })?;
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(result)
        })?;

        info!(user = %self.user_id, goal = %goal_id, transaction = %transaction_id, "unlinked allocation");
        Ok(result)
    }

    /// Current progress of a goal
    pub fn progress(&self, goal_id: GoalId) -> LedgerResult<GoalProgress> {
        self.storage.read(self.user_id, |book| {
            let goal = find_goal(book, goal_id)?;
            Ok(GoalProgress::compute(
                goal_id,
                book.goal_current_amount(goal_id),
                goal.target_amount,
            ))
        })
    }

    /// Forecast for a goal at the monthly surplus of the trailing health
    /// window ending `as_of`
    pub fn projection(&self, goal_id: GoalId, as_of: NaiveDate) -> LedgerResult<GoalProjection> {
        let window_days = self.storage.settings().health.trailing_window_days;
        self.storage.read(self.user_id, |book| {
            let goal = find_goal(book, goal_id)?;
            let progress =
                GoalProgress::compute(goal_id, book.goal_current_amount(goal_id), goal.target_amount);
            let available = monthly_surplus(book, as_of, window_days)?;
            Ok(GoalProjection::compute(&progress, goal.target_date, as_of, available))
        })
    }

    /// Allocations credited to a goal, oldest first
    pub fn allocations(&self, goal_id: GoalId) -> LedgerResult<Vec<Allocation>> {
        self.storage.read(self.user_id, |book| {
            find_goal(book, goal_id)?;
            let mut allocations: Vec<Allocation> = book
                .allocations_for_goal(goal_id)
                .into_iter()
                .cloned()
                .collect();
            allocations.sort_by_key(|a| a.created_at);
            Ok(allocations)
        })
    }

    /// Stop tracking a goal; its allocations are kept
    pub fn abandon(&self, goal_id: GoalId) -> LedgerResult<Goal> {
        let goal = self.storage.with_retry(|| {
            let goal = self.storage.read(self.user_id, |book| {
                let mut goal = find_goal(book, goal_id)?.clone();
                goal.status = GoalStatus::Abandoned;
                goal.updated_at = Utc::now();
                Ok(goal)
            })?;
            let mut uow = UnitOfWork::new();
            uow.put(goal.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(Goal {
                version: goal.version + 1,
                ..goal
            })
        })?;

        info!(user = %self.user_id, goal = %goal_id, "abandoned goal");
        Ok(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, AccountType, CategoryId, SpecialType};
    use crate::services::{AccountService, CategoryService, NewTransaction, TransactionService};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    struct Fixture {
        storage: Storage,
        user: UserId,
        account: AccountId,
        category: CategoryId,
    }

    fn fixture() -> Fixture {
        fixture_with(crate::config::Settings::default())
    }

    fn fixture_with(settings: crate::config::Settings) -> Fixture {
        let storage = Storage::in_memory_with(settings);
        let user = UserId::new();
        storage.create_user(user).unwrap();
        CategoryService::new(&storage, user).seed_defaults().unwrap();
        let category = CategoryService::new(&storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id;
        let account = AccountService::new(&storage, user)
            .create("Checking", AccountType::Checking, Money::from_cents(500000), date(), None)
            .unwrap()
            .id;
        Fixture {
            storage,
            user,
            account,
            category,
        }
    }

    fn post(f: &Fixture, cents: i64) -> TransactionId {
        TransactionService::new(&f.storage, f.user)
            .post(NewTransaction {
                account_id: f.account,
                amount: Money::from_cents(cents),
                category_id: f.category,
                special_type: SpecialType::Default,
                description: String::new(),
                date: date(),
                goal_id: None,
            })
            .unwrap()
            .transaction
            .id
    }

    fn savings_goal(f: &Fixture, target: i64) -> Goal {
        GoalService::new(&f.storage, f.user)
            .create(
                "Emergency fund",
                GoalType::Savings,
                Money::from_cents(target),
                NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_create_rejects_non_positive_target() {
        let f = fixture();
        let err = GoalService::new(&f.storage, f.user)
            .create("Nothing", GoalType::Savings, Money::zero(), date(), None)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn test_allocate_and_progress() {
        let f = fixture();
        let goal = savings_goal(&f, 100000);
        let txn = post(&f, -30000);
        let service = GoalService::new(&f.storage, f.user);

        let result = service.allocate(goal.id, txn, Money::from_cents(25000)).unwrap();
        assert_eq!(result.progress.current, Money::from_cents(25000));
        assert_eq!(result.progress.next_milestone, Some(50));
        assert_eq!(result.progress.reached_milestones, vec![25]);

        // Topping up merges into the same allocation
        service.allocate(goal.id, txn, Money::from_cents(5000)).unwrap();
        let allocations = service.allocations(goal.id).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].amount, Money::from_cents(30000));

        let progress = service.progress(goal.id).unwrap();
        assert_eq!(progress.current, Money::from_cents(30000));
        assert!((progress.percent_complete - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_cannot_exceed_transaction() {
        let f = fixture();
        let first = savings_goal(&f, 100000);
        let second = savings_goal(&f, 100000);
        let txn = post(&f, -10000);
        let service = GoalService::new(&f.storage, f.user);

        service.allocate(first.id, txn, Money::from_cents(6000)).unwrap();
        let err = service
            .allocate(second.id, txn, Money::from_cents(4001))
            .unwrap_err();
        match err {
            LedgerError::ExceedsTransaction {
                allocated,
                requested,
                available,
                ..
            } => {
                assert_eq!(allocated, 6000);
                assert_eq!(requested, 4001);
                assert_eq!(available, 4000);
            }
            other => panic!("unexpected error: {other}"),
        }
        service.allocate(second.id, txn, Money::from_cents(4000)).unwrap();

        let err = service.allocate(first.id, txn, Money::from_cents(1)).unwrap_err();
        assert!(matches!(err, LedgerError::ExceedsTransaction { .. }));
    }

    #[test]
    fn test_allocation_conservation() {
        let f = fixture();
        let goals: Vec<Goal> = (0..3).map(|_| savings_goal(&f, 1_000_000)).collect();
        let txns: Vec<TransactionId> = [-5000, 12000, -777].iter().map(|c| post(&f, *c)).collect();
        let service = GoalService::new(&f.storage, f.user);

        for (i, txn) in txns.iter().enumerate() {
            for step in 0..10 {
                let goal = &goals[(i + step) % goals.len()];
                let _ = service.allocate(goal.id, *txn, Money::from_cents(1000));
            }
        }

        f.storage
            .read(f.user, |book| {
                for txn_id in &txns {
                    let magnitude = book.transaction(*txn_id).unwrap().amount.abs();
                    let allocated: Money = book
                        .allocations_for_transaction(*txn_id)
                        .into_iter()
                        .map(|a| a.amount)
                        .sum();
                    assert!(allocated <= magnitude);
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_unlink() {
        let f = fixture();
        let goal = savings_goal(&f, 10000);
        let txn = post(&f, -10000);
        let service = GoalService::new(&f.storage, f.user);

        service.allocate(goal.id, txn, Money::from_cents(10000)).unwrap();
        assert_eq!(service.get(goal.id).unwrap().status, GoalStatus::Completed);

        let result = service.unlink(goal.id, txn).unwrap();
        assert!(result.allocation.is_none());
        assert_eq!(result.progress.current, Money::zero());
        assert_eq!(service.get(goal.id).unwrap().status, GoalStatus::Active);

        let err = service.unlink(goal.id, txn).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_deleting_transaction_drops_allocation() {
        let f = fixture();
        let goal = savings_goal(&f, 10000);
        let txn = post(&f, -4000);
        let service = GoalService::new(&f.storage, f.user);
        service.allocate(goal.id, txn, Money::from_cents(4000)).unwrap();

        TransactionService::new(&f.storage, f.user).delete(txn).unwrap();
        assert_eq!(service.progress(goal.id).unwrap().current, Money::zero());
        assert!(service.allocations(goal.id).unwrap().is_empty());
    }

    #[test]
    fn test_abandoned_goal_rejects_allocations() {
        let f = fixture();
        let goal = savings_goal(&f, 10000);
        let txn = post(&f, -4000);
        let service = GoalService::new(&f.storage, f.user);

        let abandoned = service.abandon(goal.id).unwrap();
        assert_eq!(abandoned.status, GoalStatus::Abandoned);
        assert!(service.list(false).unwrap().is_empty());
        assert_eq!(service.list(true).unwrap().len(), 1);

        let err = service
            .allocate(goal.id, txn, Money::from_cents(100))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_concurrent_allocations_respect_transaction() {
        let mut settings = crate::config::Settings::default();
        settings.retry.max_attempts = 200;
        let f = fixture_with(settings);

        for _ in 0..10 {
            let goals = [savings_goal(&f, 100000), savings_goal(&f, 100000)];
            let txn = post(&f, -10000);

            let outcomes: Vec<LedgerResult<AllocationResult>> = std::thread::scope(|scope| {
                let handles: Vec<_> = goals
                    .iter()
                    .map(|goal| {
                        let f = &f;
                        scope.spawn(move || {
                            GoalService::new(&f.storage, f.user).allocate(
                                goal.id,
                                txn,
                                Money::from_cents(6000),
                            )
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
            assert!(outcomes
                .iter()
                .any(|o| matches!(o, Err(LedgerError::ExceedsTransaction { .. }))));

            let allocated: Money = f
                .storage
                .read(f.user, |book| {
                    Ok(book
                        .allocations_for_transaction(txn)
                        .into_iter()
                        .map(|a| a.amount)
                        .sum())
                })
                .unwrap();
            assert_eq!(allocated, Money::from_cents(6000));
        }
    }

    #[test]
    fn test_projection_uses_trailing_surplus() {
        let f = fixture();
        let salary = CategoryService::new(&f.storage, f.user)
            .find("income/salary")
            .unwrap()
            .unwrap()
            .id;
        TransactionService::new(&f.storage, f.user)
            .post(NewTransaction {
                account_id: f.account,
                amount: Money::from_cents(300000),
                category_id: salary,
                special_type: SpecialType::Default,
                description: String::new(),
                date: date(),
                goal_id: None,
            })
            .unwrap();
        let goal = savings_goal(&f, 100000);
        let txn = post(&f, -30000);
        let service = GoalService::new(&f.storage, f.user);
        service.allocate(goal.id, txn, Money::from_cents(30000)).unwrap();

        let as_of = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let projection = service.projection(goal.id, as_of).unwrap();
        // 2700.00 net over 90 days
        assert_eq!(projection.monthly_available, Money::from_cents(90000));
        assert_eq!(projection.months_remaining, 7);
        assert_eq!(projection.monthly_needed, Money::from_cents(10000));
        assert_eq!(projection.status, crate::models::ProjectionStatus::OnTrack);
        assert_eq!(
            projection.estimated_completion,
            NaiveDate::from_ymd_opt(2025, 7, 30)
        );

        let err = service.projection(GoalId::new(), as_of).unwrap_err();
        assert!(err.is_not_found());
    }
}
