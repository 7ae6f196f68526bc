//! Budget service
//!
//! Budgets cap spending for a scope of categories over a period. Spending
//! itself is never stored; see `reports::budget_status`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Budget, BudgetFilters, BudgetId, CategoryId, Money, PeriodType, UserId};
use crate::storage::{EntityKey, LastCommit, Storage, UnitOfWork};

/// A new budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBudget {
    pub name: String,
    #[serde(default)]
    pub period_type: PeriodType,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub category_ids: Vec<CategoryId>,
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    pub limit: Money,
    #[serde(default)]
    pub filters: BudgetFilters,
    #[serde(default)]
    pub alert_threshold: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// Service for budget management
pub struct BudgetService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

impl<'a> BudgetService<'a> {
    /// Create a new budget service
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

    /// Create a budget over existing categories
    pub fn create(&self, new: NewBudget) -> LedgerResult<Budget> {
        if !new.limit.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "budget limit must be positive, got {}",
                new.limit
            )));
        }

        let mut category_ids = new.category_ids.clone();
        category_ids.dedup();
        let mut budget = Budget::new(
            self.user_id,
            new.name.trim(),
            new.period_type,
            new.start_date,
            new.end_date,
            category_ids,
            new.limit,
        );
        budget.include_descendants = new.include_descendants;
        budget.filters = new.filters;
        if let Some(threshold) = new.alert_threshold {
            budget.alert_threshold = threshold;
        }
        budget
            .validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        self.storage.with_retry(|| {
            self.storage.read(self.user_id, |book| {
                for id in &budget.category_ids {
                    book.category(*id)
                        .ok_or_else(|| LedgerError::category_not_found(id.to_string()))?;
                }
                Ok(())
            })?;
            let mut uow = UnitOfWork::new();
            uow.put(budget.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)
        })?;

        info!(user = %self.user_id, budget = %budget.id, limit = %budget.limit, "created budget");
        Ok(Budget { version: 1, ..budget })
    }

    /// Get a budget by ID
    pub fn get(&self, id: BudgetId) -> LedgerResult<Budget> {
        self.storage.read(self.user_id, |book| {
            book.budget(id)
                .cloned()
                .ok_or_else(|| LedgerError::budget_not_found(id.to_string()))
        })
    }

    /// List budgets by name
    pub fn list(&self) -> LedgerResult<Vec<Budget>> {
        self.storage.read(self.user_id, |book| {
            let mut budgets: Vec<Budget> = book.budgets().cloned().collect();
            budgets.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            Ok(budgets)
        })
    }

    /// Delete a budget
    pub fn delete(&self, id: BudgetId) -> LedgerResult<Budget> {
        let budget = self.storage.with_retry(|| {
            let budget = self.get(id)?;
            let mut uow = UnitOfWork::new();
            uow.remove(EntityKey::Budget(id), budget.version);
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            Ok(budget)
        })?;

        info!(user = %self.user_id, budget = %id, "deleted budget");
        Ok(budget)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::CategoryService;

    fn setup() -> (Storage, UserId, CategoryId) {
        let storage = Storage::in_memory();
        let user = UserId::new();
        storage.create_user(user).unwrap();
        CategoryService::new(&storage, user).seed_defaults().unwrap();
        let groceries = CategoryService::new(&storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id;
        (storage, user, groceries)
    }

    fn groceries_budget(category: CategoryId, limit: i64) -> NewBudget {
        NewBudget {
            name: "Groceries".into(),
            period_type: PeriodType::Monthly,
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: None,
            category_ids: vec![category],
            include_descendants: true,
            limit: Money::from_cents(limit),
            filters: BudgetFilters::default(),
            alert_threshold: None,
        }
    }

    #[test]
    fn test_create_get_list_delete() {
        let (storage, user, groceries) = setup();
        let service = BudgetService::new(&storage, user);

        let budget = service.create(groceries_budget(groceries, 30000)).unwrap();
        assert_eq!(budget.version, 1);
        assert_eq!(service.get(budget.id).unwrap().limit, Money::from_cents(30000));
        assert_eq!(service.list().unwrap().len(), 1);

        service.delete(budget.id).unwrap();
        assert!(service.get(budget.id).unwrap_err().is_not_found());
        assert!(service.list().unwrap().is_empty());
    }

    #[test]
    fn test_create_validation() {
        let (storage, user, groceries) = setup();
        let service = BudgetService::new(&storage, user);

        let err = service.create(groceries_budget(groceries, 0)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = service
            .create(groceries_budget(CategoryId::new(), 100))
            .unwrap_err();
        assert!(err.is_not_found());

        let mut custom = groceries_budget(groceries, 100);
        custom.period_type = PeriodType::Custom;
        assert!(service.create(custom).unwrap_err().is_validation());

        let mut threshold = groceries_budget(groceries, 100);
        threshold.alert_threshold = Some(1.5);
        assert!(service.create(threshold).unwrap_err().is_validation());
    }
}
