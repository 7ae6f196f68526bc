//! Budget Status Report
//!
//! Spending against a budget's limit for the window containing a given day.
//! Spent is the negated sum of the counted amounts, so refunds lower it.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Budget, BudgetId, CategoryId, DateRange, Money, UserId};
use crate::storage::{Book, Storage};

/// Spending of one in-scope category
#[derive(Debug, Clone, Serialize)]
pub struct CategorySpending {
    pub category_id: CategoryId,
    /// Slash-separated path, e.g. `home/groceries`
    pub path: String,
    pub spent: Money,
    pub transaction_count: usize,
}

/// Status of one budget
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatusReport {
    pub budget_id: BudgetId,
    pub name: String,
    /// Window evaluated, `None` when the budget does not apply on `as_of`
    pub window: Option<DateRange>,
    pub limit: Money,
    pub spent: Money,
    pub remaining: Money,
    /// Spent as a percentage of the limit
    pub percent_used: f64,
    pub is_near_limit: bool,
    pub is_overspent: bool,
    /// Every in-scope category, including those with no spending
    pub categories: Vec<CategorySpending>,
}

/// Categories a budget covers
fn scope(book: &Book, budget: &Budget) -> Vec<CategoryId> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for root in &budget.category_ids {
        let covered = if budget.include_descendants {
            book.category_subtree(*root)
        } else if book.category(*root).is_some() {
            vec![*root]
        } else {
            Vec::new()
        };
        for id in covered {
            if seen.insert(id) {
                ids.push(id);
            }
        }
    }
    ids
}

fn path_string(book: &Book, id: CategoryId) -> String {
    book.category_path(id)
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join("/")
}

impl BudgetStatusReport {
    /// Compute the status of a budget from a book
    pub fn compute(book: &Book, budget: &Budget, as_of: NaiveDate) -> LedgerResult<Self> {
        let window = budget.window(as_of);
        let in_scope = scope(book, budget);

        let mut per_category: HashMap<CategoryId, (Money, usize)> = in_scope
            .iter()
            .map(|id| (*id, (Money::zero(), 0)))
            .collect();

        if let Some(window) = window {
            for category_id in &in_scope {
                let Some(category) = book.category(*category_id) else {
                    continue;
                };
                for txn in book.transactions_for_category(*category_id) {
                    if !window.contains(txn.date) || txn.is_transfer() {
                        continue;
                    }
                    if !budget.filters.admits(
                        category.kind,
                        txn.special_type,
                        category.is_balance_correction(),
                    ) {
                        continue;
                    }
                    if let Some(entry) = per_category.get_mut(category_id) {
                        entry.0 = entry.0.checked_sub(txn.amount)?;
                        entry.1 += 1;
                    }
                }
            }
        }

        let mut categories: Vec<CategorySpending> = in_scope
            .iter()
            .map(|id| {
                let (spent, transaction_count) = per_category.get(id).copied().unwrap_or_default();
                CategorySpending {
                    category_id: *id,
                    path: path_string(book, *id),
                    spent,
                    transaction_count,
                }
            })
            .collect();
        categories.sort_by(|a, b| a.path.cmp(&b.path));

        let spent = Money::checked_sum(categories.iter().map(|c| c.spent))?;
        let percent_used = if budget.limit.is_positive() {
            spent.cents() as f64 * 100.0 / budget.limit.cents() as f64
        } else {
            0.0
        };

        Ok(Self {
            budget_id: budget.id,
            name: budget.name.clone(),
            window,
            limit: budget.limit,
            spent,
            remaining: budget.limit.checked_sub(spent)?,
            percent_used,
            is_near_limit: percent_used >= budget.alert_threshold * 100.0,
            is_overspent: spent > budget.limit,
            categories,
        })
    }

    /// Generate the status of one budget
    pub fn generate(
        storage: &Storage,
        user_id: UserId,
        budget_id: BudgetId,
        as_of: NaiveDate,
    ) -> LedgerResult<Self> {
        storage.read(user_id, |book| {
            let budget = book
                .budget(budget_id)
                .ok_or_else(|| LedgerError::budget_not_found(budget_id.to_string()))?;
            Self::compute(book, budget, as_of)
        })
    }

    /// Status of every budget of a user
    pub fn generate_all(storage: &Storage, user_id: UserId, as_of: NaiveDate) -> LedgerResult<Vec<Self>> {
        storage.read(user_id, |book| {
            let mut reports = book
                .budgets()
                .map(|budget| Self::compute(book, budget, as_of))
                .collect::<LedgerResult<Vec<_>>>()?;
            reports.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
            Ok(reports)
        })
    }

    /// Format the report for terminal display
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Budget: {}\n", self.name));
        match self.window {
            Some(window) => output.push_str(&format!("Period: {}\n", window)),
            None => output.push_str("Period: not active\n"),
        }
        output.push_str(&"=".repeat(50));
        output.push('\n');

        let status = if self.is_overspent {
            "OVERSPENT"
        } else if self.is_near_limit {
            "NEAR LIMIT"
        } else {
            "OK"
        };
        output.push_str(&format!("Limit:     {:>14}\n", self.limit));
        output.push_str(&format!("Spent:     {:>14}  ({:.1}%)\n", self.spent, self.percent_used));
        output.push_str(&format!("Remaining: {:>14}  {}\n", self.remaining, status));
        output.push('\n');

        for category in &self.categories {
            output.push_str(&format!(
                "  {:<36} {:>12} {:>4}\n",
                category.path, category.spent, category.transaction_count
            ));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AccountId, AccountType, BudgetFilters, GoalType, PeriodType, SpecialType};
    use crate::services::{
        AccountService, BudgetService, CategoryService, GoalService, NewBudget, NewTransaction,
        TransactionService, TransferService,
    };

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    struct Fixture {
        storage: Storage,
        user: UserId,
        checking: AccountId,
        savings: AccountId,
    }

    impl Fixture {
        fn new() -> Self {
            let storage = Storage::in_memory();
            let user = UserId::new();
            storage.create_user(user).unwrap();
            CategoryService::new(&storage, user).seed_defaults().unwrap();
            let accounts = AccountService::new(&storage, user);
            let checking = accounts
                .create("Checking", AccountType::Checking, Money::from_cents(500000), day(1, 1), None)
                .unwrap()
                .id;
            let savings = accounts
                .create("Savings", AccountType::Savings, Money::zero(), day(1, 1), None)
                .unwrap()
                .id;
            Self {
                storage,
                user,
                checking,
                savings,
            }
        }

        fn category(&self, path: &str) -> CategoryId {
            CategoryService::new(&self.storage, self.user)
                .find(path)
                .unwrap()
                .unwrap()
                .id
        }

        fn post(&self, path: &str, cents: i64, date: NaiveDate, special_type: SpecialType) {
            self.post_with_goal(path, cents, date, special_type, None);
        }

        fn post_with_goal(
            &self,
            path: &str,
            cents: i64,
            date: NaiveDate,
            special_type: SpecialType,
            goal_id: Option<crate::models::GoalId>,
        ) {
            TransactionService::new(&self.storage, self.user)
                .post(NewTransaction {
                    account_id: self.checking,
                    amount: Money::from_cents(cents),
                    category_id: self.category(path),
                    special_type,
                    description: String::new(),
                    date,
                    goal_id,
                })
                .unwrap();
        }

        fn budget(&self, paths: &[&str], limit: i64, filters: BudgetFilters) -> BudgetId {
            BudgetService::new(&self.storage, self.user)
                .create(NewBudget {
                    name: "Groceries".into(),
                    period_type: PeriodType::Monthly,
                    start_date: day(1, 1),
                    end_date: None,
                    category_ids: paths.iter().map(|p| self.category(p)).collect(),
                    include_descendants: true,
                    limit: Money::from_cents(limit),
                    filters,
                    alert_threshold: None,
                })
                .unwrap()
                .id
        }

        fn status(&self, budget: BudgetId, as_of: NaiveDate) -> BudgetStatusReport {
            BudgetStatusReport::generate(&self.storage, self.user, budget, as_of).unwrap()
        }
    }

    #[test]
    fn test_groceries_budget() {
        let f = Fixture::new();
        let budget = f.budget(&["home/groceries"], 30000, BudgetFilters::default());

        f.post("home/groceries", -2500, day(3, 3), SpecialType::Default);
        f.post("home/groceries/fresh_produce", -1500, day(3, 12), SpecialType::Default);
        // Outside the window, outside the scope, and a transfer
        f.post("home/groceries", -9900, day(2, 27), SpecialType::Default);
        f.post("food/dining_out", -4000, day(3, 5), SpecialType::Default);
        TransferService::new(&f.storage, f.user)
            .post_transfer(f.checking, f.savings, Money::from_cents(10000), day(3, 6), "")
            .unwrap();

        let status = f.status(budget, day(3, 20));
        assert_eq!(status.window, Some(DateRange::new(day(3, 1), day(3, 31))));
        assert_eq!(status.spent, Money::from_cents(4000));
        assert_eq!(status.remaining, Money::from_cents(26000));
        assert!(!status.is_near_limit);
        assert!(!status.is_overspent);

        // groceries plus its four children, zero-spend ones included
        assert_eq!(status.categories.len(), 5);
        let packaged = status
            .categories
            .iter()
            .find(|c| c.path == "home/groceries/packaged_foods")
            .unwrap();
        assert_eq!(packaged.spent, Money::zero());
        assert_eq!(packaged.transaction_count, 0);
    }

    #[test]
    fn test_refunds_reduce_spending() {
        let f = Fixture::new();
        let budget = f.budget(&["home/groceries"], 30000, BudgetFilters::default());
        f.post("home/groceries", -5000, day(4, 2), SpecialType::Default);
        f.post("home/groceries", 1200, day(4, 3), SpecialType::Default);

        assert_eq!(f.status(budget, day(4, 30)).spent, Money::from_cents(3800));
    }

    #[test]
    fn test_filters() {
        let f = Fixture::new();
        let loan = GoalService::new(&f.storage, f.user)
            .create("Card", GoalType::Loan, Money::from_cents(100000), day(12, 31), None)
            .unwrap();

        f.post("home/groceries", -1000, day(5, 2), SpecialType::Default);
        f.post("home/groceries", -2000, day(5, 3), SpecialType::Subscription);
        f.post_with_goal("home/groceries", -4000, day(5, 4), SpecialType::Debt, Some(loan.id));
        f.post("income/salary", 8000, day(5, 5), SpecialType::Default);

        let default_budget = f.budget(&["home/groceries", "income"], 100000, BudgetFilters::default());
        assert_eq!(f.status(default_budget, day(5, 31)).spent, Money::from_cents(3000));

        let with_debt = f.budget(
            &["home/groceries", "income"],
            100000,
            BudgetFilters {
                include_debt_and_credit: true,
                ..Default::default()
            },
        );
        assert_eq!(f.status(with_debt, day(5, 31)).spent, Money::from_cents(7000));

        let with_income = f.budget(
            &["home/groceries", "income"],
            100000,
            BudgetFilters {
                include_income: true,
                ..Default::default()
            },
        );
        assert_eq!(f.status(with_income, day(5, 31)).spent, Money::from_cents(-5000));
    }

    #[test]
    fn test_balance_corrections_are_opt_in() {
        let f = Fixture::new();
        AccountService::new(&f.storage, f.user)
            .correct_balance(f.checking, Money::from_cents(490000), day(6, 2))
            .unwrap();

        let default_budget = f.budget(&["balance_correction"], 50000, BudgetFilters::default());
        assert_eq!(f.status(default_budget, day(6, 30)).spent, Money::zero());

        let opted_in = f.budget(
            &["balance_correction"],
            50000,
            BudgetFilters {
                include_balance_correction: true,
                ..Default::default()
            },
        );
        assert_eq!(f.status(opted_in, day(6, 30)).spent, Money::from_cents(10000));
    }

    #[test]
    fn test_limit_flags() {
        let f = Fixture::new();
        let budget = f.budget(&["home/groceries"], 10000, BudgetFilters::default());

        f.post("home/groceries", -9000, day(7, 1), SpecialType::Default);
        let status = f.status(budget, day(7, 15));
        assert!(status.is_near_limit);
        assert!(!status.is_overspent);

        f.post("home/groceries", -2000, day(7, 2), SpecialType::Default);
        let status = f.status(budget, day(7, 15));
        assert!(status.is_overspent);
        assert_eq!(status.remaining, Money::from_cents(-1000));
    }

    #[test]
    fn test_spending_out_of_range_is_an_error() {
        let f = Fixture::new();
        let budget = f.budget(&["home/groceries"], 10000, BudgetFilters::default());
        let huge = -Money::from_major(5.0e16).unwrap();
        // One leg per account so neither balance leaves the i64 range
        for (account_id, path) in [(f.checking, "home/groceries"), (f.savings, "home/groceries/fresh_produce")] {
            TransactionService::new(&f.storage, f.user)
                .post(NewTransaction {
                    account_id,
                    amount: huge,
                    category_id: f.category(path),
                    special_type: SpecialType::Default,
                    description: String::new(),
                    date: day(8, 1),
                    goal_id: None,
                })
                .unwrap();
        }

        let err = BudgetStatusReport::generate(&f.storage, f.user, budget, day(8, 31)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn test_unknown_budget() {
        let f = Fixture::new();
        let err = BudgetStatusReport::generate(&f.storage, f.user, BudgetId::new(), day(1, 1))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
