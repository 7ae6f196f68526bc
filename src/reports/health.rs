//! Financial health score
//!
//! An integer 0-100 weighted composite of four components, each normalized to [0, 1]
//! where higher is healthier: savings rate, budget adherence, goal progress
//! and inverse debt-to-income. A component with no data behind it takes the
//! configured neutral value.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{HealthSettings, HealthWeights};
use crate::error::{LedgerError, LedgerResult};
use crate::models::{CategoryKind, DateRange, GoalProgress, GoalStatus, GoalType, Money, UserId};
use crate::storage::{Book, Storage};

use super::budget_status::BudgetStatusReport;

/// Normalized component values, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthComponents {
    pub savings_rate: f64,
    pub budget_adherence: f64,
    pub goal_progress: f64,
    /// Inverse debt-to-income: 1 without debt, 0 when debt reaches a year of income
    pub debt_to_income: f64,
}

impl HealthComponents {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.savings_rate,
            self.budget_adherence,
            self.goal_progress,
            self.debt_to_income,
        ]
    }
}

/// Weighted composite of the components, clamped to 0-100
pub fn score(components: &HealthComponents, weights: &HealthWeights) -> f64 {
    let total = weights.total();
    if !total.is_finite() || total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = components
        .as_array()
        .iter()
        .zip(weights.as_array())
        .map(|(c, w)| c.clamp(0.0, 1.0) * w.max(0.0))
        .sum();
    (weighted / total * 100.0).clamp(0.0, 100.0)
}

/// Round a composite score to the reported integer, NaN counting as 0
pub fn whole_score(score: f64) -> u8 {
    if score.is_nan() {
        return 0;
    }
    score.clamp(0.0, 100.0).round() as u8
}

/// Label for a score band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthRating {
    pub fn from_score(score: u8) -> Self {
        if score >= 80 {
            Self::Excellent
        } else if score >= 60 {
            Self::Good
        } else if score >= 40 {
            Self::Fair
        } else if score >= 20 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for HealthRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Excellent => write!(f, "Excellent"),
            Self::Good => write!(f, "Good"),
            Self::Fair => write!(f, "Fair"),
            Self::Poor => write!(f, "Poor"),
            Self::Critical => write!(f, "Critical"),
        }
    }
}

/// Health score with the figures behind it
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub as_of: NaiveDate,
    /// Trailing window used for income and spending
    pub window: DateRange,
    pub score: u8,
    pub rating: HealthRating,
    pub components: HealthComponents,
    pub weights: HealthWeights,
    pub income: Money,
    pub spending: Money,
    /// Credit card balances owed plus remaining loan goals
    pub debt: Money,
}

/// Income and spending of a window, transfers and balance corrections excluded
///
/// Credit and debt postings move money between the user and a lender and
/// count as neither.
fn cash_flow(book: &Book, window: DateRange) -> LedgerResult<(Money, Money)> {
    let mut income = Money::zero();
    let mut spending = Money::zero();
    for txn in book.transactions() {
        if txn.is_transfer() || !window.contains(txn.date) || !txn.special_type.counts_toward_budget() {
            continue;
        }
        let Some(category) = txn.category_id.and_then(|id| book.category(id)) else {
            continue;
        };
        if category.is_balance_correction() {
            continue;
        }
        match category.kind {
            CategoryKind::Income => income = income.checked_add(txn.amount)?,
            CategoryKind::Expense => spending = spending.checked_sub(txn.amount)?,
        }
    }
    Ok((income, spending))
}

/// Income less spending over the trailing window ending `as_of`, scaled to
/// a 30-day month
pub fn monthly_surplus(book: &Book, as_of: NaiveDate, window_days: u32) -> LedgerResult<Money> {
    let days = window_days.max(1);
    let (income, spending) = cash_flow(book, DateRange::trailing(as_of, days))?;
    let net = income.checked_sub(spending)?;
    let monthly = i128::from(net.cents()) * 30 / i128::from(days);
    i64::try_from(monthly)
        .map(Money::from_cents)
        .map_err(|_| LedgerError::InvalidAmount("monthly surplus is out of range".into()))
}

fn ratio(numerator: Money, denominator: Money) -> f64 {
    numerator.cents() as f64 / denominator.cents() as f64
}

impl HealthReport {
    /// Compute the health report from a book
    pub fn compute(book: &Book, as_of: NaiveDate, settings: &HealthSettings) -> LedgerResult<Self> {
        let neutral = settings.neutral_component.clamp(0.0, 1.0);
        let window = DateRange::trailing(as_of, settings.trailing_window_days);
        let (income, spending) = cash_flow(book, window)?;

        let savings_rate = if income.is_positive() && settings.target_savings_rate > 0.0 {
            let rate = ratio(income.checked_sub(spending)?, income);
            (rate / settings.target_savings_rate).clamp(0.0, 1.0)
        } else {
            neutral
        };

        let mut adherence = Vec::new();
        for budget in book.budgets() {
            let status = BudgetStatusReport::compute(book, budget, as_of)?;
            if status.window.is_none() {
                continue;
            }
            adherence.push(if status.spent <= status.limit {
                1.0
            } else {
                (1.0 - ratio(status.spent.checked_sub(status.limit)?, status.limit)).max(0.0)
            });
        }
        let budget_adherence = average(&adherence).unwrap_or(neutral);

        let progress: Vec<f64> = book
            .goals()
            .filter(|g| g.status != GoalStatus::Abandoned && g.goal_type == GoalType::Savings)
            .map(|g| {
                GoalProgress::compute(g.id, book.goal_current_amount(g.id), g.target_amount)
                    .percent_complete
                    / 100.0
            })
            .collect();
        let goal_progress = average(&progress).unwrap_or(neutral);

        let card_debt = Money::checked_sum(
            book.accounts()
                .filter(|a| !a.archived)
                .map(|a| a.amount_owed()),
        )?;
        let loan_debt = Money::checked_sum(
            book.goals()
                .filter(|g| g.status != GoalStatus::Abandoned && g.goal_type == GoalType::Loan)
                .map(|g| {
                    GoalProgress::compute(g.id, book.goal_current_amount(g.id), g.target_amount)
                        .remaining
                }),
        )?;
        let debt = card_debt.checked_add(loan_debt)?;
        let debt_to_income = if debt.is_zero() {
            1.0
        } else if income.is_positive() {
            let annual_income = income.cents() as f64 * 365.0 / window.days() as f64;
            (1.0 - debt.cents() as f64 / annual_income).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let components = HealthComponents {
            savings_rate,
            budget_adherence,
            goal_progress,
            debt_to_income,
        };
        let score = whole_score(score(&components, &settings.weights));

        Ok(Self {
            as_of,
            window,
            score,
            rating: HealthRating::from_score(score),
            components,
            weights: settings.weights,
            income,
            spending,
            debt,
        })
    }

    /// Generate the health report for a user with the storage's settings
    pub fn generate(storage: &Storage, user_id: UserId, as_of: NaiveDate) -> LedgerResult<Self> {
        let settings = storage.settings().health.clone();
        storage.read(user_id, |book| Self::compute(book, as_of, &settings))
    }

    /// Format the report for terminal display
    pub fn format_terminal(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("Financial Health as of {}\n", self.as_of));
        output.push_str(&"=".repeat(50));
        output.push('\n');
        output.push_str(&format!("Score: {} / 100 ({})\n\n", self.score, self.rating));

        let rows = [
            ("Savings rate", self.components.savings_rate, self.weights.savings_rate),
            ("Budget adherence", self.components.budget_adherence, self.weights.budget_adherence),
            ("Goal progress", self.components.goal_progress, self.weights.goal_progress),
            ("Debt to income", self.components.debt_to_income, self.weights.debt_to_income),
        ];
        for (label, value, weight) in rows {
            output.push_str(&format!(
                "  {:<20} {:>5.0}%  (weight {:.2})\n",
                label,
                value * 100.0,
                weight
            ));
        }
        output.push('\n');
        output.push_str(&format!("Income ({} days): {}\n", self.window.days(), self.income));
        output.push_str(&format!("Spending:          {}\n", self.spending));
        output.push_str(&format!("Debt:              {}\n", self.debt));
        output
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
