//! Budget model
//!
//! A budget caps spending over a category scope for a period. Which
//! transactions count is decided by [`BudgetFilters::admits`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::category::CategoryKind;
use super::ids::{BudgetId, CategoryId, UserId};
use super::money::Money;
use super::period::{DateRange, PeriodType};
use super::transaction::SpecialType;

/// Default share of the limit at which a budget is reported as near its limit
pub const DEFAULT_ALERT_THRESHOLD: f64 = 0.9;

fn default_alert_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}

fn default_true() -> bool {
    true
}

/// Opt-in switches for transactions budgets skip by default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetFilters {
    #[serde(default)]
    pub include_income: bool,
    #[serde(default)]
    pub include_debt_and_credit: bool,
    #[serde(default)]
    pub include_balance_correction: bool,
}

impl BudgetFilters {
    /// Whether a transaction in scope counts toward spending
    pub fn admits(
        &self,
        kind: CategoryKind,
        special_type: SpecialType,
        is_balance_correction: bool,
    ) -> bool {
        let kind_ok = match kind {
            CategoryKind::Expense => true,
            CategoryKind::Income => self.include_income,
        };
        let type_ok = special_type.counts_toward_budget() || self.include_debt_and_credit;
        let correction_ok = !is_balance_correction || self.include_balance_correction;
        kind_ok && type_ok && correction_ok
    }
}

/// A spending budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub user_id: UserId,
    pub name: String,
    pub period_type: PeriodType,
    /// First day the budget applies
    pub start_date: NaiveDate,
    /// Last day the budget applies; required for custom budgets
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Categories in scope
    pub category_ids: Vec<CategoryId>,
    /// Whether descendants of the scoped categories are in scope too
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    /// Spending limit per period (positive)
    pub limit: Money,
    #[serde(default)]
    pub filters: BudgetFilters,
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Budget {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        period_type: PeriodType,
        start_date: NaiveDate,
        end_date: Option<NaiveDate>,
        category_ids: Vec<CategoryId>,
        limit: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: BudgetId::new(),
            user_id,
            name: name.into(),
            period_type,
            start_date,
            end_date,
            category_ids,
            include_descendants: true,
            limit,
            filters: BudgetFilters::default(),
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// The whole range the budget applies to
    pub fn active_range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date.unwrap_or(NaiveDate::MAX))
    }

    /// The window evaluated for `as_of`
    ///
    /// Custom budgets use their explicit range. Periodic budgets use the period
    /// containing `as_of`, clipped to the active range; `None` when `as_of`
    /// lies outside it.
    pub fn window(&self, as_of: NaiveDate) -> Option<DateRange> {
        let active = self.active_range();
        match self.period_type.window_containing(as_of) {
            None => Some(active),
            Some(period) => {
                if !active.contains(as_of) {
                    return None;
                }
                period.intersect(&active)
            }
        }
    }

    pub fn validate(&self) -> Result<(), BudgetValidationError> {
        if self.name.trim().is_empty() {
            return Err(BudgetValidationError::EmptyName);
        }
        if !self.limit.is_positive() {
            return Err(BudgetValidationError::NonPositiveLimit);
        }
        if self.category_ids.is_empty() {
            return Err(BudgetValidationError::EmptyScope);
        }
        match (self.period_type, self.end_date) {
            (PeriodType::Custom, None) => return Err(BudgetValidationError::MissingEndDate),
            (_, Some(end)) if end < self.start_date => {
                return Err(BudgetValidationError::EndBeforeStart)
            }
            _ => {}
        }
        if !self.alert_threshold.is_finite()
            || self.alert_threshold <= 0.0
            || self.alert_threshold > 1.0
        {
            return Err(BudgetValidationError::InvalidAlertThreshold);
        }
        Ok(())
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, limit {})", self.name, self.period_type, self.limit)
    }
}

/// Validation errors for budgets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BudgetValidationError {
    EmptyName,
    NonPositiveLimit,
    EmptyScope,
    MissingEndDate,
    EndBeforeStart,
    InvalidAlertThreshold,
}

impl fmt::Display for BudgetValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Budget name cannot be empty"),
            Self::NonPositiveLimit => write!(f, "Budget limit must be positive"),
            Self::EmptyScope => write!(f, "Budget must cover at least one category"),
            Self::MissingEndDate => write!(f, "Custom budgets need an end date"),
            Self::EndBeforeStart => write!(f, "Budget end date is before its start date"),
            Self::InvalidAlertThreshold => {
                write!(f, "Alert threshold must be in (0, 1]")
            }
        }
    }
}

impl std::error::Error for BudgetValidationError {}
