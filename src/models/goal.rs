//! Goals and allocations
//!
//! A goal's current amount is never stored. It is the sum of the allocations
//! linking transactions to the goal, recomputed on every read.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AllocationId, GoalId, TransactionId, UserId};
use super::money::Money;

/// Progress thresholds, in percent
pub const MILESTONES: [u8; 4] = [25, 50, 75, 100];

/// Savings target or loan being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Savings,
    Loan,
}

impl GoalType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "savings" | "saving" => Some(Self::Savings),
            "loan" | "debt" => Some(Self::Loan),
            _ => None,
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Savings => write!(f, "savings"),
            Self::Loan => write!(f, "loan"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// A financial goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: GoalId,
    pub user_id: UserId,
    pub name: String,
    /// Amount to reach (positive)
    pub target_amount: Money,
    pub target_date: NaiveDate,
    /// Higher numbers rank first
    #[serde(default = "default_priority")]
    pub priority: u32,
    pub goal_type: GoalType,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_priority() -> u32 {
    1
}

impl Goal {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        goal_type: GoalType,
        target_amount: Money,
        target_date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GoalId::new(),
            user_id,
            name: name.into(),
            target_amount,
            target_date,
            priority: default_priority(),
            goal_type,
            status: GoalStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    /// Whether allocations may still be added
    pub fn accepts_allocations(&self) -> bool {
        self.status != GoalStatus::Abandoned
    }

    /// Mark the goal completed once `current` reaches the target, and active
    /// again if it drops below; abandoned goals stay abandoned
    pub fn settle_status(&mut self, current: Money) {
        if self.status == GoalStatus::Abandoned {
            return;
        }
        self.status = if current >= self.target_amount {
            GoalStatus::Completed
        } else {
            GoalStatus::Active
        };
    }

    pub fn validate(&self) -> Result<(), GoalValidationError> {
        if self.name.trim().is_empty() {
            return Err(GoalValidationError::EmptyName);
        }
        if !self.target_amount.is_positive() {
            return Err(GoalValidationError::NonPositiveTarget);
        }
        Ok(())
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, target {})", self.name, self.goal_type, self.target_amount)
    }
}

/// Part of a transaction's magnitude credited to a goal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub user_id: UserId,
    pub goal_id: GoalId,
    pub transaction_id: TransactionId,
    /// Always positive
    pub amount: Money,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Allocation {
    pub fn new(user_id: UserId, goal_id: GoalId, transaction_id: TransactionId, amount: Money) -> Self {
        let now = Utc::now();
        Self {
            id: AllocationId::new(),
            user_id,
            goal_id,
            transaction_id,
            amount,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Derived progress of a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub goal_id: GoalId,
    pub current: Money,
    pub target: Money,
    pub remaining: Money,
    /// 0 to 100
    pub percent_complete: f64,
    /// Smallest milestone strictly above the current percentage
    pub next_milestone: Option<u8>,
    /// Milestones already reached
    pub reached_milestones: Vec<u8>,
}

impl GoalProgress {
    pub fn compute(goal_id: GoalId, current: Money, target: Money) -> Self {
        let percent_complete = if target.is_positive() {
            (current.cents() as f64 * 100.0 / target.cents() as f64).clamp(0.0, 100.0)
        } else {
            0.0
        };
        let next_milestone = MILESTONES
            .iter()
            .copied()
            .find(|&m| f64::from(m) > percent_complete);
        let reached_milestones = MILESTONES
            .iter()
            .copied()
            .filter(|&m| f64::from(m) <= percent_complete)
            .collect();
        let remaining = if current >= target {
            Money::zero()
        } else {
            target - current
        };
        Self {
            goal_id,
            current,
            target,
            remaining,
            percent_complete,
            next_milestone,
            reached_milestones,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }
}

/// Whether the monthly surplus keeps a goal on course for its target date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionStatus {
    OnTrack,
    /// Needs more than the surplus, by at most a fifth
    AtRisk,
    Behind,
    Achieved,
}

impl fmt::Display for ProjectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnTrack => write!(f, "on track"),
            Self::AtRisk => write!(f, "at risk"),
            Self::Behind => write!(f, "behind"),
            Self::Achieved => write!(f, "achieved"),
        }
    }
}

/// Forecast of when a goal is reached at the current monthly surplus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProjection {
    pub goal_id: GoalId,
    pub remaining: Money,
    /// Whole calendar months from `as_of` to the target date, never negative
    pub months_remaining: u32,
    /// Contribution per month that reaches the target on time, rounded up to
    /// the cent; the whole remainder once the target month has come
    pub monthly_needed: Money,
    pub monthly_available: Money,
    /// `None` when the surplus is not positive
    pub estimated_completion: Option<NaiveDate>,
    pub status: ProjectionStatus,
}

impl GoalProjection {
    pub fn compute(
        progress: &GoalProgress,
        target_date: NaiveDate,
        as_of: NaiveDate,
        monthly_available: Money,
    ) -> Self {
        let months = (target_date.year() - as_of.year()) * 12 + target_date.month() as i32
            - as_of.month() as i32;
        let months_remaining = u32::try_from(months).unwrap_or(0);
        let remaining = progress.remaining.cents();

        let monthly_needed = if months_remaining > 0 {
            ceil_div(remaining, i64::from(months_remaining))
        } else {
            remaining
        };

        let available = monthly_available.cents();
        let status = if progress.is_complete() {
            ProjectionStatus::Achieved
        } else if i128::from(monthly_needed) * 5 > i128::from(available) * 6 {
            ProjectionStatus::Behind
        } else if monthly_needed > available {
            ProjectionStatus::AtRisk
        } else {
            ProjectionStatus::OnTrack
        };

        let estimated_completion = if remaining == 0 {
            Some(as_of)
        } else if available > 0 {
            u32::try_from(ceil_div(remaining, available))
                .ok()
                .and_then(|n| as_of.checked_add_months(Months::new(n)))
        } else {
            None
        };

        Self {
            goal_id: progress.goal_id,
            remaining: progress.remaining,
            months_remaining,
            monthly_needed: Money::from_cents(monthly_needed),
            monthly_available,
            estimated_completion,
            status,
        }
    }

    pub fn is_on_track(&self) -> bool {
        matches!(self.status, ProjectionStatus::OnTrack | ProjectionStatus::Achieved)
    }
}

/// `numerator / denominator` rounded up, for a non-negative numerator and a
/// positive denominator
fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    let quotient = numerator / denominator;
    if numerator % denominator == 0 {
        quotient
    } else {
        quotient + 1
    }
}

/// Validation errors for goals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoalValidationError {
    EmptyName,
    NonPositiveTarget,
}

impl fmt::Display for GoalValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Goal name cannot be empty"),
            Self::NonPositiveTarget => write!(f, "Goal target amount must be positive"),
        }
    }
}

impl std::error::Error for GoalValidationError {}
