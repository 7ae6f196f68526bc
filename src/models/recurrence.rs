//! Recurrence definitions
//!
//! A definition is a transaction template plus a schedule. Occurrence `k` is
//! due on `anchor + k * interval` units of the frequency. The cursor
//! (`next_index`, `next_due`) only ever moves forward, and a due date is
//! materialized at most once: `last_materialized_due` records the latest one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, CategoryId, RecurrenceId, UserId};
use super::money::Money;
use super::period::Frequency;
use super::transaction::SpecialType;

/// What gets posted for each occurrence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrenceTemplate {
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub amount: Money,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub special_type: SpecialType,
}

/// Lifecycle of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceState {
    /// Waiting for `next_due`
    Scheduled,
    /// Past the end date or cancelled; terminal
    Completed,
}

/// How elapsed occurrences are handled when several are due at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatchUpPolicy {
    /// Post the oldest elapsed occurrence and step the cursor once; later
    /// advances work through the backlog
    #[default]
    OnePerAdvance,
    /// One transaction per elapsed occurrence
    EveryOccurrence,
    /// Only the most recent elapsed occurrence is posted, older ones are passed over
    LatestOnly,
}

impl CatchUpPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "one_per_advance" | "one" => Some(Self::OnePerAdvance),
            "every_occurrence" | "every" | "all" => Some(Self::EveryOccurrence),
            "latest_only" | "latest" => Some(Self::LatestOnly),
            _ => None,
        }
    }
}

/// Occurrences selected by one advance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvancePlan {
    /// Due dates to post, oldest first
    pub materialize: Vec<NaiveDate>,
    /// Due dates passed over without posting
    pub passed_over: Vec<NaiveDate>,
}

impl AdvancePlan {
    pub fn is_empty(&self) -> bool {
        self.materialize.is_empty() && self.passed_over.is_empty()
    }

    /// Total occurrences the cursor moves past
    pub fn steps(&self) -> usize {
        self.materialize.len() + self.passed_over.len()
    }
}

/// A recurring transaction definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceDefinition {
    pub id: RecurrenceId,
    pub user_id: UserId,
    pub template: RecurrenceTemplate,
    pub frequency: Frequency,
    /// Number of frequency units between occurrences, at least 1
    pub interval: u32,
    /// Due date of occurrence 0
    pub anchor: NaiveDate,
    /// Index of the earliest not yet materialized occurrence
    pub next_index: u64,
    /// Due date of occurrence `next_index`
    pub next_due: NaiveDate,
    /// Last day an occurrence may fall on
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_materialized_due: Option<NaiveDate>,
    pub state: RecurrenceState,
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurrenceDefinition {
    /// Create a definition whose first occurrence is due on `first_due`
    pub fn new(
        user_id: UserId,
        template: RecurrenceTemplate,
        frequency: Frequency,
        interval: u32,
        first_due: NaiveDate,
        end_date: Option<NaiveDate>,
    ) -> Self {
        let now = Utc::now();
        let mut definition = Self {
            id: RecurrenceId::new(),
            user_id,
            template,
            frequency,
            interval,
            anchor: first_due,
            next_index: 0,
            next_due: first_due,
            end_date,
            last_materialized_due: None,
            state: RecurrenceState::Scheduled,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        if definition.is_past_end(first_due) {
            definition.state = RecurrenceState::Completed;
        }
        definition
    }

    pub fn is_completed(&self) -> bool {
        self.state == RecurrenceState::Completed
    }

    /// Due date of occurrence `index`
    pub fn occurrence(&self, index: u64) -> Option<NaiveDate> {
        let steps = index.checked_mul(u64::from(self.interval))?;
        self.frequency.step_from(self.anchor, steps)
    }

    fn is_past_end(&self, due: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| due > end)
    }

    /// Scheduled due dates from the cursor up to and including `until`,
    /// at most `limit` of them
    pub fn pending_until(&self, until: NaiveDate, limit: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        if self.is_completed() {
            return dates;
        }
        let mut index = self.next_index;
        while let Some(due) = self.occurrence(index) {
            if dates.len() >= limit || due > until || self.is_past_end(due) {
                break;
            }
            // a due date already posted is never posted twice
            if self.last_materialized_due.map_or(true, |last| due > last) {
                dates.push(due);
            }
            index += 1;
        }
        dates
    }

    /// Choose which elapsed occurrences to post as of `as_of`
    ///
    /// Fails when the cursor would have to move past more than `max_steps`
    /// occurrences at once.
    pub fn plan_advance(
        &self,
        as_of: NaiveDate,
        policy: CatchUpPolicy,
        max_steps: usize,
    ) -> Result<AdvancePlan, RecurrenceValidationError> {
        if policy == CatchUpPolicy::OnePerAdvance {
            return Ok(AdvancePlan {
                materialize: self.pending_until(as_of, 1),
                passed_over: Vec::new(),
            });
        }

        let mut due = self.pending_until(as_of, max_steps.saturating_add(1));
        if due.len() > max_steps {
            return Err(RecurrenceValidationError::BacklogTooLong(max_steps));
        }
        Ok(match policy {
            CatchUpPolicy::LatestOnly => match due.pop() {
                Some(latest) => AdvancePlan {
                    materialize: vec![latest],
                    passed_over: due,
                },
                None => AdvancePlan::default(),
            },
            _ => AdvancePlan {
                materialize: due,
                passed_over: Vec::new(),
            },
        })
    }

    /// Move the cursor past `steps` occurrences
    ///
    /// `materialized` is the latest due date actually posted among them.
    pub fn advance_cursor(&mut self, steps: usize, materialized: Option<NaiveDate>) {
        if steps == 0 {
            return;
        }
        self.next_index = self.next_index.saturating_add(steps as u64);
        if let Some(due) = materialized {
            self.last_materialized_due = Some(self.last_materialized_due.map_or(due, |d| d.max(due)));
        }
        match self.occurrence(self.next_index) {
            Some(next) if !self.is_past_end(next) => self.next_due = next,
            Some(next) => {
                self.next_due = next;
                self.state = RecurrenceState::Completed;
            }
            None => self.state = RecurrenceState::Completed,
        }
        self.updated_at = Utc::now();
    }

    /// Terminate the schedule
    pub fn cancel(&mut self) {
        self.state = RecurrenceState::Completed;
        self.updated_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), RecurrenceValidationError> {
        if self.interval == 0 {
            return Err(RecurrenceValidationError::ZeroInterval);
        }
        if self.template.amount.is_zero() {
            return Err(RecurrenceValidationError::ZeroAmount);
        }
        if !self.template.special_type.allowed_for_recurrence() {
            return Err(RecurrenceValidationError::SpecialTypeNotAllowed(
                self.template.special_type,
            ));
        }
        if self.end_date.is_some_and(|end| end < self.anchor) {
            return Err(RecurrenceValidationError::EndBeforeStart);
        }
        Ok(())
    }
}

impl fmt::Display for RecurrenceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} every {} {} (next {})",
            self.template.description,
            self.interval,
            self.frequency,
            self.next_due.format("%Y-%m-%d")
        )
    }
}

/// Validation errors for recurrence definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurrenceValidationError {
    ZeroInterval,
    ZeroAmount,
    SpecialTypeNotAllowed(SpecialType),
    EndBeforeStart,
    /// More elapsed occurrences than one advance may move past
    BacklogTooLong(usize),
}

impl fmt::Display for RecurrenceValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroInterval => write!(f, "Recurrence interval must be at least 1"),
            Self::ZeroAmount => write!(f, "Recurrence amount cannot be zero"),
            Self::SpecialTypeNotAllowed(t) => {
                write!(f, "Transactions of type '{}' cannot recur", t)
            }
            Self::EndBeforeStart => write!(f, "End date is before the first due date"),
            Self::BacklogTooLong(max) => write!(
                f,
                "More than {} occurrences have elapsed, advance to an earlier date first",
                max
            ),
        }
    }
}

impl std::error::Error for RecurrenceValidationError {}
