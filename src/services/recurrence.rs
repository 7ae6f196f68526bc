//! Recurrence service
//!
//! Materializes recurring definitions into ledger transactions. Advancing a
//! definition posts its elapsed occurrences and moves the cursor in the same
//! commit as the postings, and the definition's version is checked on
//! commit, so two concurrent advances can never post the same occurrence.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{
    AccountId, CatchUpPolicy, CategoryId, Frequency, Money, RecurrenceDefinition, RecurrenceId,
    RecurrenceState, RecurrenceTemplate, SpecialType, Transaction, UserId,
};
use crate::storage::{LastCommit, Storage, UnitOfWork};

use super::category::active_category;
use super::transaction::{active_account, LedgerChanges};

/// A new recurrence definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecurrence {
    pub template: RecurrenceTemplate,
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    pub first_due: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_interval() -> u32 {
    1
}

/// Outcome of advancing one definition
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceResult {
    pub recurrence_id: RecurrenceId,
    pub materialized: Vec<Transaction>,
    /// Elapsed due dates moved past without a posting
    pub passed_over: Vec<NaiveDate>,
    pub next_due: NaiveDate,
    pub state: RecurrenceState,
}

/// Outcome of advancing every due definition
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchAdvance {
    pub advanced: Vec<AdvanceResult>,
    pub failed: Vec<(RecurrenceId, String)>,
}

impl BatchAdvance {
    pub fn materialized_count(&self) -> usize {
        self.advanced.iter().map(|r| r.materialized.len()).sum()
    }
}

/// A scheduled occurrence not yet posted
#[derive(Debug, Clone, Serialize)]
pub struct UpcomingEntry {
    pub recurrence_id: RecurrenceId,
    pub due: NaiveDate,
    pub account_id: AccountId,
    pub category_id: CategoryId,
    pub amount: Money,
    pub description: String,
    pub special_type: SpecialType,
}

/// Service for recurring transactions
pub struct RecurrenceService<'a> {
    storage: &'a Storage,
    user_id: UserId,
    last_commit: LastCommit,
}

impl<'a> RecurrenceService<'a> {
    /// Create a new recurrence service
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

    /// Define a new recurrence
    pub fn define(&self, new: NewRecurrence) -> LedgerResult<RecurrenceDefinition> {
        if new.template.amount.is_zero() {
            return Err(LedgerError::InvalidAmount(
                "recurrence amount must not be zero".into(),
            ));
        }

        let mut template = new.template.clone();
        template.description = template.description.trim().to_string();
        let definition = RecurrenceDefinition::new(
            self.user_id,
            template,
            new.frequency,
            new.interval,
            new.first_due,
            new.end_date,
        );
        definition
            .validate()
            .map_err(|e| LedgerError::Validation(e.to_string()))?;

        self.storage.with_retry(|| {
            self.storage.read(self.user_id, |book| {
                active_account(book, definition.template.account_id)?;
                active_category(book, definition.template.category_id)?;
                Ok(())
            })?;
            let mut uow = UnitOfWork::new();
            uow.put(definition.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)
        })?;

        info!(user = %self.user_id, recurrence = %definition.id, "defined recurrence");
        Ok(RecurrenceDefinition {
            version: 1,
            ..definition
        })
    }

    /// Get a definition by ID
    pub fn get(&self, id: RecurrenceId) -> LedgerResult<RecurrenceDefinition> {
        self.storage.read(self.user_id, |book| {
            book.recurrence(id)
                .cloned()
                .ok_or_else(|| LedgerError::recurrence_not_found(id.to_string()))
        })
    }

    /// List definitions by next due date
    pub fn list(&self, include_completed: bool) -> LedgerResult<Vec<RecurrenceDefinition>> {
        self.storage.read(self.user_id, |book| {
            let mut definitions: Vec<RecurrenceDefinition> = book
                .recurrences()
                .filter(|r| include_completed || !r.is_completed())
                .cloned()
                .collect();
            definitions.sort_by(|a, b| a.next_due.cmp(&b.next_due).then(a.id.cmp(&b.id)));
            Ok(definitions)
        })
    }

    /// Post elapsed occurrences up to `as_of` under the configured catch-up
    /// policy
    pub fn advance(&self, id: RecurrenceId, as_of: NaiveDate) -> LedgerResult<AdvanceResult> {
        self.advance_with_policy(id, as_of, self.storage.settings().recurrence_catch_up)
    }

    /// Like [`RecurrenceService::advance`] with an explicit policy
    ///
    /// Idempotent for the backlog it covers: once nothing is due on or
    /// before `as_of`, advancing again posts nothing. Fails with a validation
    /// error when more occurrences have elapsed than one advance may move past.
    pub fn advance_with_policy(
        &self,
        id: RecurrenceId,
        as_of: NaiveDate,
        policy: CatchUpPolicy,
    ) -> LedgerResult<AdvanceResult> {
        let max_steps = self.storage.settings().max_occurrences_per_advance;
        let result = self.storage.with_retry(|| {
            let (uow, result) = self.storage.read(self.user_id, |book| {
                let definition = book
                    .recurrence(id)
                    .ok_or_else(|| LedgerError::recurrence_not_found(id.to_string()))?;

                let plan = definition
                    .plan_advance(as_of, policy, max_steps)
                    .map_err(|e| LedgerError::Validation(e.to_string()))?;
                let mut updated = definition.clone();
                if plan.is_empty() {
                    return Ok((
                        None,
                        AdvanceResult {
                            recurrence_id: id,
                            materialized: Vec::new(),
                            passed_over: Vec::new(),
                            next_due: updated.next_due,
                            state: updated.state,
                        },
                    ));
                }

                let template = &definition.template;
                let mut materialized = Vec::new();
                let mut changes = LedgerChanges::new(book);
                if !plan.materialize.is_empty() {
                    active_account(book, template.account_id)?;
                    active_category(book, template.category_id)?;
                }
                for due in &plan.materialize {
                    let mut txn = Transaction::new(
                        self.user_id,
                        template.account_id,
                        template.amount,
                        Some(template.category_id),
                        *due,
                    )
                    .with_description(template.description.clone())
                    .with_special_type(template.special_type);
                    txn.recurrence_id = Some(id);
                    txn.occurrence_due = Some(*due);
                    changes.post(txn.clone())?;
                    materialized.push(Transaction { version: 1, ..txn });
                }

                updated.advance_cursor(plan.steps(), plan.materialize.last().copied());
                changes.uow_mut().put(updated.clone());
                let (uow, _) = changes.finish();

                Ok((
                    Some(uow),
                    AdvanceResult {
                        recurrence_id: id,
                        materialized,
                        passed_over: plan.passed_over,
                        next_due: updated.next_due,
                        state: updated.state,
                    },
                ))
            })?;

            if let Some(uow) = uow {
                self.last_commit.commit(self.storage, self.user_id, uow)?;
            }
            Ok(result)
        })?;

        if !result.materialized.is_empty() || !result.passed_over.is_empty() {
            info!(
                user = %self.user_id,
                recurrence = %id,
                materialized = result.materialized.len(),
                passed_over = result.passed_over.len(),
                next_due = %result.next_due,
                "advanced recurrence"
            );
        }
        Ok(result)
    }

    /// Advance every scheduled definition due on or before `as_of`
    ///
    /// A definition that fails is reported and does not stop the others.
    pub fn advance_all_due(&self, as_of: NaiveDate) -> LedgerResult<BatchAdvance> {
        let due: Vec<RecurrenceId> = self.storage.read(self.user_id, |book| {
            let mut due: Vec<&RecurrenceDefinition> = book
                .recurrences()
                .filter(|r| !r.is_completed() && r.next_due <= as_of)
                .collect();
            due.sort_by_key(|r| (r.next_due, r.id.full()));
            Ok(due.into_iter().map(|r| r.id).collect())
        })?;

        let mut batch = BatchAdvance::default();
        for id in due {
            match self.advance(id, as_of) {
                Ok(result) => batch.advanced.push(result),
                Err(e) => {
                    warn!(user = %self.user_id, recurrence = %id, error = %e, "failed to advance recurrence");
                    batch.failed.push((id, e.to_string()));
                }
            }
        }
        debug!(
            user = %self.user_id,
            advanced = batch.advanced.len(),
            failed = batch.failed.len(),
            "advanced due recurrences"
        );
        Ok(batch)
    }

    /// Move past the next occurrence without posting it
    pub fn skip(&self, id: RecurrenceId) -> LedgerResult<RecurrenceDefinition> {
        self.update_definition(id, |definition| {
            if definition.is_completed() {
                return Err(LedgerError::Validation(format!(
                    "Recurrence {} is completed",
                    id
                )));
            }
            definition.advance_cursor(1, None);
            Ok(())
        })
    }

    /// Terminate a definition; already posted transactions stay
    pub fn cancel(&self, id: RecurrenceId) -> LedgerResult<RecurrenceDefinition> {
        self.update_definition(id, |definition| {
            definition.cancel();
            Ok(())
        })
    }

    fn update_definition(
        &self,
        id: RecurrenceId,
        change: impl Fn(&mut RecurrenceDefinition) -> LedgerResult<()>,
    ) -> LedgerResult<RecurrenceDefinition> {
        self.storage.with_retry(|| {
            let mut definition = self.get(id)?;
            change(&mut definition)?;
            let mut uow = UnitOfWork::new();
            uow.put(definition.clone());
            self.last_commit.commit(self.storage, self.user_id, uow)?;
            definition.version += 1;
            Ok(definition)
        })
    }

    /// Preview occurrences due up to `horizon_days` after `as_of`
    ///
    /// Includes overdue occurrences not posted yet. Subscription and
    /// repetitive definitions are not previewed. Each definition contributes
    /// at most `max_occurrences_per_advance` entries.
    pub fn upcoming(&self, as_of: NaiveDate, horizon_days: u32) -> LedgerResult<Vec<UpcomingEntry>> {
        let settings = self.storage.settings();
        if horizon_days > settings.max_upcoming_horizon_days {
            return Err(LedgerError::Validation(format!(
                "Horizon of {} days exceeds the limit of {} days",
                horizon_days, settings.max_upcoming_horizon_days
            )));
        }
        let limit = settings.max_occurrences_per_advance;
        let until = as_of
            .checked_add_days(Days::new(u64::from(horizon_days)))
            .unwrap_or(NaiveDate::MAX);

        self.storage.read(self.user_id, |book| {
            let mut entries: Vec<UpcomingEntry> = book
                .recurrences()
                .filter(|r| r.template.special_type.produces_upcoming_preview())
                .flat_map(|r| {
                    r.pending_until(until, limit).into_iter().map(move |due| UpcomingEntry {
                        recurrence_id: r.id,
                        due,
                        account_id: r.template.account_id,
                        category_id: r.template.category_id,
                        amount: r.template.amount,
                        description: r.template.description.clone(),
                        special_type: r.template.special_type,
                    })
                })
                .collect();
            entries.sort_by_key(|e| (e.due, e.recurrence_id.full()));
            Ok(entries)
        })
    }
}
