//! Tool call dispatch
//!
//! Maps each [`ToolCall`] onto the services and reports. Commands answer
//! with the affected entities and new balances; queries answer with a
//! snapshot taken under one read lock, tagged with the book version it saw.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CategoryKind, Frequency, Money, RecurrenceTemplate, UserId};
use crate::reports::{BudgetStatusReport, HealthReport, NetWorthReport};
use crate::services::{
    AccountService, BudgetService, CategoryService, GoalService, NewBudget, NewRecurrence,
    NewTransaction, RecurrenceService, TransactionService, TransferService,
};
use crate::storage::{Book, Storage};

use super::call::ToolCall;
use super::response::ToolResponse;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Data produced under one read lock, with the version it reflects
fn snapshot<T: Serialize>(
    storage: &Storage,
    user_id: UserId,
    f: impl FnOnce(&Book) -> LedgerResult<T>,
) -> LedgerResult<(u64, Value)> {
    let versioned = storage.snapshot(user_id, f)?;
    Ok((versioned.version, serde_json::to_value(versioned.data)?))
}

fn current_version(storage: &Storage, user_id: UserId) -> LedgerResult<u64> {
    storage.read(user_id, |book| Ok(book.version()))
}

/// Data returned by a command, with the version its own commit wrote
///
/// A command that staged nothing reports the version it found.
fn committed<T: Serialize>(
    storage: &Storage,
    user_id: UserId,
    version: Option<u64>,
    data: T,
) -> LedgerResult<(u64, Value)> {
    let version = match version {
        Some(version) => version,
        None => current_version(storage, user_id)?,
    };
    Ok((version, serde_json::to_value(data)?))
}

/// Data from a service query, with the version it was read at
///
/// The query reruns when a commit lands between the two version reads.
fn queried<T: Serialize>(
    storage: &Storage,
    user_id: UserId,
    mut query: impl FnMut() -> LedgerResult<T>,
) -> LedgerResult<(u64, Value)> {
    storage.with_retry(|| {
        let before = current_version(storage, user_id)?;
        let data = query()?;
        if current_version(storage, user_id)? != before {
            return Err(LedgerError::conflict("book", user_id.to_string()));
        }
        Ok((before, serde_json::to_value(&data)?))
    })
}

/// Add the recomputed health score to a command's data
fn attach_health(
    storage: &Storage,
    user_id: UserId,
    (version, mut data): (u64, Value),
    include: bool,
) -> LedgerResult<(u64, Value)> {
    if include {
        let report = HealthReport::generate(storage, user_id, today())?;
        if let Value::Object(map) = &mut data {
            map.insert(
                "health_score".into(),
                json!({ "score": report.score, "rating": report.rating }),
            );
        }
    }
    Ok((version, data))
}

fn run(storage: &Storage, user_id: UserId, call: ToolCall) -> LedgerResult<(u64, Value)> {
    match call {
        ToolCall::CreateAccount {
            name,
            account_type,
            opening_balance,
            opened_on,
            credit,
        } => {
            let opening = Money::from_major(opening_balance)?;
            let service = AccountService::new(storage, user_id);
            let account = service.create(
                &name,
                account_type,
                opening,
                opened_on.unwrap_or_else(today),
                credit,
            )?;
            committed(storage, user_id, service.committed_version(), account)
        }
        ToolCall::GetAccount { account_id } => snapshot(storage, user_id, |book| {
            book.account(account_id)
                .cloned()
                .ok_or_else(|| LedgerError::account_not_found(account_id.to_string()))
        }),
        ToolCall::ListAccounts { include_archived } => queried(storage, user_id, || {
            AccountService::new(storage, user_id).list(include_archived)
        }),
        ToolCall::UpdateAccount { account_id, update } => {
            let service = AccountService::new(storage, user_id);
            let account = service.update(account_id, &update)?;
            committed(storage, user_id, service.committed_version(), account)
        }
        ToolCall::DeleteAccount { account_id, policy } => {
            let service = AccountService::new(storage, user_id);
            let deletion = match policy {
                Some(policy) => service.delete_with_policy(account_id, policy)?,
                None => service.delete(account_id)?,
            };
            committed(storage, user_id, service.committed_version(), deletion)
        }
        ToolCall::CorrectBalance {
            account_id,
            target,
            date,
        } => {
            let target = Money::from_major(target)?;
            let service = AccountService::new(storage, user_id);
            let transaction =
                service.correct_balance(account_id, target, date.unwrap_or_else(today))?;
            let balance = service.get(account_id)?.balance;
            committed(
                storage,
                user_id,
                service.committed_version(),
                json!({ "transaction": transaction, "account_balance": balance }),
            )
        }
        ToolCall::VerifyBalances => queried(storage, user_id, || {
            AccountService::new(storage, user_id).verify_balances()
        }),

        ToolCall::PostTransaction {
            account_id,
            amount,
            category_id,
            special_type,
            description,
            date,
            goal_id,
            include_health_score,
        } => {
            let service = TransactionService::new(storage, user_id);
            let result = service.post(NewTransaction {
                account_id,
                amount: Money::nonzero_from_major(amount)?,
                category_id,
                special_type,
                description,
                date: date.unwrap_or_else(today),
                goal_id,
            })?;
            let out = committed(storage, user_id, service.committed_version(), result)?;
            attach_health(storage, user_id, out, include_health_score)
        }
        ToolCall::GetTransaction { transaction_id } => snapshot(storage, user_id, |book| {
            book.transaction(transaction_id)
                .cloned()
                .ok_or_else(|| LedgerError::transaction_not_found(transaction_id.to_string()))
        }),
        ToolCall::UpdateTransaction {
            transaction_id,
            patch,
        } => {
            let service = TransactionService::new(storage, user_id);
            let transaction = service.update(transaction_id, &patch)?;
            committed(storage, user_id, service.committed_version(), transaction)
        }
        ToolCall::DeleteTransaction {
            transaction_id,
            include_health_score,
        } => {
            let service = TransactionService::new(storage, user_id);
            let result = service.delete(transaction_id)?;
            let out = committed(storage, user_id, service.committed_version(), result)?;
            attach_health(storage, user_id, out, include_health_score)
        }
        ToolCall::ListTransactions(filter) => queried(storage, user_id, || {
            TransactionService::new(storage, user_id).list(&filter)
        }),
        ToolCall::PostTransfer {
            from_account_id,
            to_account_id,
            amount,
            date,
            description,
            include_health_score,
        } => {
            let service = TransferService::new(storage, user_id);
            let result = service.post_transfer(
                from_account_id,
                to_account_id,
                Money::from_major(amount)?,
                date.unwrap_or_else(today),
                &description,
            )?;
            let out = committed(storage, user_id, service.committed_version(), result)?;
            attach_health(storage, user_id, out, include_health_score)
        }

        ToolCall::CreateCategory {
            name,
            parent_id,
            kind,
        } => {
            let service = CategoryService::new(storage, user_id);
            let kind = match (kind, parent_id) {
                (Some(kind), _) => kind,
                (None, Some(parent)) => service.get(parent)?.kind,
                (None, None) => CategoryKind::Expense,
            };
            let category = service.create(&name, parent_id, kind)?;
            committed(storage, user_id, service.committed_version(), category)
        }
        ToolCall::ListCategories { include_disabled } => queried(storage, user_id, || {
            CategoryService::new(storage, user_id).list(include_disabled)
        }),
        ToolCall::CategoryTree { include_disabled } => queried(storage, user_id, || {
            CategoryService::new(storage, user_id).tree(include_disabled)
        }),
        ToolCall::ResolveCategory { identifier } => queried(storage, user_id, || {
            CategoryService::new(storage, user_id)
                .find(&identifier)?
                .ok_or_else(|| LedgerError::category_not_found(identifier.clone()))
        }),
        ToolCall::DisableCategory { category_id } => {
            let service = CategoryService::new(storage, user_id);
            let affected = service.disable(category_id)?;
            committed(
                storage,
                user_id,
                service.committed_version(),
                json!({ "disabled": affected }),
            )
        }
        ToolCall::EnableCategory { category_id } => {
            let service = CategoryService::new(storage, user_id);
            let affected = service.enable(category_id)?;
            committed(
                storage,
                user_id,
                service.committed_version(),
                json!({ "enabled": affected }),
            )
        }
        ToolCall::MoveCategory {
            category_id,
            new_parent_id,
        } => {
            let service = CategoryService::new(storage, user_id);
            let category = service.move_category(category_id, new_parent_id)?;
            committed(storage, user_id, service.committed_version(), category)
        }
        ToolCall::SuggestCategory { description, kind } => queried(storage, user_id, || {
            CategoryService::new(storage, user_id).suggest(&description, kind)
        }),

        ToolCall::DefineRecurrence {
            account_id,
            category_id,
            amount,
            description,
            special_type,
            frequency,
            interval,
            first_due,
            end_date,
        } => {
            let (frequency, multiplier) = Frequency::parse(&frequency)
                .map_err(|e| LedgerError::Validation(e.to_string()))?;
            let service = RecurrenceService::new(storage, user_id);
            let definition = service.define(NewRecurrence {
                template: RecurrenceTemplate {
                    account_id,
                    category_id,
                    amount: Money::nonzero_from_major(amount)?,
                    description,
                    special_type,
                },
                frequency,
                interval: interval.saturating_mul(multiplier),
                first_due,
                end_date,
            })?;
            committed(storage, user_id, service.committed_version(), definition)
        }
        ToolCall::ListRecurrences { include_completed } => queried(storage, user_id, || {
            RecurrenceService::new(storage, user_id).list(include_completed)
        }),
        ToolCall::AdvanceRecurrence {
            recurrence_id,
            as_of,
        } => {
            let service = RecurrenceService::new(storage, user_id);
            let result = service.advance(recurrence_id, as_of.unwrap_or_else(today))?;
            committed(storage, user_id, service.committed_version(), result)
        }
        ToolCall::AdvanceAllDue { as_of } => {
            let service = RecurrenceService::new(storage, user_id);
            let batch = service.advance_all_due(as_of.unwrap_or_else(today))?;
            committed(storage, user_id, service.committed_version(), batch)
        }
        ToolCall::SkipRecurrence { recurrence_id } => {
            let service = RecurrenceService::new(storage, user_id);
            let definition = service.skip(recurrence_id)?;
            committed(storage, user_id, service.committed_version(), definition)
        }
        ToolCall::CancelRecurrence { recurrence_id } => {
            let service = RecurrenceService::new(storage, user_id);
            let definition = service.cancel(recurrence_id)?;
            committed(storage, user_id, service.committed_version(), definition)
        }
        ToolCall::Upcoming {
            as_of,
            horizon_days,
        } => {
            let as_of = as_of.unwrap_or_else(today);
            queried(storage, user_id, || {
                RecurrenceService::new(storage, user_id).upcoming(as_of, horizon_days)
            })
        }

        ToolCall::CreateBudget {
            name,
            period_type,
            start_date,
            end_date,
            category_ids,
            include_descendants,
            limit,
            filters,
            alert_threshold,
        } => {
            let service = BudgetService::new(storage, user_id);
            let budget = service.create(NewBudget {
                name,
                period_type,
                start_date,
                end_date,
                category_ids,
                include_descendants,
                limit: Money::from_major(limit)?,
                filters,
                alert_threshold,
            })?;
            committed(storage, user_id, service.committed_version(), budget)
        }
        ToolCall::ListBudgets => queried(storage, user_id, || BudgetService::new(storage, user_id).list()),
        ToolCall::DeleteBudget { budget_id } => {
            let service = BudgetService::new(storage, user_id);
            let budget = service.delete(budget_id)?;
            committed(
                storage,
                user_id,
                service.committed_version(),
                json!({ "deleted": budget.id }),
            )
        }
        ToolCall::BudgetStatus { budget_id, as_of } => {
            let as_of = as_of.unwrap_or_else(today);
            snapshot(storage, user_id, |book| {
                let budget = book
                    .budget(budget_id)
                    .ok_or_else(|| LedgerError::budget_not_found(budget_id.to_string()))?;
                BudgetStatusReport::compute(book, budget, as_of)
            })
        }

        ToolCall::CreateGoal {
            name,
            goal_type,
            target,
            target_date,
            priority,
        } => {
            let service = GoalService::new(storage, user_id);
            let goal = service.create(
                &name,
                goal_type,
                Money::from_major(target)?,
                target_date,
                priority,
            )?;
            committed(storage, user_id, service.committed_version(), goal)
        }
        ToolCall::ListGoals { include_abandoned } => queried(storage, user_id, || {
            GoalService::new(storage, user_id).list(include_abandoned)
        }),
        ToolCall::Allocate {
            goal_id,
            transaction_id,
            amount,
            include_health_score,
        } => {
            let service = GoalService::new(storage, user_id);
            let result = service.allocate(goal_id, transaction_id, Money::from_major(amount)?)?;
            let out = committed(storage, user_id, service.committed_version(), result)?;
            attach_health(storage, user_id, out, include_health_score)
        }
        ToolCall::Unlink {
            goal_id,
            transaction_id,
        } => {
            let service = GoalService::new(storage, user_id);
            let result = service.unlink(goal_id, transaction_id)?;
            committed(storage, user_id, service.committed_version(), result)
        }
        ToolCall::GoalProgress { goal_id } => queried(storage, user_id, || {
            GoalService::new(storage, user_id).progress(goal_id)
        }),
        ToolCall::GoalProjection { goal_id, as_of } => {
            let as_of = as_of.unwrap_or_else(today);
            queried(storage, user_id, || {
                GoalService::new(storage, user_id).projection(goal_id, as_of)
            })
        }
        ToolCall::AbandonGoal { goal_id } => {
            let service = GoalService::new(storage, user_id);
            let goal = service.abandon(goal_id)?;
            committed(storage, user_id, service.committed_version(), goal)
        }

        ToolCall::NetWorth {
            as_of,
            include_archived,
        } => snapshot(storage, user_id, |book| {
            NetWorthReport::compute(book, as_of, include_archived)
        }),
        ToolCall::HealthScore { as_of } => {
            let settings = storage.settings().health.clone();
            let as_of = as_of.unwrap_or_else(today);
            snapshot(storage, user_id, |book| HealthReport::compute(book, as_of, &settings))
        }
    }
}

/// Execute one tool call on behalf of a user
pub fn execute(storage: &Storage, user_id: UserId, call: ToolCall) -> ToolResponse {
    let tool = call.name();
    debug!(user = %user_id, tool, command = call.is_command(), "tool call");
    match run(storage, user_id, call) {
        Ok((version, data)) => ToolResponse::success(version, data),
        Err(err) => {
            warn!(user = %user_id, tool, kind = err.kind(), "tool call failed: {}", err);
            ToolResponse::from(err)
        }
    }
}

/// Parse and execute a JSON tool call
pub fn execute_json(storage: &Storage, user_id: UserId, input: &str) -> ToolResponse {
    match serde_json::from_str::<ToolCall>(input) {
        Ok(call) => execute(storage, user_id, call),
        Err(err) => ToolResponse::failure("invalid_request", err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Storage, UserId) {
        let storage = Storage::in_memory();
        let user = UserId::new();
        storage.create_user(user).unwrap();
        CategoryService::new(&storage, user).seed_defaults().unwrap();
        (storage, user)
    }

    fn call(storage: &Storage, user: UserId, value: Value) -> ToolResponse {
        execute_json(storage, user, &value.to_string())
    }

    fn create_account(storage: &Storage, user: UserId, name: &str, balance: f64) -> String {
        let response = call(
            storage,
            user,
            json!({"tool": "create_account", "args": {
                "name": name, "opening_balance": balance, "opened_on": "2025-01-01"
            }}),
        );
        assert!(response.ok, "{:?}", response.error);
        response.data.unwrap()["id"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_transfer_scenario() {
        let (storage, user) = setup();
        let from = create_account(&storage, user, "Checking", 1000.0);
        let to = create_account(&storage, user, "Savings", 500.0);

        let response = call(
            &storage,
            user,
            json!({"tool": "post_transfer", "args": {
                "from_account_id": from, "to_account_id": to, "amount": 200.0,
                "date": "2025-02-01", "include_health_score": true
            }}),
        );
        assert!(response.ok, "{:?}", response.error);
        let data = response.data.unwrap();
        assert_eq!(data["from_balance"], 80000);
        assert_eq!(data["to_balance"], 70000);
        assert!(data["health_score"]["score"].is_number());

        let net_worth = call(&storage, user, json!({"tool": "net_worth", "args": {}}));
        assert_eq!(net_worth.data.unwrap()["summary"]["net_worth"], 150000);
        assert_eq!(net_worth.version, response.version);
    }

    #[test]
    fn test_versions_come_from_the_call_itself() {
        let (storage, user) = setup();
        let account = create_account(&storage, user, "Checking", 100.0);
        let groceries = CategoryService::new(&storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id
            .full();
        let before = current_version(&storage, user).unwrap();

        let posted = call(
            &storage,
            user,
            json!({"tool": "post_transaction", "args": {
                "account_id": account, "amount": -12.0, "category_id": groceries,
                "date": "2025-03-10"
            }}),
        );
        assert!(posted.ok, "{:?}", posted.error);
        assert_eq!(posted.version, Some(before + 1));

        // Nothing to change, so the version found is reported
        let enabled = call(
            &storage,
            user,
            json!({"tool": "enable_category", "args": {"category_id": groceries}}),
        );
        assert!(enabled.ok, "{:?}", enabled.error);
        assert_eq!(enabled.version, Some(before + 1));

        let listed = call(&storage, user, json!({"tool": "list_accounts", "args": {}}));
        assert_eq!(listed.version, Some(before + 1));
    }

    #[test]
    fn test_error_kinds() {
        let (storage, user) = setup();
        let account = create_account(&storage, user, "Checking", 10.0);

        let response = call(
            &storage,
            user,
            json!({"tool": "post_transfer", "args": {
                "from_account_id": account, "to_account_id": account, "amount": 1.0
            }}),
        );
        assert!(!response.ok);
        assert_eq!(response.error_kind(), Some("same_account"));

        let groceries = CategoryService::new(&storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id
            .full();
        let response = call(
            &storage,
            user,
            json!({"tool": "post_transaction", "args": {
                "account_id": account, "amount": 0.0, "category_id": groceries
            }}),
        );
        assert_eq!(response.error_kind(), Some("invalid_amount"));

        let response = call(
            &storage,
            user,
            json!({"tool": "get_account", "args": {"account_id": crate::models::AccountId::new().full()}}),
        );
        assert_eq!(response.error_kind(), Some("not_found"));

        let response = execute_json(&storage, user, "{not json");
        assert_eq!(response.error_kind(), Some("invalid_request"));
        assert!(response.to_json().contains("\"ok\":false"));
    }

    #[test]
    fn test_budget_status_scenario() {
        let (storage, user) = setup();
        let account = create_account(&storage, user, "Checking", 1000.0);
        let groceries = CategoryService::new(&storage, user)
            .find("home/groceries")
            .unwrap()
            .unwrap()
            .id
            .full();

        let budget = call(
            &storage,
            user,
            json!({"tool": "create_budget", "args": {
                "name": "Groceries", "period_type": "monthly", "start_date": "2025-01-01",
                "category_ids": [groceries], "limit": 300.0
            }}),
        );
        assert!(budget.ok, "{:?}", budget.error);
        let budget_id = budget.data.unwrap()["id"].as_str().unwrap().to_string();

        for amount in [-25.0, -15.0] {
            let posted = call(
                &storage,
                user,
                json!({"tool": "post_transaction", "args": {
                    "account_id": account, "amount": amount, "category_id": groceries,
                    "date": "2025-03-10"
                }}),
            );
            assert!(posted.ok, "{:?}", posted.error);
        }

        let status = call(
            &storage,
            user,
            json!({"tool": "budget_status", "args": {"budget_id": budget_id, "as_of": "2025-03-31"}}),
        );
        let data = status.data.unwrap();
        assert_eq!(data["spent"], 4000);
        assert_eq!(data["remaining"], 26000);
    }

    #[test]
    fn test_recurrence_calls() {
        let (storage, user) = setup();
        let account = create_account(&storage, user, "Checking", 5000.0);
        let rent = CategoryService::new(&storage, user)
            .find("home/rent_mortgage")
            .unwrap()
            .unwrap()
            .id
            .full();

        let defined = call(
            &storage,
            user,
            json!({"tool": "define_recurrence", "args": {
                "account_id": account, "category_id": rent, "amount": -1200.0,
                "frequency": "monthly", "first_due": "2025-01-01"
            }}),
        );
        assert!(defined.ok, "{:?}", defined.error);
        let id = defined.data.unwrap()["id"].as_str().unwrap().to_string();

        let advanced = call(
            &storage,
            user,
            json!({"tool": "advance_recurrence", "args": {"recurrence_id": id, "as_of": "2025-02-14"}}),
        );
        let data = advanced.data.unwrap();
        assert_eq!(data["materialized"].as_array().unwrap().len(), 1);
        assert_eq!(data["materialized"][0]["date"], "2025-01-01");
        assert_eq!(data["next_due"], "2025-02-01");

        let too_far = call(
            &storage,
            user,
            json!({"tool": "upcoming", "args": {"as_of": "2025-01-01", "horizon_days": 5000}}),
        );
        assert!(!too_far.ok);
    }
}
