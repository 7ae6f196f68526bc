//! Tool call requests
//!
//! A call is a JSON object `{"tool": "<name>", "args": {...}}`. Amounts are
//! decimal numbers in major units and are converted to cents on dispatch.
//! Omitted dates default to today.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::config::AccountDeletePolicy;
use crate::models::{
    AccountId, AccountType, BudgetFilters, BudgetId, CategoryId, CategoryKind, CreditCardDetails,
    GoalId, GoalType, PeriodType, RecurrenceId, SpecialType, TransactionId, TransactionPatch,
};
use crate::services::{AccountUpdate, TransactionFilter};

fn default_true() -> bool {
    true
}

fn default_interval() -> u32 {
    1
}

fn default_horizon_days() -> u32 {
    30
}

/// Every command and query exposed to tool clients
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    // Accounts
    CreateAccount {
        name: String,
        #[serde(rename = "type", default)]
        account_type: AccountType,
        #[serde(default)]
        opening_balance: f64,
        #[serde(default)]
        opened_on: Option<NaiveDate>,
        #[serde(default)]
        credit: Option<CreditCardDetails>,
    },
    GetAccount {
        account_id: AccountId,
    },
    ListAccounts {
        #[serde(default)]
        include_archived: bool,
    },
    UpdateAccount {
        account_id: AccountId,
        update: AccountUpdate,
    },
    DeleteAccount {
        account_id: AccountId,
        #[serde(default)]
        policy: Option<AccountDeletePolicy>,
    },
    CorrectBalance {
        account_id: AccountId,
        target: f64,
        #[serde(default)]
        date: Option<NaiveDate>,
    },
    VerifyBalances,

    // Transactions and transfers
    PostTransaction {
        account_id: AccountId,
        amount: f64,
        category_id: CategoryId,
        #[serde(default)]
        special_type: SpecialType,
        #[serde(default)]
        description: String,
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        goal_id: Option<GoalId>,
        #[serde(default)]
        include_health_score: bool,
    },
    GetTransaction {
        transaction_id: TransactionId,
    },
    UpdateTransaction {
        transaction_id: TransactionId,
        patch: TransactionPatch,
    },
    DeleteTransaction {
        transaction_id: TransactionId,
        #[serde(default)]
        include_health_score: bool,
    },
    ListTransactions(TransactionFilter),
    PostTransfer {
        from_account_id: AccountId,
        to_account_id: AccountId,
        amount: f64,
        #[serde(default)]
        date: Option<NaiveDate>,
        #[serde(default)]
        description: String,
        #[serde(default)]
        include_health_score: bool,
    },

    // Categories
    CreateCategory {
        name: String,
        #[serde(default)]
        parent_id: Option<CategoryId>,
        #[serde(default)]
        kind: Option<CategoryKind>,
    },
    ListCategories {
        #[serde(default)]
        include_disabled: bool,
    },
    CategoryTree {
        #[serde(default)]
        include_disabled: bool,
    },
    ResolveCategory {
        identifier: String,
    },
    DisableCategory {
        category_id: CategoryId,
    },
    EnableCategory {
        category_id: CategoryId,
    },
    MoveCategory {
        category_id: CategoryId,
        #[serde(default)]
        new_parent_id: Option<CategoryId>,
    },
    SuggestCategory {
        description: String,
        #[serde(default)]
        kind: Option<CategoryKind>,
    },

    // Recurrence
    DefineRecurrence {
        account_id: AccountId,
        category_id: CategoryId,
        amount: f64,
        #[serde(default)]
        description: String,
        #[serde(default)]
        special_type: SpecialType,
        /// daily, weekly, biweekly, monthly, quarterly or yearly
        frequency: String,
        #[serde(default = "default_interval")]
        interval: u32,
        first_due: NaiveDate,
        #[serde(default)]
        end_date: Option<NaiveDate>,
    },
    ListRecurrences {
        #[serde(default)]
        include_completed: bool,
    },
    AdvanceRecurrence {
        recurrence_id: RecurrenceId,
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },
    AdvanceAllDue {
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },
    SkipRecurrence {
        recurrence_id: RecurrenceId,
    },
    CancelRecurrence {
        recurrence_id: RecurrenceId,
    },
    Upcoming {
        #[serde(default)]
        as_of: Option<NaiveDate>,
        #[serde(default = "default_horizon_days")]
        horizon_days: u32,
    },

    // Budgets
    CreateBudget {
        name: String,
        #[serde(default)]
        period_type: PeriodType,
        start_date: NaiveDate,
        #[serde(default)]
        end_date: Option<NaiveDate>,
        category_ids: Vec<CategoryId>,
        #[serde(default = "default_true")]
        include_descendants: bool,
        limit: f64,
        #[serde(default)]
        filters: BudgetFilters,
        #[serde(default)]
        alert_threshold: Option<f64>,
    },
    ListBudgets,
    DeleteBudget {
        budget_id: BudgetId,
    },
    BudgetStatus {
        budget_id: BudgetId,
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },

    // Goals
    CreateGoal {
        name: String,
        goal_type: GoalType,
        target: f64,
        target_date: NaiveDate,
        #[serde(default)]
        priority: Option<u32>,
    },
    ListGoals {
        #[serde(default)]
        include_abandoned: bool,
    },
    Allocate {
        goal_id: GoalId,
        transaction_id: TransactionId,
        amount: f64,
        #[serde(default)]
        include_health_score: bool,
    },
    Unlink {
        goal_id: GoalId,
        transaction_id: TransactionId,
    },
    GoalProgress {
        goal_id: GoalId,
    },
    GoalProjection {
        goal_id: GoalId,
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },
    AbandonGoal {
        goal_id: GoalId,
    },

    // Aggregations
    NetWorth {
        #[serde(default)]
        as_of: Option<NaiveDate>,
        #[serde(default)]
        include_archived: bool,
    },
    HealthScore {
        #[serde(default)]
        as_of: Option<NaiveDate>,
    },
}

impl ToolCall {
    /// Name of the tool, as it appears in the `tool` field
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateAccount { .. } => "create_account",
            Self::GetAccount { .. } => "get_account",
            Self::ListAccounts { .. } => "list_accounts",
            Self::UpdateAccount { .. } => "update_account",
            Self::DeleteAccount { .. } => "delete_account",
            Self::CorrectBalance { .. } => "correct_balance",
            Self::VerifyBalances => "verify_balances",
            Self::PostTransaction { .. } => "post_transaction",
            Self::GetTransaction { .. } => "get_transaction",
            Self::UpdateTransaction { .. } => "update_transaction",
            Self::DeleteTransaction { .. } => "delete_transaction",
            Self::ListTransactions(_) => "list_transactions",
            Self::PostTransfer { .. } => "post_transfer",
            Self::CreateCategory { .. } => "create_category",
            Self::ListCategories { .. } => "list_categories",
            Self::CategoryTree { .. } => "category_tree",
            Self::ResolveCategory { .. } => "resolve_category",
            Self::DisableCategory { .. } => "disable_category",
            Self::EnableCategory { .. } => "enable_category",
            Self::MoveCategory { .. } => "move_category",
            Self::SuggestCategory { .. } => "suggest_category",
            Self::DefineRecurrence { .. } => "define_recurrence",
            Self::ListRecurrences { .. } => "list_recurrences",
            Self::AdvanceRecurrence { .. } => "advance_recurrence",
            Self::AdvanceAllDue { .. } => "advance_all_due",
            Self::SkipRecurrence { .. } => "skip_recurrence",
            Self::CancelRecurrence { .. } => "cancel_recurrence",
            Self::Upcoming { .. } => "upcoming",
            Self::CreateBudget { .. } => "create_budget",
            Self::ListBudgets => "list_budgets",
            Self::DeleteBudget { .. } => "delete_budget",
            Self::BudgetStatus { .. } => "budget_status",
            Self::CreateGoal { .. } => "create_goal",
            Self::ListGoals { .. } => "list_goals",
            Self::Allocate { .. } => "allocate",
            Self::Unlink { .. } => "unlink",
            Self::GoalProgress { .. } => "goal_progress",
            Self::GoalProjection { .. } => "goal_projection",
            Self::AbandonGoal { .. } => "abandon_goal",
            Self::NetWorth { .. } => "net_worth",
            Self::HealthScore { .. } => "health_score",
        }
    }

    /// Whether the call can change stored data
    pub fn is_command(&self) -> bool {
        !matches!(
            self,
            Self::GetAccount { .. }
                | Self::ListAccounts { .. }
                | Self::VerifyBalances
                | Self::GetTransaction { .. }
                | Self::ListTransactions(_)
                | Self::ListCategories { .. }
                | Self::CategoryTree { .. }
                | Self::ResolveCategory { .. }
                | Self::SuggestCategory { .. }
                | Self::ListRecurrences { .. }
                | Self::Upcoming { .. }
                | Self::ListBudgets
                | Self::BudgetStatus { .. }
                | Self::ListGoals { .. }
                | Self::GoalProgress { .. }
                | Self::GoalProjection { .. }
                | Self::NetWorth { .. }
                | Self::HealthScore { .. }
        )
    }
}
