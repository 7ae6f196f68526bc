//! Budget CLI commands
//!
//! Implements CLI commands for spending limits over category scopes.

use clap::Subcommand;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Budget, BudgetFilters, BudgetId, PeriodType, UserId};
use crate::reports::BudgetStatusReport;
use crate::services::{BudgetService, NewBudget};
use crate::storage::Storage;

use super::{find_category, money, parse_amount, parse_date, parse_date_str};

/// Budget subcommands
#[derive(Subcommand)]
pub enum BudgetCommands {
    /// Create a budget
    Create {
        /// Budget name
        name: String,
        /// Spending limit per period
        limit: String,
        /// Category path, name or ID; repeat for several
        #[arg(short, long = "category", required = true)]
        categories: Vec<String>,
        /// Period (daily, weekly, monthly, yearly, custom)
        #[arg(short, long, default_value = "monthly")]
        period: String,
        /// First day the budget applies (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start: Option<String>,
        /// Last day, required for custom periods
        #[arg(long)]
        end: Option<String>,
        /// Count only the listed categories, not their descendants
        #[arg(long)]
        exact: bool,
        /// Count income categories as spending reductions
        #[arg(long)]
        include_income: bool,
        /// Count credit and debt postings
        #[arg(long)]
        include_debt_and_credit: bool,
        /// Count balance corrections
        #[arg(long)]
        include_corrections: bool,
        /// Fraction of the limit that flags a budget as near its limit
        #[arg(long)]
        alert: Option<f64>,
    },
    /// List budgets
    List,
    /// Show spending against one budget, or all of them
    Status {
        /// Budget name or ID
        budget: Option<String>,
        /// Date whose period window is reported, defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Delete a budget
    Delete {
        /// Budget name or ID
        budget: String,
    },
}

/// Find a budget by ID or case-insensitive name
pub(crate) fn find_budget(storage: &Storage, user_id: UserId, identifier: &str) -> LedgerResult<Budget> {
    let service = BudgetService::new(storage, user_id);
    if let Ok(id) = identifier.parse::<BudgetId>() {
        return service.get(id);
    }
    service
        .list()?
        .into_iter()
        .find(|b| b.name.eq_ignore_ascii_case(identifier.trim()))
        .ok_or_else(|| LedgerError::budget_not_found(identifier))
}

/// Handle a budget command
pub fn handle_budget_command(
    storage: &Storage,
    user_id: UserId,
    cmd: BudgetCommands,
) -> LedgerResult<()> {
    let service = BudgetService::new(storage, user_id);

    match cmd {
        BudgetCommands::Create {
            name,
            limit,
            categories,
            period,
            start,
            end,
            exact,
            include_income,
            include_debt_and_credit,
            include_corrections,
            alert,
        } => {
            let period_type =
                PeriodType::parse(&period).map_err(|e| LedgerError::Validation(e.to_string()))?;
            let category_ids = categories
                .iter()
                .map(|c| find_category(storage, user_id, c).map(|c| c.id))
                .collect::<LedgerResult<Vec<_>>>()?;

            let budget = service.create(NewBudget {
                name,
                period_type,
                start_date: parse_date(start.as_deref())?,
                end_date: end.as_deref().map(parse_date_str).transpose()?,
                category_ids,
                include_descendants: !exact,
                limit: parse_amount(&limit)?,
                filters: BudgetFilters {
                    include_income,
                    include_debt_and_credit,
                    include_balance_correction: include_corrections,
                },
                alert_threshold: alert,
            })?;

            println!("Created budget: {}", budget);
            println!("  ID: {}", budget.id);
        }

        BudgetCommands::List => {
            let budgets = service.list()?;
            if budgets.is_empty() {
                println!("No budgets found.");
                return Ok(());
            }
            for budget in budgets {
                println!(
                    "{}  {:<24} {:<8} {:>12}",
                    budget.id,
                    budget.name,
                    budget.period_type.to_string(),
                    money(storage, budget.limit)
                );
            }
        }

        BudgetCommands::Status { budget, as_of } => {
            let as_of = parse_date(as_of.as_deref())?;
            let reports = match budget {
                Some(identifier) => {
                    let budget = find_budget(storage, user_id, &identifier)?;
                    vec![BudgetStatusReport::generate(storage, user_id, budget.id, as_of)?]
                }
                None => BudgetStatusReport::generate_all(storage, user_id, as_of)?,
            };
            if reports.is_empty() {
                println!("No budgets found.");
            }
            for report in reports {
                print!("{}", report.format_terminal());
                println!();
            }
        }

        BudgetCommands::Delete { budget } => {
            let found = find_budget(storage, user_id, &budget)?;
            let deleted = service.delete(found.id)?;
            println!("Deleted budget: {}", deleted.name);
        }
    }

    Ok(())
}
