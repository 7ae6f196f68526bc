//! Goal CLI commands
//!
//! Savings and loan goals, funded by allocating parts of transactions.

use clap::Subcommand;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{Goal, GoalId, GoalProgress, GoalType, TransactionId, UserId};
use crate::services::GoalService;
use crate::storage::Storage;

use super::{money, parse_amount, parse_date, parse_date_str, parse_id};

/// Goal subcommands
#[derive(Subcommand)]
pub enum GoalCommands {
    /// Create a goal
    Create {
        /// Goal name
        name: String,
        /// Target amount
        target: String,
        /// Target date (YYYY-MM-DD)
        #[arg(long)]
        by: String,
        /// Goal type (savings or loan)
        #[arg(short = 't', long, default_value = "savings")]
        goal_type: String,
        /// Higher priorities are listed first
        #[arg(short, long)]
        priority: Option<u32>,
    },
    /// List goals
    List {
        /// Include abandoned goals
        #[arg(short, long)]
        all: bool,
    },
    /// Credit part of a transaction to a goal
    Allocate {
        /// Goal name or ID
        goal: String,
        /// Transaction ID
        transaction: String,
        /// Amount to allocate
        amount: String,
    },
    /// Remove a transaction's allocation from a goal
    Unlink {
        /// Goal name or ID
        goal: String,
        /// Transaction ID
        transaction: String,
    },
    /// Show progress towards a goal
    Progress {
        /// Goal name or ID
        goal: String,
    },
    /// Forecast when a goal is reached at the recent monthly surplus
    Project {
        /// Goal name or ID
        goal: String,
        /// Forecast date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Stop tracking a goal
    Abandon {
        /// Goal name or ID
        goal: String,
    },
}

/// Find a goal by ID or case-insensitive name
fn find_goal(service: &GoalService<'_>, identifier: &str) -> LedgerResult<Goal> {
    if let Ok(id) = identifier.parse::<GoalId>() {
        return service.get(id);
    }
    service
        .list(true)?
        .into_iter()
        .find(|g| g.name.eq_ignore_ascii_case(identifier.trim()))
        .ok_or_else(|| LedgerError::goal_not_found(identifier))
}

fn print_progress(storage: &Storage, goal: &Goal, progress: &GoalProgress) {
    println!("{} [{}]", goal.name, goal.status);
    println!(
        "  {} of {} ({:.1}%), {} remaining",
        money(storage, progress.current),
        money(storage, progress.target),
        progress.percent_complete,
        money(storage, progress.remaining)
    );
    if let Some(next) = progress.next_milestone {
        println!("  Next milestone: {}%", next);
    }
}

/// Handle a goal command
pub fn handle_goal_command(storage: &Storage, user_id: UserId, cmd: GoalCommands) -> LedgerResult<()> {
    let service = GoalService::new(storage, user_id);

    match cmd {
        GoalCommands::Create {
            name,
            target,
            by,
            goal_type,
            priority,
        } => {
            let goal_type = GoalType::parse(&goal_type).ok_or_else(|| {
                LedgerError::Validation(format!(
                    "Invalid goal type: '{}'. Valid types: savings, loan",
                    goal_type
                ))
            })?;
            let goal = service.create(
                &name,
                goal_type,
                parse_amount(&target)?,
                parse_date_str(&by)?,
                priority,
            )?;
            println!("Created goal: {}", goal);
            println!("  Target date: {}", goal.target_date);
            println!("  ID: {}", goal.id);
        }

        GoalCommands::List { all } => {
            let goals = service.list(all)?;
            if goals.is_empty() {
                println!("No goals found.");
                return Ok(());
            }
            for goal in goals {
                let progress = service.progress(goal.id)?;
                println!(
                    "{}  {:<24} {:>12} / {:<12} {:>5.1}%  {} by {}",
                    goal.id,
                    goal.name,
                    money(storage, progress.current),
                    money(storage, progress.target),
                    progress.percent_complete,
                    goal.status,
                    goal.target_date
                );
            }
        }

        GoalCommands::Allocate {
            goal,
            transaction,
            amount,
        } => {
            let goal = find_goal(&service, &goal)?;
            let transaction_id = parse_id::<TransactionId>("transaction", &transaction)?;
            let result = service.allocate(goal.id, transaction_id, parse_amount(&amount)?)?;
            let goal = service.get(goal.id)?;
            print_progress(storage, &goal, &result.progress);
        }

        GoalCommands::Unlink { goal, transaction } => {
            let goal = find_goal(&service, &goal)?;
            let transaction_id = parse_id::<TransactionId>("transaction", &transaction)?;
            let result = service.unlink(goal.id, transaction_id)?;
            let goal = service.get(goal.id)?;
            print_progress(storage, &goal, &result.progress);
        }

        GoalCommands::Progress { goal } => {
            let goal = find_goal(&service, &goal)?;
            let progress = service.progress(goal.id)?;
            print_progress(storage, &goal, &progress);
            for allocation in service.allocations(goal.id)? {
                println!(
                    "  {} from {}",
                    money(storage, allocation.amount),
                    allocation.transaction_id
                );
            }
        }

        GoalCommands::Project { goal, as_of } => {
            let goal = find_goal(&service, &goal)?;
            let projection = service.projection(goal.id, parse_date(as_of.as_deref())?)?;
            println!("{} [{}]", goal.name, projection.status);
            println!(
                "  {} remaining over {} months: {} needed per month, {} available",
                money(storage, projection.remaining),
                projection.months_remaining,
                money(storage, projection.monthly_needed),
                money(storage, projection.monthly_available)
            );
            match projection.estimated_completion {
                Some(date) => println!("  Estimated completion: {}", date),
                None => println!("  Estimated completion: not at the current surplus"),
            }
        }

        GoalCommands::Abandon { goal } => {
            let goal = find_goal(&service, &goal)?;
            let abandoned = service.abandon(goal.id)?;
            println!("Abandoned goal: {}", abandoned.name);
        }
    }

    Ok(())
}
