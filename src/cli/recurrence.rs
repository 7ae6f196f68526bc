//! Recurrence CLI commands
//!
//! Define recurring transactions and post their elapsed occurrences.

use clap::Subcommand;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CatchUpPolicy, Frequency, RecurrenceId, RecurrenceTemplate, SpecialType, UserId};
use crate::services::{AdvanceResult, NewRecurrence, RecurrenceService};
use crate::storage::Storage;

use super::{find_account, find_category, money, parse_amount, parse_date, parse_date_str, parse_id};

/// Recurrence subcommands
#[derive(Subcommand)]
pub enum RecurrenceCommands {
    /// Define a recurring transaction
    Add {
        /// Account name or ID
        account: String,
        /// Amount of each occurrence (negative for outflow)
        #[arg(allow_negative_numbers = true)]
        amount: String,
        /// Frequency (daily, weekly, biweekly, monthly, quarterly, yearly)
        frequency: String,
        /// Category path, name or ID
        #[arg(short, long)]
        category: String,
        /// First due date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        first: Option<String>,
        /// Repeat every N periods
        #[arg(short, long, default_value = "1")]
        interval: u32,
        /// Last possible due date (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
        /// Description
        #[arg(short, long, default_value = "")]
        memo: String,
        /// Special type (default, upcoming, subscription, repetitive)
        #[arg(short = 't', long, default_value = "repetitive")]
        special: String,
    },
    /// List recurring transactions
    List {
        /// Include completed and cancelled definitions
        #[arg(short, long)]
        all: bool,
    },
    /// Post elapsed occurrences of one definition
    Advance {
        /// Recurrence ID
        id: String,
        /// Post occurrences due on or before this date, defaults to today
        #[arg(long)]
        as_of: Option<String>,
        /// Catch-up policy (one_per_advance, every_occurrence, latest_only); defaults to the configured one
        #[arg(long)]
        policy: Option<String>,
    },
    /// Post elapsed occurrences of every active definition
    Run {
        /// Post occurrences due on or before this date, defaults to today
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Skip the next occurrence without posting it
    Skip {
        /// Recurrence ID
        id: String,
    },
    /// Cancel a definition; posted occurrences are kept
    Cancel {
        /// Recurrence ID
        id: String,
    },
    /// Show occurrences due soon
    Upcoming {
        /// Start of the horizon, defaults to today
        #[arg(long)]
        as_of: Option<String>,
        /// Horizon length in days
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
}

fn print_advance(storage: &Storage, result: &AdvanceResult) {
    println!(
        "{}: posted {}, passed over {}, next due {} ({:?})",
        result.recurrence_id,
        result.materialized.len(),
        result.passed_over.len(),
        result.next_due,
        result.state
    );
    for txn in &result.materialized {
        println!("  {} {}", txn.date, money(storage, txn.amount));
    }
}

/// Handle a recurrence command
pub fn handle_recurrence_command(
    storage: &Storage,
    user_id: UserId,
    cmd: RecurrenceCommands,
) -> LedgerResult<()> {
    let service = RecurrenceService::new(storage, user_id);

    match cmd {
        RecurrenceCommands::Add {
            account,
            amount,
            frequency,
            category,
            first,
            interval,
            until,
            memo,
            special,
        } => {
            let (frequency, multiplier) =
                Frequency::parse(&frequency).map_err(|e| LedgerError::Validation(e.to_string()))?;
            let special_type = SpecialType::parse(&special).ok_or_else(|| {
                LedgerError::Validation(format!("Invalid special type: '{}'", special))
            })?;
            let definition = service.define(NewRecurrence {
                template: RecurrenceTemplate {
                    account_id: find_account(storage, user_id, &account)?.id,
                    category_id: find_category(storage, user_id, &category)?.id,
                    amount: parse_amount(&amount)?,
                    description: memo,
                    special_type,
                },
                frequency,
                interval: interval.saturating_mul(multiplier),
                first_due: parse_date(first.as_deref())?,
                end_date: until.as_deref().map(parse_date_str).transpose()?,
            })?;

            println!("Defined recurrence: {}", definition);
            println!("  ID: {}", definition.id);
        }

        RecurrenceCommands::List { all } => {
            let definitions = service.list(all)?;
            if definitions.is_empty() {
                println!("No recurring transactions.");
                return Ok(());
            }
            for definition in definitions {
                println!(
                    "{}  {:>12}  {}",
                    definition.id,
                    money(storage, definition.template.amount),
                    definition
                );
            }
        }

        RecurrenceCommands::Advance { id, as_of, policy } => {
            let id = parse_id::<RecurrenceId>("recurrence", &id)?;
            let as_of = parse_date(as_of.as_deref())?;
            let result = match policy {
                Some(policy) => {
                    let policy = CatchUpPolicy::parse(&policy).ok_or_else(|| {
                        LedgerError::Validation(format!(
                            "Invalid catch-up policy: '{}'. Valid policies: one_per_advance, every_occurrence, latest_only",
                            policy
                        ))
                    })?;
                    service.advance_with_policy(id, as_of, policy)?
                }
                None => service.advance(id, as_of)?,
            };
            print_advance(storage, &result);
        }

        RecurrenceCommands::Run { as_of } => {
            let batch = service.advance_all_due(parse_date(as_of.as_deref())?)?;
            println!(
                "Advanced {} recurrence(s), posted {} transaction(s)",
                batch.advanced.len(),
                batch.materialized_count()
            );
            for result in &batch.advanced {
                print_advance(storage, result);
            }
            for (id, reason) in &batch.failed {
                println!("  {} failed: {}", id, reason);
            }
        }

        RecurrenceCommands::Skip { id } => {
            let definition = service.skip(parse_id::<RecurrenceId>("recurrence", &id)?)?;
            println!("Skipped occurrence; next due {}", definition.next_due);
        }

        RecurrenceCommands::Cancel { id } => {
            let definition = service.cancel(parse_id::<RecurrenceId>("recurrence", &id)?)?;
            println!("Cancelled recurrence: {}", definition.template.description);
        }

        RecurrenceCommands::Upcoming { as_of, days } => {
            let entries = service.upcoming(parse_date(as_of.as_deref())?, days)?;
            if entries.is_empty() {
                println!("Nothing due in the next {} days.", days);
                return Ok(());
            }
            for entry in entries {
                println!(
                    "{}  {:>12}  {} ({})",
                    entry.due,
                    money(storage, entry.amount),
                    entry.description,
                    entry.special_type
                );
            }
        }
    }

    Ok(())
}
