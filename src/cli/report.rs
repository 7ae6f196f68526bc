//! CLI commands for reports
//!
//! Net worth, budget status and the financial health score, printed for the
//! terminal or exported as JSON.

use std::path::PathBuf;

use clap::Subcommand;
use serde::Serialize;

use crate::error::LedgerResult;
use crate::models::UserId;
use crate::reports::{BudgetStatusReport, HealthReport, NetWorthReport};
use crate::storage::{write_json_atomic, Storage};

use super::budget::find_budget;
use super::{parse_date, parse_date_str};

/// Report subcommands
#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// Assets, liabilities and net worth by account type
    #[command(alias = "networth")]
    NetWorth {
        /// Balances as of this date (YYYY-MM-DD), defaults to current balances
        #[arg(long)]
        as_of: Option<String>,

        /// Include archived accounts
        #[arg(short, long)]
        all: bool,

        /// Export to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Spending against budgets
    Budget {
        /// Budget name or ID; all budgets when omitted
        budget: Option<String>,

        /// Date whose period window is reported, defaults to today
        #[arg(long)]
        as_of: Option<String>,

        /// Export to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Financial health score
    Health {
        /// Score as of this date, defaults to today
        #[arg(long)]
        as_of: Option<String>,

        /// Export to a JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Handle report commands
pub fn handle_report_command(storage: &Storage, user_id: UserId, cmd: ReportCommands) -> LedgerResult<()> {
    match cmd {
        ReportCommands::NetWorth { as_of, all, output } => {
            let as_of = as_of.as_deref().map(parse_date_str).transpose()?;
            let report = NetWorthReport::generate(storage, user_id, as_of, all)?;
            emit(&report, output, || report.format_terminal())
        }
        ReportCommands::Budget {
            budget,
            as_of,
            output,
        } => {
            let as_of = parse_date(as_of.as_deref())?;
            let reports = match budget {
                Some(identifier) => {
                    let budget = find_budget(storage, user_id, &identifier)?;
                    vec![BudgetStatusReport::generate(storage, user_id, budget.id, as_of)?]
                }
                None => BudgetStatusReport::generate_all(storage, user_id, as_of)?,
            };
            emit(&reports, output, || {
                if reports.is_empty() {
                    return "No budgets found.\n".to_string();
                }
                reports
                    .iter()
                    .map(|r| r.format_terminal())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        ReportCommands::Health { as_of, output } => {
            let report = HealthReport::generate(storage, user_id, parse_date(as_of.as_deref())?)?;
            emit(&report, output, || report.format_terminal())
        }
    }
}

/// Write the report to `output` as JSON, or print it
fn emit<T: Serialize>(
    report: &T,
    output: Option<PathBuf>,
    format_terminal: impl FnOnce() -> String,
) -> LedgerResult<()> {
    match output {
        Some(path) => {
            write_json_atomic(&path, report)?;
            println!("Report exported to: {}", path.display());
        }
        None => print!("{}", format_terminal()),
    }
    Ok(())
}
