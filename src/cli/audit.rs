//! Audit log CLI commands

use clap::Subcommand;

use crate::error::LedgerResult;
use crate::models::UserId;
use crate::storage::Storage;

/// Audit subcommands
#[derive(Subcommand)]
pub enum AuditCommands {
    /// Show the most recent changes
    Recent {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        count: usize,
    },
}

/// Handle an audit command
pub fn handle_audit_command(storage: &Storage, user_id: UserId, cmd: AuditCommands) -> LedgerResult<()> {
    let Some(logger) = storage.audit() else {
        println!("Audit logging is not enabled for this storage.");
        return Ok(());
    };

    match cmd {
        AuditCommands::Recent { count } => {
            let entries = logger.read_recent(user_id, count)?;
            if entries.is_empty() {
                println!("No audit entries.");
            }
            for entry in entries {
                println!("{}", entry.format_human_readable());
            }
        }
    }

    Ok(())
}
