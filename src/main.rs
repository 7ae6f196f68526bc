use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};

use ledgerwise::cli::{
    handle_account_command, handle_audit_command, handle_budget_command, handle_category_command,
    handle_goal_command, handle_recurrence_command, handle_report_command, handle_tool_command,
    handle_transaction_command, handle_transfer_command, AccountCommands, AuditCommands,
    BudgetCommands, CategoryCommands, GoalCommands, RecurrenceCommands, ReportCommands,
    TransactionCommands,
};
use ledgerwise::config::{LedgerPaths, Settings};
use ledgerwise::models::UserId;
use ledgerwise::services::CategoryService;
use ledgerwise::storage::Storage;

#[derive(Parser)]
#[command(
    name = "ledgerwise",
    version,
    about = "Personal finance ledger with budgets, goals and recurring transactions",
    long_about = "Ledgerwise keeps a multi-account ledger with hierarchical categories, \
                  transfers, recurring transactions, budgets and savings or loan goals, \
                  and reports net worth and a financial health score."
)]
struct Cli {
    /// User whose book to operate on; defaults to the user created by `init`
    #[arg(long, global = true, env = "LEDGERWISE_USER")]
    user: Option<UserId>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a book with the default categories
    Init,

    /// Show current configuration and paths
    Config,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Transaction management commands
    #[command(subcommand, alias = "txn")]
    Transaction(TransactionCommands),

    /// Move money between two accounts
    Transfer {
        /// Source account name or ID
        from: String,
        /// Destination account name or ID
        to: String,
        /// Amount to move (positive)
        amount: String,
        /// Transfer date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<String>,
        /// Description
        #[arg(short, long, default_value = "")]
        memo: String,
    },

    /// Category management commands
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Recurring transaction commands
    #[command(subcommand, alias = "recur")]
    Recurrence(RecurrenceCommands),

    /// Budget management commands
    #[command(subcommand)]
    Budget(BudgetCommands),

    /// Savings and loan goal commands
    #[command(subcommand)]
    Goal(GoalCommands),

    /// Reports
    #[command(subcommand)]
    Report(ReportCommands),

    /// Audit log commands
    #[command(subcommand)]
    Audit(AuditCommands),

    /// Execute a JSON tool call, read from the argument or stdin
    Tool {
        /// `{"tool": ..., "args": ...}` document
        json: Option<String>,
    },
}

fn main() -> Result<()> {
    ledgerwise::logging::init();
    let cli = Cli::parse();

    // Initialize paths and settings
    let paths = LedgerPaths::new()?;
    let mut settings = Settings::load_or_create(&paths)?;

    let Some(command) = cli.command else {
        println!("Ledgerwise - personal finance ledger");
        println!();
        println!("Run 'ledgerwise --help' for usage information.");
        println!("Run 'ledgerwise init' to create your book.");
        return Ok(());
    };

    match command {
        Commands::Init => {
            let user_id = cli
                .user
                .or(settings.default_user)
                .unwrap_or_else(UserId::new);
            settings.default_user = Some(user_id);
            settings.save(&paths)?;

            println!("Initializing Ledgerwise at: {}", paths.data_dir().display());
            let storage = Storage::open(paths, settings)?;
            storage.load_all()?;
            let created = storage.create_user(user_id)?;
            let seeded = CategoryService::new(&storage, user_id).seed_defaults()?;

            if created {
                println!("Created book for user {}", user_id.full());
            } else {
                println!("Book for user {} already exists", user_id.full());
            }
            println!("Seeded {} default categories.", seeded);
            println!();
            println!("Run 'ledgerwise category list' to see all categories.");
            return Ok(());
        }
        Commands::Config => {
            println!("Ledgerwise Configuration");
            println!("========================");
            println!("Base directory: {}", paths.base_dir().display());
            println!("Data directory: {}", paths.data_dir().display());
            println!("Settings file:  {}", paths.settings_file().display());
            println!("Audit log:      {}", paths.audit_log().display());
            println!();
            println!("Settings:");
            match settings.default_user {
                Some(user) => println!("  Default user: {}", user.full()),
                None => println!("  Default user: (none)"),
            }
            println!("  Currency symbol: {}", settings.currency_symbol);
            println!("  Max category depth: {}", settings.max_category_depth);
            println!("  Account delete policy: {:?}", settings.account_delete_policy);
            println!("  Recurrence catch-up: {:?}", settings.recurrence_catch_up);
            return Ok(());
        }
        _ => {}
    }

    let user_id = cli
        .user
        .or(settings.default_user)
        .ok_or_else(|| anyhow!("No user configured. Run 'ledgerwise init' first."))?;

    // Initialize storage
    let storage = Storage::open(paths, settings)?;
    storage.load_all()?;
    if !storage.has_user(user_id) {
        return Err(anyhow!(
            "No book for user {}. Run 'ledgerwise init' first.",
            user_id.full()
        ));
    }

    match command {
        Commands::Account(cmd) => handle_account_command(&storage, user_id, cmd)?,
        Commands::Transaction(cmd) => handle_transaction_command(&storage, user_id, cmd)?,
        Commands::Transfer {
            from,
            to,
            amount,
            date,
            memo,
        } => handle_transfer_command(&storage, user_id, &from, &to, &amount, date.as_deref(), &memo)?,
        Commands::Category(cmd) => handle_category_command(&storage, user_id, cmd)?,
        Commands::Recurrence(cmd) => handle_recurrence_command(&storage, user_id, cmd)?,
        Commands::Budget(cmd) => handle_budget_command(&storage, user_id, cmd)?,
        Commands::Goal(cmd) => handle_goal_command(&storage, user_id, cmd)?,
        Commands::Report(cmd) => handle_report_command(&storage, user_id, cmd)?,
        Commands::Audit(cmd) => handle_audit_command(&storage, user_id, cmd)?,
        Commands::Tool { json } => {
            if !handle_tool_command(&storage, user_id, json)? {
                std::process::exit(1);
            }
        }
        Commands::Init | Commands::Config => {}
    }

    Ok(())
}
