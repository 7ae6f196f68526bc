//! Category CLI commands
//!
//! Implements CLI commands for the category hierarchy.

use clap::Subcommand;

use crate::error::{LedgerError, LedgerResult};
use crate::models::{CategoryId, CategoryKind, UserId};
use crate::services::{CategoryNode, CategoryService};
use crate::storage::Storage;

use super::find_category;

/// Category subcommands
#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List all categories as a tree
    List {
        /// Include disabled categories
        #[arg(short, long)]
        all: bool,
    },

    /// Create a new category
    Create {
        /// Category name
        name: String,
        /// Parent category path, name or ID; omit for a new root
        #[arg(short, long)]
        parent: Option<String>,
        /// Kind (income or expense); defaults to the parent's kind
        #[arg(short, long)]
        kind: Option<String>,
    },

    /// Show category details
    Show {
        /// Category path, name or ID
        category: String,
    },

    /// Move a category under a new parent
    Move {
        /// Category path, name or ID
        category: String,
        /// New parent; omit to make it a root
        #[arg(short, long)]
        to: Option<String>,
    },

    /// Disable a category and its descendants
    Disable {
        /// Category path, name or ID
        category: String,
    },

    /// Re-enable a category and its descendants
    Enable {
        /// Category path, name or ID
        category: String,
    },

    /// Suggest categories for a description
    Suggest {
        /// Transaction description
        description: String,
        /// Restrict to a kind (income or expense)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

fn parse_kind(kind: &str) -> LedgerResult<CategoryKind> {
    CategoryKind::parse(kind).ok_or_else(|| {
        LedgerError::Validation(format!(
            "Invalid category kind: '{}'. Valid kinds: income, expense",
            kind
        ))
    })
}

/// Slash-separated path of names, disabled categories included
fn path_of(storage: &Storage, user_id: UserId, id: CategoryId) -> LedgerResult<String> {
    storage.read(user_id, |book| {
        let names: Vec<&str> = book
            .category_path(id)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        Ok(names.join("/"))
    })
}

fn print_tree(nodes: &[CategoryNode], depth: usize) {
    for node in nodes {
        println!(
            "{}{} ({}){}",
            "  ".repeat(depth),
            node.category.display_name,
            node.category.name,
            if node.category.enabled { "" } else { " [disabled]" }
        );
        print_tree(&node.children, depth + 1);
    }
}

/// Handle a category command
pub fn handle_category_command(
    storage: &Storage,
    user_id: UserId,
    cmd: CategoryCommands,
) -> LedgerResult<()> {
    let service = CategoryService::new(storage, user_id);

    match cmd {
        CategoryCommands::List { all } => {
            let tree = service.tree(all)?;
            if tree.is_empty() {
                println!("No categories found. Run 'ledgerwise init' first.");
                return Ok(());
            }
            print_tree(&tree, 0);
        }

        CategoryCommands::Create { name, parent, kind } => {
            let parent = parent
                .map(|p| find_category(storage, user_id, &p))
                .transpose()?;
            let kind = match (kind, &parent) {
                (Some(kind), _) => parse_kind(&kind)?,
                (None, Some(parent)) => parent.kind,
                (None, None) => CategoryKind::Expense,
            };
            let category = service.create(&name, parent.as_ref().map(|p| p.id), kind)?;

            println!("Created category: {}", category.display_name);
            if let Some(parent) = parent {
                println!("  Parent: {}", parent.display_name);
            }
            println!("  Kind: {}", category.kind);
            println!("  ID: {}", category.id);
        }

        CategoryCommands::Show { category } => {
            let found = find_category(storage, user_id, &category)?;
            println!("{}", found.display_name);
            println!("  Path: {}", path_of(storage, user_id, found.id)?);
            println!("  Kind: {}", found.kind);
            println!("  Used: {} time(s)", found.usage_count);
            println!("  Enabled: {}", if found.enabled { "Yes" } else { "No" });
            if !found.keywords.is_empty() {
                println!("  Keywords: {}", found.keywords.join(", "));
            }
            println!("  ID: {}", found.id);
        }

        CategoryCommands::Move { category, to } => {
            let found = find_category(storage, user_id, &category)?;
            let new_parent = to
                .map(|t| find_category(storage, user_id, &t).map(|c| c.id))
                .transpose()?;
            let moved = service.move_category(found.id, new_parent)?;
            println!("Moved category: {}", moved.display_name);
        }

        CategoryCommands::Disable { category } => {
            let found = find_category(storage, user_id, &category)?;
            let affected = service.disable(found.id)?;
            println!(
                "Disabled {} ({} categories affected)",
                found.display_name,
                affected.len()
            );
        }

        CategoryCommands::Enable { category } => {
            let found = find_category(storage, user_id, &category)?;
            let affected = service.enable(found.id)?;
            println!(
                "Enabled {} ({} categories affected)",
                found.display_name,
                affected.len()
            );
        }

        CategoryCommands::Suggest { description, kind } => {
            let kind = kind.as_deref().map(parse_kind).transpose()?;
            let suggestions = service.suggest(&description, kind)?;
            if suggestions.category_ids.is_empty() {
                println!("No suggestions.");
                return Ok(());
            }
            for (rank, id) in suggestions.category_ids.iter().enumerate() {
                println!("{}. {}", rank + 1, path_of(storage, user_id, *id)?);
            }
        }
    }

    Ok(())
}
