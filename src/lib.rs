//! Ledgerwise - personal finance ledger core
//!
//! This library keeps a per-user ledger of accounts, hierarchical categories,
//! transactions and transfers, and derives budgets, goal progress, net worth
//! and a financial health score from it.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration and path management
//! - `error`: Custom error types
//! - `models`: Core data models (accounts, categories, transactions, goals, etc.)
//! - `storage`: Per-user books with versioned, atomic commits
//! - `services`: Business logic layer
//! - `reports`: Net worth, budget status and health score
//! - `audit`: Audit logging system
//! - `api`: JSON tool-call surface
//! - `cli`: Command handlers for the `ledgerwise` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use ledgerwise::config::{LedgerPaths, Settings};
//! use ledgerwise::storage::Storage;
//!
//! let paths = LedgerPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let storage = Storage::open(paths, settings)?;
//! storage.load_all()?;
//! ```

pub mod api;
pub mod audit;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod reports;
pub mod services;
pub mod storage;

pub use error::{LedgerError, LedgerResult};
