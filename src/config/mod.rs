//! Configuration module for Ledgerwise
//!
//! This module provides configuration management including:
//! - Platform path resolution with an environment override
//! - User settings persistence
//! - Ledger policies (deletion, catch-up, retry, health weights)

pub mod paths;
pub mod settings;

pub use paths::LedgerPaths;
pub use settings::{
    AccountDeletePolicy, HealthSettings, HealthWeights, RetrySettings, Settings,
};
