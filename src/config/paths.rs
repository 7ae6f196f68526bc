//! Path management for Ledgerwise
//!
//! ## Path Resolution Order
//!
//! 1. `LEDGERWISE_DATA_DIR` environment variable (if set)
//! 2. The platform config directory (`~/.config`, `%APPDATA%`, ...) joined with `ledgerwise`

use std::path::PathBuf;

use directories::BaseDirs;

use crate::error::LedgerError;
use crate::models::UserId;

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "LEDGERWISE_DATA_DIR";

/// Manages all paths used by Ledgerwise
#[derive(Debug, Clone)]
pub struct LedgerPaths {
    /// Base directory for all Ledgerwise data
    base_dir: PathBuf,
}

impl LedgerPaths {
    /// Create a new LedgerPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if no override is set and the platform config
    /// directory cannot be determined.
    pub fn new() -> Result<Self, LedgerError> {
        let base_dir = match std::env::var_os(DATA_DIR_ENV) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => resolve_default_path()?,
        };

        Ok(Self { base_dir })
    }

    /// Create LedgerPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the data directory
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Directory holding one book file per user
    pub fn books_dir(&self) -> PathBuf {
        self.data_dir().join("books")
    }

    /// Book file of one user
    pub fn book_file(&self, user_id: UserId) -> PathBuf {
        self.books_dir().join(format!("{}.json", user_id.full()))
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the path to the audit log
    pub fn audit_log(&self) -> PathBuf {
        self.base_dir.join("audit.log")
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), LedgerError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| LedgerError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.books_dir())
            .map_err(|e| LedgerError::Io(format!("Failed to create data directory: {}", e)))?;

        Ok(())
    }

    /// Check if Ledgerwise has been initialized (config file exists)
    pub fn is_initialized(&self) -> bool {
        self.settings_file().exists()
    }
}

fn resolve_default_path() -> Result<PathBuf, LedgerError> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| LedgerError::Config("Could not determine home directory".into()))?;
    Ok(dirs.config_dir().join("ledgerwise"))
}
