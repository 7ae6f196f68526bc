//! Custom error types for Ledgerwise
//!
//! This module defines the error hierarchy for the ledger core using thiserror.
//! The first group of variants are the domain errors every caller must handle;
//! the rest cover configuration and persistence failures.

use thiserror::Error;

/// The main error type for ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Referenced entity is missing or not owned by the caller
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Zero, negative where disallowed, or non-finite amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Category cycle, flag mismatch or depth overflow
    #[error("Invalid category hierarchy: {0}")]
    InvalidHierarchy(String),

    /// Transfer from an account to itself
    #[error("Source and destination are the same account: {0}")]
    SameAccount(String),

    /// Attempted mutation of a field that is locked after creation
    #[error("Field '{field}' cannot be changed after creation")]
    Immutable { field: &'static str },

    /// Allocations would exceed the magnitude of the transaction
    #[error(
        "Allocation exceeds transaction {transaction}: {allocated} already allocated, \
         {requested} requested, {available} available"
    )]
    ExceedsTransaction {
        transaction: String,
        allocated: i64,
        requested: i64,
        available: i64,
    },

    /// Optimistic concurrency version mismatch
    #[error("Concurrent modification of {entity_type} {identifier}, retry the operation")]
    Conflict {
        entity_type: &'static str,
        identifier: String,
    },

    /// Operation blocked by live references
    #[error("In use: {0}")]
    InUse(String),

    /// Validation errors for data models
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Create a "not found" error for users without a book
    pub fn user_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "User",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for accounts
    pub fn account_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Account",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for categories
    pub fn category_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Category",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for transactions
    pub fn transaction_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Transaction",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for recurrence definitions
    pub fn recurrence_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Recurrence",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for budgets
    pub fn budget_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Budget",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for goals
    pub fn goal_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Goal",
            identifier: identifier.into(),
        }
    }

    /// Create a "not found" error for goal allocations
    pub fn allocation_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Allocation",
            identifier: identifier.into(),
        }
    }

    /// Create a conflict error for an aggregate
    pub fn conflict(entity_type: &'static str, identifier: impl Into<String>) -> Self {
        Self::Conflict {
            entity_type,
            identifier: identifier.into(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Stable machine-readable code, used by the tool boundary
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidHierarchy(_) => "invalid_hierarchy",
            Self::SameAccount(_) => "same_account",
            Self::Immutable { .. } => "immutable",
            Self::ExceedsTransaction { .. } => "exceeds_transaction",
            Self::Conflict { .. } => "conflict",
            Self::InUse(_) => "in_use",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::Config("test error".into());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_not_found_error() {
        let err = LedgerError::account_not_found("Checking");
        assert_eq!(err.to_string(), "Account not found: Checking");
        assert!(err.is_not_found());
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_immutable_error_names_field() {
        let err = LedgerError::Immutable { field: "amount" };
        assert_eq!(
            err.to_string(),
            "Field 'amount' cannot be changed after creation"
        );
        assert_eq!(err.kind(), "immutable");
    }

    #[test]
    fn test_conflict_error() {
        let err = LedgerError::conflict("Account", "acc-12345678");
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_exceeds_transaction_error() {
        let err = LedgerError::ExceedsTransaction {
            transaction: "txn-1".into(),
            allocated: 3000,
            requested: 5000,
            available: 2000,
        };
        assert!(err.to_string().contains("3000 already allocated"));
        assert_eq!(err.kind(), "exceeds_transaction");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LedgerError = io_err.into();
        assert!(matches!(err, LedgerError::Io(_)));
    }
}
