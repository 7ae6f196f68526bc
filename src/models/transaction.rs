//! Transaction model
//!
//! A transaction is a signed posting against one account. Transfers are two
//! transactions referencing each other. Only the description and category of
//! a posted transaction can change; everything else is fixed at creation.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, CategoryId, GoalId, RecurrenceId, TransactionId, UserId};
use super::money::Money;

/// How a transaction came about and how aggregates treat it
///
/// Every consumer matches on this exhaustively so adding a variant forces a
/// decision at each site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialType {
    /// Ordinary posting
    #[default]
    Default,
    /// Planned one-off or recurring entry, previewed before it is due
    Upcoming,
    /// Recurring subscription charge
    Subscription,
    /// Other repetitive charge
    Repetitive,
    /// Money lent out, tracked against a loan goal
    Credit,
    /// Money borrowed, tracked against a loan goal
    Debt,
}

impl SpecialType {
    pub fn all() -> &'static [SpecialType] {
        &[
            Self::Default,
            Self::Upcoming,
            Self::Subscription,
            Self::Repetitive,
            Self::Credit,
            Self::Debt,
        ]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "upcoming" => Some(Self::Upcoming),
            "subscription" => Some(Self::Subscription),
            "repetitive" => Some(Self::Repetitive),
            "credit" => Some(Self::Credit),
            "debt" => Some(Self::Debt),
            _ => None,
        }
    }

    /// Whether budgets count this type without `include_debt_and_credit`
    pub fn counts_toward_budget(&self) -> bool {
        match self {
            Self::Default | Self::Upcoming | Self::Subscription | Self::Repetitive => true,
            Self::Credit | Self::Debt => false,
        }
    }

    /// Whether a recurrence of this type shows up in upcoming previews
    pub fn produces_upcoming_preview(&self) -> bool {
        match self {
            Self::Default | Self::Upcoming => true,
            Self::Subscription | Self::Repetitive | Self::Credit | Self::Debt => false,
        }
    }

    /// Whether a recurrence definition may carry this type
    pub fn allowed_for_recurrence(&self) -> bool {
        match self {
            Self::Default | Self::Upcoming | Self::Subscription | Self::Repetitive => true,
            Self::Credit | Self::Debt => false,
        }
    }

    /// Whether postings of this type must reference a loan goal
    pub fn requires_goal_link(&self) -> bool {
        match self {
            Self::Credit | Self::Debt => true,
            Self::Default | Self::Upcoming | Self::Subscription | Self::Repetitive => false,
        }
    }
}

impl fmt::Display for SpecialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Upcoming => write!(f, "upcoming"),
            Self::Subscription => write!(f, "subscription"),
            Self::Repetitive => write!(f, "repetitive"),
            Self::Credit => write!(f, "credit"),
            Self::Debt => write!(f, "debt"),
        }
    }
}

/// A financial transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique identifier
    pub id: TransactionId,

    /// Owning user
    pub user_id: UserId,

    /// The account this transaction belongs to
    pub account_id: AccountId,

    /// Amount (positive for inflow, negative for outflow)
    pub amount: Money,

    /// Category, `None` only for transfer legs
    pub category_id: Option<CategoryId>,

    /// Free text description
    #[serde(default)]
    pub description: String,

    /// Transaction date
    pub date: NaiveDate,

    #[serde(default)]
    pub special_type: SpecialType,

    /// The other leg of a transfer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paired_transaction_id: Option<TransactionId>,

    /// Recurrence definition that materialized this transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence_id: Option<RecurrenceId>,

    /// Due date of the occurrence this transaction materialized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_due: Option<NaiveDate>,

    /// Loan or savings goal this transaction was posted against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<GoalId>,

    /// Optimistic concurrency version
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new categorized transaction
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        amount: Money,
        category_id: Option<CategoryId>,
        date: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            user_id,
            account_id,
            amount,
            category_id,
            description: String::new(),
            date,
            special_type: SpecialType::Default,
            paired_transaction_id: None,
            recurrence_id: None,
            occurrence_due: None,
            goal_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder-style description setter
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder-style special type setter
    pub fn with_special_type(mut self, special_type: SpecialType) -> Self {
        self.special_type = special_type;
        self
    }

    /// Check if this is a transfer leg
    pub fn is_transfer(&self) -> bool {
        self.paired_transaction_id.is_some()
    }

    /// Check if this is an inflow (positive amount)
    pub fn is_inflow(&self) -> bool {
        self.amount.is_positive()
    }

    /// Check if this is an outflow (negative amount)
    pub fn is_outflow(&self) -> bool {
        self.amount.is_negative()
    }

    /// Validate the transaction
    pub fn validate(&self) -> Result<(), TransactionValidationError> {
        if self.amount.is_zero() {
            return Err(TransactionValidationError::ZeroAmount);
        }

        if self.description.len() > 500 {
            return Err(TransactionValidationError::DescriptionTooLong(
                self.description.len(),
            ));
        }

        if self.category_id.is_none() && !self.is_transfer() {
            return Err(TransactionValidationError::MissingCategory);
        }

        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.date.format("%Y-%m-%d"),
            self.description,
            self.amount
        )
    }
}

/// The fields a client may patch on a posted transaction
///
/// The remaining fields exist so a patch naming them can be rejected with
/// `Immutable` instead of being silently dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub account_id: Option<AccountId>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub special_type: Option<SpecialType>,
    #[serde(default)]
    pub paired_transaction_id: Option<TransactionId>,
    #[serde(default)]
    pub goal_id: Option<GoalId>,
}

impl TransactionPatch {
    /// Name of the first locked field this patch tries to change
    pub fn immutable_field(&self) -> Option<&'static str> {
        if self.amount.is_some() {
            Some("amount")
        } else if self.account_id.is_some() {
            Some("account_id")
        } else if self.date.is_some() {
            Some("date")
        } else if self.special_type.is_some() {
            Some("special_type")
        } else if self.paired_transaction_id.is_some() {
            Some("paired_transaction_id")
        } else if self.goal_id.is_some() {
            Some("goal_id")
        } else {
            None
        }
    }
}

/// Validation errors for transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionValidationError {
    ZeroAmount,
    DescriptionTooLong(usize),
    MissingCategory,
}

impl fmt::Display for TransactionValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroAmount => write!(f, "Transaction amount cannot be zero"),
            Self::DescriptionTooLong(len) => {
                write!(f, "Description too long ({} chars, max 500)", len)
            }
            Self::MissingCategory => write!(f, "Transaction must have a category"),
        }
    }
}

impl std::error::Error for TransactionValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
    }

    #[test]
    fn test_new_transaction() {
        let account_id = AccountId::new();
        let category_id = CategoryId::new();
        let txn = Transaction::new(
            UserId::new(),
            account_id,
            Money::from_cents(-5000),
            Some(category_id),
            test_date(),
        )
        .with_description("Groceries");

        assert_eq!(txn.account_id, account_id);
        assert_eq!(txn.amount.cents(), -5000);
        assert_eq!(txn.special_type, SpecialType::Default);
        assert!(txn.is_outflow());
        assert!(!txn.is_transfer());
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut txn = Transaction::new(
            UserId::new(),
            AccountId::new(),
            Money::zero(),
            Some(CategoryId::new()),
            test_date(),
        );
        assert_eq!(txn.validate(), Err(TransactionValidationError::ZeroAmount));

        txn.amount = Money::from_cents(100);
        txn.category_id = None;
        assert_eq!(
            txn.validate(),
            Err(TransactionValidationError::MissingCategory)
        );

        txn.paired_transaction_id = Some(TransactionId::new());
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn test_special_type_classification() {
        for special in SpecialType::all() {
            // debt and credit are the only goal-linked types and never recur
            assert_eq!(special.requires_goal_link(), !special.allowed_for_recurrence());
        }
        assert!(!SpecialType::Subscription.produces_upcoming_preview());
        assert!(!SpecialType::Repetitive.produces_upcoming_preview());
        assert!(SpecialType::Upcoming.produces_upcoming_preview());
        assert!(!SpecialType::Debt.counts_toward_budget());
        assert!(SpecialType::Subscription.counts_toward_budget());
    }

    #[test]
    fn test_special_type_parse_and_serde() {
        assert_eq!(SpecialType::parse("DEBT"), Some(SpecialType::Debt));
        assert_eq!(SpecialType::parse("nope"), None);
        let json = serde_json::to_string(&SpecialType::Subscription).unwrap();
        assert_eq!(json, "\"subscription\"");
    }

    #[test]
    fn test_patch_detects_immutable_fields() {
        let patch = TransactionPatch {
            description: Some("ok".into()),
            ..Default::default()
        };
        assert_eq!(patch.immutable_field(), None);

        let patch = TransactionPatch {
            amount: Some(10.0),
            ..Default::default()
        };
        assert_eq!(patch.immutable_field(), Some("amount"));

        let patch: TransactionPatch = serde_json::from_str(r#"{"date": "2025-01-01"}"#).unwrap();
        assert_eq!(patch.immutable_field(), Some("date"));
    }
}
