//! Account model
//!
//! Represents financial accounts (checking, savings, credit cards, etc.)
//!
//! The stored `balance` is a derived value: it always equals the opening
//! balance plus the sum of the account's transaction amounts. The account
//! service keeps it current on every posting and `verify_balances` recomputes
//! it from scratch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AccountId, UserId};
use super::money::Money;

/// Type of financial account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Checking account
    Checking,
    /// Savings account
    Savings,
    /// Credit card
    CreditCard,
    /// Cash/wallet
    Cash,
    /// Investment account
    Investment,
    /// Other account type
    Other,
}

impl AccountType {
    /// Returns true if this account type normally carries a negative balance
    pub fn is_liability(&self) -> bool {
        matches!(self, Self::CreditCard)
    }

    /// Parse account type from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "checking" => Some(Self::Checking),
            "savings" => Some(Self::Savings),
            "credit" | "credit_card" | "creditcard" => Some(Self::CreditCard),
            "cash" => Some(Self::Cash),
            "investment" => Some(Self::Investment),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn all() -> &'static [AccountType] {
        &[
            Self::Checking,
            Self::Savings,
            Self::CreditCard,
            Self::Cash,
            Self::Investment,
            Self::Other,
        ]
    }
}

impl Default for AccountType {
    fn default() -> Self {
        Self::Checking
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checking => write!(f, "Checking"),
            Self::Savings => write!(f, "Savings"),
            Self::CreditCard => write!(f, "Credit Card"),
            Self::Cash => write!(f, "Cash"),
            Self::Investment => write!(f, "Investment"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// Extra fields carried only by credit card accounts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditCardDetails {
    /// Credit limit (positive)
    pub credit_limit: Option<Money>,

    /// Annual percentage rate, in percent (e.g. 19.99)
    pub apr: Option<f64>,

    /// Balance on the last statement (positive means owed)
    pub statement_balance: Option<Money>,

    /// Due date of the next payment
    pub payment_due_date: Option<NaiveDate>,
}

/// A financial account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: AccountId,

    /// Owning user
    pub user_id: UserId,

    /// Account name (e.g., "Chase Checking")
    pub name: String,

    /// Type of account
    #[serde(rename = "type")]
    pub account_type: AccountType,

    /// Balance the account was opened with
    pub opening_balance: Money,

    /// Current balance (opening balance plus all posted amounts)
    pub balance: Money,

    /// Date the opening balance applies from
    pub opened_on: NaiveDate,

    /// Whether this account is archived (soft-deleted)
    #[serde(default)]
    pub archived: bool,

    /// Credit card fields, only for `credit_card` accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit: Option<CreditCardDetails>,

    /// Notes about this account
    #[serde(default)]
    pub notes: String,

    /// Optimistic concurrency version
    #[serde(default)]
    pub version: u64,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last modified
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a zero opening balance
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        account_type: AccountType,
        opened_on: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            user_id,
            name: name.into(),
            account_type,
            opening_balance: Money::zero(),
            balance: Money::zero(),
            opened_on,
            archived: false,
            credit: None,
            notes: String::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a new account with an opening balance
    pub fn with_opening_balance(
        user_id: UserId,
        name: impl Into<String>,
        account_type: AccountType,
        opened_on: NaiveDate,
        opening_balance: Money,
    ) -> Self {
        let mut account = Self::new(user_id, name, account_type, opened_on);
        account.opening_balance = opening_balance;
        account.balance = opening_balance;
        account
    }

    /// Mark this account as archived
    pub fn archive(&mut self) {
        self.archived = true;
        self.updated_at = Utc::now();
    }

    /// Credit still available on a credit card, `None` without a limit
    pub fn available_credit(&self) -> Option<Money> {
        let limit = self.credit.as_ref()?.credit_limit?;
        Some(limit + self.balance)
    }

    /// Share of the credit limit in use, between 0 and 1 (or above when over limit)
    pub fn utilization(&self) -> Option<f64> {
        let limit = self.credit.as_ref()?.credit_limit?;
        if !limit.is_positive() {
            return None;
        }
        let owed = self.amount_owed();
        Some(owed.cents() as f64 / limit.cents() as f64)
    }

    /// Outstanding debt on a liability account, zero otherwise
    pub fn amount_owed(&self) -> Money {
        if self.account_type.is_liability() && self.balance.is_negative() {
            self.balance.abs()
        } else {
            Money::zero()
        }
    }

    /// Validate the account
    pub fn validate(&self) -> Result<(), AccountValidationError> {
        if self.name.trim().is_empty() {
            return Err(AccountValidationError::EmptyName);
        }

        if self.name.len() > 100 {
            return Err(AccountValidationError::NameTooLong(self.name.len()));
        }

        if let Some(credit) = &self.credit {
            if self.account_type != AccountType::CreditCard {
                return Err(AccountValidationError::CreditDetailsOnNonCredit);
            }
            if credit.credit_limit.is_some_and(|l| l.is_negative()) {
                return Err(AccountValidationError::NegativeCreditLimit);
            }
            if credit.apr.is_some_and(|apr| !apr.is_finite() || apr < 0.0) {
                return Err(AccountValidationError::InvalidApr);
            }
        }

        Ok(())
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.account_type)
    }
}

/// Validation errors for accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountValidationError {
    EmptyName,
    NameTooLong(usize),
    CreditDetailsOnNonCredit,
    NegativeCreditLimit,
    InvalidApr,
}

impl fmt::Display for AccountValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Account name cannot be empty"),
            Self::NameTooLong(len) => {
                write!(f, "Account name too long ({} chars, max 100)", len)
            }
            Self::CreditDetailsOnNonCredit => {
                write!(f, "Credit card details are only allowed on credit card accounts")
            }
            Self::NegativeCreditLimit => write!(f, "Credit limit cannot be negative"),
            Self::InvalidApr => write!(f, "APR must be a non-negative number"),
        }
    }
}

impl std::error::Error for AccountValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_account() {
        let user = UserId::new();
        let account = Account::new(user, "Checking", AccountType::Checking, day(2024, 1, 1));
        assert_eq!(account.name, "Checking");
        assert_eq!(account.user_id, user);
        assert!(!account.archived);
        assert_eq!(account.balance, Money::zero());
        assert_eq!(account.version, 0);
    }

    #[test]
    fn test_with_opening_balance() {
        let account = Account::with_opening_balance(
            UserId::new(),
            "Savings",
            AccountType::Savings,
            day(2024, 1, 1),
            Money::from_cents(100000),
        );
        assert_eq!(account.opening_balance.cents(), 100000);
        assert_eq!(account.balance.cents(), 100000);
    }

    #[test]
    fn test_credit_card_derived_fields() {
        let mut card = Account::with_opening_balance(
            UserId::new(),
            "Visa",
            AccountType::CreditCard,
            day(2024, 1, 1),
            Money::from_cents(-25000),
        );
        card.credit = Some(CreditCardDetails {
            credit_limit: Some(Money::from_cents(100000)),
            apr: Some(19.99),
            ..Default::default()
        });

        assert_eq!(card.available_credit(), Some(Money::from_cents(75000)));
        assert_eq!(card.utilization(), Some(0.25));
        assert_eq!(card.amount_owed(), Money::from_cents(25000));
        assert!(card.validate().is_ok());
    }

    #[test]
    fn test_credit_details_rejected_on_checking() {
        let mut account =
            Account::new(UserId::new(), "Checking", AccountType::Checking, day(2024, 1, 1));
        account.credit = Some(CreditCardDetails::default());
        assert_eq!(
            account.validate(),
            Err(AccountValidationError::CreditDetailsOnNonCredit)
        );
    }

    #[test]
    fn test_validation() {
        let mut account =
            Account::new(UserId::new(), "Valid Name", AccountType::Checking, day(2024, 1, 1));
        assert!(account.validate().is_ok());

        account.name = String::new();
        assert_eq!(account.validate(), Err(AccountValidationError::EmptyName));

        account.name = "a".repeat(101);
        assert!(matches!(
            account.validate(),
            Err(AccountValidationError::NameTooLong(_))
        ));
    }

    #[test]
    fn test_account_type_parsing() {
        assert_eq!(AccountType::parse("checking"), Some(AccountType::Checking));
        assert_eq!(AccountType::parse("SAVINGS"), Some(AccountType::Savings));
        assert_eq!(
            AccountType::parse("credit_card"),
            Some(AccountType::CreditCard)
        );
        assert_eq!(AccountType::parse("invalid"), None);
    }

    #[test]
    fn test_account_type_serializes_snake_case() {
        let json = serde_json::to_string(&AccountType::CreditCard).unwrap();
        assert_eq!(json, "\"credit_card\"");
    }

    #[test]
    fn test_display() {
        let account =
            Account::new(UserId::new(), "My Checking", AccountType::Checking, day(2024, 1, 1));
        assert_eq!(format!("{}", account), "My Checking (Checking)");
    }
}
