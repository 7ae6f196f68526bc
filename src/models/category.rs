//! Category model
//!
//! Categories form a forest per user. The income/expense kind is fixed by the
//! root of each tree and shared by every descendant. Categories are never
//! hard-deleted once referenced; they are disabled instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{CategoryId, UserId};

/// Whether a category tree tracks money coming in or going out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    Income,
    Expense,
}

impl CategoryKind {
    pub fn is_income(&self) -> bool {
        matches!(self, Self::Income)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(Self::Income),
            "expense" => Some(Self::Expense),
            _ => None,
        }
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Income => write!(f, "Income"),
            Self::Expense => write!(f, "Expense"),
        }
    }
}

/// Categories the system itself depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinCategory {
    /// Target of balance corrections, excluded from budgets by default
    BalanceCorrection,
    /// Fallback when nothing better is known
    Uncategorized,
}

impl BuiltinCategory {
    pub fn all() -> &'static [Self] {
        &[Self::BalanceCorrection, Self::Uncategorized]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BalanceCorrection => "balance_correction",
            Self::Uncategorized => "uncategorized",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::BalanceCorrection => "Balance Correction",
            Self::Uncategorized => "Uncategorized",
        }
    }
}

/// A category node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Unique identifier
    pub id: CategoryId,

    /// Owning user
    pub user_id: UserId,

    /// Normalized name (lowercase, underscores), unique among siblings
    pub name: String,

    /// Human readable name
    pub display_name: String,

    /// Parent category, `None` for roots
    pub parent_id: Option<CategoryId>,

    /// Income or expense, inherited from the root
    pub kind: CategoryKind,

    /// Number of transactions ever posted to this category (saturating)
    #[serde(default)]
    pub usage_count: u64,

    /// Book-wide sequence number of the last posting, for recency ranking
    #[serde(default)]
    pub last_used_seq: u64,

    /// Words that suggest this category for a description
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Disabled categories are kept for history but reject new postings
    pub enabled: bool,

    /// Set for categories the system depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builtin: Option<BuiltinCategory>,

    /// Created by default seeding rather than by the user
    #[serde(default)]
    pub is_default: bool,

    /// Optimistic concurrency version
    #[serde(default)]
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    /// Create a new root or child category
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        parent_id: Option<CategoryId>,
        kind: CategoryKind,
    ) -> Self {
        let display_name = display_name.into();
        let now = Utc::now();
        Self {
            id: CategoryId::new(),
            user_id,
            name: normalize_name(&display_name),
            display_name,
            parent_id,
            kind,
            usage_count: 0,
            last_used_seq: 0,
            keywords: Vec::new(),
            enabled: true,
            builtin: None,
            is_default: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create one of the builtin root categories
    pub fn builtin(user_id: UserId, builtin: BuiltinCategory) -> Self {
        let mut category = Self::new(
            user_id,
            builtin.display_name(),
            None,
            CategoryKind::Expense,
        );
        category.builtin = Some(builtin);
        category.is_default = true;
        category
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_balance_correction(&self) -> bool {
        self.builtin == Some(BuiltinCategory::BalanceCorrection)
    }

    /// Record one more posting; never fails, saturates at `u64::MAX`
    pub fn increment_usage(&mut self, seq: u64) {
        self.usage_count = self.usage_count.saturating_add(1);
        self.last_used_seq = self.last_used_seq.max(seq);
    }

    /// Validate the category
    pub fn validate(&self) -> Result<(), CategoryValidationError> {
        if self.display_name.trim().is_empty() || self.name.is_empty() {
            return Err(CategoryValidationError::EmptyName);
        }

        if self.display_name.len() > 50 {
            return Err(CategoryValidationError::NameTooLong(self.display_name.len()));
        }

        Ok(())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

/// Normalize a category name: `"Fresh Produce"` and `"fresh-produce"` both
/// become `"fresh_produce"`
pub fn normalize_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Turn a normalized name back into a display name
pub fn display_from_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// One entry of the default category hierarchy
#[derive(Debug, Clone, Copy)]
pub struct DefaultCategory {
    pub name: &'static str,
    pub parent: Option<&'static str>,
    pub kind: CategoryKind,
    pub keywords: &'static [&'static str],
}

const fn root(name: &'static str, kind: CategoryKind) -> DefaultCategory {
    DefaultCategory {
        name,
        parent: None,
        kind,
        keywords: &[],
    }
}

const fn child(
    name: &'static str,
    parent: &'static str,
    kind: CategoryKind,
    keywords: &'static [&'static str],
) -> DefaultCategory {
    DefaultCategory {
        name,
        parent: Some(parent),
        kind,
        keywords,
    }
}

use CategoryKind::{Expense, Income};

/// Default hierarchy seeded for every new user, parents before children
pub const DEFAULT_CATEGORIES: &[DefaultCategory] = &[
    root("home", Expense),
    child("groceries", "home", Expense, &["grocery", "supermarket", "whole foods", "trader joe", "safeway", "kroger", "aldi"]),
    child("fresh_produce", "groceries", Expense, &["produce", "fruit", "vegetable", "organic"]),
    child("packaged_foods", "groceries", Expense, &[]),
    child("beverages", "groceries", Expense, &[]),
    child("household_items", "groceries", Expense, &[]),
    child("utilities", "home", Expense, &["utility"]),
    child("electricity", "utilities", Expense, &["electric", "power", "pge"]),
    child("water", "utilities", Expense, &["water"]),
    child("gas", "utilities", Expense, &[]),
    child("internet", "utilities", Expense, &["internet", "comcast", "wifi", "broadband"]),
    child("phone", "utilities", Expense, &["phone", "mobile", "cell", "t-mobile", "verizon"]),
    child("maintenance", "home", Expense, &["repair", "plumber", "cleaning"]),
    child("rent_mortgage", "home", Expense, &["rent", "mortgage", "lease"]),
    root("transport", Expense),
    child("fuel", "transport", Expense, &["fuel", "gas station", "shell", "chevron", "exxon", "petrol"]),
    child("public_transit", "transport", Expense, &["metro", "bus", "train", "subway", "transit"]),
    child("ride_share", "transport", Expense, &["uber", "lyft", "taxi"]),
    child("parking", "transport", Expense, &["parking"]),
    child("vehicle_maintenance", "transport", Expense, &["oil change", "tire", "mechanic"]),
    root("food", Expense),
    child("dining_out", "food", Expense, &["restaurant", "dinner", "lunch", "breakfast", "bistro"]),
    child("fast_food", "food", Expense, &["mcdonald", "burger", "pizza", "taco"]),
    child("coffee_shops", "food", Expense, &["coffee", "starbucks", "cafe", "espresso"]),
    child("delivery", "food", Expense, &["uber eats", "doordash", "grubhub", "delivery"]),
    root("entertainment", Expense),
    child("streaming", "entertainment", Expense, &["netflix", "spotify", "hulu", "disney", "prime video"]),
    child("movies", "entertainment", Expense, &["cinema", "movie", "theater"]),
    child("concerts", "entertainment", Expense, &["concert", "ticketmaster"]),
    child("hobbies", "entertainment", Expense, &["hobby"]),
    child("sports", "entertainment", Expense, &["gym", "sport"]),
    root("shopping", Expense),
    child("clothing", "shopping", Expense, &["clothing", "apparel", "shoes", "zara", "h&m"]),
    child("electronics", "shopping", Expense, &["electronics", "best buy", "apple store"]),
    child("home_goods", "shopping", Expense, &["ikea", "furniture"]),
    child("personal_care", "shopping", Expense, &["salon", "barber", "cosmetics"]),
    root("healthcare", Expense),
    child("medical", "healthcare", Expense, &["doctor", "hospital", "clinic", "medical"]),
    child("dental", "healthcare", Expense, &["dentist", "dental"]),
    child("pharmacy", "healthcare", Expense, &["pharmacy", "cvs", "walgreens", "medicine", "prescription"]),
    child("insurance", "healthcare", Expense, &["insurance"]),
    child("fitness", "healthcare", Expense, &["fitness", "yoga"]),
    root("education", Expense),
    child("tuition", "education", Expense, &["tuition"]),
    child("books", "education", Expense, &["book", "textbook"]),
    child("courses", "education", Expense, &["course", "udemy", "coursera"]),
    root("savings", Expense),
    child("emergency_fund", "savings", Expense, &[]),
    child("retirement", "savings", Expense, &["401k", "ira", "retirement"]),
    root("income", Income),
    child("salary", "income", Income, &["salary", "paycheck", "wage", "payroll"]),
    child("freelance", "income", Income, &["freelance", "contract", "consulting", "gig"]),
    child("investments", "income", Income, &["dividend", "interest"]),
    child("side_hustle", "income", Income, &[]),
    child("gifts", "income", Income, &["gift"]),
];

/// Validation errors for categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryValidationError {
    EmptyName,
    NameTooLong(usize),
}

impl fmt::Display for CategoryValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "Category name cannot be empty"),
            Self::NameTooLong(len) => {
                write!(f, "Category name too long ({} chars, max 50)", len)
            }
        }
    }
}

impl std::error::Error for CategoryValidationError {}
