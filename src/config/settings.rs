//! User settings for Ledgerwise
//!
//! Every configurable policy of the ledger core lives here, from category
//! depth and account deletion to recurrence limits, retry backoff and the
//! health score weights.

use serde::{Deserialize, Serialize};

use super::paths::LedgerPaths;
use crate::error::LedgerError;
use crate::models::{CatchUpPolicy, UserId};

/// What deleting an account does to the data that references it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccountDeletePolicy {
    /// Refuse with `InUse` while transactions or active recurrences reference it
    #[default]
    Block,
    /// Remove the account with everything referencing it in one commit
    Cascade,
    /// Soft delete: hide the account and refuse new postings
    Archive,
}

impl AccountDeletePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "block" => Some(Self::Block),
            "cascade" => Some(Self::Cascade),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }
}

/// Backoff for writers that lose an optimistic version check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    2
}

fn default_max_backoff_ms() -> u64 {
    50
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Relative weight of each health score component
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthWeights {
    pub savings_rate: f64,
    pub budget_adherence: f64,
    pub goal_progress: f64,
    pub debt_to_income: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            savings_rate: 0.30,
            budget_adherence: 0.30,
            goal_progress: 0.20,
            debt_to_income: 0.20,
        }
    }
}

impl HealthWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.savings_rate,
            self.budget_adherence,
            self.goal_progress,
            self.debt_to_income,
        ]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default)]
    pub weights: HealthWeights,
    /// Days of history used for income, spending and savings rate
    #[serde(default = "default_trailing_window_days")]
    pub trailing_window_days: u32,
    /// Savings rate that earns the full savings component
    #[serde(default = "default_target_savings_rate")]
    pub target_savings_rate: f64,
    /// Value of a component with no data behind it
    #[serde(default = "default_neutral_component")]
    pub neutral_component: f64,
}

fn default_trailing_window_days() -> u32 {
    90
}

fn default_target_savings_rate() -> f64 {
    0.20
}

fn default_neutral_component() -> f64 {
    0.5
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            weights: HealthWeights::default(),
            trailing_window_days: default_trailing_window_days(),
            target_savings_rate: default_target_savings_rate(),
            neutral_component: default_neutral_component(),
        }
    }
}

/// User settings for Ledgerwise
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// User the CLI acts as when `--user` is not given
    #[serde(default)]
    pub default_user: Option<UserId>,

    /// Default currency symbol
    #[serde(default = "default_currency")]
    pub currency_symbol: String,

    /// Maximum number of levels in a category tree (a root is level 1)
    #[serde(default = "default_max_category_depth")]
    pub max_category_depth: usize,

    #[serde(default)]
    pub account_delete_policy: AccountDeletePolicy,

    #[serde(default)]
    pub recurrence_catch_up: CatchUpPolicy,

    /// Most occurrences one advance may post; further catch-up is refused
    #[serde(default = "default_max_occurrences_per_advance")]
    pub max_occurrences_per_advance: usize,

    /// Longest horizon accepted by the upcoming-occurrences query
    #[serde(default = "default_max_upcoming_horizon_days")]
    pub max_upcoming_horizon_days: u32,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub health: HealthSettings,

    /// Maximum number of category suggestions returned
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,

    /// Time an external category advisor gets before the heuristic answers
    #[serde(default = "default_advisor_timeout_ms")]
    pub advisor_timeout_ms: u64,
}

fn default_schema_version() -> u32 {
    1
}

fn default_currency() -> String {
    "$".to_string()
}

fn default_max_category_depth() -> usize {
    4
}

fn default_suggestion_limit() -> usize {
    5
}

fn default_max_occurrences_per_advance() -> usize {
    366
}

fn default_max_upcoming_horizon_days() -> u32 {
    366
}

fn default_advisor_timeout_ms() -> u64 {
    2000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            default_user: None,
            currency_symbol: default_currency(),
            max_category_depth: default_max_category_depth(),
            account_delete_policy: AccountDeletePolicy::default(),
            recurrence_catch_up: CatchUpPolicy::default(),
            max_occurrences_per_advance: default_max_occurrences_per_advance(),
            max_upcoming_horizon_days: default_max_upcoming_horizon_days(),
            retry: RetrySettings::default(),
            health: HealthSettings::default(),
            suggestion_limit: default_suggestion_limit(),
            advisor_timeout_ms: default_advisor_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or create default settings if file doesn't exist
    pub fn load_or_create(paths: &LedgerPaths) -> Result<Self, LedgerError> {
        let settings_path = paths.settings_file();

        if settings_path.exists() {
            let contents = std::fs::read_to_string(&settings_path)
                .map_err(|e| LedgerError::Io(format!("Failed to read settings file: {}", e)))?;

            let settings: Settings = serde_json::from_str(&contents).map_err(|e| {
                LedgerError::Config(format!("Failed to parse settings file: {}", e))
            })?;

            settings.validate()?;
            Ok(settings)
        } else {
            // Don't save yet - let caller decide when to persist
            Ok(Settings::default())
        }
    }

    /// Save settings to disk
    pub fn save(&self, paths: &LedgerPaths) -> Result<(), LedgerError> {
        self.validate()?;
        paths.ensure_directories()?;

        let settings_path = paths.settings_file();
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| LedgerError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(&settings_path, contents)
            .map_err(|e| LedgerError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.max_category_depth == 0 {
            return Err(LedgerError::Config(
                "max_category_depth must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(LedgerError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.max_occurrences_per_advance == 0 || self.max_upcoming_horizon_days == 0 {
            return Err(LedgerError::Config(
                "recurrence limits must be at least 1".into(),
            ));
        }
        let weights = self.health.weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(LedgerError::Config(
                "health weights must be non-negative numbers".into(),
            ));
        }
        if self.health.weights.total() <= 0.0 {
            return Err(LedgerError::Config("health weights must not all be zero".into()));
        }
        let neutral = self.health.neutral_component;
        if !(0.0..=1.0).contains(&neutral) {
            return Err(LedgerError::Config(
                "health.neutral_component must be between 0 and 1".into(),
            ));
        }
        if !self.health.target_savings_rate.is_finite() || self.health.target_savings_rate <= 0.0 {
            return Err(LedgerError::Config(
                "health.target_savings_rate must be positive".into(),
            ));
        }
        if self.health.trailing_window_days == 0 {
            return Err(LedgerError::Config(
                "health.trailing_window_days must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
