//! Calendar arithmetic shared by recurrences and budgets
//!
//! `Frequency` steps recurrence occurrences forward from an anchor date and
//! `PeriodType` resolves the budget window containing a given day. Month and
//! year steps are always computed from the anchor, never chained, so a series
//! anchored on the 31st lands on the last day of short months and returns to
//! the 31st afterwards.

use chrono::{Datelike, Days, Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How often a recurrence repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Parse a frequency name, returning the base unit and an interval multiplier
    ///
    /// `biweekly` is two weeks and `quarterly` three months.
    pub fn parse(s: &str) -> Result<(Self, u32), PeriodParseError> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok((Self::Daily, 1)),
            "weekly" => Ok((Self::Weekly, 1)),
            "biweekly" | "bi-weekly" | "fortnightly" => Ok((Self::Weekly, 2)),
            "monthly" => Ok((Self::Monthly, 1)),
            "quarterly" => Ok((Self::Monthly, 3)),
            "yearly" | "annually" | "annual" => Ok((Self::Yearly, 1)),
            other => Err(PeriodParseError::InvalidFormat(other.to_string())),
        }
    }

    /// The date `steps` units after `anchor`, `None` past the calendar range
    pub fn step_from(&self, anchor: NaiveDate, steps: u64) -> Option<NaiveDate> {
        match self {
            Self::Daily => anchor.checked_add_days(Days::new(steps)),
            Self::Weekly => anchor.checked_add_days(Days::new(steps.checked_mul(7)?)),
            Self::Monthly => {
                let months = u32::try_from(steps).ok()?;
                anchor.checked_add_months(Months::new(months))
            }
            Self::Yearly => {
                let months = u32::try_from(steps.checked_mul(12)?).ok()?;
                anchor.checked_add_months(Months::new(months))
            }
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

/// Inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Check if a date falls within this range
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Overlap of two ranges, `None` if they are disjoint
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }

    /// Number of days covered, inclusive
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The `days`-long window ending on `end`
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let start = end - Duration::days(i64::from(days.max(1)) - 1);
        Self { start, end }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Budget period type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Uses the budget's explicit date range
    #[default]
    Custom,
    Daily,
    /// ISO week, Monday to Sunday
    Weekly,
    /// Calendar month
    Monthly,
    /// Calendar year
    Yearly,
}

impl PeriodType {
    pub fn parse(s: &str) -> Result<Self, PeriodParseError> {
        match s.trim().to_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" | "annual" => Ok(Self::Yearly),
            other => Err(PeriodParseError::InvalidFormat(other.to_string())),
        }
    }

    /// The period window containing `date`; `None` for custom periods
    pub fn window_containing(&self, date: NaiveDate) -> Option<DateRange> {
        match self {
            Self::Custom => None,
            Self::Daily => Some(DateRange::new(date, date)),
            Self::Weekly => {
                let offset = i64::from(date.weekday().num_days_from_monday());
                let start = date - Duration::days(offset);
                Some(DateRange::new(start, start + Duration::days(6)))
            }
            Self::Monthly => {
                let start = date.with_day(1)?;
                let end = start.checked_add_months(Months::new(1))? - Duration::days(1);
                Some(DateRange::new(start, end))
            }
            Self::Yearly => {
                let start = NaiveDate::from_ymd_opt(date.year(), 1, 1)?;
                let end = NaiveDate::from_ymd_opt(date.year(), 12, 31)?;
                Some(DateRange::new(start, end))
            }
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Daily => write!(f, "daily"),
            Self::Weekly => write!(f, "weekly"),
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

/// Error type for period parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodParseError {
    InvalidFormat(String),
}

impl fmt::Display for PeriodParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodParseError::InvalidFormat(s) => write!(f, "Invalid period format: {}", s),
        }
    }
}

impl std::error::Error for PeriodParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_frequency_parse_aliases() {
        assert_eq!(Frequency::parse("monthly").unwrap(), (Frequency::Monthly, 1));
        assert_eq!(Frequency::parse("BiWeekly").unwrap(), (Frequency::Weekly, 2));
        assert_eq!(Frequency::parse("quarterly").unwrap(), (Frequency::Monthly, 3));
        assert!(Frequency::parse("hourly").is_err());
    }

    #[test]
    fn test_month_steps_clamp_to_month_end() {
        let anchor = day(2024, 1, 31);
        assert_eq!(Frequency::Monthly.step_from(anchor, 1), Some(day(2024, 2, 29)));
        assert_eq!(Frequency::Monthly.step_from(anchor, 2), Some(day(2024, 3, 31)));
        assert_eq!(Frequency::Monthly.step_from(anchor, 3), Some(day(2024, 4, 30)));
        assert_eq!(Frequency::Yearly.step_from(day(2024, 2, 29), 1), Some(day(2025, 2, 28)));
    }

    #[test]
    fn test_day_and_week_steps() {
        let anchor = day(2024, 12, 30);
        assert_eq!(Frequency::Daily.step_from(anchor, 3), Some(day(2025, 1, 2)));
        assert_eq!(Frequency::Weekly.step_from(anchor, 2), Some(day(2025, 1, 13)));
    }

    #[test]
    fn test_weekly_window_starts_monday() {
        // 2025-01-15 is a Wednesday
        let window = PeriodType::Weekly.window_containing(day(2025, 1, 15)).unwrap();
        assert_eq!(window.start, day(2025, 1, 13));
        assert_eq!(window.end, day(2025, 1, 19));
    }

    #[test]
    fn test_monthly_and_yearly_windows() {
        let window = PeriodType::Monthly.window_containing(day(2024, 2, 10)).unwrap();
        assert_eq!(window, DateRange::new(day(2024, 2, 1), day(2024, 2, 29)));

        let window = PeriodType::Monthly.window_containing(day(2024, 12, 31)).unwrap();
        assert_eq!(window, DateRange::new(day(2024, 12, 1), day(2024, 12, 31)));

        let window = PeriodType::Yearly.window_containing(day(2024, 6, 1)).unwrap();
        assert_eq!(window.days(), 366);

        assert!(PeriodType::Custom.window_containing(day(2024, 6, 1)).is_none());
    }

    #[test]
    fn test_range_intersect() {
        let a = DateRange::new(day(2025, 1, 1), day(2025, 1, 31));
        let b = DateRange::new(day(2025, 1, 20), day(2025, 2, 10));
        assert_eq!(
            a.intersect(&b),
            Some(DateRange::new(day(2025, 1, 20), day(2025, 1, 31)))
        );
        let c = DateRange::new(day(2025, 3, 1), day(2025, 3, 2));
        assert_eq!(a.intersect(&c), None);
        assert!(a.contains(day(2025, 1, 31)));
        assert_eq!(DateRange::trailing(day(2025, 1, 31), 31).start, day(2025, 1, 1));
    }
}
