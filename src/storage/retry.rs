//! Bounded retry for optimistic concurrency conflicts

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::RetrySettings;
use crate::error::LedgerResult;

/// Backoff before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped
pub fn backoff_delay(settings: &RetrySettings, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(20);
    let millis = settings
        .base_backoff_ms
        .saturating_mul(1u64 << shift)
        .min(settings.max_backoff_ms);
    Duration::from_millis(millis)
}

/// Run `op` until it succeeds, fails with anything but `Conflict`, or runs
/// out of attempts
///
/// `op` must redo its whole read-validate-commit cycle on every call.
pub fn retry_on_conflict<T>(
    settings: &RetrySettings,
    mut op: impl FnMut() -> LedgerResult<T>,
) -> LedgerResult<T> {
    let max_attempts = settings.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Err(err) if err.is_conflict() && attempt < max_attempts => {
                let delay = backoff_delay(settings, attempt);
                debug!(attempt, ?delay, error = %err, "retrying after version conflict");
                thread::sleep(delay);
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use std::cell::Cell;

    fn settings(max_attempts: u32) -> RetrySettings {
        RetrySettings {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let settings = RetrySettings {
            max_attempts: 10,
            base_backoff_ms: 2,
            max_backoff_ms: 50,
        };
        assert_eq!(backoff_delay(&settings, 1), Duration::from_millis(2));
        assert_eq!(backoff_delay(&settings, 2), Duration::from_millis(4));
        assert_eq!(backoff_delay(&settings, 4), Duration::from_millis(16));
        assert_eq!(backoff_delay(&settings, 9), Duration::from_millis(50));
        assert_eq!(backoff_delay(&settings, 200), Duration::from_millis(50));
    }

    #[test]
    fn test_retries_conflicts_until_success() {
        let calls = Cell::new(0);
        let result = retry_on_conflict(&settings(5), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(LedgerError::conflict("Account", "acc-1"))
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: LedgerResult<()> = retry_on_conflict(&settings(4), || {
            calls.set(calls.get() + 1);
            Err(LedgerError::conflict("Goal", "goal-1"))
        });
        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: LedgerResult<()> = retry_on_conflict(&settings(5), || {
            calls.set(calls.get() + 1);
            Err(LedgerError::InvalidAmount("zero".into()))
        });
        assert!(matches!(result, Err(LedgerError::InvalidAmount(_))));
        assert_eq!(calls.get(), 1);
    }
}
