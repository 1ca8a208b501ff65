//! Class-aware exponential backoff
//!
//! Transient server failures get a longer base delay and a higher cap than
//! other retryable failures: outages benefit from patience, while anything
//! else either heals quickly or not at all.

use crate::error::FailureClass;
use std::time::Duration;

/// Base delay for transient/server-class failures
const TRANSIENT_BASE_MS: u64 = 2_000;
/// Cap for transient/server-class failures
const TRANSIENT_CAP_MS: u64 = 60_000;
/// Base delay for every other retry
const DEFAULT_BASE_MS: u64 = 1_000;
/// Cap for every other retry
const DEFAULT_CAP_MS: u64 = 15_000;

/// Compute the delay before retry number `attempt` (1-based)
///
/// Doubles per attempt and saturates at the class cap, so for consecutive
/// failures of the same class the delay is non-decreasing.
pub fn backoff_delay(class: FailureClass, attempt: u32) -> Duration {
    let (base_ms, cap_ms) = match class {
        FailureClass::Transient => (TRANSIENT_BASE_MS, TRANSIENT_CAP_MS),
        _ => (DEFAULT_BASE_MS, DEFAULT_CAP_MS),
    };

    let exponent = attempt.saturating_sub(1).min(16);
    let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(cap_ms);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_monotone_non_decreasing() {
        for class in [FailureClass::Transient, FailureClass::VerificationFailed] {
            let mut previous = Duration::ZERO;
            for attempt in 1..=20 {
                let delay = backoff_delay(class, attempt);
                assert!(
                    delay >= previous,
                    "delay decreased at attempt {attempt} for {class}"
                );
                previous = delay;
            }
        }
    }

    #[test]
    fn test_backoff_saturates_at_cap() {
        assert_eq!(
            backoff_delay(FailureClass::Transient, 30),
            Duration::from_millis(TRANSIENT_CAP_MS)
        );
        assert_eq!(
            backoff_delay(FailureClass::VerificationFailed, 30),
            Duration::from_millis(DEFAULT_CAP_MS)
        );
    }

    #[test]
    fn test_transient_waits_longer_than_default() {
        for attempt in 1..=8 {
            assert!(
                backoff_delay(FailureClass::Transient, attempt)
                    >= backoff_delay(FailureClass::VerificationFailed, attempt)
            );
        }
    }

    #[test]
    fn test_first_attempt_uses_base() {
        assert_eq!(
            backoff_delay(FailureClass::Transient, 1),
            Duration::from_millis(TRANSIENT_BASE_MS)
        );
        assert_eq!(
            backoff_delay(FailureClass::LocalIntegrity, 1),
            Duration::from_millis(DEFAULT_BASE_MS)
        );
    }
}
