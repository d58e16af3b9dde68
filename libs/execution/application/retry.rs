//! Bounded-Retry State Machine for Exchange Calls
//!
//! Each attempt resolves to an enumerated outcome instead of nested
//! error-handling control flow, so the decision logic is independently
//! testable:
//! - 401: authentication - retryable once via credential refresh
//! - 429: the governor under-throttled - back off and retry; the exchange
//!   queues such requests upstream, so re-sending the same order does not
//!   duplicate it
//! - 5xx / transport: back off with jitter and retry
//! - other 4xx: terminal, categorized immediately

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::ErrorCategory;
use crate::infrastructure::client::ExchangeError;

/// Injectable retry settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts per call, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Randomize delays to avoid thundering-herd retries
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based). Doubles per
    /// attempt, capped at `max_delay_ms`; with jitter the delay lands
    /// uniformly in the upper half of the computed value.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let capped = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);

        let ms = if self.jitter && capped > 1 {
            rand::thread_rng().gen_range(capped / 2..=capped)
        } else {
            capped
        };
        Duration::from_millis(ms)
    }
}

/// Enumerated outcome of a single call attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// The call succeeded
    Succeeded,
    /// Worth another attempt after `delay`
    Retryable {
        category: ErrorCategory,
        delay: Duration,
    },
    /// No retry can help, or the attempt budget is exhausted
    Terminal {
        category: ErrorCategory,
        message: String,
    },
}

/// Classify an attempt result into an outcome.
///
/// `attempt` is 1-based. This is the single place where raw exchange
/// failures become categories; nothing upstream string-matches.
pub fn assess<T>(
    result: &std::result::Result<T, ExchangeError>,
    attempt: u32,
    policy: &RetryPolicy,
) -> AttemptOutcome {
    let error = match result {
        Ok(_) => return AttemptOutcome::Succeeded,
        Err(error) => error,
    };

    let budget_left = attempt < policy.max_attempts;
    match error {
        ExchangeError::Api { status, message } => match status {
            401 => {
                // One refresh-and-retry; a second 401 means the refreshed
                // credentials are bad too
                if attempt == 1 {
                    AttemptOutcome::Retryable {
                        category: ErrorCategory::Authentication,
                        delay: Duration::ZERO,
                    }
                } else {
                    AttemptOutcome::Terminal {
                        category: ErrorCategory::Authentication,
                        message: message.clone(),
                    }
                }
            }
            429 => {
                if budget_left {
                    AttemptOutcome::Retryable {
                        category: ErrorCategory::RateLimit,
                        delay: policy.backoff_delay(attempt),
                    }
                } else {
                    AttemptOutcome::Terminal {
                        category: ErrorCategory::RateLimit,
                        message: message.clone(),
                    }
                }
            }
            500..=599 => {
                if budget_left {
                    AttemptOutcome::Retryable {
                        category: ErrorCategory::ServerError,
                        delay: policy.backoff_delay(attempt),
                    }
                } else {
                    AttemptOutcome::Terminal {
                        category: ErrorCategory::ServerError,
                        message: message.clone(),
                    }
                }
            }
            _ => AttemptOutcome::Terminal {
                category: categorize_rejection(message),
                message: message.clone(),
            },
        },
        ExchangeError::Transport(message) => {
            if budget_left {
                AttemptOutcome::Retryable {
                    category: ErrorCategory::ServerError,
                    delay: policy.backoff_delay(attempt),
                }
            } else {
                AttemptOutcome::Terminal {
                    category: ErrorCategory::Unknown,
                    message: message.clone(),
                }
            }
        }
    }
}

/// Categorize a 4xx rejection message. The only string inspection in the
/// crate; callers receive a category, never raw text to match.
fn categorize_rejection(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    if lower.contains("insufficient")
        || lower.contains("not enough balance")
        || lower.contains("allowance")
    {
        ErrorCategory::InsufficientFunds
    } else {
        ErrorCategory::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
            jitter: false,
        }
    }

    fn api_err(status: u16, message: &str) -> Result<(), ExchangeError> {
        Err(ExchangeError::api(status, message))
    }

    #[test]
    fn test_success() {
        let result: Result<u32, ExchangeError> = Ok(1);
        assert_eq!(assess(&result, 1, &policy()), AttemptOutcome::Succeeded);
    }

    #[test]
    fn test_401_retryable_once() {
        let outcome = assess(&api_err(401, "expired"), 1, &policy());
        assert_eq!(
            outcome,
            AttemptOutcome::Retryable {
                category: ErrorCategory::Authentication,
                delay: Duration::ZERO,
            }
        );

        let outcome = assess(&api_err(401, "expired"), 2, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::Authentication,
                ..
            }
        ));
    }

    #[test]
    fn test_429_backs_off_then_exhausts() {
        let outcome = assess(&api_err(429, "slow down"), 1, &policy());
        assert_eq!(
            outcome,
            AttemptOutcome::Retryable {
                category: ErrorCategory::RateLimit,
                delay: Duration::from_millis(100),
            }
        );

        let outcome = assess(&api_err(429, "slow down"), 2, &policy());
        assert_eq!(
            outcome,
            AttemptOutcome::Retryable {
                category: ErrorCategory::RateLimit,
                delay: Duration::from_millis(200),
            }
        );

        let outcome = assess(&api_err(429, "slow down"), 3, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::RateLimit,
                ..
            }
        ));
    }

    #[test]
    fn test_5xx_retryable_until_exhausted() {
        let outcome = assess(&api_err(503, "unavailable"), 2, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Retryable {
                category: ErrorCategory::ServerError,
                ..
            }
        ));

        let outcome = assess(&api_err(500, "boom"), 3, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::ServerError,
                ..
            }
        ));
    }

    #[test]
    fn test_4xx_terminal_immediately() {
        let outcome = assess(&api_err(400, "invalid signature"), 1, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::Validation,
                ..
            }
        ));
    }

    #[test]
    fn test_insufficient_funds_detected() {
        let outcome = assess(&api_err(400, "not enough balance / allowance"), 1, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::InsufficientFunds,
                ..
            }
        ));

        let outcome = assess(&api_err(400, "Insufficient funds"), 1, &policy());
        assert!(matches!(
            outcome,
            AttemptOutcome::Terminal {
                category: ErrorCategory::InsufficientFunds,
                ..
            }
        ));
    }

    #[test]
    fn test_transport_retryable_then_unknown() {
        let err: Result<(), ExchangeError> = Err(ExchangeError::Transport("dns".to_string()));
        assert!(matches!(
            assess(&err, 1, &policy()),
            AttemptOutcome::Retryable {
                category: ErrorCategory::ServerError,
                ..
            }
        ));
        assert!(matches!(
            assess(&err, 3, &policy()),
            AttemptOutcome::Terminal {
                category: ErrorCategory::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy()
        };
        for _ in 0..100 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }
}
