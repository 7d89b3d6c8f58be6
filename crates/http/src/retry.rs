use std::time::Duration;

/// Curve used to compute the delay before a retry attempt.
#[derive(Debug, Clone)]
pub enum Backoff {
    /// Exponential backoff: `factor^attempt` seconds, optionally plus a
    /// uniformly random fraction of a second in `[0, 1)` so concurrent
    /// callers do not all retry at the same instant.
    Exponential {
        /// Base of the exponential curve.
        factor: f64,
        /// Whether to add random jitter.
        jitter: bool,
    },
    /// Constant delay between every retry attempt.
    Constant {
        /// Fixed delay duration.
        delay: Duration,
    },
}

impl Backoff {
    /// Compute the delay before retry number `attempt` (1-based: the first
    /// retry is attempt 1).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use conflux_http::Backoff;
    ///
    /// let backoff = Backoff::Constant { delay: Duration::from_secs(2) };
    /// assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
    /// assert_eq!(backoff.delay_for(5), Duration::from_secs(2));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential { factor, jitter } => {
                // Retry counts are small (< 100), so the wrap cannot occur.
                #[allow(clippy::cast_possible_wrap)]
                let base = factor.powi(attempt as i32);
                let secs = if *jitter {
                    base + rand::random::<f64>()
                } else {
                    base
                };
                Duration::from_secs_f64(secs)
            }
            Self::Constant { delay } => *delay,
        }
    }
}

/// Retry policy shared by every component that retries: maximum attempt
/// count plus a backoff curve.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the initial attempt. `3` means up to 4 calls total.
    pub max_retries: u32,
    /// Delay curve between attempts.
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Backoff::Constant {
                delay: Duration::ZERO,
            },
        }
    }

    /// Exponential policy with the given base factor and retry budget,
    /// jitter enabled.
    pub fn exponential(factor: f64, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential {
                factor,
                jitter: true,
            },
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(1.6, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_base_without_jitter() {
        let backoff = Backoff::Exponential {
            factor: 2.0,
            jitter: false,
        };
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(4));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn exponential_base_strictly_increasing() {
        let backoff = Backoff::Exponential {
            factor: 1.6,
            jitter: false,
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=5 {
            let delay = backoff.delay_for(attempt);
            assert!(delay > previous, "attempt {attempt} must exceed attempt {}", attempt - 1);
            previous = delay;
        }
    }

    #[test]
    fn jittered_delay_within_window() {
        let backoff = Backoff::Exponential {
            factor: 1.6,
            jitter: true,
        };
        for attempt in 1..=4 {
            let base = 1.6_f64.powi(attempt);
            for _ in 0..50 {
                #[allow(clippy::cast_sign_loss)]
                let delay = backoff.delay_for(attempt as u32).as_secs_f64();
                assert!(
                    delay >= base && delay < base + 1.0,
                    "attempt {attempt}: {delay} outside [{base}, {})",
                    base + 1.0
                );
            }
        }
    }

    #[test]
    fn constant_always_same() {
        let backoff = Backoff::Constant {
            delay: Duration::from_millis(250),
        };
        for attempt in 1..10 {
            assert_eq!(backoff.delay_for(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        match policy.backoff {
            Backoff::Exponential { factor, jitter } => {
                assert!((factor - 1.6).abs() < f64::EPSILON);
                assert!(jitter);
            }
            Backoff::Constant { .. } => panic!("default should be exponential"),
        }
    }

    #[test]
    fn none_policy_never_retries() {
        let policy = RetryPolicy::none();
        assert_eq!(policy.max_retries, 0);
        assert_eq!(policy.backoff.delay_for(1), Duration::ZERO);
    }
}
