//! Bounded retry with a fixed delay between attempts

use std::time::Duration;

/// Returned when every attempt failed; carries the last error seen.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gave up after {} attempts: {}", self.attempts, self.last)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryExhausted<E> {}

/// Retry a fallible operation up to `max_attempts` times, sleeping `delay`
/// between attempts.
///
/// `attempt_fn` receives the 1-based attempt number. At least one attempt is
/// always made, even when `max_attempts` is 0. No sleep follows the final
/// failure.
pub fn retry_fixed<T, E: std::fmt::Display>(
    label: &str,
    max_attempts: u32,
    delay: Duration,
    mut attempt_fn: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, RetryExhausted<E>> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match attempt_fn(attempt) {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts => {
                log::warn!("{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying in {delay:?}");
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                log::error!("{label}: failed permanently after {attempt} attempts: {e}");
                return Err(RetryExhausted {
                    attempts: attempt,
                    last: e,
                });
            }
        }
    }
}
