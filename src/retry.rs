use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Backoff schedule between retry attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
}

impl Backoff {
    pub fn linear(base: Duration) -> Self {
        Self { base }
    }

    /// Delay to wait after `attempt` (1-based) has failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base * attempt
    }
}

/// Run `op` up to `max_attempts` times, sleeping per the backoff
/// schedule between failures. The closure receives the 1-based attempt
/// number. Returns the first success or the last error.
pub async fn with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    backoff: Backoff,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                let wait = backoff.delay(attempt);
                debug!(
                    target = "quotesync.retry",
                    attempt = attempt,
                    wait_secs = wait.as_secs(),
                    error = %err,
                    "attempt failed, backing off"
                );
                sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_backoff_grows_per_attempt() {
        let backoff = Backoff::linear(Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn returns_first_success() {
        let result: Result<u32, &str> =
            with_backoff(3, Backoff::linear(Duration::ZERO), |attempt| async move {
                if attempt < 3 { Err("not yet") } else { Ok(attempt) }
            })
            .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), &str> =
            with_backoff(3, Backoff::linear(Duration::ZERO), |_attempt| {
                calls += 1;
                async { Err("down") }
            })
            .await;
        assert_eq!(result, Err("down"));
        assert_eq!(calls, 3);
    }
}
