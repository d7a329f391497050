use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub jitter_max: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(500),
            jitter_max: Some(Duration::from_millis(50)),
        }
    }
}

impl RetryConfig {
    /// No sleeping between attempts; for tests
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter_max: None,
        }
    }
}

/// Runs `f` until it succeeds, fails with an error `should_retry` rejects, or
/// the attempt budget is spent. Backoff doubles per attempt with optional jitter.
pub async fn retry_async_when<F, Fut, T, E, P>(
    config: RetryConfig,
    should_retry: P,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts_left = config.max_attempts.max(1);
    let mut backoff = config.base_backoff;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                attempts_left = attempts_left.saturating_sub(1);
                if attempts_left == 0 || !should_retry(&e) {
                    return Err(e);
                }

                // apply jitter
                let wait = match config.jitter_max {
                    Some(jitter_max) if !jitter_max.is_zero() => {
                        let jitter_ms = jitter_max.as_millis() as u64;
                        backoff + Duration::from_millis(rand::random::<u64>() % (jitter_ms + 1))
                    }
                    _ => backoff,
                };
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }

                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}
