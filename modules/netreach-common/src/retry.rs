//! Outbound-request retry policy (spec §5): exponential backoff, base
//! 200ms, factor 2, capped at 3 attempts, for transient failures only.
//! Mirrors the attempt-counter + `base * factor^attempt` backoff shape
//! used for Chrome relaunches in the teacher's scrape pipeline, just
//! without the jitter (plain HTTP retries don't fork processes, so the
//! thundering-herd concern that jitter guards against doesn't apply at
//! this scale).

use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(200);

/// Runs `attempt` up to `MAX_ATTEMPTS` times. `attempt` receives the
/// zero-based attempt index and returns `Ok(T)` on a transient-failure-free
/// result or `Err(e)` to trigger a retry (after a `200ms * 2^n` sleep) or,
/// on the final attempt, to surface as the overall error.
pub async fn with_backoff<F, Fut, T, E>(mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut last_err = None;
    for n in 0..MAX_ATTEMPTS {
        match attempt(n).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if n + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(BASE_DELAY * 2u32.pow(n)).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.expect("loop runs at least once"))
}
