use std::future::Future;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::FetchError;
use crate::Result;

/// Runs `task` until it succeeds or `policy.max_retries` attempts have failed
/// (0 means retry forever), sleeping an exponentially growing, jittered
/// delay between attempts. Each attempt is bounded by `policy.timeout_ms`
/// when that is non-zero.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    name: &str,
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: Future<Output = Result<P>>,
{
    let mut attempts: usize = 0;

    loop {
        let outcome = match policy.attempt_timeout() {
            Some(limit) => match timeout(limit, task()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FetchError::Timeout(limit).into()),
            },
            None => task().await,
        };
        attempts += 1;

        let error = match outcome {
            Ok(value) => {
                if attempts > 1 {
                    debug!(task = name, attempts, "succeeded after retries");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if policy.max_retries != 0 && attempts >= policy.max_retries {
            warn!(task = name, attempts, "giving up: {}", error);
            return Err(Error::RetryExhausted {
                attempts,
                source: Box::new(error),
            });
        }

        let delay = policy.jittered_delay_for((attempts - 1) as u32);
        warn!(
            task = name,
            attempts,
            "attempt failed: {}, retrying in {:?}",
            error,
            delay
        );
        sleep(delay).await;
    }
}
