//! Bounded exponential backoff for idempotent requests
//!
//! Only wrap calls that can be repeated safely: page GETs, credential
//! fetches, attachment downloads. Form submissions that trigger work on the
//! remote side (authentication, proxy rendering) go out exactly once.

use crate::config::RetryPolicy;
use crate::error::Result;
use std::future::Future;
use tracing::{debug, warn};

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} succeeded on attempt {}", label, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
