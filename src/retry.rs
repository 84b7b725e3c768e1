/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/retry.rs
*
* SPDX-License-Identifier: Apache-2.0
*/

//! Retry-on-conflict for optimistic read-modify-write cycles.
//!
//! The store rejects a write whose `resourceVersion` no longer matches the
//! stored object with [`Error::Conflict`]. [`retry_on_conflict`] reruns the
//! whole cycle (read included) on that error only; any other error is
//! returned immediately. Once `max_attempts` cycles have conflicted, the last
//! conflict is surfaced as [`Error::RetriesExhausted`].
//!
//! ```ignore
//! let app = retry_on_conflict(&RetryConfig::conflict_default(), "deploy", || async {
//!     let mut app = store.get_app("dashboard").await?;
//!     app.spec.description = Some("billing dashboard".into());
//!     store.update_app(&app).await
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Small, fast bound suited to contention on a single object.
    pub fn conflict_default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Self::conflict_default()
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::conflict_default()
    }
}

/// Runs `operation` until it succeeds, fails with a non-conflict error, or
/// conflicts `config.max_attempts` times.
pub async fn retry_on_conflict<F, Fut, T>(config: &RetryConfig, operation_name: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Conflict retries exhausted"
                    );
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }

                // Jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis() as u64,
                    "Write conflicted, restarting from read"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }
}
