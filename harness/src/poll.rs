// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wait for a condition to become true by checking it at a fixed interval.
//!
//! There is deliberately no backoff here: the callers of this module are
//! short-lived waits in a test fixture, where a fixed interval bounds the
//! worst-case detection latency without busy-spinning.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};

/// Result of one check of a polled condition.
///
/// `NotYet` means the condition has not happened yet and polling should
/// continue.  `Failed` means the condition can never succeed and polling
/// should stop immediately.
#[derive(Debug)]
pub enum CondCheckError<E> {
    NotYet,
    Failed(E),
}

impl<E> From<E> for CondCheckError<E> {
    fn from(error: E) -> Self {
        CondCheckError::Failed(error)
    }
}

/// Error returned from [`wait_for_condition`].
#[derive(Debug, Error)]
pub enum Error<E: std::error::Error + 'static> {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("failed permanently")]
    PermanentError(#[source] E),
}

/// Invokes `cond` repeatedly, every `poll_interval`, until it returns `Ok`
/// or a permanent failure, or until `poll_max` has elapsed.
///
/// The caller's task sleeps between checks.  A timeout is a hard ceiling,
/// not a cancellation mechanism: the check that is in progress when the
/// ceiling passes is allowed to finish.
pub async fn wait_for_condition<T, E, Func, Fut>(
    mut cond: Func,
    poll_interval: &Duration,
    poll_max: &Duration,
) -> Result<T, Error<E>>
where
    E: std::error::Error + 'static,
    Func: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CondCheckError<E>>>,
{
    let poll_start = Instant::now();
    loop {
        let elapsed = Instant::now().duration_since(poll_start);
        if elapsed > *poll_max {
            return Err(Error::TimedOut(elapsed));
        }
        match cond().await {
            Ok(value) => return Ok(value),
            Err(CondCheckError::NotYet) => (),
            Err(CondCheckError::Failed(error)) => {
                return Err(Error::PermanentError(error));
            }
        }
        sleep(*poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SHORT: Duration = Duration::from_millis(10);

    #[derive(Debug, Error)]
    #[error("boom")]
    struct Boom;

    #[tokio::test]
    async fn succeeds_after_a_few_checks() {
        let count = AtomicUsize::new(0);
        let count = &count;
        let result = wait_for_condition(
            move || async move {
                if count.fetch_add(1, Ordering::SeqCst) < 3 {
                    Err(CondCheckError::<Boom>::NotYet)
                } else {
                    Ok(count.load(Ordering::SeqCst))
                }
            },
            &SHORT,
            &Duration::from_secs(10),
        )
        .await;
        assert_eq!(result.unwrap(), 4);
    }

    #[tokio::test]
    async fn times_out() {
        let result: Result<(), Error<Boom>> = wait_for_condition(
            || async { Err(CondCheckError::NotYet) },
            &SHORT,
            &Duration::from_millis(50),
        )
        .await;
        match result {
            Err(Error::TimedOut(elapsed)) => {
                assert!(elapsed >= Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stops_on_permanent_failure() {
        let count = AtomicUsize::new(0);
        let count = &count;
        let result: Result<(), Error<Boom>> = wait_for_condition(
            move || async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(CondCheckError::Failed(Boom))
            },
            &SHORT,
            &Duration::from_secs(10),
        )
        .await;
        assert!(matches!(result, Err(Error::PermanentError(_))));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
