//! Bounded retry combinators.

use std::future::Future;

use log::trace;

/// The outcome of a single attempt at a retryable operation.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// The operation succeeded.
    Done(T),
    /// The operation hit a transient condition and may be tried again.
    Retry,
    /// The operation failed in a way that retrying cannot fix.
    Fail(E),
}

/// Why a retried operation gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt asked to be retried.
    Exhausted { attempts: u32 },
    /// An attempt failed outright.
    Failed(E),
}

/// Run `op` until it succeeds or fails, at most `max_attempts` times.
/// `op` is passed the 1-based attempt number.
pub fn bounded<T, E>(
    max_attempts: u32,
    mut op: impl FnMut(u32) -> Attempt<T, E>,
) -> Result<T, RetryError<E>> {
    for attempt in 1..=max_attempts {
        match op(attempt) {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(RetryError::Failed(err)),
            Attempt::Retry => trace!("attempt {attempt}/{max_attempts} will be retried"),
        }
    }
    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}

/// Asynchronous version of [`bounded`].
pub async fn bounded_async<T, E, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    for attempt in 1..=max_attempts {
        match op(attempt).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(err) => return Err(RetryError::Failed(err)),
            Attempt::Retry => trace!("attempt {attempt}/{max_attempts} will be retried"),
        }
    }
    Err(RetryError::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeds_after_retries() {
        let result: Result<u32, RetryError<()>> = bounded(5, |attempt| {
            if attempt < 3 {
                Attempt::Retry
            } else {
                Attempt::Done(attempt)
            }
        });
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn gives_up_at_bound() {
        let mut calls = 0;
        let result: Result<(), RetryError<()>> = bounded(10, |_| {
            calls += 1;
            Attempt::Retry
        });
        assert_eq!(result, Err(RetryError::Exhausted { attempts: 10 }));
        assert_eq!(calls, 10);
    }

    #[test]
    fn failure_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), RetryError<&str>> = bounded(10, |_| {
            calls += 1;
            Attempt::Fail("broken")
        });
        assert_eq!(result, Err(RetryError::Failed("broken")));
        assert_eq!(calls, 1);
    }

    #[rocket::async_test]
    async fn async_retries() {
        let result: Result<u32, RetryError<()>> = bounded_async(3, |attempt| async move {
            if attempt == 2 {
                Attempt::Done(attempt)
            } else {
                Attempt::Retry
            }
        })
        .await;
        assert_eq!(result, Ok(2));
    }
}
