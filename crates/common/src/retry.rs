//! Bounded retry raced against a wall clock budget.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryOptions {
    pub tries: u32,
    pub timeout: Duration,
    pub timeout_message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Display> {
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Exhausted(E),
    #[error("retry called with zero tries")]
    NoAttempts,
}

/// Run `action` up to `options.tries` times until it succeeds.
///
/// The attempt loop and a timer race; whichever finishes first decides the
/// outcome. When the timer wins the in-flight attempt is dropped at its
/// next await point, so actions must tolerate being abandoned midway.
/// When every try fails the error of the last try is returned.
pub async fn retry<F, Fut, T, E>(mut action: F, options: &RetryOptions) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = async {
        let mut last = None;
        for attempt in 1..=options.tries {
            match action().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::debug!("attempt {}/{} failed: {}", attempt, options.tries, e);
                    last = Some(e);
                }
            }
        }
        Err(last.map_or(RetryError::NoAttempts, RetryError::Exhausted))
    };

    tokio::select! {
        result = attempts => result,
        _ = tokio::time::sleep(options.timeout) => {
            tracing::warn!("{}", options.timeout_message);
            Err(RetryError::Timeout(options.timeout_message.clone()))
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn options(tries: u32, timeout: Duration) -> RetryOptions {
        RetryOptions {
            tries,
            timeout,
            timeout_message: "timed out".to_string(),
        }
    }

    #[tokio::test]
    async fn test_succeeds_on_last_try() {
        let calls = &AtomicU32::new(0);
        let result = retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 10 {
                    Err(format!("attempt {}", n))
                } else {
                    Ok(n)
                }
            },
            &options(10, Duration::from_secs(10)),
        )
        .await;
        assert_eq!(result.unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_exhaustion_surfaces_last_error() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry(
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("attempt {}", n))
            },
            &options(10, Duration::from_secs(10)),
        )
        .await;
        match result {
            Err(RetryError::Exhausted(e)) => assert_eq!(e, "attempt 10"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_wins_over_slow_attempts() {
        let result: Result<(), RetryError<String>> = retry(
            || async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Err("slow".to_string())
            },
            &options(10, Duration::from_millis(50)),
        )
        .await;
        match result {
            Err(RetryError::Timeout(message)) => assert_eq!(message, "timed out"),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_attempts_after_timeout() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), RetryError<String>> = retry(
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Err("slow".to_string())
            },
            &options(10, Duration::from_millis(50)),
        )
        .await;
        assert!(matches!(result, Err(RetryError::Timeout(_))));

        // the abandoned loop never gets to start another try
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_tries() {
        let result: Result<(), RetryError<String>> =
            retry(|| async { Ok(()) }, &options(0, Duration::from_secs(1))).await;
        assert!(matches!(result, Err(RetryError::NoAttempts)));
    }
}
