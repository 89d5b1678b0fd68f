//! Timeout utilities for I/O operations

use compio::time::timeout;
use std::future::Future;
use std::io;
use std::time::Duration;

/// Run `fut` bounded by `duration`.
///
/// * `Duration::ZERO`: no timeout
/// * otherwise: `Err(io::ErrorKind::TimedOut)` once the duration elapsed
pub async fn with_timeout<F: Future>(duration: Duration, fut: F) -> io::Result<F::Output> {
    if duration.is_zero() {
        return Ok(fut.await);
    }
    timeout(duration, fut)
        .await
        .map_err(|_elapsed| io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn test_completes_in_time() {
        let value = with_timeout(Duration::from_secs(1), async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[compio::test]
    async fn test_times_out() {
        let err = with_timeout(
            Duration::from_millis(10),
            compio::time::sleep(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[compio::test]
    async fn test_zero_means_unbounded() {
        with_timeout(Duration::ZERO, compio::time::sleep(Duration::from_millis(5)))
            .await
            .unwrap();
    }
}
