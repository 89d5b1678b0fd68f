//! Cancellation helpers.
//!
//! Cancellation uses [`CancellationToken`]: it is runtime-agnostic, cloneable
//! and supports child tokens, so a façade can cancel every in-flight attempt
//! of one connection cycle at once.

use futures::future::{select, Either};
use std::future::Future;
use std::pin::pin;

pub use tokio_util::sync::CancellationToken;

/// Race `fut` against `token`.
///
/// Returns `None` if the token fired first (or was already cancelled, in which
/// case `fut` is never polled). Dropping `fut` on cancellation is the only
/// cleanup performed.
pub async fn or_cancel<F: Future>(fut: F, token: &CancellationToken) -> Option<F::Output> {
    if token.is_cancelled() {
        return None;
    }
    let fut = pin!(fut);
    let cancelled = pin!(token.cancelled());
    match select(fut, cancelled).await {
        Either::Left((output, _)) => Some(output),
        Either::Right(((), _)) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[compio::test]
    async fn test_completes_without_cancel() {
        let token = CancellationToken::new();
        assert_eq!(or_cancel(async { 3 }, &token).await, Some(3));
    }

    #[compio::test]
    async fn test_already_cancelled_never_polls() {
        let token = CancellationToken::new();
        token.cancel();
        let polled = std::cell::Cell::new(false);
        let result = or_cancel(async { polled.set(true) }, &token).await;
        assert!(result.is_none());
        assert!(!polled.get());
    }

    #[compio::test]
    async fn test_cancel_mid_flight() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        compio::runtime::spawn(async move {
            compio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        })
        .detach();

        let result = or_cancel(compio::time::sleep(Duration::from_secs(5)), &token).await;
        assert!(result.is_none());
    }
}
