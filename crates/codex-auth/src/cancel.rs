//! Racing remote calls against a cancellation token

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// Run `work` unless `cancel` trips first.
///
/// A token that is already cancelled short-circuits without polling `work`.
/// When the token trips mid-flight the `work` future is dropped, which aborts
/// any in-flight reqwest call, and `Cancelled` is returned instead of whatever
/// error the aborted call would have produced.
pub async fn cancellable<F, T, E>(cancel: &CancellationToken, work: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: From<Error>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled.into());
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled.into()),
        result = work => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn already_cancelled_never_polls_work() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let polled = Arc::new(AtomicBool::new(false));
        let flag = polled.clone();

        let result: Result<(), Error> = cancellable(&cancel, async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_mid_flight_wins_over_slow_work() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let result: Result<(), Error> = cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(Error::Http("should have been dropped".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn completed_work_passes_through() {
        let cancel = CancellationToken::new();
        let result: Result<u16, Error> = cancellable(&cancel, async { Ok(200) }).await;
        assert_eq!(result.unwrap(), 200);
    }
}
