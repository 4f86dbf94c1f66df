//! Cancellation and deadline guard for a turn.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::OrcaError;

/// A turn's cancellation token plus its optional deadline.
///
/// Every suspension point of a turn runs through [`TurnGuard::run`], so a fired
/// token surfaces as [`OrcaError::Canceled`] and an elapsed deadline as
/// [`OrcaError::Timeout`]. Reaching the deadline also fires the token, which
/// stops in-flight tool calls.
#[derive(Debug, Clone)]
pub struct TurnGuard {
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl TurnGuard {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            cancel,
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
        }
    }

    /// A guard that never fires on its own.
    pub fn unbounded() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Whether this turn was canceled or ran past its deadline.
    ///
    /// Errors raised while this is false came from a collaborator, even when
    /// they are `Timeout` or `Canceled` variants.
    pub fn interrupted(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline_passed()
    }

    /// `Timeout` once the deadline has passed, `Canceled` otherwise.
    pub fn interrupt_error(&self) -> OrcaError {
        if self.deadline_passed() {
            OrcaError::Timeout(self.timeout_ms())
        } else {
            OrcaError::Canceled
        }
    }

    /// Fail fast if the turn was already interrupted.
    pub fn check(&self) -> Result<(), OrcaError> {
        if self.cancel.is_cancelled() || self.deadline_passed() {
            self.cancel.cancel();
            return Err(self.interrupt_error());
        }
        Ok(())
    }

    /// Race `future` against cancellation and the deadline.
    pub async fn run<T>(
        &self,
        future: impl Future<Output = Result<T, OrcaError>>,
    ) -> Result<T, OrcaError> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(self.interrupt_error()),
            _ = deadline => {
                self.cancel.cancel();
                Err(OrcaError::Timeout(self.timeout_ms()))
            }
            result = future => result,
        }
    }

    /// Fire the token when the deadline elapses, for work that outlives [`run`](Self::run).
    pub fn watch_deadline(&self) -> Option<JoinHandle<()>> {
        let deadline = self.deadline?;
        let cancel = self.cancel.clone();
        Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep_until(deadline) => cancel.cancel(),
            }
        }))
    }

    /// Map a `Canceled` caused by the deadline to `Timeout`.
    pub fn classify(&self, error: OrcaError) -> OrcaError {
        match error {
            OrcaError::Canceled => self.interrupt_error(),
            other => other,
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.map_or(0, |t| t.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_surfaces_as_timeout_and_fires_the_token() {
        let guard = TurnGuard::new(CancellationToken::new(), Some(Duration::from_millis(50)));
        let err = guard
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, OrcaError>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrcaError::Timeout(50)));
        assert!(guard.token().is_cancelled());
        assert!(guard.interrupted());
    }

    #[tokio::test]
    async fn cancellation_surfaces_as_canceled() {
        let guard = TurnGuard::unbounded();
        guard.token().cancel();
        let err = guard
            .run(async { Ok::<_, OrcaError>(1) })
            .await
            .unwrap_err();
        assert!(matches!(err, OrcaError::Canceled));
        assert!(guard.check().is_err());
    }

    #[tokio::test]
    async fn collaborator_timeouts_pass_through_a_live_guard() {
        let guard = TurnGuard::new(CancellationToken::new(), Some(Duration::from_secs(60)));
        let err = guard
            .run(async { Err::<(), _>(OrcaError::Timeout(30_000)) })
            .await
            .unwrap_err();
        assert!(matches!(err, OrcaError::Timeout(30_000)));
        assert!(!guard.interrupted());
    }

    #[tokio::test]
    async fn completes_when_not_interrupted() {
        let guard = TurnGuard::new(CancellationToken::new(), Some(Duration::from_secs(5)));
        assert_eq!(guard.run(async { Ok::<_, OrcaError>(7) }).await.unwrap(), 7);
        assert!(guard.check().is_ok());
        assert!(!guard.interrupted());
    }
}
