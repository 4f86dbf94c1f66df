//! Outcome of a best-effort auxiliary inference.

use crate::error::OrcaError;
use crate::util::TurnGuard;

/// A value either inferred by the engine or substituted after a failure.
///
/// The degraded path is a visible branch: callers record `Defaulted` in the
/// turn report instead of swallowing the error.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference<T> {
    Inferred(T),
    Defaulted { value: T, reason: String },
}

impl<T> Inference<T> {
    /// Substitute `default` on failure unless the turn itself was interrupted.
    ///
    /// A `Timeout` raised by the engine while `guard` is still live is an
    /// ordinary failure and takes the default.
    pub fn resolve(
        result: Result<T, OrcaError>,
        guard: &TurnGuard,
        default: impl FnOnce() -> T,
    ) -> Result<Self, OrcaError> {
        match result {
            Ok(value) => Ok(Self::Inferred(value)),
            Err(_) if guard.interrupted() => Err(guard.interrupt_error()),
            Err(e) => Ok(Self::Defaulted {
                value: default(),
                reason: e.to_string(),
            }),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Inferred(value) | Self::Defaulted { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Inferred(value) | Self::Defaulted { value, .. } => value,
        }
    }

    /// Why the default was used, if it was.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Inferred(_) => None,
            Self::Defaulted { reason, .. } => Some(reason),
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Self::Defaulted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_fall_back_to_the_default() {
        let guard = TurnGuard::unbounded();
        let outcome =
            Inference::resolve(Err(OrcaError::Engine("boom".into())), &guard, || "New Thread")
                .unwrap();
        assert!(outcome.is_defaulted());
        assert_eq!(*outcome.value(), "New Thread");
        assert!(outcome.reason().unwrap().contains("boom"));
    }

    #[test]
    fn engine_timeouts_on_a_live_turn_take_the_default() {
        let guard = TurnGuard::unbounded();
        let outcome = Inference::resolve(Err(OrcaError::Timeout(30_000)), &guard, || "x").unwrap();
        assert_eq!(outcome.reason(), Some("Timeout after 30000ms"));
    }

    #[test]
    fn interrupted_turns_propagate() {
        let guard = TurnGuard::unbounded();
        guard.token().cancel();
        let outcome = Inference::resolve(Err::<&str, _>(OrcaError::Engine("late".into())), &guard, || "x");
        assert!(matches!(outcome, Err(OrcaError::Canceled)));
    }
}
