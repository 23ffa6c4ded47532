//! Consecutive-failure tracking
//!
//! Isolated failures are recorded and skipped. A run of back-to-back
//! failures means the share itself has gone away, and ends the walk.

use crate::error::ErrorDescriptor;

/// Back-to-back failures that abort a walk
pub const CONSECUTIVE_ERROR_THRESHOLD: u32 = 10;

/// Outcome of one processed entry
#[derive(Debug, Clone)]
pub enum Outcome {
    Success,
    Failure(ErrorDescriptor),
}

/// Whether the walk may go on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Abort,
}

/// Tracks failures for one scan and decides skip-vs-abort
#[derive(Debug, Default)]
pub struct ErrorRecoveryController {
    consecutive: u32,
    total: u64,
    errors: Vec<ErrorDescriptor>,
}

impl ErrorRecoveryController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outcome and return the resulting decision
    pub fn record(&mut self, outcome: Outcome) -> Decision {
        match outcome {
            Outcome::Success => {
                self.consecutive = 0;
                Decision::Continue
            }
            Outcome::Failure(err) => {
                self.consecutive += 1;
                self.total += 1;
                log::debug!(
                    "Recorded failure {} ({} consecutive): {}",
                    self.total,
                    self.consecutive,
                    err
                );
                self.errors.push(err);
                if self.consecutive >= CONSECUTIVE_ERROR_THRESHOLD {
                    Decision::Abort
                } else {
                    Decision::Continue
                }
            }
        }
    }

    /// Failures since the last success
    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive
    }

    /// Failures recorded in total
    pub fn error_count(&self) -> u64 {
        self.total
    }

    pub fn errors(&self) -> &[ErrorDescriptor] {
        &self.errors
    }

    /// Hand over the accumulated error list
    pub fn into_errors(self) -> Vec<ErrorDescriptor> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Operation};
    use proptest::prelude::*;

    fn failure(n: usize) -> Outcome {
        Outcome::Failure(ErrorDescriptor::new(
            format!("/share/file{n}"),
            Operation::Stat,
            ErrorKind::IoFailure,
            "I/O error",
        ))
    }

    #[test]
    fn test_isolated_failure_resets() {
        let mut controller = ErrorRecoveryController::new();
        assert_eq!(controller.record(failure(0)), Decision::Continue);
        assert_eq!(controller.consecutive_errors(), 1);
        assert_eq!(controller.record(Outcome::Success), Decision::Continue);
        assert_eq!(controller.consecutive_errors(), 0);
        assert_eq!(controller.error_count(), 1);
        assert_eq!(controller.errors().len(), 1);
    }

    #[test]
    fn test_aborts_at_threshold() {
        let mut controller = ErrorRecoveryController::new();
        for n in 0..9 {
            assert_eq!(controller.record(failure(n)), Decision::Continue);
        }
        assert_eq!(controller.record(failure(9)), Decision::Abort);
        assert_eq!(controller.error_count(), 10);
    }

    #[test]
    fn test_nine_failures_then_success_continues() {
        let mut controller = ErrorRecoveryController::new();
        for n in 0..9 {
            controller.record(failure(n));
        }
        assert_eq!(controller.record(Outcome::Success), Decision::Continue);
        for n in 0..9 {
            assert_eq!(controller.record(failure(n)), Decision::Continue);
        }
        assert_eq!(controller.error_count(), 18);
    }

    proptest! {
        #[test]
        fn prop_abort_only_on_consecutive_run(outcomes in proptest::collection::vec(any::<bool>(), 0..200)) {
            let mut controller = ErrorRecoveryController::new();
            let mut run = 0u32;
            let mut failures = 0u64;
            for (n, ok) in outcomes.iter().enumerate() {
                let decision = if *ok {
                    run = 0;
                    controller.record(Outcome::Success)
                } else {
                    run += 1;
                    failures += 1;
                    controller.record(failure(n))
                };
                prop_assert_eq!(controller.consecutive_errors(), run);
                prop_assert_eq!(decision == Decision::Abort, run >= CONSECUTIVE_ERROR_THRESHOLD);
                if decision == Decision::Abort {
                    break;
                }
            }
            prop_assert_eq!(controller.error_count(), failures);
            prop_assert_eq!(controller.errors().len() as u64, failures);
        }
    }
}
