//! Results of reconcile and finalize passes.

use std::time::Duration;

use kube_runtime::controller::Action;

use crate::classify::ErrorClass;

/// Whether a failed pass is worth retrying without human intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permanence {
    Permanent,
    Retryable,
}

/// The result of one pass of the [`Actuator`](crate::Actuator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The external resource already matched the desired state.
    InSync,
    /// The external resource was written (or, when finalizing, removed).
    Converged,
    Failed {
        permanence: Permanence,
        class: ErrorClass,
        message: String,
    },
    /// The skip gate suppressed the pass.
    Skipped,
}

impl Outcome {
    /// A failure whose permanence follows from `class`.
    pub fn failed(class: ErrorClass, message: impl Into<String>) -> Self {
        let permanence = if class.is_permanent() {
            Permanence::Permanent
        } else {
            Permanence::Retryable
        };
        Self::Failed {
            permanence,
            class,
            message: message.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::InSync | Self::Converged)
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                permanence: Permanence::Permanent,
                ..
            }
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                permanence: Permanence::Retryable,
                ..
            }
        )
    }

    /// Translates the outcome into a scheduling decision for the controller
    /// running the pass.
    ///
    /// Retryable failures come back after `retry_after`, permanent ones wait
    /// for a change of the owner. Other outcomes are resynced every `resync`,
    /// if set.
    pub fn action(&self, retry_after: Duration, resync: Option<Duration>) -> Action {
        match self {
            Self::Failed {
                permanence: Permanence::Retryable,
                ..
            } => Action::requeue(retry_after),
            Self::Failed {
                permanence: Permanence::Permanent,
                ..
            } => Action::await_change(),
            Self::InSync | Self::Converged | Self::Skipped => {
                resync.map_or_else(Action::await_change, Action::requeue)
            }
        }
    }
}
