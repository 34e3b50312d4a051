//! The convergence control loop.
//!
//! One pass of [`Actuator::reconcile`] probes the external resource, compares
//! it with the desired state and writes it when they differ:
//!
//! ```text
//! probe ─┬─ absent ──────────────────────┬─> create/update ─┬─> Converged
//!        ├─ present ─> compare ─ differs ┘                  └─> Failed
//!        │                     └ equal ────> InSync
//!        └─ error ───────────────────────────────────────────> Failed
//! ```
//!
//! [`Actuator::finalize`] removes the external resource. Neither ever returns
//! an error: every path ends in an [`Outcome`], and every pass reports to the
//! status sink exactly once.

use std::{fmt::Display, future::Future, str::FromStr};

use kube_runtime::controller::Action;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::{Classification, Classifier, ErrorClass},
    compare::Comparator,
    config::Settings,
    facade::{bounded, CallError, Facade, Observed},
    naming::{Address, Owner},
    outcome::Outcome,
    skip::SkipGate,
    status::{EventRecord, Reason, Reporter, StatusSink, ACTION_FINALIZE},
    synthesize::Synthesizer,
};

/// Converges one kind of external resource. Built with [`crate::on`].
///
/// The actuator holds no per-object state, so a single instance serves any
/// number of concurrent passes over distinct owners.
pub struct Actuator<F, S, C, G> {
    pub(crate) facade: F,
    pub(crate) synthesizer: S,
    pub(crate) comparator: C,
    pub(crate) gate: G,
    pub(crate) classifier: Classifier,
    pub(crate) settings: Settings,
}

impl<F, S, C, G> Actuator<F, S, C, G>
where
    F: Facade,
    <F::ResourceId as FromStr>::Err: Display,
    S: Synthesizer<Desired = F::Desired>,
    S::Owner: Owner,
    S::Target: Sync,
    C: Comparator<Desired = F::Desired, Observed = F::Observed>,
    G: SkipGate<S::Owner>,
{
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn facade(&self) -> &F {
        &self.facade
    }

    /// Maps the outcome of a pass to the next scheduling decision.
    pub fn action(&self, outcome: &Outcome) -> Action {
        outcome.action(self.settings.retry_after, self.settings.resync)
    }

    /// Ensures the external resource of `owner` exists with the desired
    /// configuration, delivering to `target`.
    pub async fn reconcile<K>(
        &self,
        owner: &S::Owner,
        target: &S::Target,
        sink: &K,
        cancel: &CancellationToken,
    ) -> Outcome
    where
        K: StatusSink<F::ResourceId>,
    {
        let reporter = Reporter::new(sink);
        let qualified = owner.qualified_name();

        if self.gate.should_skip(owner) {
            log::debug!("Skipping reconciliation of {qualified}");
            reporter.finish(None).await;
            return Outcome::Skipped;
        }

        let Address { scope, name } = owner.address();
        let words = &self.settings.vocabulary;
        log::debug!("Reconciling {} {name:?} of {qualified}", words.resource);

        let desired = self.synthesizer.desired(owner, target);

        let observed = match self.call(self.facade.get(&scope, &name), cancel).await {
            Ok(observed) => observed,
            Err(Classification {
                class: ErrorClass::NotFound,
                ..
            }) => Observed::Absent,
            Err(failure) => {
                let message = match failure.class {
                    ErrorClass::AccessDenied => {
                        format!("Access denied to {} API: {}", words.resource, failure.message)
                    }
                    _ => format!("Cannot look up {}: {}", words.resource, failure.message),
                };
                let event = EventRecord::warning(
                    words.reason_failed_subscribe,
                    format!(
                        "Error getting {} for {} {scope:?}: {}",
                        words.resource, words.scope, failure.message
                    ),
                );
                return fail(reporter, failure.class, Reason::ApiError, message, event).await;
            }
        };

        let exists = observed.is_present();

        if self.comparator.equal(&desired, &observed) {
            let resource_id = observed
                .as_present()
                .and_then(|observed| self.facade.resource_id(observed))
                .map(str::parse::<F::ResourceId>)
                .transpose();

            return match resource_id {
                Ok(resource_id) => {
                    log::debug!("{} {name:?} of {qualified} is in sync", words.resource);
                    reporter.mark_ready(resource_id, None).await;
                    Outcome::InSync
                }
                Err(err) => {
                    let message =
                        format!("converting resource ID string to structured resource ID: {err}");
                    let event =
                        EventRecord::warning(words.reason_failed_subscribe, message.clone());
                    fail(reporter, ErrorClass::Unknown, Reason::InvalidResourceId, message, event)
                        .await
                }
            };
        }

        let write = self.facade.create_or_update(&scope, &name, &desired);
        if let Err(failure) = self.call(write, cancel).await {
            let message = match failure.class {
                ErrorClass::AccessDenied => {
                    format!("Access denied to {} API: {}", words.resource, failure.message)
                }
                _ => format!("{}: {}", words.converge_failure, failure.message),
            };
            let verb = if exists { "updating" } else { "creating" };
            let event = EventRecord::warning(
                words.reason_failed_subscribe,
                format!(
                    "Error {verb} {} for {} {scope:?}: {}",
                    words.resource, words.scope, failure.message
                ),
            );
            return fail(reporter, failure.class, Reason::ApiError, message, event).await;
        }

        // The write only returned a handle on an asynchronous operation.
        // Waiting for it could take several seconds, so the ID of the resource
        // is left for the next pass to record.
        let verb = if exists { "Updated" } else { "Created" };
        log::info!("{verb} {} {name:?} of {qualified}", words.resource);
        let event = EventRecord::normal(
            words.reason_subscribed,
            format!("{verb} {} {name:?} for {} {scope:?}", words.resource, words.scope),
        );
        reporter.mark_ready(None, Some(event)).await;

        Outcome::Converged
    }

    /// Ensures the external resource of `owner` no longer exists.
    ///
    /// Failures a user cannot fix through the owner (missing resource,
    /// missing permissions) do not block the deletion of the owner.
    pub async fn finalize<K>(
        &self,
        owner: &S::Owner,
        sink: &K,
        cancel: &CancellationToken,
    ) -> Outcome
    where
        K: StatusSink<F::ResourceId>,
    {
        let reporter = Reporter::new(sink);
        let qualified = owner.qualified_name();

        if self.gate.should_skip(owner) {
            log::debug!("Skipping finalization of {qualified}");
            reporter.finish(None).await;
            return Outcome::Skipped;
        }

        let Address { scope, name } = owner.address();
        let words = &self.settings.vocabulary;
        log::debug!("Finalizing {} {name:?} of {qualified}", words.resource);

        match self.call(self.facade.delete(&scope, &name), cancel).await {
            Ok(()) => {
                log::info!("Deleted {} {name:?} of {qualified}", words.resource);
                let event = EventRecord::normal(
                    words.reason_unsubscribed,
                    format!("Deleted {} {name:?} for {} {scope:?}", words.resource, words.scope),
                )
                .during(ACTION_FINALIZE);
                reporter.finish(Some(event)).await;
                Outcome::Converged
            }
            Err(Classification {
                class: ErrorClass::NotFound,
                ..
            }) => {
                let event = EventRecord::warning(
                    words.reason_unsubscribed,
                    format!("{} not found, skipping deletion", capitalize(words.resource)),
                )
                .during(ACTION_FINALIZE);
                reporter.finish(Some(event)).await;
                Outcome::Converged
            }
            Err(Classification {
                class: ErrorClass::AccessDenied,
                message,
            }) => {
                log::warn!(
                    "Ignoring denied deletion of {} {name:?} of {qualified}: {message}",
                    words.resource
                );
                let event = EventRecord::warning(
                    words.reason_failed_unsubscribe,
                    format!("Access denied to {} API. Ignoring: {message}", words.resource),
                )
                .during(ACTION_FINALIZE);
                reporter.finish(Some(event)).await;
                Outcome::Converged
            }
            Err(failure) => {
                let event = EventRecord::warning(
                    words.reason_failed_unsubscribe,
                    format!(
                        "Error deleting {} for {} {scope:?}: {}",
                        words.resource, words.scope, failure.message
                    ),
                )
                .during(ACTION_FINALIZE);
                let message = format!("Cannot delete {}: {}", words.resource, failure.message);
                fail(reporter, failure.class, Reason::ApiError, message, event).await
            }
        }
    }

    /// Runs one bounded call and classifies its failure.
    async fn call<T>(
        &self,
        call: impl Future<Output = Result<T, F::Error>>,
        cancel: &CancellationToken,
    ) -> Result<T, Classification> {
        bounded(self.settings.timeout, cancel, call)
            .await
            .map_err(|err| match err {
                CallError::Backend(err) => self.classifier.classify(&err),
                interrupted => Classification {
                    class: ErrorClass::Transient,
                    message: interrupted.to_string(),
                },
            })
    }
}

async fn fail<Id, K>(
    reporter: Reporter<'_, Id, K>,
    class: ErrorClass,
    reason: Reason,
    message: String,
    event: EventRecord,
) -> Outcome
where
    Id: Send + Sync,
    K: StatusSink<Id>,
{
    log::warn!("{}", event.message);
    reporter.mark_failed(reason, message.clone(), Some(event)).await;
    Outcome::failed(class, message)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
