use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::ErrorClass,
    compare::Exact,
    eventgrid::{
        self,
        errors::INVALID_CLIENT_SECRET,
        model::{EventSubscription, RetryPolicy},
        AzureError, AzureResourceId, EventGridComparator, EventGridSource, EventGridSynthesizer,
    },
    facade::{Facade, Observed},
    naming::{Address, Owner, QualifiedName},
    outcome::{Outcome, Permanence},
    status::{EventRecord, MemorySink, Reason, Severity, StatusCondition, ACTION_FINALIZE},
    synthesize::Synthesizer,
};

const SCOPE: &str =
    "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/acc";
const HUB: &str =
    "/subscriptions/s/resourceGroups/rg/providers/Microsoft.EventHub/namespaces/ns/eventhubs/hub";
const NAME: &str = "io.triggermesh.azureeventgridsources.dev.src";

type Fail = Box<dyn Fn() -> AzureError + Send + Sync>;

type Pass = (Outcome, MemorySink<AzureResourceId>, FakeSubscriptions);

/// In-memory Event Grid, holding at most one subscription.
#[derive(Default)]
struct FakeSubscriptions {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    current: Option<EventSubscription>,
    get_delay: Option<Duration>,
    write_delay: Option<Duration>,
    delete_delay: Option<Duration>,
    get_error: Option<Fail>,
    write_error: Option<Fail>,
    delete_error: Option<Fail>,
    gets: usize,
    writes: Vec<EventSubscription>,
    deletes: usize,
}

impl FakeSubscriptions {
    fn with(f: impl FnOnce(&mut State)) -> Self {
        let fake = Self::default();
        f(&mut fake.state.lock());
        fake
    }

    async fn stall(&self, latency: impl Fn(&State) -> Option<Duration>) {
        let delay = latency(&self.state.lock());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Facade for FakeSubscriptions {
    type Desired = EventSubscription;
    type Observed = EventSubscription;
    type Handle = ();
    type Error = AzureError;
    type ResourceId = AzureResourceId;

    async fn get(
        &self,
        _scope: &str,
        _name: &str,
    ) -> Result<Observed<EventSubscription>, AzureError> {
        self.stall(|state| state.get_delay).await;
        let mut state = self.state.lock();
        state.gets += 1;
        if let Some(fail) = &state.get_error {
            return Err(fail());
        }
        Ok(state.current.clone().into())
    }

    async fn create_or_update(
        &self,
        scope: &str,
        name: &str,
        desired: &EventSubscription,
    ) -> Result<(), AzureError> {
        self.stall(|state| state.write_delay).await;
        let mut state = self.state.lock();
        state.writes.push(desired.clone());
        if let Some(fail) = &state.write_error {
            return Err(fail());
        }
        state.current = Some(EventSubscription {
            id: Some(format!("{scope}/providers/Microsoft.EventGrid/eventSubscriptions/{name}")),
            name: Some(name.to_owned()),
            ..desired.clone()
        });
        Ok(())
    }

    async fn delete(&self, _scope: &str, _name: &str) -> Result<(), AzureError> {
        self.stall(|state| state.delete_delay).await;
        let mut state = self.state.lock();
        state.deletes += 1;
        if let Some(fail) = &state.delete_error {
            return Err(fail());
        }
        match state.current.take() {
            Some(_) => Ok(()),
            None => Err(AzureError::status(
                404,
                "eventgrid.EventSubscriptionsClient#Delete: Not Found",
            )),
        }
    }

    fn resource_id<'a>(&self, observed: &'a EventSubscription) -> Option<&'a str> {
        observed.id.as_deref()
    }
}

fn fail(status: u16, message: &'static str) -> Option<Fail> {
    Some(Box::new(move || AzureError::status(status, message)))
}

fn source(event_types: &[&str]) -> EventGridSource {
    EventGridSource {
        name: QualifiedName::new(Some("dev".to_owned()), "src"),
        scope: SCOPE.parse().unwrap(),
        event_types: event_types.iter().map(|t| (*t).to_owned()).collect(),
    }
}

fn subscription_id() -> AzureResourceId {
    format!("{SCOPE}/providers/Microsoft.EventGrid/eventSubscriptions/{NAME}")
        .parse()
        .unwrap()
}

async fn reconcile(fake: FakeSubscriptions, src: &EventGridSource) -> Pass {
    let sink = MemorySink::new();
    let actuator = eventgrid::actuator(fake);
    let outcome = actuator.reconcile(src, HUB, &sink, &CancellationToken::new()).await;
    let crate::Actuator { facade, .. } = actuator;
    (outcome, sink, facade)
}

async fn finalize(fake: FakeSubscriptions) -> Pass {
    let sink = MemorySink::new();
    let actuator = eventgrid::actuator(fake);
    let outcome = actuator.finalize(&source(&[]), &sink, &CancellationToken::new()).await;
    let crate::Actuator { facade, .. } = actuator;
    (outcome, sink, facade)
}

#[tokio::test]
async fn absent_subscription_is_created() {
    let src = source(&["A", "B"]);
    let (outcome, sink, fake) = reconcile(FakeSubscriptions::default(), &src).await;

    assert_eq!(outcome, Outcome::Converged);

    let state = fake.state.lock();
    assert_eq!(state.writes.len(), 1);
    let written = state.writes[0].properties.clone().unwrap();
    let filter = written.filter.unwrap();
    assert_eq!(filter.included_event_types, Some(vec!["A".to_owned(), "B".to_owned()]));
    assert_eq!(
        written.retry_policy,
        Some(RetryPolicy {
            max_delivery_attempts: Some(30),
            event_time_to_live_in_minutes: Some(1440),
        })
    );
    assert_eq!(state.writes[0], EventGridSynthesizer.desired(&src, HUB));

    let cond = sink.condition();
    assert!(cond.ready);
    assert_eq!(cond.resource_id, None);
    assert_eq!(
        sink.events(),
        vec![EventRecord::normal(
            "Subscribed",
            format!("Created event subscription {NAME:?} for Azure resource {SCOPE:?}")
        )]
    );
}

#[tokio::test]
async fn in_sync_subscription_is_left_alone() {
    let src = source(&["A", "B"]);
    let current = EventSubscription {
        id: Some(subscription_id().to_string()),
        ..EventGridSynthesizer.desired(&src, HUB)
    };
    let fake = FakeSubscriptions::with(|state| state.current = Some(current));

    let (outcome, sink, fake) = reconcile(fake, &src).await;

    assert_eq!(outcome, Outcome::InSync);
    assert!(fake.state.lock().writes.is_empty());
    let cond = sink.condition();
    assert!(cond.ready);
    assert_eq!(cond.reason, Reason::Subscribed);
    assert_eq!(cond.resource_id, Some(subscription_id()));
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn resource_id_is_recorded_on_the_pass_after_creation() {
    let src = source(&["A"]);
    let actuator = eventgrid::actuator(FakeSubscriptions::default());
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();

    assert_eq!(actuator.reconcile(&src, HUB, &sink, &cancel).await, Outcome::Converged);
    assert_eq!(sink.condition().resource_id, None);

    assert_eq!(actuator.reconcile(&src, HUB, &sink, &cancel).await, Outcome::InSync);
    assert_eq!(sink.condition().resource_id, Some(subscription_id()));

    assert_eq!(actuator.reconcile(&src, HUB, &sink, &cancel).await, Outcome::InSync);
    let state = actuator.facade().state.lock();
    assert_eq!(state.writes.len(), 1);
    assert_eq!(state.gets, 3);
}

#[tokio::test]
async fn drifted_subscription_is_updated() {
    let src = source(&["A", "B"]);
    let stale = EventSubscription {
        id: Some(subscription_id().to_string()),
        ..EventGridSynthesizer.desired(&source(&["A"]), HUB)
    };
    let fake = FakeSubscriptions::with(|state| state.current = Some(stale));

    let (outcome, sink, fake) = reconcile(fake, &src).await;

    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(fake.state.lock().writes, vec![EventGridSynthesizer.desired(&src, HUB)]);
    let cond = sink.condition();
    assert!(cond.ready);
    assert_eq!(
        sink.events(),
        vec![EventRecord::normal(
            "Subscribed",
            format!("Updated event subscription {NAME:?} for Azure resource {SCOPE:?}")
        )]
    );
}

#[tokio::test]
async fn not_found_errors_mean_absent() {
    let fake = FakeSubscriptions::with(|state| state.get_error = fail(404, "Not Found"));
    let (outcome, sink, fake) = reconcile(fake, &source(&["A"])).await;

    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(fake.state.lock().writes.len(), 1);
    assert!(sink.condition().ready);
}

#[tokio::test]
async fn denied_lookup_is_permanent() {
    let fake = FakeSubscriptions::with(|state| {
        state.get_error = fail(403, "The client does not have authorization")
    });
    let (outcome, sink, fake) = reconcile(fake, &source(&["A"])).await;

    assert!(outcome.is_permanent());
    assert!(matches!(outcome, Outcome::Failed { class: ErrorClass::AccessDenied, .. }));
    assert!(fake.state.lock().writes.is_empty());

    let cond = sink.condition();
    assert!(!cond.ready);
    assert_eq!(cond.reason, Reason::ApiError);
    assert_eq!(
        cond.message,
        "Access denied to event subscription API: The client does not have authorization"
    );

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].severity, Severity::Warning);
    assert_eq!(events[0].reason, "FailedSubscribe");
    assert_eq!(
        events[0].message,
        format!(
            "Error getting event subscription for Azure resource {SCOPE:?}: The client does not have authorization"
        )
    );
}

#[tokio::test]
async fn failed_lookup_is_retryable() {
    let fake =
        FakeSubscriptions::with(|state| state.get_error = fail(500, "Internal Server Error"));
    let (outcome, sink, _) = reconcile(fake, &source(&["A"])).await;

    assert!(outcome.is_retryable());
    let cond = sink.condition();
    assert!(!cond.ready);
    assert_eq!(cond.message, "Cannot look up event subscription: Internal Server Error");
}

#[tokio::test]
async fn denied_write_is_permanent() {
    let fake = FakeSubscriptions::with(|state| state.write_error = fail(401, "Unauthorized"));
    let (outcome, sink, fake) = reconcile(fake, &source(&["A"])).await;

    assert_eq!(
        outcome,
        Outcome::Failed {
            permanence: Permanence::Permanent,
            class: ErrorClass::AccessDenied,
            message: "Access denied to event subscription API: Unauthorized".to_owned(),
        }
    );
    assert_eq!(fake.state.lock().writes.len(), 1);
    assert_eq!(sink.condition().reason, Reason::ApiError);
}

#[tokio::test]
async fn failed_write_is_retryable() {
    let current = EventGridSynthesizer.desired(&source(&["old"]), HUB);
    let fake = FakeSubscriptions::with(|state| {
        state.current = Some(current);
        state.write_error = fail(409, "Conflict");
    });
    let (outcome, sink, _) = reconcile(fake, &source(&["A"])).await;

    assert!(outcome.is_retryable());
    assert_eq!(sink.condition().message, "Cannot subscribe to events: Conflict");
    assert_eq!(
        sink.events()[0].message,
        format!("Error updating event subscription for Azure resource {SCOPE:?}: Conflict")
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_lookup_is_transient() {
    let fake = FakeSubscriptions::with(|state| state.get_delay = Some(Duration::from_secs(60)));
    let (outcome, sink, fake) = reconcile(fake, &source(&["A"])).await;

    assert!(matches!(
        outcome,
        Outcome::Failed {
            permanence: Permanence::Retryable,
            class: ErrorClass::Transient,
            ..
        }
    ));
    assert_eq!(fake.state.lock().gets, 0);
    assert_eq!(
        sink.condition().message,
        "Cannot look up event subscription: request timed out after 15s"
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_write_is_transient() {
    let fake = FakeSubscriptions::with(|state| state.write_delay = Some(Duration::from_secs(60)));
    let (outcome, sink, fake) = reconcile(fake, &source(&["A"])).await;

    assert_eq!(
        outcome,
        Outcome::Failed {
            permanence: Permanence::Retryable,
            class: ErrorClass::Transient,
            message: "Cannot subscribe to events: request timed out after 15s".to_owned(),
        }
    );
    let state = fake.state.lock();
    assert_eq!(state.gets, 1);
    assert!(state.writes.is_empty());
    assert!(!sink.condition().ready);
    assert_eq!(sink.events()[0].reason, "FailedSubscribe");
}

#[tokio::test(start_paused = true)]
async fn timed_out_deletion_is_transient() {
    let current = EventGridSynthesizer.desired(&source(&[]), HUB);
    let fake = FakeSubscriptions::with(|state| {
        state.current = Some(current);
        state.delete_delay = Some(Duration::from_secs(60));
    });
    let (outcome, sink, fake) = finalize(fake).await;

    assert_eq!(
        outcome,
        Outcome::Failed {
            permanence: Permanence::Retryable,
            class: ErrorClass::Transient,
            message: "Cannot delete event subscription: request timed out after 15s".to_owned(),
        }
    );
    assert!(fake.state.lock().current.is_some());
    assert_eq!(
        sink.condition().message,
        "Cannot delete event subscription: request timed out after 15s"
    );
}

#[tokio::test]
async fn cancelled_pass_is_transient() {
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let actuator = eventgrid::actuator(FakeSubscriptions::default());
    let outcome = actuator.reconcile(&source(&["A"]), HUB, &sink, &cancel).await;

    assert!(matches!(outcome, Outcome::Failed { class: ErrorClass::Transient, .. }));
    assert!(outcome.is_retryable());
}

#[tokio::test]
async fn skipped_passes_do_nothing() {
    let actuator = crate::on(FakeSubscriptions::default())
        .synthesize(EventGridSynthesizer)
        .compare(EventGridComparator)
        .skip_if(|src: &EventGridSource| src.name.namespace.as_deref() == Some("dev"))
        .classify_with(eventgrid::classifier())
        .build();
    let sink = MemorySink::new();
    let cancel = CancellationToken::new();

    let src = source(&["A"]);
    assert_eq!(actuator.reconcile(&src, HUB, &sink, &cancel).await, Outcome::Skipped);
    assert_eq!(actuator.finalize(&src, &sink, &cancel).await, Outcome::Skipped);

    let state = actuator.facade().state.lock();
    assert_eq!((state.gets, state.writes.len(), state.deletes), (0, 0, 0));
    assert_eq!(sink.condition(), StatusCondition::unknown());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn unparseable_resource_id_fails_the_pass() {
    let src = source(&["A"]);
    let current = EventSubscription {
        id: Some("not-an-arm-id".to_owned()),
        ..EventGridSynthesizer.desired(&src, HUB)
    };
    let fake = FakeSubscriptions::with(|state| state.current = Some(current));
    let (outcome, sink, _) = reconcile(fake, &src).await;

    assert!(outcome.is_retryable());
    let cond = sink.condition();
    assert_eq!(cond.reason, Reason::InvalidResourceId);
    assert!(cond
        .message
        .starts_with("converting resource ID string to structured resource ID: "));
}

#[tokio::test]
async fn auth_failures_report_identical_messages() {
    fn token_refresh(trace_id: &'static str) -> Option<Fail> {
        Some(Box::new(move || {
            AzureError::wrapping(
                Some(401),
                "azure.BearerAuthorizer#WithAuthorization: Failed to refresh the Token",
                AzureError::TokenRefresh {
                    status: 401,
                    body: format!(
                        "AADSTS7000215: Invalid client secret is provided. Trace ID: {trace_id}"
                    ),
                },
            )
        }))
    }

    let a = FakeSubscriptions::with(|state| {
        state.get_error = token_refresh("7c1b0d50-d2a4-4b8e-9d53-9b5f4a3a0c01")
    });
    let b = FakeSubscriptions::with(|state| {
        state.get_error = token_refresh("b3b5d4e0-6a0e-4f7f-8f5d-2a4d1c1e9f77")
    });

    let (outcome_a, sink_a, _) = reconcile(a, &source(&["A"])).await;
    let (outcome_b, sink_b, _) = reconcile(b, &source(&["A"])).await;

    assert_eq!(outcome_a, outcome_b);
    assert!(outcome_a.is_permanent());
    assert_eq!(sink_a.condition(), sink_b.condition());
    assert_eq!(sink_a.events(), sink_b.events());
    assert!(sink_a.condition().message.ends_with(INVALID_CLIENT_SECRET));
}

#[tokio::test]
async fn finalize_deletes_subscription() {
    let current = EventGridSynthesizer.desired(&source(&[]), HUB);
    let fake = FakeSubscriptions::with(|state| state.current = Some(current));
    let (outcome, sink, fake) = finalize(fake).await;

    assert_eq!(outcome, Outcome::Converged);
    assert!(fake.state.lock().current.is_none());
    assert_eq!(sink.condition(), StatusCondition::unknown());
    assert_eq!(
        sink.events(),
        vec![EventRecord::normal(
            "Unsubscribed",
            format!("Deleted event subscription {NAME:?} for Azure resource {SCOPE:?}")
        )
        .during(ACTION_FINALIZE)]
    );
}

#[tokio::test]
async fn finalize_tolerates_missing_subscription() {
    let (outcome, sink, fake) = finalize(FakeSubscriptions::default()).await;

    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(fake.state.lock().deletes, 1);
    assert_eq!(
        sink.events(),
        vec![EventRecord::warning(
            "Unsubscribed",
            "Event subscription not found, skipping deletion"
        )
        .during(ACTION_FINALIZE)]
    );
}

#[tokio::test]
async fn finalize_ignores_denied_deletion() {
    let fake = FakeSubscriptions::with(|state| state.delete_error = fail(403, "Forbidden"));
    let (outcome, sink, _) = finalize(fake).await;

    assert_eq!(outcome, Outcome::Converged);
    assert_eq!(sink.condition(), StatusCondition::unknown());
    assert_eq!(
        sink.events(),
        vec![EventRecord::warning(
            "FailedUnsubscribe",
            "Access denied to event subscription API. Ignoring: Forbidden"
        )
        .during(ACTION_FINALIZE)]
    );
}

#[tokio::test]
async fn finalize_retries_other_failures() {
    let fake =
        FakeSubscriptions::with(|state| state.delete_error = fail(500, "Internal Server Error"));
    let (outcome, sink, _) = finalize(fake).await;

    assert!(outcome.is_retryable());
    let cond = sink.condition();
    assert!(!cond.ready);
    assert_eq!(cond.message, "Cannot delete event subscription: Internal Server Error");
    let events = sink.events();
    assert_eq!(events[0].reason, "FailedUnsubscribe");
    assert_eq!(events[0].action, ACTION_FINALIZE);
}

/// A webhook registry keyed by name, converged with exact comparison.
#[derive(Default)]
struct Webhooks {
    hooks: Mutex<Vec<(String, String)>>,
}

#[derive(Debug, thiserror::Error)]
#[error("webhook API unavailable")]
struct WebhookError;

impl Facade for Webhooks {
    type Desired = String;
    type Observed = String;
    type Handle = ();
    type Error = WebhookError;
    type ResourceId = String;

    async fn get(&self, _scope: &str, name: &str) -> Result<Observed<String>, WebhookError> {
        let hooks = self.hooks.lock();
        let found = hooks.iter().find(|(n, _)| n == name).map(|(_, url)| url.clone());
        Ok(found.into())
    }

    async fn create_or_update(
        &self,
        _scope: &str,
        name: &str,
        desired: &String,
    ) -> Result<(), WebhookError> {
        let mut hooks = self.hooks.lock();
        hooks.retain(|(n, _)| n != name);
        hooks.push((name.to_owned(), desired.clone()));
        Ok(())
    }

    async fn delete(&self, _scope: &str, name: &str) -> Result<(), WebhookError> {
        self.hooks.lock().retain(|(n, _)| n != name);
        Ok(())
    }

    fn resource_id<'a>(&self, _observed: &'a String) -> Option<&'a str> {
        None
    }
}

struct WebhookTarget {
    name: QualifiedName,
}

impl Owner for WebhookTarget {
    fn qualified_name(&self) -> QualifiedName {
        self.name.clone()
    }

    fn address(&self) -> Address {
        Address {
            scope: "https://saas.example.com".to_owned(),
            name: crate::naming::external_name("webhooktargets", &self.name),
        }
    }
}

struct WebhookSynthesizer;

impl Synthesizer for WebhookSynthesizer {
    type Owner = WebhookTarget;
    type Target = str;
    type Desired = String;

    fn desired(&self, _owner: &WebhookTarget, sink_url: &str) -> String {
        sink_url.to_owned()
    }
}

#[tokio::test]
async fn any_connector_converges() {
    let actuator = crate::on(Webhooks::default())
        .synthesize(WebhookSynthesizer)
        .compare(Exact::<String>::new())
        .build();
    let owner = WebhookTarget {
        name: QualifiedName::new(Some("dev".to_owned()), "hook"),
    };
    let sink = MemorySink::<String>::new();
    let cancel = CancellationToken::new();

    let url = "http://broker.dev.svc";
    assert_eq!(actuator.reconcile(&owner, url, &sink, &cancel).await, Outcome::Converged);
    assert_eq!(actuator.reconcile(&owner, url, &sink, &cancel).await, Outcome::InSync);
    assert_eq!(
        actuator.reconcile(&owner, "http://other.dev.svc", &sink, &cancel).await,
        Outcome::Converged
    );
    assert_eq!(actuator.facade().hooks.lock().len(), 1);

    assert_eq!(actuator.finalize(&owner, &sink, &cancel).await, Outcome::Converged);
    assert!(actuator.facade().hooks.lock().is_empty());
    assert!(sink.condition().ready);
}
