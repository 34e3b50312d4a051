//! Azure Event Grid subscriptions delivering to an Event Hub, the reference
//! connector of this crate.
//!
//! An [`EventGridSource`] owns one event subscription scoped to the Azure
//! resource emitting the events. The subscription is named after the source
//! (see [`crate::naming::external_name`]) so that it can be looked up without
//! recording anything on the source.
//!
//! Required permissions:
//!  - `Microsoft.EventGrid/eventSubscriptions/read`
//!  - `Microsoft.EventGrid/eventSubscriptions/write`
//!  - `Microsoft.EventGrid/eventSubscriptions/delete`
//!  - `Microsoft.EventHub/namespaces/eventhubs/write`

pub mod errors;
pub mod model;
mod resource_id;

pub use errors::{classifier, AzureError, ServiceError};
pub use resource_id::{AzureResourceId, ChildResource, ParseResourceIdError, ProviderResource};

use crate::{
    actuator::Actuator,
    compare::Comparator,
    facade::Facade,
    naming::{external_name, Address, Owner, QualifiedName},
    skip::Never,
    synthesize::Synthesizer,
};
use model::{
    DeliverySchema, Destination, EventHubDestination, EventSubscription,
    EventSubscriptionProperties, Filter, RetryPolicy,
};

/// Lowercase plural kind of the owning sources, used in subscription names.
pub const SOURCE_KIND: &str = "azureeventgridsources";

pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: i32 = 30;
/// Minutes.
pub const DEFAULT_EVENT_TTL: i32 = 1440;

/// A source of events emitted by an Azure resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventGridSource {
    pub name: QualifiedName,
    /// The resource whose events are subscribed to.
    pub scope: AzureResourceId,
    /// Types of events to subscribe to. Empty means all types.
    pub event_types: Vec<String>,
}

impl Owner for EventGridSource {
    fn qualified_name(&self) -> QualifiedName {
        self.name.clone()
    }

    fn address(&self) -> Address {
        Address {
            scope: self.scope.to_string(),
            name: external_name(SOURCE_KIND, &self.name),
        }
    }
}

/// Client of the Event Grid event subscriptions API.
pub trait EventSubscriptionsClient:
    Facade<Desired = EventSubscription, Observed = EventSubscription, ResourceId = AzureResourceId>
{
}

impl<F> EventSubscriptionsClient for F where
    F: Facade<
        Desired = EventSubscription,
        Observed = EventSubscription,
        ResourceId = AzureResourceId,
    >
{
}

/// The actuator of event subscriptions, with Azure error handling.
pub fn actuator<F: EventSubscriptionsClient>(
    client: F,
) -> Actuator<F, EventGridSynthesizer, EventGridComparator, Never> {
    crate::on(client)
        .synthesize(EventGridSynthesizer)
        .compare(EventGridComparator)
        .classify_with(classifier())
        .build()
}

/// Builds event subscriptions delivering to the Event Hub whose resource ID
/// is given as target.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventGridSynthesizer;

impl Synthesizer for EventGridSynthesizer {
    type Owner = EventGridSource;
    type Target = str;
    type Desired = EventSubscription;

    fn desired(&self, owner: &EventGridSource, event_hub_id: &str) -> EventSubscription {
        // Subject filters, retry policy and delivery schema would be defaulted
        // by Azure on creation. They are set explicitly to compare equal with
        // what Azure returns.
        let included_event_types = if owner.event_types.is_empty() {
            None
        } else {
            Some(owner.event_types.clone())
        };

        EventSubscription {
            properties: Some(EventSubscriptionProperties {
                destination: Some(Destination::EventHub {
                    properties: EventHubDestination {
                        resource_id: Some(event_hub_id.to_owned()),
                    },
                }),
                filter: Some(Filter {
                    included_event_types,
                    subject_begins_with: Some(String::new()),
                    subject_ends_with: Some(String::new()),
                    is_subject_case_sensitive: None,
                }),
                retry_policy: Some(RetryPolicy {
                    max_delivery_attempts: Some(DEFAULT_MAX_DELIVERY_ATTEMPTS),
                    event_time_to_live_in_minutes: Some(DEFAULT_EVENT_TTL),
                }),
                event_delivery_schema: Some(DeliverySchema::CloudEventSchemaV10),
                ..EventSubscriptionProperties::default()
            }),
            ..EventSubscription::default()
        }
    }
}

/// Compares the attributes set by [`EventGridSynthesizer`].
#[derive(Debug, Default, Clone, Copy)]
pub struct EventGridComparator;

impl Comparator for EventGridComparator {
    type Desired = EventSubscription;
    type Observed = EventSubscription;

    fn equal_present(&self, desired: &EventSubscription, observed: &EventSubscription) -> bool {
        let (Some(desired), Some(observed)) = (&desired.properties, &observed.properties) else {
            return false;
        };

        equal_destination(desired.destination.as_ref(), observed.destination.as_ref())
            && equal_filter(desired.filter.as_ref(), observed.filter.as_ref())
            && desired.retry_policy == observed.retry_policy
            && desired.event_delivery_schema == observed.event_delivery_schema
    }
}

fn equal_destination(desired: Option<&Destination>, observed: Option<&Destination>) -> bool {
    match (desired, observed) {
        (
            Some(Destination::EventHub { properties: d }),
            Some(Destination::EventHub { properties: o }),
        ) => match (&d.resource_id, &o.resource_id) {
            // ARM IDs are case-insensitive and Azure does not always preserve case
            (Some(d), Some(o)) => d.eq_ignore_ascii_case(o),
            (d, o) => d == o,
        },
        (d, o) => d == o,
    }
}

fn equal_filter(desired: Option<&Filter>, observed: Option<&Filter>) -> bool {
    let empty = Filter::default();
    let desired = desired.unwrap_or(&empty);
    let observed = observed.unwrap_or(&empty);

    desired.included_event_types.as_deref().unwrap_or_default()
        == observed.included_event_types.as_deref().unwrap_or_default()
        && desired.subject_begins_with.as_deref().unwrap_or_default()
            == observed.subject_begins_with.as_deref().unwrap_or_default()
        && desired.subject_ends_with.as_deref().unwrap_or_default()
            == observed.subject_ends_with.as_deref().unwrap_or_default()
}
