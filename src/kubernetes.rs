//! Bindings of the convergence loop to Kubernetes objects.

use std::fmt::Debug;

use chrono::Utc;
use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    NamespaceResourceScope,
};
use kube_client::{
    api::{Patch, PatchParams},
    Api, Client,
};
use kube_core::{Resource, ResourceExt};
use kube_runtime::events::{Event, EventType, Recorder, Reporter};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Map, Value};

use crate::{
    naming::QualifiedName,
    skip::SkipGate,
    status::{EventRecord, Report, Severity, SinkError, StatusSink, CONDITION_SUBSCRIBED},
};

impl QualifiedName {
    pub fn from_resource<K: Resource>(resource: &K) -> Self {
        Self {
            namespace: resource.meta().namespace.clone(),
            name: resource.name_any(),
        }
    }
}

/// Writes reports to the status subresource of an object and publishes
/// events about it.
pub struct KubeStatusSink<K> {
    api: Api<K>,
    name: String,
    id_field: &'static str,
    recorder: Recorder,
}

impl<K> KubeStatusSink<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug,
{
    /// `id_field` is the key under `status` receiving resource IDs, e.g.
    /// `eventSubscriptionID`.
    pub fn new(api: Api<K>, recorder: Recorder, owner: &K, id_field: &'static str) -> Self {
        Self {
            api,
            name: owner.name_any(),
            id_field,
            recorder,
        }
    }

    /// A sink for a namespaced object, publishing events as `reporter`.
    pub fn for_object(client: Client, reporter: Reporter, owner: &K, id_field: &'static str) -> Self
    where
        K: Resource<Scope = NamespaceResourceScope>,
    {
        let ns = owner.namespace().unwrap_or_default();
        let api = Api::namespaced(client.clone(), &ns);
        let recorder = Recorder::new(client, reporter, owner.object_ref(&()));
        Self::new(api, recorder, owner, id_field)
    }

    async fn current_conditions(&self) -> Result<Vec<Condition>, SinkError> {
        let current = self.api.get_status(&self.name).await?;
        let current = serde_json::to_value(current)?;
        match current.pointer("/status/conditions") {
            Some(conditions) => Ok(serde_json::from_value(conditions.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

impl<K, Id> StatusSink<Id> for KubeStatusSink<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync,
    Id: Serialize + Send + Sync,
{
    async fn update_status(&self, report: &Report<Id>) -> Result<(), SinkError> {
        let mut status = Map::new();

        let condition = match report {
            Report::Ready { resource_id } => {
                if let Some(id) = resource_id {
                    status.insert(self.id_field.to_owned(), serde_json::to_value(id)?);
                }
                subscribed_condition(true, "Subscribed", "")
            }
            Report::NotReady { reason, message } => {
                subscribed_condition(false, reason.as_str(), message)
            }
        };

        let conditions = merge_condition(self.current_conditions().await?, condition);
        status.insert("conditions".to_owned(), serde_json::to_value(conditions)?);

        let patch = json!({ "status": Value::Object(status) });
        self.api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<(), SinkError> {
        let type_ = match event.severity {
            Severity::Normal => EventType::Normal,
            Severity::Warning => EventType::Warning,
        };
        self.recorder
            .publish(Event {
                type_,
                reason: event.reason.clone(),
                note: Some(event.message.clone()),
                action: event.action.to_owned(),
                secondary: None,
            })
            .await?;
        Ok(())
    }
}

fn subscribed_condition(ready: bool, reason: &str, message: &str) -> Condition {
    Condition {
        type_: CONDITION_SUBSCRIBED.to_owned(),
        status: if ready { "True" } else { "False" }.to_owned(),
        reason: reason.to_owned(),
        message: message.to_owned(),
        last_transition_time: Time(Utc::now()),
        observed_generation: None,
    }
}

/// Replaces the condition of the same type in `conditions`, keeping its
/// transition time when its status does not change.
fn merge_condition(mut conditions: Vec<Condition>, mut condition: Condition) -> Vec<Condition> {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
    conditions
}

/// Skips objects carrying an annotation, optionally with a given value.
#[derive(Debug, Clone)]
pub struct Annotated {
    key: String,
    value: Option<String>,
}

impl Annotated {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn with_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }
}

impl<K: Resource> SkipGate<K> for Annotated {
    fn should_skip(&self, owner: &K) -> bool {
        owner
            .annotations()
            .get(&self.key)
            .is_some_and(|found| self.value.as_ref().map_or(true, |want| want == found))
    }
}
