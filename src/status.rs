//! Status conditions of owning objects and the events accompanying them.

use std::{fmt, future::Future, marker::PhantomData};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Type of the condition maintained on owning objects.
pub const CONDITION_SUBSCRIBED: &str = "Subscribed";

/// Action of events emitted while converging an external resource.
pub const ACTION_RECONCILE: &str = "Reconcile";
/// Action of events emitted while deleting an external resource.
pub const ACTION_FINALIZE: &str = "Finalize";

/// Why an owning object is, or is not, subscribed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reason {
    #[serde(rename = "Subscribed")]
    Subscribed,
    /// A call to the external API failed.
    #[serde(rename = "APIError")]
    ApiError,
    /// The external API returned an identifier that could not be parsed.
    #[serde(rename = "InvalidResourceID")]
    InvalidResourceId,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subscribed => "Subscribed",
            Self::ApiError => "APIError",
            Self::InvalidResourceId => "InvalidResourceID",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted subscription condition of an owning object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCondition<Id> {
    pub ready: bool,
    pub reason: Reason,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Id>,
}

impl<Id> StatusCondition<Id> {
    /// The condition of an object no pass has reported on yet.
    pub fn unknown() -> Self {
        Self {
            ready: false,
            reason: Reason::ApiError,
            message: "Not yet reconciled".to_owned(),
            resource_id: None,
        }
    }

    /// Applies the report of one pass.
    ///
    /// The recorded resource ID only changes when a report carries a new one.
    pub fn apply(&mut self, report: Report<Id>) {
        match report {
            Report::Ready { resource_id } => {
                self.ready = true;
                self.reason = Reason::Subscribed;
                self.message.clear();
                if let Some(id) = resource_id {
                    self.resource_id = Some(id);
                }
            }
            Report::NotReady { reason, message } => {
                self.ready = false;
                self.reason = reason;
                self.message = message;
            }
        }
    }
}

/// The change one pass makes to a [`StatusCondition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report<Id> {
    Ready { resource_id: Option<Id> },
    NotReady { reason: Reason, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Normal,
    Warning,
}

/// A human-readable event about an owning object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub severity: Severity,
    pub reason: String,
    pub message: String,
    /// What the controller was doing, [`ACTION_RECONCILE`] unless set otherwise.
    pub action: &'static str,
}

impl EventRecord {
    pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Normal,
            reason: reason.into(),
            message: message.into(),
            action: ACTION_RECONCILE,
        }
    }

    pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            reason: reason.into(),
            message: message.into(),
            action: ACTION_RECONCILE,
        }
    }

    pub fn during(mut self, action: &'static str) -> Self {
        self.action = action;
        self
    }
}

/// Failure to persist a status or an event.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("kubernetes API: {0}")]
    Kube(#[from] kube_client::Error),
    #[error("serializing status: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Destination of status reports and events for one owning object.
pub trait StatusSink<Id>: Send + Sync {
    fn update_status(
        &self,
        report: &Report<Id>,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn record_event(
        &self,
        event: &EventRecord,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Reports the final result of one pass.
///
/// Every method consumes the reporter, so a pass reports exactly once.
#[must_use = "a pass must report its outcome"]
pub struct Reporter<'s, Id, S> {
    sink: &'s S,
    _id: PhantomData<fn(Id)>,
}

impl<'s, Id, S> Reporter<'s, Id, S>
where
    Id: Send + Sync,
    S: StatusSink<Id>,
{
    pub fn new(sink: &'s S) -> Self {
        Self {
            sink,
            _id: PhantomData,
        }
    }

    /// Marks the object subscribed, recording `resource_id` if known.
    pub async fn mark_ready(self, resource_id: Option<Id>, event: Option<EventRecord>) {
        self.publish(Some(Report::Ready { resource_id }), event).await;
    }

    /// Marks the object not subscribed.
    pub async fn mark_failed(self, reason: Reason, message: String, event: Option<EventRecord>) {
        let message = if message.trim().is_empty() {
            "unknown error".to_owned()
        } else {
            message
        };
        self.publish(Some(Report::NotReady { reason, message }), event)
            .await;
    }

    /// Leaves the condition untouched and only records `event`, if any.
    pub async fn finish(self, event: Option<EventRecord>) {
        self.publish(None, event).await;
    }

    async fn publish(self, report: Option<Report<Id>>, event: Option<EventRecord>) {
        let sink = self.sink;
        let status = async {
            if let Some(report) = &report {
                if let Err(err) = sink.update_status(report).await {
                    log::error!("Failed to update status: {err}");
                }
            }
        };
        let event = async {
            if let Some(event) = &event {
                if let Err(err) = sink.record_event(event).await {
                    log::error!("Failed to record event {}: {err}", event.reason);
                }
            }
        };
        futures::future::join(status, event).await;
    }
}

/// A sink keeping the condition and events in memory.
pub struct MemorySink<Id> {
    condition: Mutex<StatusCondition<Id>>,
    events: Mutex<Vec<EventRecord>>,
}

impl<Id: Clone> MemorySink<Id> {
    pub fn new() -> Self {
        Self::with_condition(StatusCondition::unknown())
    }

    pub fn with_condition(condition: StatusCondition<Id>) -> Self {
        Self {
            condition: Mutex::new(condition),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn condition(&self) -> StatusCondition<Id> {
        self.condition.lock().clone()
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }
}

impl<Id: Clone> Default for MemorySink<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: Clone + Send + Sync> StatusSink<Id> for MemorySink<Id> {
    async fn update_status(&self, report: &Report<Id>) -> Result<(), SinkError> {
        self.condition.lock().apply(report.clone());
        Ok(())
    }

    async fn record_event(&self, event: &EventRecord) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
