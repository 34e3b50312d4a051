//! The narrow client interface to one kind of external resource.

use std::{error::Error, future::Future, str::FromStr, time::Duration};

use tokio_util::sync::CancellationToken;

/// The live representation of an external resource, as returned by a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    /// The resource does not exist.
    Absent,
    /// The resource exists in the given state.
    Present(T),
}

impl<T> Observed<T> {
    pub fn as_present(&self) -> Option<&T> {
        match self {
            Self::Absent => None,
            Self::Present(state) => Some(state),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

impl<T> From<Option<T>> for Observed<T> {
    fn from(state: Option<T>) -> Self {
        state.map_or(Self::Absent, Self::Present)
    }
}

/// CRUD access to exactly one kind of external resource.
///
/// Implementations perform a single request per call and never retry.
/// Calls are bounded by the actuator, see [`bounded`].
pub trait Facade: Send + Sync {
    /// The canonical desired representation written by
    /// [`create_or_update`](Self::create_or_update).
    type Desired: Send + Sync;
    /// The representation returned by [`get`](Self::get).
    type Observed: Send;
    /// Token of a pending asynchronous write. Never awaited by the actuator.
    type Handle: Send;
    /// Backend error, classified by a [`Classifier`](crate::classify::Classifier).
    type Error: Error + Send + Sync + 'static;
    /// Structured form of the identifiers returned by [`resource_id`](Self::resource_id).
    type ResourceId: FromStr + Send + Sync;

    /// Reads the current state of the resource `name` within `scope`.
    ///
    /// Backends may report absence either as [`Observed::Absent`] or as an
    /// error carrying a 404-equivalent status.
    fn get(
        &self,
        scope: &str,
        name: &str,
    ) -> impl Future<Output = Result<Observed<Self::Observed>, Self::Error>> + Send;

    /// Creates the resource, or replaces it if it exists.
    fn create_or_update(
        &self,
        scope: &str,
        name: &str,
        desired: &Self::Desired,
    ) -> impl Future<Output = Result<Self::Handle, Self::Error>> + Send;

    fn delete(
        &self,
        scope: &str,
        name: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The server-assigned identifier of an observed resource, if any.
    fn resource_id<'a>(&self, observed: &'a Self::Observed) -> Option<&'a str>;
}

/// Failure of a bounded call.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E: Error + 'static> {
    #[error(transparent)]
    Backend(E),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request cancelled")]
    Cancelled,
}

impl<E: Error + 'static> CallError<E> {
    /// Whether the call never reached a verdict from the backend.
    pub fn is_interrupted(&self) -> bool {
        !matches!(self, Self::Backend(_))
    }
}

/// Runs `call` until it completes, `timeout` elapses or `cancel` fires,
/// whichever happens first.
pub async fn bounded<T, E, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    call: Fut,
) -> Result<T, CallError<E>>
where
    E: Error + 'static,
    Fut: Future<Output = Result<T, E>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(CallError::Cancelled),
        res = tokio::time::timeout(timeout, call) => match res {
            Ok(res) => res.map_err(CallError::Backend),
            Err(_elapsed) => Err(CallError::Timeout(timeout)),
        },
    }
}
