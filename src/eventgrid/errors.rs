use std::error::Error;

use crate::classify::{typed, Classifier, Step};

/// Short description of authentication failures, whose original text is
/// unique to each request.
pub const INVALID_CLIENT_SECRET: &str = "Invalid client secret";

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error body returned by Azure Resource Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    pub code: String,
    pub message: String,
}

/// Errors produced by Azure API clients.
#[derive(Debug, thiserror::Error)]
pub enum AzureError {
    /// A failed request, possibly wrapping the error that caused it.
    #[error("{message}")]
    Detailed {
        status: Option<u16>,
        message: String,
        #[source]
        original: Option<BoxError>,
    },
    /// A response carrying an ARM error body.
    #[error("{message}")]
    Request {
        status: Option<u16>,
        message: String,
        #[source]
        original: Option<BoxError>,
        service_error: Option<ServiceError>,
    },
    /// Acquisition of an OAuth token failed, typically because of an invalid
    /// or expired client secret.
    #[error("adal: Refresh request failed. Status Code = '{status}'. Response body: {body}")]
    TokenRefresh { status: u16, body: String },
}

impl AzureError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Detailed {
            status: Some(status),
            message: message.into(),
            original: None,
        }
    }

    pub fn wrapping(
        status: Option<u16>,
        message: impl Into<String>,
        original: impl Into<BoxError>,
    ) -> Self {
        Self::Detailed {
            status,
            message: message.into(),
            original: Some(original.into()),
        }
    }
}

fn source_of(original: &Option<BoxError>) -> Option<&(dyn Error + 'static)> {
    original.as_deref().map(|err| err as &(dyn Error + 'static))
}

/// A classifier understanding [`AzureError`] hierarchies.
pub fn classifier() -> Classifier {
    Classifier::new().with_rule(typed::<AzureError, _>(|err| match err {
        AzureError::Detailed {
            status,
            message,
            original,
        } => Step::message(message).status(*status).then(source_of(original)),
        AzureError::Request {
            status,
            message,
            original: original @ Some(_),
            ..
        } => Step::message(message).status(*status).then(source_of(original)),
        AzureError::Request {
            status,
            service_error: Some(service_error),
            ..
        } => Step::message(&service_error.message).status(*status),
        AzureError::Request { status, message, .. } => Step::message(message).status(*status),
        AzureError::TokenRefresh { .. } => Step::message(INVALID_CLIENT_SECRET),
    }))
}
