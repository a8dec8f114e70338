//! Error taxonomy shared by ingestion and geofence matching.

use thiserror::Error;

use crate::geometry::GeometryError;

/// Failures talking to the GPS portal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("portal answered {step} with HTTP {status}")]
    UnexpectedStatus { step: &'static str, status: u16 },

    #[error("portal did not issue a session cookie")]
    MissingSessionCookie,

    #[error("malformed portal response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced by the tracking and geofencing services.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Bad input rejected before any external call or write.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The portal reported the session as invalid.
    #[error("Provider session is no longer valid")]
    SessionInvalid,

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl TrackingError {
    /// Whether the error is meant to be shown to the user who caused it.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, TrackingError::Validation(_) | TrackingError::NotFound(_))
    }

    /// Short label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            TrackingError::Validation(_) => "validation",
            TrackingError::SessionInvalid => "session_invalid",
            TrackingError::Provider(_) => "provider",
            TrackingError::NotFound(_) => "not_found",
            TrackingError::Persistence(_) => "persistence",
        }
    }
}

impl From<sqlx::Error> for TrackingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => TrackingError::NotFound("Resource not found".into()),
            other => TrackingError::Persistence(other.to_string()),
        }
    }
}

impl From<GeometryError> for TrackingError {
    fn from(err: GeometryError) -> Self {
        TrackingError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for TrackingError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter()
                    .map(move |e| format!("{}: {}", field, shared::validation::message_of(e)))
            })
            .collect();

        TrackingError::Validation(messages.join("; "))
    }
}
