//! Tracked GPS device model.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::session::SessionToken;

/// Login pair for the GPS portal (the device IMEI and its portal password).
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    identity: String,
    secret: String,
}

impl ProviderCredentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// Builds credentials only when both halves are present.
    pub fn from_parts(identity: Option<String>, secret: Option<String>) -> Option<Self> {
        match (identity, secret) {
            (Some(identity), Some(secret)) => Some(Self::new(identity, secret)),
            _ => None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A GPS device as seen by the poller.
#[derive(Debug, Clone)]
pub struct TrackedDevice {
    pub id: Uuid,
    /// Carrier-facing phone number of the tracker SIM.
    pub number: Option<String>,
    pub credentials: Option<ProviderCredentials>,
    pub trackable: bool,
    pub session_token: Option<SessionToken>,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TrackedDevice {
    /// Whether the poll scheduler may pick this device up.
    pub fn is_pollable(&self) -> bool {
        self.trackable && self.credentials.is_some() && self.deleted_at.is_none()
    }

    /// Credentials, or a user-facing validation error when they are missing.
    pub fn require_credentials(&self) -> Result<&ProviderCredentials, TrackingError> {
        self.credentials.as_ref().ok_or_else(|| {
            TrackingError::Validation(format!("device {} has no provider credentials", self.id))
        })
    }
}
