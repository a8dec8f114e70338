//! Portal session token and its per-cycle lifecycle.

use std::fmt;

/// Opaque session cookie issued by the portal (e.g. `PHPSESSID=...`).
///
/// The portal gives no expiry; a token is trusted until a fetch reports it invalid.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Log-safe fingerprint of the token.
    pub fn fingerprint(&self) -> String {
        shared::crypto::fingerprint(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionToken({})", self.fingerprint())
    }
}

/// Session state of one device within one polling cycle.
///
/// `Renewed` is only reachable through `InvalidatedThisCycle`, and `Renewed`
/// cannot be invalidated again, which caps re-authentication at one per cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No cached token.
    Absent,
    /// Token from the store, or from the first login of this cycle.
    Cached(SessionToken),
    /// The portal rejected the token; one re-login is allowed.
    InvalidatedThisCycle,
    /// Token obtained by the single re-login of this cycle.
    Renewed(SessionToken),
}

impl SessionState {
    pub fn from_cached(token: Option<SessionToken>) -> Self {
        match token {
            Some(token) => SessionState::Cached(token),
            None => SessionState::Absent,
        }
    }

    /// Token usable for a fetch, if any.
    pub fn token(&self) -> Option<&SessionToken> {
        match self {
            SessionState::Cached(token) | SessionState::Renewed(token) => Some(token),
            SessionState::Absent | SessionState::InvalidatedThisCycle => None,
        }
    }

    /// State after a successful login.
    pub fn authenticated(self, token: SessionToken) -> Self {
        match self {
            SessionState::InvalidatedThisCycle => SessionState::Renewed(token),
            _ => SessionState::Cached(token),
        }
    }

    /// State after the portal reported the token invalid.
    ///
    /// Returns `None` when the retry for this cycle has already been spent.
    pub fn invalidate(self) -> Option<Self> {
        match self {
            SessionState::Cached(_) => Some(SessionState::InvalidatedThisCycle),
            SessionState::Renewed(_)
            | SessionState::Absent
            | SessionState::InvalidatedThisCycle => None,
        }
    }
}
