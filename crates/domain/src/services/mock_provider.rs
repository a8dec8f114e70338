//! Scripted stand-in for the GPS portal.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::models::{Position, ProviderCredentials, SessionToken};
use crate::services::ports::{FixResponse, LocationProvider};

/// Mock location provider for testing.
///
/// Responses are consumed in push order. When a queue is empty, `login`
/// returns a fresh token and `current_fix` returns `(0, 0)`.
#[derive(Default)]
pub struct MockLocationProvider {
    logins: Mutex<VecDeque<Result<SessionToken, ProviderError>>>,
    fixes: Mutex<VecDeque<Result<FixResponse, ProviderError>>>,
    fetch_tokens: Mutex<Vec<String>>,
    login_identities: Mutex<Vec<String>>,
    login_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockLocationProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every call, to simulate a slow portal.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub async fn push_login(&self, response: Result<SessionToken, ProviderError>) {
        self.logins.lock().await.push_back(response);
    }

    pub async fn push_fix(&self, response: Result<FixResponse, ProviderError>) {
        self.fixes.lock().await.push_back(response);
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Tokens presented to `current_fix`, in call order.
    pub async fn fetch_tokens(&self) -> Vec<String> {
        self.fetch_tokens.lock().await.clone()
    }

    /// Identities presented to `login`, in call order.
    pub async fn login_identities(&self) -> Vec<String> {
        self.login_identities.lock().await.clone()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait::async_trait]
impl LocationProvider for MockLocationProvider {
    async fn login(&self, credentials: &ProviderCredentials) -> Result<SessionToken, ProviderError> {
        let call = self.login_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.login_identities
            .lock()
            .await
            .push(credentials.identity().to_string());
        self.pause().await;

        match self.logins.lock().await.pop_front() {
            Some(response) => response,
            None => Ok(SessionToken::new(format!("PHPSESSID=mock{}", call))),
        }
    }

    async fn current_fix(&self, token: &SessionToken) -> Result<FixResponse, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetch_tokens
            .lock()
            .await
            .push(token.as_str().to_string());
        self.pause().await;

        match self.fixes.lock().await.pop_front() {
            Some(response) => response,
            None => Ok(FixResponse::Position(Position::new(0.0, 0.0))),
        }
    }
}
