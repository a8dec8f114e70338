//! Per-device location ingestion.
//!
//! One run fetches a single current fix for one device, re-authenticating at
//! most once when the portal reports the cached session as invalid, then
//! stores the fix and prunes the device's history.

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TrackingError;
use crate::models::{
    LocationFix, NewLocationFix, Position, SessionState, TrackedDevice, FIX_RETENTION,
};
use crate::services::ports::{
    DeviceRegistry, FixResponse, LocationProvider, LocationStore, SessionStore,
};

/// Where a device's ingestion run was when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    NoSession,
    Authenticating,
    HasSession,
    Fetching,
    Stored,
    Retrying,
    Failed,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::NoSession => "no_session",
            IngestStage::Authenticating => "authenticating",
            IngestStage::HasSession => "has_session",
            IngestStage::Fetching => "fetching",
            IngestStage::Stored => "stored",
            IngestStage::Retrying => "retrying",
            IngestStage::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful ingestion run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub device_id: Uuid,
    pub fix: LocationFix,
    pub logins: u32,
    pub fetches: u32,
    /// Rows removed by pruning, or `None` when pruning failed.
    pub pruned: Option<u64>,
}

/// Failed ingestion run, tagged with the stage that failed.
#[derive(Debug)]
pub struct IngestFailure {
    pub device_id: Uuid,
    pub stage: IngestStage,
    pub source: TrackingError,
}

impl fmt::Display for IngestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ingestion for device {} failed while {}: {}",
            self.device_id, self.stage, self.source
        )
    }
}

impl std::error::Error for IngestFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Orchestrates login, fetch, store and prune for one device at a time.
#[derive(Clone)]
pub struct LocationIngestor {
    provider: Arc<dyn LocationProvider>,
    sessions: Arc<dyn SessionStore>,
    fixes: Arc<dyn LocationStore>,
    registry: Arc<dyn DeviceRegistry>,
}

impl LocationIngestor {
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        sessions: Arc<dyn SessionStore>,
        fixes: Arc<dyn LocationStore>,
        registry: Arc<dyn DeviceRegistry>,
    ) -> Self {
        Self {
            provider,
            sessions,
            fixes,
            registry,
        }
    }

    /// Runs one ingestion cycle for `device`.
    pub async fn ingest(&self, device: &TrackedDevice) -> Result<IngestReport, IngestFailure> {
        let result = self.run(device).await;
        let outcome = match &result {
            Ok(_) => "stored",
            Err(failure) => failure.source.kind(),
        };
        counter!("location_ingestions_total", "outcome" => outcome).increment(1);
        result
    }

    async fn run(&self, device: &TrackedDevice) -> Result<IngestReport, IngestFailure> {
        let fail = |stage: IngestStage, source: TrackingError| IngestFailure {
            device_id: device.id,
            stage,
            source,
        };

        let credentials = device
            .require_credentials()
            .map_err(|e| fail(IngestStage::NoSession, e))?;

        let cached = self
            .sessions
            .load_session(device.id)
            .await
            .map_err(|e| fail(IngestStage::NoSession, e))?;
        let mut state = SessionState::from_cached(cached);
        let mut logins = 0u32;
        let mut fetches = 0u32;

        loop {
            let cached_token = state.token().cloned();
            let token = match cached_token {
                Some(token) => token,
                None => {
                    logins += 1;
                    let token = self
                        .provider
                        .login(credentials)
                        .await
                        .map_err(|e| {
                            counter!("provider_logins_total", "result" => "failure").increment(1);
                            fail(IngestStage::Authenticating, e.into())
                        })?;
                    counter!("provider_logins_total", "result" => "success").increment(1);
                    self.sessions
                        .save_session(device.id, &token)
                        .await
                        .map_err(|e| fail(IngestStage::HasSession, e))?;
                    debug!(
                        device_id = %device.id,
                        session = %token.fingerprint(),
                        "Authenticated with GPS portal"
                    );
                    state = state.authenticated(token.clone());
                    token
                }
            };

            fetches += 1;
            let response = self
                .provider
                .current_fix(&token)
                .await
                .map_err(|e| fail(IngestStage::Fetching, e.into()))?;

            match response {
                FixResponse::Position(position) => {
                    let (fix, pruned) = self
                        .store(device.id, position)
                        .await
                        .map_err(|e| fail(IngestStage::Stored, e))?;
                    return Ok(IngestReport {
                        device_id: device.id,
                        fix,
                        logins,
                        fetches,
                        pruned,
                    });
                }
                FixResponse::SessionInvalid => match state.invalidate() {
                    Some(next) => {
                        state = next;
                        info!(
                            device_id = %device.id,
                            session = %token.fingerprint(),
                            stage = %IngestStage::Retrying,
                            "GPS portal rejected session, re-authenticating"
                        );
                        if let Err(e) = self.sessions.clear_session(device.id).await {
                            warn!(device_id = %device.id, error = %e, "Failed to clear session token");
                        }
                    }
                    None => {
                        return Err(fail(IngestStage::Failed, TrackingError::SessionInvalid));
                    }
                },
            }
        }
    }

    /// Stores a fix pushed in by the device itself, identified by its number.
    pub async fn record_reported_fix(
        &self,
        number: &str,
        position: Position,
    ) -> Result<IngestReport, TrackingError> {
        shared::validation::validate_latitude(position.latitude)
            .map_err(|e| TrackingError::Validation(shared::validation::message_of(&e)))?;
        shared::validation::validate_longitude(position.longitude)
            .map_err(|e| TrackingError::Validation(shared::validation::message_of(&e)))?;

        let device = self
            .registry
            .find_by_number(number)
            .await?
            .ok_or_else(|| TrackingError::Validation(format!("no device with number {}", number)))?;

        let (fix, pruned) = self.store(device.id, position).await?;
        counter!("location_ingestions_total", "outcome" => "reported").increment(1);

        Ok(IngestReport {
            device_id: device.id,
            fix,
            logins: 0,
            fetches: 0,
            pruned,
        })
    }

    /// Appends the fix, then prunes. A prune failure keeps the stored fix.
    async fn store(
        &self,
        device_id: Uuid,
        position: Position,
    ) -> Result<(LocationFix, Option<u64>), TrackingError> {
        let fix = self
            .fixes
            .append_fix(NewLocationFix::now(device_id, position))
            .await?;

        let pruned = match self.fixes.prune_fixes(device_id, FIX_RETENTION).await {
            Ok(deleted) => Some(deleted),
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to prune location history");
                None
            }
        };

        Ok((fix, pruned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::models::{ProviderCredentials, SessionToken};
    use crate::services::memory::MemoryTrackerStore;
    use crate::services::mock_provider::MockLocationProvider;

    fn setup(
        provider: MockLocationProvider,
    ) -> (LocationIngestor, Arc<MemoryTrackerStore>, Arc<MockLocationProvider>) {
        let store = Arc::new(MemoryTrackerStore::new());
        let provider = Arc::new(provider);
        let ingestor = LocationIngestor::new(
            provider.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        (ingestor, store, provider)
    }

    async fn add_device(store: &MemoryTrackerStore) -> TrackedDevice {
        store
            .add_device(
                Some("+421900000001"),
                Some(ProviderCredentials::new("356000000000001", "secret")),
                true,
            )
            .await
    }

    #[tokio::test]
    async fn test_first_cycle_logs_in_and_stores() {
        let provider = MockLocationProvider::new();
        provider.push_login(Ok(SessionToken::new("PHPSESSID=a"))).await;
        provider.push_fix(Ok(FixResponse::Position(Position::new(1.0, 2.0)))).await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;

        let report = ingestor.ingest(&device).await.unwrap();

        assert_eq!(report.logins, 1);
        assert_eq!(report.fetches, 1);
        assert_eq!(report.fix.position(), Position::new(1.0, 2.0));
        assert_eq!(
            store.load_session(device.id).await.unwrap(),
            Some(SessionToken::new("PHPSESSID=a"))
        );
        assert_eq!(provider.login_calls(), 1);
    }

    #[tokio::test]
    async fn test_cached_session_skips_login() {
        let provider = MockLocationProvider::new();
        provider.push_fix(Ok(FixResponse::Position(Position::new(3.0, 4.0)))).await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;
        store
            .save_session(device.id, &SessionToken::new("PHPSESSID=cached"))
            .await
            .unwrap();

        let report = ingestor.ingest(&device).await.unwrap();

        assert_eq!(report.logins, 0);
        assert_eq!(provider.login_calls(), 0);
        assert_eq!(provider.fetch_tokens().await, vec!["PHPSESSID=cached".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_session_retries_once_with_new_token() {
        let provider = MockLocationProvider::new();
        provider.push_fix(Ok(FixResponse::SessionInvalid)).await;
        provider.push_login(Ok(SessionToken::new("PHPSESSID=fresh"))).await;
        provider.push_fix(Ok(FixResponse::Position(Position::new(1.1, 2.1)))).await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;
        store
            .save_session(device.id, &SessionToken::new("PHPSESSID=stale"))
            .await
            .unwrap();

        let report = ingestor.ingest(&device).await.unwrap();

        assert_eq!(report.logins, 1);
        assert_eq!(report.fetches, 2);
        assert_eq!(
            provider.fetch_tokens().await,
            vec!["PHPSESSID=stale".to_string(), "PHPSESSID=fresh".to_string()]
        );
        assert_eq!(
            store.load_session(device.id).await.unwrap(),
            Some(SessionToken::new("PHPSESSID=fresh"))
        );
    }

    #[tokio::test]
    async fn test_second_invalidation_fails_without_looping() {
        let provider = MockLocationProvider::new();
        provider.push_login(Ok(SessionToken::new("PHPSESSID=one"))).await;
        provider.push_fix(Ok(FixResponse::SessionInvalid)).await;
        provider.push_login(Ok(SessionToken::new("PHPSESSID=two"))).await;
        provider.push_fix(Ok(FixResponse::SessionInvalid)).await;
        provider.push_fix(Ok(FixResponse::Position(Position::new(9.0, 9.0)))).await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;

        let failure = ingestor.ingest(&device).await.unwrap_err();

        assert!(matches!(failure.source, TrackingError::SessionInvalid));
        assert_eq!(failure.stage, IngestStage::Failed);
        assert_eq!(provider.login_calls(), 2);
        assert_eq!(provider.fetch_calls(), 2);
        assert!(store.fixes_for(device.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_is_not_retried() {
        let provider = MockLocationProvider::new();
        provider
            .push_login(Err(ProviderError::UnexpectedStatus {
                step: "login",
                status: 500,
            }))
            .await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;

        let failure = ingestor.ingest(&device).await.unwrap_err();

        assert_eq!(failure.stage, IngestStage::Authenticating);
        assert!(matches!(failure.source, TrackingError::Provider(_)));
        assert_eq!(provider.login_calls(), 1);
        assert_eq!(provider.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_malformed_response_fails_fetch() {
        let provider = MockLocationProvider::new();
        provider.push_login(Ok(SessionToken::new("PHPSESSID=a"))).await;
        provider
            .push_fix(Err(ProviderError::MalformedResponse("missing aaData".into())))
            .await;
        let (ingestor, store, provider) = setup(provider);
        let device = add_device(&store).await;

        let failure = ingestor.ingest(&device).await.unwrap_err();

        assert_eq!(failure.stage, IngestStage::Fetching);
        assert_eq!(provider.fetch_calls(), 1);
        assert!(failure.to_string().contains(&device.id.to_string()));
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_provider_call() {
        let (ingestor, store, provider) = setup(MockLocationProvider::new());
        let device = store.add_device(Some("+1"), None, true).await;

        let failure = ingestor.ingest(&device).await.unwrap_err();

        assert!(matches!(failure.source, TrackingError::Validation(_)));
        assert_eq!(provider.login_calls(), 0);
        assert_eq!(provider.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_history_is_bounded_to_most_recent_five() {
        let provider = MockLocationProvider::new();
        for i in 0..8 {
            provider
                .push_fix(Ok(FixResponse::Position(Position::new(i as f64, i as f64))))
                .await;
        }
        let (ingestor, store, _) = setup(provider);
        let device = add_device(&store).await;

        for n in 1..=8usize {
            ingestor.ingest(&device).await.unwrap();
            assert_eq!(store.fixes_for(device.id).await.len(), n.min(5));
        }

        let kept: Vec<f64> = store
            .fixes_for(device.id)
            .await
            .iter()
            .map(|f| f.latitude)
            .collect();
        assert_eq!(kept, vec![7.0, 6.0, 5.0, 4.0, 3.0]);
    }

    #[tokio::test]
    async fn test_prune_failure_keeps_stored_fix() {
        let provider = MockLocationProvider::new();
        provider.push_fix(Ok(FixResponse::Position(Position::new(1.0, 1.0)))).await;
        let (ingestor, store, _) = setup(provider);
        let device = add_device(&store).await;
        store.fail_pruning(true);

        let report = ingestor.ingest(&device).await.unwrap();

        assert!(report.pruned.is_none());
        assert_eq!(store.fixes_for(device.id).await.len(), 1);
    }

    #[tokio::test]
    async fn test_two_cycle_scenario_keeps_both_fixes() {
        let provider = MockLocationProvider::new();
        provider.push_login(Ok(SessionToken::new("PHPSESSID=first"))).await;
        provider.push_fix(Ok(FixResponse::Position(Position::new(1.0, 2.0)))).await;
        provider.push_fix(Ok(FixResponse::SessionInvalid)).await;
        provider.push_login(Ok(SessionToken::new("PHPSESSID=second"))).await;
        provider.push_fix(Ok(FixResponse::Position(Position::new(1.1, 2.1)))).await;
        let (ingestor, store, _) = setup(provider);
        let device = add_device(&store).await;

        let first = ingestor.ingest(&device).await.unwrap();
        assert_eq!(first.logins, 1);

        let second = ingestor.ingest(&device).await.unwrap();
        assert_eq!(second.logins, 1);
        assert_eq!(second.fetches, 2);

        let positions: Vec<Position> = store
            .fixes_for(device.id)
            .await
            .iter()
            .map(|f| f.position())
            .collect();
        assert_eq!(positions, vec![Position::new(1.1, 2.1), Position::new(1.0, 2.0)]);
    }

    #[tokio::test]
    async fn test_record_reported_fix() {
        let (ingestor, store, _) = setup(MockLocationProvider::new());
        let device = add_device(&store).await;

        let report = ingestor
            .record_reported_fix("+421900000001", Position::new(48.1, 17.1))
            .await
            .unwrap();
        assert_eq!(report.device_id, device.id);
        assert_eq!(store.fixes_for(device.id).await.len(), 1);

        let err = ingestor
            .record_reported_fix("+000", Position::new(48.1, 17.1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));

        let err = ingestor
            .record_reported_fix("+421900000001", Position::new(100.0, 17.1))
            .await
            .unwrap_err();
        assert!(err.is_user_facing());
    }
}
