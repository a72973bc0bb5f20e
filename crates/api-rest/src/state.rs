use carebook_core::{BookingApi, BookingConfig, BookingSession, BookingSubmitter, DependentFetcher, Flow};
use carebook_uuid::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Application state for the REST API server
///
/// Holds the services shared by every wizard session (one fetcher so identical in-flight
/// queries from different sessions are de-duplicated, one submitter) and the live sessions.
#[derive(Clone)]
pub struct AppState {
    fetcher: Arc<DependentFetcher>,
    submitter: Arc<BookingSubmitter>,
    max_attachment_bytes: u64,
    sessions: Arc<RwLock<HashMap<SessionId, Arc<BookingSession>>>>,
}

impl AppState {
    pub fn new(api: Arc<dyn BookingApi>, config: &BookingConfig) -> Self {
        Self {
            fetcher: Arc::new(DependentFetcher::new(Arc::clone(&api))),
            submitter: Arc::new(BookingSubmitter::new(api, config.patient_id().clone())),
            max_attachment_bytes: config.max_attachment_bytes(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn max_attachment_bytes(&self) -> u64 {
        self.max_attachment_bytes
    }

    /// Creates and registers a session; its first step is not loaded yet.
    pub async fn create_session(&self, flow: Flow) -> Arc<BookingSession> {
        let session = Arc::new(BookingSession::new(
            flow,
            self.max_attachment_bytes,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.submitter),
        ));
        self.sessions
            .write()
            .await
            .insert(session.id(), Arc::clone(&session));
        tracing::info!(session = %session.id(), %flow, "session created");
        session
    }

    pub async fn session(&self, id: &SessionId) -> Option<Arc<BookingSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Removes a session; returns whether it existed.
    pub async fn remove_session(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            tracing::info!(session = %id, "session removed");
        }
        removed
    }

    /// Drops every session that has been idle for at least `max_idle`; returns how many.
    ///
    /// A submission still running for an evicted session completes on its own task.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for() < max_idle);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle sessions");
        }
        evicted
    }

    /// Runs [`AppState::evict_idle`] every `every` until the runtime shuts down.
    pub fn spawn_eviction(&self, max_idle: Duration, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                state.evict_idle(max_idle).await;
            }
        })
    }
}
