//! Scoped remote fetches with in-flight de-duplication.
//!
//! A [`FetchTicket`] is issued by the controller when a step needs its choice list. It
//! records the upstream fingerprint active at request time; when the outcome comes back
//! the controller compares that fingerprint with the current one and discards the outcome
//! on mismatch.
//!
//! The [`DependentFetcher`] runs tickets against a [`BookingApi`]. Concurrent calls for the
//! same `(step, query)` pair share one request: the first caller performs it and the others
//! await the same result. Nothing is cached once the request has completed; caching of
//! results is the controller's job.

use crate::api::{ApiError, BookingApi};
use crate::choice::Choice;
use crate::resolver::StepQuery;
use crate::selection::{Fingerprint, SelectionStore};
use crate::step::StepId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// A pending remote fetch for one step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchTicket {
    pub step: StepId,
    pub query: StepQuery,
    /// Fingerprint of the step's upstream selections when the fetch was issued.
    pub fingerprint: Fingerprint,
}

impl FetchTicket {
    /// True if the store's upstream for this step still matches the ticket.
    pub fn is_current(&self, store: &SelectionStore) -> bool {
        store.fingerprint_before(self.step).as_ref() == Some(&self.fingerprint)
    }
}

/// Why a fetch produced no choices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl From<&ApiError> for FetchFailure {
    fn from(err: &ApiError) -> Self {
        Self {
            message: err.to_string(),
            status: err.status(),
        }
    }
}

/// Tagged result of one fetch. An empty `Loaded` list is a valid outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Loaded(Vec<Choice>),
    Failed(FetchFailure),
}

type InFlight = Arc<OnceCell<FetchOutcome>>;

/// Executes fetch tickets, sharing identical in-flight requests.
pub struct DependentFetcher {
    api: Arc<dyn BookingApi>,
    in_flight: Mutex<HashMap<(StepId, StepQuery), InFlight>>,
}

impl DependentFetcher {
    pub fn new(api: Arc<dyn BookingApi>) -> Self {
        Self {
            api,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs the ticket's query, or joins an identical request already in flight.
    pub async fn fetch(&self, ticket: &FetchTicket) -> FetchOutcome {
        let key = (ticket.step, ticket.query.clone());

        let cell = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(cell) => {
                    tracing::debug!(step = %ticket.step, query = %ticket.query, "joining in-flight fetch");
                    Arc::clone(cell)
                }
                None => {
                    let cell = InFlight::default();
                    in_flight.insert(key.clone(), Arc::clone(&cell));
                    cell
                }
            }
        };

        let outcome = cell
            .get_or_init(|| self.load(ticket.step, &ticket.query))
            .await
            .clone();

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(&key);
        }

        outcome
    }

    async fn load(&self, step: StepId, query: &StepQuery) -> FetchOutcome {
        tracing::info!(%step, %query, "fetching choices");
        match self.api.fetch_choices(query).await {
            Ok(choices) => {
                tracing::debug!(%step, count = choices.len(), "choices loaded");
                FetchOutcome::Loaded(choices)
            }
            Err(err) => {
                tracing::warn!(%step, %query, error = %err, "failed to load choices");
                FetchOutcome::Failed(FetchFailure::from(&err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::BookingConfirmation;
    use crate::choice::EntityId;
    use crate::step::Flow;
    use crate::submitter::BookingSubmission;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingApi {
        calls: AtomicUsize,
        fail_with: Option<ApiError>,
    }

    #[async_trait]
    impl BookingApi for CountingApi {
        async fn fetch_choices(&self, query: &StepQuery) -> Result<Vec<Choice>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            match query {
                StepQuery::Clinics { .. } => Ok(Vec::new()),
                _ => Ok(vec![Choice::new("1", "Cardiology")]),
            }
        }

        async fn submit_booking(
            &self,
            _submission: &BookingSubmission,
        ) -> Result<BookingConfirmation, ApiError> {
            unreachable!("fetcher never submits")
        }
    }

    fn ticket(query: StepQuery) -> FetchTicket {
        FetchTicket {
            step: StepId::Specialization,
            query,
            fingerprint: Fingerprint::root(Flow::Clinic),
        }
    }

    #[tokio::test]
    async fn test_identical_concurrent_fetches_share_one_request() {
        let api = Arc::new(CountingApi::default());
        let fetcher = DependentFetcher::new(api.clone());
        let t = ticket(StepQuery::Specializations);

        let (a, b) = tokio::join!(fetcher.fetch(&t), fetcher.fetch(&t));

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert!(matches!(a, FetchOutcome::Loaded(ref c) if c.len() == 1));
    }

    #[tokio::test]
    async fn test_completed_fetch_is_not_cached() {
        let api = Arc::new(CountingApi::default());
        let fetcher = DependentFetcher::new(api.clone());
        let t = ticket(StepQuery::Specializations);

        fetcher.fetch(&t).await;
        fetcher.fetch(&t).await;

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_queries_are_not_shared() {
        let api = Arc::new(CountingApi::default());
        let fetcher = DependentFetcher::new(api.clone());
        let cairo = ticket(StepQuery::Clinics {
            provider_id: EntityId::from("P17"),
            city: "Cairo".into(),
        });
        let giza = ticket(StepQuery::Clinics {
            provider_id: EntityId::from("P17"),
            city: "Giza".into(),
        });

        let (a, b) = tokio::join!(fetcher.fetch(&cairo), fetcher.fetch(&giza));

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(a, FetchOutcome::Loaded(Vec::new()));
        assert_eq!(b, FetchOutcome::Loaded(Vec::new()));
    }

    #[tokio::test]
    async fn test_failure_carries_status() {
        let api = Arc::new(CountingApi {
            calls: AtomicUsize::new(0),
            fail_with: Some(ApiError::Status {
                status: 503,
                body: None,
            }),
        });
        let fetcher = DependentFetcher::new(api);

        let outcome = fetcher.fetch(&ticket(StepQuery::Specializations)).await;
        match outcome {
            FetchOutcome::Failed(failure) => {
                assert_eq!(failure.status, Some(503));
                assert_eq!(failure.message, "remote API returned status 503");
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_ticket_is_current_tracks_upstream() {
        let mut store = SelectionStore::new(Flow::Clinic);
        store
            .confirm(crate::selection::Selection::new(
                StepId::Specialization,
                Choice::new("1", "Cardiology"),
            ))
            .expect("confirm");

        let t = FetchTicket {
            step: StepId::City,
            query: StepQuery::Cities {
                specialization_id: EntityId::from("1"),
            },
            fingerprint: store
                .fingerprint_before(StepId::City)
                .expect("specialization confirmed"),
        };
        assert!(t.is_current(&store));

        store
            .confirm(crate::selection::Selection::new(
                StepId::Specialization,
                Choice::new("2", "Dermatology"),
            ))
            .expect("re-confirm");
        assert!(!t.is_current(&store));
    }
}
