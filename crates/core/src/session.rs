//! Async driver for one wizard.
//!
//! A [`BookingSession`] owns a [`WizardController`] behind a mutex and runs the effects the
//! controller emits. The lock is only taken inside synchronous helpers, so it is never held
//! across a fetch or a submission; the result of each effect is fed back into the
//! controller as a completion action, which may in turn emit further effects.
//!
//! Effects run on a spawned task. A caller that stops waiting (a dropped HTTP request, a
//! timeout) does not cancel them, so every fetch and submission still reports back and the
//! wizard never stays loading or submitting.

use crate::error::WizardResult;
use crate::fetcher::DependentFetcher;
use crate::step::{Flow, StepId};
use crate::submitter::BookingSubmitter;
use crate::wizard::{WizardAction, WizardController, WizardEffect, WizardView};
use carebook_uuid::SessionId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub struct BookingSession {
    id: SessionId,
    core: Arc<SessionCore>,
    touched: Mutex<Instant>,
}

/// State shared with the effect task.
struct SessionCore {
    id: SessionId,
    controller: Mutex<WizardController>,
    fetcher: Arc<DependentFetcher>,
    submitter: Arc<BookingSubmitter>,
}

impl BookingSession {
    pub fn new(
        flow: Flow,
        max_attachment_bytes: u64,
        fetcher: Arc<DependentFetcher>,
        submitter: Arc<BookingSubmitter>,
    ) -> Self {
        let id = SessionId::new();
        Self {
            id,
            core: Arc::new(SessionCore {
                id,
                controller: Mutex::new(WizardController::new(flow, max_attachment_bytes)),
                fetcher,
                submitter,
            }),
            touched: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn flow(&self) -> Flow {
        self.core.controller().flow()
    }

    pub fn active_step(&self) -> Option<StepId> {
        self.core.controller().active_step()
    }

    /// Time since the session was last started, dispatched to or viewed.
    pub fn idle_for(&self) -> Duration {
        self.touched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Enters the first step and loads its choices.
    pub async fn start(&self) -> WizardResult<WizardView> {
        self.touch();
        let effects = self.core.controller().start()?;
        self.drive(effects).await;
        Ok(self.view())
    }

    /// Applies a user action, runs every resulting effect to completion and returns the
    /// resulting view.
    ///
    /// # Errors
    ///
    /// Returns the controller's [`crate::WizardError`] if the action is refused; nothing is
    /// fetched or submitted in that case.
    pub async fn dispatch(&self, action: WizardAction) -> WizardResult<WizardView> {
        self.touch();
        let effects = self.core.apply(action)?;
        self.drive(effects).await;
        Ok(self.view())
    }

    pub fn view(&self) -> WizardView {
        self.touch();
        self.core.controller().view()
    }

    fn touch(&self) {
        *self.touched.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    async fn drive(&self, effects: Vec<WizardEffect>) {
        if effects.is_empty() {
            return;
        }

        let core = Arc::clone(&self.core);
        let task = tokio::spawn(async move { core.run(effects).await });
        if let Err(err) = task.await {
            tracing::error!(session = %self.id, error = %err, "effect task failed");
        }
    }
}

impl SessionCore {
    fn controller(&self) -> MutexGuard<'_, WizardController> {
        self.controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, action: WizardAction) -> WizardResult<Vec<WizardEffect>> {
        self.controller().dispatch(action)
    }

    async fn run(&self, effects: Vec<WizardEffect>) {
        let mut queue = VecDeque::from(effects);

        while let Some(effect) = queue.pop_front() {
            let completion = match effect {
                WizardEffect::Fetch(ticket) => {
                    let outcome = self.fetcher.fetch(&ticket).await;
                    WizardAction::FetchCompleted { ticket, outcome }
                }
                WizardEffect::Submit(ticket) => {
                    let outcome = self.submitter.submit(&ticket).await;
                    WizardAction::SubmitCompleted {
                        key: ticket.key,
                        outcome,
                    }
                }
            };

            match self.apply(completion) {
                Ok(more) => queue.extend(more),
                Err(err) => {
                    tracing::warn!(session = %self.id, error = %err, "effect result refused")
                }
            }
        }
    }
}
