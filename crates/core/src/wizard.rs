//! The booking wizard state machine.
//!
//! [`WizardController`] owns the selection chain, the per-step choice caches, the details
//! draft and the submission state. Every change goes through [`WizardController::dispatch`],
//! which either refuses the action with a [`WizardError`] (leaving state untouched) or
//! applies it and returns the [`WizardEffect`]s the caller must run. The controller never
//! performs I/O; results of effects come back as [`WizardAction::FetchCompleted`] and
//! [`WizardAction::SubmitCompleted`].
//!
//! ```text
//!  Step(first) ──Advance──▶ Step(next) ──…──▶ Step(details) ──Submit──▶ Submitting
//!       ▲                                          ▲    ▲                   │
//!       └──────────────── Reset ───────────────────┼────┼── Rejected/Failed ┤
//!                                                  │    └── Conflict ──▶ Step(slot)
//!                                                  └──────── Complete ◀─────┘ (Confirmed)
//! ```
//!
//! Choice lists are cached per step together with the upstream fingerprint they were
//! fetched for. Confirming a step drops the cache of every later step whose upstream
//! fingerprint changed; a fetch result is applied only if its fingerprint still matches.

use crate::choice::{Choice, ChoiceSet, EntityId};
use crate::constants::SLOT_UNAVAILABLE_MESSAGE;
use crate::api::BookingConfirmation;
use crate::details::{BookingDetails, DetailsView};
use crate::error::{WizardError, WizardResult};
use crate::fetcher::{FetchFailure, FetchOutcome, FetchTicket};
use crate::resolver::{FieldErrors, StepResolver};
use crate::selection::{Fingerprint, Selection, SelectionStore};
use crate::step::{Flow, StepId};
use crate::submitter::{total_price, BookingDraft, SubmissionTicket, SubmitOutcome};
use carebook_uuid::SubmissionKey;
use serde::Serialize;
use std::collections::BTreeMap;

/// Where the wizard is.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WizardState {
    Step { step: StepId },
    Submitting { key: SubmissionKey },
    Complete { confirmation: BookingConfirmation },
}

/// Inputs to [`WizardController::dispatch`].
#[derive(Clone, Debug)]
pub enum WizardAction {
    Enter(StepId),
    SelectChoice { step: StepId, choice: EntityId },
    Advance,
    Retreat,
    Reset,
    EditDetails(BookingDetails),
    Refresh,
    Submit,
    FetchCompleted {
        ticket: FetchTicket,
        outcome: FetchOutcome,
    },
    SubmitCompleted {
        key: SubmissionKey,
        outcome: SubmitOutcome,
    },
}

/// Work the caller must perform and report back.
#[derive(Clone, Debug, PartialEq)]
pub enum WizardEffect {
    Fetch(FetchTicket),
    Submit(SubmissionTicket),
}

/// One-off message for the user, cleared by their next successful action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum WizardNotice {
    SlotUnavailable(String),
    SubmissionRejected(String),
    SubmissionFailed(String),
}

/// What the active step shows instead of, or alongside, its choices.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChoiceStatus {
    /// The step is a form, not a choice list.
    NotRequired,
    NotLoaded,
    Loading {
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<Vec<Choice>>,
    },
    Ready {
        choices: Vec<Choice>,
    },
    Empty {
        message: String,
    },
    Failed {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<Vec<Choice>>,
    },
}

/// Snapshot of everything the UI renders.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WizardView {
    pub flow: Flow,
    #[serde(flatten)]
    pub state: WizardState,
    pub steps: Vec<StepId>,
    pub choices: ChoiceStatus,
    pub chain: Vec<Selection>,
    pub draft: Option<Selection>,
    pub details: DetailsView,
    pub field_errors: FieldErrors,
    pub notice: Option<WizardNotice>,
    pub total_price: Option<f64>,
    pub can_advance: bool,
    pub can_retreat: bool,
    pub can_submit: bool,
}

/// Choice bookkeeping for one step, valid for one upstream fingerprint.
#[derive(Clone, Debug)]
struct StepChoices {
    fingerprint: Fingerprint,
    cached: Option<ChoiceSet>,
    pending: Option<FetchTicket>,
    failure: Option<FetchFailure>,
}

impl StepChoices {
    fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            cached: None,
            pending: None,
            failure: None,
        }
    }
}

/// Synchronous, single-owner booking wizard.
#[derive(Debug)]
pub struct WizardController {
    resolver: StepResolver,
    state: WizardState,
    store: SelectionStore,
    choices: BTreeMap<StepId, StepChoices>,
    details: BookingDetails,
    field_errors: FieldErrors,
    notice: Option<WizardNotice>,
    last_key: Option<SubmissionKey>,
}

impl WizardController {
    /// Creates a controller positioned at the first step. Nothing is fetched until
    /// [`WizardController::start`] (or any other action) is dispatched.
    pub fn new(flow: Flow, max_attachment_bytes: u64) -> Self {
        Self {
            resolver: StepResolver::new(flow, max_attachment_bytes),
            state: WizardState::Step { step: flow.first() },
            store: SelectionStore::new(flow),
            choices: BTreeMap::new(),
            details: BookingDetails::default(),
            field_errors: FieldErrors::new(),
            notice: None,
            last_key: None,
        }
    }

    /// Enters the first step, returning its fetch.
    pub fn start(&mut self) -> WizardResult<Vec<WizardEffect>> {
        self.dispatch(WizardAction::Enter(self.flow().first()))
    }

    pub fn dispatch(&mut self, action: WizardAction) -> WizardResult<Vec<WizardEffect>> {
        let action = match action {
            WizardAction::FetchCompleted { ticket, outcome } => {
                return Ok(self.apply_fetch(ticket, outcome))
            }
            WizardAction::SubmitCompleted { key, outcome } => {
                return Ok(self.apply_submit(key, outcome))
            }
            other => other,
        };

        let step = match self.state {
            WizardState::Step { step } => step,
            WizardState::Submitting { .. } => {
                return match action {
                    WizardAction::Submit => {
                        tracing::warn!("ignoring submit while a submission is in flight");
                        Ok(Vec::new())
                    }
                    _ => Err(WizardError::SubmissionInFlight),
                }
            }
            WizardState::Complete { .. } => {
                return match action {
                    WizardAction::Reset => Ok(self.reset()),
                    _ => Err(WizardError::BookingComplete),
                }
            }
        };

        let effects = self.dispatch_step(step, action)?;
        self.notice = None;
        Ok(effects)
    }

    fn dispatch_step(
        &mut self,
        step: StepId,
        action: WizardAction,
    ) -> WizardResult<Vec<WizardEffect>> {
        match action {
            WizardAction::Enter(target) => self.enter(target),
            WizardAction::SelectChoice { step: requested, choice } => {
                self.select(step, requested, &choice)?;
                Ok(Vec::new())
            }
            WizardAction::Advance => self.advance(step),
            WizardAction::Retreat => {
                let previous = self
                    .flow()
                    .previous(step)
                    .ok_or(WizardError::AtFirstStep)?;
                self.enter(previous)
            }
            WizardAction::Reset => Ok(self.reset()),
            WizardAction::EditDetails(details) => {
                self.require_terminal(step)?;
                self.details = details;
                self.field_errors.clear();
                Ok(Vec::new())
            }
            WizardAction::Refresh => {
                if !step.is_choice_step() {
                    return Err(WizardError::NotAChoiceStep(step));
                }
                Ok(self.ensure_choices(step, true)?.into_iter().collect())
            }
            WizardAction::Submit => self.submit(step),
            WizardAction::FetchCompleted { .. } | WizardAction::SubmitCompleted { .. } => {
                Ok(Vec::new())
            }
        }
    }

    fn enter(&mut self, target: StepId) -> WizardResult<Vec<WizardEffect>> {
        self.resolver.can_enter(target, &self.store)?;

        if let Some(leaving) = self.active_step() {
            if leaving != target && !self.store.is_confirmed(leaving) {
                if self.choices.remove(&leaving).is_some() {
                    tracing::debug!(step = %leaving, "discarding choices of unconfirmed step");
                }
            }
        }

        match self.store.get(target).cloned() {
            Some(confirmed) => self.store.set_draft(confirmed),
            None => self.store.clear_draft(),
        }

        tracing::info!(flow = %self.flow(), step = %target, "entering step");
        self.state = WizardState::Step { step: target };

        Ok(self.ensure_choices(target, false)?.into_iter().collect())
    }

    fn select(&mut self, active: StepId, requested: StepId, choice: &EntityId) -> WizardResult<()> {
        if requested != active {
            return Err(WizardError::NotActiveStep { requested, active });
        }
        if !active.is_choice_step() {
            return Err(WizardError::NotAChoiceStep(active));
        }
        if self.is_loading(active) {
            return Err(WizardError::StepLoading(active));
        }

        let picked = self
            .choice_set(active)
            .and_then(|set| set.find(choice))
            .cloned()
            .ok_or_else(|| WizardError::UnknownChoice {
                step: active,
                choice: choice.clone(),
            })?;

        self.store.set_draft(Selection::new(active, picked));
        Ok(())
    }

    fn advance(&mut self, step: StepId) -> WizardResult<Vec<WizardEffect>> {
        let next = self
            .flow()
            .next(step)
            .ok_or(WizardError::AtTerminalStep(step))?;
        if self.is_loading(step) {
            return Err(WizardError::StepLoading(step));
        }

        let draft = self
            .store
            .draft()
            .filter(|d| d.step() == step)
            .cloned()
            .ok_or(WizardError::NoDraft(step))?;

        let errors = self
            .resolver
            .validate_choice_draft(step, Some(&draft), self.choice_set(step));
        if !errors.is_empty() {
            return Err(WizardError::InvalidDraft(errors));
        }

        let discarded = self.store.confirm(draft)?;
        if !discarded.is_empty() {
            tracing::info!(%step, ?discarded, "upstream changed; discarding later selections");
        }
        self.invalidate_downstream(step);

        self.enter(next)
    }

    fn submit(&mut self, step: StepId) -> WizardResult<Vec<WizardEffect>> {
        let terminal = self.flow().terminal();
        if step != terminal {
            return Err(WizardError::NotAtTerminalStep(terminal));
        }

        let validated = match self.resolver.validate_details(&self.details) {
            Ok(validated) => validated,
            Err(errors) => {
                tracing::debug!(fields = errors.len(), "details failed validation");
                self.field_errors = errors.clone();
                return Err(WizardError::InvalidDraft(errors));
            }
        };

        let draft = BookingDraft::assemble(&self.store, validated)?;
        let key = SubmissionKey::generate(self.last_key.as_ref());
        self.last_key = Some(key.clone());
        self.field_errors.clear();

        tracing::info!(%key, flow = %self.flow(), "booking submission started");
        self.state = WizardState::Submitting { key: key.clone() };

        Ok(vec![WizardEffect::Submit(SubmissionTicket { key, draft })])
    }

    fn reset(&mut self) -> Vec<WizardEffect> {
        tracing::info!(flow = %self.flow(), "resetting wizard");
        let first = self.flow().first();

        self.store.clear();
        self.choices.clear();
        self.details = BookingDetails::default();
        self.field_errors.clear();
        self.notice = None;
        self.state = WizardState::Step { step: first };

        match self.ensure_choices(first, false) {
            Ok(effect) => effect.into_iter().collect(),
            Err(err) => {
                tracing::warn!(error = %err, "first step could not be loaded");
                Vec::new()
            }
        }
    }

    /// Returns a fetch for `step` unless a matching list is cached (ignored when `force`)
    /// or a matching fetch is already pending.
    fn ensure_choices(&mut self, step: StepId, force: bool) -> WizardResult<Option<WizardEffect>> {
        let Some(query) = self.resolver.query_for(step, &self.store)? else {
            return Ok(None);
        };
        let Some(fingerprint) = self.store.fingerprint_before(step) else {
            return Ok(None);
        };

        let entry = self
            .choices
            .entry(step)
            .or_insert_with(|| StepChoices::new(fingerprint.clone()));
        if entry.fingerprint != fingerprint {
            *entry = StepChoices::new(fingerprint.clone());
        }

        if entry.pending.is_some() {
            tracing::debug!(%step, "fetch already pending");
            return Ok(None);
        }
        if !force && entry.cached.is_some() {
            tracing::debug!(%step, %fingerprint, "using cached choices");
            return Ok(None);
        }

        let ticket = FetchTicket {
            step,
            query,
            fingerprint,
        };
        entry.pending = Some(ticket.clone());
        entry.failure = None;

        Ok(Some(WizardEffect::Fetch(ticket)))
    }

    /// Drops choice bookkeeping of every later step whose upstream no longer matches.
    fn invalidate_downstream(&mut self, step: StepId) {
        let downstream = self.flow().downstream(step);
        let store = &self.store;
        self.choices.retain(|later, entry| {
            let keep = !downstream.contains(later)
                || store.fingerprint_before(*later).as_ref() == Some(&entry.fingerprint);
            if !keep {
                tracing::debug!(step = %later, "invalidating choices");
            }
            keep
        });
    }

    fn apply_fetch(&mut self, ticket: FetchTicket, outcome: FetchOutcome) -> Vec<WizardEffect> {
        if !ticket.is_current(&self.store) {
            tracing::debug!(step = %ticket.step, fingerprint = %ticket.fingerprint, "discarding stale fetch result");
            return Vec::new();
        }

        let Some(entry) = self
            .choices
            .get_mut(&ticket.step)
            .filter(|e| e.fingerprint == ticket.fingerprint)
        else {
            tracing::debug!(step = %ticket.step, "discarding fetch result for abandoned step");
            return Vec::new();
        };

        if entry.pending.as_ref() == Some(&ticket) {
            entry.pending = None;
        }

        match outcome {
            FetchOutcome::Loaded(choices) => {
                tracing::debug!(step = %ticket.step, count = choices.len(), "choices applied");
                entry.cached = Some(ChoiceSet::new(ticket.step, ticket.fingerprint, choices));
                entry.failure = None;
            }
            FetchOutcome::Failed(failure) => {
                tracing::warn!(step = %ticket.step, error = %failure.message, "keeping previous choices after failed fetch");
                entry.failure = Some(failure);
            }
        }

        let vanished = match (self.store.draft(), entry.cached.as_ref()) {
            (Some(draft), Some(set)) => draft.step() == ticket.step && !set.contains(draft.id()),
            _ => false,
        };
        if vanished {
            self.store.clear_draft();
        }

        Vec::new()
    }

    fn apply_submit(&mut self, key: SubmissionKey, outcome: SubmitOutcome) -> Vec<WizardEffect> {
        let in_flight = matches!(&self.state, WizardState::Submitting { key: current } if *current == key);
        if !in_flight {
            tracing::warn!(%key, "ignoring result of a submission that is not in flight");
            return Vec::new();
        }

        let terminal = self.flow().terminal();
        match outcome {
            SubmitOutcome::Confirmed(confirmation) => {
                tracing::info!(%key, booking = %confirmation.id, "booking complete");
                self.details = BookingDetails::default();
                self.field_errors.clear();
                self.state = WizardState::Complete { confirmation };
                Vec::new()
            }
            SubmitOutcome::Rejected {
                message,
                field_errors,
            } => {
                tracing::info!(%key, fields = field_errors.len(), "booking rejected");
                self.state = WizardState::Step { step: terminal };
                self.field_errors = field_errors;
                self.notice = Some(WizardNotice::SubmissionRejected(
                    message.unwrap_or_else(|| "The booking was rejected.".into()),
                ));
                Vec::new()
            }
            SubmitOutcome::Conflict { message } => {
                tracing::info!(%key, remote = ?message, "slot taken; returning to slot selection");
                self.store.truncate_from(StepId::Slot);
                self.choices.remove(&StepId::Slot);
                let effects = match self.enter(StepId::Slot) {
                    Ok(effects) => effects,
                    Err(err) => {
                        tracing::warn!(error = %err, "could not re-enter slot step");
                        self.state = WizardState::Step { step: terminal };
                        Vec::new()
                    }
                };
                self.notice = Some(WizardNotice::SlotUnavailable(
                    SLOT_UNAVAILABLE_MESSAGE.to_owned(),
                ));
                effects
            }
            SubmitOutcome::Failed { message } => {
                self.state = WizardState::Step { step: terminal };
                self.notice = Some(WizardNotice::SubmissionFailed(message));
                Vec::new()
            }
        }
    }

    fn require_terminal(&self, step: StepId) -> WizardResult<()> {
        let terminal = self.flow().terminal();
        if step == terminal {
            Ok(())
        } else {
            Err(WizardError::NotActiveStep {
                requested: terminal,
                active: step,
            })
        }
    }

    pub fn flow(&self) -> Flow {
        self.resolver.flow()
    }

    pub fn state(&self) -> &WizardState {
        &self.state
    }

    /// The step being shown, if the wizard is not submitting or complete.
    pub fn active_step(&self) -> Option<StepId> {
        match self.state {
            WizardState::Step { step } => Some(step),
            _ => None,
        }
    }

    pub fn store(&self) -> &SelectionStore {
        &self.store
    }

    pub fn details(&self) -> &BookingDetails {
        &self.details
    }

    pub fn field_errors(&self) -> &FieldErrors {
        &self.field_errors
    }

    pub fn notice(&self) -> Option<&WizardNotice> {
        self.notice.as_ref()
    }

    /// Cached choices for `step`, only if fetched for the current upstream.
    pub fn choice_set(&self, step: StepId) -> Option<&ChoiceSet> {
        let current = self.store.fingerprint_before(step)?;
        self.choices
            .get(&step)
            .filter(|e| e.fingerprint == current)
            .and_then(|e| e.cached.as_ref())
    }

    pub fn is_loading(&self, step: StepId) -> bool {
        let current = self.store.fingerprint_before(step);
        self.choices
            .get(&step)
            .is_some_and(|e| e.pending.is_some() && current.as_ref() == Some(&e.fingerprint))
    }

    fn choice_status(&self, step: StepId) -> ChoiceStatus {
        if !step.is_choice_step() {
            return ChoiceStatus::NotRequired;
        }
        let Some(entry) = self
            .store
            .fingerprint_before(step)
            .and_then(|current| self.choices.get(&step).filter(|e| e.fingerprint == current))
        else {
            return ChoiceStatus::NotLoaded;
        };

        let previous = entry.cached.as_ref().map(|set| set.choices.clone());
        match (&entry.pending, &entry.failure, &entry.cached) {
            (Some(_), _, _) => ChoiceStatus::Loading { previous },
            (None, Some(failure), _) => ChoiceStatus::Failed {
                message: format!("failed to load {}: {}", step.choices_noun(), failure.message),
                previous,
            },
            (None, None, Some(set)) if set.is_empty() => ChoiceStatus::Empty {
                message: format!("no {} available", step.choices_noun()),
            },
            (None, None, Some(set)) => ChoiceStatus::Ready {
                choices: set.choices.clone(),
            },
            (None, None, None) => ChoiceStatus::NotLoaded,
        }
    }

    fn can_advance(&self, step: StepId) -> bool {
        self.flow().next(step).is_some()
            && !self.is_loading(step)
            && self
                .store
                .draft()
                .filter(|d| d.step() == step)
                .is_some_and(|d| {
                    self.choice_set(step)
                        .is_some_and(|set| set.contains(d.id()))
                })
    }

    pub fn view(&self) -> WizardView {
        let active = self.active_step();
        let reached_terminal = self.store.is_confirmed(StepId::Slot);

        WizardView {
            flow: self.flow(),
            state: self.state.clone(),
            steps: self.flow().steps().to_vec(),
            choices: active
                .map(|step| self.choice_status(step))
                .unwrap_or(ChoiceStatus::NotRequired),
            chain: self.store.chain().to_vec(),
            draft: self.store.draft().cloned(),
            details: self.details.view(),
            field_errors: self.field_errors.clone(),
            notice: self.notice.clone(),
            total_price: reached_terminal.then(|| total_price(self.store.chain())),
            can_advance: active.is_some_and(|step| self.can_advance(step)),
            can_retreat: active.is_some_and(|step| self.flow().previous(step).is_some()),
            can_submit: active == Some(self.flow().terminal()),
        }
    }
}
