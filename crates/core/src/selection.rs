//! Confirmed selections and the store that orders them.
//!
//! The [`SelectionStore`] holds the chain of confirmed [`Selection`]s for one flow, strictly
//! ordered by step position, plus the draft for the step currently being edited.
//!
//! ## Invariants
//!
//! - `chain[i]` is the selection for `flow.steps()[i]`; there are no gaps.
//! - Confirming the step at position `p` drops every selection at a position greater than
//!   `p` (the user is treated as having changed their mind about everything after it).
//! - A [`Fingerprint`] over the selections at positions `<= p` changes whenever any of
//!   those selections changes, and is what fetched choice lists are tagged with.

use crate::choice::{Choice, EntityId};
use crate::error::{WizardError, WizardResult};
use crate::step::{Flow, StepId};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

/// One resolved entity for one step. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Selection {
    step: StepId,
    choice: Choice,
}

impl Selection {
    pub fn new(step: StepId, choice: Choice) -> Self {
        Self { step, choice }
    }

    pub fn step(&self) -> StepId {
        self.step
    }

    pub fn choice(&self) -> &Choice {
        &self.choice
    }

    pub fn id(&self) -> &EntityId {
        &self.choice.id
    }

    pub fn label(&self) -> &str {
        &self.choice.label
    }
}

/// Stable key over a prefix of the selection chain (hex SHA-256).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an empty prefix, i.e. the upstream of a flow's first step.
    pub fn root(flow: Flow) -> Self {
        Self::of(flow, &[])
    }

    fn of(flow: Flow, selections: &[Selection]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(flow.as_str().as_bytes());
        for selection in selections {
            // Length-prefix the id so that `1|23` and `12|3` hash differently.
            let id = selection.id().as_str();
            hasher.update(b";");
            hasher.update(selection.step().as_str().as_bytes());
            hasher.update(b"=");
            hasher.update(id.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(id.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs.
        f.write_str(&self.0[..12])
    }
}

/// Ordered chain of confirmed selections plus the in-progress draft.
#[derive(Clone, Debug)]
pub struct SelectionStore {
    flow: Flow,
    chain: Vec<Selection>,
    draft: Option<Selection>,
}

impl SelectionStore {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            chain: Vec::new(),
            draft: None,
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Records `selection` at its step and discards every selection after it.
    ///
    /// Returns the steps whose selections were discarded (not including the confirmed step
    /// itself, which is replaced).
    ///
    /// # Errors
    ///
    /// - [`WizardError::StepNotInFlow`] if the step does not belong to this flow
    /// - [`WizardError::MissingSelection`] if an earlier step is not yet confirmed
    pub fn confirm(&mut self, selection: Selection) -> WizardResult<Vec<StepId>> {
        let step = selection.step();
        let position = self
            .flow
            .position(step)
            .ok_or(WizardError::StepNotInFlow(step, self.flow))?;

        if self.chain.len() < position {
            return Err(WizardError::MissingSelection {
                step,
                missing: self.flow.steps()[self.chain.len()],
            });
        }

        let discarded: Vec<StepId> = self
            .chain
            .drain(position..)
            .map(|s| s.step())
            .filter(|s| *s != step)
            .collect();

        self.chain.push(selection);
        if self.draft.as_ref().is_some_and(|d| d.step() != step) {
            self.draft = None;
        }

        Ok(discarded)
    }

    /// Confirmed selection for `step`, if any.
    pub fn get(&self, step: StepId) -> Option<&Selection> {
        let position = self.flow.position(step)?;
        self.chain.get(position)
    }

    pub fn is_confirmed(&self, step: StepId) -> bool {
        self.get(step).is_some()
    }

    pub fn chain(&self) -> &[Selection] {
        &self.chain
    }

    /// Fingerprint over all selections at positions `<= upto`.
    ///
    /// Returns `None` when `upto` is not part of the flow or is not confirmed.
    pub fn fingerprint(&self, upto: StepId) -> Option<Fingerprint> {
        let position = self.flow.position(upto)?;
        if self.chain.len() <= position {
            return None;
        }
        Some(Fingerprint::of(self.flow, &self.chain[..=position]))
    }

    /// Fingerprint of everything upstream of `step` (positions `< step`).
    ///
    /// Returns `None` if any of those positions is unconfirmed.
    pub fn fingerprint_before(&self, step: StepId) -> Option<Fingerprint> {
        match self.flow.previous(step) {
            Some(previous) => self.fingerprint(previous),
            None if self.flow.contains(step) => Some(Fingerprint::root(self.flow)),
            None => None,
        }
    }

    /// Drops the selection at `step` and everything after it.
    ///
    /// Returns the discarded steps.
    pub fn truncate_from(&mut self, step: StepId) -> Vec<StepId> {
        let Some(position) = self.flow.position(step) else {
            return Vec::new();
        };
        if self.chain.len() <= position {
            return Vec::new();
        }
        self.chain.drain(position..).map(|s| s.step()).collect()
    }

    pub fn draft(&self) -> Option<&Selection> {
        self.draft.as_ref()
    }

    pub fn set_draft(&mut self, selection: Selection) {
        self.draft = Some(selection);
    }

    pub fn clear_draft(&mut self) {
        self.draft = None;
    }

    pub fn clear(&mut self) {
        self.chain.clear();
        self.draft = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(step: StepId, id: &str) -> Selection {
        Selection::new(step, Choice::new(id, format!("{step} {id}")))
    }

    fn clinic_store_through_slot() -> SelectionStore {
        let mut store = SelectionStore::new(Flow::Clinic);
        for (step, id) in [
            (StepId::Specialization, "cardio"),
            (StepId::City, "cairo"),
            (StepId::Provider, "P17"),
            (StepId::Location, "C1"),
            (StepId::Slot, "S1"),
        ] {
            store.confirm(sel(step, id)).expect("left-to-right confirm");
        }
        store
    }

    #[test]
    fn test_confirm_left_to_right() {
        let store = clinic_store_through_slot();
        assert_eq!(store.chain().len(), 5);
        assert_eq!(
            store.get(StepId::Provider).map(|s| s.id().as_str()),
            Some("P17")
        );
        assert!(store.get(StepId::Details).is_none());
    }

    #[test]
    fn test_confirm_rejects_gaps() {
        let mut store = SelectionStore::new(Flow::Clinic);
        store
            .confirm(sel(StepId::Specialization, "cardio"))
            .expect("first step");

        let err = store
            .confirm(sel(StepId::Provider, "P17"))
            .expect_err("skipping city should fail");
        assert!(matches!(
            err,
            WizardError::MissingSelection {
                step: StepId::Provider,
                missing: StepId::City
            }
        ));
        assert_eq!(store.chain().len(), 1);
    }

    #[test]
    fn test_confirm_rejects_step_outside_flow() {
        let mut store = SelectionStore::new(Flow::AtHome);
        let err = store
            .confirm(sel(StepId::Location, "C1"))
            .expect_err("location is not an at-home step");
        assert!(matches!(
            err,
            WizardError::StepNotInFlow(StepId::Location, Flow::AtHome)
        ));
    }

    #[test]
    fn test_reconfirming_city_discards_downstream() {
        let mut store = clinic_store_through_slot();

        let discarded = store
            .confirm(sel(StepId::City, "giza"))
            .expect("re-confirm city");

        assert_eq!(
            discarded,
            vec![StepId::Provider, StepId::Location, StepId::Slot]
        );
        assert_eq!(store.chain().len(), 2);
        assert_eq!(store.get(StepId::City).map(|s| s.id().as_str()), Some("giza"));
        assert!(store.get(StepId::Provider).is_none());
        assert!(store.get(StepId::Location).is_none());
        assert!(store.get(StepId::Slot).is_none());
    }

    #[test]
    fn test_fingerprint_changes_with_upstream() {
        let mut store = clinic_store_through_slot();
        let before = store
            .fingerprint_before(StepId::Slot)
            .expect("slot upstream is confirmed");

        store.confirm(sel(StepId::City, "giza")).expect("re-confirm");
        assert_eq!(store.fingerprint_before(StepId::Slot), None);

        for (step, id) in [
            (StepId::Provider, "P17"),
            (StepId::Location, "C1"),
        ] {
            store.confirm(sel(step, id)).expect("confirm");
        }
        let after = store
            .fingerprint_before(StepId::Slot)
            .expect("slot upstream is confirmed again");

        assert_ne!(before, after, "city change must change the slot fingerprint");
    }

    #[test]
    fn test_fingerprint_is_stable_for_identical_chains() {
        let a = clinic_store_through_slot();
        let b = clinic_store_through_slot();
        assert_eq!(a.fingerprint(StepId::Slot), b.fingerprint(StepId::Slot));
        assert_eq!(
            a.fingerprint(StepId::Slot).map(|f| f.as_str().len()),
            Some(64)
        );
    }

    #[test]
    fn test_fingerprint_separates_ids() {
        let mut a = SelectionStore::new(Flow::Clinic);
        a.confirm(sel(StepId::Specialization, "1")).unwrap();
        a.confirm(sel(StepId::City, "23")).unwrap();

        let mut b = SelectionStore::new(Flow::Clinic);
        b.confirm(sel(StepId::Specialization, "12")).unwrap();
        b.confirm(sel(StepId::City, "3")).unwrap();

        assert_ne!(a.fingerprint(StepId::City), b.fingerprint(StepId::City));
    }

    #[test]
    fn test_fingerprint_before_first_step_is_root() {
        let store = SelectionStore::new(Flow::Clinic);
        assert_eq!(
            store.fingerprint_before(StepId::Specialization),
            Some(Fingerprint::root(Flow::Clinic))
        );
        assert_ne!(Fingerprint::root(Flow::Clinic), Fingerprint::root(Flow::AtHome));
        assert_eq!(store.fingerprint_before(StepId::City), None);
    }

    #[test]
    fn test_truncate_from_slot() {
        let mut store = clinic_store_through_slot();
        let dropped = store.truncate_from(StepId::Slot);
        assert_eq!(dropped, vec![StepId::Slot]);
        assert!(store.get(StepId::Location).is_some());
        assert!(store.get(StepId::Slot).is_none());
        assert!(store.truncate_from(StepId::Slot).is_empty());
    }

    #[test]
    fn test_confirm_clears_draft_of_other_step() {
        let mut store = SelectionStore::new(Flow::Clinic);
        store.set_draft(sel(StepId::City, "cairo"));
        store
            .confirm(sel(StepId::Specialization, "cardio"))
            .expect("confirm");
        assert!(store.draft().is_none());
    }
}
