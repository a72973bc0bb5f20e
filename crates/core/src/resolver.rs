//! Step guards, remote query resolution and draft validation.
//!
//! The [`StepResolver`] answers three questions for the controller:
//!
//! 1. May this step be entered? Only if every upstream step has a confirmed selection. A
//!    step with an unresolved upstream is refused *before* any query is built, so a scoped
//!    request is never sent with a missing parent id.
//! 2. Which remote query populates this step? See [`StepQuery`].
//! 3. Is the draft for this step acceptable? Returns a field → message map.

use crate::choice::{ChoiceSet, EntityId};
use crate::constants::MAX_CONDITION_CHARS;
use crate::details::{fields, BookingDetails, ValidatedDetails};
use crate::error::{WizardError, WizardResult};
use crate::selection::{Selection, SelectionStore};
use crate::step::{Flow, StepId};
use crate::validation::normalise_phone;
use carebook_types::{EmailAddress, EmailError, NonEmptyText};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Field name → error message. Empty when the draft is valid.
pub type FieldErrors = BTreeMap<String, String>;

/// Remote query that populates one step's choice list.
///
/// Each variant carries exactly the upstream values the endpoint needs; city-scoped
/// endpoints take the city *name*, as the remote API does.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepQuery {
    Specializations,
    Cities {
        specialization_id: EntityId,
    },
    Providers {
        specialization_id: EntityId,
        city: String,
    },
    Clinics {
        provider_id: EntityId,
        city: String,
    },
    ClinicSlots {
        location_id: EntityId,
    },
    HomeSlots {
        provider_id: EntityId,
        city: String,
    },
}

impl StepQuery {
    /// The step whose choices this query returns.
    pub fn step(&self) -> StepId {
        match self {
            StepQuery::Specializations => StepId::Specialization,
            StepQuery::Cities { .. } => StepId::City,
            StepQuery::Providers { .. } => StepId::Provider,
            StepQuery::Clinics { .. } => StepId::Location,
            StepQuery::ClinicSlots { .. } | StepQuery::HomeSlots { .. } => StepId::Slot,
        }
    }

    /// Unencoded path segments relative to the API base URL.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            StepQuery::Specializations => vec!["specializations"],
            StepQuery::Cities { specialization_id } => {
                vec!["specializations", specialization_id.as_str(), "cities"]
            }
            StepQuery::Providers { .. } => vec!["doctors"],
            StepQuery::Clinics { provider_id, .. } => {
                vec!["doctors", provider_id.as_str(), "clinics"]
            }
            StepQuery::ClinicSlots { location_id } => {
                vec!["clinics", location_id.as_str(), "slots"]
            }
            StepQuery::HomeSlots { provider_id, .. } => {
                vec!["doctors", provider_id.as_str(), "home-slots"]
            }
        }
    }

    /// Absolute request URL under `base`, with the query string attached.
    pub fn url(&self, base: &Url) -> Url {
        let mut url = endpoint_url(base, &self.segments());
        let params = self.params();
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(&params);
        }
        url
    }

    /// Query-string parameters.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            StepQuery::Providers {
                specialization_id,
                city,
            } => vec![
                ("specialization_id", specialization_id.to_string()),
                ("city", city.clone()),
            ],
            StepQuery::Clinics { city, .. } | StepQuery::HomeSlots { city, .. } => {
                vec![("city", city.clone())]
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for StepQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = Url::parse("http://localhost/").map_err(|_| fmt::Error)?;
        let url = self.url(&root);
        f.write_str(url.path())?;
        if let Some(query) = url.query() {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Appends `segments` to `base`, percent-encoding each one so an id can never add a path
/// level, a query or a fragment.
pub fn endpoint_url(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Guards and validators for one flow.
#[derive(Clone, Copy, Debug)]
pub struct StepResolver {
    flow: Flow,
    max_attachment_bytes: u64,
}

impl StepResolver {
    pub fn new(flow: Flow, max_attachment_bytes: u64) -> Self {
        Self {
            flow,
            max_attachment_bytes,
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    /// Checks that every upstream step of `step` has a confirmed selection.
    ///
    /// # Errors
    ///
    /// - [`WizardError::StepNotInFlow`] if `step` does not belong to the flow
    /// - [`WizardError::MissingSelection`] naming the first unconfirmed upstream step
    pub fn can_enter(&self, step: StepId, store: &SelectionStore) -> WizardResult<()> {
        let upstream = self
            .flow
            .upstream(step)
            .ok_or(WizardError::StepNotInFlow(step, self.flow))?;

        match upstream.iter().find(|dep| !store.is_confirmed(**dep)) {
            Some(missing) => Err(WizardError::MissingSelection {
                step,
                missing: *missing,
            }),
            None => Ok(()),
        }
    }

    /// Maps the confirmed upstream selections to the remote query for `step`.
    ///
    /// Returns `Ok(None)` for steps without remote data.
    ///
    /// # Errors
    ///
    /// Same as [`StepResolver::can_enter`].
    pub fn query_for(&self, step: StepId, store: &SelectionStore) -> WizardResult<Option<StepQuery>> {
        self.can_enter(step, store)?;

        let confirmed = |dep: StepId| -> WizardResult<&Selection> {
            store
                .get(dep)
                .ok_or(WizardError::MissingSelection { step, missing: dep })
        };

        let query = match (self.flow, step) {
            (_, StepId::Specialization) => StepQuery::Specializations,
            (_, StepId::City) => StepQuery::Cities {
                specialization_id: confirmed(StepId::Specialization)?.id().clone(),
            },
            (_, StepId::Provider) => StepQuery::Providers {
                specialization_id: confirmed(StepId::Specialization)?.id().clone(),
                city: confirmed(StepId::City)?.label().to_owned(),
            },
            (_, StepId::Location) => StepQuery::Clinics {
                provider_id: confirmed(StepId::Provider)?.id().clone(),
                city: confirmed(StepId::City)?.label().to_owned(),
            },
            (Flow::Clinic, StepId::Slot) => StepQuery::ClinicSlots {
                location_id: confirmed(StepId::Location)?.id().clone(),
            },
            (Flow::AtHome, StepId::Slot) => StepQuery::HomeSlots {
                provider_id: confirmed(StepId::Provider)?.id().clone(),
                city: confirmed(StepId::City)?.label().to_owned(),
            },
            (_, StepId::Details) => return Ok(None),
        };

        Ok(Some(query))
    }

    /// Validates the draft selection of a choice step against the step's current choices.
    pub fn validate_choice_draft(
        &self,
        step: StepId,
        draft: Option<&Selection>,
        choices: Option<&ChoiceSet>,
    ) -> FieldErrors {
        let mut errors = FieldErrors::new();

        match (draft, choices) {
            (None, _) => {
                errors.insert(fields::SELECTION.into(), format!("select a {}", step));
            }
            (Some(draft), _) if draft.step() != step => {
                errors.insert(
                    fields::SELECTION.into(),
                    format!("draft belongs to {}, not {}", draft.step(), step),
                );
            }
            (Some(draft), Some(set)) if set.contains(draft.id()) => {}
            (Some(draft), _) => {
                errors.insert(
                    fields::SELECTION.into(),
                    format!("{} is no longer available", draft.label()),
                );
            }
        }

        errors
    }

    /// Validates the terminal form.
    ///
    /// # Errors
    ///
    /// Returns the field → message map when any field is invalid.
    pub fn validate_details(
        &self,
        details: &BookingDetails,
    ) -> Result<ValidatedDetails, FieldErrors> {
        let mut errors = FieldErrors::new();

        let contact_name = NonEmptyText::new(&details.contact_name)
            .map_err(|_| {
                errors.insert(fields::CONTACT_NAME.into(), "is required".into());
            })
            .ok();

        let phone = if details.phone.trim().is_empty() {
            errors.insert(fields::PHONE.into(), "is required".into());
            None
        } else {
            let normalised = normalise_phone(&details.phone);
            if normalised.is_none() {
                errors.insert(
                    fields::PHONE.into(),
                    "must be 7 to 15 digits, optionally starting with +".into(),
                );
            }
            normalised
        };

        let email = match EmailAddress::parse(&details.email) {
            Ok(email) => Some(email),
            Err(EmailError::Empty) => None,
            Err(EmailError::Invalid(_)) => {
                errors.insert(fields::EMAIL.into(), "is not a valid email address".into());
                None
            }
        };

        let condition = match NonEmptyText::new(&details.condition) {
            Ok(text) if text.char_count() > MAX_CONDITION_CHARS => {
                errors.insert(
                    fields::CONDITION.into(),
                    format!("must be at most {} characters", MAX_CONDITION_CHARS),
                );
                None
            }
            Ok(text) => Some(text),
            Err(_) => {
                errors.insert(fields::CONDITION.into(), "is required".into());
                None
            }
        };

        match &details.payment_proof {
            None if self.requires_payment_proof() => {
                errors.insert(
                    fields::PAYMENT_PROOF.into(),
                    "is required for home visits".into(),
                );
            }
            Some(proof) if proof.size_bytes() > self.max_attachment_bytes => {
                errors.insert(
                    fields::PAYMENT_PROOF.into(),
                    format!("must be at most {} bytes", self.max_attachment_bytes),
                );
            }
            _ => {}
        }

        match (contact_name, phone, condition) {
            (Some(contact_name), Some(phone), Some(condition)) if errors.is_empty() => {
                Ok(ValidatedDetails {
                    contact_name,
                    phone,
                    email,
                    condition,
                    payment_proof: details.payment_proof.clone(),
                })
            }
            _ => Err(errors),
        }
    }

    /// Home visits are prepaid; clinic visits are paid at the clinic.
    pub fn requires_payment_proof(&self) -> bool {
        self.flow == Flow::AtHome
    }
}
