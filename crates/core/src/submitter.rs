//! Final booking transaction.
//!
//! [`BookingDraft::assemble`] snapshots the confirmed chain and the validated details once
//! the wizard reaches the details step. The controller wraps the draft in a
//! [`SubmissionTicket`] keyed by a fresh [`SubmissionKey`]; [`BookingSubmitter`] turns the
//! ticket into exactly one multipart POST and classifies the response as a
//! [`SubmitOutcome`].

use crate::api::{ApiError, ApiErrorBody, BookingApi, BookingConfirmation};
use crate::details::{fields, ValidatedDetails};
use crate::error::{WizardError, WizardResult};
use crate::resolver::FieldErrors;
use crate::selection::{Selection, SelectionStore};
use crate::step::{Flow, StepId};
use carebook_files::Attachment;
use carebook_types::NonEmptyText;
use carebook_uuid::SubmissionKey;
use std::sync::Arc;

/// Everything needed to book, captured at submit time.
#[derive(Clone, Debug, PartialEq)]
pub struct BookingDraft {
    flow: Flow,
    chain: Vec<Selection>,
    details: ValidatedDetails,
    total_price: f64,
}

impl BookingDraft {
    /// Builds the draft from a fully confirmed chain.
    ///
    /// # Errors
    ///
    /// Returns [`WizardError::MissingSelection`] if any choice step of the flow is unconfirmed.
    pub fn assemble(store: &SelectionStore, details: ValidatedDetails) -> WizardResult<Self> {
        let flow = store.flow();
        let terminal = flow.terminal();

        if let Some(missing) = flow
            .steps()
            .iter()
            .copied()
            .filter(|s| s.is_choice_step())
            .find(|s| !store.is_confirmed(*s))
        {
            return Err(WizardError::MissingSelection {
                step: terminal,
                missing,
            });
        }

        let chain = store
            .chain()
            .iter()
            .filter(|s| s.step().is_choice_step())
            .cloned()
            .collect::<Vec<_>>();
        let total_price = total_price(&chain);

        Ok(Self {
            flow,
            chain,
            details,
            total_price,
        })
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn selection(&self, step: StepId) -> Option<&Selection> {
        self.chain.iter().find(|s| s.step() == step)
    }

    pub fn details(&self) -> &ValidatedDetails {
        &self.details
    }

    pub fn total_price(&self) -> f64 {
        self.total_price
    }
}

/// Slot price, else location price, else zero.
pub(crate) fn total_price(chain: &[Selection]) -> f64 {
    let price_of = |step: StepId| {
        chain
            .iter()
            .find(|s| s.step() == step)
            .and_then(|s| s.choice().price)
    };
    price_of(StepId::Slot)
        .or_else(|| price_of(StepId::Location))
        .unwrap_or(0.0)
}

/// A draft paired with the key it is submitted under.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmissionTicket {
    pub key: SubmissionKey,
    pub draft: BookingDraft,
}

/// Wire form of one booking: multipart text fields, the optional file part, and the
/// idempotency key header value.
#[derive(Clone, Debug)]
pub struct BookingSubmission {
    pub idempotency_key: String,
    pub fields: Vec<(&'static str, String)>,
    pub attachment: Option<Attachment>,
}

impl BookingSubmission {
    pub fn new(patient_id: &NonEmptyText, ticket: &SubmissionTicket) -> Self {
        let draft = &ticket.draft;
        let details = draft.details();

        let mut form: Vec<(&'static str, String)> = vec![
            ("patient_id", patient_id.as_str().to_owned()),
            ("flow", draft.flow().as_str().to_owned()),
        ];

        for (field, step) in [
            ("specialization_id", StepId::Specialization),
            ("city_id", StepId::City),
            ("provider_id", StepId::Provider),
            ("location_id", StepId::Location),
            ("slot_id", StepId::Slot),
        ] {
            if let Some(selection) = draft.selection(step) {
                form.push((field, selection.id().to_string()));
            }
        }

        form.push((fields::CONTACT_NAME, details.contact_name.as_str().to_owned()));
        form.push((fields::PHONE, details.phone.clone()));
        if let Some(email) = &details.email {
            form.push((fields::EMAIL, email.as_str().to_owned()));
        }
        form.push((fields::CONDITION, details.condition.as_str().to_owned()));
        form.push(("total_price", format!("{:.2}", draft.total_price())));

        Self {
            idempotency_key: ticket.key.to_string(),
            fields: form,
            attachment: details.payment_proof.clone(),
        }
    }

    /// Value of a text field, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Classified response to a booking POST.
#[derive(Clone, Debug, PartialEq)]
pub enum SubmitOutcome {
    Confirmed(BookingConfirmation),
    /// 400/422: the API refused the details.
    Rejected {
        message: Option<String>,
        field_errors: FieldErrors,
    },
    /// 409: the slot was taken in the meantime.
    Conflict { message: Option<String> },
    Failed { message: String },
}

/// Sends booking tickets to the remote API for one patient.
pub struct BookingSubmitter {
    api: Arc<dyn BookingApi>,
    patient_id: NonEmptyText,
}

impl BookingSubmitter {
    pub fn new(api: Arc<dyn BookingApi>, patient_id: NonEmptyText) -> Self {
        Self { api, patient_id }
    }

    /// Performs exactly one POST for the ticket. Never retries.
    pub async fn submit(&self, ticket: &SubmissionTicket) -> SubmitOutcome {
        let submission = BookingSubmission::new(&self.patient_id, ticket);
        tracing::info!(
            key = %ticket.key,
            flow = %ticket.draft.flow(),
            total_price = ticket.draft.total_price(),
            "submitting booking"
        );

        match self.api.submit_booking(&submission).await {
            Ok(confirmation) => {
                tracing::info!(key = %ticket.key, booking = %confirmation.id, "booking confirmed");
                SubmitOutcome::Confirmed(confirmation)
            }
            Err(err) => {
                tracing::warn!(key = %ticket.key, error = %err, "booking submission failed");
                classify(err)
            }
        }
    }
}

fn classify(err: ApiError) -> SubmitOutcome {
    match err {
        ApiError::Status { status: 409, body } => SubmitOutcome::Conflict {
            message: body.and_then(|b| b.message),
        },
        ApiError::Status {
            status: 400 | 422,
            body,
        } => {
            let body = body.unwrap_or_default();
            SubmitOutcome::Rejected {
                field_errors: form_field_errors(&body),
                message: body.message,
            }
        }
        other => SubmitOutcome::Failed {
            message: other.to_string(),
        },
    }
}

/// Maps the API's field names back onto the details form.
fn form_field_errors(body: &ApiErrorBody) -> FieldErrors {
    let mut errors = FieldErrors::new();
    for (field, messages) in &body.errors {
        let form_field = match field.as_str() {
            "name" | "patient_name" | "contact_name" => fields::CONTACT_NAME,
            "phone" | "phone_number" | "mobile" => fields::PHONE,
            "email" => fields::EMAIL,
            "condition" | "notes" | "description" => fields::CONDITION,
            "payment_proof" | "receipt" | "file" => fields::PAYMENT_PROOF,
            other => {
                errors.insert(other.to_owned(), messages.joined());
                continue;
            }
        };
        errors
            .entry(form_field.to_owned())
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&messages.joined());
            })
            .or_insert_with(|| messages.joined());
    }
    errors
}
