//! Draft of the terminal form step.
//!
//! [`BookingDetails`] holds what the patient has typed so far, exactly as typed. It is
//! turned into [`ValidatedDetails`] only when the booking is submitted; until then it may be
//! incomplete or invalid.

use carebook_files::{Attachment, AttachmentMetadata};
use carebook_types::{EmailAddress, NonEmptyText};
use serde::Serialize;

/// Field names used in validation errors and in the submission payload.
pub mod fields {
    pub const CONTACT_NAME: &str = "contact_name";
    pub const PHONE: &str = "phone";
    pub const EMAIL: &str = "email";
    pub const CONDITION: &str = "condition";
    pub const PAYMENT_PROOF: &str = "payment_proof";
    pub const SELECTION: &str = "selection";
}

/// Free-form fields of the booking, as entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookingDetails {
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    pub condition: String,
    pub payment_proof: Option<Attachment>,
}

impl BookingDetails {
    /// Serialisable snapshot for the UI (attachment bytes omitted).
    pub fn view(&self) -> DetailsView {
        DetailsView {
            contact_name: self.contact_name.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            condition: self.condition.clone(),
            payment_proof: self.payment_proof.as_ref().map(|a| a.metadata().clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DetailsView {
    pub contact_name: String,
    pub phone: String,
    pub email: String,
    pub condition: String,
    pub payment_proof: Option<AttachmentMetadata>,
}

/// Details that passed validation; only constructed by
/// [`crate::resolver::StepResolver::validate_details`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedDetails {
    pub contact_name: NonEmptyText,
    /// Normalised to an optional `+` followed by digits.
    pub phone: String,
    pub email: Option<EmailAddress>,
    pub condition: NonEmptyText,
    pub payment_proof: Option<Attachment>,
}
