//! Request and response bodies of the REST surface.

use base64::{engine::general_purpose, Engine as _};
use carebook_core::{BookingDetails, WizardView};
use carebook_files::Attachment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionReq {
    /// `clinic` or `at_home`
    pub flow: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionRes {
    pub session_id: String,
    #[schema(value_type = Object)]
    pub view: WizardView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SelectReq {
    pub choice_id: String,
}

/// Payment proof uploaded inline as base64.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AttachmentReq {
    pub filename: String,
    pub content_base64: String,
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct DetailsReq {
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub payment_proof: Option<AttachmentReq>,
}

impl DetailsReq {
    /// Decodes the request into the wizard's details draft.
    ///
    /// Only the attachment is checked here; the remaining fields are validated on submit.
    pub fn into_details(self, max_attachment_bytes: u64) -> Result<BookingDetails, String> {
        let payment_proof = self
            .payment_proof
            .map(|proof| {
                let bytes = general_purpose::STANDARD
                    .decode(proof.content_base64.trim())
                    .map_err(|e| format!("payment_proof is not valid base64: {e}"))?;
                Attachment::from_bytes(&proof.filename, bytes, max_attachment_bytes)
                    .map_err(|e| format!("payment_proof: {e}"))
            })
            .transpose()?;

        Ok(BookingDetails {
            contact_name: self.contact_name,
            phone: self.phone,
            email: self.email.unwrap_or_default(),
            condition: self.condition,
            payment_proof,
        })
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, String>,
}
