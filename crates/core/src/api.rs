//! Boundary to the remote booking API.
//!
//! The wizard never talks HTTP itself; it goes through [`BookingApi`], which the
//! `carebook-http` crate implements with reqwest and the tests implement in memory.

use crate::choice::{Choice, EntityId};
use crate::resolver::StepQuery;
use crate::submitter::BookingSubmission;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Remote data and submission endpoints used by the wizard.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// Loads the choice list for one step.
    async fn fetch_choices(&self, query: &StepQuery) -> Result<Vec<Choice>, ApiError>;

    /// Posts a booking. The submission carries an idempotency key that the API uses to
    /// collapse retries of the same booking.
    async fn submit_booking(
        &self,
        submission: &BookingSubmission,
    ) -> Result<BookingConfirmation, ApiError>;
}

/// Failure talking to the remote API.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// The request did not complete (connection refused, timeout, ...).
    #[error("transport error: {0}")]
    Transport(String),
    /// The API answered with a non-success status.
    #[error("remote API returned status {status}{}", describe_body(.body))]
    Status {
        status: u16,
        body: Option<ApiErrorBody>,
    },
    /// The API answered 2xx with a body that could not be understood.
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

fn describe_body(body: &Option<ApiErrorBody>) -> String {
    match body.as_ref().and_then(|b| b.message.as_deref()) {
        Some(message) => format!(": {message}"),
        None => String::new(),
    }
}

/// Error payload returned by the remote API on 4xx responses.
///
/// Field errors come either as a single string or as a list of strings per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, alias = "error", alias = "detail")]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: BTreeMap<String, ErrorMessages>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessages {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessages {
    /// All messages joined into one line.
    pub fn joined(&self) -> String {
        match self {
            ErrorMessages::One(message) => message.clone(),
            ErrorMessages::Many(messages) => messages.join("; "),
        }
    }
}

/// Successful booking response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    #[serde(alias = "booking_id")]
    pub id: EntityId,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
