//! # Carebook Core
//!
//! Core logic of the dependent booking wizard.
//!
//! This crate contains the wizard state machine and everything it drives:
//! - Flows, steps and their fixed upstream tables ([`step`])
//! - The chain of confirmed selections and its fingerprints ([`selection`])
//! - Step guards, remote query resolution and draft validation ([`resolver`])
//! - De-duplicated, fingerprint-tagged remote fetches ([`fetcher`])
//! - The final multipart booking transaction ([`submitter`])
//! - The reducer-style controller ([`wizard`]) and its async driver ([`session`])
//!
//! **No transport concerns**: the remote API is reached through the [`BookingApi`] trait
//! (implemented with reqwest in `carebook-http`) and the REST surface lives in `api-rest`.

pub mod api;
pub mod choice;
pub mod config;
pub mod constants;
pub mod details;
pub mod error;
pub mod fetcher;
pub mod resolver;
pub mod selection;
pub mod session;
pub mod step;
pub mod submitter;
pub mod validation;
pub mod wizard;

pub use api::{ApiError, ApiErrorBody, BookingApi, BookingConfirmation, ErrorMessages};
pub use choice::{Choice, ChoiceSet, EntityId, RemoteEntity, SlotTime};
pub use config::BookingConfig;
pub use details::{BookingDetails, DetailsView, ValidatedDetails};
pub use error::{ConfigError, ConfigResult, WizardError, WizardResult};
pub use fetcher::{DependentFetcher, FetchFailure, FetchOutcome, FetchTicket};
pub use resolver::{endpoint_url, FieldErrors, StepQuery, StepResolver};
pub use selection::{Fingerprint, Selection, SelectionStore};
pub use session::BookingSession;
pub use step::{Flow, StepDefinition, StepId};
pub use submitter::{
    BookingDraft, BookingSubmission, BookingSubmitter, SubmissionTicket, SubmitOutcome,
};
pub use wizard::{
    ChoiceStatus, WizardAction, WizardController, WizardEffect, WizardNotice, WizardState,
    WizardView,
};
