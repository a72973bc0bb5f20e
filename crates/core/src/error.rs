use crate::choice::EntityId;
use crate::resolver::FieldErrors;
use crate::step::{Flow, StepId};
use carebook_types::TextError;

/// A wizard action that was refused.
///
/// Refused actions never reach the network and leave the selection chain untouched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WizardError {
    #[error("step {0} is not part of the {1} flow")]
    StepNotInFlow(StepId, Flow),
    #[error("cannot enter {step}: missing selection for {missing}")]
    MissingSelection { step: StepId, missing: StepId },
    #[error("{requested} is not the active step (active: {active})")]
    NotActiveStep { requested: StepId, active: StepId },
    #[error("{0} has no choice list")]
    NotAChoiceStep(StepId),
    #[error("choices for {0} are still loading")]
    StepLoading(StepId),
    #[error("{choice} is not an available choice for {step}")]
    UnknownChoice { step: StepId, choice: EntityId },
    #[error("no selection made for {0}")]
    NoDraft(StepId),
    #[error("invalid draft: {}", describe_field_errors(.0))]
    InvalidDraft(FieldErrors),
    #[error("already at the first step")]
    AtFirstStep,
    #[error("{0} is the final step; submit the booking instead")]
    AtTerminalStep(StepId),
    #[error("bookings can only be submitted from the {0} step")]
    NotAtTerminalStep(StepId),
    #[error("a booking submission is in flight")]
    SubmissionInFlight,
    #[error("the booking is complete; reset to start a new one")]
    BookingComplete,
}

pub type WizardResult<T> = std::result::Result<T, WizardError>;

fn describe_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Invalid startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid text: {0}")]
    Text(#[from] TextError),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
