//! Constants used throughout the Carebook core crate.
//!
//! Limits, defaults and user-facing messages live here so the controller, the validators
//! and the HTTP layers agree on them.

/// Default timeout for a single remote request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Largest accepted request timeout, in seconds.
pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Default listen address for the REST surface.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Wizard sessions untouched for this long are dropped by the REST server, in seconds.
pub const SESSION_IDLE_TTL_SECS: u64 = 30 * 60;

/// How often the REST server looks for idle sessions, in seconds.
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Maximum length of the free-text condition field, in characters.
pub const MAX_CONDITION_CHARS: usize = 2_000;

/// Minimum number of digits in a contact phone number.
pub const MIN_PHONE_DIGITS: usize = 7;

/// Maximum number of digits in a contact phone number (E.164).
pub const MAX_PHONE_DIGITS: usize = 15;

/// Path segment of the booking submission endpoint on the remote API.
pub const BOOKINGS_SEGMENT: &str = "bookings";

/// Header carrying the submission key on the booking POST.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Name of the multipart file part carrying the payment proof.
pub const PAYMENT_PROOF_FIELD: &str = "payment_proof";

/// Notice shown when the remote API reports that the chosen slot was taken.
pub const SLOT_UNAVAILABLE_MESSAGE: &str =
    "The selected time slot is no longer available. Please choose another slot.";
