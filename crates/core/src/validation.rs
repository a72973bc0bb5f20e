//! Input validation utilities.
//!
//! This module contains functions for validating user and configuration inputs before they
//! are used to build remote requests.

use crate::constants::{MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};
use crate::error::{ConfigError, ConfigResult};
use url::Url;

/// Validates and normalises the base URL of the remote booking API.
///
/// Every remote request is built by appending path segments to this value, so it is held
/// to a conservative shape:
/// - `http` or `https` scheme
/// - a non-empty host
/// - no query string or fragment
///
/// A trailing empty path segment is removed, so `https://api.example.org/v1/` and
/// `https://api.example.org/v1` resolve the same endpoints.
///
/// # Errors
///
/// Returns a `ConfigError::InvalidInput` if the URL is not acceptable.
pub fn validate_api_base_url(url: &str) -> ConfigResult<Url> {
    let trimmed = url.trim();

    if trimmed.is_empty() {
        return Err(ConfigError::InvalidInput(
            "API base URL cannot be empty".into(),
        ));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| {
        ConfigError::InvalidInput(format!("API base URL '{}' is invalid: {}", trimmed, e))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidInput(
            "API base URL must start with http:// or https://".into(),
        ));
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidInput(
            "API base URL must include a host".into(),
        ));
    }

    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ConfigError::InvalidInput(
            "API base URL must not contain a query string or fragment".into(),
        ));
    }

    parsed
        .path_segments_mut()
        .map_err(|_| ConfigError::InvalidInput("API base URL cannot be a base".into()))?
        .pop_if_empty();

    Ok(parsed)
}

/// Normalises a contact phone number to `+`/digits only.
///
/// Accepts an optional leading `+` and the separators space, `-`, `(` and `)`.
/// Returns `None` if any other character is present or the digit count is outside
/// the accepted range.
pub fn normalise_phone(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let (plus, body) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(body.len());
    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '(' | ')' => {}
            _ => return None,
        }
    }

    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return None;
    }

    Some(if plus { format!("+{digits}") } else { digits })
}
