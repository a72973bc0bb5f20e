//! Booking runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the fetcher, the submitter and the HTTP client. Services never read environment
//! variables during request handling; the binary reads them once and builds a
//! [`BookingConfig`].

use crate::constants::{DEFAULT_REQUEST_TIMEOUT_SECS, MAX_REQUEST_TIMEOUT_SECS};
use crate::error::{ConfigError, ConfigResult};
use crate::validation::validate_api_base_url;
use carebook_files::DEFAULT_MAX_ATTACHMENT_BYTES;
use carebook_types::NonEmptyText;
use std::time::Duration;
use url::Url;

/// Booking configuration resolved at startup.
#[derive(Clone)]
pub struct BookingConfig {
    api_base_url: Url,
    patient_id: NonEmptyText,
    api_token: Option<String>,
    request_timeout: Duration,
    max_attachment_bytes: u64,
}

impl BookingConfig {
    /// Create a new `BookingConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the base URL is not an http(s) URL, the patient id is blank,
    /// the timeout is outside `1..=300` seconds, or the attachment limit is zero.
    pub fn new(
        api_base_url: &str,
        patient_id: &str,
        api_token: Option<String>,
        request_timeout: Duration,
        max_attachment_bytes: u64,
    ) -> ConfigResult<Self> {
        let api_base_url = validate_api_base_url(api_base_url)?;
        let patient_id = NonEmptyText::new(patient_id)?;

        let secs = request_timeout.as_secs();
        if !(1..=MAX_REQUEST_TIMEOUT_SECS).contains(&secs) {
            return Err(ConfigError::InvalidInput(format!(
                "request timeout must be between 1 and {} seconds",
                MAX_REQUEST_TIMEOUT_SECS
            )));
        }

        if max_attachment_bytes == 0 {
            return Err(ConfigError::InvalidInput(
                "max attachment size must be greater than zero".into(),
            ));
        }

        let api_token = api_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok(Self {
            api_base_url,
            patient_id,
            api_token,
            request_timeout,
            max_attachment_bytes,
        })
    }

    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    pub fn patient_id(&self) -> &NonEmptyText {
        &self.patient_id
    }

    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn max_attachment_bytes(&self) -> u64 {
        self.max_attachment_bytes
    }
}

impl std::fmt::Debug for BookingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookingConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("patient_id", &self.patient_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .field("max_attachment_bytes", &self.max_attachment_bytes)
            .finish()
    }
}

/// Parse the request timeout from an optional environment value (seconds).
///
/// If `value` is `None` or empty/whitespace, returns the default timeout.
pub fn request_timeout_from_env_value(value: Option<String>) -> ConfigResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let secs = value
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                ConfigError::InvalidInput(format!("request timeout '{}' is not a number", v))
            })
        })
        .transpose()?;

    Ok(Duration::from_secs(
        secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
    ))
}

/// Parse the attachment size limit from an optional environment value (bytes).
///
/// If `value` is `None` or empty/whitespace, returns the default limit.
pub fn max_attachment_bytes_from_env_value(value: Option<String>) -> ConfigResult<u64> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let bytes = value
        .map(|v| {
            v.parse::<u64>().map_err(|_| {
                ConfigError::InvalidInput(format!("attachment limit '{}' is not a number", v))
            })
        })
        .transpose()?;

    Ok(bytes.unwrap_or(DEFAULT_MAX_ATTACHMENT_BYTES))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, patient: &str, timeout_secs: u64) -> ConfigResult<BookingConfig> {
        BookingConfig::new(
            url,
            patient,
            Some(" token ".into()),
            Duration::from_secs(timeout_secs),
            1024,
        )
    }

    #[test]
    fn test_new_normalises_inputs() {
        let cfg = config("https://api.example.org/v1/", "patient-42", 15).expect("valid");
        assert_eq!(cfg.api_base_url().as_str(), "https://api.example.org/v1");
        assert_eq!(cfg.patient_id().as_str(), "patient-42");
        assert_eq!(cfg.api_token(), Some("token"));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_new_rejects_invalid_values() {
        assert!(config("ftp://api.example.org", "p", 15).is_err());
        assert!(config("http://:80", "p", 15).is_err());
        assert!(matches!(config("https://api.example.org", "  ", 15), Err(ConfigError::Text(_))));
        assert!(config("https://api.example.org", "p", 0).is_err());
        assert!(config("https://api.example.org", "p", MAX_REQUEST_TIMEOUT_SECS + 1).is_err());
        assert!(BookingConfig::new(
            "https://api.example.org",
            "p",
            None,
            Duration::from_secs(5),
            0
        )
        .is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let cfg = config("https://api.example.org", "p", 15).unwrap();
        let debug = format!("{cfg:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("token\""));
    }

    #[test]
    fn test_env_value_defaults_and_parsing() {
        assert_eq!(
            request_timeout_from_env_value(None).unwrap(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert_eq!(
            request_timeout_from_env_value(Some(" 30 ".into())).unwrap(),
            Duration::from_secs(30)
        );
        assert!(request_timeout_from_env_value(Some("soon".into())).is_err());

        assert_eq!(
            max_attachment_bytes_from_env_value(Some("".into())).unwrap(),
            DEFAULT_MAX_ATTACHMENT_BYTES
        );
        assert_eq!(
            max_attachment_bytes_from_env_value(Some("2048".into())).unwrap(),
            2048
        );
        assert!(max_attachment_bytes_from_env_value(Some("-1".into())).is_err());
    }
}
