//! In-memory attachment implementation
//!
//! # Validation
//!
//! An [`Attachment`] can only be constructed through [`Attachment::from_bytes`], which
//! enforces:
//!
//! - non-empty content
//! - content size at or below the caller's limit
//! - a usable filename (the final path component of whatever the client sent)
//!
//! # Content Addressing
//!
//! The SHA-256 digest is computed once at construction. It is what the booking summary shows
//! to identify the file, and lets the caller recognise a re-upload of the same receipt.

use crate::AttachmentError;
use carebook_types::NonEmptyText;
use sha2::{Digest, Sha256};
use std::fmt;

/// Default upper bound on an attachment (5 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

/// Serialisable description of an attachment, without its bytes.
///
/// This is what the wizard exposes to the UI for the booking summary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct AttachmentMetadata {
    /// Original filename as uploaded (final path component only)
    pub filename: NonEmptyText,

    /// Hexadecimal SHA-256 digest of the content
    pub sha256: String,

    /// Size of the content in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort only; `None` when the content is not recognised.
    pub media_type: Option<NonEmptyText>,
}

/// A validated file held in memory until submission.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    metadata: AttachmentMetadata,
    bytes: Vec<u8>,
}

impl Attachment {
    /// Accepts an uploaded file.
    ///
    /// # Arguments
    ///
    /// * `filename` - Name supplied by the client; any directory components are dropped
    /// * `bytes` - File content
    /// * `max_bytes` - Inclusive size limit
    ///
    /// # Errors
    ///
    /// Returns `AttachmentError` if:
    /// - the content is empty
    /// - the content is larger than `max_bytes`
    /// - the filename has no usable final component
    pub fn from_bytes(
        filename: &str,
        bytes: Vec<u8>,
        max_bytes: u64,
    ) -> Result<Self, AttachmentError> {
        if bytes.is_empty() {
            return Err(AttachmentError::Empty);
        }

        let size_bytes = bytes.len() as u64;
        if size_bytes > max_bytes {
            return Err(AttachmentError::TooLarge {
                size: size_bytes,
                limit: max_bytes,
            });
        }

        let filename = sanitise_filename(filename)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let sha256 = hex::encode(hasher.finalize());

        // Detect media type (best-effort)
        let media_type = infer::get(&bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok());

        Ok(Self {
            metadata: AttachmentMetadata {
                filename,
                sha256,
                size_bytes,
                media_type,
            },
            bytes,
        })
    }

    pub fn filename(&self) -> &str {
        self.metadata.filename.as_str()
    }

    pub fn media_type(&self) -> Option<&str> {
        self.metadata.media_type.as_ref().map(NonEmptyText::as_str)
    }

    /// MIME type to declare when uploading; falls back to `application/octet-stream`.
    pub fn upload_media_type(&self) -> &str {
        self.media_type().unwrap_or("application/octet-stream")
    }

    pub fn sha256(&self) -> &str {
        &self.metadata.sha256
    }

    pub fn size_bytes(&self) -> u64 {
        self.metadata.size_bytes
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metadata(&self) -> &AttachmentMetadata {
        &self.metadata
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.metadata.filename)
            .field("sha256", &self.metadata.sha256)
            .field("size_bytes", &self.metadata.size_bytes)
            .field("media_type", &self.metadata.media_type)
            .finish()
    }
}

fn sanitise_filename(raw: &str) -> Result<NonEmptyText, AttachmentError> {
    // Clients may send full paths (`C:\Users\...\receipt.png`); keep the last component.
    let last = raw
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .unwrap_or_default();

    if last.is_empty() || last == "." || last == ".." {
        return Err(AttachmentError::InvalidFilename(raw.to_owned()));
    }

    NonEmptyText::new(last).map_err(|_| AttachmentError::InvalidFilename(raw.to_owned()))
}
