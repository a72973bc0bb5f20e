//! Carebook booking attachments.
//!
//! A booking submission may carry one file, the patient's payment proof (a photo of a
//! transfer receipt, a PDF invoice). This crate validates that file once, when it enters the
//! wizard, and keeps the bytes together with:
//!
//! - a sanitised original filename (directory components stripped)
//! - a SHA-256 digest of the content (hex)
//! - a best-effort media type, detected from the content rather than the filename
//!
//! The bytes are held in memory until the booking is submitted; nothing is written to disk.
//!
//! ## Example Usage
//!
//! ```no_run
//! use carebook_files::Attachment;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("receipt.png")?;
//! let proof = Attachment::from_bytes("receipt.png", bytes, 5 * 1024 * 1024)?;
//! println!("{} ({:?})", proof.filename(), proof.media_type());
//! # Ok(())
//! # }
//! ```

mod files;

pub use files::{Attachment, AttachmentMetadata, DEFAULT_MAX_ATTACHMENT_BYTES};

/// Errors that can occur while accepting an attachment
#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    /// The file contained no bytes
    #[error("Attachment is empty")]
    Empty,

    /// The file exceeds the configured size limit
    #[error("Attachment is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// The filename was blank or had no final path component
    #[error("Invalid attachment filename: {0}")]
    InvalidFilename(String),
}
