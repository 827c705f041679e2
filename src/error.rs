//! The crate-wide error taxonomy.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There are no sentinel
//! zero/empty return values anywhere in the public API — a failed operation always produces one of
//! the variants below.

use std::fmt;
use std::io;

use crate::codeplug::ValidationIssue;

/// A single validated-but-failing field assignment.
///
/// Carried by [`Error::ConstraintFailed`]. Distinct from [`ValidationIssue`], which describes
/// model-level validation run across an entire codeplug rather than a single `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintFailure {
    pub field_id: String,
    pub message: String,
}

impl fmt::Display for ConstraintFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_id, self.message)
    }
}

/// Errors returned by this crate.
///
/// `BoundsError` indicates a schema-registration bug (a field definition that violates its own
/// declared width) and should never occur with correctly authored model schemas.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A field definition's bit range does not fit the owning codeplug's buffer, or a write
    /// target falls outside `[field.offset, field.offset + field.length)`. Always a programming
    /// bug in a model's schema, never a runtime condition a caller can trigger.
    #[error("bit range out of bounds: {0}")]
    BoundsError(String),

    /// A `set` call failed its field's constraint. The codeplug buffer and dirty set are left
    /// untouched.
    #[error("constraint failed for {0}")]
    ConstraintFailed(ConstraintFailure),

    /// The container's magic bytes did not match `CPLG`, or the structure could not be parsed.
    #[error("not a codeplug container: {0}")]
    InvalidFormat(String),

    /// The container declares a version this crate does not know how to read.
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    /// The container is truncated or otherwise internally inconsistent past the header.
    #[error("corrupted container: {0}")]
    Corrupted(String),

    /// The container is encrypted but no password was supplied.
    #[error("container is password-protected")]
    MissingPassword,

    /// The supplied password failed to authenticate the container (AEAD tag mismatch).
    #[error("incorrect password")]
    BadPassword,

    /// A transport-level I/O failure (open, read, or write).
    #[error("transport error: {0}")]
    TransportError(#[from] io::Error),

    /// A blocking operation did not complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The radio rejected the authentication response, or closed the link during authentication.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No authentication transform is known for the radio's family; rather than guess, the
    /// session refuses to proceed.
    #[error("no known authentication transform for family {0:?}")]
    UnsupportedAuth(String),

    /// An XCMP request was NACKed, or a reply did not match the expected shape.
    #[error("XCMP error on opcode {opcode:#06x}: code {code} ({message})")]
    XcmpError {
        opcode: u16,
        code: u8,
        message: String,
    },

    /// The radio identified as a different model than the caller supplied.
    #[error("model mismatch: expected {expected}, radio identified as {actual}")]
    ModelMismatch { expected: String, actual: String },

    /// The codeplug partition reported by PSDT does not match the model's declared size.
    #[error("codeplug partition size mismatch: expected {expected}, radio reports {actual}")]
    PartitionSizeMismatch { expected: usize, actual: usize },

    /// Pre-write model validation found at least one error-severity issue.
    #[error("validation failed with {} issue(s)", .0.len())]
    ValidationFailed(Vec<ValidationIssue>),

    /// Post-write read-back did not match what was sent, starting at `offset`.
    #[error("verification failed: radio content diverges at byte offset {0}")]
    VerifyFailed(usize),

    /// The caller cancelled an in-progress operation after `bytes_done` bytes were transferred.
    #[error("aborted after {0} byte(s)")]
    Aborted(usize),

    /// A model identifier was not found in the registry.
    #[error("unknown radio model {0:?}")]
    UnknownModel(String),

    /// A field identifier was not found in a model's schema.
    #[error("unknown field {0:?}")]
    UnknownField(String),
}

impl Error {
    /// Whether this error is safe to retry exactly as-is (the operation had no observable side
    /// effect on the radio or the codeplug).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::TransportError(_))
    }
}
