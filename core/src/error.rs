//! Error types for table parsing and artifact verification.

use thiserror::Error;

use crate::guid::Guid;

/// Structural faults found while walking the hash table.
///
/// These are kept apart from "entry absent": a table that cannot be walked to
/// its declared end denies every lookup instead of reporting a miss.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The root header's declared span cannot be honored by the mapped region.
    #[error("hash table root length {declared} is invalid for a {available}-byte region")]
    BadRootLength { declared: usize, available: usize },

    /// Fewer bytes remain in the entry region than one entry header needs.
    #[error("hash table entry at offset {offset} is cut short, {remaining} bytes remain")]
    TruncatedEntry { offset: usize, remaining: usize },

    /// An entry declares a length shorter than its own header or running past
    /// the end of the entry region.
    #[error("hash table entry at offset {offset} declares invalid length {len}")]
    BadEntryLength { offset: usize, len: usize },
}

/// Failures reported when a boot artifact is checked against the table.
///
/// Every variant aborts the fetch that triggered it; none are retried, since
/// the underlying memory does not change between attempts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Verification was requested but no hash table was discovered at boot.
    #[error("no hash table was discovered in protected memory")]
    NoTableLoaded,

    /// The table itself cannot be walked.
    #[error("malformed hash table: {0}")]
    MalformedTable(#[from] ParseError),

    /// The table has no entry for the requested identifier.
    #[error("no hash table entry for {guid}")]
    EntryNotFound { guid: Guid },

    /// The matching entry's payload is not a SHA-256 digest.
    #[error("hash entry for {guid} holds {len} bytes, expected 32")]
    DigestSizeMismatch { guid: Guid, len: usize },

    /// The artifact's digest does not match the table entry.
    #[error("digest mismatch for {guid}")]
    DigestMismatch { guid: Guid },

    /// The artifact name is outside the closed set this verifier covers.
    #[error("unrecognized artifact name {name:?}")]
    UnrecognizedArtifact { name: String },
}
