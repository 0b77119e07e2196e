//! Digest verification of candidate boot artifacts against the table.

use log::{debug, error};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::VerifyError;
use crate::guid::Guid;
use crate::table::HashTable;

/// Every entry this subsystem consumes holds a SHA-256 digest.
pub const SHA256_DIGEST_SIZE: usize = 32;

/// Check `buf` against the table entry tagged `guid`.
///
/// A missing table is the opt-out decided once at discovery time and fails
/// with [`VerifyError::NoTableLoaded`]. With a table present, every failure
/// denies the artifact. The outcome is a pure function of `buf` and the table
/// bytes; retrying cannot change it.
pub fn verify_hash_entry(
    table: Option<&HashTable<'_>>,
    guid: &Guid,
    buf: &[u8],
) -> Result<(), VerifyError> {
    let Some(table) = table else {
        error!("verifier called but no hash table was discovered");
        return Err(VerifyError::NoTableLoaded);
    };

    let payload = match table.find(guid) {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            error!("hash entry {guid} not found in table");
            return Err(VerifyError::EntryNotFound { guid: *guid });
        }
        Err(err) => {
            error!("hash table walk failed: {err}");
            return Err(err.into());
        }
    };

    if payload.len() != SHA256_DIGEST_SIZE {
        error!(
            "hash entry {guid} has the wrong size {} != {}",
            payload.len(),
            SHA256_DIGEST_SIZE
        );
        return Err(VerifyError::DigestSizeMismatch {
            guid: *guid,
            len: payload.len(),
        });
    }

    let digest = Sha256::digest(buf);
    if bool::from(digest.as_slice().ct_eq(payload)) {
        debug!("digest comparison for {guid} succeeded");
        Ok(())
    } else {
        error!(
            "digest mismatch for {guid}: expected {}, computed {}",
            hex::encode(payload),
            hex::encode(digest)
        );
        Err(VerifyError::DigestMismatch { guid: *guid })
    }
}
