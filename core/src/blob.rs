//! Artifact dispatch and registration with the named-blob transport.

use std::sync::Arc;

use log::{debug, error, info};

use crate::error::VerifyError;
use crate::guid::{Guid, CMDLINE_HASH_GUID, INITRD_HASH_GUID, KERNEL_HASH_GUID};
use crate::table::HashTable;
use crate::verify::verify_hash_entry;

/// Boot artifacts the host may deliver through the named-blob transport.
///
/// The set is closed. A name outside it is rejected before the table is
/// consulted at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    Kernel,
    Initrd,
    Cmdline,
}

impl Artifact {
    /// All dispatchable artifacts.
    pub const ALL: [Artifact; 3] = [Artifact::Kernel, Artifact::Initrd, Artifact::Cmdline];

    /// The transport-level name of this artifact.
    pub fn name(&self) -> &'static str {
        match self {
            Artifact::Kernel => "kernel",
            Artifact::Initrd => "initrd",
            Artifact::Cmdline => "cmdline",
        }
    }

    /// The table entry identifier holding this artifact's digest.
    pub fn guid(&self) -> &'static Guid {
        match self {
            Artifact::Kernel => &KERNEL_HASH_GUID,
            Artifact::Initrd => &INITRD_HASH_GUID,
            Artifact::Cmdline => &CMDLINE_HASH_GUID,
        }
    }

    /// Map a transport name into the closed artifact set.
    pub fn from_name(name: &str) -> Option<Artifact> {
        Artifact::ALL.iter().copied().find(|a| a.name() == name)
    }
}

/// Verifies named boot artifacts against the discovered hash table.
///
/// The dispatcher has exactly two states for the whole boot stage: inactive
/// (no table discovered, every call fails with
/// [`VerifyError::NoTableLoaded`]) and active. The state is fixed at
/// construction; there is no transition back.
#[derive(Debug, Clone, Copy)]
pub struct BlobVerifier<'a> {
    table: Option<HashTable<'a>>,
}

impl<'a> BlobVerifier<'a> {
    /// Build the dispatcher around the table discovered at initialization.
    pub fn new(table: Option<HashTable<'a>>) -> Self {
        BlobVerifier { table }
    }

    /// Whether a table was discovered.
    pub fn is_active(&self) -> bool {
        self.table.is_some()
    }

    /// Verify `buf` as the contents of `artifact`.
    pub fn verify(&self, artifact: Artifact, buf: &[u8]) -> Result<(), VerifyError> {
        debug!("validating hash of {}", artifact.name());
        verify_hash_entry(self.table.as_ref(), artifact.guid(), buf)
    }

    /// Verify `buf` as the contents of the artifact named `name`.
    ///
    /// Unknown names fail with [`VerifyError::UnrecognizedArtifact`] without
    /// consulting the table, whatever state the dispatcher is in.
    pub fn verify_named(&self, name: &str, buf: &[u8]) -> Result<(), VerifyError> {
        match Artifact::from_name(name) {
            Some(artifact) => self.verify(artifact, buf),
            None => {
                error!("refusing unrecognized artifact name {name:?}");
                Err(VerifyError::UnrecognizedArtifact {
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Callback the transport runs with `(name, buffer)` once a named blob has
/// been fully read, before the blob is handed to any consumer. An error
/// return aborts the fetch.
pub type NamedBlobVerifier = Arc<dyn Fn(&str, &[u8]) -> Result<(), VerifyError> + Send + Sync>;

/// Registration seam offered by the named-blob transport.
pub trait BlobTransport {
    /// Install `verifier` on the fetch path of every named blob.
    fn register_verifier(&mut self, verifier: NamedBlobVerifier);
}

/// Wire the dispatcher into `transport`.
///
/// Registration happens only while confidential-memory protection is active;
/// otherwise nothing is installed and fetches stay unchecked. Returns whether
/// a verifier was installed.
pub fn install_verifier<T: BlobTransport>(
    transport: &mut T,
    memory_encryption_active: bool,
    table: Option<HashTable<'static>>,
) -> bool {
    if !memory_encryption_active {
        info!("memory encryption inactive, not enabling hash verification of named blobs");
        return false;
    }

    info!("enabling hash verification of named blobs");
    let verifier = BlobVerifier::new(table);
    transport.register_verifier(Arc::new(move |name, buf| verifier.verify_named(name, buf)));
    true
}
