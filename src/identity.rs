//! Per-Version identity and derived-file path layout.
//!
//! Grounded on `include/versioningCompiler/Version.hpp` (`uuid/uuid.h` generation)
//! and the Compiler's `getBitcodeFileName`/`getOptBitcodeFileName`/`getSharedObjectFileName`
//! helpers: paths are deterministic functions of the id and the working directory, so
//! that id-uniqueness alone guarantees no two live Versions collide on disk.

use std::path::{Path, PathBuf};

use uuid::Uuid;

/// A Version's globally-unique identifier, rendered in canonical hyphenated form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionId(Uuid);

impl VersionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Reconstructs a `VersionId` from its rendered form, e.g. to recover the id a
    /// JIT backend encoded as its synthetic artifact "path" token.
    pub fn parse(rendered: &str) -> Option<Self> {
        rendered.parse::<Uuid>().ok().map(Self)
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derives `<workdir>/IR_<id>.bc`.
pub fn ir_file_path(workdir: &Path, id: VersionId) -> PathBuf {
    workdir.join(format!("IR_{id}.bc"))
}

/// Derives `<workdir>/opt_IR_<id>.bc`.
pub fn opt_ir_file_path(workdir: &Path, id: VersionId) -> PathBuf {
    workdir.join(format!("opt_IR_{id}.bc"))
}

/// Derives `<workdir>/lib<id>.<platform extension>`.
pub fn bin_file_path(workdir: &Path, id: VersionId) -> PathBuf {
    workdir.join(format!("lib{id}.{}", std::env::consts::DLL_EXTENSION))
}
