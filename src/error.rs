//! Error types shared across the crate.
//!
//! Per the crate's error-handling design, [`Error`] is used internally by stage
//! implementations with `?`, but it never crosses the public [`crate::Version`] /
//! [`crate::VersionBuilder`] API boundary directly: public stage methods log the
//! `Display` text of an `Error` through the [`crate::log_registry`] and return a
//! `bool`/`Option` instead.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The five error kinds from the error-handling design, plus the ambient
/// infrastructure errors `thiserror` derives for free.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The builder produced a [`crate::Version`] that cannot reach the requested stage,
    /// e.g. `prepare_ir` was called against a backend without IR support.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend's external process or in-process driver reported failure.
    #[error("backend invocation failed: {0}")]
    BackendInvocation(String),

    /// The backend reported success but the expected output file does not exist.
    #[error("expected artifact was not produced: {0}")]
    MissingArtifact(PathBuf),

    /// The shared artifact could not be loaded, or a requested symbol is missing.
    #[error("failed to load artifact: {0}")]
    Load(String),

    /// The per-Version log file could not be opened; logging degrades silently.
    #[error("failed to open log file {path}: {source}")]
    Logging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in subprocess output")]
    Utf8(#[from] std::str::Utf8Error),
}

impl Error {
    pub fn configuration(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    pub fn backend_invocation(msg: impl std::fmt::Display) -> Self {
        Self::BackendInvocation(msg.to_string())
    }

    pub fn load(msg: impl std::fmt::Display) -> Self {
        Self::Load(msg.to_string())
    }
}
