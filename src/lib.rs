//! Runtime function multi-versioning.
//!
//! An application hands this crate source files, target function names, and a
//! sequence of build options; it synthesizes a fresh shared artifact containing
//! compiled versions of those functions, loads it into the host process, and
//! returns callable function pointers. The same program may request many versions
//! of the same function with differing options, keep them side-by-side, unload
//! them, and reload them — so that optimisation choices (pass pipelines, macro
//! defines, numeric precision, back-end) can be made per call site rather than
//! ahead of time.
//!
//! The crate does not parse source languages, does not define or execute an
//! optimisation pass algorithm, does not choose options for the caller, and does
//! not persist state across process restarts.
//!
//! # Layout
//!
//! - [`compilers`]: the [`compilers::CompilerBackend`] trait and its concrete
//!   variants ([`compilers::External`], [`compilers::ExternalWithOpt`], and, behind
//!   the `llvm` feature, `InProcessBatch`/`InProcessJit`).
//! - [`Version`] / [`VersionBuilder`]: the sealed configuration + derived-artifact
//!   state machine, and the mutable builder that seals it.
//! - [`identity`]: per-Version id generation and derived-file path layout.
//! - [`option`]: the `Opt` type and option sequences.
//! - [`log_registry`]: the process-wide per-log-file lock table.
//! - [`convenience`]: `new_version`/`compile_and_get_first_symbol`, the single
//!   high-level wrapper the spec names as an external collaborator.

pub mod builder;
pub mod compilers;
pub mod convenience;
pub mod error;
pub mod identity;
pub mod log_registry;
pub mod option;
pub mod version;

pub use builder::VersionBuilder;
pub use compilers::{CompilerBackend, RawSymbol};
pub use convenience::{compile_and_get_first_symbol, new_version};
pub use error::{Error, Result};
pub use identity::VersionId;
pub use option::{Opt, OptList};
pub use version::Version;
