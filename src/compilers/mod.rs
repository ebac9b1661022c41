//! The [`CompilerBackend`] abstraction and its concrete variants.
//!
//! Grounded on `include/versioningCompiler/Compiler.hpp`: a single trait captures the
//! four primitive stage operations (`generate_ir`, `run_optimizer`, `generate_bin`,
//! `load_symbols`/`release_symbols`) plus option rendering and capability queries,
//! dispatched dynamically (`Arc<dyn CompilerBackend>`) the way the teacher crate's
//! `Compiler`/`CompilerBackend`-shaped traits are used behind `auto_impl` blanket impls.

use std::path::{Path, PathBuf};

use crate::{
    log_registry::LogHandle,
    option::{Opt, OptList},
};

pub mod external;

#[cfg(feature = "llvm")]
pub mod global;
#[cfg(feature = "llvm")]
pub mod in_process_batch;
#[cfg(feature = "llvm")]
pub mod in_process_jit;

pub use external::{External, ExternalWithOpt};
#[cfg(feature = "llvm")]
pub use in_process_batch::InProcessBatch;
#[cfg(feature = "llvm")]
pub use in_process_jit::InProcessJit;

/// A raw, untyped callable address returned by symbol resolution. The caller is
/// responsible for transmuting it to the function-pointer type it expects; the
/// address is documented as invalid after the owning [`crate::Version`] is folded
/// or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSymbol(pub *const ());

// SAFETY: a RawSymbol is an inert address; the backend that produced it guarantees
// the underlying code/data is safe to call/read from any thread as long as the
// owning artifact stays loaded, which is a precondition the caller must uphold.
unsafe impl Send for RawSymbol {}
unsafe impl Sync for RawSymbol {}

/// Opaque handle to a loaded shared artifact, returned by `load_symbols` and
/// consumed by `release_symbols`. Each concrete backend defines what it actually
/// holds (a `libloading::Library`, a JIT execution engine, ...).
pub trait LoadHandle: std::fmt::Debug + Send + Sync {}

/// The uniform contract every backend variant implements.
///
/// All stage operations follow the "report absent result + log detail" policy: no
/// `CompilerBackend` method itself returns a `Result` crossing this trait boundary;
/// failures are represented as `None`/empty and the detail is written through the
/// `log` handle each method receives.
pub trait CompilerBackend: std::fmt::Debug + Send + Sync {
    /// True if this instance can produce an intermediate representation at all.
    fn supports_ir(&self) -> bool;

    /// True if this instance can run an optimiser pass over a previously generated IR.
    fn supports_optimizer(&self) -> bool;

    /// The working directory derived file paths are rooted at (see `crate::identity`).
    fn work_dir(&self) -> &Path;

    /// The log handle this backend instance writes command lines and errors to.
    fn log(&self) -> &LogHandle;

    /// Renders a single [`Opt`] into the string form this backend's invocation
    /// channel expects (escaping/quoting as required).
    fn render_option(&self, opt: &Opt) -> String;

    /// Generates an intermediate representation from `sources`. Returns the path to
    /// the IR file on success. `None` if unsupported, the invocation failed, or the
    /// expected output file was not produced.
    fn generate_ir(
        &self,
        sources: &[PathBuf],
        funcs: &[String],
        version_id: crate::identity::VersionId,
        options: &OptList,
    ) -> Option<PathBuf>;

    /// Runs the optimiser over `ir_file`. Returns the path to the optimised IR on
    /// success.
    fn run_optimizer(
        &self,
        ir_file: &Path,
        version_id: crate::identity::VersionId,
        options: &OptList,
    ) -> Option<PathBuf>;

    /// Produces a loadable shared artifact from `sources` (which may be the
    /// optimised IR, the raw IR, or the original source files — the caller decides
    /// which). Returns the artifact's path (or, for in-memory backends, a synthetic
    /// token the same backend recognises) on success.
    fn generate_bin(
        &self,
        sources: &[PathBuf],
        funcs: &[String],
        version_id: crate::identity::VersionId,
        options: &OptList,
    ) -> Option<PathBuf>;

    /// Loads `funcs` from `artifact`. Returns one entry per requested name, `None`
    /// in a position whose symbol could not be resolved (this is not a hard
    /// failure: at least one missing symbol is logged but does not fail the whole
    /// call). Also returns the opaque handle to use for a later `release_symbols`.
    fn load_symbols(
        &self,
        artifact: &Path,
        funcs: &[String],
    ) -> (Vec<Option<RawSymbol>>, Option<Box<dyn LoadHandle>>);

    /// Releases a handle previously returned by `load_symbols`.
    fn release_symbols(&self, handle: Box<dyn LoadHandle>);
}

/// Joins a rendered option sequence the way the External variants build a single
/// display string for the log, even though the actual subprocess invocation passes
/// each option as a discrete argv entry (so there is no shell-injection surface).
pub(crate) fn render_all(backend: &dyn CompilerBackend, options: &OptList) -> Vec<String> {
    options.iter().map(|o| backend.render_option(o)).collect()
}
