//! Process-wide LLVM initialisation shared by the in-process backend variants.
//!
//! Grounded on `include/versioningCompiler/CompilerImpl/ClangLLVM/LLVMInstanceManager.hpp`:
//! target/pass/native-target initialisation is global, one-time, and lazy. There is no
//! symmetric teardown call in LLVM's C API that mirrors the original's instance manager
//! destructor; LLVM's own global state is simply owned by the process for its lifetime,
//! so this module documents that instead of faking a shutdown sequence.

use std::sync::OnceLock;

use inkwell::context::Context;
use inkwell::targets::{InitializationConfig, Target};

/// Ensures LLVM's native target is initialised exactly once, on first use by either
/// [`super::InProcessBatch`] or [`super::InProcessJit`]. Constructing *any* in-process
/// backend establishes this process-wide state; it is never torn down explicitly.
pub fn ensure_initialized() {
    static INIT: OnceLock<()> = OnceLock::new();
    INIT.get_or_init(|| {
        Target::initialize_native(&InitializationConfig::default())
            .expect("failed to initialize native LLVM target");
        tracing::debug!(target: "versioning_compiler::llvm", "initialized native LLVM target");
    });
}

/// A single process-wide LLVM context, shared by all in-process backend instances.
/// `inkwell::context::Context` is not `Sync`, but it *is* safe to share a `&'static
/// Context` across threads for module/engine creation as long as callers serialise
/// mutation of any one `Module`/`ExecutionEngine`, which the crate's own locking
/// (per-backend mutex for InProcessBatch, per-version engine for InProcessJit) already
/// guarantees.
pub fn shared_context() -> &'static Context {
    static CONTEXT: OnceLock<SyncContext> = OnceLock::new();
    &CONTEXT.get_or_init(|| SyncContext(Context::create())).0
}

struct SyncContext(Context);
// SAFETY: see `shared_context` — access is serialised by the backends that hand out
// references to this context.
unsafe impl Sync for SyncContext {}
