//! The [`Version`] state machine.
//!
//! Grounded on `include/versioningCompiler/Version.hpp` / `lib/Version.cpp`: a sealed
//! configuration record plus mutable derived-artifact state, driven through the
//! `Fresh -> HasIR -> HasOptIR -> HasBin -> Loaded` stages described in SPEC_FULL.md
//! §4.3. Derived state lives behind a `Mutex` (teacher idiom: `Solc`/`Vyper` artifacts
//! are likewise produced once and read from many call sites) because §5 only requires
//! that stage calls on *distinct* Versions run concurrently without corrupting shared
//! bookkeeping; a single Version's own stage calls are documented as the caller's
//! responsibility to serialise.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::compilers::{CompilerBackend, LoadHandle, RawSymbol};
use crate::error::{Error, Result};
use crate::identity::VersionId;
use crate::log_registry::LogHandle;
use crate::option::OptList;

/// Derived, mutable artifact state populated by the stage methods. Held behind a
/// `Mutex` inside [`Version`] so stage methods take `&self`.
#[derive(Default)]
struct Derived {
    ir_file: Option<PathBuf>,
    opt_ir_file: Option<PathBuf>,
    bin_file: Option<PathBuf>,
    lib_handle: Option<Box<dyn LoadHandle>>,
    symbols: Vec<Option<RawSymbol>>,
}

impl std::fmt::Debug for Derived {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Derived")
            .field("ir_file", &self.ir_file)
            .field("opt_ir_file", &self.opt_ir_file)
            .field("bin_file", &self.bin_file)
            .field("loaded", &self.lib_handle.is_some())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

/// A sealed configuration plus the derived compilation artifacts and loaded symbols
/// it accumulates as it is driven through its stages.
///
/// The sealed fields (everything but the inner `Derived` cell) are set once at
/// construction by [`crate::VersionBuilder::build`] / [`crate::VersionBuilder::from_shared_object`]
/// and never mutated again — invariant 2 of the data model is therefore enforced by
/// Rust's ownership model: there is simply no `&mut` accessor for them.
#[derive(Debug)]
pub struct Version {
    id: VersionId,
    tags: Vec<String>,
    source_files: Vec<PathBuf>,
    function_names: Vec<String>,
    name_to_index: HashMap<String, usize>,
    build_options: OptList,
    ir_gen_options: OptList,
    opt_options: OptList,
    backend: Arc<dyn CompilerBackend>,
    autoremove: bool,
    derived: Mutex<Derived>,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        tags: Vec<String>,
        source_files: Vec<PathBuf>,
        function_names: Vec<String>,
        build_options: OptList,
        ir_gen_options: OptList,
        opt_options: OptList,
        backend: Arc<dyn CompilerBackend>,
        autoremove: bool,
    ) -> Self {
        let name_to_index = function_names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        Self {
            id: VersionId::new(),
            tags,
            source_files,
            function_names,
            name_to_index,
            build_options,
            ir_gen_options,
            opt_options,
            backend,
            autoremove,
            derived: Mutex::new(Derived::default()),
        }
    }

    /// Constructs a Version already in the `HasBin` state from a prebuilt shared
    /// artifact, per `VersionBuilder::from_shared_object`. IR fields are left unset;
    /// `compile()` is expected to be invoked immediately after to reach `Loaded`.
    pub(crate) fn from_artifact(
        tags: Vec<String>,
        function_names: Vec<String>,
        backend: Arc<dyn CompilerBackend>,
        autoremove: bool,
        bin_file: PathBuf,
    ) -> Self {
        let mut v = Self::new(
            tags,
            Vec::new(),
            function_names,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            backend,
            autoremove,
        );
        v.derived.get_mut().unwrap().bin_file = Some(bin_file);
        v
    }

    fn log(&self) -> &LogHandle {
        self.backend.log()
    }

    // -- sealed accessors -------------------------------------------------------

    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn source_files(&self) -> &[PathBuf] {
        &self.source_files
    }

    pub fn function_names(&self) -> &[String] {
        &self.function_names
    }

    pub fn build_options(&self) -> &OptList {
        &self.build_options
    }

    pub fn ir_gen_options(&self) -> &OptList {
        &self.ir_gen_options
    }

    pub fn opt_options(&self) -> &OptList {
        &self.opt_options
    }

    pub fn backend(&self) -> &Arc<dyn CompilerBackend> {
        &self.backend
    }

    pub fn autoremove(&self) -> bool {
        self.autoremove
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    // -- derived accessors --------------------------------------------------------

    pub fn ir_file(&self) -> Option<PathBuf> {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ir_file
            .clone()
    }

    pub fn opt_ir_file(&self) -> Option<PathBuf> {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .opt_ir_file
            .clone()
    }

    pub fn bin_file(&self) -> Option<PathBuf> {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bin_file
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .lib_handle
            .is_some()
    }

    /// Index 0 of the loaded symbol table, per §4.3 `symbol()`.
    pub fn symbol(&self) -> Option<RawSymbol> {
        self.symbol_by_index(0)
    }

    pub fn symbol_by_index(&self, index: usize) -> Option<RawSymbol> {
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .symbols
            .get(index)
            .copied()
            .flatten()
    }

    pub fn symbol_by_name(&self, name: &str) -> Option<RawSymbol> {
        let index = self.index_of(name)?;
        self.symbol_by_index(index)
    }

    // -- stage transitions --------------------------------------------------------

    /// `Fresh -> HasIR [-> HasOptIR]`. Requires the backend to support IR generation.
    /// Returns `false` (logging the reason) if the backend lacks IR support, IR
    /// generation fails, or — when the backend also supports an optimiser — the
    /// optimiser stage fails.
    pub fn prepare_ir(&self) -> bool {
        match self.try_prepare_ir() {
            Ok(()) => true,
            Err(e) => {
                self.log().append(&format!("Version::prepare_ir ERROR {e}"));
                false
            }
        }
    }

    fn try_prepare_ir(&self) -> Result<()> {
        if !self.backend.supports_ir() {
            return Err(Error::configuration(
                "backend does not support IR generation",
            ));
        }
        if self.source_files.is_empty() {
            return Err(Error::configuration("no source files"));
        }

        let ir_file = self
            .backend
            .generate_ir(
                &self.source_files,
                &self.function_names,
                self.id,
                &self.ir_gen_options,
            )
            .ok_or_else(|| Error::backend_invocation("generate_ir failed"))?;
        if !ir_file.is_file() {
            return Err(Error::MissingArtifact(ir_file));
        }
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .ir_file = Some(ir_file.clone());

        if self.backend.supports_optimizer() {
            let opt_ir_file = self
                .backend
                .run_optimizer(&ir_file, self.id, &self.opt_options)
                .ok_or_else(|| Error::backend_invocation("run_optimizer failed"))?;
            if !opt_ir_file.is_file() {
                return Err(Error::MissingArtifact(opt_ir_file));
            }
            self.derived
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .opt_ir_file = Some(opt_ir_file);
        }
        Ok(())
    }

    /// `[HasIR|HasOptIR|Fresh] -> HasBin -> Loaded`. Idempotent once `Loaded`: a
    /// second call returns `true` immediately without re-invoking the backend.
    /// Selects the richest available source set for `generate_bin`: the optimised
    /// IR if present, else the raw IR, else the original source files.
    pub fn compile(&self) -> bool {
        if self.is_loaded() {
            return true;
        }
        match self.try_compile() {
            Ok(()) => true,
            Err(e) => {
                self.log().append(&format!("Version::compile ERROR {e}"));
                false
            }
        }
    }

    fn try_compile(&self) -> Result<()> {
        let bin_file = match self.bin_file() {
            Some(p) => p,
            None => self.try_generate_bin()?,
        };
        self.try_load_from_bin(&bin_file)
    }

    fn try_generate_bin(&self) -> Result<PathBuf> {
        let sources: Vec<PathBuf> = {
            let d = self.derived.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(p) = &d.opt_ir_file {
                vec![p.clone()]
            } else if let Some(p) = &d.ir_file {
                vec![p.clone()]
            } else {
                self.source_files.clone()
            }
        };
        if sources.is_empty() {
            return Err(Error::configuration("no source files"));
        }
        let bin_file = self
            .backend
            .generate_bin(&sources, &self.function_names, self.id, &self.build_options)
            .ok_or_else(|| Error::backend_invocation("generate_bin failed"))?;
        self.derived
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .bin_file = Some(bin_file.clone());
        Ok(bin_file)
    }

    fn load_from_bin(&self, bin_file: &std::path::Path) -> bool {
        match self.try_load_from_bin(bin_file) {
            Ok(()) => true,
            Err(e) => {
                self.log().append(&format!("Version::compile ERROR {e}"));
                false
            }
        }
    }

    /// On success, records `symbols`/`lib_handle` so `is_loaded()` reports `true`. On
    /// failure, releases whatever handle the backend handed back (if any) and leaves
    /// `Derived` untouched — a failed load must not leave the Version looking
    /// `is_loaded()` when `symbol()` would in fact return `None`, which would make a
    /// later `compile()` short-circuit at version.rs:287 without retrying.
    fn try_load_from_bin(&self, bin_file: &std::path::Path) -> Result<()> {
        let (symbols, handle) = self.backend.load_symbols(bin_file, &self.function_names);
        let loaded_ok = handle.is_some() && symbols.first().copied().flatten().is_some();
        if loaded_ok {
            let mut d = self.derived.lock().unwrap_or_else(|e| e.into_inner());
            d.symbols = symbols;
            d.lib_handle = handle;
            Ok(())
        } else {
            if let Some(handle) = handle {
                self.backend.release_symbols(handle);
            }
            Err(Error::load("load_symbols produced no usable first symbol"))
        }
    }

    /// Releases the loaded artifact without discarding the Version or its recorded
    /// `bin_file`. No-op if already folded.
    pub fn fold(&self) {
        let handle = {
            let mut d = self.derived.lock().unwrap_or_else(|e| e.into_inner());
            d.symbols.clear();
            d.lib_handle.take()
        };
        if let Some(handle) = handle {
            self.backend.release_symbols(handle);
        }
    }

    /// Folds (if loaded) then re-loads using the existing `bin_file`. Fails if no
    /// `bin_file` has ever been recorded, or the artifact can no longer be loaded.
    pub fn reload(&self) -> Option<RawSymbol> {
        self.fold();
        let bin_file = self.bin_file()?;
        if !self.load_from_bin(&bin_file) {
            return None;
        }
        self.symbol()
    }
}

impl Drop for Version {
    fn drop(&mut self) {
        self.fold();
        if !self.autoremove {
            return;
        }
        let d = self.derived.get_mut().unwrap_or_else(|e| e.into_inner());
        for path in [d.bin_file.take(), d.opt_ir_file.take(), d.ir_file.take()]
            .into_iter()
            .flatten()
        {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::trace!(path = %path.display(), "autoremoved derived file"),
                Err(e) => {
                    tracing::trace!(path = %path.display(), error = %e, "autoremove failed, ignoring")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::external::External;

    fn backend(dir: &std::path::Path) -> Arc<dyn CompilerBackend> {
        Arc::new(External::new(
            "/usr/bin/cc",
            dir,
            dir.join("log.txt"),
            false,
        ))
    }

    #[test]
    fn fresh_version_has_no_derived_state() {
        let dir = tempfile::tempdir().unwrap();
        let v = Version::new(
            vec![],
            vec![dir.path().join("a.c")],
            vec!["f".into()],
            vec![],
            vec![],
            vec![],
            backend(dir.path()),
            true,
        );
        assert!(v.ir_file().is_none());
        assert!(v.bin_file().is_none());
        assert!(!v.is_loaded());
        assert_eq!(v.index_of("f"), Some(0));
        assert_eq!(v.index_of("missing"), None);
    }

    #[test]
    fn distinct_versions_have_distinct_ids() {
        let dir = tempfile::tempdir().unwrap();
        let a = Version::new(
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            backend(dir.path()),
            true,
        );
        let b = Version::new(
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            vec![],
            backend(dir.path()),
            true,
        );
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn prepare_ir_fails_cleanly_without_ir_support() {
        let dir = tempfile::tempdir().unwrap();
        let v = Version::new(
            vec![],
            vec![dir.path().join("a.c")],
            vec!["f".into()],
            vec![],
            vec![],
            vec![],
            backend(dir.path()),
            true,
        );
        assert!(!v.prepare_ir());
        assert!(v.ir_file().is_none());
    }
}
