//! [`VersionBuilder`]: mutable accumulation of configuration, sealed by `build()`.
//!
//! Grounded on `include/versioningCompiler/Version.hpp`'s nested `Version::Options`
//! builder struct and `Version::createVersion`/`Version::build` in `lib/Version.cpp`:
//! a plain mutable struct that accumulates fields one at a time (or wholesale via the
//! `options`/`gen_ir_options`/`opt_options` setters), validates at seal time, and
//! produces an immutable [`crate::Version`]. The clone-from-existing and
//! direct-from-artifact constructors mirror the two non-pipeline ways the original
//! exposes for obtaining a `Version`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::compilers::CompilerBackend;
use crate::option::{self, Opt, OptList};
use crate::version::Version;

/// Accumulates a [`Version`]'s configuration mutably before sealing it.
///
/// Defaults (also restored by [`VersionBuilder::reset`]): empty option sequences, no
/// source files, no functions, `autoremove` on, no tags, no function flags.
#[derive(Debug, Clone)]
pub struct VersionBuilder {
    tags: Vec<String>,
    source_files: Vec<PathBuf>,
    function_names: Vec<String>,
    build_options: OptList,
    ir_gen_options: OptList,
    opt_options: OptList,
    function_flags: OptList,
    backend: Option<Arc<dyn CompilerBackend>>,
    autoremove: bool,
}

/// Hand-written rather than derived so `VersionBuilder::default()` agrees with
/// [`VersionBuilder::new()`] on `autoremove: true` — a derived `Default` would
/// silently give `autoremove: false` via `bool`'s zero value.
impl Default for VersionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionBuilder {
    pub fn new() -> Self {
        Self {
            tags: Vec::new(),
            source_files: Vec::new(),
            function_names: Vec::new(),
            build_options: OptList::new(),
            ir_gen_options: OptList::new(),
            opt_options: OptList::new(),
            function_flags: OptList::new(),
            backend: None,
            autoremove: true,
        }
    }

    /// Seeds a builder from an already-sealed Version's configuration, so it can be
    /// mutated and re-sealed into a fresh Version (new id, no derived artifacts).
    pub fn from_version(version: &Version) -> Self {
        Self {
            tags: version.tags().to_vec(),
            source_files: version.source_files().to_vec(),
            function_names: version.function_names().to_vec(),
            build_options: version.build_options().clone(),
            ir_gen_options: version.ir_gen_options().clone(),
            opt_options: version.opt_options().clone(),
            function_flags: Vec::new(),
            backend: Some(Arc::clone(version.backend())),
            autoremove: version.autoremove(),
        }
    }

    pub fn reset(&mut self) -> &mut Self {
        *self = Self::new();
        self
    }

    // -- accumulation -------------------------------------------------------------

    pub fn add_source_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.source_files.push(path.into());
        self
    }

    /// Appends `name` and returns its assigned index.
    pub fn add_function_name(&mut self, name: impl Into<String>) -> usize {
        self.function_names.push(name.into());
        self.function_names.len() - 1
    }

    pub fn set_compiler(&mut self, backend: Arc<dyn CompilerBackend>) -> &mut Self {
        self.backend = Some(backend);
        self
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    /// Adds a bare `-D flag` option to both `ir_gen_options` and `build_options` at
    /// seal time (see `function_flags` in the data model).
    pub fn add_function_flag(&mut self, flag: impl AsRef<str>) -> &mut Self {
        self.function_flags
            .push(option::function_flag_opt(flag.as_ref()));
        self
    }

    /// Convenience that composes the `-D name=value` form of a function flag.
    pub fn add_define(
        &mut self,
        name: impl AsRef<str>,
        value: impl std::fmt::Display,
    ) -> &mut Self {
        self.function_flags
            .push(option::define_opt(name.as_ref(), value));
        self
    }

    pub fn add_include_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        let dir = dir.as_ref().display().to_string();
        self.build_options
            .push(Opt::new(format!("include:{dir}"), "-I", dir.clone()));
        self.ir_gen_options
            .push(Opt::new(format!("include:{dir}"), "-I", dir));
        self
    }

    pub fn add_linking_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        let dir = dir.as_ref().display().to_string();
        self.build_options
            .push(Opt::new(format!("libdir:{dir}"), "-L", dir));
        self
    }

    pub fn set_autoremove(&mut self, autoremove: bool) -> &mut Self {
        self.autoremove = autoremove;
        self
    }

    /// Wholesale replacement of the build-option sequence.
    pub fn options(&mut self, options: OptList) -> &mut Self {
        self.build_options = options;
        self
    }

    pub fn gen_ir_options(&mut self, options: OptList) -> &mut Self {
        self.ir_gen_options = options;
        self
    }

    pub fn opt_options(&mut self, options: OptList) -> &mut Self {
        self.opt_options = options;
        self
    }

    /// Removes every build option with `tag`; invariant 7.
    pub fn remove_option(&mut self, tag: &str) -> &mut Self {
        option::remove_by_tag(&mut self.build_options, tag);
        self
    }

    pub fn remove_gen_ir_option(&mut self, tag: &str) -> &mut Self {
        option::remove_by_tag(&mut self.ir_gen_options, tag);
        self
    }

    pub fn remove_opt_option(&mut self, tag: &str) -> &mut Self {
        option::remove_by_tag(&mut self.opt_options, tag);
        self
    }

    // -- sealing --------------------------------------------------------------------

    /// Seals the accumulated configuration into a fresh [`Version`]. The function
    /// flags are prepended to `build_options`/`ir_gen_options` ahead of all
    /// non-flag options (testable property 4). The builder itself is left
    /// unmodified and may be reused to produce further Versions.
    ///
    /// # Panics
    /// Panics if no backend has been set via [`Self::set_compiler`] — a builder
    /// without a backend cannot produce a Version that could ever reach any stage,
    /// which is a programming error rather than a runtime condition to recover from.
    pub fn build(&self) -> Version {
        let backend = self
            .backend
            .clone()
            .expect("VersionBuilder::build called without set_compiler");

        let mut build_options = self.function_flags.clone();
        build_options.extend(self.build_options.iter().cloned());
        let mut ir_gen_options = self.function_flags.clone();
        ir_gen_options.extend(self.ir_gen_options.iter().cloned());

        Version::new(
            self.tags.clone(),
            self.source_files.clone(),
            self.function_names.clone(),
            build_options,
            ir_gen_options,
            self.opt_options.clone(),
            backend,
            self.autoremove,
        )
    }

    /// Produces a Version pre-set to `HasBin` from an already-built shared artifact,
    /// then immediately `compile()`s it to load its symbols. Never touches IR or
    /// source files. `funcs` may name one function or many.
    pub fn from_shared_object(
        artifact: impl Into<PathBuf>,
        funcs: Vec<String>,
        backend: Arc<dyn CompilerBackend>,
        autoremove: bool,
        tags: Vec<String>,
    ) -> Version {
        let version = Version::from_artifact(tags, funcs, backend, autoremove, artifact.into());
        version.compile();
        version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::external::External;

    fn backend(dir: &Path) -> Arc<dyn CompilerBackend> {
        Arc::new(External::new(
            "/usr/bin/cc",
            dir,
            dir.join("log.txt"),
            false,
        ))
    }

    #[test]
    fn function_flags_precede_non_flag_options() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = VersionBuilder::new();
        b.set_compiler(backend(dir.path()));
        b.options(vec![Opt::new("opt-level", "-O", "3")]);
        b.add_define("FLAG", 1);
        let v = b.build();
        assert_eq!(v.build_options()[0].tag(), option::FUNCTION_FLAG_TAG);
        assert_eq!(v.build_options()[1].tag(), "opt-level");
    }

    #[test]
    fn remove_option_drops_matching_tag() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = VersionBuilder::new();
        b.set_compiler(backend(dir.path()));
        b.options(vec![
            Opt::new("opt-level", "-O", "3"),
            Opt::new("std", "--std=", "c11"),
        ]);
        b.remove_option("opt-level");
        let v = b.build();
        assert!(v.build_options().iter().all(|o| o.tag() != "opt-level"));
    }

    #[test]
    fn clone_from_existing_produces_fresh_id_and_no_derived_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = VersionBuilder::new();
        b.set_compiler(backend(dir.path()));
        b.add_source_file(dir.path().join("a.c"));
        b.add_function_name("f");
        let v1 = b.build();

        let b2 = VersionBuilder::from_version(&v1);
        let v2 = b2.build();

        assert_ne!(v1.id(), v2.id());
        assert_eq!(v1.source_files(), v2.source_files());
        assert_eq!(v1.function_names(), v2.function_names());
        assert!(v2.bin_file().is_none());
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut b = VersionBuilder::new();
        b.set_compiler(backend(dir.path()));
        b.add_source_file(dir.path().join("a.c"));
        b.add_tag("experiment");
        b.reset();
        assert!(b.source_files.is_empty());
        assert!(b.tags.is_empty());
        assert!(b.autoremove);
    }
}
