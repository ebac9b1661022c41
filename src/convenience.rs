//! The single high-level convenience wrapper the spec names as an external
//! collaborator (§6 Collaborator contract): a thin helper that builds a `Version`
//! with sensible defaults for callers who don't need the full `VersionBuilder`
//! surface. Depends only on [`crate::VersionBuilder`] and [`crate::Version`], as the
//! spec requires — it is not part of the core's stage machinery.

use std::path::PathBuf;
use std::sync::Arc;

use crate::compilers::{CompilerBackend, RawSymbol};
use crate::option::OptList;
use crate::version::Version;
use crate::VersionBuilder;

/// Builds a `Version` with default autoremove/tags from a source list, function
/// list and a single `build_options` sequence, per §6.
pub fn new_version(
    source_paths: Vec<PathBuf>,
    function_names: Vec<String>,
    options: OptList,
    backend: Arc<dyn CompilerBackend>,
) -> Version {
    let mut builder = VersionBuilder::new();
    builder.set_compiler(backend);
    for path in source_paths {
        builder.add_source_file(path);
    }
    for name in function_names {
        builder.add_function_name(name);
    }
    builder.options(options);
    builder.build()
}

/// Drives `version` through `compile()` and returns its first symbol, or `None` if
/// compilation failed.
pub fn compile_and_get_first_symbol(version: &Version) -> Option<RawSymbol> {
    if version.compile() {
        version.symbol()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilers::external::External;

    #[test]
    fn new_version_wires_sources_and_functions() {
        let dir = tempfile::tempdir().unwrap();
        let backend: Arc<dyn CompilerBackend> = Arc::new(External::new(
            "/usr/bin/cc",
            dir.path(),
            dir.path().join("log.txt"),
            false,
        ));
        let v = new_version(
            vec![dir.path().join("a.c")],
            vec!["f".into()],
            vec![],
            backend,
        );
        assert_eq!(v.source_files().len(), 1);
        assert_eq!(v.function_names(), &["f".to_string()]);
    }
}
