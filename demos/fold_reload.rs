//! Scenario 4 from SPEC_FULL.md §8: compile, call, fold, assert unloaded, reload,
//! call again.

use std::sync::Arc;

use versioning_compiler::compilers::External;
use versioning_compiler::VersionBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let work_dir = std::env::temp_dir().join("versioning_compiler_demo_fold_reload");
    std::fs::create_dir_all(&work_dir).unwrap();
    let source = work_dir.join("f.c");
    std::fs::write(&source, "int f(int x) { return x + 1; }\n").unwrap();

    let backend = Arc::new(External::new(
        "cc",
        &work_dir,
        work_dir.join("compile.log"),
        false,
    ));

    let mut builder = VersionBuilder::new();
    builder
        .set_compiler(backend)
        .add_source_file(source)
        .add_function_name("f");
    let version = builder.build();

    assert!(version.compile());
    let call = |version: &versioning_compiler::Version| -> i32 {
        let symbol = version.symbol().expect("f should be loaded");
        let f: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(symbol.0) };
        f(41)
    };
    assert_eq!(call(&version), 42);

    version.fold();
    assert!(version.symbol().is_none(), "symbol must be gone after fold");

    let reloaded = version
        .reload()
        .expect("reload should succeed without rebuilding");
    let f: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(reloaded.0) };
    assert_eq!(f(41), 42);
    println!("fold/reload round-trip ok");
}
