//! Scenario 1 from SPEC_FULL.md §8: build one version of a single function with the
//! system C compiler and call it.

use std::sync::Arc;

use versioning_compiler::compilers::External;
use versioning_compiler::VersionBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let work_dir = std::env::temp_dir().join("versioning_compiler_demo_basic");
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

    assert!(
        version.compile(),
        "compile failed; see {}",
        work_dir.join("compile.log").display()
    );

    let symbol = version.symbol().expect("f should be loaded");
    // SAFETY: `f`'s C signature is `int(int)`, matching the transmute target.
    let f: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(symbol.0) };
    let result = f(41);
    println!("f(41) = {result}");
    assert_eq!(result, 42);
}
