//! Scenario 5 from SPEC_FULL.md §8: multiple functions in one Version, looked up by
//! name and by index, with a miss for an unknown name.

use std::sync::Arc;

use versioning_compiler::compilers::External;
use versioning_compiler::VersionBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let work_dir = std::env::temp_dir().join("versioning_compiler_demo_multi_function");
    std::fs::create_dir_all(&work_dir).unwrap();
    let source = work_dir.join("gh.c");
    std::fs::write(
        &source,
        "int g(int x) { return x * x; }\nint h(int x) { return x * x * x; }\n",
    )
    .unwrap();

    let backend = Arc::new(External::new(
        "cc",
        &work_dir,
        work_dir.join("compile.log"),
        false,
    ));

    let mut builder = VersionBuilder::new();
    builder.set_compiler(backend).add_source_file(source);
    builder.add_function_name("g");
    builder.add_function_name("h");
    let version = builder.build();

    assert!(version.compile());

    let g_sym = version.symbol_by_name("g").expect("g should resolve");
    let h_sym = version.symbol_by_name("h").expect("h should resolve");
    assert!(version.symbol_by_name("missing").is_none());

    let g: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(g_sym.0) };
    let h: extern "C" fn(i32) -> i32 = unsafe { std::mem::transmute(h_sym.0) };
    assert_eq!(g(3), 9);
    assert_eq!(h(3), 27);
    println!("g(3) = {}, h(3) = {}", g(3), h(3));
}
