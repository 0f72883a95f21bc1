//! Generates `include/pollxhr.h` from the `extern "C"` surface.
//!
//! A header that fails to generate is reported as a cargo warning; the
//! library itself still builds.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=src/types.rs");

    let Ok(crate_dir) = env::var("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set, skipping header generation");
        return;
    };
    let include = PathBuf::from(&crate_dir).join("include");
    if let Err(e) = std::fs::create_dir_all(&include) {
        println!("cargo:warning=could not create {}: {e}", include.display());
        return;
    }
    let out = include.join("pollxhr.h");

    let generated = cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_language(cbindgen::Language::C)
        .with_include_guard("POLLXHR_H")
        .with_documentation(true)
        .with_cpp_compat(true)
        .generate();

    match generated {
        Ok(bindings) => {
            bindings.write_to_file(out);
        }
        Err(e) => println!("cargo:warning=could not generate pollxhr.h: {e}"),
    }
}
