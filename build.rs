use std::env;

fn main() {
    // `tests/c_header.rs` drives the C compiler through `cc`, which needs to
    // know what it's compiling for.
    for var in ["TARGET", "HOST"] {
        if let Ok(value) = env::var(var) {
            println!("cargo:rustc-env=LEAKTRACK_{var}={value}");
        }
    }
    println!("cargo:rerun-if-changed=build.rs");
}
