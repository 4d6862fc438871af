//! `include/leaktrack.h` has to compile in real C translation units, in
//! either include order.

use std::path::{Path, PathBuf};

fn manifest_path(rel: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn syntax_check(source: &str) {
    let compiler = cc::Build::new()
        .target(env!("LEAKTRACK_TARGET"))
        .host(env!("LEAKTRACK_HOST"))
        .opt_level(0)
        .cargo_metadata(false)
        .get_compiler();

    let output = compiler
        .to_command()
        .args(["-fsyntax-only", "-Wall", "-Werror"])
        .arg("-I")
        .arg(manifest_path("include"))
        .arg(manifest_path(source))
        .output()
        .expect("C compiler runs");
    assert!(
        output.status.success(),
        "{source} does not compile:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn redirect_header_before_stdlib() {
    syntax_check("tests/c/redirect.c");
}

#[test]
fn header_without_redirect() {
    syntax_check("tests/c/plain.c");
}
