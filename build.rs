//! Purpose: Compile the C fixture shared libraries used by the probe's tests.
//! Role: Cargo build-script; drives the `cc`-configured compiler to emit real .so/.dylib/.dll files.
//! Invariants: `cargo:rerun-if-changed` covers every fixture source and header.
//! Invariants: Exports `EPLUS_PROBE_FIXTURE_DIR` only when every fixture compiled.
//! Invariants: A missing C toolchain is a warning, never a build failure.
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const FIXTURES: &[&str] = &["probe_ok", "probe_nosym"];

fn main() {
    println!("cargo:rerun-if-changed=tests/fixtures/probe_export.h");
    for fixture in FIXTURES {
        println!("cargo:rerun-if-changed=tests/fixtures/{fixture}.c");
    }

    let target = env::var("TARGET").unwrap_or_default();
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR"));
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let source_dir = manifest_dir.join("tests").join("fixtures");
    let fixture_dir = out_dir.join("fixtures");

    if let Err(err) = fs::create_dir_all(&fixture_dir) {
        println!("cargo:warning=cannot create fixture dir {}: {err}", fixture_dir.display());
        return;
    }

    for fixture in FIXTURES {
        if let Err(err) = compile_fixture(&target, &source_dir, &fixture_dir, fixture) {
            println!(
                "cargo:warning=fixture library `{fixture}` not built ({err}); \
                 library-loading tests will be skipped"
            );
            return;
        }
    }

    println!(
        "cargo:rustc-env=EPLUS_PROBE_FIXTURE_DIR={}",
        fixture_dir.display()
    );
}

fn compile_fixture(
    target: &str,
    source_dir: &Path,
    fixture_dir: &Path,
    name: &str,
) -> Result<(), String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .warnings(false)
        .try_get_compiler()
        .map_err(|err| err.to_string())?;

    let source = source_dir.join(format!("{name}.c"));
    let output = fixture_dir.join(shared_library_name(target, name));

    let mut command = compiler.to_command();
    if compiler.is_like_msvc() {
        command
            .current_dir(fixture_dir)
            .arg("/nologo")
            .arg("/LD")
            .arg(format!("/I{}", source_dir.display()))
            .arg(&source)
            .arg(format!("/Fe{}", output.display()));
    } else {
        if target.contains("apple") {
            command.arg("-dynamiclib");
        } else {
            command.arg("-shared");
        }
        command
            .arg("-fPIC")
            .arg("-I")
            .arg(source_dir)
            .arg(&source)
            .arg("-o")
            .arg(&output);
    }

    let status = command
        .status()
        .map_err(|err| format!("failed to run compiler: {err}"))?;
    if !status.success() {
        return Err(format!("compiler exited with {status}"));
    }
    Ok(())
}

fn shared_library_name(target: &str, name: &str) -> String {
    if target.contains("windows") {
        format!("{name}.dll")
    } else if target.contains("apple") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}
