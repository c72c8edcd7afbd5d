//! Integration tests for the command-line interface

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const DIFF: &str = "\
--- a/greeting.txt
+++ b/greeting.txt
@@ -1,2 +1,2 @@
 hello
-world
+rust
";

/// Helper to create a project with one patched package
fn setup_project() -> TempDir {
    let dir = TempDir::new().unwrap();

    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(dir.path().join("lib/greeting.txt"), "hello\nworld\n").unwrap();
    fs::write(dir.path().join("fix.diff"), DIFF).unwrap();

    fs::write(
        dir.path().join("patchset.toml"),
        r#"
[[package]]
name = "vendor/lib"
version = "1.0.0"
path = "lib"

[[package]]
name = "vendor/root"
version = "1.0.0"
path = "."

[package.patches."vendor/lib"]
"1.0.0" = [{ url = "fix.diff", title = "Say rust" }]
"#,
    )
    .unwrap();

    dir
}

fn patchset(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_patchset"))
        .current_dir(dir)
        .env_remove("PATCHSET_MANIFEST")
        .env_remove("PATCHSET_PATCH_BIN")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run patchset binary")
}

fn has_patch_tool() -> bool {
    let found = patchset::PatchTool::new().program().is_ok();
    if !found {
        eprintln!("skipping: patch executable not found");
    }
    found
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = patchset(dir.path(), &["--help"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("apply"));
    assert!(stdout.contains("restore"));
    assert!(stdout.contains("list"));
}

#[test]
fn test_cli_missing_manifest() {
    let dir = TempDir::new().unwrap();
    let output = patchset(dir.path(), &["apply"]);
    assert!(!output.status.success());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Manifest not found"));
}

#[test]
fn test_cli_list() {
    let dir = setup_project();
    let output = patchset(dir.path(), &["list", "vendor/lib"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("vendor/root"));
    assert!(stdout.contains("Say rust"));
    assert!(stdout.contains("greeting.txt"));
}

#[test]
fn test_cli_manifest_flag() {
    let dir = setup_project();
    let elsewhere = TempDir::new().unwrap();
    let manifest = dir.path().join("patchset.toml");
    let output = patchset(
        elsewhere.path(),
        &["--manifest", manifest.to_str().unwrap(), "list", "vendor/lib"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Say rust"));
}

#[test]
fn test_cli_unknown_package() {
    let dir = setup_project();
    let output = patchset(dir.path(), &["list", "vendor/nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not installed"));
}

#[test]
fn test_cli_apply_and_restore() {
    if !has_patch_tool() {
        return;
    }
    let dir = setup_project();
    let greeting = dir.path().join("lib/greeting.txt");

    let output = patchset(dir.path(), &["apply"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Summary:"));
    assert_eq!(fs::read_to_string(&greeting).unwrap(), "hello\nrust\n");

    let output = patchset(dir.path(), &["restore", "vendor/lib"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(fs::read_to_string(&greeting).unwrap(), "hello\nworld\n");
}

#[test]
fn test_cli_missing_patch_bin() {
    let dir = setup_project();
    let output = patchset(
        dir.path(),
        &["--patch-bin", "/nonexistent/patch", "apply"],
    );
    assert!(!output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("lib/greeting.txt")).unwrap(),
        "hello\nworld\n"
    );
}
