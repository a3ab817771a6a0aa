/*
 * cli.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests running the stencil binary.
 */

use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output};

fn stencil(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stencil"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to run stencil")
}

fn store_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("stencil-render")
        .join("test-fixtures")
        .join("store.json")
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).expect("stdout is UTF-8")
}

#[test]
fn test_render_prints_json_results() {
    let mut template = tempfile::NamedTempFile::new().unwrap();
    write!(template, "${{object.name}} for ${{object.partner_id.name}}").unwrap();
    let store = store_fixture();

    let output = stencil(&[
        "render",
        "--store",
        store.to_str().unwrap(),
        "--model",
        "sale.order",
        "--ids",
        "[12, 11]",
        "--template",
        template.path().to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{output:?}");

    let results: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(
        results,
        serde_json::json!({
            "11": "S00011 for Deco Addict",
            "12": "S00012 for Azure Interior"
        })
    );
}

#[test]
fn test_render_rejects_private_fields() {
    let mut template = tempfile::NamedTempFile::new().unwrap();
    write!(template, "${{object.access_token}}").unwrap();
    let store = store_fixture();

    let output = stencil(&[
        "render",
        "--store",
        store.to_str().unwrap(),
        "--model",
        "sale.order",
        "--ids",
        "[11]",
        "--template",
        template.path().to_str().unwrap(),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to render template"));
}

#[test]
fn test_placeholder() {
    let output = stencil(&[
        "placeholder",
        "partner_id",
        "--sub-field",
        "email",
        "--default",
        "n/a",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "${object.partner_id.email or '''n/a'''}\n");
}

#[test]
fn test_fields_hides_private_fields() {
    let store = store_fixture();
    let output = stencil(&[
        "fields",
        "--store",
        store.to_str().unwrap(),
        "--model",
        "res.partner",
    ]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout(&output), "name\tchar\nemail\tchar\nlang\tselection\n");
}
