//! End-to-end tests for CLI exit codes.
//!
//! Every error class has its own exit status:
//!
//! - 0: success
//! - 1: anything unclassified (I/O, git, ninja)
//! - 2: invalid command-line usage (handled by clap)
//! - 3: schema, 4: configuration, 5: repository descriptor,
//!   6: environment resolution, 7: workflow, 8: refused user request
//! - 70: internal error

mod common;
use common::prelude::*;

#[test]
fn test_exit_code_success() {
    let fixture = GripFixture::new().with_document(documents::MINIMAL);
    fixture.command().arg("validate").assert().code(0);
}

#[test]
fn test_exit_code_help_and_version() {
    let fixture = GripFixture::new();
    fixture.command().arg("--help").assert().code(0);
    fixture.command().arg("--version").assert().code(0);
}

#[test]
fn test_exit_code_usage_error() {
    let fixture = GripFixture::new().with_document(documents::MINIMAL);
    fixture.command().arg("frobnicate").assert().code(2);
    fixture.command().arg("commit").assert().code(2);
}

#[test]
fn test_exit_code_schema_error() {
    let fixture = GripFixture::new().with_document("name: bad\nbogus: 1\n");
    fixture
        .command()
        .arg("validate")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("bogus"));
}

#[test]
fn test_exit_code_missing_default_config() {
    let fixture = GripFixture::new().with_document(documents::MISSING_DEFAULT);
    fixture
        .command()
        .arg("validate")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("prod"));
}

#[test]
fn test_exit_code_stage_cycle() {
    let fixture = GripFixture::new().with_document(documents::CYCLE);
    fixture
        .command()
        .arg("validate")
        .assert()
        .code(4)
        .stdout(predicate::str::contains("cycle"));
}

#[test]
fn test_exit_code_unknown_workflow() {
    let fixture = GripFixture::new().with_document(
        r#"
name: wf
repo:
  core: {url: https://example.com/core.git, workflow: bogus}
"#,
    );
    fixture.command().arg("validate").assert().code(5);
}

#[test]
fn test_exit_code_undefined_reference() {
    let fixture = GripFixture::new().with_document(documents::UNDEFINED_REFERENCE);
    fixture
        .command()
        .arg("env")
        .assert()
        .code(6)
        .stderr(predicate::str::contains("NOWHERE"));
}

#[test]
fn test_exit_code_reconfigure_refused() {
    let fixture = GripFixture::new().with_document(documents::SCENARIO);
    fixture
        .command()
        .args(["configure", "ci", "--no-checkout"])
        .assert()
        .code(0);
    fixture
        .command()
        .args(["configure", "dev", "--no-checkout"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("--force"));
    fixture
        .command()
        .args(["configure", "dev", "--no-checkout", "--force"])
        .assert()
        .code(0);
}

#[test]
fn test_exit_code_outside_workspace() {
    let fixture = GripFixture::new();
    fixture
        .command()
        .arg("status")
        .assert()
        .code(8)
        .stderr(predicate::str::contains("no grip workspace"));
}
