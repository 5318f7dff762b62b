//! End-to-end tests for the `make`, `status` and `configure` commands that
//! do not need a remote repository.

#[allow(dead_code)]
mod common;
use common::prelude::*;

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_make_generate_only_writes_build_file() {
    let fixture = GripFixture::new().with_document(documents::SCENARIO);
    fixture
        .command()
        .args(["make", "--generate-only"])
        .assert()
        .success()
        .stdout(predicate::str::contains("build.ninja"));

    let build = fixture.child(".grip/build.ninja");
    build.assert(predicate::str::contains("rule grip_stage"));
    build.assert(predicate::str::contains("build core.build: phony"));
    build.assert(predicate::str::contains("build revoke.core.build: grip_revoke"));
    build.assert(predicate::str::contains("build force.core.build: grip_force"));
    build.assert(predicate::str::contains("build all: grip_action"));
    fixture.child(".grip/stamps/core").assert(predicate::path::is_dir());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_make_keeps_stamps_when_unchanged() {
    let fixture = GripFixture::new().with_document(documents::MINIMAL);
    fixture
        .command()
        .args(["make", "--generate-only"])
        .assert()
        .success();
    let stamp = fixture.child(".grip/stamps/core/build.stamp");
    stamp.touch().unwrap();

    fixture
        .command()
        .args(["make", "--generate-only"])
        .assert()
        .success();
    stamp.assert(predicate::path::exists());

    fixture
        .command()
        .args(["make", "--generate-only", "--regenerate"])
        .assert()
        .success();
    stamp.assert(predicate::path::missing());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_make_unknown_target() {
    GripFixture::new()
        .with_document(documents::MINIMAL)
        .command()
        .args(["make", "--generate-only", "core.biuld"])
        .assert()
        .code(8)
        .stderr(predicate::str::contains("Did you mean 'core.build'?"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_make_runs_build_tool() {
    let fixture = GripFixture::new().with_document(documents::MINIMAL);
    fixture
        .command()
        .args(["make", "--ninja", "echo", "revoke.core.test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-f"))
        .stdout(predicate::str::contains("revoke.core.test"));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_status_without_checkouts() {
    GripFixture::new()
        .with_document(documents::SCENARIO)
        .command()
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"repo\": \"core\""))
        .stdout(predicate::str::contains("\"checked_out\": false"))
        .stdout(predicate::str::contains("\"workflow\": \"single\""));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_configure_records_selection() {
    let fixture = GripFixture::new().with_document(documents::SCENARIO);
    fixture
        .command()
        .args(["configure", "ci", "--no-checkout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("configured as 'ci'"));
    fixture
        .child(".grip/local.yaml")
        .assert(predicate::str::contains("config: ci"));
    fixture
        .child(".grip/build.ninja")
        .assert(predicate::str::contains("configuration 'ci'"));

    fixture
        .command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration: ci"))
        .stdout(predicate::str::contains("tools"));
}
