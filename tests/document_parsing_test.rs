//! Document fixtures discovered with datatest-stable.
//!
//! Every file under `tests/testdata/valid` must load, validate and resolve
//! in each of its configurations and compile to a build file. Every file
//! under `tests/testdata/invalid` must fail, with the exit status named on
//! its first line (`# expect: <code>`).

use std::path::Path;

use grip::buildplan::BuildPlan;
use grip::descriptor::GripDescriptor;
use grip::document;
use grip::error::{Propagate, Result};

fn load_all(path: &Path) -> Result<Vec<String>> {
    let raw = document::from_file(path)?;
    let record = document::load(&raw)?;
    let root = Path::new("/workspace");
    let mut grip = GripDescriptor::build(&record, root, &Propagate)?;
    let mut build_files = Vec::new();
    for name in grip.config_names.clone() {
        let config = grip.prepare(&name, None, &Propagate)?;
        let plan = BuildPlan::compile(config, &root.join(".grip/stamps"))?;
        build_files.push(plan.to_ninja()?);
    }
    Ok(build_files)
}

fn test_valid_document(path: &Path) -> datatest_stable::Result<()> {
    let build_files =
        load_all(path).map_err(|e| format!("{} should load: {}", path.display(), e))?;
    assert!(!build_files.is_empty(), "{} has no configuration", path.display());
    for build in &build_files {
        assert!(build.contains("rule grip_stage"));
        assert!(build.contains("\ndefault "), "{} builds nothing by default", path.display());
    }
    Ok(())
}

fn test_invalid_document(path: &Path) -> datatest_stable::Result<()> {
    let content = std::fs::read_to_string(path)?;
    let expected: u8 = content
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("# expect:"))
        .ok_or_else(|| format!("{} lacks an '# expect:' line", path.display()))?
        .trim()
        .parse()?;

    match load_all(path) {
        Ok(_) => Err(format!("{} should have failed", path.display()).into()),
        Err(e) => {
            assert_eq!(
                e.exit_code(),
                expected,
                "{}: unexpected error class: {}",
                path.display(),
                e
            );
            Ok(())
        }
    }
}

datatest_stable::harness!(
    test_valid_document,
    "tests/testdata/valid",
    r".*\.yaml$",
    test_invalid_document,
    "tests/testdata/invalid",
    r".*\.yaml$"
);
