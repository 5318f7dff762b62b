//! Merging a repository's own `grip.yaml` fragment into the workspace
//! document.
//!
//! For keys present on both sides: strings concatenate, lists extend and
//! mappings merge shallowly (the fragment's entries replace same-named
//! entries). Other scalars of the same type are replaced by the fragment's
//! value. Any other combination is a configuration error.

use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{raise, Error, ErrorHandler, Result};

fn kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "boolean",
        YamlValue::Number(_) => "number",
        YamlValue::String(_) => "string",
        YamlValue::Sequence(_) => "list",
        YamlValue::Mapping(_) => "mapping",
        YamlValue::Tagged(_) => "tagged value",
    }
}

fn mismatch(path: &str, base: &YamlValue, fragment: &YamlValue) -> Error {
    Error::Configuration {
        message: format!(
            "cannot merge {} into {} at '{}'",
            kind(fragment),
            kind(base),
            path
        ),
        hint: Some("The repository's grip.yaml must use the same value types as the workspace document".to_string()),
    }
}

/// Combine two values found under the same key.
///
/// A type mismatch goes through `handler`; on recovery the base value is
/// kept.
pub fn merge_values(
    base: &YamlValue,
    fragment: &YamlValue,
    path: &str,
    handler: &dyn ErrorHandler,
) -> Result<YamlValue> {
    match (base, fragment) {
        (YamlValue::Null, other) | (other, YamlValue::Null) => Ok(other.clone()),
        (YamlValue::String(a), YamlValue::String(b)) => Ok(YamlValue::String(format!("{}{}", a, b))),
        (YamlValue::Sequence(a), YamlValue::Sequence(b)) => {
            Ok(YamlValue::Sequence(a.iter().chain(b).cloned().collect()))
        }
        (YamlValue::Mapping(a), YamlValue::Mapping(b)) => {
            let mut merged = a.clone();
            for (key, value) in b {
                merged.insert(key.clone(), value.clone());
            }
            Ok(YamlValue::Mapping(merged))
        }
        (YamlValue::Bool(_), YamlValue::Bool(_)) | (YamlValue::Number(_), YamlValue::Number(_)) => {
            Ok(fragment.clone())
        }
        _ => {
            raise(handler, mismatch(path, base, fragment))?;
            Ok(base.clone())
        }
    }
}

/// Merge `fragment` into `repo.<name>` of the raw workspace document.
///
/// If the fragment or the document has the wrong shape to merge at all,
/// the error goes through `handler` and, on recovery, the fragment is
/// ignored.
pub fn merge_repo_fragment(
    root: &mut YamlValue,
    name: &str,
    fragment: &YamlValue,
    handler: &dyn ErrorHandler,
) -> Result<()> {
    let skip = |error: Error| raise(handler, error).map(|_| ());
    let fragment = match fragment {
        YamlValue::Null => return Ok(()),
        YamlValue::Mapping(m) => m,
        other => return skip(mismatch(&format!("repo.{}", name), &YamlValue::Mapping(Mapping::new()), other)),
    };

    if root.is_null() {
        *root = YamlValue::Mapping(Mapping::new());
    }
    let root_map = match root {
        YamlValue::Mapping(m) => m,
        other => return skip(mismatch("<root>", other, &YamlValue::Mapping(fragment.clone()))),
    };

    let repos = root_map
        .entry(YamlValue::String("repo".to_string()))
        .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
    if repos.is_null() {
        *repos = YamlValue::Mapping(Mapping::new());
    }
    let repos = match repos {
        YamlValue::Mapping(m) => m,
        other => return skip(mismatch("repo", other, &YamlValue::Mapping(Mapping::new()))),
    };

    let entry = repos
        .entry(YamlValue::String(name.to_string()))
        .or_insert_with(|| YamlValue::Mapping(Mapping::new()));
    if entry.is_null() {
        *entry = YamlValue::Mapping(Mapping::new());
    }
    let entry = match entry {
        YamlValue::Mapping(m) => m,
        other => return skip(mismatch(&format!("repo.{}", name), other, &YamlValue::Mapping(fragment.clone()))),
    };

    for (key, value) in fragment {
        let key_name = key.as_str().unwrap_or("?");
        let path = format!("repo.{}.{}", name, key_name);
        let merged = match entry.get(key) {
            Some(existing) => merge_values(existing, value, &path, handler)?,
            None => value.clone(),
        };
        entry.insert(key.clone(), merged);
    }
    Ok(())
}
