//! # Schema Loader
//!
//! Validates a raw YAML tree against a declarative [`Schema`] and produces a
//! typed [`Record`] tree.
//!
//! A schema is a list of named fixed attributes, each with a [`ValueKind`],
//! plus an optional wildcard kind applied to every key that is not a fixed
//! attribute. Loading a mapping yields a record that exposes each fixed
//! attribute's value (or nothing when absent) and the wildcard-matched keys
//! in the order they were declared in the input.
//!
//! ```
//! use grip::schema::{self, Schema, ValueKind};
//!
//! let schema = Schema::new()
//!     .fixed("url", ValueKind::str())
//!     .fixed("shallow", ValueKind::bool())
//!     .wildcard(ValueKind::str());
//! let raw: serde_yaml::Value = serde_yaml::from_str("url: x\nFOO: bar\n").unwrap();
//! let record = schema::load(&schema, &raw).unwrap();
//! assert_eq!(record.str("url"), Some("x"));
//! assert_eq!(record.bool("shallow"), None);
//! assert_eq!(record.dynamic().len(), 1);
//! ```

use serde_yaml::{Mapping, Value as YamlValue};

use crate::error::{raise, Error, ErrorHandler, Propagate, Result};

/// Type of a scalar attribute or list element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Str,
    Bool,
    Int,
}

/// Declared type of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Scalar(ScalarKind),
    List(ScalarKind),
    Nested(Box<Schema>),
}

impl ValueKind {
    pub fn str() -> Self {
        ValueKind::Scalar(ScalarKind::Str)
    }

    pub fn bool() -> Self {
        ValueKind::Scalar(ScalarKind::Bool)
    }

    pub fn int() -> Self {
        ValueKind::Scalar(ScalarKind::Int)
    }

    pub fn str_list() -> Self {
        ValueKind::List(ScalarKind::Str)
    }

    pub fn nested(schema: Schema) -> Self {
        ValueKind::Nested(Box::new(schema))
    }
}

/// A set of fixed attributes plus an optional wildcard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fixed: Vec<(String, ValueKind)>,
    wildcard: Option<Box<ValueKind>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fixed attribute.
    pub fn fixed(mut self, name: &str, kind: ValueKind) -> Self {
        self.fixed.push((name.to_string(), kind));
        self
    }

    /// Declare the kind applied to every key that is not a fixed attribute.
    pub fn wildcard(mut self, kind: ValueKind) -> Self {
        self.wildcard = Some(Box::new(kind));
        self
    }

    pub fn is_fixed(&self, name: &str) -> bool {
        self.fixed.iter().any(|(n, _)| n == name)
    }
}

/// A parsed scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    fn to_yaml(&self) -> YamlValue {
        match self {
            Scalar::Str(s) => YamlValue::String(s.clone()),
            Scalar::Bool(b) => YamlValue::Bool(*b),
            Scalar::Int(i) => YamlValue::Number((*i).into()),
        }
    }
}

/// A parsed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Scalar>),
    Record(Record),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    fn to_yaml(&self) -> YamlValue {
        match self {
            Value::Scalar(s) => s.to_yaml(),
            Value::List(items) => YamlValue::Sequence(items.iter().map(Scalar::to_yaml).collect()),
            Value::Record(r) => r.to_yaml(),
        }
    }
}

/// The typed result of loading a mapping against a [`Schema`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fixed: Vec<(String, Option<Value>)>,
    dynamic: Vec<(String, Value)>,
}

impl Record {
    /// The value of a fixed attribute, `None` when absent or undeclared.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fixed
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(Value::Scalar(Scalar::Bool(b))) => Some(*b),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Scalar(Scalar::Int(i))) => Some(*i),
            _ => None,
        }
    }

    /// A string list attribute as owned strings.
    pub fn str_list(&self, name: &str) -> Option<Vec<String>> {
        match self.get(name) {
            Some(Value::List(items)) => Some(
                items
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.get(name).and_then(Value::as_record)
    }

    /// Wildcard-matched entries in input declaration order.
    pub fn dynamic(&self) -> &[(String, Value)] {
        &self.dynamic
    }

    /// A wildcard entry by key.
    pub fn dynamic_entry(&self, key: &str) -> Option<&Value> {
        self.dynamic.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Wildcard entries whose values are strings.
    pub fn dynamic_strings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.dynamic
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
    }

    /// Re-emit this record as a YAML mapping: fixed attributes in schema
    /// order, then wildcard entries in their original order.
    pub fn to_yaml(&self) -> YamlValue {
        let mut map = Mapping::new();
        for (name, value) in &self.fixed {
            if let Some(value) = value {
                map.insert(YamlValue::String(name.clone()), value.to_yaml());
            }
        }
        for (key, value) in &self.dynamic {
            map.insert(YamlValue::String(key.clone()), value.to_yaml());
        }
        YamlValue::Mapping(map)
    }
}

/// Load `raw` against `schema`, failing on the first problem.
///
/// A null document is treated as an empty mapping.
pub fn load(schema: &Schema, raw: &YamlValue) -> Result<Record> {
    load_with(schema, raw, &Propagate)
}

/// Load `raw` against `schema`, routing each problem through `handler`.
///
/// When the handler recovers, the offending entry is dropped: an
/// unexpected key or a mistyped wildcard entry is skipped, a mistyped
/// fixed attribute reads as absent and a mistyped list element is left
/// out of its list.
pub fn load_with(schema: &Schema, raw: &YamlValue, handler: &dyn ErrorHandler) -> Result<Record> {
    Loader { handler }.mapping(schema, raw, "")
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn schema_error(path: &str, message: impl Into<String>) -> Error {
    Error::Schema {
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.to_string()
        },
        message: message.into(),
    }
}

struct Loader<'a> {
    handler: &'a dyn ErrorHandler,
}

impl Loader<'_> {
    /// Raise a schema error; `Ok` means the caller should skip the entry.
    fn reject(&self, path: &str, message: impl Into<String>) -> Result<()> {
        raise(self.handler, schema_error(path, message)).map(|_| ())
    }

    fn mapping(&self, schema: &Schema, raw: &YamlValue, path: &str) -> Result<Record> {
        let empty = Mapping::new();
        let map = match raw {
            YamlValue::Mapping(m) => m,
            YamlValue::Null => &empty,
            other => {
                self.reject(path, format!("expected a mapping, found {}", describe(other)))?;
                &empty
            }
        };

        let mut record = Record::default();
        for (name, kind) in &schema.fixed {
            let value = match map.get(YamlValue::String(name.clone())) {
                None | Some(YamlValue::Null) => None,
                Some(v) => self.value(kind, v, &join(path, name))?,
            };
            record.fixed.push((name.clone(), value));
        }

        for (key, value) in map {
            let key = match key {
                YamlValue::String(s) => s,
                other => {
                    self.reject(path, format!("keys must be strings, found {}", describe(other)))?;
                    continue;
                }
            };
            if schema.is_fixed(key) {
                continue;
            }
            let key_path = join(path, key);
            match &schema.wildcard {
                Some(kind) => {
                    if let Some(value) = self.value(kind, value, &key_path)? {
                        record.dynamic.push((key.clone(), value));
                    }
                }
                None => self.reject(&key_path, "unexpected key")?,
            }
        }

        Ok(record)
    }

    /// `None` when the value was rejected and the handler recovered.
    fn value(&self, kind: &ValueKind, raw: &YamlValue, path: &str) -> Result<Option<Value>> {
        match kind {
            ValueKind::Scalar(scalar) => Ok(self.scalar(*scalar, raw, path)?.map(Value::Scalar)),
            ValueKind::List(scalar) => match raw {
                YamlValue::Sequence(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        if let Some(value) = self.scalar(*scalar, item, &format!("{}[{}]", path, i))? {
                            list.push(value);
                        }
                    }
                    Ok(Some(Value::List(list)))
                }
                other => {
                    self.reject(path, format!("expected a list, found {}", describe(other)))?;
                    Ok(None)
                }
            },
            ValueKind::Nested(schema) => Ok(Some(Value::Record(self.mapping(schema, raw, path)?))),
        }
    }

    fn scalar(&self, kind: ScalarKind, raw: &YamlValue, path: &str) -> Result<Option<Scalar>> {
        let scalar = match (kind, raw) {
            (ScalarKind::Str, YamlValue::String(s)) => Scalar::Str(s.clone()),
            // Unquoted numbers and booleans are accepted where text is expected.
            (ScalarKind::Str, YamlValue::Number(n)) => Scalar::Str(n.to_string()),
            (ScalarKind::Str, YamlValue::Bool(b)) => Scalar::Str(b.to_string()),
            (ScalarKind::Bool, YamlValue::Bool(b)) => Scalar::Bool(*b),
            (ScalarKind::Int, YamlValue::Number(n)) if n.is_i64() => {
                Scalar::Int(n.as_i64().unwrap_or_default())
            }
            (kind, other) => {
                self.reject(path, format!("expected {}, found {}", expected(kind), describe(other)))?;
                return Ok(None);
            }
        };
        Ok(Some(scalar))
    }
}

fn expected(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Str => "a string",
        ScalarKind::Bool => "a boolean",
        ScalarKind::Int => "an integer",
    }
}

fn describe(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a boolean",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a list",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}
