//! # Environment Resolver
//!
//! Environment scopes form a tree: the workspace root, one scope per
//! configuration, repository and stage. Each scope maps keys to raw strings
//! that may reference other keys as `@NAME@`; `@@` stands for a literal `@`.
//! A child scope's key shadows the same key in any ancestor.
//!
//! Scopes live in an [`EnvTree`] arena and are addressed by [`ScopeId`], so
//! descriptors hold plain ids instead of shared pointers.
//!
//! ## Resolution
//!
//! Resolving a scope first resolves its ancestors. References are then
//! looked up in the process override table (when one is supplied), the scope
//! itself, and finally the ancestor chain. Local keys are substituted only
//! once they are *stable* (free of references to other local keys), so the
//! result does not depend on insertion order. When a whole pass makes no
//! progress, the remaining keys reference each other: the first one is
//! reported as a circular dependency through the [`ErrorHandler`]. A final
//! pass turns every value into plain text and reports references that are
//! missing everywhere; replacement values chosen by the handler are added to
//! the scope so that later keys see them too.

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};

use crate::error::{raise, Error, ErrorHandler, Result};
use crate::schema::Record;

/// Handle to a scope inside an [`EnvTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(usize);

/// Process-wide values consulted before any scope.
pub type Overrides = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct Scope {
    name: String,
    parent: Option<ScopeId>,
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
    resolved: bool,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// This scope's own value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    /// This scope's own entries in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    fn set(&mut self, key: &str, value: String) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), value));
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EnvTree {
    scopes: Vec<Scope>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Text(&'a str),
    At,
    Ref(&'a str),
}

fn is_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Split `text` into literal runs, `@@` escapes and `@NAME@` references.
/// An `@` that starts neither form is literal text.
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'@' {
            i += 1;
            continue;
        }
        if bytes.get(i + 1) == Some(&b'@') {
            if start < i {
                tokens.push(Token::Text(&text[start..i]));
            }
            tokens.push(Token::At);
            i += 2;
            start = i;
            continue;
        }
        let rest = &text[i + 1..];
        if let Some(end) = rest.find('@') {
            let name = &rest[..end];
            if is_name(name) {
                if start < i {
                    tokens.push(Token::Text(&text[start..i]));
                }
                tokens.push(Token::Ref(name));
                i += end + 2;
                start = i;
                continue;
            }
        }
        i += 1;
    }
    if start < bytes.len() {
        tokens.push(Token::Text(&text[start..]));
    }
    tokens
}

/// Escape a literal so it survives further substitution passes.
fn escape(literal: &str) -> String {
    literal.replace('@', "@@")
}

/// Rewrite `text` so that every `@` is either escaped or part of a reference.
fn canonical(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .map(|token| match token {
            Token::Text(t) => escape(t),
            Token::At => "@@".to_string(),
            Token::Ref(name) => format!("@{}@", name),
        })
        .collect()
}

/// Names referenced by `text`.
pub fn references(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter_map(|token| match token {
            Token::Ref(name) => Some(name.to_string()),
            _ => None,
        })
        .collect()
}

/// Working state for resolving one scope.
struct Pass {
    values: Vec<(String, String)>,
    index: HashMap<String, usize>,
    stable: Vec<bool>,
    finals: Vec<Option<String>>,
}

impl EnvTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty scope.
    pub fn add_scope(&mut self, name: impl Into<String>, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            name: name.into(),
            parent,
            entries: Vec::new(),
            index: HashMap::new(),
            resolved: false,
        });
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Set a raw value. A later `add` of the same key replaces the value and
    /// keeps its original position.
    pub fn add(&mut self, id: ScopeId, key: &str, raw: &str) -> Result<()> {
        let scope = &mut self.scopes[id.0];
        if scope.resolved {
            return Err(Error::internal(format!(
                "cannot add '{}' to already resolved scope {}",
                key, scope.name
            )));
        }
        scope.set(key, raw.to_string());
        Ok(())
    }

    /// Import every string-valued wildcard entry of `record`.
    pub fn add_record(&mut self, id: ScopeId, record: &Record) -> Result<()> {
        for (key, value) in record.dynamic_strings() {
            self.add(id, key, value)?;
        }
        Ok(())
    }

    /// Copy the raw entries of `from` into `to`.
    pub fn copy_entries(&mut self, from: ScopeId, to: ScopeId) -> Result<()> {
        let entries = self.scopes[from.0].entries.clone();
        for (key, value) in entries {
            self.add(to, &key, &value)?;
        }
        Ok(())
    }

    /// Value of `key` visible from scope `id`, searching the ancestor chain.
    pub fn lookup(&self, id: ScopeId, key: &str) -> Option<&str> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.scopes[scope_id.0];
            if let Some(value) = scope.get(key) {
                return Some(value);
            }
            current = scope.parent;
        }
        None
    }

    fn lookup_parent(&self, id: ScopeId, key: &str) -> Option<&str> {
        self.scopes[id.0]
            .parent
            .and_then(|parent| self.lookup(parent, key))
    }

    /// Resolve scope `id` and its ancestors.
    ///
    /// After success every value of the scope is plain text.
    pub fn resolve(
        &mut self,
        id: ScopeId,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<()> {
        if self.scopes[id.0].resolved {
            return Ok(());
        }
        if let Some(parent) = self.scopes[id.0].parent {
            self.resolve(parent, overrides, handler)?;
        }

        let scope = &self.scopes[id.0];
        debug!("resolving environment {} ({} keys)", scope.name, scope.entries.len());
        let values: Vec<(String, String)> = scope
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), canonical(v)))
            .collect();
        let count = values.len();
        let mut pass = Pass {
            values,
            index: scope.index.clone(),
            stable: vec![false; count],
            finals: vec![None; count],
        };

        self.stabilize(id, &mut pass, overrides, handler)?;
        self.finalize(id, &mut pass, overrides, handler)?;

        let scope = &mut self.scopes[id.0];
        scope.entries = pass
            .values
            .into_iter()
            .zip(pass.finals)
            .map(|((key, raw), value)| (key, value.unwrap_or(raw)))
            .collect();
        scope.index = pass.index;
        scope.resolved = true;
        Ok(())
    }

    /// Substitute until every local key is stable, reporting cycles.
    fn stabilize(
        &self,
        id: ScopeId,
        pass: &mut Pass,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<()> {
        let mut pending: Vec<usize> = (0..pass.values.len()).collect();
        let mut round = 0;
        while !pending.is_empty() {
            round += 1;
            let mut progress = false;
            for &i in &pending {
                let (next, blocked) = self.substitute(id, pass, &pass.values[i].1, overrides);
                if next != pass.values[i].1 {
                    pass.values[i].1 = next;
                    progress = true;
                }
                if !blocked {
                    pass.stable[i] = true;
                    progress = true;
                }
            }
            pending.retain(|&i| !pass.stable[i]);
            trace!("round {}: {} keys pending", round, pending.len());

            if !progress {
                let first = pending[0];
                let key = pass.values[first].0.clone();
                let through: Vec<String> = references(&pass.values[first].1)
                    .into_iter()
                    .filter(|name| pass.index.contains_key(name))
                    .collect();
                let error = Error::EnvironmentResolution {
                    scope: self.scopes[id.0].name.clone(),
                    key,
                    message: format!("circular dependency through {}", through.join(", ")),
                };
                let replacement = raise(handler, error)?;
                pass.values[first].1 = escape(&replacement);
                pass.stable[first] = true;
                pending.remove(0);
            }
        }
        Ok(())
    }

    /// One non-finalizing substitution of `text`. Returns the new text and
    /// whether it still references a local key that is not yet stable.
    fn substitute(
        &self,
        id: ScopeId,
        pass: &Pass,
        text: &str,
        overrides: Option<&Overrides>,
    ) -> (String, bool) {
        let mut out = String::with_capacity(text.len());
        let mut blocked = false;
        for token in tokenize(text) {
            match token {
                Token::Text(t) => out.push_str(&escape(t)),
                Token::At => out.push_str("@@"),
                Token::Ref(name) => {
                    if let Some(value) = overrides.and_then(|o| o.get(name)) {
                        out.push_str(&escape(value));
                    } else if let Some(&j) = pass.index.get(name) {
                        if pass.stable[j] {
                            out.push_str(&pass.values[j].1);
                        } else {
                            blocked = true;
                            out.push_str(&format!("@{}@", name));
                        }
                    } else if let Some(value) = self.lookup_parent(id, name) {
                        out.push_str(&escape(value));
                    } else {
                        // Deferred: surfaced by the final pass.
                        out.push_str(&format!("@{}@", name));
                    }
                }
            }
        }
        (out, blocked)
    }

    /// Produce plain text for every key, including keys injected by the
    /// handler while this pass runs.
    fn finalize(
        &self,
        id: ScopeId,
        pass: &mut Pass,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<()> {
        let mut i = 0;
        while i < pass.values.len() {
            if pass.finals[i].is_none() {
                let key = pass.values[i].0.clone();
                let raw = pass.values[i].1.clone();
                let value = self.finalize_text(id, pass, &key, &raw, overrides, handler)?;
                pass.finals[i] = Some(value);
            }
            i += 1;
        }
        Ok(())
    }

    fn finalize_text(
        &self,
        id: ScopeId,
        pass: &mut Pass,
        key: &str,
        text: &str,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        for token in tokenize(text) {
            match token {
                Token::Text(t) => out.push_str(t),
                Token::At => out.push('@'),
                Token::Ref(name) => {
                    if let Some(value) = overrides.and_then(|o| o.get(name)) {
                        out.push_str(value);
                    } else if let Some(&j) = pass.index.get(name) {
                        let value = match &pass.finals[j] {
                            Some(value) => value.clone(),
                            None => {
                                if j == pass.index[key] {
                                    return Err(Error::internal(format!(
                                        "'{}' still references itself after stabilization",
                                        key
                                    )));
                                }
                                let raw = pass.values[j].1.clone();
                                let value =
                                    self.finalize_text(id, pass, name, &raw, overrides, handler)?;
                                pass.finals[j] = Some(value.clone());
                                value
                            }
                        };
                        out.push_str(&value);
                    } else if let Some(value) = self.lookup_parent(id, name) {
                        out.push_str(value);
                    } else {
                        let error = Error::EnvironmentResolution {
                            scope: self.scopes[id.0].name.clone(),
                            key: key.to_string(),
                            message: format!("undefined reference '@{}@'", name),
                        };
                        let replacement = raise(handler, error)?;
                        pass.index.insert(name.to_string(), pass.values.len());
                        pass.values.push((name.to_string(), escape(&replacement)));
                        pass.stable.push(true);
                        pass.finals.push(Some(replacement.clone()));
                        out.push_str(&replacement);
                    }
                }
            }
        }
        Ok(out)
    }

    /// Substitute a template against a resolved scope, e.g. a repository URL
    /// or a stage command. `what` names the template in error messages.
    pub fn expand(
        &self,
        id: ScopeId,
        what: &str,
        template: &str,
        overrides: Option<&Overrides>,
        handler: &dyn ErrorHandler,
    ) -> Result<String> {
        let scope = &self.scopes[id.0];
        if !scope.resolved {
            return Err(Error::internal(format!(
                "expanding '{}' in unresolved scope {}",
                what, scope.name
            )));
        }
        let mut out = String::with_capacity(template.len());
        for token in tokenize(template) {
            match token {
                Token::Text(t) => out.push_str(t),
                Token::At => out.push('@'),
                Token::Ref(name) => {
                    if let Some(value) = overrides.and_then(|o| o.get(name)) {
                        out.push_str(value);
                    } else if let Some(value) = self.lookup(id, name) {
                        out.push_str(value);
                    } else {
                        let error = Error::EnvironmentResolution {
                            scope: scope.name.clone(),
                            key: what.to_string(),
                            message: format!("undefined reference '@{}@'", name),
                        };
                        out.push_str(&raise(handler, error)?);
                    }
                }
            }
        }
        Ok(out)
    }

    fn chain(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut chain = vec![id];
        let mut current = self.scopes[id.0].parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.scopes[parent.0].parent;
        }
        chain.reverse();
        chain
    }

    /// Flattened key/value pairs. With `include_ancestors`, ancestors come
    /// first and a descendant's value replaces an ancestor's in place.
    pub fn as_ordered_pairs(&self, id: ScopeId, include_ancestors: bool) -> Vec<(String, String)> {
        let chain = if include_ancestors {
            self.chain(id)
        } else {
            vec![id]
        };
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for scope_id in chain {
            for (key, value) in &self.scopes[scope_id.0].entries {
                match positions.get(key) {
                    Some(&i) => pairs[i].1 = value.clone(),
                    None => {
                        positions.insert(key.clone(), pairs.len());
                        pairs.push((key.clone(), value.clone()));
                    }
                }
            }
        }
        pairs
    }

    pub fn as_map(&self, id: ScopeId, include_ancestors: bool) -> BTreeMap<String, String> {
        self.as_ordered_pairs(id, include_ancestors)
            .into_iter()
            .collect()
    }
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Render pairs as shell `export` statements.
pub fn to_shell_exports(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("export {}={}\n", key, shell_quote(value)))
        .collect()
}

/// Render pairs as ninja variable assignments.
pub fn to_ninja_assignments(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{} = {}\n", key, crate::buildplan::escape_value(value)))
        .collect()
}
