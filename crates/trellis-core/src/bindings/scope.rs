//! Name tree mapping dotted scope paths to bindings and host values

use std::collections::BTreeMap;

use tracing::trace;

use crate::expr::Value;

#[derive(Debug, Clone, PartialEq)]
enum ScopeEntry {
    Binding(String),
    Value(Value),
    Namespace(ScopeTree),
}

/// What a path prefix refers to
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Found<'a> {
    Binding(&'a str),
    Value(&'a Value),
    /// An intermediate name, such as `text1` for the binding `text1.value`
    Namespace(&'a ScopeTree),
    /// A name missing from a known namespace; reads as `undefined`
    Missing,
}

/// Hierarchical index of the live scope. `text1.value` registered as a
/// binding makes `text1` a namespace with a `value` member.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopeTree {
    entries: BTreeMap<String, ScopeEntry>,
}

impl ScopeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose a host value under a top-level name
    pub fn insert_value(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_string(), ScopeEntry::Value(value));
    }

    /// Expose binding `id` under the dotted `path`
    pub fn insert_binding(&mut self, path: &str, id: &str) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(leaf) = segments.pop() else {
            return;
        };
        let mut tree = self;
        for segment in segments {
            let entry = tree
                .entries
                .entry(segment.to_string())
                .or_insert_with(|| ScopeEntry::Namespace(ScopeTree::new()));
            if !matches!(entry, ScopeEntry::Namespace(_)) {
                trace!(path, segment, "binding path shadows a scope value");
                *entry = ScopeEntry::Namespace(expand(entry));
            }
            tree = match entry {
                ScopeEntry::Namespace(child) => child,
                _ => return,
            };
        }
        tree.entries
            .insert(leaf.to_string(), ScopeEntry::Binding(id.to_string()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Walk `path` as far as the tree goes.
    ///
    /// Returns `None` when the first segment is unknown. Otherwise returns
    /// what was found and how many segments it accounts for.
    pub(crate) fn walk(&self, path: &[&str]) -> Option<(Found<'_>, usize)> {
        let mut entry = self.entries.get(*path.first()?)?;
        let mut consumed = 1;
        loop {
            match entry {
                ScopeEntry::Binding(id) => return Some((Found::Binding(id), consumed)),
                ScopeEntry::Value(value) => return Some((Found::Value(value), consumed)),
                ScopeEntry::Namespace(tree) => {
                    let Some(segment) = path.get(consumed) else {
                        return Some((Found::Namespace(tree), consumed));
                    };
                    match tree.entries.get(*segment) {
                        Some(child) => {
                            entry = child;
                            consumed += 1;
                        }
                        None => return Some((Found::Missing, consumed + 1)),
                    }
                }
            }
        }
    }

    /// Members of this tree, for materializing a namespace as an object
    pub(crate) fn members(&self) -> impl Iterator<Item = (&str, Found<'_>)> {
        self.entries.iter().map(|(name, entry)| {
            let found = match entry {
                ScopeEntry::Binding(id) => Found::Binding(id),
                ScopeEntry::Value(value) => Found::Value(value),
                ScopeEntry::Namespace(tree) => Found::Namespace(tree),
            };
            (name.as_str(), found)
        })
    }
}

/// Object members of a shadowed value, kept alongside the new bindings
fn expand(entry: &ScopeEntry) -> ScopeTree {
    let mut tree = ScopeTree::new();
    if let ScopeEntry::Value(Value::Object(members)) = entry {
        for (name, value) in members.iter() {
            tree.insert_value(name, value.clone());
        }
    }
    tree
}
