//! Reactive bindings for one page
//!
//! A page's bindings are collected by the [`BindingParser`] into a flat map of
//! [`ParsedBinding`]s keyed by binding id. The [`BindingGraph`] then resolves
//! them against a live scope, discovering dependencies as expressions run.
//! Values supplied from outside (user input, query results) live in the
//! [`ControlledBindingStore`] and are never recomputed from expressions.
//! [`BindingSession`] ties these together for the lifetime of a page.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dom::StructuralError;
use crate::expr::{EvaluationError, Value};

mod controlled;
mod eval;
mod parse;
mod props;
mod registry;
mod scope;
mod session;

pub use controlled::ControlledBindingStore;
pub use eval::{eval_bindings, BindingGraph};
pub use parse::{parse_bindings, BindingParser, Location};
pub use props::resolve_element_props;
pub use registry::{ArgTypeDefinition, ComponentDefinition, ComponentRegistry, ValueType};
pub use scope::ScopeTree;
pub use session::BindingSession;

/// The evaluated state of one binding
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EvaluationError>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loading: bool,
}

impl BindingResult {
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn error(error: EvaluationError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }

    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }

    /// What an expression reading this binding observes
    pub(crate) fn outcome(&self) -> Result<Value, EvaluationError> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        if self.loading {
            return Err(EvaluationError::Pending);
        }
        Ok(self.value.clone().unwrap_or_default())
    }
}

/// Where a binding's value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingSource {
    /// Evaluated on demand against the live scope
    Expression(String),
    /// Known up front, or supplied by the host for controlled bindings
    Result(BindingResult),
}

/// One entry of the page's binding map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedBinding {
    /// Dotted name under which other expressions can read this binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_path: Option<String>,
    #[serde(flatten)]
    pub source: BindingSource,
}

impl ParsedBinding {
    pub fn expression(scope_path: Option<&str>, source: impl Into<String>) -> Self {
        Self {
            scope_path: scope_path.map(str::to_string),
            source: BindingSource::Expression(source.into()),
        }
    }

    pub fn result(scope_path: Option<&str>, result: BindingResult) -> Self {
        Self {
            scope_path: scope_path.map(str::to_string),
            source: BindingSource::Result(result),
        }
    }
}

/// Every binding of a page plus the ids whose values are controlled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedBindings {
    pub bindings: BTreeMap<String, ParsedBinding>,
    pub controlled: BTreeSet<String>,
}

impl ParsedBindings {
    pub fn insert(&mut self, id: impl Into<String>, binding: ParsedBinding) {
        self.bindings.insert(id.into(), binding);
    }

    pub fn insert_controlled(&mut self, id: impl Into<String>, binding: ParsedBinding) {
        let id = id.into();
        self.controlled.insert(id.clone());
        self.bindings.insert(id, binding);
    }

    pub fn get(&self, id: &str) -> Option<&ParsedBinding> {
        self.bindings.get(id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Error, Debug)]
pub enum BindingError {
    #[error("binding \"{0}\" is not controlled")]
    NotControlled(String),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("invalid component registry")]
    Registry(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_serialization_skips_empty_fields() {
        let json = serde_json::to_value(BindingResult::value(2.0)).unwrap();
        assert_eq!(json, json!({ "value": 2 }));
        let json = serde_json::to_value(BindingResult::loading()).unwrap();
        assert_eq!(json, json!({ "loading": true }));
        let json =
            serde_json::to_value(BindingResult::error(EvaluationError::Reference("x".into())))
                .unwrap();
        assert_eq!(
            json,
            json!({ "error": { "name": "ReferenceError", "message": "x is not defined" } })
        );
    }

    #[test]
    fn parsed_binding_wire_shape() {
        let binding = ParsedBinding::expression(Some("text1.value"), "a + 1");
        assert_eq!(
            serde_json::to_value(&binding).unwrap(),
            json!({ "scopePath": "text1.value", "expression": "a + 1" })
        );
        let back: ParsedBinding = serde_json::from_value(json!({
            "scopePath": "a",
            "result": { "value": 1 }
        }))
        .unwrap();
        assert_eq!(back, ParsedBinding::result(Some("a"), BindingResult::value(1.0)));
    }

    #[test]
    fn loading_reads_as_pending() {
        assert!(BindingResult::loading().outcome().unwrap_err().is_pending());
        assert_eq!(BindingResult::default().outcome().unwrap(), Value::Undefined);
    }
}
