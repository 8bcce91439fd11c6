//! Turning evaluated bindings into the props of one element

use std::collections::BTreeMap;

use tracing::warn;

use super::registry::ComponentDefinition;
use super::BindingResult;
use crate::dom::AppDomNode;
use crate::expr::{EvaluationError, Value};

/// Props to render `node` with.
///
/// Failed bindings leave their prop unset. The first error goes to the
/// component's error prop when it declares one; otherwise each error is
/// logged. The loading prop is switched on while any binding is loading.
pub fn resolve_element_props(
    node: &AppDomNode,
    definition: &ComponentDefinition,
    results: &BTreeMap<String, BindingResult>,
) -> BTreeMap<String, Value> {
    let mut props = BTreeMap::new();
    let mut first_error: Option<&EvaluationError> = None;
    let mut loading = false;

    for (prop, arg) in &definition.arg_types {
        if arg.is_event() {
            continue;
        }
        let Some(result) = results.get(&format!("{}.props.{prop}", node.id)) else {
            continue;
        };
        if let Some(value) = &result.value {
            props.insert(prop.clone(), value.clone());
        }
        loading |= result.loading;
        if let Some(error) = &result.error {
            first_error.get_or_insert(error);
            if definition.error_prop.is_none() {
                warn!(node = %node.name, prop = prop.as_str(), %error, "binding error");
            }
        }
    }

    if let (Some(error_prop), Some(error)) = (&definition.error_prop, first_error) {
        props.insert(error_prop.clone(), error_value(error));
    }
    if let Some(loading_prop) = &definition.loading_prop {
        if loading {
            props.insert(loading_prop.clone(), Value::Bool(true));
        }
    }
    props
}

fn error_value(error: &EvaluationError) -> Value {
    Value::object(BTreeMap::from([
        ("name".to_string(), Value::string(error.name())),
        ("message".to_string(), Value::from(error.to_string())),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::ComponentRegistry;

    #[test]
    fn routes_errors_and_loading() {
        let registry = ComponentRegistry::builtin();
        let grid = AppDomNode::element("grid1", "DataGrid");
        let id = |prop: &str| format!("{}.props.{prop}", grid.id);
        let results = BTreeMap::from([
            (id("rows"), BindingResult::loading()),
            (
                id("columns"),
                BindingResult::error(EvaluationError::Reference("cols".into())),
            ),
            (id("height"), BindingResult::value(200.0)),
        ]);

        let props = resolve_element_props(&grid, registry.get("DataGrid").unwrap(), &results);
        assert_eq!(props["height"], Value::Number(200.0));
        assert_eq!(props["loading"], Value::Bool(true));
        assert!(!props.contains_key("rows"));
        assert_eq!(
            props["error"].to_json().unwrap(),
            serde_json::json!({ "name": "ReferenceError", "message": "cols is not defined" })
        );
    }

    #[test]
    fn components_without_error_prop_only_log() {
        let registry = ComponentRegistry::builtin();
        let text = AppDomNode::element("text1", "Text");
        let results = BTreeMap::from([(
            format!("{}.props.value", text.id),
            BindingResult::error(EvaluationError::Type("boom".into())),
        )]);
        let props = resolve_element_props(&text, registry.get("Text").unwrap(), &results);
        assert!(props.is_empty());
    }
}
