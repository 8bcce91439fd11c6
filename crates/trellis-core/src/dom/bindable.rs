//! Bindable attribute values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::NodeId;

/// The value of a node attribute.
///
/// Constants carry their payload directly. Expressions, actions and
/// environment references are resolved later by the binding engine. Secret
/// values are only ever read on the server and never leave the AppDom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum BindableAttrValue<V = JsonValue> {
    Const(V),
    Secret(V),
    JsExpression(String),
    JsExpressionAction(String),
    NavigationAction(NavigationAction),
    Env(String),
}

/// Navigate to another page, passing bound page parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationAction {
    pub page: NodeId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, BindableAttrValue>,
}

impl<V> BindableAttrValue<V> {
    pub fn is_secret(&self) -> bool {
        matches!(self, Self::Secret(_))
    }

    /// Actions run in response to events and never produce a prop value
    pub fn is_action(&self) -> bool {
        matches!(self, Self::JsExpressionAction(_) | Self::NavigationAction(_))
    }

    /// Wire name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Const(_) => "const",
            Self::Secret(_) => "secret",
            Self::JsExpression(_) => "jsExpression",
            Self::JsExpressionAction(_) => "jsExpressionAction",
            Self::NavigationAction(_) => "navigationAction",
            Self::Env(_) => "env",
        }
    }
}

impl BindableAttrValue {
    pub fn constant(value: impl Into<JsonValue>) -> Self {
        Self::Const(value.into())
    }

    pub fn expression(source: impl Into<String>) -> Self {
        Self::JsExpression(source.into())
    }

    /// A copy safe to send to the browser, or `None` for a secret.
    ///
    /// Navigation parameters are filtered recursively.
    pub fn redacted(&self) -> Option<Self> {
        match self {
            Self::Secret(_) => None,
            Self::NavigationAction(action) => Some(Self::NavigationAction(NavigationAction {
                page: action.page.clone(),
                parameters: action
                    .parameters
                    .iter()
                    .filter_map(|(name, value)| Some((name.clone(), value.redacted()?)))
                    .collect(),
            })),
            other => Some(other.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_is_adjacently_tagged() {
        let value = BindableAttrValue::expression("a + 1");
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({ "type": "jsExpression", "value": "a + 1" })
        );

        let parsed: BindableAttrValue =
            serde_json::from_value(json!({ "type": "const", "value": [1, 2] })).unwrap();
        assert_eq!(parsed, BindableAttrValue::constant(json!([1, 2])));
    }

    #[test]
    fn navigation_parameters_lose_secrets() {
        let action: BindableAttrValue = BindableAttrValue::NavigationAction(NavigationAction {
            page: NodeId::from("page1"),
            parameters: BTreeMap::from([
                ("token".to_string(), BindableAttrValue::Secret(json!("s3cr3t"))),
                ("id".to_string(), BindableAttrValue::expression("row.id")),
            ]),
        });
        let Some(BindableAttrValue::NavigationAction(redacted)) = action.redacted() else {
            panic!("expected navigation action");
        };
        assert_eq!(redacted.parameters.len(), 1);
        assert!(redacted.parameters.contains_key("id"));
    }

    #[test]
    fn secret_redacts_to_nothing() {
        assert!(BindableAttrValue::Secret(json!("x")).redacted().is_none());
        assert!(BindableAttrValue::Secret(json!("x")).is_secret());
        assert!(BindableAttrValue::<JsonValue>::JsExpressionAction("go()".into()).is_action());
        assert!(!BindableAttrValue::<bool>::Const(true).is_action());
    }
}
