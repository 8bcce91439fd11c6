//! Component definitions: which props a component declares and how they bind

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use super::BindingError;

/// Declared type of a component argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Element,
    /// Event handlers are wired by the renderer and never bound
    Event,
    #[default]
    Any,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArgTypeDefinition {
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
    /// Prop whose constant seeds a controlled value, e.g. `defaultValue`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value_prop: Option<String>,
    /// Event through which the component reports changes to this value.
    /// Its presence makes the argument controlled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_change_prop: Option<String>,
}

impl ArgTypeDefinition {
    #[must_use]
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_default(mut self, value: impl Into<JsonValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    #[must_use]
    pub fn controlled_by(mut self, on_change_prop: &str) -> Self {
        self.on_change_prop = Some(on_change_prop.to_string());
        self
    }

    #[must_use]
    pub fn seeded_from(mut self, default_value_prop: &str) -> Self {
        self.default_value_prop = Some(default_value_prop.to_string());
        self
    }

    pub fn is_controlled(&self) -> bool {
        self.on_change_prop.is_some()
    }

    pub fn is_event(&self) -> bool {
        self.value_type == ValueType::Event
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDefinition {
    #[serde(default)]
    pub arg_types: BTreeMap<String, ArgTypeDefinition>,
    /// Prop that receives the first binding error of the element
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_prop: Option<String>,
    /// Prop set to `true` while any binding of the element is loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loading_prop: Option<String>,
}

impl ComponentDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_arg(mut self, name: &str, arg: ArgTypeDefinition) -> Self {
        self.arg_types.insert(name.to_string(), arg);
        self
    }

    #[must_use]
    pub fn with_error_prop(mut self, prop: &str) -> Self {
        self.error_prop = Some(prop.to_string());
        self
    }

    #[must_use]
    pub fn with_loading_prop(mut self, prop: &str) -> Self {
        self.loading_prop = Some(prop.to_string());
        self
    }
}

/// Component definitions by component name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentRegistry {
    components: BTreeMap<String, ComponentDefinition>,
}

impl ComponentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard component library
    #[must_use]
    pub fn builtin() -> Self {
        use ValueType::{Array, Boolean, Event, Number, Object, String};
        let arg = ArgTypeDefinition::new;
        Self::new()
            .with_component(
                "Text",
                ComponentDefinition::new()
                    .with_arg("value", arg(String).with_default(""))
                    .with_arg("variant", arg(String).with_default("body1"))
                    .with_arg("loading", arg(Boolean).with_default(false))
                    .with_loading_prop("loading"),
            )
            .with_component(
                "Button",
                ComponentDefinition::new()
                    .with_arg("content", arg(String).with_default("Button"))
                    .with_arg("disabled", arg(Boolean).with_default(false))
                    .with_arg("loading", arg(Boolean).with_default(false))
                    .with_arg("onClick", arg(Event))
                    .with_loading_prop("loading"),
            )
            .with_component(
                "TextField",
                ComponentDefinition::new()
                    .with_arg(
                        "value",
                        arg(String)
                            .with_default("")
                            .controlled_by("onChange")
                            .seeded_from("defaultValue"),
                    )
                    .with_arg("defaultValue", arg(String).with_default(""))
                    .with_arg("label", arg(String).with_default(""))
                    .with_arg("disabled", arg(Boolean).with_default(false))
                    .with_arg("onChange", arg(Event)),
            )
            .with_component(
                "Checkbox",
                ComponentDefinition::new()
                    .with_arg(
                        "checked",
                        arg(Boolean)
                            .with_default(false)
                            .controlled_by("onChange")
                            .seeded_from("defaultChecked"),
                    )
                    .with_arg("defaultChecked", arg(Boolean).with_default(false))
                    .with_arg("label", arg(String).with_default(""))
                    .with_arg("onChange", arg(Event)),
            )
            .with_component(
                "Select",
                ComponentDefinition::new()
                    .with_arg(
                        "value",
                        arg(String)
                            .with_default("")
                            .controlled_by("onChange")
                            .seeded_from("defaultValue"),
                    )
                    .with_arg("defaultValue", arg(String).with_default(""))
                    .with_arg("options", arg(Array).with_default(json!([])))
                    .with_arg("label", arg(String).with_default(""))
                    .with_arg("onChange", arg(Event)),
            )
            .with_component(
                "DataGrid",
                ComponentDefinition::new()
                    .with_arg("rows", arg(Array).with_default(json!([])))
                    .with_arg("columns", arg(Array).with_default(json!([])))
                    .with_arg("height", arg(Number).with_default(350))
                    .with_arg(
                        "selection",
                        arg(Object)
                            .with_default(JsonValue::Null)
                            .controlled_by("onSelectionChange"),
                    )
                    .with_arg("onSelectionChange", arg(Event))
                    .with_arg("loading", arg(Boolean).with_default(false))
                    .with_arg("error", arg(Object))
                    .with_error_prop("error")
                    .with_loading_prop("loading"),
            )
    }

    pub fn from_json(source: &str) -> Result<Self, BindingError> {
        serde_json::from_str(source).map_err(BindingError::Registry)
    }

    #[must_use]
    pub fn with_component(mut self, name: &str, definition: ComponentDefinition) -> Self {
        self.register(name, definition);
        self
    }

    /// Add or replace a component definition
    pub fn register(&mut self, name: &str, definition: ComponentDefinition) {
        self.components.insert(name.to_string(), definition);
    }

    pub fn get(&self, name: &str) -> Option<&ComponentDefinition> {
        self.components.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_text_field_is_controlled() {
        let registry = ComponentRegistry::builtin();
        let field = registry.get("TextField").unwrap();
        let value = &field.arg_types["value"];
        assert!(value.is_controlled());
        assert_eq!(value.default_value_prop.as_deref(), Some("defaultValue"));
        assert!(field.arg_types["onChange"].is_event());
        assert!(registry.get("Marquee").is_none());
    }

    #[test]
    fn loads_from_json() {
        let registry = ComponentRegistry::from_json(
            r#"{
                "Rating": {
                    "argTypes": {
                        "stars": { "type": "number", "defaultValue": 3, "onChangeProp": "onRate" },
                        "onRate": { "type": "event" }
                    },
                    "loadingProp": "busy"
                }
            }"#,
        )
        .unwrap();
        let rating = registry.get("Rating").unwrap();
        assert_eq!(rating.arg_types["stars"].value_type, ValueType::Number);
        assert_eq!(rating.arg_types["stars"].default_value, Some(serde_json::json!(3)));
        assert!(rating.arg_types["stars"].is_controlled());
        assert_eq!(rating.loading_prop.as_deref(), Some("busy"));
    }

    #[test]
    fn rejects_malformed_registry() {
        let err = ComponentRegistry::from_json(r#"{ "X": { "argTypes": { "a": { "type": "color" } } } }"#)
            .unwrap_err();
        assert!(matches!(err, BindingError::Registry(_)));
    }
}
