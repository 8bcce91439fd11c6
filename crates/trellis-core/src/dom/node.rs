//! AppDom node types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::BindableAttrValue;

/// Opaque, unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of a node, without its attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    App,
    Page,
    Element,
    Query,
    Mutation,
    Theme,
    Connection,
    CodeComponent,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Page => "page",
            Self::Element => "element",
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Theme => "theme",
            Self::Connection => "connection",
            Self::CodeComponent => "codeComponent",
        }
    }

    /// Whether a node of this type accepts a `child` in the named slot
    pub fn accepts(self, prop: &str, child: NodeType) -> bool {
        match (self, child) {
            (Self::App, Self::Page) => prop == "pages",
            (Self::App, Self::Theme) => prop == "themes",
            (Self::App, Self::Connection) => prop == "connections",
            (Self::App, Self::CodeComponent) => prop == "codeComponents",
            (Self::Page, Self::Element) => prop == "children",
            (Self::Page, Self::Query) => prop == "queries",
            (Self::Page, Self::Mutation) => prop == "mutations",
            // Element slots are declared by the component, any name goes
            (Self::Element, Self::Element) => !prop.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the AppDom.
///
/// Every node except the root carries all three parent fields. The root
/// carries none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDomNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_prop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<String>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Type tag plus type-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "attributes", rename_all = "camelCase")]
pub enum NodeKind {
    App(AppAttributes),
    Page(PageAttributes),
    Element(ElementAttributes),
    Query(QueryAttributes),
    Mutation(QueryAttributes),
    Theme(ThemeAttributes),
    Connection(ConnectionAttributes),
    CodeComponent(CodeComponentAttributes),
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::App(_) => NodeType::App,
            Self::Page(_) => NodeType::Page,
            Self::Element(_) => NodeType::Element,
            Self::Query(_) => NodeType::Query,
            Self::Mutation(_) => NodeType::Mutation,
            Self::Theme(_) => NodeType::Theme,
            Self::Connection(_) => NodeType::Connection,
            Self::CodeComponent(_) => NodeType::CodeComponent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppAttributes {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<PageParameter>,
}

/// A URL search parameter exposed to the page's bindings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParameter {
    pub name: String,
    #[serde(default)]
    pub default_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementAttributes {
    pub component: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, BindableAttrValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub layout: BTreeMap<String, BindableAttrValue>,
}

/// Shared by queries and mutations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<NodeId>,
    /// Data-source specific request body, only ever read server side
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub query: JsonValue,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, BindableAttrValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<BindableAttrValue<bool>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeAttributes {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tokens: BTreeMap<String, BindableAttrValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionAttributes {
    pub data_source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BindableAttrValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeComponentAttributes {
    pub code: String,
}

impl AppDomNode {
    /// A detached node with a fresh id
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.into(),
            parent_id: None,
            parent_prop: None,
            parent_index: None,
            kind,
        }
    }

    pub fn with_id(mut self, id: impl Into<NodeId>) -> Self {
        self.id = id.into();
        self
    }

    /// The application root
    pub fn app(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::App(AppAttributes {}))
    }

    pub fn page(name: impl Into<String>, title: Option<&str>) -> Self {
        Self::new(
            name,
            NodeKind::Page(PageAttributes {
                title: title.map(str::to_string),
                parameters: Vec::new(),
            }),
        )
    }

    pub fn element(name: impl Into<String>, component: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Element(ElementAttributes {
                component: component.into(),
                ..ElementAttributes::default()
            }),
        )
    }

    pub fn query(name: impl Into<String>, data_source: Option<&str>) -> Self {
        Self::new(
            name,
            NodeKind::Query(QueryAttributes {
                data_source: data_source.map(str::to_string),
                ..QueryAttributes::default()
            }),
        )
    }

    pub fn mutation(name: impl Into<String>, data_source: Option<&str>) -> Self {
        Self::new(
            name,
            NodeKind::Mutation(QueryAttributes {
                data_source: data_source.map(str::to_string),
                ..QueryAttributes::default()
            }),
        )
    }

    pub fn theme(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Theme(ThemeAttributes::default()))
    }

    pub fn connection(name: impl Into<String>, data_source: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::Connection(ConnectionAttributes {
                data_source: data_source.into(),
                params: None,
            }),
        )
    }

    pub fn code_component(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(
            name,
            NodeKind::CodeComponent(CodeComponentAttributes { code: code.into() }),
        )
    }

    /// Set an element prop while building a node
    pub fn with_prop(mut self, prop: impl Into<String>, value: BindableAttrValue) -> Self {
        if let NodeKind::Element(attrs) = &mut self.kind {
            attrs.props.insert(prop.into(), value);
        }
        self
    }

    /// Set a query or mutation parameter while building a node
    pub fn with_parameter(mut self, name: impl Into<String>, value: BindableAttrValue) -> Self {
        if let NodeKind::Query(attrs) | NodeKind::Mutation(attrs) = &mut self.kind {
            attrs.parameters.insert(name.into(), value);
        }
        self
    }

    /// Declare a page parameter while building a node
    pub fn with_page_parameter(
        mut self,
        name: impl Into<String>,
        default_value: impl Into<String>,
    ) -> Self {
        if let NodeKind::Page(attrs) = &mut self.kind {
            attrs.parameters.push(PageParameter {
                name: name.into(),
                default_value: default_value.into(),
            });
        }
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn as_element(&self) -> Option<&ElementAttributes> {
        match &self.kind {
            NodeKind::Element(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn as_page(&self) -> Option<&PageAttributes> {
        match &self.kind {
            NodeKind::Page(attrs) => Some(attrs),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&QueryAttributes> {
        match &self.kind {
            NodeKind::Query(attrs) | NodeKind::Mutation(attrs) => Some(attrs),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_serializes_with_flat_type_tag() {
        let node = AppDomNode::element("button1", "Button")
            .with_id("n1")
            .with_prop("content", BindableAttrValue::constant("Go"));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(
            json,
            json!({
                "id": "n1",
                "name": "button1",
                "type": "element",
                "attributes": {
                    "component": "Button",
                    "props": { "content": { "type": "const", "value": "Go" } }
                }
            })
        );
        let back: AppDomNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn code_component_tag_is_camel_case() {
        let node = AppDomNode::code_component("Chart", "export default () => null");
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "codeComponent");
    }

    #[test]
    fn slot_rules() {
        assert!(NodeType::App.accepts("pages", NodeType::Page));
        assert!(!NodeType::App.accepts("children", NodeType::Page));
        assert!(NodeType::Page.accepts("queries", NodeType::Query));
        assert!(!NodeType::Page.accepts("children", NodeType::Page));
        assert!(NodeType::Element.accepts("content", NodeType::Element));
        assert!(!NodeType::Element.accepts("children", NodeType::Query));
        assert!(!NodeType::Query.accepts("children", NodeType::Element));
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(NodeId::generate(), NodeId::generate());
    }
}
