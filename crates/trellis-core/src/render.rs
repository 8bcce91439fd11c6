//! Projection of an AppDom into the tree shipped to the browser.
//!
//! The render tree keeps the node hierarchy but flattens every node's
//! attributes into a single map keyed by dotted path (`props.value`,
//! `layout.columnSize`, `parameters.limit`). Anything that must stay on the
//! server is left out:
//!
//! - secret attribute values
//! - connection nodes, which hold data source credentials
//! - query bodies and connection references

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::dom::{AppDom, AppDomNode, BindableAttrValue, NodeId, NodeKind, NodeType};

/// Browser-safe snapshot of an AppDom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderTree {
    pub root: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub nodes: BTreeMap<NodeId, RenderNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_prop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_index: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, BindableAttrValue>,
}

impl RenderTree {
    pub fn get(&self, id: &NodeId) -> Option<&RenderNode> {
        self.nodes.get(id)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Project `dom` into a [`RenderTree`]
pub fn create_render_tree(dom: &AppDom) -> RenderTree {
    let nodes: BTreeMap<NodeId, RenderNode> = dom
        .nodes()
        .filter_map(|node| Some((node.id.clone(), render_node(node)?)))
        .collect();
    debug!(
        nodes = nodes.len(),
        omitted = dom.len() - nodes.len(),
        "created render tree"
    );
    RenderTree {
        root: dom.root_id().clone(),
        version: dom.version(),
        nodes,
    }
}

fn render_node(node: &AppDomNode) -> Option<RenderNode> {
    let mut attributes = BTreeMap::new();
    match &node.kind {
        NodeKind::Connection(_) => return None,
        NodeKind::App(_) => {}
        NodeKind::Page(attrs) => {
            if let Some(title) = &attrs.title {
                attributes.insert("title".to_string(), BindableAttrValue::constant(title.as_str()));
            }
            if !attrs.parameters.is_empty() {
                let parameters: Vec<_> = attrs
                    .parameters
                    .iter()
                    .map(|p| json!({ "name": p.name, "defaultValue": p.default_value }))
                    .collect();
                attributes.insert("parameters".to_string(), BindableAttrValue::constant(parameters));
            }
        }
        NodeKind::Element(attrs) => {
            attributes.insert(
                "component".to_string(),
                BindableAttrValue::constant(attrs.component.as_str()),
            );
            flatten_into(&mut attributes, "props", &attrs.props);
            flatten_into(&mut attributes, "layout", &attrs.layout);
        }
        NodeKind::Query(attrs) | NodeKind::Mutation(attrs) => {
            if let Some(data_source) = &attrs.data_source {
                attributes.insert(
                    "dataSource".to_string(),
                    BindableAttrValue::constant(data_source.as_str()),
                );
            }
            flatten_into(&mut attributes, "parameters", &attrs.parameters);
            if let Some(enabled) = &attrs.enabled {
                if let Some(value) = redact_flag(enabled) {
                    attributes.insert("enabled".to_string(), value);
                }
            }
        }
        NodeKind::Theme(attrs) => flatten_into(&mut attributes, "tokens", &attrs.tokens),
        NodeKind::CodeComponent(attrs) => {
            attributes.insert("code".to_string(), BindableAttrValue::constant(attrs.code.as_str()));
        }
    }

    Some(RenderNode {
        id: node.id.clone(),
        node_type: node.node_type(),
        name: node.name.clone(),
        parent_id: node.parent_id.clone(),
        parent_prop: node.parent_prop.clone(),
        parent_index: node.parent_index.clone(),
        attributes,
    })
}

fn flatten_into(
    out: &mut BTreeMap<String, BindableAttrValue>,
    group: &str,
    values: &BTreeMap<String, BindableAttrValue>,
) {
    for (name, value) in values {
        if let Some(safe) = value.redacted() {
            out.insert(format!("{group}.{name}"), safe);
        }
    }
}

fn redact_flag(value: &BindableAttrValue<bool>) -> Option<BindableAttrValue> {
    Some(match value {
        BindableAttrValue::Secret(_) => return None,
        BindableAttrValue::Const(flag) => BindableAttrValue::constant(*flag),
        BindableAttrValue::JsExpression(src) => BindableAttrValue::JsExpression(src.clone()),
        BindableAttrValue::JsExpressionAction(src) => {
            BindableAttrValue::JsExpressionAction(src.clone())
        }
        BindableAttrValue::NavigationAction(action) => {
            return BindableAttrValue::NavigationAction(action.clone()).redacted()
        }
        BindableAttrValue::Env(name) => BindableAttrValue::Env(name.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ConnectionAttributes;

    fn dom_with_secrets() -> (AppDom, NodeId, NodeId, NodeId) {
        let dom = AppDom::new();
        let root = dom.root_id().clone();
        let connection = AppDomNode::new(
            "postgres",
            NodeKind::Connection(ConnectionAttributes {
                data_source: "postgres".into(),
                params: Some(BindableAttrValue::Secret(json!({ "password": "hunter2" }))),
            }),
        );
        let connection_id = connection.id.clone();
        let dom = dom.add_node(connection, &root, "connections", None).unwrap();

        let page = AppDomNode::page("home", Some("Home")).with_page_parameter("id", "1");
        let page_id = page.id.clone();
        let dom = dom.add_node(page, &root, "pages", None).unwrap();

        let mut query = AppDomNode::query("users", Some("postgres"))
            .with_parameter("apiKey", BindableAttrValue::Secret(json!("sk-123")))
            .with_parameter("limit", BindableAttrValue::constant(10));
        if let NodeKind::Query(attrs) = &mut query.kind {
            attrs.connection_id = Some(connection_id.clone());
            attrs.query = json!({ "sql": "SELECT * FROM users" });
        }
        let query_id = query.id.clone();
        let dom = dom.add_node(query, &page_id, "queries", None).unwrap();

        let text = AppDomNode::element("greeting", "Text")
            .with_prop("value", BindableAttrValue::expression("`Hi ${users.rows.length}`"))
            .with_prop("token", BindableAttrValue::Secret(json!("abc")));
        let text_id = text.id.clone();
        let dom = dom.add_node(text, &page_id, "children", None).unwrap();
        (dom, connection_id, query_id, text_id)
    }

    #[test]
    fn secrets_never_reach_the_render_tree() {
        let (dom, ..) = dom_with_secrets();
        let json = create_render_tree(&dom).to_json().unwrap();
        for leaked in ["hunter2", "sk-123", "\"abc\"", "SELECT", "\"secret\""] {
            assert!(!json.contains(leaked), "render tree leaked {leaked}: {json}");
        }
    }

    #[test]
    fn connections_are_omitted() {
        let (dom, connection, query, _) = dom_with_secrets();
        let tree = create_render_tree(&dom);
        assert!(tree.get(&connection).is_none());
        assert_eq!(tree.nodes.len(), dom.len() - 1);
        let query = tree.get(&query).unwrap();
        assert!(!query.attributes.contains_key("connectionId"));
        assert!(query.attributes.contains_key("parameters.limit"));
        assert!(!query.attributes.contains_key("parameters.apiKey"));
    }

    #[test]
    fn element_attributes_are_flattened() {
        let (dom, _, _, text) = dom_with_secrets();
        let tree = create_render_tree(&dom);
        let node = tree.get(&text).unwrap();
        assert_eq!(node.node_type, NodeType::Element);
        assert_eq!(
            node.attributes["component"],
            BindableAttrValue::constant("Text")
        );
        assert_eq!(
            node.attributes["props.value"],
            BindableAttrValue::expression("`Hi ${users.rows.length}`")
        );
        assert!(!node.attributes.contains_key("props.token"));
    }

    #[test]
    fn hierarchy_is_preserved() {
        let (dom, _, _, text) = dom_with_secrets();
        let tree = create_render_tree(&dom);
        let original = dom.get_node(&text, None).unwrap();
        let rendered = tree.get(&text).unwrap();
        assert_eq!(rendered.parent_id, original.parent_id);
        assert_eq!(rendered.parent_index, original.parent_index);
        assert_eq!(tree.root, *dom.root_id());
    }
}
