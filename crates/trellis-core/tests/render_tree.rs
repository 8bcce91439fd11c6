//! Integration tests for the render tree projection

use std::collections::BTreeMap;

use proptest::prelude::*;
use serde_json::{json, Value as JsonValue};
use trellis_core::dom::{
    AppDom, AppDomNode, BindableAttrValue, NavigationAction, NodeId, NodeKind, NodeType,
};
use trellis_core::render::{create_render_tree, RenderTree};
use trellis_core::testutil::sample_dom;

#[test]
fn test_no_secret_reaches_the_render_tree() {
    let sample = sample_dom().unwrap();
    let json = create_render_tree(&sample.dom).to_json().unwrap();
    for leaked in ["hunter2", "s3cr3t", "select * from orders", "\"secret\""] {
        assert!(!json.contains(leaked), "render tree leaked {leaked}");
    }
}

#[test]
fn test_server_only_parts_are_dropped() {
    let sample = sample_dom().unwrap();
    let tree = create_render_tree(&sample.dom);

    assert!(tree.get(&sample.connection).is_none());
    let orders = tree.get(&sample.orders).unwrap();
    assert_eq!(orders.node_type, NodeType::Query);
    assert_eq!(
        orders.attributes["parameters.limit"],
        BindableAttrValue::constant(10)
    );
    assert!(!orders.attributes.contains_key("parameters.token"));
    assert!(!orders.attributes.contains_key("query"));
}

#[test]
fn test_projection_keeps_hierarchy_and_bindings() {
    let sample = sample_dom().unwrap();
    let tree = create_render_tree(&sample.dom);

    assert_eq!(tree.root, *sample.dom.root_id());
    assert_eq!(tree.nodes.len(), sample.dom.len() - 1);
    let greeting = tree.get(&sample.greeting).unwrap();
    assert_eq!(greeting.parent_id.as_ref(), Some(&sample.page));
    assert_eq!(
        greeting.attributes["props.value"],
        BindableAttrValue::expression("`Hello ${input1.value}`")
    );
    let grid = tree.get(&sample.grid).unwrap();
    assert_eq!(
        grid.attributes["props.onSelectionChange"],
        BindableAttrValue::JsExpressionAction("orders.refetch()".to_string())
    );
}

#[test]
fn test_render_tree_is_pure() {
    let sample = sample_dom().unwrap();
    let first = create_render_tree(&sample.dom);
    let second = create_render_tree(&sample.dom);
    assert_eq!(first, second);

    let decoded: RenderTree = serde_json::from_str(&first.to_json().unwrap()).unwrap();
    assert_eq!(decoded, first);
}

/// Every generated secret carries this marker; plain strings are lowercase
const SECRET_MARK: &str = "SECRET-";

type Attrs = BTreeMap<String, BindableAttrValue>;

#[derive(Debug, Clone)]
struct ElementShape {
    props: Attrs,
    layout: Attrs,
    children: Vec<Attrs>,
}

#[derive(Debug, Clone)]
struct QueryShape {
    parameters: Attrs,
    enabled: Option<BindableAttrValue<bool>>,
    mutation: bool,
}

#[derive(Debug, Clone)]
struct PageShape {
    elements: Vec<ElementShape>,
    queries: Vec<QueryShape>,
}

fn secret() -> impl Strategy<Value = BindableAttrValue> {
    "[a-z0-9]{4,8}".prop_map(|s| BindableAttrValue::Secret(json!(format!("{SECRET_MARK}{s}"))))
}

fn leaf() -> impl Strategy<Value = BindableAttrValue> {
    prop_oneof![
        "[a-z]{1,5}".prop_map(BindableAttrValue::constant),
        "[a-z]{1,5}".prop_map(|s| BindableAttrValue::expression(format!("{s}.value"))),
        "[a-z]{1,5}".prop_map(BindableAttrValue::<JsonValue>::Env),
        "[a-z]{1,5}"
            .prop_map(|s| BindableAttrValue::<JsonValue>::JsExpressionAction(format!("{s}()"))),
        secret(),
        "[a-z0-9]{4,8}".prop_map(|s| {
            BindableAttrValue::Secret(json!({ "nested": [format!("{SECRET_MARK}{s}")] }))
        }),
    ]
}

fn attr() -> impl Strategy<Value = BindableAttrValue> {
    prop_oneof![
        3 => leaf(),
        1 => prop::collection::btree_map("[a-z]{1,4}", leaf(), 0..4).prop_map(|parameters| {
            BindableAttrValue::NavigationAction(NavigationAction {
                page: NodeId::from("page0"),
                parameters,
            })
        }),
    ]
}

fn attrs() -> impl Strategy<Value = Attrs> {
    prop::collection::btree_map("[a-z]{1,4}", attr(), 0..4)
}

fn enabled() -> impl Strategy<Value = Option<BindableAttrValue<bool>>> {
    prop::option::of(prop_oneof![
        any::<bool>().prop_map(BindableAttrValue::<bool>::Const),
        any::<bool>().prop_map(BindableAttrValue::<bool>::Secret),
        "[a-z]{1,5}".prop_map(BindableAttrValue::<bool>::JsExpression),
    ])
}

fn page_shape() -> impl Strategy<Value = PageShape> {
    let element = (attrs(), attrs(), prop::collection::vec(attrs(), 0..3))
        .prop_map(|(props, layout, children)| ElementShape { props, layout, children });
    let query = (attrs(), enabled(), any::<bool>())
        .prop_map(|(parameters, enabled, mutation)| QueryShape { parameters, enabled, mutation });
    (prop::collection::vec(element, 0..4), prop::collection::vec(query, 0..3))
        .prop_map(|(elements, queries)| PageShape { elements, queries })
}

fn build_dom(pages: &[PageShape], tokens: &Attrs, connection_secret: &str) -> AppDom {
    let mut dom = AppDom::new();
    let root = dom.root_id().clone();

    let mut connection = AppDomNode::connection("db", "rest");
    if let NodeKind::Connection(attrs) = &mut connection.kind {
        attrs.params = Some(BindableAttrValue::Secret(json!({ "apiKey": connection_secret })));
    }
    let connection_id = connection.id.clone();
    dom = dom.add_node(connection, &root, "connections", None).unwrap();

    let mut theme = AppDomNode::theme("theme");
    if let NodeKind::Theme(attrs) = &mut theme.kind {
        attrs.tokens = tokens.clone();
    }
    dom = dom.add_node(theme, &root, "themes", None).unwrap();

    for (p, page_shape) in pages.iter().enumerate() {
        let page = AppDomNode::page(format!("page{p}"), None);
        let page_id = page.id.clone();
        dom = dom.add_node(page, &root, "pages", None).unwrap();

        for (e, element_shape) in page_shape.elements.iter().enumerate() {
            let mut element = AppDomNode::element(format!("el{p}x{e}"), "Stack");
            if let NodeKind::Element(attrs) = &mut element.kind {
                attrs.props = element_shape.props.clone();
                attrs.layout = element_shape.layout.clone();
            }
            let element_id = element.id.clone();
            dom = dom.add_node(element, &page_id, "children", None).unwrap();

            for (c, props) in element_shape.children.iter().enumerate() {
                let mut child = AppDomNode::element(format!("el{p}x{e}x{c}"), "Text");
                if let NodeKind::Element(attrs) = &mut child.kind {
                    attrs.props = props.clone();
                }
                dom = dom.add_node(child, &element_id, "children", None).unwrap();
            }
        }

        for (q, query_shape) in page_shape.queries.iter().enumerate() {
            let name = format!("query{p}x{q}");
            let (mut node, slot) = if query_shape.mutation {
                (AppDomNode::mutation(name, Some("rest")), "mutations")
            } else {
                (AppDomNode::query(name, Some("rest")), "queries")
            };
            if let NodeKind::Query(attrs) | NodeKind::Mutation(attrs) = &mut node.kind {
                attrs.connection_id = Some(connection_id.clone());
                attrs.query = json!({ "url": format!("https://api.test/{SECRET_MARK}{q}") });
                attrs.parameters = query_shape.parameters.clone();
                attrs.enabled = query_shape.enabled.clone();
            }
            dom = dom.add_node(node, &page_id, slot, None).unwrap();
        }
    }
    dom
}

proptest! {
    #[test]
    fn test_no_generated_secret_reaches_the_render_tree(
        pages in prop::collection::vec(page_shape(), 1..3),
        tokens in attrs(),
        connection_secret in "[a-z0-9]{4,8}",
    ) {
        let connection_secret = format!("{SECRET_MARK}{connection_secret}");
        let dom = build_dom(&pages, &tokens, &connection_secret);
        let tree = create_render_tree(&dom);
        let json = tree.to_json().unwrap();

        prop_assert!(!json.contains(SECRET_MARK), "render tree leaked a secret: {}", json);
        prop_assert!(!json.contains("\"secret\""));
        prop_assert!(tree.nodes.values().all(|node| node.node_type != NodeType::Connection));
        prop_assert_eq!(tree.nodes.len(), dom.len() - 1);
    }
}
