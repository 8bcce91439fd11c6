//! Test utilities for Trellis
//!
//! Fixture documents and registries, plus helpers for evaluating
//! expressions and page bindings in one call.

use std::collections::BTreeMap;

use serde_json::{json, Value as JsonValue};

use crate::bindings::{
    eval_bindings, parse_bindings, ArgTypeDefinition, BindingError, BindingResult,
    ComponentDefinition, ComponentRegistry, Location, ValueType,
};
use crate::dom::{AppDom, AppDomNode, BindableAttrValue, DomResult, NodeId, NodeKind};
use crate::expr::{DirectEvaluator, EmptyScope, ExpressionEvaluator, Value};

/// Result type for test helpers
pub type TestResult<T> = Result<T, String>;

/// Ids of the interesting nodes in [`sample_dom`]
#[derive(Debug, Clone)]
pub struct SampleDom {
    pub dom: AppDom,
    pub connection: NodeId,
    pub page: NodeId,
    pub input: NodeId,
    pub greeting: NodeId,
    pub grid: NodeId,
    pub orders: NodeId,
}

/// A small application: one page with a text field, a greeting that reads
/// it, a data grid fed by a query, and a connection holding a secret.
///
/// ```text
/// app
/// ├── connections: db (secret params)
/// └── pages: home (parameter `tab`, default "overview")
///     ├── children: input1, greeting, grid1
///     └── queries: orders (secret `token` parameter)
/// ```
pub fn sample_dom() -> DomResult<SampleDom> {
    let dom = AppDom::new();
    let root = dom.root_id().clone();

    let mut connection = AppDomNode::connection("db", "postgres").with_id("db");
    if let NodeKind::Connection(attrs) = &mut connection.kind {
        attrs.params = Some(BindableAttrValue::Secret(json!({ "password": "hunter2" })));
    }

    let page = AppDomNode::page("home", Some("Home"))
        .with_id("home")
        .with_page_parameter("tab", "overview");
    let input = AppDomNode::element("input1", "TextField")
        .with_id("input1")
        .with_prop("label", BindableAttrValue::constant("Name"))
        .with_prop("defaultValue", BindableAttrValue::constant("World"));
    let greeting = AppDomNode::element("greeting", "Text")
        .with_id("greeting")
        .with_prop("value", BindableAttrValue::expression("`Hello ${input1.value}`"));
    let grid = AppDomNode::element("grid1", "DataGrid")
        .with_id("grid1")
        .with_prop("rows", BindableAttrValue::expression("orders.rows"))
        .with_prop(
            "onSelectionChange",
            BindableAttrValue::JsExpressionAction("orders.refetch()".to_string()),
        );

    let mut orders = AppDomNode::query("orders", Some("postgres"))
        .with_id("orders")
        .with_parameter("limit", BindableAttrValue::constant(10))
        .with_parameter("token", BindableAttrValue::Secret(json!("s3cr3t")));
    if let NodeKind::Query(attrs) = &mut orders.kind {
        attrs.connection_id = Some(NodeId::from("db"));
        attrs.query = json!({ "sql": "select * from orders limit $1" });
    }

    let ids = SampleDom {
        dom: AppDom::new(),
        connection: connection.id.clone(),
        page: page.id.clone(),
        input: input.id.clone(),
        greeting: greeting.id.clone(),
        grid: grid.id.clone(),
        orders: orders.id.clone(),
    };
    let dom = dom
        .add_node(connection, &root, "connections", None)?
        .add_node(page, &root, "pages", None)?
        .add_node(input, &ids.page, "children", None)?
        .add_node(greeting, &ids.page, "children", None)?
        .add_node(grid, &ids.page, "children", None)?
        .add_node(orders, &ids.page, "queries", None)?;
    Ok(SampleDom { dom, ..ids })
}

/// Registry with a single `Text` component taking a string `value`
pub fn text_registry() -> ComponentRegistry {
    ComponentRegistry::new().with_component(
        "Text",
        ComponentDefinition::new()
            .with_arg("value", ArgTypeDefinition::new(ValueType::String).with_default("")),
    )
}

/// Evaluate an expression with an empty scope
///
/// # Errors
/// Returns the evaluation error message
pub fn eval_expr(source: &str) -> TestResult<Value> {
    DirectEvaluator::default()
        .evaluate(source, &EmptyScope)
        .map_err(|e| format!("{}: {e}", e.name()))
}

/// Evaluate an expression against the members of a JSON object
///
/// # Errors
/// Returns the evaluation error message, or complains about a non-object scope
pub fn eval_with(source: &str, scope: &JsonValue) -> TestResult<Value> {
    let JsonValue::Object(members) = scope else {
        return Err(format!("scope must be an object, got {scope}"));
    };
    let scope: BTreeMap<String, Value> = members
        .iter()
        .map(|(name, value)| (name.clone(), Value::from_json(value)))
        .collect();
    DirectEvaluator::default()
        .evaluate(source, &scope)
        .map_err(|e| format!("{}: {e}", e.name()))
}

/// Parse and evaluate every binding of `page` in one pass
pub fn evaluate_page(
    dom: &AppDom,
    page: &NodeId,
    registry: &ComponentRegistry,
) -> Result<BTreeMap<String, BindingResult>, BindingError> {
    let parsed = parse_bindings(dom, page, registry, &Location::default())?;
    Ok(eval_bindings(&parsed, &BTreeMap::new(), &DirectEvaluator::default()))
}
