//! Collects the bindings of a page from the AppDom

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use tracing::{debug, instrument, trace};

use super::registry::{ArgTypeDefinition, ComponentRegistry};
use super::{BindingError, BindingResult, BindingSource, ParsedBinding, ParsedBindings};
use crate::dom::{
    AppDom, AppDomNode, BindableAttrValue, ElementAttributes, NodeId, NodeKind, NodeType,
    QueryAttributes,
};
use crate::expr::{EvaluationError, Value};

/// Scope root of the page's URL parameters
const PAGE_PARAMETERS: &str = "page.parameters";

/// The location a page is rendered at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    /// Decoded search parameters; the first occurrence of a name wins
    pub params: BTreeMap<String, String>,
}

impl Location {
    /// Parse an absolute URL or a path with an optional query string
    pub fn parse(url: &str) -> Self {
        let url = url.split_once('#').map_or(url, |(before, _)| before);
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let pathname = match path.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("/", |slash| &rest[slash..]),
            None => path,
        };

        let mut params = BTreeMap::new();
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            params
                .entry(decode_component(name))
                .or_insert_with(|| decode_component(value));
        }

        Self {
            pathname: if pathname.is_empty() { "/" } else { pathname }.to_string(),
            params,
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Builds the binding map of a page
#[derive(Debug, Clone)]
pub struct BindingParser<'r> {
    registry: &'r ComponentRegistry,
    env: BTreeMap<String, String>,
}

impl<'r> BindingParser<'r> {
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self {
            registry,
            env: BTreeMap::new(),
        }
    }

    /// Variables available to `env` bindings
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    #[instrument(level = "debug", skip_all, fields(page = %page))]
    pub fn parse(
        &self,
        dom: &AppDom,
        page: &NodeId,
        location: &Location,
    ) -> Result<ParsedBindings, BindingError> {
        let page_node = dom.get_node(page, Some(NodeType::Page))?;
        let mut parsed = ParsedBindings::default();

        if let NodeKind::Page(attrs) = &page_node.kind {
            for parameter in &attrs.parameters {
                let path = format!("{PAGE_PARAMETERS}.{}", parameter.name);
                let value = location
                    .param(&parameter.name)
                    .unwrap_or(parameter.default_value.as_str());
                parsed.insert(
                    path.clone(),
                    ParsedBinding::result(Some(&path), BindingResult::value(value)),
                );
            }
        }

        for node in dom.get_descendants(page) {
            match &node.kind {
                NodeKind::Element(attrs) => self.element_bindings(node, attrs, &mut parsed),
                NodeKind::Query(attrs) => self.query_bindings(node, attrs, false, &mut parsed),
                NodeKind::Mutation(attrs) => self.query_bindings(node, attrs, true, &mut parsed),
                _ => {}
            }
        }

        debug!(
            bindings = parsed.len(),
            controlled = parsed.controlled.len(),
            "parsed page bindings"
        );
        Ok(parsed)
    }

    fn element_bindings(
        &self,
        node: &AppDomNode,
        attrs: &ElementAttributes,
        parsed: &mut ParsedBindings,
    ) {
        let Some(definition) = self.registry.get(&attrs.component) else {
            trace!(node = %node.id, component = %attrs.component, "unknown component, no prop bindings");
            return;
        };

        for (prop, arg) in &definition.arg_types {
            if arg.is_event() {
                continue;
            }
            let id = format!("{}.props.{prop}", node.id);
            let scope_path = format!("{}.{prop}", node.name);

            if arg.is_controlled() {
                let seed = controlled_seed(attrs, prop, arg);
                parsed.insert_controlled(
                    id,
                    ParsedBinding::result(Some(&scope_path), BindingResult::value(seed)),
                );
                continue;
            }

            // Actions never produce a value, so the declared default stays
            let source = attrs
                .props
                .get(prop)
                .and_then(|bound| self.source_of(bound))
                .unwrap_or_else(|| BindingSource::Result(BindingResult::value(default_of(arg))));
            parsed.insert(
                id,
                ParsedBinding {
                    scope_path: Some(scope_path),
                    source,
                },
            );
        }
    }

    /// Parameters plus the result fields the host fills in once data arrives
    fn query_bindings(
        &self,
        node: &AppDomNode,
        attrs: &QueryAttributes,
        is_mutation: bool,
        parsed: &mut ParsedBindings,
    ) {
        for (name, bound) in &attrs.parameters {
            let path = format!("{}.params.{name}", node.name);
            if let Some(source) = self.source_of(bound) {
                parsed.insert(
                    path.clone(),
                    ParsedBinding {
                        scope_path: Some(path),
                        source,
                    },
                );
            }
        }

        // A query switched off with a constant never starts fetching
        let disabled = matches!(attrs.enabled, Some(BindableAttrValue::Const(false)));
        let idle = is_mutation || disabled;
        let fields = [
            (
                "data",
                if idle {
                    BindingResult::value(Value::Undefined)
                } else {
                    BindingResult::loading()
                },
            ),
            (
                "rows",
                if idle {
                    BindingResult::value(Value::array(Vec::new()))
                } else {
                    BindingResult::loading()
                },
            ),
            ("error", BindingResult::value(Value::Null)),
            ("isLoading", BindingResult::value(!idle)),
            ("isFetching", BindingResult::value(!idle)),
        ];
        for (field, seed) in fields {
            let path = format!("{}.{field}", node.name);
            parsed.insert_controlled(path.clone(), ParsedBinding::result(Some(&path), seed));
        }
    }

    /// How a bound attribute value is resolved; `None` for actions
    fn source_of(&self, bound: &BindableAttrValue) -> Option<BindingSource> {
        let result = match bound {
            BindableAttrValue::Const(value) => BindingResult::value(value.clone()),
            // Secrets are never exposed to the page
            BindableAttrValue::Secret(_) => BindingResult::default(),
            BindableAttrValue::JsExpression(source) => {
                return Some(BindingSource::Expression(source.clone()))
            }
            BindableAttrValue::Env(name) => match self.env.get(name) {
                Some(value) => BindingResult::value(value.as_str()),
                None => BindingResult::error(EvaluationError::MissingEnv(name.clone())),
            },
            BindableAttrValue::JsExpressionAction(_) | BindableAttrValue::NavigationAction(_) => {
                return None
            }
        };
        Some(BindingSource::Result(result))
    }
}

/// Parse the bindings of `page` with no environment variables
pub fn parse_bindings(
    dom: &AppDom,
    page: &NodeId,
    registry: &ComponentRegistry,
    location: &Location,
) -> Result<ParsedBindings, BindingError> {
    BindingParser::new(registry).parse(dom, page, location)
}

fn default_of(arg: &ArgTypeDefinition) -> Value {
    arg.default_value.as_ref().map_or(Value::Undefined, Value::from_json)
}

/// Initial value of a controlled argument: the constant of its seeding prop,
/// else its own constant, else the declared default
fn controlled_seed(attrs: &ElementAttributes, prop: &str, arg: &ArgTypeDefinition) -> Value {
    let constant = |name: &str| match attrs.props.get(name) {
        Some(BindableAttrValue::Const(value)) => Some(Value::from_json(value)),
        _ => None,
    };
    arg.default_value_prop
        .as_deref()
        .and_then(constant)
        .or_else(|| constant(prop))
        .unwrap_or_else(|| default_of(arg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::BindableAttrValue as B;
    use serde_json::json;

    fn page_with(children: Vec<AppDomNode>) -> (AppDom, NodeId) {
        let page = AppDomNode::page("home", None).with_page_parameter("tab", "overview");
        let page_id = page.id.clone();
        let mut dom = AppDom::new();
        let root = dom.root_id().clone();
        dom = dom.add_node(page, &root, "pages", None).unwrap();
        for child in children {
            let slot = match child.node_type() {
                NodeType::Query => "queries",
                NodeType::Mutation => "mutations",
                _ => "children",
            };
            dom = dom.add_node(child, &page_id, slot, None).unwrap();
        }
        (dom, page_id)
    }

    fn parse(dom: &AppDom, page: &NodeId, location: &Location) -> ParsedBindings {
        parse_bindings(dom, page, &ComponentRegistry::builtin(), location).unwrap()
    }

    #[test]
    fn parses_locations() {
        let location = Location::parse("https://example.com/app/home?tab=a%20b&x=1&tab=2#top");
        assert_eq!(location.pathname, "/app/home");
        assert_eq!(location.param("tab"), Some("a b"));
        assert_eq!(location.param("x"), Some("1"));
        assert_eq!(Location::parse("/p?q=a+b").param("q"), Some("a b"));
        assert_eq!(Location::parse("").pathname, "/");
    }

    #[test]
    fn element_props_become_bindings() {
        let text = AppDomNode::element("text1", "Text").with_prop("value", B::expression("'hi'"));
        let text_id = text.id.clone();
        let (dom, page) = page_with(vec![text]);
        let parsed = parse(&dom, &page, &Location::default());

        let value = parsed.get(&format!("{text_id}.props.value")).unwrap();
        assert_eq!(value.scope_path.as_deref(), Some("text1.value"));
        assert_eq!(value.source, BindingSource::Expression("'hi'".into()));

        // Undeclared in the node, so seeded from the declared default
        let variant = parsed.get(&format!("{text_id}.props.variant")).unwrap();
        assert_eq!(variant.source, BindingSource::Result(BindingResult::value("body1")));
        assert!(parsed.controlled.is_empty());
    }

    #[test]
    fn controlled_props_are_seeded_from_their_default_prop() {
        let field = AppDomNode::element("input1", "TextField")
            .with_prop("defaultValue", B::constant("World"))
            .with_prop("onChange", B::JsExpressionAction("doIt()".into()));
        let field_id = field.id.clone();
        let (dom, page) = page_with(vec![field]);
        let parsed = parse(&dom, &page, &Location::default());

        let id = format!("{field_id}.props.value");
        assert!(parsed.controlled.contains(&id));
        assert_eq!(
            parsed.get(&id).unwrap().source,
            BindingSource::Result(BindingResult::value("World"))
        );
        assert!(parsed.get(&format!("{field_id}.props.onChange")).is_none());
    }

    #[test]
    fn action_bound_props_keep_their_default() {
        let text = AppDomNode::element("text1", "Text")
            .with_prop("value", B::JsExpressionAction("refresh()".into()));
        let text_id = text.id.clone();
        let (dom, page) = page_with(vec![text]);
        let parsed = parse(&dom, &page, &Location::default());

        let value = parsed.get(&format!("{text_id}.props.value")).unwrap();
        assert_eq!(value.scope_path.as_deref(), Some("text1.value"));
        assert_eq!(value.source, BindingSource::Result(BindingResult::value("")));
    }

    #[test]
    fn unknown_components_are_skipped() {
        let (dom, page) = page_with(vec![AppDomNode::element("x", "Marquee")]);
        let parsed = parse(&dom, &page, &Location::default());
        assert_eq!(parsed.len(), 1); // only the page parameter
    }

    #[test]
    fn page_parameters_prefer_the_url() {
        let (dom, page) = page_with(vec![]);
        let parsed = parse(&dom, &page, &Location::default());
        assert_eq!(
            parsed.get("page.parameters.tab").unwrap().source,
            BindingSource::Result(BindingResult::value("overview"))
        );
        let parsed = parse(&dom, &page, &Location::parse("/home?tab=details"));
        assert_eq!(
            parsed.get("page.parameters.tab").unwrap().source,
            BindingSource::Result(BindingResult::value("details"))
        );
    }

    #[test]
    fn queries_expose_controlled_result_fields() {
        let query = AppDomNode::query("orders", Some("rest"))
            .with_parameter("limit", B::constant(json!(10)))
            .with_parameter("token", B::Secret(json!("s3cr3t")));
        let (dom, page) = page_with(vec![query, AppDomNode::mutation("save", None)]);
        let parsed = parse(&dom, &page, &Location::default());

        assert_eq!(
            parsed.get("orders.params.limit").unwrap().source,
            BindingSource::Result(BindingResult::value(10.0))
        );
        assert_eq!(
            parsed.get("orders.params.token").unwrap().source,
            BindingSource::Result(BindingResult::default())
        );
        for field in ["data", "rows", "error", "isLoading", "isFetching"] {
            assert!(parsed.controlled.contains(&format!("orders.{field}")));
            assert!(parsed.controlled.contains(&format!("save.{field}")));
        }
        assert_eq!(
            parsed.get("orders.data").unwrap().source,
            BindingSource::Result(BindingResult::loading())
        );
        assert_eq!(
            parsed.get("save.isLoading").unwrap().source,
            BindingSource::Result(BindingResult::value(false))
        );
    }

    #[test]
    fn env_bindings_resolve_from_the_environment() {
        let text = AppDomNode::element("text1", "Text").with_prop("value", B::Env("GREETING".into()));
        let other = AppDomNode::element("text2", "Text").with_prop("value", B::Env("NOPE".into()));
        let (text_id, other_id) = (text.id.clone(), other.id.clone());
        let (dom, page) = page_with(vec![text, other]);
        let registry = ComponentRegistry::builtin();
        let parsed = BindingParser::new(&registry)
            .with_env(BTreeMap::from([("GREETING".to_string(), "hello".to_string())]))
            .parse(&dom, &page, &Location::default())
            .unwrap();

        assert_eq!(
            parsed.get(&format!("{text_id}.props.value")).unwrap().source,
            BindingSource::Result(BindingResult::value("hello"))
        );
        assert_eq!(
            parsed.get(&format!("{other_id}.props.value")).unwrap().source,
            BindingSource::Result(BindingResult::error(EvaluationError::MissingEnv("NOPE".into())))
        );
    }

    #[test]
    fn parsing_a_non_page_fails() {
        let dom = AppDom::new();
        let err = parse_bindings(
            &dom,
            dom.root_id(),
            &ComponentRegistry::builtin(),
            &Location::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            BindingError::Structural(crate::dom::StructuralError::TypeMismatch { .. })
        ));
    }
}
