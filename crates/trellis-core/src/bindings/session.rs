//! Binding state for the lifetime of one loaded page

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::debug;

use super::controlled::ControlledBindingStore;
use super::eval::BindingGraph;
use super::parse::{BindingParser, Location};
use super::props::resolve_element_props;
use super::registry::ComponentRegistry;
use super::{BindingError, BindingResult, BindingSource, ParsedBindings};
use crate::dom::{AppDom, NodeId, NodeType};
use crate::expr::{Evaluator, ExpressionEvaluator, Value};

/// Owns the parsed bindings, controlled values and memoized results of the
/// page being shown. Loading another page starts over; [`Self::dispose`]
/// ends the session.
#[derive(Debug)]
pub struct BindingSession<E = Evaluator> {
    evaluator: E,
    registry: ComponentRegistry,
    env: BTreeMap<String, String>,
    globals: BTreeMap<String, Value>,
    page: Option<NodeId>,
    location: Location,
    parsed: ParsedBindings,
    controlled: ControlledBindingStore,
    results: BTreeMap<String, BindingResult>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl<E: ExpressionEvaluator> BindingSession<E> {
    pub fn new(registry: ComponentRegistry, evaluator: E) -> Self {
        Self {
            evaluator,
            registry,
            env: BTreeMap::new(),
            globals: BTreeMap::new(),
            page: None,
            location: Location::default(),
            parsed: ParsedBindings::default(),
            controlled: ControlledBindingStore::new(),
            results: BTreeMap::new(),
            dependencies: BTreeMap::new(),
        }
    }

    /// Variables for `env` bindings, read when a page is parsed
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Host values visible to every expression
    #[must_use]
    pub fn with_globals(mut self, globals: BTreeMap<String, Value>) -> Self {
        self.globals = globals;
        self
    }

    /// Show `page`, discarding all state of the previous page
    pub fn load(
        &mut self,
        dom: &AppDom,
        page: &NodeId,
        location: Location,
    ) -> Result<(), BindingError> {
        let parsed = self.parser().parse(dom, page, &location)?;
        debug!(page = %page, "load page bindings");
        self.page = Some(page.clone());
        self.location = location;
        self.controlled = ControlledBindingStore::new();
        self.install(parsed);
        Ok(())
    }

    /// Parse the current page again after the AppDom changed. Controlled
    /// values are kept.
    pub fn reparse(&mut self, dom: &AppDom) -> Result<(), BindingError> {
        let Some(page) = self.page.clone() else {
            return Ok(());
        };
        let parsed = self.parser().parse(dom, &page, &self.location)?;
        self.install(parsed);
        Ok(())
    }

    /// Follow a location change on the same page
    pub fn set_location(&mut self, dom: &AppDom, location: Location) -> Result<(), BindingError> {
        self.location = location;
        self.reparse(dom)
    }

    pub fn set_globals(&mut self, globals: BTreeMap<String, Value>) {
        self.globals = globals;
        self.results.clear();
        self.dependencies.clear();
        self.evaluate();
    }

    /// Replace the live value of a controlled binding and re-evaluate the
    /// bindings that read it
    pub fn set_controlled_binding(
        &mut self,
        id: &str,
        result: BindingResult,
    ) -> Result<(), BindingError> {
        self.controlled.set_controlled_binding(id, result.clone())?;
        if let Some(binding) = self.parsed.bindings.get_mut(id) {
            binding.source = BindingSource::Result(result);
        }
        let stale = self.invalidate(id);
        debug!(binding = id, stale, "controlled binding changed");
        self.evaluate();
        Ok(())
    }

    /// Evaluate every binding that has no valid memoized result
    pub fn evaluate(&mut self) -> &BTreeMap<String, BindingResult> {
        let memo = std::mem::take(&mut self.results);
        let graph = BindingGraph::new(&self.parsed, &self.globals, &self.evaluator).with_memo(memo);
        graph.evaluate_all();
        let (results, dependencies) = graph.into_parts();
        self.results = results;
        self.dependencies.extend(dependencies);
        &self.results
    }

    pub fn results(&self) -> &BTreeMap<String, BindingResult> {
        &self.results
    }

    pub fn result(&self, id: &str) -> Option<&BindingResult> {
        self.results.get(id)
    }

    pub fn parsed(&self) -> &ParsedBindings {
        &self.parsed
    }

    pub fn controlled(&self) -> &ControlledBindingStore {
        &self.controlled
    }

    pub fn page(&self) -> Option<&NodeId> {
        self.page.as_ref()
    }

    /// The merged evaluated scope: globals plus every binding value at its
    /// scope path. Failed and loading bindings are left out.
    pub fn scope(&self) -> JsonValue {
        let mut root = JsonMap::new();
        for (name, value) in &self.globals {
            root.insert(name.clone(), value.to_json_lossy());
        }
        for (id, binding) in &self.parsed.bindings {
            let Some(path) = &binding.scope_path else {
                continue;
            };
            if let Some(value) = self.results.get(id).and_then(|r| r.value.as_ref()) {
                insert_path(&mut root, path, value.to_json_lossy());
            }
        }
        JsonValue::Object(root)
    }

    /// Props to render one element of the page with
    pub fn element_props(
        &self,
        dom: &AppDom,
        node: &NodeId,
    ) -> Result<BTreeMap<String, Value>, BindingError> {
        let node = dom.get_node(node, Some(NodeType::Element))?;
        let component = node
            .as_element()
            .map(|attrs| attrs.component.as_str())
            .unwrap_or_default();
        Ok(match self.registry.get(component) {
            Some(definition) => resolve_element_props(node, definition, &self.results),
            None => BTreeMap::new(),
        })
    }

    /// End the session, releasing all page state
    pub fn dispose(self) {
        debug!(page = ?self.page, bindings = self.parsed.len(), "dispose binding session");
    }

    fn parser(&self) -> BindingParser<'_> {
        BindingParser::new(&self.registry).with_env(self.env.clone())
    }

    fn install(&mut self, mut parsed: ParsedBindings) {
        self.controlled.sync(&parsed);
        self.controlled.apply(&mut parsed);
        self.parsed = parsed;
        self.results.clear();
        self.dependencies.clear();
        self.evaluate();
    }

    /// Drop the memoized results of `id` and everything that read it,
    /// transitively. Returns how many bindings went stale.
    fn invalidate(&mut self, id: &str) -> usize {
        let mut stale = BTreeSet::from([id.to_string()]);
        let mut queue = vec![id.to_string()];
        while let Some(current) = queue.pop() {
            for (reader, reads) in &self.dependencies {
                if reads.contains(&current) && stale.insert(reader.clone()) {
                    queue.push(reader.clone());
                }
            }
        }
        for id in &stale {
            self.results.remove(id);
            self.dependencies.remove(id);
        }
        stale.len()
    }
}

fn insert_path(root: &mut JsonMap<String, JsonValue>, path: &str, value: JsonValue) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut map = root;
    for segment in segments {
        let entry = map
            .entry(segment)
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
        if !entry.is_object() {
            *entry = JsonValue::Object(JsonMap::new());
        }
        map = match entry {
            JsonValue::Object(children) => children,
            _ => return,
        };
    }
    map.insert(leaf.to_string(), value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{AppDomNode, BindableAttrValue};
    use crate::expr::DirectEvaluator;
    use serde_json::json;

    struct Fixture {
        dom: AppDom,
        page: NodeId,
        input: NodeId,
        text: NodeId,
        other: NodeId,
    }

    fn fixture() -> Fixture {
        let dom = AppDom::new();
        let root = dom.root_id().clone();
        let page = AppDomNode::page("home", None);
        let input = AppDomNode::element("input1", "TextField")
            .with_prop("defaultValue", BindableAttrValue::constant("World"));
        let text = AppDomNode::element("text1", "Text")
            .with_prop("value", BindableAttrValue::expression("`Hello ${input1.value}`"));
        let other = AppDomNode::element("text2", "Text")
            .with_prop("value", BindableAttrValue::expression("'static'"));
        let ids = (page.id.clone(), input.id.clone(), text.id.clone(), other.id.clone());
        let dom = dom
            .add_node(page, &root, "pages", None)
            .and_then(|dom| dom.add_node(input, &ids.0, "children", None))
            .and_then(|dom| dom.add_node(text, &ids.0, "children", None))
            .and_then(|dom| dom.add_node(other, &ids.0, "children", None))
            .unwrap();
        Fixture {
            dom,
            page: ids.0,
            input: ids.1,
            text: ids.2,
            other: ids.3,
        }
    }

    fn session(f: &Fixture) -> BindingSession<DirectEvaluator> {
        let mut session = BindingSession::new(ComponentRegistry::builtin(), DirectEvaluator::default());
        session.load(&f.dom, &f.page, Location::default()).unwrap();
        session
    }

    #[test]
    fn controlled_updates_reach_dependents() {
        let f = fixture();
        let mut session = session(&f);
        let text = format!("{}.props.value", f.text);
        assert_eq!(session.result(&text), Some(&BindingResult::value("Hello World")));

        let input = format!("{}.props.value", f.input);
        session
            .set_controlled_binding(&input, BindingResult::value("Rust"))
            .unwrap();
        assert_eq!(session.result(&text), Some(&BindingResult::value("Hello Rust")));
        assert_eq!(session.result(&input), Some(&BindingResult::value("Rust")));
    }

    #[test]
    fn only_dependents_are_invalidated() {
        let f = fixture();
        let mut session = session(&f);
        let input = format!("{}.props.value", f.input);
        let stale = session.invalidate(&input);
        // The input itself and the text reading it
        assert_eq!(stale, 2);
        assert!(session.result(&format!("{}.props.value", f.other)).is_some());
    }

    #[test]
    fn setting_an_uncontrolled_binding_fails() {
        let f = fixture();
        let mut session = session(&f);
        let err = session
            .set_controlled_binding(&format!("{}.props.value", f.text), BindingResult::value(1.0))
            .unwrap_err();
        assert!(matches!(err, BindingError::NotControlled(_)));
    }

    #[test]
    fn reparse_keeps_live_values() {
        let f = fixture();
        let mut session = session(&f);
        let input = format!("{}.props.value", f.input);
        session
            .set_controlled_binding(&input, BindingResult::value("Rust"))
            .unwrap();
        session.reparse(&f.dom).unwrap();
        assert_eq!(session.result(&input), Some(&BindingResult::value("Rust")));

        // Loading the page again starts from the seeds
        session.load(&f.dom, &f.page, Location::default()).unwrap();
        assert_eq!(session.result(&input), Some(&BindingResult::value("World")));
    }

    #[test]
    fn exports_the_merged_scope() {
        let f = fixture();
        let session = session(&f).with_globals(BTreeMap::from([(
            "app".to_string(),
            Value::from(json!({ "name": "demo" })),
        )]));
        let scope = session.scope();
        assert_eq!(scope["app"]["name"], json!("demo"));
        assert_eq!(scope["text1"]["value"], json!("Hello World"));
        assert_eq!(scope["input1"]["defaultValue"], json!("World"));
    }

    #[test]
    fn element_props_for_rendering() {
        let f = fixture();
        let session = session(&f);
        let props = session.element_props(&f.dom, &f.text).unwrap();
        assert_eq!(props["value"], Value::from("Hello World"));
        assert_eq!(props["variant"], Value::from("body1"));
        assert!(session.element_props(&f.dom, &f.page).is_err());
        session.dispose();
    }
}
