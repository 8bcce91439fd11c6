//! Evaluates a page's bindings against a live scope
//!
//! Dependencies are not declared up front. Evaluating an expression resolves
//! the names it reads through the graph, which evaluates those bindings on
//! demand, memoizes them and records the edge. A binding that is read while
//! it is still being evaluated closes a cycle.
//!
//! Nested evaluation is capped at [`MAX_BINDING_DEPTH`]. A read past the cap
//! abandons the whole chain without memoizing any of it; the pass then
//! evaluates the deep binding from the top and retries the chain, so long
//! acyclic chains still resolve with a bounded stack.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, trace};

use super::scope::{Found, ScopeTree};
use super::{BindingResult, BindingSource, ParsedBindings};
use crate::expr::{EvalResult, EvaluationError, ExpressionEvaluator, Resolved, Scope, Value};

/// Deepest chain of bindings evaluated inside one another
const MAX_BINDING_DEPTH: usize = 32;

#[derive(Debug, Default)]
struct GraphState {
    results: BTreeMap<String, BindingResult>,
    /// Bindings currently being evaluated, innermost last
    active: Vec<String>,
    /// Abandoned chains waiting on a deeper binding, outermost first
    waiting: Vec<String>,
    /// Binding whose read went past the depth cap in the current attempt
    deferred: Option<String>,
    /// For each evaluated expression, the bindings it read
    dependencies: BTreeMap<String, BTreeSet<String>>,
}

impl GraphState {
    fn in_progress(&self, id: &str) -> bool {
        self.active.iter().chain(&self.waiting).any(|entry| entry == id)
    }
}

/// One evaluation pass over a page's bindings
pub struct BindingGraph<'a, E: ?Sized> {
    parsed: &'a ParsedBindings,
    tree: ScopeTree,
    evaluator: &'a E,
    state: RefCell<GraphState>,
}

impl<'a, E: ExpressionEvaluator + ?Sized> BindingGraph<'a, E> {
    /// `globals` are exposed alongside the bindings; a binding path wins over
    /// a global of the same name
    pub fn new(
        parsed: &'a ParsedBindings,
        globals: &BTreeMap<String, Value>,
        evaluator: &'a E,
    ) -> Self {
        let mut tree = ScopeTree::new();
        for (name, value) in globals {
            tree.insert_value(name, value.clone());
        }
        for (id, binding) in &parsed.bindings {
            if let Some(path) = &binding.scope_path {
                tree.insert_binding(path, id);
            }
        }
        Self {
            parsed,
            tree,
            evaluator,
            state: RefCell::new(GraphState::default()),
        }
    }

    /// Reuse results from an earlier pass that are still valid
    #[must_use]
    pub fn with_memo(self, memo: BTreeMap<String, BindingResult>) -> Self {
        self.state.borrow_mut().results = memo;
        self
    }

    /// Evaluate every binding in ascending id order
    #[instrument(level = "debug", skip_all, fields(bindings = self.parsed.len()))]
    pub fn evaluate_all(&self) -> BTreeMap<String, BindingResult> {
        for id in self.parsed.bindings.keys() {
            self.resolve_top_level(id);
        }
        let state = self.state.borrow();
        let errors = state.results.values().filter(|r| r.error.is_some()).count();
        let loading = state.results.values().filter(|r| r.loading).count();
        debug!(errors, loading, "evaluated bindings");
        state.results.clone()
    }

    /// Evaluate `id`, first settling any binding its chain was too deep to reach
    fn resolve_top_level(&self, id: &str) {
        self.state.borrow_mut().waiting.push(id.to_string());
        loop {
            let Some(next) = self.state.borrow().waiting.last().cloned() else {
                break;
            };
            self.compute(&next);
            let mut state = self.state.borrow_mut();
            match state.deferred.take() {
                Some(deep) => {
                    trace!(binding = %next, deep = %deep, "chain too deep, settling dependency first");
                    state.waiting.push(deep);
                }
                None => {
                    state.waiting.pop();
                }
            }
        }
    }

    /// Results plus the recorded dependency edges
    pub fn into_parts(self) -> (BTreeMap<String, BindingResult>, BTreeMap<String, BTreeSet<String>>) {
        let state = self.state.into_inner();
        (state.results, state.dependencies)
    }

    fn scope_path(&self, id: &str) -> String {
        self.parsed
            .get(id)
            .and_then(|binding| binding.scope_path.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Evaluate a binding unless memoized
    fn compute(&self, id: &str) -> BindingResult {
        if let Some(done) = self.state.borrow().results.get(id) {
            return done.clone();
        }
        let Some(binding) = self.parsed.get(id) else {
            return BindingResult::error(EvaluationError::Reference(id.to_string()));
        };

        let result = match &binding.source {
            BindingSource::Result(result) => result.clone(),
            BindingSource::Expression(source) => {
                self.state.borrow_mut().active.push(id.to_string());
                let outcome = self.evaluator.evaluate(source, self);
                self.state.borrow_mut().active.pop();
                match outcome {
                    Ok(value) => BindingResult::value(value),
                    Err(EvaluationError::Pending) => BindingResult::loading(),
                    Err(error) => {
                        trace!(binding = id, %error, "binding failed");
                        BindingResult::error(error)
                    }
                }
            }
        };
        let mut state = self.state.borrow_mut();
        // Part of an abandoned chain; retried once the deep binding settles
        if state.deferred.is_none() {
            state.results.insert(id.to_string(), result.clone());
        }
        result
    }

    /// Value of a binding as read by another expression
    fn read_binding(&self, id: &str) -> EvalResult<Value> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(reader) = state.active.last().cloned() {
                state.dependencies.entry(reader).or_default().insert(id.to_string());
            }
            if state.in_progress(id) {
                return Err(EvaluationError::Cycle(self.scope_path(id)));
            }
            if state.active.len() >= MAX_BINDING_DEPTH && !state.results.contains_key(id) {
                state.deferred.get_or_insert_with(|| id.to_string());
                return Err(EvaluationError::stack_overflow());
            }
        }
        self.compute(id).outcome()
    }

    fn read(&self, found: Found<'_>) -> EvalResult<Value> {
        match found {
            Found::Binding(id) => self.read_binding(id),
            Found::Value(value) => Ok(value.clone()),
            Found::Missing => Ok(Value::Undefined),
            Found::Namespace(tree) => {
                let mut object = BTreeMap::new();
                for (name, member) in tree.members() {
                    object.insert(name.to_string(), self.read(member)?);
                }
                Ok(Value::object(object))
            }
        }
    }
}

impl<E: ExpressionEvaluator + ?Sized> Scope for BindingGraph<'_, E> {
    fn resolve(&self, path: &[&str]) -> EvalResult<Option<Resolved>> {
        let Some((found, consumed)) = self.tree.walk(path) else {
            return Ok(None);
        };
        Ok(Some(Resolved {
            value: self.read(found)?,
            consumed,
        }))
    }
}

/// Evaluate every binding of a page in one pass
pub fn eval_bindings<E: ExpressionEvaluator + ?Sized>(
    parsed: &ParsedBindings,
    globals: &BTreeMap<String, Value>,
    evaluator: &E,
) -> BTreeMap<String, BindingResult> {
    BindingGraph::new(parsed, globals, evaluator).evaluate_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::ParsedBinding;
    use crate::expr::{DirectEvaluator, Evaluator};
    use serde_json::json;

    fn bindings(entries: &[(&str, ParsedBinding)]) -> ParsedBindings {
        let mut parsed = ParsedBindings::default();
        for (id, binding) in entries {
            parsed.insert(*id, binding.clone());
        }
        parsed
    }

    fn expr(path: &str, source: &str) -> ParsedBinding {
        ParsedBinding::expression(Some(path), source)
    }

    fn constant(path: &str, value: serde_json::Value) -> ParsedBinding {
        ParsedBinding::result(Some(path), BindingResult::value(value))
    }

    fn eval(parsed: &ParsedBindings) -> BTreeMap<String, BindingResult> {
        eval_bindings(parsed, &BTreeMap::new(), &Evaluator::default())
    }

    fn error_message(result: &BindingResult) -> String {
        result.error.as_ref().map(ToString::to_string).unwrap_or_default()
    }

    #[test]
    fn dependent_bindings() {
        let parsed = bindings(&[("a", constant("a", json!(1))), ("b", expr("b", "a + 1"))]);
        let results = eval(&parsed);
        assert_eq!(results["a"], BindingResult::value(1.0));
        assert_eq!(results["b"], BindingResult::value(2.0));
    }

    #[test]
    fn dependencies_are_evaluated_on_demand() {
        // `a` sorts first but needs `b`
        let parsed = bindings(&[
            ("a", expr("first", "second * 2")),
            ("b", expr("second", "21")),
        ]);
        let results = eval(&parsed);
        assert_eq!(results["a"], BindingResult::value(42.0));
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let parsed = bindings(&[("self", expr("self.value", "self.value"))]);
        let results = eval(&parsed);
        assert_eq!(error_message(&results["self"]), "Cycle detected \"self.value\"");
    }

    #[test]
    fn mutual_references_report_the_entry_point() {
        let parsed = bindings(&[
            ("x", expr("x.value", "y.value + 1")),
            ("y", expr("y.value", "x.value + 1")),
        ]);
        let results = eval(&parsed);
        assert_eq!(error_message(&results["x"]), "Cycle detected \"x.value\"");
        assert_eq!(error_message(&results["y"]), "Cycle detected \"x.value\"");
    }

    #[test]
    fn cycle_tag_follows_id_order() {
        // Same cycle, but `y.value` now has the lower id and is entered first
        let parsed = bindings(&[
            ("b", expr("x.value", "y.value + 1")),
            ("a", expr("y.value", "x.value + 1")),
        ]);
        let results = eval(&parsed);
        assert_eq!(error_message(&results["a"]), "Cycle detected \"y.value\"");
        assert_eq!(error_message(&results["b"]), "Cycle detected \"y.value\"");
    }

    #[test]
    fn missing_reference() {
        let parsed = bindings(&[("m", expr("m", "missing.value"))]);
        let results = eval(&parsed);
        assert_eq!(error_message(&results["m"]), "missing is not defined");
    }

    #[test]
    fn errors_stay_with_their_binding() {
        let parsed = bindings(&[
            ("bad", expr("bad", "(")),
            ("good", expr("good", "1 + 1")),
            ("reader", expr("reader", "bad + good")),
        ]);
        let results = eval(&parsed);
        assert_eq!(results["bad"].error.as_ref().unwrap().name(), "SyntaxError");
        assert_eq!(results["good"], BindingResult::value(2.0));
        assert_eq!(results["reader"].error, results["bad"].error);
    }

    #[test]
    fn loading_propagates_to_readers() {
        let parsed = bindings(&[
            ("q", ParsedBinding::result(Some("orders.data"), BindingResult::loading())),
            ("f", ParsedBinding::result(Some("orders.isLoading"), BindingResult::value(true))),
            ("n", expr("count", "orders.data.length")),
            ("s", expr("status", "orders.isLoading ? 'wait' : 'done'")),
        ]);
        let results = eval(&parsed);
        assert_eq!(results["n"], BindingResult::loading());
        assert_eq!(results["s"], BindingResult::value("wait"));
    }

    #[test]
    fn namespaces_read_as_objects() {
        let parsed = bindings(&[
            ("a", constant("input.value", json!("x"))),
            ("b", constant("input.label", json!("Name"))),
            ("c", expr("dump", "JSON.stringify(input)")),
        ]);
        let results = eval(&parsed);
        assert_eq!(
            results["c"],
            BindingResult::value("{\"label\":\"Name\",\"value\":\"x\"}")
        );
    }

    #[test]
    fn globals_are_visible() {
        let parsed = bindings(&[("a", expr("a", "user.name.toUpperCase()"))]);
        let globals = BTreeMap::from([(
            "user".to_string(),
            Value::from(json!({ "name": "ada" })),
        )]);
        let results = eval_bindings(&parsed, &globals, &DirectEvaluator::default());
        assert_eq!(results["a"], BindingResult::value("ADA"));
    }

    fn chain(len: usize, last: &str) -> ParsedBindings {
        let mut parsed = ParsedBindings::default();
        for i in 0..len {
            let source = if i + 1 == len { last.to_string() } else { format!("v{} + 1", i + 1) };
            parsed.insert(format!("{i:03}"), expr(&format!("v{i}"), &source));
        }
        parsed
    }

    #[test]
    fn long_chains_resolve() {
        let results = eval(&chain(100, "0"));
        for i in 0..100 {
            assert_eq!(
                results[&format!("{i:03}")],
                BindingResult::value((99 - i) as f64),
                "link {i}"
            );
        }
    }

    #[test]
    fn long_cycles_report_the_entry_point() {
        let results = eval(&chain(50, "v0 + 1"));
        for i in 0..50 {
            assert_eq!(
                error_message(&results[&format!("{i:03}")]),
                "Cycle detected \"v0\"",
                "link {i}"
            );
        }
    }

    #[test]
    fn records_dependencies() {
        let parsed = bindings(&[("a", constant("a", json!(1))), ("b", expr("b", "a + a"))]);
        let globals = BTreeMap::new();
        let evaluator = DirectEvaluator::default();
        let graph = BindingGraph::new(&parsed, &globals, &evaluator);
        graph.evaluate_all();
        let (_, dependencies) = graph.into_parts();
        assert_eq!(dependencies["b"], BTreeSet::from(["a".to_string()]));
    }
}
