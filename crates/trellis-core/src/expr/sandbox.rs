//! Isolated evaluation contexts
//!
//! Every evaluation gets a fresh [`SandboxContext`]. The context owns the
//! interpreter for that one run, along with its local variables, and only
//! sees the caller's scope through a marshalling view: each value it reads
//! is copied in as plain JSON data and the result is copied back out the
//! same way. Nothing survives the context, so an expression can never hold
//! on to host objects or leak functions to the caller.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tracing::trace;

use super::ast::Expr;
use super::error::EvaluationError;
use super::interpreter::{EvalResult, EvaluatorLimits, Interpreter, Resolved, Scope};
use super::parser::Parser;
use super::value::Value;
use super::ExpressionEvaluator;

/// Evaluator that runs each expression in its own isolated context
#[derive(Debug, Default)]
pub struct SandboxedEvaluator {
    limits: EvaluatorLimits,
    live: AtomicUsize,
    next_id: AtomicU64,
}

impl SandboxedEvaluator {
    #[must_use]
    pub fn new(limits: EvaluatorLimits) -> Self {
        Self {
            limits,
            live: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn limits(&self) -> EvaluatorLimits {
        self.limits
    }

    /// Number of contexts currently alive; zero whenever no evaluation runs
    pub fn active_contexts(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> SandboxContext<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::SeqCst);
        trace!(context = id, "acquire sandbox context");
        SandboxContext {
            id,
            live: &self.live,
            limits: self.limits,
        }
    }
}

/// A live evaluation context, released on drop whatever the outcome
struct SandboxContext<'a> {
    id: u64,
    live: &'a AtomicUsize,
    limits: EvaluatorLimits,
}

impl SandboxContext<'_> {
    /// Run `expr` with its own interpreter against a marshalled view of `scope`
    fn run(&self, expr: &Expr, scope: &dyn Scope) -> EvalResult<Value> {
        let scope = MarshalledScope { inner: scope };
        let mut interpreter = Interpreter::new(&scope, self.limits);
        let result = marshal(interpreter.evaluate(expr)?);
        if let Err(err) = &result {
            trace!(context = self.id, error = %err, "result could not leave the sandbox");
        }
        result
    }
}

impl Drop for SandboxContext<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        trace!(context = self.id, "release sandbox context");
    }
}

/// Copy a value across the sandbox boundary as plain data
fn marshal(value: Value) -> EvalResult<Value> {
    if value.is_undefined() {
        return Ok(value);
    }
    value.to_json().map(Value::from)
}

/// Scope view whose values are copied into the context on access
struct MarshalledScope<'a> {
    inner: &'a dyn Scope,
}

impl Scope for MarshalledScope<'_> {
    fn resolve(&self, path: &[&str]) -> EvalResult<Option<Resolved>> {
        match self.inner.resolve(path)? {
            Some(Resolved { value, consumed }) => Ok(Some(Resolved {
                value: marshal(value)?,
                consumed,
            })),
            None => Ok(None),
        }
    }
}

impl ExpressionEvaluator for SandboxedEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvaluationError> {
        let context = self.acquire();
        let expr = Parser::parse(expression, self.limits.max_nesting_depth)?;
        context.run(&expr, scope)
    }
}
