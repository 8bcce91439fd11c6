//! JavaScript-flavoured binding expressions
//!
//! Expressions are parsed into an [`ast::Expr`] and run by a tree-walking
//! [`Interpreter`] against a host [`Scope`]. Two strategies wrap this:
//!
//! - [`SandboxedEvaluator`] copies data in and out of an isolated context per
//!   evaluation. This is the default.
//! - [`DirectEvaluator`] evaluates in place with no copying, for trusted
//!   contexts such as tests and tooling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod ast;
mod builtins;
mod error;
mod interpreter;
pub mod lexer;
pub mod parser;
mod sandbox;
mod value;

pub use error::EvaluationError;
pub use interpreter::{EmptyScope, EvalResult, EvaluatorLimits, Interpreter, Resolved, Scope};
pub use sandbox::SandboxedEvaluator;
pub use value::{number_to_string, string_to_number, Callable, Value};

/// Something that can evaluate a binding expression against a scope
pub trait ExpressionEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvaluationError>;
}

impl<E: ExpressionEvaluator + ?Sized> ExpressionEvaluator for &E {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvaluationError> {
        (**self).evaluate(expression, scope)
    }
}

/// Evaluator with no isolation; scope values are shared with the expression
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectEvaluator {
    limits: EvaluatorLimits,
}

impl DirectEvaluator {
    #[must_use]
    pub fn new(limits: EvaluatorLimits) -> Self {
        Self { limits }
    }
}

impl ExpressionEvaluator for DirectEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvaluationError> {
        let expr = parser::Parser::parse(expression, self.limits.max_nesting_depth)?;
        Interpreter::new(scope, self.limits).evaluate(&expr)
    }
}

/// How expressions are isolated from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationStrategy {
    #[default]
    Sandboxed,
    Direct,
}

impl fmt::Display for EvaluationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EvaluationStrategy::Sandboxed => "sandboxed",
            EvaluationStrategy::Direct => "direct",
        })
    }
}

impl FromStr for EvaluationStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sandboxed" => Ok(EvaluationStrategy::Sandboxed),
            "direct" => Ok(EvaluationStrategy::Direct),
            other => Err(format!(
                "unknown evaluation strategy '{other}' (expected 'sandboxed' or 'direct')"
            )),
        }
    }
}

/// The configured evaluation strategy
#[derive(Debug)]
pub enum Evaluator {
    Sandboxed(SandboxedEvaluator),
    Direct(DirectEvaluator),
}

impl Evaluator {
    #[must_use]
    pub fn new(strategy: EvaluationStrategy, limits: EvaluatorLimits) -> Self {
        match strategy {
            EvaluationStrategy::Sandboxed => Evaluator::Sandboxed(SandboxedEvaluator::new(limits)),
            EvaluationStrategy::Direct => Evaluator::Direct(DirectEvaluator::new(limits)),
        }
    }

    pub fn strategy(&self) -> EvaluationStrategy {
        match self {
            Evaluator::Sandboxed(_) => EvaluationStrategy::Sandboxed,
            Evaluator::Direct(_) => EvaluationStrategy::Direct,
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new(EvaluationStrategy::default(), EvaluatorLimits::default())
    }
}

impl ExpressionEvaluator for Evaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> Result<Value, EvaluationError> {
        match self {
            Evaluator::Sandboxed(inner) => inner.evaluate(expression, scope),
            Evaluator::Direct(inner) => inner.evaluate(expression, scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn strategies_agree_on_plain_data() {
        let scope = BTreeMap::from([("items".to_string(), Value::from(serde_json::json!([1, 2, 3])))]);
        for strategy in [EvaluationStrategy::Sandboxed, EvaluationStrategy::Direct] {
            let evaluator = Evaluator::new(strategy, EvaluatorLimits::default());
            assert_eq!(
                evaluator.evaluate("items.length * 2", &scope).unwrap(),
                Value::Number(6.0)
            );
        }
    }

    #[test]
    fn direct_evaluation_can_return_functions() {
        let value = DirectEvaluator::default()
            .evaluate("x => x", &EmptyScope)
            .unwrap();
        assert_eq!(value.type_of(), "function");
    }

    #[test]
    fn comments_inside_expressions() {
        let evaluator = Evaluator::default();
        assert_eq!(
            evaluator.evaluate("1 /* two */ + 2 // three", &EmptyScope).unwrap(),
            Value::Number(3.0)
        );
        let err = evaluator.evaluate("1 /* open", &EmptyScope).unwrap_err();
        assert_eq!(err.name(), "SyntaxError");
    }

    #[test]
    fn strategy_names() {
        assert_eq!("direct".parse(), Ok(EvaluationStrategy::Direct));
        assert!("quickjs".parse::<EvaluationStrategy>().is_err());
        assert_eq!(EvaluationStrategy::default().to_string(), "sandboxed");
    }

    #[test]
    fn nesting_limit_is_configurable() {
        let limits = EvaluatorLimits {
            max_nesting_depth: 4,
            max_stack_depth: 256,
        };
        let err = DirectEvaluator::new(limits)
            .evaluate("((((((1))))))", &EmptyScope)
            .unwrap_err();
        assert_eq!(err.name(), "SyntaxError");
    }
}
