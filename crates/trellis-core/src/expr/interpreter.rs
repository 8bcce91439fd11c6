//! Tree-walking interpreter for binding expressions
//!
//! Free identifiers are looked up in a host [`Scope`]. A dotted access chain
//! rooted at a free identifier, such as `orders.rows.length`, is handed to
//! the scope as a whole path. This lets a scope resolve only what an
//! expression touches, which is how bindings discover their dependencies.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::ast::{BinOp, Expr, ExprKind, ListItem, Literal, ObjectEntry, PropertyKey, TemplatePart, UnaryOp};
use super::builtins;
use super::error::EvaluationError;
use super::value::{number_to_string, Callable, Value};

pub type EvalResult<T> = Result<T, EvaluationError>;

/// The result of resolving a path prefix in a [`Scope`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub value: Value,
    /// How many leading path segments `value` accounts for (at least 1)
    pub consumed: usize,
}

/// Host-provided variables visible to an expression
pub trait Scope {
    /// Resolve the longest prefix of `path` this scope can answer.
    ///
    /// `path` is never empty. `Ok(None)` means the first segment is unknown,
    /// so the interpreter falls back to builtin globals. Errors, such as a
    /// failed or cyclic dependency, abort the evaluation.
    fn resolve(&self, path: &[&str]) -> EvalResult<Option<Resolved>>;
}

impl Scope for BTreeMap<String, Value> {
    fn resolve(&self, path: &[&str]) -> EvalResult<Option<Resolved>> {
        Ok(path.first().and_then(|name| self.get(*name)).map(|value| Resolved {
            value: value.clone(),
            consumed: 1,
        }))
    }
}

/// A scope with no variables
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn resolve(&self, _path: &[&str]) -> EvalResult<Option<Resolved>> {
        Ok(None)
    }
}

/// Resource limits for a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorLimits {
    /// Deepest syntactic nesting the parser accepts
    pub max_nesting_depth: usize,
    /// Deepest evaluation recursion, including function calls
    pub max_stack_depth: usize,
}

impl Default for EvaluatorLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: 128,
            max_stack_depth: 256,
        }
    }
}

/// Evaluates one expression tree against a scope
pub struct Interpreter<'s> {
    scope: &'s dyn Scope,
    /// Local variables of the innermost arrow function call
    locals: Vec<BTreeMap<String, Value>>,
    depth: usize,
    limits: EvaluatorLimits,
}

impl<'s> Interpreter<'s> {
    pub fn new(scope: &'s dyn Scope, limits: EvaluatorLimits) -> Self {
        Self {
            scope,
            locals: Vec::new(),
            depth: 0,
            limits,
        }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.eval(expr)
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        self.depth += 1;
        let result = if self.depth > self.limits.max_stack_depth {
            Err(EvaluationError::stack_overflow())
        } else {
            self.eval_kind(expr)
        };
        self.depth -= 1;
        result
    }

    fn eval_kind(&mut self, expr: &Expr) -> EvalResult<Value> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Ident(name) => self.lookup(name),
            ExprKind::Template(parts) => self.eval_template(parts),
            ExprKind::Array(items) => self.eval_list(items).map(Value::array),
            ExprKind::Object(entries) => self.eval_object(entries),
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => {
                Ok(self.eval_link(expr)?.unwrap_or_default())
            }
            ExprKind::OptionalChain(inner) => Ok(self.eval_link(inner)?.unwrap_or_default()),
            ExprKind::Unary { op, operand } => self.eval_unary(*op, operand),
            ExprKind::Binary { left, op, right } => self.eval_binary(left, *op, right),
            ExprKind::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test)?.is_truthy() {
                    self.eval(consequent)
                } else {
                    self.eval(alternate)
                }
            }
            ExprKind::Arrow(function) => Ok(Value::Function(Arc::new(Callable::Closure {
                function: Arc::clone(function),
                captured: self.locals.last().cloned().unwrap_or_default(),
            }))),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.locals
            .last()
            .is_some_and(|frame| frame.contains_key(name))
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(value) = self.locals.last().and_then(|frame| frame.get(name)) {
            return Ok(value.clone());
        }
        self.resolve_path(&[name])
    }

    /// Resolve a free access path through the scope, then builtin globals
    fn resolve_path(&self, path: &[&str]) -> EvalResult<Value> {
        let (mut value, consumed) = match self.scope.resolve(path)? {
            Some(Resolved { value, consumed }) => (value, consumed.max(1)),
            None => match builtins::global(path[0]) {
                Some(value) => (value, 1),
                None => return Err(EvaluationError::Reference(path[0].to_string())),
            },
        };
        for segment in path.iter().skip(consumed) {
            value = builtins::get_property(&value, segment)?;
        }
        Ok(value)
    }

    /// `a.b.c` with a free root and no optional links, root first
    fn static_path<'e>(&self, expr: &'e Expr) -> Option<Vec<&'e str>> {
        let mut segments = Vec::new();
        let mut current = expr;
        loop {
            match &current.kind {
                ExprKind::Member {
                    object,
                    property,
                    optional: false,
                } => {
                    segments.push(property.as_str());
                    current = object;
                }
                ExprKind::Ident(name) if !self.is_local(name) => {
                    segments.push(name.as_str());
                    segments.reverse();
                    return Some(segments);
                }
                _ => return None,
            }
        }
    }

    /// Evaluate one link of a member/call chain. `None` means an optional
    /// link short-circuited and the enclosing chain yields `undefined`.
    fn eval_link(&mut self, expr: &Expr) -> EvalResult<Option<Value>> {
        match &expr.kind {
            ExprKind::Member {
                object,
                property,
                optional,
            } => {
                if let Some(path) = self.static_path(expr) {
                    return self.resolve_path(&path).map(Some);
                }
                let Some(target) = self.eval_link(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                builtins::get_property(&target, property).map(Some)
            }
            ExprKind::Index {
                object,
                index,
                optional,
            } => {
                let Some(target) = self.eval_link(object)? else {
                    return Ok(None);
                };
                if *optional && target.is_nullish() {
                    return Ok(None);
                }
                let key = property_key(&self.eval(index)?);
                builtins::get_property(&target, &key).map(Some)
            }
            ExprKind::Call {
                callee,
                args,
                optional,
            } => {
                let Some(function) = self.eval_link(callee)? else {
                    return Ok(None);
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_list(args)?;
                match &function {
                    Value::Function(callable) => self.call(callable, args).map(Some),
                    _ => Err(EvaluationError::not_a_function(&describe(callee))),
                }
            }
            _ => self.eval(expr).map(Some),
        }
    }

    /// Invoke a callable with already evaluated arguments
    pub(crate) fn call(&mut self, callable: &Callable, args: Vec<Value>) -> EvalResult<Value> {
        match callable {
            Callable::Closure { function, captured } => {
                let mut frame = captured.clone();
                let mut args = args.into_iter();
                for param in &function.params {
                    frame.insert(param.clone(), args.next().unwrap_or_default());
                }
                self.locals.push(frame);
                let result = self.eval(&function.body);
                self.locals.pop();
                result
            }
            Callable::Native(name) => builtins::call_native(self, name, &args),
            Callable::Method { receiver, name } => builtins::call_method(self, receiver, name, &args),
        }
    }

    fn eval_template(&mut self, parts: &[TemplatePart]) -> EvalResult<Value> {
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Substitution(expr) => out.push_str(&self.eval(expr)?.to_js_string()),
            }
        }
        Ok(Value::from(out))
    }

    /// Array items or call arguments, expanding spreads
    fn eval_list(&mut self, items: &[ListItem]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ListItem::Item(expr) => out.push(self.eval(expr)?),
                ListItem::Spread(expr) => match self.eval(expr)? {
                    Value::Array(values) => out.extend(values.iter().cloned()),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::from(c.to_string()))),
                    other => {
                        return Err(EvaluationError::Type(format!(
                            "{} is not iterable",
                            other.type_label()
                        )))
                    }
                },
            }
        }
        Ok(out)
    }

    fn eval_object(&mut self, entries: &[ObjectEntry]) -> EvalResult<Value> {
        let mut map = BTreeMap::new();
        for entry in entries {
            match entry {
                ObjectEntry::Property { key, value } => {
                    let key = match key {
                        PropertyKey::Static(name) => name.clone(),
                        PropertyKey::Computed(expr) => property_key(&self.eval(expr)?),
                    };
                    let value = self.eval(value)?;
                    map.insert(key, value);
                }
                ObjectEntry::Spread(expr) => match self.eval(expr)? {
                    Value::Object(source) => {
                        map.extend(source.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                    Value::Array(items) => {
                        map.extend(
                            items
                                .iter()
                                .enumerate()
                                .map(|(i, v)| (i.to_string(), v.clone())),
                        );
                    }
                    Value::String(s) => {
                        map.extend(
                            s.chars()
                                .enumerate()
                                .map(|(i, c)| (i.to_string(), Value::from(c.to_string()))),
                        );
                    }
                    // Spreading primitives and nullish values adds nothing
                    _ => {}
                },
            }
        }
        Ok(Value::object(map))
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr) -> EvalResult<Value> {
        if op == UnaryOp::Typeof {
            return match self.eval(operand) {
                Ok(value) => Ok(Value::from(value.type_of())),
                // `typeof undeclared` is not an error
                Err(EvaluationError::Reference(name))
                    if matches!(&operand.kind, ExprKind::Ident(id) if *id == name) =>
                {
                    Ok(Value::from("undefined"))
                }
                Err(err) => Err(err),
            };
        }
        let value = self.eval(operand)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.is_truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Typeof => Value::from(value.type_of()),
        })
    }

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr) -> EvalResult<Value> {
        let lhs = self.eval(left)?;
        match op {
            BinOp::And if !lhs.is_truthy() => return Ok(lhs),
            BinOp::Or if lhs.is_truthy() => return Ok(lhs),
            BinOp::Coalesce if !lhs.is_nullish() => return Ok(lhs),
            BinOp::And | BinOp::Or | BinOp::Coalesce => return self.eval(right),
            _ => {}
        }
        let rhs = self.eval(right)?;
        Ok(binary_op(op, &lhs, &rhs))
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::string(s),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Property key for `obj[key]` and computed object keys
fn property_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.to_string(),
        Value::Number(n) => number_to_string(*n),
        other => other.to_js_string(),
    }
}

/// Source-like rendering of a callee for error messages
fn describe(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Ident(name) => name.clone(),
        ExprKind::Member {
            object, property, ..
        } => format!("{}.{}", describe(object), property),
        ExprKind::OptionalChain(inner) => describe(inner),
        ExprKind::Call { callee, .. } => format!("{}(...)", describe(callee)),
        ExprKind::Index { object, .. } => format!("{}[...]", describe(object)),
        _ => "(intermediate value)".to_string(),
    }
}

/// Non-short-circuiting binary operators
pub(crate) fn binary_op(op: BinOp, lhs: &Value, rhs: &Value) -> Value {
    match op {
        BinOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::String(_)) || v.is_reference();
            if stringy(lhs) || stringy(rhs) {
                Value::from(lhs.to_js_string() + &rhs.to_js_string())
            } else {
                Value::Number(lhs.to_number() + rhs.to_number())
            }
        }
        BinOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinOp::Mod => Value::Number(lhs.to_number() % rhs.to_number()),
        BinOp::Pow => Value::Number(lhs.to_number().powf(rhs.to_number())),
        BinOp::Eq => Value::Bool(lhs.loose_equals(rhs)),
        BinOp::Ne => Value::Bool(!lhs.loose_equals(rhs)),
        BinOp::StrictEq => Value::Bool(lhs.strict_equals(rhs)),
        BinOp::StrictNe => Value::Bool(!lhs.strict_equals(rhs)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => lhs.to_number().partial_cmp(&rhs.to_number()),
            };
            Value::Bool(match (op, ordering) {
                (_, None) => false,
                (BinOp::Lt, Some(o)) => o.is_lt(),
                (BinOp::Le, Some(o)) => o.is_le(),
                (BinOp::Gt, Some(o)) => o.is_gt(),
                (_, Some(o)) => o.is_ge(),
            })
        }
        // Short-circuit operators are handled by the interpreter
        BinOp::And => Value::Bool(lhs.is_truthy() && rhs.is_truthy()),
        BinOp::Or => Value::Bool(lhs.is_truthy() || rhs.is_truthy()),
        BinOp::Coalesce => {
            if lhs.is_nullish() {
                rhs.clone()
            } else {
                lhs.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse_expression;
    use serde_json::json;

    fn eval_in(source: &str, scope: &dyn Scope) -> EvalResult<Value> {
        let expr = parse_expression(source)?;
        Interpreter::new(scope, EvaluatorLimits::default()).evaluate(&expr)
    }

    fn eval(source: &str) -> Value {
        eval_in(source, &EmptyScope).unwrap_or_else(|e| panic!("{source:?} failed: {e}"))
    }

    fn json_of(source: &str) -> serde_json::Value {
        eval(source).to_json().unwrap()
    }

    fn scope(json: serde_json::Value) -> BTreeMap<String, Value> {
        let serde_json::Value::Object(map) = json else {
            panic!("scope must be an object");
        };
        map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(json_of("1 + 2 * 3"), json!(7));
        assert_eq!(json_of("(1 + 2) * 3"), json!(9));
        assert_eq!(json_of("2 ** 3 ** 2"), json!(512));
        assert_eq!(json_of("7 % 3"), json!(1));
        assert_eq!(json_of("-(3)"), json!(-3));
        assert!(matches!(eval("1 / 0"), Value::Number(n) if n.is_infinite()));
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(json_of("'a' + 1"), json!("a1"));
        assert_eq!(json_of("1 + 2 + 'x'"), json!("3x"));
        assert_eq!(json_of("[1, 2] + ''"), json!("1,2"));
        assert_eq!(json_of("`sum: ${1 + 1}`"), json!("sum: 2"));
    }

    #[test]
    fn logical_operators_return_operands() {
        assert_eq!(json_of("0 || 'fallback'"), json!("fallback"));
        assert_eq!(json_of("'a' && 'b'"), json!("b"));
        assert_eq!(json_of("null ?? 0"), json!(0));
        assert_eq!(json_of("0 ?? 1"), json!(0));
        // The right side is never evaluated
        assert_eq!(json_of("true || missing"), json!(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(json_of("1 < 2"), json!(true));
        assert_eq!(json_of("'b' > 'a'"), json!(true));
        assert_eq!(json_of("'10' < 9"), json!(false));
        assert_eq!(json_of("1 == '1'"), json!(true));
        assert_eq!(json_of("1 === '1'"), json!(false));
        assert_eq!(json_of("null == undefined"), json!(true));
    }

    #[test]
    fn scope_lookup() {
        let scope = scope(json!({ "user": { "name": "Ada", "tags": ["x", "y"] } }));
        assert_eq!(eval_in("user.name", &scope).unwrap(), Value::from("Ada"));
        assert_eq!(eval_in("user.tags.length", &scope).unwrap(), Value::Number(2.0));
        assert_eq!(eval_in("user['tags'][1]", &scope).unwrap(), Value::from("y"));
        assert_eq!(eval_in("user.missing", &scope).unwrap(), Value::Undefined);
    }

    #[test]
    fn unknown_identifier_is_a_reference_error() {
        let err = eval_in("nope + 1", &EmptyScope).unwrap_err();
        assert_eq!(err, EvaluationError::Reference("nope".into()));
        assert_eq!(err.to_string(), "nope is not defined");
        assert_eq!(json_of("typeof nope"), json!("undefined"));
    }

    #[test]
    fn reading_through_undefined_is_a_type_error() {
        let scope = scope(json!({ "user": {} }));
        let err = eval_in("user.address.street", &scope).unwrap_err();
        assert_eq!(
            err,
            EvaluationError::Type("Cannot read properties of undefined (reading 'street')".into())
        );
    }

    #[test]
    fn optional_chaining_short_circuits() {
        let scope = scope(json!({ "user": { "address": null } }));
        assert_eq!(eval_in("user.address?.street.name", &scope).unwrap(), Value::Undefined);
        assert_eq!(eval_in("user.nothing?.()", &scope).unwrap(), Value::Undefined);
        assert_eq!(eval_in("user?.['address']", &scope).unwrap(), Value::Null);
        assert!(eval_in("(user.address?.street).name", &scope).is_err());
    }

    #[test]
    fn arrow_functions_capture_locals() {
        assert_eq!(json_of("[1, 2, 3].map(x => x * 2)"), json!([2, 4, 6]));
        assert_eq!(json_of("((a) => (b) => a + b)(1)(2)"), json!(3));
        assert_eq!(json_of("((x) => x)()"), serde_json::Value::Null);
    }

    #[test]
    fn locals_shadow_scope() {
        let scope = scope(json!({ "x": 10 }));
        assert_eq!(eval_in("[1].map(x => x + 1)[0]", &scope).unwrap(), Value::Number(2.0));
        assert_eq!(eval_in("[1].map(y => x + y)[0]", &scope).unwrap(), Value::Number(11.0));
    }

    #[test]
    fn calling_a_non_function() {
        let scope = scope(json!({ "user": { "name": "Ada" } }));
        let err = eval_in("user.name()", &scope).unwrap_err();
        assert_eq!(err, EvaluationError::Type("user.name is not a function".into()));
    }

    #[test]
    fn object_and_array_literals() {
        assert_eq!(
            json_of("({ a: 1, ...{ b: 2 }, ['c' + 1]: 3 })"),
            json!({ "a": 1, "b": 2, "c1": 3 })
        );
        assert_eq!(json_of("[0, ...[1, 2], ...'ab']"), json!([0, 1, 2, "a", "b"]));
        let scope = scope(json!({ "a": 5 }));
        assert_eq!(
            eval_in("({ a })", &scope).unwrap().to_json().unwrap(),
            json!({ "a": 5 })
        );
    }

    #[test]
    fn runaway_recursion_is_a_range_error() {
        let expr = parse_expression("(f => f(f))(f => f(f))").unwrap();
        let limits = EvaluatorLimits {
            max_nesting_depth: 128,
            max_stack_depth: 32,
        };
        let err = Interpreter::new(&EmptyScope, limits)
            .evaluate(&expr)
            .unwrap_err();
        assert_eq!(err, EvaluationError::stack_overflow());
    }

    #[test]
    fn conditional() {
        assert_eq!(json_of("1 > 2 ? 'a' : 'b'"), json!("b"));
    }
}
