//! Runtime values for binding expressions
//!
//! Values follow JavaScript semantics for the subset bindings use: `undefined`
//! and `null` are distinct, numbers are `f64`, strings are immutable, and
//! arrays, objects and functions are shared by reference.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

use super::ast::ArrowFunction;
use super::error::EvaluationError;

/// A runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Arc<Vec<Value>>),
    Object(Arc<BTreeMap<String, Value>>),
    Function(Arc<Callable>),
}

/// Something that can be called
#[derive(Debug)]
pub enum Callable {
    /// An arrow function with the local variables visible where it was created
    Closure {
        function: Arc<ArrowFunction>,
        captured: BTreeMap<String, Value>,
    },
    /// A global builtin such as `Math.max`
    Native(&'static str),
    /// A builtin method bound to its receiver, such as `[1, 2].map`
    Method {
        receiver: Value,
        name: &'static str,
    },
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Closure { .. } => "anonymous",
            Callable::Native(name) | Callable::Method { name, .. } => name,
        }
    }
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn object(entries: BTreeMap<String, Value>) -> Self {
        Value::Object(Arc::new(entries))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Result of the `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null | Value::Array(_) | Value::Object(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    /// Short type label for diagnostics
    pub fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            other => other.type_of(),
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Numeric conversion (`Number(x)`)
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined | Value::Function(_) | Value::Object(_) => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => single.to_number(),
                _ => f64::NAN,
            },
        }
    }

    /// String conversion (`String(x)`)
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Array(items) => join(items, ","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(callable) => format!("function {}() {{ [code] }}", callable.name()),
        }
    }

    /// Arrays, objects and functions; everything else is a primitive
    pub fn is_reference(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_) | Value::Function(_))
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValueZero, used by `includes`: like `===` but NaN equals NaN
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => {
                if self.is_reference() || other.is_reference() {
                    Value::string(self.to_js_string()).loose_equals(&Value::string(other.to_js_string()))
                } else {
                    self.to_number() == other.to_number()
                }
            }
            (a, b) if a.is_reference() != b.is_reference() => {
                a.to_js_string() == b.to_js_string()
            }
            _ => self.strict_equals(other),
        }
    }

    /// Convert from JSON
    pub fn from_json(json: &JsonValue) -> Value {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(*b),
            JsonValue::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            JsonValue::String(s) => Value::string(s),
            JsonValue::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON, failing on functions.
    ///
    /// `undefined` becomes `null` at the top level and inside arrays and is
    /// dropped from objects, as `JSON.stringify` does.
    pub fn to_json(&self) -> Result<JsonValue, EvaluationError> {
        self.to_json_with(&|callable| {
            Err(EvaluationError::Marshal(format!(
                "function {} could not be cloned",
                callable.name()
            )))
        })
    }

    /// Convert to JSON, turning functions into `null`
    pub fn to_json_lossy(&self) -> JsonValue {
        self.to_json_with(&|_| Ok(JsonValue::Null))
            .unwrap_or(JsonValue::Null)
    }

    fn to_json_with(
        &self,
        on_function: &dyn Fn(&Callable) -> Result<JsonValue, EvaluationError>,
    ) -> Result<JsonValue, EvaluationError> {
        Ok(match self {
            Value::Undefined | Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => JsonValue::String(s.to_string()),
            Value::Array(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| item.to_json_with(on_function))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => {
                let mut out = JsonMap::new();
                for (key, value) in map.iter() {
                    if !value.is_undefined() {
                        out.insert(key.clone(), value.to_json_with(on_function)?);
                    }
                }
                JsonValue::Object(out)
            }
            Value::Function(callable) => on_function(callable)?,
        })
    }
}

impl PartialEq for Value {
    /// Structural equality for data, identity for functions
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_js_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Value::from_json(&json)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        JsonValue::deserialize(deserializer).map(Value::from)
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|item| {
            if item.is_nullish() {
                String::new()
            } else {
                item.to_js_string()
            }
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// `Array.prototype.join` element conversion
pub(crate) fn join_values(items: &[Value], separator: &str) -> String {
    join(items, separator)
}

fn number_to_json(n: f64) -> JsonValue {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        // Integral values serialize without a trailing `.0`
        JsonValue::Number(JsonNumber::from(n as i64))
    } else {
        JsonNumber::from_f64(n).map_or(JsonValue::Null, JsonValue::Number)
    }
}

/// Format a number the way JavaScript's `String(n)` does
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else if n.abs() >= 1e21 || n.abs() < 1e-6 {
        exponential(n)
    } else {
        format!("{n}")
    }
}

fn exponential(n: f64) -> String {
    // Rust prints `1e21` / `1.5e-7`; JavaScript adds an explicit sign
    let formatted = format!("{n:e}");
    match formatted.split_once('e') {
        Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
        _ => formatted,
    }
}

/// Parse a string the way `Number(s)` does
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix).map_or(f64::NAN, |v| v as f64);
        }
    }
    // Rust accepts spellings like "inf" and "nan" that JavaScript does not
    let numeric = trimmed
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
    }

    #[test]
    fn string_to_number_conversion() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("12px").is_nan());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::Number(1.0)));
        assert!(Value::Bool(true).loose_equals(&Value::Number(1.0)));
        assert!(!Value::Null.loose_equals(&Value::Number(0.0)));
        let arr = Value::array(vec![Value::Number(1.0)]);
        assert!(arr.strict_equals(&arr.clone()));
        assert!(!arr.strict_equals(&Value::array(vec![Value::Number(1.0)])));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
    }

    #[test]
    fn json_conversion() {
        let json = json!({ "a": [1, 2.5, null, "x"], "b": true });
        let value = Value::from(json.clone());
        assert_eq!(value.to_json().unwrap(), json);

        let with_undefined = Value::object(BTreeMap::from([
            ("kept".to_string(), Value::Number(1.0)),
            ("dropped".to_string(), Value::Undefined),
        ]));
        assert_eq!(with_undefined.to_json().unwrap(), json!({ "kept": 1 }));
    }

    #[test]
    fn functions_do_not_marshal() {
        let f = Value::Function(Arc::new(Callable::Native("Math.max")));
        assert!(matches!(f.to_json(), Err(EvaluationError::Marshal(_))));
        assert_eq!(
            Value::array(vec![f]).to_json_lossy(),
            json!([null])
        );
    }

    #[test]
    fn to_string_conversions() {
        let arr = Value::array(vec![Value::Number(1.0), Value::Null, Value::from("a")]);
        assert_eq!(arr.to_js_string(), "1,,a");
        assert_eq!(Value::object(BTreeMap::new()).to_js_string(), "[object Object]");
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::Null.type_of(), "object");
    }
}
