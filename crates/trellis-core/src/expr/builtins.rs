//! Builtin globals and methods available to binding expressions
//!
//! Natives are identified by their full dotted name (`Math.max`,
//! `JSON.stringify`). Namespace globals such as `Math` are plain objects whose
//! members are native functions.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::error::EvaluationError;
use super::interpreter::{EvalResult, Interpreter};
use super::value::{join_values, number_to_string, Callable, Value};

/// Every native function, by full name
const NATIVES: &[&str] = &[
    "Math.abs",
    "Math.ceil",
    "Math.floor",
    "Math.round",
    "Math.trunc",
    "Math.sign",
    "Math.sqrt",
    "Math.cbrt",
    "Math.pow",
    "Math.min",
    "Math.max",
    "Math.log",
    "Math.log2",
    "Math.log10",
    "Math.exp",
    "JSON.stringify",
    "JSON.parse",
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.fromEntries",
    "Object.assign",
    "Array.isArray",
    "Array.from",
    "Array.of",
    "Number.isInteger",
    "Number.isFinite",
    "Number.isNaN",
    "Number.parseFloat",
    "Number.parseInt",
    "String",
    "Number",
    "Boolean",
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
];

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "reduce", "includes", "indexOf",
    "join", "slice", "concat", "reverse", "flat", "at", "sort", "toString",
];

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "trimStart", "trimEnd", "includes", "startsWith",
    "endsWith", "indexOf", "split", "slice", "substring", "replace", "replaceAll", "padStart",
    "padEnd", "repeat", "charAt", "at", "concat", "toString",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toString"];

/// Characters `encodeURIComponent` leaves alone besides alphanumerics
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Strings longer than this are refused by `repeat` and `padStart`
const MAX_STRING_LENGTH: usize = 1 << 24;

/// Arrays longer than this are refused by `Array.from`
const MAX_ARRAY_LENGTH: usize = 1 << 24;

fn native(name: &'static str) -> Value {
    Value::Function(Arc::new(Callable::Native(name)))
}

fn find_native(name: &str) -> Option<&'static str> {
    NATIVES.iter().copied().find(|n| *n == name)
}

fn namespace(prefix: &str, constants: &[(&str, f64)]) -> Value {
    let mut members: BTreeMap<String, Value> = NATIVES
        .iter()
        .copied()
        .filter_map(|name| {
            let member = name.strip_prefix(prefix)?.strip_prefix('.')?;
            Some((member.to_string(), native(name)))
        })
        .collect();
    for (name, value) in constants {
        members.insert((*name).to_string(), Value::Number(*value));
    }
    Value::object(members)
}

/// Builtin global named `name`, if any
pub(crate) fn global(name: &str) -> Option<Value> {
    use std::f64::consts;
    match name {
        "undefined" => Some(Value::Undefined),
        "NaN" => Some(Value::Number(f64::NAN)),
        "Infinity" => Some(Value::Number(f64::INFINITY)),
        "Math" => Some(namespace(
            "Math",
            &[
                ("PI", consts::PI),
                ("E", consts::E),
                ("LN2", consts::LN_2),
                ("LN10", consts::LN_10),
                ("SQRT2", consts::SQRT_2),
            ],
        )),
        "JSON" | "Object" | "Array" => Some(namespace(name, &[])),
        _ => find_native(name).map(native),
    }
}

fn method(table: &[&'static str], key: &str, receiver: &Value) -> Value {
    table
        .iter()
        .copied()
        .find(|m| *m == key)
        .map_or(Value::Undefined, |name| {
            Value::Function(Arc::new(Callable::Method {
                receiver: receiver.clone(),
                name,
            }))
        })
}

/// Canonical array index, so `"01"` is a property and not an index
fn array_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// `target[key]`
pub(crate) fn get_property(target: &Value, key: &str) -> EvalResult<Value> {
    Ok(match target {
        Value::Undefined | Value::Null => {
            return Err(EvaluationError::Type(format!(
                "Cannot read properties of {} (reading '{}')",
                target.type_label(),
                key
            )))
        }
        Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
        Value::Array(items) => {
            if key == "length" {
                Value::Number(items.len() as f64)
            } else if let Some(index) = array_index(key) {
                items.get(index).cloned().unwrap_or_default()
            } else {
                method(ARRAY_METHODS, key, target)
            }
        }
        Value::String(s) => {
            if key == "length" {
                Value::Number(s.encode_utf16().count() as f64)
            } else if let Some(index) = array_index(key) {
                s.chars()
                    .nth(index)
                    .map_or(Value::Undefined, |c| Value::from(c.to_string()))
            } else {
                method(STRING_METHODS, key, target)
            }
        }
        Value::Number(_) => method(NUMBER_METHODS, key, target),
        Value::Bool(_) => method(&["toString"], key, target),
        Value::Function(callable) => match callable.as_ref() {
            Callable::Native(name) => match find_native(&format!("{name}.{key}")) {
                Some(member) => native(member),
                None if key == "name" => Value::string(name),
                None => Value::Undefined,
            },
            _ if key == "name" => Value::string(callable.name()),
            _ => Value::Undefined,
        },
    })
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn callback(args: &[Value], method: &str) -> EvalResult<Arc<Callable>> {
    match args.first() {
        Some(Value::Function(callable)) => Ok(Arc::clone(callable)),
        other => Err(EvaluationError::Type(format!(
            "{} is not a function (in {method})",
            other.map_or("undefined", Value::type_label)
        ))),
    }
}

/// Resolve a relative index (negative counts from the end), clamped to `len`
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// Call a global native function
pub(crate) fn call_native(
    interp: &mut Interpreter<'_>,
    name: &'static str,
    args: &[Value],
) -> EvalResult<Value> {
    let num = |i: usize| arg(args, i).to_number();
    let math = |f: fn(f64) -> f64| -> EvalResult<Value> { Ok(Value::Number(f(num(0)))) };
    match name {
        "Math.abs" => math(f64::abs),
        "Math.ceil" => math(f64::ceil),
        "Math.floor" => math(f64::floor),
        "Math.round" => math(|n| (n + 0.5).floor()),
        "Math.trunc" => math(f64::trunc),
        "Math.sign" => math(|n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
        "Math.sqrt" => math(f64::sqrt),
        "Math.cbrt" => math(f64::cbrt),
        "Math.log" => math(f64::ln),
        "Math.log2" => math(f64::log2),
        "Math.log10" => math(f64::log10),
        "Math.exp" => math(f64::exp),
        "Math.pow" => Ok(Value::Number(num(0).powf(num(1)))),
        "Math.min" | "Math.max" => {
            let numbers: Vec<f64> = args.iter().map(Value::to_number).collect();
            let result = if numbers.iter().any(|n| n.is_nan()) {
                f64::NAN
            } else if name == "Math.min" {
                numbers.into_iter().fold(f64::INFINITY, f64::min)
            } else {
                numbers.into_iter().fold(f64::NEG_INFINITY, f64::max)
            };
            Ok(Value::Number(result))
        }
        "JSON.stringify" => json_stringify(&arg(args, 0), &arg(args, 2)),
        "JSON.parse" => serde_json::from_str::<JsonValue>(&arg(args, 0).to_js_string())
            .map(Value::from)
            .map_err(|err| EvaluationError::Syntax(format!("{err} in JSON"))),
        "Object.keys" | "Object.values" | "Object.entries" => {
            let entries = own_entries(&arg(args, 0))?;
            Ok(Value::array(
                entries
                    .into_iter()
                    .map(|(key, value)| match name {
                        "Object.keys" => Value::from(key),
                        "Object.values" => value,
                        _ => Value::array(vec![Value::from(key), value]),
                    })
                    .collect(),
            ))
        }
        "Object.fromEntries" => {
            let Value::Array(pairs) = arg(args, 0) else {
                return Err(EvaluationError::Type("object is not iterable".into()));
            };
            let mut map = BTreeMap::new();
            for pair in pairs.iter() {
                let key = get_property(pair, "0")?.to_js_string();
                map.insert(key, get_property(pair, "1")?);
            }
            Ok(Value::object(map))
        }
        "Object.assign" => {
            let mut map = BTreeMap::new();
            for source in args {
                map.extend(own_entries(source)?);
            }
            Ok(Value::object(map))
        }
        "Array.isArray" => Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_)))),
        "Array.of" => Ok(Value::array(args.to_vec())),
        "Array.from" => {
            let items = match arg(args, 0) {
                Value::Array(items) => items.as_ref().clone(),
                Value::String(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
                Value::Object(map) => {
                    let len = map.get("length").map_or(0.0, Value::to_number);
                    let len = if len.is_nan() { 0.0 } else { len.trunc().max(0.0) };
                    if len > MAX_ARRAY_LENGTH as f64 {
                        return Err(EvaluationError::Range("Invalid array length".to_string()));
                    }
                    (0..len as usize)
                        .map(|i| map.get(&i.to_string()).cloned().unwrap_or_default())
                        .collect()
                }
                _ => Vec::new(),
            };
            match args.get(1) {
                Some(Value::Function(f)) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| interp.call(f, vec![item, Value::Number(i as f64)]))
                    .collect::<EvalResult<Vec<_>>>()
                    .map(Value::array),
                _ => Ok(Value::array(items)),
            }
        }
        "Number.isInteger" => Ok(Value::Bool(
            matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0),
        )),
        "Number.isFinite" => Ok(Value::Bool(
            matches!(arg(args, 0), Value::Number(n) if n.is_finite()),
        )),
        "Number.isNaN" => Ok(Value::Bool(matches!(arg(args, 0), Value::Number(n) if n.is_nan()))),
        "String" => Ok(Value::from(
            args.first().map_or_else(String::new, Value::to_js_string),
        )),
        "Number" => Ok(Value::Number(args.first().map_or(0.0, Value::to_number))),
        "Boolean" => Ok(Value::Bool(arg(args, 0).is_truthy())),
        "parseInt" | "Number.parseInt" => Ok(Value::Number(parse_int(
            &arg(args, 0).to_js_string(),
            &arg(args, 1),
        ))),
        "parseFloat" | "Number.parseFloat" => {
            Ok(Value::Number(parse_float(&arg(args, 0).to_js_string())))
        }
        "isNaN" => Ok(Value::Bool(num(0).is_nan())),
        "isFinite" => Ok(Value::Bool(num(0).is_finite())),
        "encodeURIComponent" => Ok(Value::from(
            utf8_percent_encode(&arg(args, 0).to_js_string(), URI_COMPONENT).to_string(),
        )),
        "decodeURIComponent" => percent_decode_str(&arg(args, 0).to_js_string())
            .decode_utf8()
            .map(|s| Value::from(s.into_owned()))
            .map_err(|_| EvaluationError::External {
                name: "URIError".to_string(),
                message: "URI malformed".to_string(),
            }),
        _ => Err(EvaluationError::not_a_function(name)),
    }
}

fn own_entries(value: &Value) -> EvalResult<Vec<(String, Value)>> {
    Ok(match value {
        Value::Undefined | Value::Null => {
            return Err(EvaluationError::Type(
                "Cannot convert undefined or null to object".to_string(),
            ))
        }
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::from(c.to_string())))
            .collect(),
        _ => Vec::new(),
    })
}

fn json_stringify(value: &Value, indent: &Value) -> EvalResult<Value> {
    if matches!(value, Value::Undefined | Value::Function(_)) {
        return Ok(Value::Undefined);
    }
    let json = value.to_json_lossy();
    let pad = match indent {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if pad.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(pad.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        json.serialize(&mut serializer)
            .map(|()| String::from_utf8_lossy(&buf).into_owned())
    };
    text.map(Value::from)
        .map_err(|err| EvaluationError::Type(err.to_string()))
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let mut s = text.trim();
    let negative = s.starts_with('-');
    s = s.strip_prefix(['-', '+']).unwrap_or(s);
    let requested = radix.to_number();
    let auto = requested.is_nan() || requested == 0.0;
    let mut radix = if auto { 10 } else { requested.trunc() as u32 };
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    // Hex prefixes are only honoured without a radix or with radix 16
    if auto || radix == 16 {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }
    let digits: Vec<u32> = s.chars().map_while(|c| c.to_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .into_iter()
        .fold(0.0, |acc, d| acc * f64::from(radix) + f64::from(d));
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    let unsigned = s.trim_start_matches(['-', '+']);
    if unsigned.starts_with("Infinity") {
        return if s.starts_with('-') {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    // Longest prefix shaped like a decimal literal
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'-' | b'+')) {
        end = 1;
    }
    let digits = |from: usize| {
        bytes[from..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count()
    };
    let int_digits = digits(end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits = digits(exp_end);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    s[..end].parse().unwrap_or(f64::NAN)
}

/// Call a builtin method on its receiver
pub(crate) fn call_method(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &'static str,
    args: &[Value],
) -> EvalResult<Value> {
    match receiver {
        Value::Array(items) => array_method(interp, items, receiver, name, args),
        Value::String(s) => string_method(interp, s, name, args),
        Value::Number(n) => number_method(*n, name, args),
        Value::Bool(b) if name == "toString" => Ok(Value::from(b.to_string())),
        _ => Err(EvaluationError::not_a_function(name)),
    }
}

fn array_method(
    interp: &mut Interpreter<'_>,
    items: &[Value],
    receiver: &Value,
    name: &'static str,
    args: &[Value],
) -> EvalResult<Value> {
    let visit = |interp: &mut Interpreter<'_>, f: &Callable, i: usize| {
        interp.call(
            f,
            vec![items[i].clone(), Value::Number(i as f64), receiver.clone()],
        )
    };
    match name {
        "map" => {
            let f = callback(args, name)?;
            (0..items.len())
                .map(|i| visit(interp, &f, i))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::array)
        }
        "filter" => {
            let f = callback(args, name)?;
            let mut kept = Vec::new();
            for i in 0..items.len() {
                if visit(interp, &f, i)?.is_truthy() {
                    kept.push(items[i].clone());
                }
            }
            Ok(Value::array(kept))
        }
        "find" | "findIndex" | "some" | "every" => {
            let f = callback(args, name)?;
            for i in 0..items.len() {
                let hit = visit(interp, &f, i)?.is_truthy();
                match (name, hit) {
                    ("find", true) => return Ok(items[i].clone()),
                    ("findIndex", true) => return Ok(Value::Number(i as f64)),
                    ("some", true) => return Ok(Value::Bool(true)),
                    ("every", false) => return Ok(Value::Bool(false)),
                    _ => {}
                }
            }
            Ok(match name {
                "find" => Value::Undefined,
                "findIndex" => Value::Number(-1.0),
                "some" => Value::Bool(false),
                _ => Value::Bool(true),
            })
        }
        "reduce" => {
            let f = callback(args, name)?;
            let (mut acc, start) = match args.get(1) {
                Some(init) => (init.clone(), 0),
                None => match items.first() {
                    Some(first) => (first.clone(), 1),
                    None => {
                        return Err(EvaluationError::Type(
                            "Reduce of empty array with no initial value".to_string(),
                        ))
                    }
                },
            };
            for (i, item) in items.iter().enumerate().skip(start) {
                acc = interp.call(
                    &f,
                    vec![acc, item.clone(), Value::Number(i as f64), receiver.clone()],
                )?;
            }
            Ok(acc)
        }
        "includes" => {
            let needle = arg(args, 0);
            Ok(Value::Bool(items.iter().any(|v| v.same_value_zero(&needle))))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            Ok(Value::Number(
                items
                    .iter()
                    .position(|v| v.strict_equals(&needle))
                    .map_or(-1.0, |i| i as f64),
            ))
        }
        "join" => {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            Ok(Value::from(join_values(items, &separator)))
        }
        "toString" => Ok(Value::from(join_values(items, ","))),
        "slice" => {
            let start = relative_index(&arg(args, 0), items.len(), 0);
            let end = relative_index(&arg(args, 1), items.len(), items.len());
            Ok(Value::array(
                items.get(start..end.max(start)).unwrap_or_default().to_vec(),
            ))
        }
        "concat" => {
            let mut out = items.to_vec();
            for extra in args {
                match extra {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::array(out))
        }
        "reverse" => Ok(Value::array(items.iter().rev().cloned().collect())),
        "flat" => {
            let depth = match arg(args, 0) {
                Value::Undefined => 1,
                other => other.to_number().max(0.0) as usize,
            };
            let mut out = Vec::new();
            flatten(items, depth, &mut out);
            Ok(Value::array(out))
        }
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { items.len() as f64 + n } else { n };
            Ok(if index < 0.0 {
                Value::Undefined
            } else {
                items.get(index as usize).cloned().unwrap_or_default()
            })
        }
        "sort" => {
            let compare = match args.first() {
                Some(Value::Function(f)) => Some(Arc::clone(f)),
                None | Some(Value::Undefined) => None,
                Some(other) => {
                    return Err(EvaluationError::Type(format!(
                        "The comparison function must be either a function or undefined, got {}",
                        other.type_label()
                    )))
                }
            };
            let mut sorted = items.to_vec();
            merge_sort(&mut sorted, &mut |a: &Value, b: &Value| match &compare {
                Some(f) => {
                    let n = interp.call(f, vec![a.clone(), b.clone()])?.to_number();
                    Ok(n.partial_cmp(&0.0).unwrap_or(Ordering::Equal))
                }
                None => Ok(default_order(a, b)),
            })?;
            Ok(Value::array(sorted))
        }
        _ => Err(EvaluationError::not_a_function(name)),
    }
}

fn flatten(items: &[Value], depth: usize, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth > 0 => flatten(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

/// Default `sort` order: undefined last, everything else by string form
fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_js_string().cmp(&b.to_js_string()),
    }
}

/// Stable merge sort with a fallible comparator. Inconsistent comparators
/// produce some permutation rather than a panic.
fn merge_sort(
    items: &mut Vec<Value>,
    compare: &mut dyn FnMut(&Value, &Value) -> EvalResult<Ordering>,
) -> EvalResult<()> {
    if items.len() <= 1 {
        return Ok(());
    }
    let mut right = items.split_off(items.len() / 2);
    merge_sort(items, compare)?;
    merge_sort(&mut right, compare)?;
    let left = std::mem::take(items);
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
        let next = if compare(a, b)? == Ordering::Greater {
            right.next()
        } else {
            left.next()
        };
        items.extend(next);
    }
    items.extend(left);
    items.extend(right);
    Ok(())
}

fn string_method(
    interp: &mut Interpreter<'_>,
    s: &str,
    name: &'static str,
    args: &[Value],
) -> EvalResult<Value> {
    let text = |i: usize| arg(args, i).to_js_string();
    let chars: Vec<char> = s.chars().collect();
    let substring = |start: usize, end: usize| -> Value {
        Value::from(chars[start..end.max(start)].iter().collect::<String>())
    };
    Ok(match name {
        "toUpperCase" => Value::from(s.to_uppercase()),
        "toLowerCase" => Value::from(s.to_lowercase()),
        "trim" => Value::string(s.trim()),
        "trimStart" => Value::string(s.trim_start()),
        "trimEnd" => Value::string(s.trim_end()),
        "includes" => Value::Bool(s.contains(text(0).as_str())),
        "startsWith" => Value::Bool(s.starts_with(text(0).as_str())),
        "endsWith" => Value::Bool(s.ends_with(text(0).as_str())),
        "indexOf" => Value::Number(
            s.find(text(0).as_str())
                .map_or(-1.0, |byte| s[..byte].chars().count() as f64),
        ),
        "split" => match arg(args, 0) {
            Value::Undefined => Value::array(vec![Value::string(s)]),
            separator => {
                let separator = separator.to_js_string();
                let parts: Vec<Value> = if separator.is_empty() {
                    chars.iter().map(|c| Value::from(c.to_string())).collect()
                } else {
                    s.split(separator.as_str()).map(Value::string).collect()
                };
                Value::array(parts)
            }
        },
        "slice" => {
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            substring(start, end)
        }
        "substring" => {
            let clamp = |v: Value, default: usize| {
                if v.is_undefined() {
                    return default;
                }
                let n = v.to_number();
                if n.is_nan() {
                    0
                } else {
                    n.clamp(0.0, chars.len() as f64) as usize
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), chars.len());
            substring(a.min(b), a.max(b))
        }
        "replace" | "replaceAll" => {
            let pattern = text(0);
            let mut out = String::new();
            let mut rest = s;
            while let Some(at) = rest.find(pattern.as_str()) {
                out.push_str(&rest[..at]);
                let replacement = match args.get(1) {
                    Some(Value::Function(f)) => interp
                        .call(f, vec![Value::string(&pattern)])?
                        .to_js_string(),
                    _ => text(1),
                };
                out.push_str(&replacement);
                rest = &rest[at + pattern.len()..];
                if name == "replace" || pattern.is_empty() {
                    break;
                }
            }
            out.push_str(rest);
            Value::from(out)
        }
        "padStart" | "padEnd" => {
            let target = arg(args, 0).to_number();
            let target = if target.is_nan() { 0 } else { target.max(0.0) as usize };
            if target > MAX_STRING_LENGTH {
                return Err(EvaluationError::Range("Invalid string length".to_string()));
            }
            let fill = match arg(args, 1) {
                Value::Undefined => " ".to_string(),
                other => other.to_js_string(),
            };
            let missing = target.saturating_sub(chars.len());
            if missing == 0 || fill.is_empty() {
                return Ok(Value::string(s));
            }
            let padding: String = fill.chars().cycle().take(missing).collect();
            if name == "padStart" {
                Value::from(padding + s)
            } else {
                Value::from(s.to_string() + &padding)
            }
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if count < 0.0 || count.is_infinite() {
                return Err(EvaluationError::Range(format!(
                    "Invalid count value: {}",
                    number_to_string(count)
                )));
            }
            if s.len() as f64 * count > MAX_STRING_LENGTH as f64 {
                return Err(EvaluationError::Range("Invalid string length".to_string()));
            }
            Value::from(s.repeat(count as usize))
        }
        "charAt" => {
            let index = arg(args, 0).to_number();
            let index = if index.is_nan() { 0.0 } else { index.trunc() };
            if index < 0.0 {
                Value::string("")
            } else {
                chars
                    .get(index as usize)
                    .map_or_else(|| Value::string(""), |c| Value::from(c.to_string()))
            }
        }
        "at" => {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let index = if n < 0.0 { chars.len() as f64 + n } else { n };
            if index < 0.0 {
                Value::Undefined
            } else {
                chars
                    .get(index as usize)
                    .map_or(Value::Undefined, |c| Value::from(c.to_string()))
            }
        }
        "concat" => Value::from(
            args.iter()
                .fold(s.to_string(), |acc, v| acc + &v.to_js_string()),
        ),
        "toString" => Value::string(s),
        _ => return Err(EvaluationError::not_a_function(name)),
    })
}

fn number_method(n: f64, name: &'static str, args: &[Value]) -> EvalResult<Value> {
    match name {
        "toFixed" => {
            let digits = arg(args, 0).to_number();
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=100.0).contains(&digits) {
                return Err(EvaluationError::Range(
                    "toFixed() digits argument must be between 0 and 100".to_string(),
                ));
            }
            if !n.is_finite() || n.abs() >= 1e21 {
                return Ok(Value::from(number_to_string(n)));
            }
            Ok(Value::from(format!("{:.*}", digits as usize, n)))
        }
        "toString" => {
            let radix = match arg(args, 0) {
                Value::Undefined => 10,
                other => other.to_number().trunc() as u32,
            };
            if !(2..=36).contains(&radix) {
                return Err(EvaluationError::Range(
                    "toString() radix must be between 2 and 36".to_string(),
                ));
            }
            if radix == 10 || !n.is_finite() || n.fract() != 0.0 {
                return Ok(Value::from(number_to_string(n)));
            }
            Ok(Value::from(integer_to_radix(n, radix)))
        }
        _ => Err(EvaluationError::not_a_function(name)),
    }
}

fn integer_to_radix(n: f64, radix: u32) -> String {
    let mut value = n.abs();
    let mut digits = Vec::new();
    loop {
        let digit = (value % f64::from(radix)) as u32;
        digits.push(std::char::from_digit(digit, radix).unwrap_or('0'));
        value = (value / f64::from(radix)).floor();
        if value < 1.0 {
            break;
        }
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.into_iter().rev().collect()
}
