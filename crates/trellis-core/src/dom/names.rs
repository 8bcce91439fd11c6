//! Node name rules

use std::collections::BTreeSet;

/// Words a node name may not take because bindings could not reference it
const RESERVED_NAMES: &[&str] = &[
    "page", "undefined", "null", "true", "false", "NaN", "Infinity", "Math", "JSON", "Object",
    "Array", "String", "Number", "Boolean", "typeof", "let", "const", "var", "function", "return",
    "if", "else", "for", "while", "do", "class", "new", "this", "delete", "void", "throw", "try",
    "catch", "finally", "switch", "case", "break", "continue", "in", "instanceof", "yield",
    "await", "import", "export", "default", "with", "debugger", "super", "extends",
];

/// Validate that `name` can be used as a binding identifier
pub fn validate_node_name(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("name must not be empty");
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return Err("name must start with a letter, '_' or '$'");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err("name may only contain letters, digits, '_' and '$'");
    }
    if RESERVED_NAMES.contains(&name) {
        return Err("name is reserved");
    }
    Ok(())
}

/// Propose a name based on `candidate` that is not in `existing`.
///
/// The candidate is returned unchanged when free. Otherwise trailing digits
/// are stripped and the smallest positive counter that makes it unique is
/// appended: `button` becomes `button1`, `button1` becomes `button2`.
pub fn propose_name(candidate: &str, existing: &BTreeSet<String>) -> String {
    if !existing.contains(candidate) {
        return candidate.to_string();
    }
    let base = candidate.trim_end_matches(|c: char| c.is_ascii_digit());
    (1usize..)
        .map(|counter| format!("{base}{counter}"))
        .find(|name| !existing.contains(name))
        .unwrap_or_else(|| candidate.to_string())
}
