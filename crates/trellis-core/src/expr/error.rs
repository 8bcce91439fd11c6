//! Errors raised while evaluating binding expressions

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::parser::ParseError;

/// An error from parsing or running a binding expression.
///
/// The display form is the bare message, and [`EvaluationError::name`] gives
/// the JavaScript error class, so `{name}: {message}` reads like a browser
/// console line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("{0}")]
    Syntax(String),

    #[error("{0} is not defined")]
    Reference(String),

    #[error("{0}")]
    Type(String),

    #[error("{0}")]
    Range(String),

    /// A binding (transitively) depends on itself
    #[error("Cycle detected \"{0}\"")]
    Cycle(String),

    /// A value could not cross the sandbox boundary
    #[error("{0}")]
    Marshal(String),

    #[error("Environment variable \"{0}\" is not set")]
    MissingEnv(String),

    /// Error reported by the host for a controlled binding, such as a failed fetch
    #[error("{message}")]
    External { name: String, message: String },

    /// A dependency is still loading; not an error from the author's point of view
    #[error("value is still loading")]
    Pending,
}

impl EvaluationError {
    /// JavaScript error class name
    pub fn name(&self) -> &str {
        match self {
            EvaluationError::Syntax(_) => "SyntaxError",
            EvaluationError::Reference(_) | EvaluationError::MissingEnv(_) => "ReferenceError",
            EvaluationError::Type(_) => "TypeError",
            EvaluationError::Range(_) => "RangeError",
            EvaluationError::Marshal(_) => "DataCloneError",
            EvaluationError::External { name, .. } => name,
            EvaluationError::Cycle(_) | EvaluationError::Pending => "Error",
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, EvaluationError::Pending)
    }

    pub fn external(message: impl Into<String>) -> Self {
        EvaluationError::External {
            name: "Error".to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn stack_overflow() -> Self {
        EvaluationError::Range("Maximum call stack size exceeded".to_string())
    }

    pub(crate) fn not_a_function(what: &str) -> Self {
        EvaluationError::Type(format!("{what} is not a function"))
    }
}

impl From<ParseError> for EvaluationError {
    fn from(err: ParseError) -> Self {
        EvaluationError::Syntax(err.kind.to_string())
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorRepr {
    #[serde(default = "default_name")]
    name: String,
    message: String,
}

fn default_name() -> String {
    "Error".to_string()
}

impl Serialize for EvaluationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ErrorRepr {
            name: self.name().to_string(),
            message: self.to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EvaluationError {
    /// Errors coming back from the host are opaque: they keep their name and
    /// message but lose their variant
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Message(String),
            Full(ErrorRepr),
        }
        Ok(match Wire::deserialize(deserializer)? {
            Wire::Message(message) => EvaluationError::external(message),
            Wire::Full(ErrorRepr { name, message }) => EvaluationError::External { name, message },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn messages_match_browser_wording() {
        assert_eq!(
            EvaluationError::Reference("foo".into()).to_string(),
            "foo is not defined"
        );
        assert_eq!(
            EvaluationError::Cycle("x.value".into()).to_string(),
            "Cycle detected \"x.value\""
        );
        assert_eq!(EvaluationError::stack_overflow().name(), "RangeError");
    }

    #[test]
    fn serializes_name_and_message() {
        let json = serde_json::to_value(EvaluationError::Type("x is not a function".into())).unwrap();
        assert_eq!(
            json,
            json!({ "name": "TypeError", "message": "x is not a function" })
        );
    }

    #[test]
    fn deserializes_host_errors() {
        let err: EvaluationError =
            serde_json::from_value(json!({ "name": "FetchError", "message": "503" })).unwrap();
        assert_eq!(err.name(), "FetchError");
        assert_eq!(err.to_string(), "503");
        let err: EvaluationError = serde_json::from_value(json!("boom")).unwrap();
        assert_eq!(err, EvaluationError::external("boom"));
    }
}
