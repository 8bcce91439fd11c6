//! Parser error types for binding expressions

use thiserror::Error;

use crate::expr::lexer::{LexError, Span, SpannedError, Token, TokenKind};

/// A parse error with location information
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Source location where the error occurred
    pub span: Span,
    /// Optional hint for fixing the error
    pub hint: Option<String>,
}

impl ParseError {
    #[must_use]
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Error for a token that cannot appear where it was found
    #[must_use]
    pub fn unexpected(token: &Token) -> Self {
        let kind = match token.kind {
            TokenKind::Eof => ParseErrorKind::UnexpectedEnd,
            TokenKind::Error => ParseErrorKind::InvalidToken,
            TokenKind::Ident => ParseErrorKind::UnexpectedIdentifier(token.lexeme.clone()),
            TokenKind::Number | TokenKind::HexNumber => ParseErrorKind::UnexpectedNumber,
            TokenKind::String | TokenKind::TemplatePart => ParseErrorKind::UnexpectedString,
            other if token.lexeme.is_empty() => {
                ParseErrorKind::UnexpectedToken(other.describe().to_string())
            }
            _ => ParseErrorKind::UnexpectedToken(token.lexeme.clone()),
        };
        let error = Self::new(kind, token.span);
        if token.kind == TokenKind::Reserved {
            error.with_hint("bindings are a single expression; statements are not allowed")
        } else {
            error
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)?;
        if let Some(hint) = &self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<SpannedError> for ParseError {
    fn from(err: SpannedError) -> Self {
        let kind = match err.error {
            LexError::UnexpectedChar | LexError::UnterminatedComment => {
                ParseErrorKind::InvalidToken
            }
            LexError::UnterminatedTemplate => ParseErrorKind::UnterminatedTemplate,
            LexError::InvalidEscape(c) => ParseErrorKind::InvalidEscape(c),
        };
        Self::new(kind, err.span)
    }
}

/// The kind of parse error. Messages follow the wording browsers use for
/// `SyntaxError`, so authors see familiar diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("Unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("Unexpected identifier '{0}'")]
    UnexpectedIdentifier(String),

    #[error("Unexpected number")]
    UnexpectedNumber,

    #[error("Unexpected string")]
    UnexpectedString,

    #[error("Unexpected end of input")]
    UnexpectedEnd,

    #[error("Invalid or unexpected token")]
    InvalidToken,

    #[error("Unterminated template literal")]
    UnterminatedTemplate,

    #[error("Invalid escape sequence '\\{0}'")]
    InvalidEscape(char),

    #[error("Invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("Malformed arrow function parameter list")]
    InvalidArrowParameters,

    #[error("Duplicate parameter name '{0}' not allowed in this context")]
    DuplicateParameter(String),

    #[error("Arrow function bodies must be a single expression")]
    BlockBody,

    #[error("Invalid left-hand side in assignment")]
    Assignment,

    #[error("Expression is nested too deeply")]
    TooDeep,
}
