//! Token types for binding expressions

use logos::Logos;

/// The kind of token produced by the lexer
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // ========== Keywords ==========
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("typeof")]
    Typeof,

    /// Statement and declaration keywords. Bindings are single expressions,
    /// so the parser rejects these wherever they appear.
    #[token("let")]
    #[token("const")]
    #[token("var")]
    #[token("function")]
    #[token("return")]
    #[token("if")]
    #[token("else")]
    #[token("for")]
    #[token("while")]
    #[token("do")]
    #[token("class")]
    #[token("new")]
    #[token("delete")]
    #[token("throw")]
    #[token("try")]
    #[token("switch")]
    #[token("import")]
    #[token("export")]
    #[token("await")]
    #[token("yield")]
    #[token("this")]
    Reserved,

    // ========== Literals ==========
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,

    #[regex(r"0[xX][0-9a-fA-F]+")]
    HexNumber,

    /// Single- or double-quoted string, escapes still raw
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r"'([^'\\\n]|\\.)*'")]
    String,

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", priority = 3)]
    Ident,

    // ========== Template literals ==========
    #[token("`")]
    Backtick,
    /// Cooked text between template delimiters (emitted by the lexer's template mode)
    TemplatePart,
    /// `${` inside a template
    TemplateExprStart,
    /// `}` closing a template substitution
    TemplateExprEnd,
    /// Closing backtick
    TemplateEnd,

    // ========== Operators ==========
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("**")]
    StarStar,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("==")]
    EqEq,
    #[token("!=")]
    BangEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    BangEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("??")]
    QuestionQuestion,
    #[token("!")]
    Bang,
    #[token("=")]
    Eq,
    #[token("=>")]
    Arrow,

    // ========== Punctuation ==========
    #[token("?")]
    Question,
    #[token("?.")]
    QuestionDot,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("...")]
    DotDotDot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // ========== Special ==========
    /// `/*`; the lexer skips ahead to the matching `*/` itself
    #[token("/*")]
    BlockCommentStart,
    Eof,
    Error,
}

impl TokenKind {
    /// Human-readable name for diagnostics
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::Typeof => "typeof",
            Self::Reserved => "keyword",
            Self::Number | Self::HexNumber => "number",
            Self::String => "string",
            Self::Ident => "identifier",
            Self::Backtick | Self::TemplateEnd => "`",
            Self::TemplatePart => "template text",
            Self::TemplateExprStart => "${",
            Self::TemplateExprEnd => "}",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::StarStar => "**",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::EqEq => "==",
            Self::BangEq => "!=",
            Self::EqEqEq => "===",
            Self::BangEqEq => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AmpAmp => "&&",
            Self::PipePipe => "||",
            Self::QuestionQuestion => "??",
            Self::Bang => "!",
            Self::Eq => "=",
            Self::Arrow => "=>",
            Self::Question => "?",
            Self::QuestionDot => "?.",
            Self::Colon => ":",
            Self::Dot => ".",
            Self::DotDotDot => "...",
            Self::Comma => ",",
            Self::Semicolon => ";",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::BlockCommentStart => "/*",
            Self::Eof => "end of input",
            Self::Error => "invalid token",
        }
    }

    /// Tokens that may follow `.` as a property name
    #[must_use]
    pub const fn is_property_name(self) -> bool {
        matches!(
            self,
            Self::Ident | Self::Reserved | Self::True | Self::False | Self::Null | Self::Typeof
        )
    }
}
