//! Lexer for binding expressions
//!
//! Converts expression source into a token stream, handling:
//! - Identifiers, keywords, operators and punctuation
//! - Decimal and hexadecimal number literals
//! - Quoted strings (escapes are cooked later by [`unescape`])
//! - Template literals with nested `${}` substitutions
//! - Line and block comments

#![allow(clippy::cast_possible_truncation)] // Expressions are far below 4GB

mod span;
mod token;

pub use span::Span;
pub use token::TokenKind;

use logos::Logos;
use thiserror::Error;

/// A token with its kind, span, and source text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Source text, or the cooked text for template parts
    pub lexeme: String,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, span: Span, lexeme: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            lexeme: lexeme.into(),
        }
    }
}

/// Lexer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Invalid or unexpected token")]
    UnexpectedChar,
    #[error("Unterminated template literal")]
    UnterminatedTemplate,
    #[error("Unterminated block comment")]
    UnterminatedComment,
    #[error("Invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
}

/// A lexer error with location information
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedError {
    pub error: LexError,
    pub span: Span,
}

impl SpannedError {
    #[must_use]
    pub fn new(error: LexError, span: Span) -> Self {
        Self { error, span }
    }
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.error, self.span)
    }
}

impl std::error::Error for SpannedError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexerMode {
    Normal,
    /// Between backticks
    Template,
    /// Inside `${ ... }`; `depth` counts open braces
    Substitution { depth: u32 },
}

/// The expression lexer
pub struct Lexer<'source> {
    source: &'source str,
    /// Current byte offset
    position: usize,
    mode: LexerMode,
    /// Modes to return to when a template or substitution closes
    mode_stack: Vec<LexerMode>,
    errors: Vec<SpannedError>,
}

impl<'source> Lexer<'source> {
    #[must_use]
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            position: 0,
            mode: LexerMode::Normal,
            mode_stack: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Tokenize the entire source, returning all tokens and any errors.
    /// The token list always ends with [`TokenKind::Eof`].
    #[must_use]
    pub fn tokenize(source: &str) -> (Vec<Token>, Vec<SpannedError>) {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        (tokens, lexer.errors)
    }

    pub fn next_token(&mut self) -> Token {
        match self.mode {
            LexerMode::Template => self.lex_template(),
            LexerMode::Normal | LexerMode::Substitution { .. } => self.lex_code(),
        }
    }

    fn eof(&self) -> Token {
        let at = self.position as u32;
        Token::new(TokenKind::Eof, Span::new(at, at), "")
    }

    /// Lex ordinary expression code with logos
    fn lex_code(&mut self) -> Token {
        let source = self.source;
        loop {
            let remaining = &source[self.position..];
            let mut logos_lexer = TokenKind::lexer(remaining);
            match logos_lexer.next() {
                Some(Ok(TokenKind::BlockCommentStart)) => {
                    let start = self.position + logos_lexer.span().start;
                    let body = start + 2;
                    match source[body..].find("*/") {
                        Some(close) => self.position = body + close + 2,
                        None => {
                            self.position = self.source.len();
                            let span = Span::new(start as u32, self.position as u32);
                            self.errors
                                .push(SpannedError::new(LexError::UnterminatedComment, span));
                            return Token::new(TokenKind::Error, span, &source[start..]);
                        }
                    }
                }
                next => return self.code_token(&logos_lexer, next),
            }
        }
    }

    fn code_token(
        &mut self,
        logos_lexer: &logos::Lexer<'_, TokenKind>,
        next: Option<Result<TokenKind, ()>>,
    ) -> Token {
        match next {
            Some(Ok(kind)) => {
                let range = logos_lexer.span();
                let lexeme = logos_lexer.slice();
                let start = self.position + range.start;
                let end = self.position + range.end;
                self.position = end;
                let span = Span::new(start as u32, end as u32);

                match kind {
                    TokenKind::Backtick => {
                        self.mode_stack.push(self.mode);
                        self.mode = LexerMode::Template;
                    }
                    TokenKind::LBrace => {
                        if let LexerMode::Substitution { depth } = &mut self.mode {
                            *depth += 1;
                        }
                    }
                    TokenKind::RBrace => {
                        if let LexerMode::Substitution { depth } = &mut self.mode {
                            *depth -= 1;
                            if *depth == 0 {
                                self.mode = self.mode_stack.pop().unwrap_or(LexerMode::Normal);
                                return Token::new(TokenKind::TemplateExprEnd, span, "}");
                            }
                        }
                    }
                    _ => {}
                }
                Token::new(kind, span, lexeme)
            }
            Some(Err(())) => {
                // Skip the offending input and carry on
                let range = logos_lexer.span();
                let start = self.position + range.start;
                let mut end = self.position + range.end;
                if end <= start {
                    end = start + self.source[start..].chars().next().map_or(1, char::len_utf8);
                }
                self.position = end.min(self.source.len());
                let span = Span::new(start as u32, self.position as u32);
                self.errors
                    .push(SpannedError::new(LexError::UnexpectedChar, span));
                Token::new(TokenKind::Error, span, &self.source[start..self.position])
            }
            None => {
                // Only trailing trivia was left
                self.position = self.source.len();
                if self.mode != LexerMode::Normal || !self.mode_stack.is_empty() {
                    self.errors.push(SpannedError::new(
                        LexError::UnterminatedTemplate,
                        Span::new(self.position as u32, self.position as u32),
                    ));
                    self.mode = LexerMode::Normal;
                    self.mode_stack.clear();
                }
                self.eof()
            }
        }
    }

    /// Lex raw template text up to the next `${` or closing backtick
    fn lex_template(&mut self) -> Token {
        let start = self.position;
        let mut content = String::new();
        let mut chars = self.source[start..].char_indices().peekable();

        while let Some((offset, c)) = chars.next() {
            let at = start + offset;
            match c {
                '`' | '$' if at > start && (c == '`' || self.source[at..].starts_with("${")) => {
                    // Emit accumulated text first; the delimiter comes next call
                    self.position = at;
                    return Token::new(
                        TokenKind::TemplatePart,
                        Span::new(start as u32, at as u32),
                        content,
                    );
                }
                '`' => {
                    self.position = at + 1;
                    self.mode = self.mode_stack.pop().unwrap_or(LexerMode::Normal);
                    return Token::new(
                        TokenKind::TemplateEnd,
                        Span::new(at as u32, self.position as u32),
                        "`",
                    );
                }
                '$' if self.source[at..].starts_with("${") => {
                    self.position = at + 2;
                    self.mode_stack.push(LexerMode::Template);
                    self.mode = LexerMode::Substitution { depth: 1 };
                    return Token::new(
                        TokenKind::TemplateExprStart,
                        Span::new(at as u32, self.position as u32),
                        "${",
                    );
                }
                '\\' => {
                    let Some((_, escaped)) = chars.next() else {
                        break;
                    };
                    let tail: String = chars.clone().map(|(_, c)| c).take(8).collect();
                    match cook_escape(escaped, &tail) {
                        Ok((cooked, consumed)) => {
                            content.extend(cooked);
                            for _ in 0..consumed {
                                chars.next();
                            }
                        }
                        Err(err) => {
                            self.errors.push(SpannedError::new(
                                err,
                                Span::new(at as u32, (at + 1 + escaped.len_utf8()) as u32),
                            ));
                            content.push(escaped);
                        }
                    }
                }
                _ => content.push(c),
            }
        }

        // Ran off the end of the source inside a template
        self.position = self.source.len();
        let span = Span::new(start as u32, self.position as u32);
        self.errors
            .push(SpannedError::new(LexError::UnterminatedTemplate, span));
        self.mode = LexerMode::Normal;
        self.mode_stack.clear();
        Token::new(TokenKind::Error, span, &self.source[start..])
    }
}

/// Cook the escape sequence whose character after the backslash is
/// `escaped`. `tail` holds the characters that follow it. Returns the cooked
/// character (if any) and how many characters of `tail` were consumed.
fn cook_escape(escaped: char, tail: &str) -> Result<(Option<char>, usize), LexError> {
    let simple = match escaped {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'v' => '\u{b}',
        '0' if !tail.starts_with(|c: char| c.is_ascii_digit()) => '\0',
        // Line continuation
        '\n' => return Ok((None, 0)),
        'x' => {
            let hex = tail.get(..2).ok_or(LexError::InvalidEscape('x'))?;
            let code = u32::from_str_radix(hex, 16).map_err(|_| LexError::InvalidEscape('x'))?;
            let c = char::from_u32(code).ok_or(LexError::InvalidEscape('x'))?;
            return Ok((Some(c), 2));
        }
        'u' => return cook_unicode(tail),
        c if c.is_ascii_digit() => return Err(LexError::InvalidEscape(c)),
        other => other,
    };
    Ok((Some(simple), 0))
}

fn cook_unicode(tail: &str) -> Result<(Option<char>, usize), LexError> {
    let invalid = LexError::InvalidEscape('u');
    if let Some(braced) = tail.strip_prefix('{') {
        let close = braced.find('}').ok_or_else(|| invalid.clone())?;
        let code = u32::from_str_radix(&braced[..close], 16).map_err(|_| invalid.clone())?;
        let c = char::from_u32(code).ok_or(invalid)?;
        return Ok((Some(c), close + 2));
    }
    let hex = tail.get(..4).ok_or_else(|| invalid.clone())?;
    let code = u32::from_str_radix(hex, 16).map_err(|_| invalid.clone())?;
    // Lone surrogates have no char representation
    let c = char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
    Ok((Some(c), 4))
}

/// Cook the raw text of a quoted string token, quotes included
pub fn unescape(raw: &str) -> Result<String, LexError> {
    let inner = raw
        .get(1..raw.len().saturating_sub(1))
        .unwrap_or_default();
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(escaped) = chars.next() else {
            break;
        };
        let tail: String = chars.clone().take(8).collect();
        let (cooked, consumed) = cook_escape(escaped, &tail)?;
        out.extend(cooked);
        for _ in 0..consumed {
            chars.next();
        }
    }
    Ok(out)
}
