//! Pratt parser for binding expressions
//!
//! A binding is exactly one expression. The accepted grammar covers literals
//! (numbers, strings, templates, arrays, objects with spread and shorthand),
//! member access with optional chaining, calls, arrow functions with an
//! expression body, the conditional operator, and the usual unary and binary
//! operators. Statements, assignment and `new` are rejected.

mod error;

pub use error::{ParseError, ParseErrorKind};

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::expr::ast::{
    ArrowFunction, BinOp, Expr, ExprKind, ListItem, Literal, ObjectEntry, PropertyKey,
    TemplatePart, UnaryOp,
};
use crate::expr::lexer::{unescape, Lexer, Span, Token, TokenKind};
use crate::expr::value::number_to_string;

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Nesting limit used by [`parse_expression`]
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Parse a single expression with the default nesting limit
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    Parser::parse(source, DEFAULT_MAX_DEPTH)
}

/// The expression parser
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    /// Current syntactic nesting
    depth: usize,
    max_depth: usize,
}

impl Parser {
    /// Parse `source` as one complete expression
    pub fn parse(source: &str, max_depth: usize) -> ParseResult<Expr> {
        let (tokens, errors) = Lexer::tokenize(source);
        if let Some(err) = errors.into_iter().next() {
            return Err(err.into());
        }
        let mut parser = Parser {
            tokens,
            position: 0,
            depth: 0,
            max_depth,
        };
        let expr = parser.expression()?;
        if !parser.check(TokenKind::Eof) {
            return Err(ParseError::unexpected(parser.current()));
        }
        Ok(expr)
    }

    // ========== Token helpers ==========

    fn current(&self) -> &Token {
        // The token stream always ends with Eof
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.position.min(last)]
    }

    fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.position + offset)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected(self.current()))
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::new(ParseErrorKind::TooDeep, self.current().span));
        }
        Ok(())
    }

    /// Run `f` one nesting level deeper
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let saved = self.depth;
        let result = self.enter().and_then(|()| f(self));
        self.depth = saved;
        result
    }

    // ========== Expressions ==========

    /// expression := arrow | conditional
    fn expression(&mut self) -> ParseResult<Expr> {
        self.nested(|p| {
            if let Some(arrow) = p.arrow_function()? {
                return Ok(arrow);
            }
            let test = p.parse_precedence(1)?;
            if p.eat(TokenKind::Question) {
                let consequent = p.expression()?;
                p.expect(TokenKind::Colon)?;
                let alternate = p.expression()?;
                let span = test.span.merge(alternate.span);
                return Ok(Expr::new(
                    ExprKind::Conditional {
                        test: Box::new(test),
                        consequent: Box::new(consequent),
                        alternate: Box::new(alternate),
                    },
                    span,
                ));
            }
            if p.check(TokenKind::Eq) {
                return Err(ParseError::new(ParseErrorKind::Assignment, p.current().span));
            }
            Ok(test)
        })
    }

    /// Parse an arrow function if one starts here
    fn arrow_function(&mut self) -> ParseResult<Option<Expr>> {
        let start = self.current().span;
        let params = match self.current_kind() {
            TokenKind::Ident if self.peek_kind(1) == TokenKind::Arrow => {
                let name = self.advance().lexeme;
                vec![name]
            }
            TokenKind::LParen if self.parens_precede_arrow() => self.arrow_params()?,
            _ => return Ok(None),
        };
        self.expect(TokenKind::Arrow)?;
        if self.check(TokenKind::LBrace) {
            return Err(ParseError::new(ParseErrorKind::BlockBody, self.current().span)
                .with_hint("wrap an object literal body in parentheses: () => ({ ... })"));
        }
        let body = self.expression()?;
        let span = start.merge(body.span);
        Ok(Some(Expr::new(
            ExprKind::Arrow(Arc::new(ArrowFunction { params, body })),
            span,
        )))
    }

    /// Whether the parenthesized group at the cursor is followed by `=>`
    fn parens_precede_arrow(&self) -> bool {
        let mut depth = 0usize;
        for (offset, token) in self.tokens[self.position..].iter().enumerate() {
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.peek_kind(offset + 1) == TokenKind::Arrow;
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
        }
        false
    }

    fn arrow_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        let mut seen = BTreeSet::new();
        while !self.check(TokenKind::RParen) {
            let token = self.current().clone();
            if token.kind != TokenKind::Ident {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidArrowParameters,
                    token.span,
                ));
            }
            self.advance();
            if !seen.insert(token.lexeme.clone()) {
                return Err(ParseError::new(
                    ParseErrorKind::DuplicateParameter(token.lexeme),
                    token.span,
                ));
            }
            params.push(token.lexeme);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if !self.eat(TokenKind::RParen) {
            return Err(ParseError::new(
                ParseErrorKind::InvalidArrowParameters,
                self.current().span,
            ));
        }
        Ok(params)
    }

    fn parse_precedence(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let saved = self.depth;
        let result = self.binary_chain(min_prec);
        self.depth = saved;
        result
    }

    fn binary_chain(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.prefix_expr()?;

        while let Some((op, prec)) = self.infix_op() {
            if prec < min_prec {
                break;
            }
            // Every link deepens the left-nested tree
            self.enter()?;

            let assoc_adjust = u8::from(op.is_left_associative());
            self.advance();
            let right = self.parse_precedence(prec + assoc_adjust)?;

            let span = left.span.merge(right.span);
            left = Expr::new(
                ExprKind::Binary {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
                span,
            );
        }

        Ok(left)
    }

    fn infix_op(&self) -> Option<(BinOp, u8)> {
        let op = match self.current_kind() {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::StarStar => BinOp::Pow,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::BangEq => BinOp::Ne,
            TokenKind::EqEqEq => BinOp::StrictEq,
            TokenKind::BangEqEq => BinOp::StrictNe,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::AmpAmp => BinOp::And,
            TokenKind::PipePipe => BinOp::Or,
            TokenKind::QuestionQuestion => BinOp::Coalesce,
            _ => return None,
        };
        Some((op, op.precedence()))
    }

    fn prefix_expr(&mut self) -> ParseResult<Expr> {
        let op = match self.current_kind() {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Typeof => UnaryOp::Typeof,
            _ => return self.postfix_expr(),
        };
        let op_token = self.advance();
        let operand = self.nested(Self::prefix_expr)?;
        let span = op_token.span.merge(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    /// Member access, indexing and calls after a primary expression
    fn postfix_expr(&mut self) -> ParseResult<Expr> {
        let saved = self.depth;
        let result = self.postfix_chain();
        self.depth = saved;
        result
    }

    fn postfix_chain(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;
        let mut has_optional = false;

        loop {
            let kind = match self.current_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.property_name()?;
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: name.lexeme,
                        optional: false,
                    }
                }
                TokenKind::QuestionDot => {
                    self.advance();
                    has_optional = true;
                    match self.current_kind() {
                        TokenKind::LParen => ExprKind::Call {
                            callee: Box::new(expr),
                            args: self.arguments()?,
                            optional: true,
                        },
                        TokenKind::LBracket => {
                            self.advance();
                            let index = self.expression()?;
                            self.expect(TokenKind::RBracket)?;
                            ExprKind::Index {
                                object: Box::new(expr),
                                index: Box::new(index),
                                optional: true,
                            }
                        }
                        _ => {
                            let name = self.property_name()?;
                            ExprKind::Member {
                                object: Box::new(expr),
                                property: name.lexeme,
                                optional: true,
                            }
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(TokenKind::RBracket)?;
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                        optional: false,
                    }
                }
                TokenKind::LParen => ExprKind::Call {
                    callee: Box::new(expr),
                    args: self.arguments()?,
                    optional: false,
                },
                _ => break,
            };
            self.enter()?;
            let end = self.tokens[self.position.saturating_sub(1)].span;
            let start = match &kind {
                ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => object.span,
                ExprKind::Call { callee, .. } => callee.span,
                _ => end,
            };
            expr = Expr::new(kind, start.merge(end));
        }

        Ok(if has_optional {
            expr.optional_chain()
        } else {
            expr
        })
    }

    fn property_name(&mut self) -> ParseResult<Token> {
        if self.current_kind().is_property_name() {
            Ok(self.advance())
        } else {
            Err(ParseError::unexpected(self.current()))
        }
    }

    /// `( [item {, item}] [,] )`
    fn arguments(&mut self) -> ParseResult<Vec<ListItem>> {
        self.expect(TokenKind::LParen)?;
        self.list_items(TokenKind::RParen)
    }

    /// Comma-separated items with optional spread, up to and including `close`
    fn list_items(&mut self, close: TokenKind) -> ParseResult<Vec<ListItem>> {
        let mut items = Vec::new();
        while !self.check(close) {
            if self.eat(TokenKind::DotDotDot) {
                items.push(ListItem::Spread(self.expression()?));
            } else {
                items.push(ListItem::Item(self.expression()?));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        let token = self.current().clone();
        let span = token.span;
        let literal = move |lit: Literal| Expr::new(ExprKind::Literal(lit), span);
        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value: f64 = token.lexeme.parse().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber(token.lexeme.clone()), token.span)
                })?;
                Ok(literal(Literal::Number(value)))
            }
            TokenKind::HexNumber => {
                self.advance();
                let value = u64::from_str_radix(&token.lexeme[2..], 16).map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber(token.lexeme.clone()), token.span)
                })?;
                Ok(literal(Literal::Number(value as f64)))
            }
            TokenKind::String => {
                self.advance();
                let value = unescape(&token.lexeme).map_err(|err| {
                    ParseError::from(crate::expr::lexer::SpannedError::new(err, token.span))
                })?;
                Ok(literal(Literal::String(value)))
            }
            TokenKind::True => {
                self.advance();
                Ok(literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Ok(literal(Literal::Bool(false)))
            }
            TokenKind::Null => {
                self.advance();
                Ok(literal(Literal::Null))
            }
            TokenKind::Ident => {
                self.advance();
                Ok(Expr::new(ExprKind::Ident(token.lexeme), token.span))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let items = self.nested(|p| p.list_items(TokenKind::RBracket))?;
                let span = token.span.merge(self.previous_span());
                Ok(Expr::new(ExprKind::Array(items), span))
            }
            TokenKind::LBrace => {
                self.advance();
                let entries = self.nested(Self::object_entries)?;
                let span = token.span.merge(self.previous_span());
                Ok(Expr::new(ExprKind::Object(entries), span))
            }
            TokenKind::Backtick => {
                self.advance();
                let parts = self.nested(Self::template_parts)?;
                let span = token.span.merge(self.previous_span());
                Ok(Expr::new(ExprKind::Template(parts), span))
            }
            _ => Err(ParseError::unexpected(&token)),
        }
    }

    fn previous_span(&self) -> Span {
        self.tokens[self.position.saturating_sub(1)].span
    }

    /// Object literal body after `{`, through the closing `}`
    fn object_entries(&mut self) -> ParseResult<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            if self.eat(TokenKind::DotDotDot) {
                entries.push(ObjectEntry::Spread(self.expression()?));
            } else {
                entries.push(self.object_property()?);
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(entries)
    }

    fn object_property(&mut self) -> ParseResult<ObjectEntry> {
        let token = self.current().clone();
        let key = match token.kind {
            TokenKind::LBracket => {
                self.advance();
                let key = self.expression()?;
                self.expect(TokenKind::RBracket)?;
                PropertyKey::Computed(key)
            }
            TokenKind::String => {
                self.advance();
                let key = unescape(&token.lexeme).map_err(|err| {
                    ParseError::from(crate::expr::lexer::SpannedError::new(err, token.span))
                })?;
                PropertyKey::Static(key)
            }
            TokenKind::Number => {
                self.advance();
                let value: f64 = token.lexeme.parse().map_err(|_| {
                    ParseError::new(ParseErrorKind::InvalidNumber(token.lexeme.clone()), token.span)
                })?;
                PropertyKey::Static(number_to_string(value))
            }
            kind if kind.is_property_name() => {
                self.advance();
                if kind == TokenKind::Ident
                    && matches!(self.current_kind(), TokenKind::Comma | TokenKind::RBrace)
                {
                    // Shorthand `{ name }`
                    return Ok(ObjectEntry::Property {
                        key: PropertyKey::Static(token.lexeme.clone()),
                        value: Expr::new(ExprKind::Ident(token.lexeme), token.span),
                    });
                }
                PropertyKey::Static(token.lexeme)
            }
            _ => return Err(ParseError::unexpected(&token)),
        };
        self.expect(TokenKind::Colon)?;
        let value = self.expression()?;
        Ok(ObjectEntry::Property { key, value })
    }

    /// Template body after the opening backtick, through the closing one
    fn template_parts(&mut self) -> ParseResult<Vec<TemplatePart>> {
        let mut parts = Vec::new();
        loop {
            match self.current_kind() {
                TokenKind::TemplatePart => {
                    let text = self.advance().lexeme;
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(text));
                    }
                }
                TokenKind::TemplateExprStart => {
                    self.advance();
                    if self.check(TokenKind::TemplateExprEnd) {
                        return Err(ParseError::unexpected(self.current()));
                    }
                    parts.push(TemplatePart::Substitution(self.expression()?));
                    self.expect(TokenKind::TemplateExprEnd)?;
                }
                TokenKind::TemplateEnd => {
                    self.advance();
                    return Ok(parts);
                }
                _ => return Err(ParseError::unexpected(self.current())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Expr {
        parse_expression(source).unwrap_or_else(|e| panic!("failed to parse {source:?}: {e}"))
    }

    fn parse_err(source: &str) -> ParseErrorKind {
        parse_expression(source)
            .expect_err(&format!("{source:?} should not parse"))
            .kind
    }

    #[test]
    fn precedence_and_associativity() {
        let ExprKind::Binary { op, right, .. } = parse("1 + 2 * 3").kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));

        let ExprKind::Binary { op, right, .. } = parse("2 ** 3 ** 2").kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Pow);
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Pow, .. }));

        let ExprKind::Binary { op, left, .. } = parse("a - b - c").kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Sub);
        assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::Sub, .. }));
    }

    #[test]
    fn conditional_is_right_nested() {
        let ExprKind::Conditional { alternate, .. } = parse("a ? 1 : b ? 2 : 3").kind else {
            panic!("expected conditional");
        };
        assert!(matches!(alternate.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn arrow_functions() {
        let ExprKind::Arrow(f) = parse("x => x + 1").kind else {
            panic!("expected arrow");
        };
        assert_eq!(f.params, vec!["x".to_string()]);

        let ExprKind::Arrow(f) = parse("(a, b) => ({ sum: a + b })").kind else {
            panic!("expected arrow");
        };
        assert_eq!(f.params.len(), 2);
        assert!(matches!(f.body.kind, ExprKind::Object(_)));

        assert!(matches!(parse("() => 1").kind, ExprKind::Arrow(_)));
        assert!(matches!(
            parse("items.map((item) => item.id)").kind,
            ExprKind::Call { .. }
        ));
    }

    #[test]
    fn optional_chain_is_wrapped() {
        let ExprKind::OptionalChain(inner) = parse("a?.b.c").kind else {
            panic!("expected optional chain");
        };
        assert!(matches!(inner.kind, ExprKind::Member { optional: false, .. }));
        assert!(matches!(parse("a.b").kind, ExprKind::Member { .. }));
    }

    #[test]
    fn object_literals() {
        let ExprKind::Object(entries) = parse("({ a, 'b c': 1, [k]: 2, ...rest, default: 3 })").kind
        else {
            panic!("expected object");
        };
        assert_eq!(entries.len(), 5);
        assert!(matches!(entries[3], ObjectEntry::Spread(_)));
    }

    #[test]
    fn templates() {
        let ExprKind::Template(parts) = parse("`Hello ${user.name}, you have ${n} messages`").kind
        else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 5);
        assert!(matches!(parse("``").kind, ExprKind::Template(ref p) if p.is_empty()));
    }

    #[test]
    fn keywords_as_property_names() {
        assert!(matches!(parse("x.default").kind, ExprKind::Member { .. }));
        assert!(matches!(parse("x?.new").kind, ExprKind::OptionalChain(_)));
    }

    #[test]
    fn rejects_statements() {
        assert_eq!(
            parse_err("let x = 1"),
            ParseErrorKind::UnexpectedToken("let".into())
        );
        assert_eq!(parse_err("a; b"), ParseErrorKind::UnexpectedToken(";".into()));
        assert_eq!(parse_err("a = 1"), ParseErrorKind::Assignment);
        assert_eq!(parse_err("x => { return 1 }"), ParseErrorKind::BlockBody);
    }

    #[test]
    fn reports_incomplete_input() {
        assert_eq!(parse_err(""), ParseErrorKind::UnexpectedEnd);
        assert_eq!(parse_err("1 +"), ParseErrorKind::UnexpectedEnd);
        assert_eq!(parse_err("(1"), ParseErrorKind::UnexpectedEnd);
        assert_eq!(parse_err("a b"), ParseErrorKind::UnexpectedIdentifier("b".into()));
        assert_eq!(parse_err("`abc"), ParseErrorKind::UnterminatedTemplate);
        assert_eq!(parse_err("'abc"), ParseErrorKind::InvalidToken);
    }

    #[test]
    fn duplicate_parameters() {
        assert_eq!(
            parse_err("(a, a) => a"),
            ParseErrorKind::DuplicateParameter("a".into())
        );
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(parse_err(&deep), ParseErrorKind::TooDeep);
        let long = vec!["1"; 300].join(" + ");
        assert_eq!(parse_err(&long), ParseErrorKind::TooDeep);
        let unary = format!("{}x", "!".repeat(200));
        assert_eq!(parse_err(&unary), ParseErrorKind::TooDeep);
        assert!(Parser::parse(&vec!["1"; 50].join(" + "), DEFAULT_MAX_DEPTH).is_ok());
    }
}
