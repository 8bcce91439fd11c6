//! Syntax tree for binding expressions

use std::sync::Arc;

use super::lexer::Span;

/// Binary operators, including the short-circuiting logical ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Exponentiation (**)
    Pow,

    // Comparison
    /// Loose equality (==)
    Eq,
    /// Loose inequality (!=)
    Ne,
    /// Strict equality (===)
    StrictEq,
    /// Strict inequality (!==)
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    And,
    Or,
    /// Nullish coalescing (??)
    Coalesce,
}

impl BinOp {
    /// Binding power, higher binds tighter
    #[must_use]
    pub const fn precedence(self) -> u8 {
        match self {
            BinOp::Coalesce => 1,
            BinOp::Or => 2,
            BinOp::And => 3,
            BinOp::Eq | BinOp::Ne | BinOp::StrictEq | BinOp::StrictNe => 4,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 5,
            BinOp::Add | BinOp::Sub => 6,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 7,
            BinOp::Pow => 8,
        }
    }

    /// `a ** b ** c` is `a ** (b ** c)`
    #[must_use]
    pub const fn is_left_associative(self) -> bool {
        !matches!(self, BinOp::Pow)
    }

    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Coalesce)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::StrictEq => "===",
            BinOp::StrictNe => "!==",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Coalesce => "??",
        }
    }
}

/// Prefix operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    Typeof,
}

impl UnaryOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Typeof => "typeof",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
}

/// An element of an array literal or an argument list
#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Static(String),
    Computed(Expr),
}

/// An entry of an object literal. Shorthand `{ a }` is parsed as `{ a: a }`.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectEntry {
    Property { key: PropertyKey, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Substitution(Expr),
}

/// An arrow function. The body is a single expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFunction {
    pub params: Vec<String>,
    pub body: Expr,
}

/// An expression with its source span
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    #[must_use]
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Wraps a member/call chain that contains `?.`
    #[must_use]
    pub fn optional_chain(self) -> Self {
        let span = self.span;
        Self::new(ExprKind::OptionalChain(Box::new(self)), span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Template(Vec<TemplatePart>),
    Array(Vec<ListItem>),
    Object(Vec<ObjectEntry>),

    /// `object.property` or `object?.property`
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    /// `object[index]` or `object?.[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    /// `callee(args)` or `callee?.(args)`
    Call {
        callee: Box<Expr>,
        args: Vec<ListItem>,
        optional: bool,
    },
    /// Boundary of a chain containing `?.`; a nullish short-circuit anywhere
    /// inside yields `undefined` for the whole chain
    OptionalChain(Box<Expr>),

    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Arrow(Arc<ArrowFunction>),
}
