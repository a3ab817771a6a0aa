/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates.
//! Each node includes a source span for error reporting.
//!
//! The node set is closed: there is no assignment, import, include or macro
//! node, so a compiled template can only read from its bindings.

/// A byte range in the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// Literal text to be output as-is.
    Literal(Literal),

    /// Expression interpolation: `${expr}`
    Print(Print),

    /// Conditional block: `<% if c %>...<% elif d %>...<% else %>...<% endif %>`
    Conditional(Conditional),

    /// For loop: `<% for x in items %>...<% else %>...<% endfor %>`
    ForLoop(ForLoop),

    /// Comment (not rendered): `<%doc>...</%doc>` or `## ...`
    Comment(Comment),
}

/// Literal text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    /// The literal text content.
    pub text: String,
    pub span: Span,
}

/// Interpolated expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Print {
    pub expr: Expr,
    pub span: Span,
}

/// Conditional block.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    /// List of (condition, body) pairs for if/elif branches.
    pub branches: Vec<(Expr, Vec<TemplateNode>)>,
    /// Optional else branch.
    pub else_branch: Option<Vec<TemplateNode>>,
    /// Source location of the entire conditional.
    pub span: Span,
}

/// For loop over a finite sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    /// Loop variable(s).
    pub target: LoopTarget,
    /// Expression producing the sequence to iterate.
    pub iter: Expr,
    /// Loop body.
    pub body: Vec<TemplateNode>,
    /// Rendered when the sequence is empty.
    pub else_branch: Option<Vec<TemplateNode>>,
    pub span: Span,
}

/// Names bound by a for loop.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopTarget {
    /// `for item in items`
    Single(String),
    /// `for key, value in pairs`
    Tuple(Vec<String>),
}

/// Comment (not rendered).
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    /// The comment text.
    pub text: String,
    pub span: Span,
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal constant.
    Const(Const, Span),
    /// List display: `[a, b]`
    List(Vec<Expr>, Span),
    /// Name lookup in the bindings.
    Name(String, Span),
    /// Attribute access: `base.name`
    Attr {
        base: Box<Expr>,
        name: String,
        span: Span,
    },
    /// Subscript: `base[index]`
    Item {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// Call: `func(args)`
    Call {
        func: Box<Expr>,
        args: CallArgs,
        span: Span,
    },
    /// Filter application: `expr | name(args)`
    Filter {
        expr: Box<Expr>,
        name: String,
        args: CallArgs,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `left or right`, returning an operand value.
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `left and right`, returning an operand value.
    And {
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    /// `then if cond else otherwise`
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Const(_, span) | Expr::List(_, span) | Expr::Name(_, span) => *span,
            Expr::Attr { span, .. }
            | Expr::Item { span, .. }
            | Expr::Call { span, .. }
            | Expr::Filter { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Or { span, .. }
            | Expr::And { span, .. }
            | Expr::Conditional { span, .. } => *span,
        }
    }
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Positional and keyword call arguments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallArgs {
    pub positional: Vec<Expr>,
    pub keyword: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    /// `~` string concatenation
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "~",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
        }
    }
}
