//! Syntax tree for compiled templates.
//!
//! Literal text and value directives are statements of their own, so a
//! template body is simply a list of [`Stmt`]s.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Member {
        object: Box<Expr>,
        property: String,
        optional: bool,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `x => body`, only valid as a call argument.
    Arrow {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    /// `x++`, `--x` and friends.
    Update {
        name: String,
        delta: f64,
        prefix: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogicalOp {
    And,
    Or,
    Nullish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AssignOp {
    Set,
    Add,
    Sub,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stmt {
    /// Literal template text.
    Text(String),
    /// `<%= expr %>` (escaped) or `<%- expr %>` (raw).
    Output { expr: Expr, escape: bool },
    Declare(Vec<(String, Option<Expr>)>),
    Assign {
        name: String,
        op: AssignOp,
        value: Expr,
    },
    Expr(Expr),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    ForOf {
        binding: String,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        binding: String,
        object: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    Block(Vec<Stmt>),
    Break,
    Continue,
    Empty,
}

impl Stmt {
    /// Whether this statement, or any nested one, writes escaped output.
    pub(crate) fn escapes_output(&self) -> bool {
        match self {
            Self::Output { escape, .. } => *escape,
            Self::If {
                consequent,
                alternate,
                ..
            } => {
                consequent.escapes_output()
                    || alternate.as_ref().is_some_and(|alt| alt.escapes_output())
            }
            Self::ForOf { body, .. }
            | Self::ForIn { body, .. }
            | Self::For { body, .. }
            | Self::While { body, .. } => body.escapes_output(),
            Self::Block(stmts) => stmts.iter().any(Stmt::escapes_output),
            _ => false,
        }
    }
}
