//! Predicate expression engine: a small CEL-style language.
//!
//! `parse` turns text into an `Expr`, `Env::check` type-checks it against
//! declared variables, and `eval::evaluate` runs it under a cost meter.
//! Macros (`has`, `all`, `exists`, `exists_one`, `map`, `filter`) are
//! expanded by the parser, so the checker and evaluator only ever see
//! plain AST nodes.

mod builtins;
pub mod check;
pub mod eval;
pub mod lexer;
pub mod parser;
mod value_ops;

pub(crate) use builtins::RegexCache;
pub use check::{Env, Type};
pub use eval::{Activation, EvalDetails};
pub use parser::parse;

use crate::error::CompileError;
use crate::value::Value;

/// A predicate AST node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant: `1`, `"a"`, `true`, `null`
    Literal(Value),
    /// Variable reference: `item`
    Ident(String),
    /// Field selection: `a.b`
    Select(Box<Expr>, String),
    /// Presence test: `has(a.b)`
    Has(Box<Expr>, String),
    /// Index: `a[b]`
    Index(Box<Expr>, Box<Expr>),
    /// Function call, global (`size(x)`) or receiver-style (`x.size()`)
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    /// Logical negation: `!a`
    Not(Box<Expr>),
    /// Numeric negation: `-a`
    Neg(Box<Expr>),
    /// Comparison: `a == b`, `a < b`, etc.
    Compare(Box<Expr>, CmpOp, Box<Expr>),
    /// Membership: `a in b`
    In(Box<Expr>, Box<Expr>),
    /// Arithmetic: `a + b`, `a % b`, etc.
    Arith(Box<Expr>, ArithOp, Box<Expr>),
    /// Short-circuit boolean: `a && b`, `a || b`
    BoolOp(Box<Expr>, BoolOp, Box<Expr>),
    /// Ternary: `c ? a : b`
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    /// List construction: `[a, b]`
    List(Vec<Expr>),
    /// Map construction: `{"k": v}`
    Map(Vec<(Expr, Expr)>),
    /// Expanded comprehension macro: `r.all(x, p)` and friends
    Comprehension(Box<Comprehension>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    All,
    Exists,
    ExistsOne,
    Map,
    Filter,
}

/// A comprehension over a list (elements) or a map (keys).
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    pub range: Expr,
    pub var: String,
    /// Condition for all/exists/exists_one/filter and the optional guard of
    /// the three-argument `map`.
    pub predicate: Option<Expr>,
    /// Output expression for `map`.
    pub transform: Option<Expr>,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

/// A parsed and type-checked expression, ready to be wrapped in a program.
#[derive(Debug, Clone)]
pub struct Checked {
    pub(crate) expr: Expr,
    pub(crate) result_type: Type,
}

impl Checked {
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Statically inferred result type (`Dyn` when only known at runtime).
    pub fn result_type(&self) -> Type {
        self.result_type
    }
}

/// Parse `text` and check it against `env`.
pub fn compile(text: &str, env: &Env) -> Result<Checked, CompileError> {
    let expr = parse(text)?;
    let result_type = env.check(&expr)?;
    Ok(Checked { expr, result_type })
}
