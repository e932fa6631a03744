//! Static checking of a parsed expression against declared variables.
//!
//! Types are coarse: anything reached through a map field or a
//! comprehension variable is `Dyn` and only checked at evaluation time.
//! The checker rejects what can never work (undeclared names, unknown
//! functions, operand types that are known and incompatible) and infers
//! the result type where it can.

use std::fmt;

use super::builtins;
use super::{ArithOp, CmpOp, ComprehensionKind, Expr};
use crate::error::CompileError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    Uint,
    Double,
    String,
    List,
    Map,
}

impl Type {
    pub fn of(value: &Value) -> Type {
        match value {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::Uint(_) => Type::Uint,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Array(_) => Type::List,
            Value::Object(_) => Type::Map,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Uint | Type::Double)
    }

    /// True when a value of this type may turn out to be `want` at runtime.
    pub(crate) fn admits(self, want: Type) -> bool {
        self == Type::Dyn || self == want
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Type::Dyn => "dyn",
            Type::Null => "null_type",
            Type::Bool => "bool",
            Type::Int => "int",
            Type::Uint => "uint",
            Type::Double => "double",
            Type::String => "string",
            Type::List => "list",
            Type::Map => "map",
        })
    }
}

/// Variable declarations visible to an expression.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: Vec<(String, Type)>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// The filter environment: a single `item` of map type.
    pub fn standard() -> Self {
        Self::new().declare(crate::program::ITEM, Type::Map)
    }

    pub fn declare(mut self, name: &str, ty: Type) -> Self {
        self.vars.retain(|(n, _)| n != name);
        self.vars.push((name.to_string(), ty));
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Type> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    /// Check `expr` and return its inferred result type.
    pub fn check(&self, expr: &Expr) -> Result<Type, CompileError> {
        let mut checker = Checker {
            env: self,
            locals: Vec::new(),
        };
        checker.check(expr)
    }
}

struct Checker<'a> {
    env: &'a Env,
    /// Comprehension variables in scope, innermost last.
    locals: Vec<&'a str>,
}

fn check_error(msg: impl Into<String>) -> CompileError {
    CompileError::Check(msg.into())
}

fn no_overload(op: &str, left: Type, right: Type) -> CompileError {
    check_error(format!(
        "found no matching overload for '{op}' applied to '({left}, {right})'"
    ))
}

impl<'a> Checker<'a> {
    fn check(&mut self, expr: &'a Expr) -> Result<Type, CompileError> {
        match expr {
            Expr::Literal(v) => Ok(Type::of(v)),

            Expr::Ident(name) => {
                if self.locals.iter().rev().any(|l| *l == name) {
                    return Ok(Type::Dyn);
                }
                self.env
                    .lookup(name)
                    .ok_or_else(|| check_error(format!("undeclared reference to '{name}'")))
            }

            Expr::Select(operand, field) | Expr::Has(operand, field) => {
                let t = self.check(operand)?;
                if !t.admits(Type::Map) {
                    return Err(check_error(format!(
                        "type '{t}' does not support field selection of '{field}'"
                    )));
                }
                Ok(if matches!(expr, Expr::Has(..)) {
                    Type::Bool
                } else {
                    Type::Dyn
                })
            }

            Expr::Index(operand, index) => {
                let t = self.check(operand)?;
                let i = self.check(index)?;
                let ok = match t {
                    Type::Dyn => true,
                    Type::List => matches!(i, Type::Dyn | Type::Int | Type::Uint),
                    Type::Map => i.admits(Type::String),
                    _ => false,
                };
                if !ok {
                    return Err(no_overload("_[_]", t, i));
                }
                Ok(Type::Dyn)
            }

            Expr::Call {
                target,
                function,
                args,
            } => {
                let target_type = match target {
                    Some(t) => Some(self.check(t)?),
                    None => None,
                };
                let mut arg_types = Vec::with_capacity(args.len());
                for a in args {
                    arg_types.push(self.check(a)?);
                }
                if function == "matches" {
                    self.check_regex_literal(target.as_deref(), args)?;
                }
                builtins::check_call(function, target_type, &arg_types).map_err(check_error)
            }

            Expr::Not(inner) => {
                let t = self.check(inner)?;
                if !t.admits(Type::Bool) {
                    return Err(check_error(format!(
                        "found no matching overload for '!_' applied to '({t})'"
                    )));
                }
                Ok(Type::Bool)
            }

            Expr::Neg(inner) => {
                let t = self.check(inner)?;
                match t {
                    Type::Dyn | Type::Int | Type::Double => Ok(t),
                    _ => Err(check_error(format!(
                        "found no matching overload for '-_' applied to '({t})'"
                    ))),
                }
            }

            Expr::Compare(left, op, right) => {
                let l = self.check(left)?;
                let r = self.check(right)?;
                if matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    return Ok(Type::Bool);
                }
                let comparable = l == Type::Dyn
                    || r == Type::Dyn
                    || (l.is_numeric() && r.is_numeric())
                    || (l == r && matches!(l, Type::String | Type::Bool));
                if !comparable {
                    return Err(no_overload(op.symbol(), l, r));
                }
                Ok(Type::Bool)
            }

            Expr::In(elem, container) => {
                let e = self.check(elem)?;
                let c = self.check(container)?;
                let ok = match c {
                    Type::Dyn | Type::List => true,
                    Type::Map => e.admits(Type::String),
                    _ => false,
                };
                if !ok {
                    return Err(no_overload("@in", e, c));
                }
                Ok(Type::Bool)
            }

            Expr::Arith(left, op, right) => {
                let l = self.check(left)?;
                let r = self.check(right)?;
                arith_type(*op, l, r)
            }

            Expr::BoolOp(left, _, right) => {
                for side in [left, right] {
                    let t = self.check(side)?;
                    if !t.admits(Type::Bool) {
                        return Err(check_error(format!(
                            "logical operator requires bool operands, got '{t}'"
                        )));
                    }
                }
                Ok(Type::Bool)
            }

            Expr::Conditional(cond, then_branch, else_branch) => {
                let c = self.check(cond)?;
                if !c.admits(Type::Bool) {
                    return Err(check_error(format!(
                        "conditional requires a bool condition, got '{c}'"
                    )));
                }
                let t = self.check(then_branch)?;
                let e = self.check(else_branch)?;
                Ok(if t == e { t } else { Type::Dyn })
            }

            Expr::List(items) => {
                for item in items {
                    self.check(item)?;
                }
                Ok(Type::List)
            }

            Expr::Map(entries) => {
                for (k, v) in entries {
                    let kt = self.check(k)?;
                    if !kt.admits(Type::String) {
                        return Err(check_error(format!(
                            "unsupported map key type '{kt}'; keys must be strings"
                        )));
                    }
                    self.check(v)?;
                }
                Ok(Type::Map)
            }

            Expr::Comprehension(c) => {
                let range = self.check(&c.range)?;
                if !matches!(range, Type::Dyn | Type::List | Type::Map) {
                    return Err(check_error(format!(
                        "expression of type '{range}' cannot be the range of a comprehension"
                    )));
                }
                self.locals.push(&c.var);
                let result = self.check_comprehension_body(c);
                self.locals.pop();
                result
            }
        }
    }

    fn check_comprehension_body(&mut self, c: &'a super::Comprehension) -> Result<Type, CompileError> {
        if let Some(p) = &c.predicate {
            let t = self.check(p)?;
            if !t.admits(Type::Bool) {
                return Err(check_error(format!(
                    "comprehension predicate must be bool, got '{t}'"
                )));
            }
        }
        if let Some(t) = &c.transform {
            self.check(t)?;
        }
        Ok(match c.kind {
            ComprehensionKind::All | ComprehensionKind::Exists | ComprehensionKind::ExistsOne => {
                Type::Bool
            }
            ComprehensionKind::Map | ComprehensionKind::Filter => Type::List,
        })
    }

    /// Reject a literal regex pattern that does not compile.
    fn check_regex_literal(&self, target: Option<&Expr>, args: &[Expr]) -> Result<(), CompileError> {
        let pattern = match (target, args) {
            (Some(_), [Expr::Literal(Value::String(p))]) => p,
            (None, [_, Expr::Literal(Value::String(p))]) => p,
            _ => return Ok(()),
        };
        regex::Regex::new(pattern)
            .map(|_| ())
            .map_err(|e| check_error(format!("invalid regular expression '{pattern}': {e}")))
    }
}

fn arith_type(op: ArithOp, l: Type, r: Type) -> Result<Type, CompileError> {
    let sym = op.symbol();
    if l == Type::Dyn || r == Type::Dyn {
        // One side known: it still has to be an arithmetic-capable type.
        let known = if l == Type::Dyn { r } else { l };
        let ok = match op {
            ArithOp::Add => matches!(
                known,
                Type::Dyn | Type::Int | Type::Uint | Type::Double | Type::String | Type::List
            ),
            ArithOp::Mod => matches!(known, Type::Dyn | Type::Int | Type::Uint),
            _ => known == Type::Dyn || known.is_numeric(),
        };
        return if ok { Ok(Type::Dyn) } else { Err(no_overload(sym, l, r)) };
    }
    match op {
        ArithOp::Add if l == r && matches!(l, Type::String | Type::List) => Ok(l),
        ArithOp::Mod if l == r && matches!(l, Type::Int | Type::Uint) => Ok(l),
        ArithOp::Mod => Err(no_overload(sym, l, r)),
        _ if l.is_numeric() && r.is_numeric() => Ok(if l == r { l } else { Type::Double }),
        _ => Err(no_overload(sym, l, r)),
    }
}
