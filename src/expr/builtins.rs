/// Builtin functions: static signatures for the checker and runtime
/// dispatch for the evaluator.
use std::collections::HashMap;

use regex::Regex;

use super::Expr;
use super::check::Type;
use crate::error::EvalError;
use crate::value::Value;

/// How a function may be called.
struct Signature {
    name: &'static str,
    /// `x.f(..)` when true, `f(..)` when false.
    receiver: bool,
    /// Argument count, excluding the receiver.
    arity: usize,
    result: Type,
}

const fn sig(name: &'static str, receiver: bool, arity: usize, result: Type) -> Signature {
    Signature {
        name,
        receiver,
        arity,
        result,
    }
}

const SIGNATURES: &[Signature] = &[
    sig("size", false, 1, Type::Int),
    sig("size", true, 0, Type::Int),
    sig("int", false, 1, Type::Int),
    sig("uint", false, 1, Type::Uint),
    sig("double", false, 1, Type::Double),
    sig("string", false, 1, Type::String),
    sig("bool", false, 1, Type::Bool),
    sig("type", false, 1, Type::String),
    sig("dyn", false, 1, Type::Dyn),
    sig("contains", true, 1, Type::Bool),
    sig("startsWith", true, 1, Type::Bool),
    sig("endsWith", true, 1, Type::Bool),
    sig("matches", true, 1, Type::Bool),
    sig("matches", false, 2, Type::Bool),
    sig("lowerAscii", true, 0, Type::String),
    sig("upperAscii", true, 0, Type::String),
    sig("trim", true, 0, Type::String),
];

/// String functions whose receiver and arguments must all be strings.
fn is_string_function(name: &str) -> bool {
    matches!(
        name,
        "contains" | "startsWith" | "endsWith" | "matches" | "lowerAscii" | "upperAscii" | "trim"
    )
}

/// Resolve a call's result type, or describe why no overload fits.
pub(super) fn check_call(
    name: &str,
    target: Option<Type>,
    args: &[Type],
) -> Result<Type, String> {
    let Some(sig) = SIGNATURES
        .iter()
        .find(|s| s.name == name && s.receiver == target.is_some() && s.arity == args.len())
    else {
        if SIGNATURES.iter().any(|s| s.name == name) {
            return Err(format!(
                "found no matching overload for '{name}' with {} argument(s)",
                args.len() + usize::from(target.is_some())
            ));
        }
        return Err(format!("undeclared reference to '{name}'"));
    };
    let operands: Vec<Type> = target.into_iter().chain(args.iter().copied()).collect();
    let ok = if is_string_function(name) {
        operands.iter().all(|t| t.admits(Type::String))
    } else if name == "size" {
        operands
            .iter()
            .all(|t| matches!(t, Type::Dyn | Type::String | Type::List | Type::Map))
    } else {
        true
    };
    if !ok {
        let list: Vec<String> = operands.iter().map(ToString::to_string).collect();
        return Err(format!(
            "found no matching overload for '{name}' applied to '({})'",
            list.join(", ")
        ));
    }
    Ok(sig.result)
}

/// Regexes compiled once from literal patterns in the expression.
#[derive(Debug, Clone, Default)]
pub(crate) struct RegexCache {
    compiled: HashMap<String, Regex>,
}

impl RegexCache {
    /// Collect and compile every literal `matches` pattern in `expr`.
    pub(crate) fn from_expr(expr: &Expr) -> Self {
        let mut cache = Self::default();
        cache.collect(expr);
        cache
    }

    fn collect(&mut self, expr: &Expr) {
        match expr {
            Expr::Call {
                target,
                function,
                args,
            } => {
                if function == "matches" {
                    let literal = match (target, args.as_slice()) {
                        (Some(_), [Expr::Literal(Value::String(p))])
                        | (None, [_, Expr::Literal(Value::String(p))]) => Some(p),
                        _ => None,
                    };
                    if let Some(p) = literal {
                        if let Ok(re) = Regex::new(p) {
                            self.compiled.insert(p.clone(), re);
                        }
                    }
                }
                if let Some(t) = target {
                    self.collect(t);
                }
                args.iter().for_each(|a| self.collect(a));
            }
            Expr::Literal(_) | Expr::Ident(_) => {}
            Expr::Select(e, _) | Expr::Has(e, _) | Expr::Not(e) | Expr::Neg(e) => self.collect(e),
            Expr::Index(a, b)
            | Expr::Compare(a, _, b)
            | Expr::In(a, b)
            | Expr::Arith(a, _, b)
            | Expr::BoolOp(a, _, b) => {
                self.collect(a);
                self.collect(b);
            }
            Expr::Conditional(c, t, e) => {
                self.collect(c);
                self.collect(t);
                self.collect(e);
            }
            Expr::List(items) => items.iter().for_each(|i| self.collect(i)),
            Expr::Map(entries) => entries.iter().for_each(|(k, v)| {
                self.collect(k);
                self.collect(v);
            }),
            Expr::Comprehension(c) => {
                self.collect(&c.range);
                if let Some(p) = &c.predicate {
                    self.collect(p);
                }
                if let Some(t) = &c.transform {
                    self.collect(t);
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.compiled.len()
    }

    fn is_match(&self, pattern: &str, text: &str) -> Result<bool, EvalError> {
        if let Some(re) = self.compiled.get(pattern) {
            return Ok(re.is_match(text));
        }
        let re = Regex::new(pattern)
            .map_err(|e| EvalError::runtime(format!("invalid regular expression: {e}")))?;
        Ok(re.is_match(text))
    }
}

/// Extra cost for functions that scan their string operands.
pub(super) fn scan_cost(name: &str, target: Option<&Value>, args: &[Value]) -> u64 {
    if !is_string_function(name) {
        return 0;
    }
    target
        .into_iter()
        .chain(args.iter())
        .map(|v| match v {
            Value::String(s) => s.len() as u64 / 10,
            _ => 0,
        })
        .sum()
}

fn no_overload(name: &str, operands: &[&Value]) -> EvalError {
    let types: Vec<&str> = operands.iter().map(|v| v.type_name()).collect();
    EvalError::runtime(format!("no such overload: {name}({})", types.join(", ")))
}

/// Dispatch a builtin call with already-evaluated operands.
pub(super) fn call(
    name: &str,
    target: Option<Value>,
    args: Vec<Value>,
    regexes: &RegexCache,
) -> Result<Value, EvalError> {
    match (name, target, args.as_slice()) {
        ("size", None, [v]) => size(v),
        ("size", Some(v), []) => size(&v),
        ("int", None, [v]) => to_int(v),
        ("uint", None, [v]) => to_uint(v),
        ("double", None, [v]) => to_double(v),
        ("string", None, [v]) => to_string(v),
        ("bool", None, [v]) => to_bool(v),
        ("type", None, [v]) => Ok(Value::String(v.type_name().to_string())),
        ("dyn", None, [v]) => Ok(v.clone()),
        ("matches", None, [Value::String(s), Value::String(p)]) => {
            Ok(Value::Bool(regexes.is_match(p, s)?))
        }
        (_, Some(Value::String(s)), rest) => string_method(name, &s, rest, regexes),
        (_, target, rest) => {
            let operands: Vec<&Value> = target.iter().chain(rest.iter()).collect();
            Err(no_overload(name, &operands))
        }
    }
}

fn string_method(
    name: &str,
    s: &str,
    args: &[Value],
    regexes: &RegexCache,
) -> Result<Value, EvalError> {
    let out = match (name, args) {
        ("contains", [Value::String(a)]) => Value::Bool(s.contains(a.as_str())),
        ("startsWith", [Value::String(a)]) => Value::Bool(s.starts_with(a.as_str())),
        ("endsWith", [Value::String(a)]) => Value::Bool(s.ends_with(a.as_str())),
        ("matches", [Value::String(p)]) => Value::Bool(regexes.is_match(p, s)?),
        ("lowerAscii", []) => Value::String(s.to_ascii_lowercase()),
        ("upperAscii", []) => Value::String(s.to_ascii_uppercase()),
        ("trim", []) => Value::String(s.trim().to_string()),
        _ => {
            let receiver = Value::String(s.to_string());
            let operands: Vec<&Value> = std::iter::once(&receiver).chain(args.iter()).collect();
            return Err(no_overload(name, &operands));
        }
    };
    Ok(out)
}

fn size(v: &Value) -> Result<Value, EvalError> {
    let n = match v {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        other => return Err(no_overload("size", &[other])),
    };
    Ok(Value::Int(n as i64))
}

fn range_error(what: &str) -> EvalError {
    EvalError::runtime(format!("range error converting {what}"))
}

fn to_int(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Uint(n) => i64::try_from(*n)
            .map(Value::Int)
            .map_err(|_| range_error("uint to int")),
        Value::Double(f) => {
            // Bounds are -2^63 and 2^63; the upper one is already out of range.
            if f.is_nan() || *f < -9.223_372_036_854_775_808e18 || *f >= 9.223_372_036_854_775_808e18 {
                return Err(range_error("double to int"));
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::runtime(format!("cannot convert string '{s}' to int"))),
        other => Err(no_overload("int", &[other])),
    }
}

fn to_uint(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Uint(n) => Ok(Value::Uint(*n)),
        Value::Int(n) => u64::try_from(*n)
            .map(Value::Uint)
            .map_err(|_| range_error("int to uint")),
        Value::Double(f) => {
            if f.is_nan() || *f <= -1.0 || *f >= 1.844_674_407_370_955_161_6e19 {
                return Err(range_error("double to uint"));
            }
            Ok(Value::Uint(f.trunc() as u64))
        }
        Value::String(s) => s
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|_| EvalError::runtime(format!("cannot convert string '{s}' to uint"))),
        other => Err(no_overload("uint", &[other])),
    }
}

fn to_double(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::runtime(format!("cannot convert string '{s}' to double"))),
        other => other
            .as_f64()
            .map(Value::Double)
            .ok_or_else(|| no_overload("double", &[other])),
    }
}

fn to_string(v: &Value) -> Result<Value, EvalError> {
    let s = match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => itoa::Buffer::new().format(*n).to_string(),
        Value::Uint(n) => itoa::Buffer::new().format(*n).to_string(),
        Value::Double(f) => crate::output::double_to_string(*f),
        other => return Err(no_overload("string", &[other])),
    };
    Ok(Value::String(s))
}

fn to_bool(v: &Value) -> Result<Value, EvalError> {
    match v {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::String(s) => match s.as_str() {
            "1" | "t" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
            "0" | "f" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
            _ => Err(EvalError::runtime(format!("cannot convert string '{s}' to bool"))),
        },
        other => Err(no_overload("bool", &[other])),
    }
}
