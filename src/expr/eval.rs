/// Cost-metered evaluator for predicate expressions.
///
/// Every evaluated node charges the meter; literals are free. Exceeding the
/// cost limit aborts the evaluation, and every `check_frequency` charged
/// steps the meter polls the cancellation token.
use std::sync::Arc;

use super::builtins::{self, RegexCache};
use super::value_ops::{
    arith_values, compare_values, concat_cost, contains, contains_cost, equality_cost, negate,
};
use super::{BoolOp, CmpOp, Comprehension, ComprehensionKind, Expr};
use crate::cancel::CancellationToken;
use crate::error::EvalError;
use crate::value::{Map, Value, map_get, map_insert};

/// Variable bindings for one evaluation.
///
/// Meant to be reused: clear it and insert fresh values per evaluation
/// rather than allocating a new one.
#[derive(Debug, Clone, Default)]
pub struct Activation {
    vars: Vec<(String, Value)>,
}

impl Activation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        match self.vars.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.vars.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Drop all values, keeping the allocation.
    pub fn clear(&mut self) {
        self.vars.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Cost accounting reported alongside a successful evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EvalDetails {
    pub actual_cost: u64,
}

/// Limits under which one evaluation runs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub cost_limit: u64,
    /// Steps between cancellation polls; zero disables polling.
    pub check_frequency: u32,
}

struct Meter<'c> {
    cost: u64,
    steps: u64,
    limits: Limits,
    cancel: &'c CancellationToken,
}

impl Meter<'_> {
    #[inline]
    fn charge(&mut self, units: u64) -> Result<(), EvalError> {
        self.cost = self.cost.saturating_add(units);
        if self.cost > self.limits.cost_limit {
            return Err(EvalError::CostLimitExceeded {
                limit: self.limits.cost_limit,
            });
        }
        self.steps += 1;
        let freq = u64::from(self.limits.check_frequency);
        if freq > 0 && self.steps % freq == 0 && self.cancel.is_cancelled() {
            return Err(EvalError::Cancelled);
        }
        Ok(())
    }

    /// Units left before the limit trips, plus one so a caller sizing work
    /// against it can still exceed the limit.
    fn headroom(&self) -> u64 {
        self.limits.cost_limit.saturating_sub(self.cost).saturating_add(1)
    }
}

/// Errors that end the evaluation outright instead of being absorbed by
/// `&&`/`||` or the quantifier macros.
fn is_abort(e: &EvalError) -> bool {
    matches!(e, EvalError::CostLimitExceeded { .. } | EvalError::Cancelled)
}

struct Evaluator<'a> {
    activation: &'a Activation,
    regexes: &'a RegexCache,
    /// Comprehension variables, innermost last.
    locals: Vec<(&'a str, Value)>,
    meter: Meter<'a>,
}

/// Evaluate `expr` against `activation` within `limits`.
pub(crate) fn evaluate(
    expr: &Expr,
    activation: &Activation,
    regexes: &RegexCache,
    limits: Limits,
    cancel: &CancellationToken,
) -> Result<(Value, EvalDetails), EvalError> {
    if cancel.is_cancelled() {
        return Err(EvalError::Cancelled);
    }
    let mut ev = Evaluator {
        activation,
        regexes,
        locals: Vec::new(),
        meter: Meter {
            cost: 0,
            steps: 0,
            limits,
            cancel,
        },
    };
    let value = ev.eval(expr)?;
    Ok((
        value,
        EvalDetails {
            actual_cost: ev.meter.cost,
        },
    ))
}

fn expect_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::runtime(format!(
            "no such overload: expected bool, got {}",
            other.type_name()
        ))),
    }
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, expr: &'a Expr) -> Result<Value, EvalError> {
        if !matches!(expr, Expr::Literal(_)) {
            self.meter.charge(1)?;
        }
        match expr {
            Expr::Literal(v) => Ok(v.clone()),

            Expr::Ident(name) => self.lookup(name),

            Expr::Select(operand, field) => {
                let target = self.eval(operand)?;
                match &target {
                    Value::Object(obj) => map_get(obj, field)
                        .cloned()
                        .ok_or_else(|| EvalError::runtime(format!("no such key: {field}"))),
                    other => Err(EvalError::runtime(format!(
                        "type '{}' does not support field selection",
                        other.type_name()
                    ))),
                }
            }

            Expr::Has(operand, field) => {
                let target = self.eval(operand)?;
                match &target {
                    Value::Object(obj) => Ok(Value::Bool(map_get(obj, field).is_some())),
                    other => Err(EvalError::runtime(format!(
                        "invalid type for field selection: {}",
                        other.type_name()
                    ))),
                }
            }

            Expr::Index(operand, index) => {
                let target = self.eval(operand)?;
                let idx = self.eval(index)?;
                index_value(&target, &idx)
            }

            Expr::Call {
                target,
                function,
                args,
            } => {
                let target = match target {
                    Some(t) => Some(self.eval(t)?),
                    None => None,
                };
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval(a)?);
                }
                self.meter
                    .charge(builtins::scan_cost(function, target.as_ref(), &values))?;
                builtins::call(function, target, values, self.regexes)
            }

            Expr::Not(inner) => {
                let v = self.eval(inner)?;
                Ok(Value::Bool(!expect_bool(v)?))
            }

            Expr::Neg(inner) => {
                let v = self.eval(inner)?;
                negate(&v)
            }

            Expr::Compare(left, op, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                if matches!(op, CmpOp::Eq | CmpOp::Ne) {
                    self.meter.charge(equality_cost(&l, &r, self.meter.headroom()))?;
                }
                compare_values(&l, *op, &r).map(Value::Bool)
            }

            Expr::In(elem, container) => {
                let e = self.eval(elem)?;
                let c = self.eval(container)?;
                self.meter.charge(contains_cost(&e, &c, self.meter.headroom()))?;
                contains(&e, &c).map(Value::Bool)
            }

            Expr::Arith(left, op, right) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                self.meter.charge(concat_cost(&l, *op, &r))?;
                arith_values(&l, *op, &r)
            }

            Expr::BoolOp(left, op, right) => self.eval_logic(left, *op, right),

            Expr::Conditional(cond, then_branch, else_branch) => {
                let c = self.eval(cond)?;
                if expect_bool(c)? {
                    self.eval(then_branch)
                } else {
                    self.eval(else_branch)
                }
            }

            Expr::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(item)?);
                }
                Ok(Value::Array(Arc::new(out)))
            }

            Expr::Map(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = match self.eval(k)? {
                        Value::String(s) => s,
                        other => {
                            return Err(EvalError::runtime(format!(
                                "unsupported map key type: {}",
                                other.type_name()
                            )));
                        }
                    };
                    if map_get(&out, &key).is_some() {
                        return Err(EvalError::runtime(format!(
                            "duplicate map key: {key}"
                        )));
                    }
                    let value = self.eval(v)?;
                    map_insert(&mut out, key, value);
                }
                Ok(Value::Object(Arc::new(out)))
            }

            Expr::Comprehension(c) => self.eval_comprehension(c),
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, EvalError> {
        if let Some((_, v)) = self.locals.iter().rev().find(|(n, _)| *n == name) {
            return Ok(v.clone());
        }
        self.activation
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::runtime(format!("no such attribute: {name}")))
    }

    /// `&&`/`||` with error absorption: a decisive operand on either side
    /// wins over an error on the other side.
    fn eval_logic(&mut self, left: &'a Expr, op: BoolOp, right: &'a Expr) -> Result<Value, EvalError> {
        let decisive = op == BoolOp::Or;
        let l = self.eval(left).and_then(expect_bool);
        match &l {
            Ok(b) if *b == decisive => return Ok(Value::Bool(decisive)),
            Err(e) if is_abort(e) => return l.map(Value::Bool),
            _ => {}
        }
        let r = self.eval(right).and_then(expect_bool);
        match (l, r) {
            (_, Ok(b)) if b == decisive => Ok(Value::Bool(decisive)),
            (_, Err(e)) if is_abort(&e) => Err(e),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(_), Ok(_)) => Ok(Value::Bool(!decisive)),
        }
    }

    fn eval_comprehension(&mut self, c: &'a Comprehension) -> Result<Value, EvalError> {
        let range = self.eval(&c.range)?;
        let elems: Vec<Value> = match &range {
            Value::Array(items) => items.iter().cloned().collect(),
            Value::Object(map) => map.iter().map(|(k, _)| Value::String(k.clone())).collect(),
            other => {
                return Err(EvalError::runtime(format!(
                    "expression of type '{}' cannot be the range of a comprehension",
                    other.type_name()
                )));
            }
        };

        let mut deferred: Option<EvalError> = None;
        let mut matched = 0usize;
        let mut mapped = Vec::new();

        for elem in elems {
            self.meter.charge(1)?;
            self.locals.push((c.var.as_str(), elem));
            let step = self.comprehension_step(c);
            let Some((_, elem)) = self.locals.pop() else {
                return Err(EvalError::runtime("comprehension scope underflow"));
            };
            match c.kind {
                ComprehensionKind::All | ComprehensionKind::Exists => {
                    let decisive = c.kind == ComprehensionKind::Exists;
                    match step {
                        Ok(Some(b)) if b == decisive => return Ok(Value::Bool(decisive)),
                        Ok(_) => {}
                        Err(e) if is_abort(&e) => return Err(e),
                        Err(e) => {
                            deferred.get_or_insert(e);
                        }
                    }
                }
                ComprehensionKind::ExistsOne => {
                    if step? == Some(true) {
                        matched += 1;
                    }
                }
                ComprehensionKind::Filter => {
                    if step? == Some(true) {
                        mapped.push(elem);
                    }
                }
                ComprehensionKind::Map => {
                    if step? != Some(false) {
                        let Some(transform) = &c.transform else {
                            return Err(EvalError::runtime("map requires a transform"));
                        };
                        self.locals.push((c.var.as_str(), elem));
                        let out = self.eval(transform);
                        self.locals.pop();
                        mapped.push(out?);
                    }
                }
            }
        }

        match c.kind {
            ComprehensionKind::All | ComprehensionKind::Exists => match deferred {
                Some(e) => Err(e),
                None => Ok(Value::Bool(c.kind == ComprehensionKind::All)),
            },
            ComprehensionKind::ExistsOne => Ok(Value::Bool(matched == 1)),
            ComprehensionKind::Map | ComprehensionKind::Filter => Ok(Value::Array(Arc::new(mapped))),
        }
    }

    /// Evaluate the predicate for the element currently bound. `None` when
    /// the comprehension has no predicate (plain `map`).
    fn comprehension_step(&mut self, c: &'a Comprehension) -> Result<Option<bool>, EvalError> {
        match &c.predicate {
            Some(p) => {
                let v = self.eval(p)?;
                expect_bool(v).map(Some)
            }
            None => Ok(None),
        }
    }
}

fn index_value(target: &Value, idx: &Value) -> Result<Value, EvalError> {
    match (target, idx) {
        (Value::Array(items), Value::Int(_) | Value::Uint(_) | Value::Double(_)) => {
            let i = match idx {
                Value::Int(n) => usize::try_from(*n).ok(),
                Value::Uint(n) => usize::try_from(*n).ok(),
                Value::Double(f) if f.fract() == 0.0 && *f >= 0.0 => Some(*f as usize),
                _ => {
                    return Err(EvalError::runtime("unsupported index value"));
                }
            };
            i.and_then(|i| items.get(i)).cloned().ok_or_else(|| {
                EvalError::runtime(format!(
                    "index out of range: index {}, size {}",
                    crate::output::format_compact(idx),
                    items.len()
                ))
            })
        }
        (Value::Object(map), Value::String(key)) => map_get(map, key)
            .cloned()
            .ok_or_else(|| EvalError::runtime(format!("no such key: {key}"))),
        // object keys are always strings
        (Value::Object(_), other) => {
            Err(EvalError::runtime(format!(
                "no such key: {}",
                crate::output::format_compact(other)
            )))
        }
        _ => Err(EvalError::runtime(format!(
            "no such overload: {}[{}]",
            target.type_name(),
            idx.type_name()
        ))),
    }
}
