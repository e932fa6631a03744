//! Compiled predicate programs.

use tracing::{debug, trace, warn};

use crate::cancel::CancellationToken;
use crate::error::{CompileError, Error, EvalError, Result};
use crate::expr::eval::{self, Limits};
use crate::expr::{self, Activation, Checked, Env, EvalDetails, RegexCache, Type};
use crate::value::Value;

/// Name of the variable each record is bound to.
pub const ITEM: &str = "item";

/// Default upper bound on evaluation cost.
pub const DEFAULT_COST_LIMIT: u64 = 65_535;

/// Default number of evaluation steps between cancellation polls.
pub const DEFAULT_CHECK_FREQUENCY: u32 = 1023;

/// An immutable, checked predicate plus the limits it runs under.
///
/// Shareable across threads; per-evaluation state lives in the
/// `Activation` the caller passes in.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    checked: Checked,
    regexes: RegexCache,
    limits: Limits,
}

impl Program {
    /// Compile `text` against `env` and wrap it with the given limits.
    pub fn build(
        text: &str,
        env: &Env,
        cost_limit: u64,
        check_frequency: u32,
    ) -> std::result::Result<Self, CompileError> {
        let checked = expr::compile(text, env)?;
        Ok(Self::from_checked(text, checked, cost_limit, check_frequency))
    }

    /// Wrap an already-checked expression.
    pub fn from_checked(text: &str, checked: Checked, cost_limit: u64, check_frequency: u32) -> Self {
        let regexes = RegexCache::from_expr(checked.expr());
        if !checked.result_type().admits(Type::Bool) {
            warn!(
                result_type = %checked.result_type(),
                "expression does not produce a bool; every record will fail"
            );
        }
        debug!(
            expression = text,
            result_type = %checked.result_type(),
            cost_limit,
            check_frequency,
            precompiled_regexes = regexes.len(),
            "built predicate program"
        );
        Program {
            source: text.to_string(),
            checked,
            regexes,
            limits: Limits {
                cost_limit,
                check_frequency,
            },
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn result_type(&self) -> Type {
        self.checked.result_type()
    }

    pub fn cost_limit(&self) -> u64 {
        self.limits.cost_limit
    }

    pub fn check_frequency(&self) -> u32 {
        self.limits.check_frequency
    }

    pub fn evaluate(
        &self,
        cancel: &CancellationToken,
        activation: &Activation,
    ) -> std::result::Result<Value, EvalError> {
        self.evaluate_with_details(cancel, activation).map(|(v, _)| v)
    }

    /// Evaluate and report the cost actually spent.
    pub fn evaluate_with_details(
        &self,
        cancel: &CancellationToken,
        activation: &Activation,
    ) -> std::result::Result<(Value, EvalDetails), EvalError> {
        eval::evaluate(
            self.checked.expr(),
            activation,
            &self.regexes,
            self.limits,
            cancel,
        )
    }

    /// Evaluate as a predicate. Anything other than a bool is an error.
    pub fn filter(&self, cancel: &CancellationToken, activation: &Activation) -> Result<bool> {
        let (value, details) = self.evaluate_with_details(cancel, activation)?;
        trace!(cost = details.actual_cost, "evaluated predicate");
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(Error::TypeMismatch {
                found: other.type_name(),
            }),
        }
    }
}
