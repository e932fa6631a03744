/// Predicate filter stage over a record stream.
use std::iter::FusedIterator;

use tracing::trace;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::expr::Activation;
use crate::program::{ITEM, Program};
use crate::value::{Record, Value};

/// Counters for one filter stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Records pulled from upstream and evaluated.
    pub seen: u64,
    /// Records the predicate accepted.
    pub accepted: u64,
}

/// Yields the upstream records the program accepts, in order. The first
/// error (from upstream, cancellation or evaluation) is yielded once and
/// ends the stream.
pub struct Filtered<'p, I> {
    upstream: I,
    program: &'p Program,
    cancel: &'p CancellationToken,
    scratch: Activation,
    stats: FilterStats,
    done: bool,
}

impl<'p, I> Filtered<'p, I>
where
    I: Iterator<Item = Result<Record>>,
{
    pub fn new(upstream: I, program: &'p Program, cancel: &'p CancellationToken) -> Self {
        Filtered {
            upstream,
            program,
            cancel,
            scratch: Activation::new(),
            stats: FilterStats::default(),
            done: false,
        }
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    fn fail(&mut self, e: Error) -> Option<Result<Record>> {
        self.done = true;
        Some(Err(e))
    }
}

impl<I> Iterator for Filtered<'_, I>
where
    I: Iterator<Item = Result<Record>>,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let record = match self.upstream.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => return self.fail(e),
                Some(Ok(record)) => record,
            };
            if self.cancel.is_cancelled() {
                return self.fail(Error::Cancelled);
            }

            self.scratch.clear();
            self.scratch.insert(ITEM, Value::Object(record.clone()));
            self.stats.seen += 1;
            let decision = self.program.filter(self.cancel, &self.scratch);
            self.scratch.clear();
            let accepted = match decision {
                Ok(b) => b,
                Err(e) => return self.fail(e),
            };
            trace!(record = self.stats.seen, accepted, "filter decision");
            if accepted {
                self.stats.accepted += 1;
                return Some(Ok(record));
            }
        }
    }
}

impl<I> FusedIterator for Filtered<'_, I> where I: Iterator<Item = Result<Record>> {}

/// Adds `filter_with` to any record stream.
pub trait RecordStream: Iterator<Item = Result<Record>> + Sized {
    fn filter_with<'p>(
        self,
        program: &'p Program,
        cancel: &'p CancellationToken,
    ) -> Filtered<'p, Self> {
        Filtered::new(self, program, cancel)
    }
}

impl<I> RecordStream for I where I: Iterator<Item = Result<Record>> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Records;
    use crate::error::EvalError;
    use crate::expr::Env;
    use crate::program::{DEFAULT_CHECK_FREQUENCY, DEFAULT_COST_LIMIT};
    use crate::value::map_get;
    use std::io::Cursor;
    use std::sync::Arc;

    fn program(text: &str) -> Program {
        Program::build(text, &Env::standard(), DEFAULT_COST_LIMIT, DEFAULT_CHECK_FREQUENCY).unwrap()
    }

    fn input(text: &str) -> Records<Cursor<Vec<u8>>> {
        Records::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn field(r: &Result<Record>, key: &str) -> Value {
        map_get(r.as_ref().unwrap(), key).cloned().unwrap()
    }

    #[test]
    fn keeps_matching_records_in_order() {
        let p = program("item.a > 1");
        let token = CancellationToken::new();
        let mut it = input(r#"{"a":1} {"a":2} {"a":3}"#).filter_with(&p, &token);
        let out: Vec<_> = it.by_ref().collect();
        assert_eq!(out.len(), 2);
        assert_eq!(field(&out[0], "a"), Value::Int(2));
        assert_eq!(field(&out[1], "a"), Value::Int(3));
        assert_eq!(it.stats(), FilterStats { seen: 3, accepted: 2 });
    }

    #[test]
    fn yielded_record_is_not_held_by_the_stage() {
        let p = program("item.a > 1");
        let token = CancellationToken::new();
        let mut it = input(r#"{"a":1} {"a":2}"#).filter_with(&p, &token);
        let record = it.next().unwrap().unwrap();
        assert!(it.scratch.is_empty());
        assert_eq!(Arc::strong_count(&record), 1);

        let failing = program("item.missing > 1");
        let mut it = input(r#"{"a":1}"#).filter_with(&failing, &token);
        assert!(it.next().unwrap().is_err());
        assert!(it.scratch.is_empty());
    }

    #[test]
    fn tautology_and_contradiction() {
        let token = CancellationToken::new();
        let all = program("true");
        assert_eq!(input("{} {} {}").filter_with(&all, &token).count(), 3);
        let none = program("false");
        assert_eq!(input("{} {} {}").filter_with(&none, &token).count(), 0);
    }

    #[test]
    fn upstream_error_is_forwarded_and_terminal() {
        let p = program("true");
        let token = CancellationToken::new();
        let out: Vec<_> = input(r#"{"a":1} {"a" {"a":3}"#).filter_with(&p, &token).collect();
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(Error::Decode { record: 2, .. })));
    }

    #[test]
    fn evaluation_error_stops_the_stream() {
        let p = program("item.a > 1");
        let token = CancellationToken::new();
        let out: Vec<_> = input(r#"{"a":2} {"b":1} {"a":3}"#).filter_with(&p, &token).collect();
        assert_eq!(out.len(), 2);
        assert!(matches!(
            out[1],
            Err(Error::Evaluation(EvalError::Runtime(_)))
        ));
    }

    #[test]
    fn non_bool_result_is_a_type_mismatch() {
        let p = program("item.a");
        let token = CancellationToken::new();
        let out: Vec<_> = input(r#"{"a":1}"#).filter_with(&p, &token).collect();
        assert!(matches!(out[0], Err(Error::TypeMismatch { found: "int" })));
    }

    #[test]
    fn cost_limit_fails_every_record() {
        let p = Program::build("item.a > 1", &Env::standard(), 1, 1).unwrap();
        let token = CancellationToken::new();
        let out: Vec<_> = input(r#"{"a":2} {"a":3}"#).filter_with(&p, &token).collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(
            out[0],
            Err(Error::Evaluation(EvalError::CostLimitExceeded { limit: 1 }))
        ));
    }

    #[test]
    fn cancellation_after_first_record() {
        let p = program("true");
        let token = CancellationToken::new();
        let mut it = input(r#"{"a":1} {"a":2} {"a":3}"#).filter_with(&p, &token);
        assert!(it.next().unwrap().is_ok());
        token.cancel();
        let err = it.next().unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(it.next().is_none());
        assert_eq!(it.stats(), FilterStats { seen: 1, accepted: 1 });
    }

    #[test]
    fn scratch_binding_does_not_leak_between_records() {
        let p = program("has(item.x) ? item.x == 1 : true");
        let token = CancellationToken::new();
        let out: Vec<_> = input(r#"{"x":1} {"y":2} {"x":3}"#).filter_with(&p, &token).collect();
        assert_eq!(out.len(), 2);
        assert_eq!(field(&out[1], "y"), Value::Int(2));
    }
}
