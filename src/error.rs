//! Error types for every pipeline stage.

use std::io;

use thiserror::Error;

/// Failure to turn expression text into a checked program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("expression is empty")]
    Empty,

    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("check error: {0}")]
    Check(String),
}

/// Failure while evaluating a compiled program against one binding.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("operation cancelled: actual cost limit exceeded (limit {limit})")]
    CostLimitExceeded { limit: u64 },

    #[error("operation cancelled: evaluation interrupted")]
    Cancelled,

    #[error("{0}")]
    Runtime(String),
}

impl EvalError {
    pub(crate) fn runtime(msg: impl Into<String>) -> Self {
        EvalError::Runtime(msg.into())
    }
}

/// Top-level error surfaced by the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to compile expression: {0}")]
    Compile(#[from] CompileError),

    #[error("failed to decode record {record}: {message}")]
    Decode { record: u64, message: String },

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("not bool type: predicate returned {found}")]
    TypeMismatch { found: &'static str },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to write output: {0}")]
    Write(#[source] io::Error),
}

impl Error {
    /// True for both the between-record and the in-evaluation cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Cancelled | Error::Evaluation(EvalError::Cancelled)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
