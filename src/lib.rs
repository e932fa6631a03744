pub mod cancel;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod expr;
pub mod filter;
pub mod input;
pub mod output;
pub mod pipeline;
pub mod program;
pub mod value;

pub use cancel::CancellationToken;
pub use config::{Config, Framing};
pub use error::{CompileError, Error, EvalError, Result};
pub use pipeline::{Pipeline, PipelineOptions, RunStats};
pub use program::Program;
pub use value::{Record, Value};
