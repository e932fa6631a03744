/// Validated run settings.
use std::time::Duration;

use crate::error::{Error, Result};
use crate::output::OutputConfig;
use crate::pipeline::PipelineOptions;
use crate::program::{DEFAULT_CHECK_FREQUENCY, DEFAULT_COST_LIMIT};

/// How documents are delimited in the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Concatenated JSON values separated by optional whitespace.
    #[default]
    Stream,
    /// One JSON document per line (`--lines`).
    Lines,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub expression: String,
    pub cost_limit: u64,
    pub check_frequency: u32,
    pub framing: Framing,
    pub sort_keys: bool,
    pub ascii_output: bool,
    /// Wall-clock budget for the whole run.
    pub timeout: Option<Duration>,
}

impl Config {
    pub fn new(expression: impl Into<String>) -> Self {
        Config {
            expression: expression.into(),
            cost_limit: DEFAULT_COST_LIMIT,
            check_frequency: DEFAULT_CHECK_FREQUENCY,
            framing: Framing::Stream,
            sort_keys: false,
            ascii_output: false,
            timeout: None,
        }
    }

    /// Reject settings no run could use. Must pass before any input is read.
    pub fn validate(&self) -> Result<()> {
        if self.expression.trim().is_empty() {
            return Err(Error::Config("empty expression".into()));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            framing: self.framing,
            output: OutputConfig {
                sort_keys: self.sort_keys,
                ascii_output: self.ascii_output,
            },
        }
    }
}
