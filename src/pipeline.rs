/// Decode, filter and encode wired together for one input.
use std::io::{BufRead, Write};

use tracing::debug;

use crate::cancel::CancellationToken;
use crate::config::Framing;
use crate::decode::{LineRecords, Records};
use crate::encode::Encoder;
use crate::error::Result;
use crate::filter::RecordStream;
use crate::output::OutputConfig;
use crate::program::Program;
use crate::value::Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineOptions {
    pub framing: Framing,
    pub output: OutputConfig,
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub seen: u64,
    pub accepted: u64,
    pub written: u64,
}

pub struct Pipeline<'p> {
    program: &'p Program,
    options: PipelineOptions,
}

impl<'p> Pipeline<'p> {
    pub fn new(program: &'p Program, options: PipelineOptions) -> Self {
        Pipeline { program, options }
    }

    /// Stream every accepted record of `reader` to `writer`.
    ///
    /// Records written before an error stay written; the writer is flushed
    /// only when the input is exhausted cleanly.
    pub fn run<R, W>(&self, cancel: &CancellationToken, reader: R, writer: W) -> Result<RunStats>
    where
        R: BufRead,
        W: Write,
    {
        match self.options.framing {
            Framing::Stream => self.drive(cancel, Records::new(reader), writer),
            Framing::Lines => self.drive(cancel, LineRecords::new(reader), writer),
        }
    }

    fn drive<I, W>(&self, cancel: &CancellationToken, records: I, writer: W) -> Result<RunStats>
    where
        I: Iterator<Item = Result<Record>>,
        W: Write,
    {
        let mut filtered = records.filter_with(self.program, cancel);
        let mut encoder = Encoder::new(writer, self.options.output);
        let written = encoder.write_all(cancel, &mut filtered);
        let filter = filtered.stats();
        debug!(
            framing = ?self.options.framing,
            seen = filter.seen,
            accepted = filter.accepted,
            ok = written.is_ok(),
            "pipeline run finished"
        );
        Ok(RunStats {
            seen: filter.seen,
            accepted: filter.accepted,
            written: written?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::Env;
    use std::io::Cursor;

    fn program(text: &str) -> Program {
        Program::build(text, &Env::standard(), 65_535, 1023).unwrap()
    }

    fn run(text: &str, input: &str, options: PipelineOptions) -> (Result<RunStats>, String) {
        let p = program(text);
        let mut out = Vec::new();
        let res = Pipeline::new(&p, options).run(
            &CancellationToken::new(),
            Cursor::new(input.as_bytes()),
            &mut out,
        );
        (res, String::from_utf8(out).unwrap())
    }

    #[test]
    fn filters_stream_input() {
        let (res, out) = run(
            "item.a > 1",
            "{\"a\":1}\n{\"a\":2}\n{\"a\":3}\n",
            PipelineOptions::default(),
        );
        assert_eq!(out, "{\"a\":2}\n{\"a\":3}\n");
        assert_eq!(
            res.unwrap(),
            RunStats {
                seen: 3,
                accepted: 2,
                written: 2
            }
        );
    }

    #[test]
    fn filters_line_input() {
        let options = PipelineOptions {
            framing: Framing::Lines,
            ..Default::default()
        };
        let (res, out) = run("item.ok", "{\"ok\":true}\n\n{\"ok\":false}\n", options);
        assert_eq!(out, "{\"ok\":true}\n");
        assert_eq!(res.unwrap().written, 1);
    }

    #[test]
    fn malformed_record_keeps_earlier_output() {
        let (res, out) = run("true", "{\"a\":1} {\"a\":2} {oops} {\"a\":4}", PipelineOptions::default());
        assert_eq!(out, "{\"a\":1}\n{\"a\":2}\n");
        assert!(matches!(res, Err(Error::Decode { record: 3, .. })));
    }

    #[test]
    fn output_options_apply() {
        let options = PipelineOptions {
            output: OutputConfig {
                sort_keys: true,
                ascii_output: true,
            },
            ..Default::default()
        };
        let (_, out) = run("true", "{\"z\":\"é\",\"a\":0}", options);
        assert_eq!(out, "{\"a\":0,\"z\":\"\\u00e9\"}\n");
    }
}
