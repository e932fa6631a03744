use std::io::{self, BufWriter, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use jcel::cancel::{self, CancellationToken};
use jcel::expr::Env;
use jcel::input::open_input;
use jcel::program::{DEFAULT_CHECK_FREQUENCY, DEFAULT_COST_LIMIT};
use jcel::{Config, Framing, Pipeline, Program, RunStats};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(
    name = "jcel",
    about = "Filter a stream of JSON objects with a boolean expression",
    version
)]
struct Cli {
    /// Predicate over each record, bound as `item` (e.g. `item.a > 1`)
    #[arg(short = 'e', long = "expr")]
    expr: String,

    /// Input file(s); defaults to stdin. `.gz` and `.zst` are decompressed
    files: Vec<String>,

    /// Maximum evaluation cost per record
    #[arg(long = "cost-limit", default_value_t = DEFAULT_COST_LIMIT)]
    cost_limit: u64,

    /// Evaluation steps between cancellation checks (0 disables)
    #[arg(long = "check-freq", default_value_t = DEFAULT_CHECK_FREQUENCY)]
    check_freq: u32,

    /// Read one JSON document per line
    #[arg(long)]
    lines: bool,

    /// Sort object keys in output
    #[arg(short = 'S', long = "sort-keys")]
    sort_keys: bool,

    /// Escape non-ASCII characters in output
    #[arg(short = 'a', long = "ascii-output")]
    ascii_output: bool,

    /// Cancel the run after this many milliseconds
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            expression: self.expr.clone(),
            cost_limit: self.cost_limit,
            check_frequency: self.check_freq,
            framing: if self.lines {
                Framing::Lines
            } else {
                Framing::Stream
            },
            sort_keys: self.sort_keys,
            ascii_output: self.ascii_output,
            timeout: self.timeout_ms.map(Duration::from_millis),
        }
    }
}

fn init_logging() {
    // stdout carries the JSON output, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("JCEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = cli.config();
    config.validate()?;

    let program = Program::build(
        &config.expression,
        &Env::standard(),
        config.cost_limit,
        config.check_frequency,
    )
    .with_context(|| format!("invalid expression: {}", config.expression))?;

    let token = match config.timeout {
        Some(timeout) => CancellationToken::with_timeout(timeout),
        None => CancellationToken::new(),
    };
    cancel::install_signal_handler(&token);

    let stdout = io::stdout().lock();
    let mut out = BufWriter::with_capacity(128 * 1024, stdout);
    let pipeline = Pipeline::new(&program, config.pipeline_options());

    let result = run_inputs(&cli.files, &pipeline, &token, &mut out);
    // Output already produced stays produced, even on error.
    let flushed = out.flush();
    match result {
        Ok(total) => {
            debug!(
                seen = total.seen,
                accepted = total.accepted,
                written = total.written,
                "done"
            );
            flushed.context("failed to flush output")?;
            Ok(())
        }
        Err(e) => {
            if e.downcast_ref::<jcel::Error>().is_some_and(jcel::Error::is_cancelled) {
                warn!("run cancelled");
            }
            Err(e)
        }
    }
}

fn run_inputs<W: Write>(
    files: &[String],
    pipeline: &Pipeline<'_>,
    token: &CancellationToken,
    out: &mut W,
) -> Result<RunStats> {
    let mut total = RunStats::default();
    let inputs: Vec<Option<&str>> = if files.is_empty() {
        vec![None]
    } else {
        files.iter().map(|f| Some(f.as_str())).collect()
    };
    for path in inputs {
        let name = path.unwrap_or("<stdin>");
        let reader = open_input(path)?;
        let stats = pipeline
            .run(token, reader, &mut *out)
            .with_context(|| format!("failed to process {name}"))?;
        debug!(input = name, seen = stats.seen, written = stats.written, "input finished");
        total.seen += stats.seen;
        total.accepted += stats.accepted;
        total.written += stats.written;
    }
    Ok(total)
}
