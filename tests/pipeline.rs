/// Library-level pipeline tests: cancellation mid-stream and order
/// properties over generated inputs.
use std::io::Cursor;

use jcel::decode::Records;
use jcel::encode::Encoder;
use jcel::expr::Env;
use jcel::filter::RecordStream;
use jcel::output::OutputConfig;
use jcel::{CancellationToken, Error, Pipeline, PipelineOptions, Program};
use proptest::prelude::*;

fn program(text: &str) -> Program {
    Program::build(text, &Env::standard(), 65_535, 1023).unwrap()
}

fn run(text: &str, input: &str) -> (Result<u64, Error>, String) {
    let p = program(text);
    let mut out = Vec::new();
    let res = Pipeline::new(&p, PipelineOptions::default())
        .run(&CancellationToken::new(), Cursor::new(input.as_bytes()), &mut out)
        .map(|stats| stats.written);
    (res, String::from_utf8(out).unwrap())
}

#[test]
fn cancel_after_first_record() {
    let p = program("true");
    let token = CancellationToken::new();
    let records = Records::new(Cursor::new(&b"{\"a\":1} {\"a\":2} {\"a\":3}"[..]))
        .enumerate()
        .map(|(i, r)| {
            if i == 1 {
                token.cancel();
            }
            r
        });
    let mut filtered = records.filter_with(&p, &token);
    let mut out = Vec::new();
    let err = Encoder::new(&mut out, OutputConfig::default())
        .write_all(&token, &mut filtered)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(out, b"{\"a\":1}\n");
    assert_eq!(filtered.stats().seen, 1);
}

#[test]
fn cancellation_during_evaluation() {
    // Polls every step, so a token cancelled before the run is seen
    // inside the first evaluation at the latest.
    let p = Program::build("[1, 2, 3].all(x, x > 0)", &Env::standard(), 65_535, 1).unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let mut out = Vec::new();
    let err = Pipeline::new(&p, PipelineOptions::default())
        .run(&token, Cursor::new(&b"{}"[..]), &mut out)
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(out.is_empty());
}

#[test]
fn program_reused_across_runs() {
    let p = program("item.k == 'x'");
    let pipeline = Pipeline::new(&p, PipelineOptions::default());
    for _ in 0..3 {
        let mut out = Vec::new();
        let stats = pipeline
            .run(
                &CancellationToken::new(),
                Cursor::new(&b"{\"k\":\"x\"} {\"k\":\"y\"}"[..]),
                &mut out,
            )
            .unwrap();
        assert_eq!(stats.seen, 2);
        assert_eq!(out, b"{\"k\":\"x\"}\n");
    }
}

fn render(records: &[(i64, String)]) -> Vec<String> {
    records
        .iter()
        .map(|(n, s)| format!("{{\"n\":{n},\"s\":\"{s}\"}}"))
        .collect()
}

fn arb_records() -> impl Strategy<Value = Vec<(i64, String)>> {
    prop::collection::vec((-1000i64..1000, "[a-z]{0,6}"), 0..40)
}

proptest! {
    #[test]
    fn tautology_is_identity(records in arb_records()) {
        let lines = render(&records);
        let (res, out) = run("true", &lines.join(" "));
        prop_assert_eq!(res.unwrap(), records.len() as u64);
        let expected: String = lines.iter().map(|l| format!("{l}\n")).collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn contradiction_is_empty(records in arb_records()) {
        let (res, out) = run("false", &render(&records).join("\n"));
        prop_assert_eq!(res.unwrap(), 0);
        prop_assert!(out.is_empty());
    }

    #[test]
    fn output_is_ordered_subsequence(records in arb_records(), k in -1000i64..1000) {
        let lines = render(&records);
        let (res, out) = run(&format!("item.n > {k} || item.s.startsWith('a')"), &lines.join("\n"));
        let expected: Vec<&String> = records
            .iter()
            .zip(&lines)
            .filter(|((n, s), _)| *n > k || s.starts_with('a'))
            .map(|(_, l)| l)
            .collect();
        prop_assert_eq!(res.unwrap(), expected.len() as u64);
        let got: Vec<&str> = out.lines().collect();
        prop_assert_eq!(got, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    }
}
