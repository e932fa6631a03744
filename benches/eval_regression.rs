//! iai-callgrind regression benchmarks for the predicate hot path.
//!
//! Instruction counts (via Valgrind) rather than wall-clock time, so the
//! numbers are deterministic on CI.
//!
//! Run locally (requires valgrind):
//!   cargo bench --bench eval_regression

use iai_callgrind::{library_benchmark, library_benchmark_group, main};
use std::hint::black_box;
use std::io::Cursor;

use jcel::expr::{Activation, Env};
use jcel::program::{ITEM, Program};
use jcel::value::Value;
use jcel::{CancellationToken, Pipeline, PipelineOptions};

/// Small but representative record: nested objects, arrays, strings,
/// numbers, booleans and null.
const FIXTURE: &str = r#"{
  "id": 42,
  "name": "Alice",
  "active": true,
  "score": 98.6,
  "address": {"city": "Portland", "state": "OR", "zip": "97201"},
  "tags": ["admin", "user", "beta"],
  "items": [
    {"sku": "A1", "price": 10, "qty": 2},
    {"sku": "B2", "price": 25, "qty": 1},
    {"sku": "C3", "price": 5, "qty": 10},
    {"sku": "D4", "price": 50, "qty": 3},
    {"sku": "E5", "price": 15, "qty": 7}
  ],
  "metadata": null
}"#;

fn program(expr: &str) -> Program {
    Program::build(expr, &Env::standard(), 65_535, 1023).unwrap()
}

fn bound_fixture() -> Activation {
    let mut act = Activation::new();
    let value: Value = serde_json::from_str(FIXTURE).unwrap();
    act.insert(ITEM, value);
    act
}

fn filter(p: &Program, act: &Activation) -> bool {
    p.filter(&CancellationToken::new(), act).unwrap()
}

#[library_benchmark]
fn build_complex() -> Program {
    black_box(program(
        "item.active && item.items.exists(i, i.price * i.qty > 100) && item.name.startsWith('A')",
    ))
}

#[library_benchmark]
#[bench::field(program("item.id == 42"))]
#[bench::nested(program("item.address.city == 'Portland' && item.address.state in ['OR', 'WA']"))]
#[bench::exists(program("item.items.exists(i, i.sku == 'E5')"))]
#[bench::all(program("item.items.all(i, i.price > 1 && i.qty > 0)"))]
#[bench::regex(program("item.name.matches('^[A-Z][a-z]+$')"))]
fn eval_predicate(p: Program) -> bool {
    let act = bound_fixture();
    black_box(filter(&p, &act))
}

#[library_benchmark]
fn pipeline_ndjson() -> u64 {
    let line: String = FIXTURE.split_whitespace().collect();
    let input = format!("{line}\n").repeat(50);
    let p = program("item.score > 50.0 && size(item.tags) == 3");
    let mut out = Vec::new();
    let stats = Pipeline::new(&p, PipelineOptions::default())
        .run(&CancellationToken::new(), Cursor::new(input.as_bytes()), &mut out)
        .unwrap();
    black_box(stats.written)
}

library_benchmark_group!(
    name = build_group;
    benchmarks = build_complex
);

library_benchmark_group!(
    name = eval_group;
    benchmarks = eval_predicate, pipeline_ndjson
);

main!(library_benchmark_groups = build_group, eval_group);
