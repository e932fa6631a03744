#![no_main]
use libfuzzer_sys::fuzz_target;
use jcel::expr::{Activation, Env};
use jcel::program::{ITEM, Program};
use jcel::{CancellationToken, EvalError, Value};

// Structured fuzzer: split input into JSON + expression, compile both,
// evaluate under a small cost limit. Catches panics in builtins, arithmetic
// and comprehensions, and checks the reported cost never exceeds the limit.
const LIMIT: u64 = 10_000;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // First 2 bytes determine split point between JSON and expression.
    let split = u16::from_le_bytes([data[0], data[1]]) as usize;
    let rest = &data[2..];
    let split = split % rest.len();

    let Ok(expr) = std::str::from_utf8(&rest[split..]) else {
        return;
    };
    let Ok(program) = Program::build(expr, &Env::standard(), LIMIT, 64) else {
        return;
    };
    let Ok(value) = serde_json::from_slice::<Value>(&rest[..split]) else {
        return;
    };

    let mut act = Activation::new();
    act.insert(ITEM, value);
    match program.evaluate_with_details(&CancellationToken::new(), &act) {
        Ok((_, details)) => assert!(details.actual_cost <= LIMIT),
        Err(EvalError::CostLimitExceeded { limit }) => assert_eq!(limit, LIMIT),
        Err(_) => {}
    }
});
