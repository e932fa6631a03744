#![no_main]
use libfuzzer_sys::fuzz_target;

// Feed arbitrary UTF-8 strings to the expression compiler.
// Catches panics in lexer/parser/checker and stack overflows on deeply
// nested or very long expressions.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = jcel::expr::compile(s, &jcel::expr::Env::standard());
    }
});
