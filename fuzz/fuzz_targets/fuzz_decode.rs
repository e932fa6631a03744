#![no_main]
use libfuzzer_sys::fuzz_target;
use jcel::decode::{LineRecords, Records};

// Feed arbitrary bytes to both record decoders. Each must end after at
// most one error.
fuzz_target!(|data: &[u8]| {
    for framing in 0..2 {
        let items: Vec<_> = if framing == 0 {
            Records::new(data).collect()
        } else {
            LineRecords::new(data).collect()
        };
        let errors = items.iter().filter(|r| r.is_err()).count();
        assert!(errors <= 1);
        if errors == 1 {
            assert!(items.last().is_some_and(|r| r.is_err()));
        }
    }
});
