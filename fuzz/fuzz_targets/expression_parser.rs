#![no_main]

use libfuzzer_sys::fuzz_target;
use formatid_signatures::parse;

fuzz_target!(|data: &[u8]| {
    // Expressions are text
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = parse(text);
});
