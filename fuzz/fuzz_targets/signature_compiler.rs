#![no_main]

use arbitrary::Arbitrary;
use formatid_core::MemoryResource;
use formatid_signatures::{
    compile_with, serialize, Anchor, ByteSource, CompileOptions, CompileStrategy, ScanLimits,
};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzedSignature {
    expression: String,
    anchor: u8,
    droid: bool,
    max_bytes_to_scan: Option<u16>,
    data: Vec<u8>,
}

fuzz_target!(|input: FuzzedSignature| {
    let anchor = match input.anchor % 3 {
        0 => Anchor::Bof,
        1 => Anchor::Eof,
        _ => Anchor::Variable,
    };
    let strategy = if input.droid {
        CompileStrategy::Droid
    } else {
        CompileStrategy::Pronom
    };
    let options = CompileOptions::default()
        .with_strategy(strategy)
        .with_max_alternatives(64);

    let Ok(sequence) = compile_with(&input.expression, anchor, &options) else {
        return;
    };

    // Rendering must produce an expression that compiles to the same thing
    let text = serialize(&sequence);
    let again = compile_with(&text, anchor, &options);
    assert_eq!(again.as_ref(), Ok(&sequence), "{:?} rendered as {:?}", input.expression, text);

    let resource = MemoryResource::new(input.data);
    let source = ByteSource::new(&resource);
    let limits = ScanLimits::unlimited().with_max_bytes_to_scan(input.max_bytes_to_scan.map(u64::from));
    let _ = sequence.matches(&source, &limits);
});
