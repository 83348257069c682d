#![no_main]

use formatid_archive::{enumerate, ContainerKind};
use formatid_core::{MemoryResource, Resource};
use libfuzzer_sys::fuzz_target;
use std::ops::ControlFlow;

const KINDS: [ContainerKind; 5] = [
    ContainerKind::Zip,
    ContainerKind::Tar,
    ContainerKind::Gzip,
    ContainerKind::Rar,
    ContainerKind::Iso,
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let kind = KINDS[selector as usize % KINDS.len()];
    let archive = MemoryResource::new(rest.to_vec());

    let result = enumerate(kind, &archive, "fuzz", &mut |entry| {
        if let Some(content) = entry.load(1 << 20)? {
            let _ = content.read_range(0, 256)?;
        }
        Ok(ControlFlow::Continue(()))
    });
    // A memory resource never fails, so errors must be corruption
    if let Err(err) = result {
        assert!(!err.is_fatal(), "{:?}: {}", kind, err);
    }
});
