//! Property-based tests for archive enumeration.
//!
//! Every enumerator must survive arbitrary and damaged input: it either
//! lists entries or reports a non-fatal error, and never panics.

use proptest::prelude::*;
use std::ops::ControlFlow;

use formatid_archive::{enumerate, ContainerKind};
use formatid_core::{MemoryResource, Resource};

const KINDS: &[ContainerKind] = &[
    ContainerKind::Zip,
    ContainerKind::Tar,
    ContainerKind::Gzip,
    ContainerKind::Rar,
    ContainerKind::Iso,
];

/// Magic bytes that get an enumerator past its first check.
fn arb_prefixed() -> impl Strategy<Value = Vec<u8>> {
    let magic = prop_oneof![
        Just(b"PK\x03\x04".to_vec()),
        Just(vec![0x1F, 0x8B, 0x08, 0x00]),
        Just(b"Rar!\x1a\x07\x00".to_vec()),
        Just(b"Rar!\x1a\x07\x01\x00".to_vec()),
    ];
    (magic, prop::collection::vec(any::<u8>(), 0..512)).prop_map(|(mut m, rest)| {
        m.extend(rest);
        m
    })
}

fn walk(kind: ContainerKind, data: Vec<u8>) -> Result<usize, formatid_archive::ArchiveError> {
    let archive = MemoryResource::new(data);
    let mut count = 0;
    enumerate(kind, &archive, "fuzz", &mut |entry| {
        count += 1;
        if let Some(res) = entry.load(1 << 16)? {
            let _ = res.read_range(0, 64)?;
        }
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(count)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Arbitrary bytes never panic and never produce an I/O error.
    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..2048)) {
        for kind in KINDS {
            if let Err(e) = walk(*kind, data.clone()) {
                prop_assert!(!e.is_fatal(), "{:?}: {}", kind, e);
            }
        }
    }

    /// Inputs with a valid magic never panic either.
    #[test]
    fn prefixed_bytes_never_panic(data in arb_prefixed()) {
        for kind in KINDS {
            if let Err(e) = walk(*kind, data.clone()) {
                prop_assert!(!e.is_fatal(), "{:?}: {}", kind, e);
            }
        }
    }
}
