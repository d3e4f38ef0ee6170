//! Property: block access errors are distinguishable
//!
//! For any default block, reading an address outside it fails with
//! `OutOfRange`, reading an unwritten address inside an uninitialized block
//! fails with `Uninitialized` at that address, and bulk reads never return
//! more bytes than remain in the block.

use marrow_program::{Address, AddressFactory, Endian, Memory, MemoryError, Provenance, SpaceId};
use proptest::prelude::*;

fn ram(offset: u64) -> Address {
    Address::new(SpaceId(0), offset)
}

fn memory() -> Memory {
    Memory::new(AddressFactory::new(32, Endian::Little), true)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Addresses just outside the block are OutOfRange; inside an
    /// uninitialized block they are Uninitialized.
    #[test]
    fn out_of_range_and_uninitialized_are_distinct(
        start in 0x1000u64..0x10_0000,
        len in 1u64..0x400,
        probe in 0u64..0x400,
    ) {
        let mut mem = memory();
        mem.create_uninitialized_block("bss", ram(start), len, Provenance::Synthetic("bss".into()))
            .unwrap();
        let block = mem.block("bss").unwrap();

        let before = ram(start - 1);
        let after = ram(start + len);
        let is_out_of_range = |r: Result<u8, MemoryError>| matches!(r, Err(MemoryError::OutOfRange { .. }));
        prop_assert!(is_out_of_range(block.get_byte(before)));
        prop_assert!(is_out_of_range(block.get_byte(after)));

        let inside = ram(start + probe % len);
        prop_assert_eq!(block.get_byte(inside), Err(MemoryError::Uninitialized { address: inside }));
    }

    /// A bulk read copies min(len, end - addr + 1) bytes.
    #[test]
    fn bulk_read_count_is_bounded_by_block_end(
        len in 1usize..0x200,
        at in 0usize..0x200,
        want in 0usize..0x300,
    ) {
        let at = at % len;
        let mut mem = memory();
        mem.create_initialized_block(
            "data",
            ram(0x4000),
            (0..len).map(|i| i as u8).collect(),
            Provenance::File { name: "a.out".into(), offset: 0 },
        )
        .unwrap();
        let block = mem.block("data").unwrap();
        let mut buf = vec![0u8; want];
        let n = block.get_bytes(ram(0x4000 + at as u64), &mut buf).unwrap();
        prop_assert_eq!(n, want.min(len - at));
        for (i, b) in buf[..n].iter().enumerate() {
            prop_assert_eq!(*b, (at + i) as u8);
        }
    }

    /// Writing bytes makes exactly those bytes readable.
    #[test]
    fn written_bytes_read_back(
        len in 1u64..0x100,
        writes in proptest::collection::vec((0u64..0x100, any::<u8>()), 1..16),
    ) {
        let mut mem = memory();
        mem.create_uninitialized_block("bss", ram(0x8000), len, Provenance::Synthetic("bss".into()))
            .unwrap();
        let mut expected = std::collections::HashMap::new();
        for (off, value) in writes {
            let off = off % len;
            mem.put_byte(ram(0x8000 + off), value).unwrap();
            expected.insert(off, value);
        }
        for off in 0..len {
            let got = mem.get_byte(ram(0x8000 + off));
            match expected.get(&off) {
                Some(v) => prop_assert_eq!(got, Ok(*v)),
                None => prop_assert_eq!(got, Err(MemoryError::Uninitialized { address: ram(0x8000 + off) })),
            }
        }
        prop_assert_eq!(mem.block("bss").unwrap().is_initialized(), expected.len() as u64 == len);
    }
}
