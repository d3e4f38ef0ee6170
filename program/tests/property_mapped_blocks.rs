//! Property: mapped blocks are never initialized
//!
//! Bit- and byte-mapped blocks report `is_initialized() == false` no matter
//! how completely their source is populated, while still reading through to
//! the source bytes.

use marrow_program::{
    Address, AddressFactory, ByteMappingScheme, Endian, Memory, MemoryBlockType, Provenance, SpaceId,
};
use proptest::prelude::*;

fn ram(offset: u64) -> Address {
    Address::new(SpaceId(0), offset)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    /// Byte-mapped views read source bytes at scheme offsets.
    #[test]
    fn byte_mapped_views_source(
        source in proptest::collection::vec(any::<u8>(), 1..0x100),
        mapped in 1u8..8,
        extra in 0u8..8,
    ) {
        let scheme = ByteMappingScheme::new(mapped, mapped + extra).unwrap();
        let mut mem = Memory::new(AddressFactory::new(32, Endian::Little), true);
        mem.create_initialized_block(
            "src",
            ram(0x1000),
            source.clone(),
            Provenance::File { name: "a.out".into(), offset: 0 },
        )
        .unwrap();
        let view_len = 1 + (source.len() as u64 - 1) / u64::from(mapped + extra) * u64::from(mapped);
        mem.create_byte_mapped_block("view", ram(0x10_0000), ram(0x1000), view_len, scheme)
            .unwrap();

        let view = mem.block("view").unwrap();
        prop_assert_eq!(view.block_type(), MemoryBlockType::ByteMapped);
        prop_assert!(!view.is_initialized());
        prop_assert!(view.data().is_none());
        for i in 0..view_len {
            let src = scheme.source_offset(i).unwrap() as usize;
            prop_assert_eq!(view.get_byte(ram(0x10_0000 + i)), Ok(source[src]));
        }
    }

    /// Bit-mapped views expose each source bit as a 0/1 byte.
    #[test]
    fn bit_mapped_views_source_bits(source in proptest::collection::vec(any::<u8>(), 1..16)) {
        let mut mem = Memory::new(AddressFactory::new(32, Endian::Little), true);
        mem.create_initialized_block(
            "src",
            ram(0x1000),
            source.clone(),
            Provenance::File { name: "a.out".into(), offset: 0 },
        )
        .unwrap();
        let bits = source.len() as u64 * 8;
        mem.create_bit_mapped_block("bits", ram(0x20_0000), ram(0x1000), bits).unwrap();

        let view = mem.block("bits").unwrap();
        prop_assert!(!view.is_initialized());
        for i in 0..bits {
            let expected = (source[(i / 8) as usize] >> (i % 8)) & 1;
            prop_assert_eq!(view.get_byte(ram(0x20_0000 + i)), Ok(expected));
        }
    }
}
