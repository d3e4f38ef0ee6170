//! Property: the x86-32 PLT pass is idempotent and stays inside PLT blocks
//!
//! For any layout of executable `.plt`/`.plt.*` and other sections, running
//! the pass twice leaves the same EBX ranges as running it once, every
//! annotated address lies in a PLT block, and every PLT block is fully
//! covered with the resolved GOT value.

use marrow_elf::dynamic::ElfDynamicType;
use marrow_elf::header::EM_386;
use marrow_elf::section::SHT_PROGBITS;
use marrow_elf::{ElfClass, ElfDynamicTable, ElfHeader, ElfSectionHeader, SectionFlags};
use marrow_loader::options::DEFAULT_MAX_SECTION_SIZE;
use marrow_loader::x86::{process_x86_plt_sections, GOT_BASE_REGISTER};
use marrow_loader::{import_sections, ElfLoadHelper, NoCancel, PassOutcome};
use marrow_program::{Checkout, Language, Program};
use proptest::prelude::*;

const NAMES: [&str; 5] = [".plt", ".plt.got", ".plt.sec", ".text", ".init"];

fn image(sizes: &[u64], got: u64) -> ElfHeader {
    let exec = SectionFlags::ALLOC | SectionFlags::EXECINSTR;
    let mut builder = ElfHeader::builder(EM_386, ElfClass::Elf32);
    let mut address = 0x1000;
    for (name, &size) in NAMES.iter().zip(sizes) {
        builder = builder.section(ElfSectionHeader::new(name, SHT_PROGBITS, exec, address, size));
        address += size + 0x10;
    }
    builder
        .dynamic(ElfDynamicTable::new().with(ElfDynamicType::DT_PLTGOT, got))
        .build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn plt_pass_is_idempotent_and_confined(
        sizes in proptest::collection::vec(1u64..0x200, NAMES.len()),
        got in 0x1000u64..0x10_0000,
        image_base in 0u64..0x1000_0000,
    ) {
        let header = image(&sizes, got);
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        program.exclusive().set_image_base(image_base);

        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        prop_assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(NAMES.len()));
        prop_assert_eq!(process_x86_plt_sections(&mut helper, &NoCancel), Ok(PassOutcome::Completed));
        drop(helper);
        let once = program.read().context().value_ranges(GOT_BASE_REGISTER);

        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        prop_assert_eq!(process_x86_plt_sections(&mut helper, &NoCancel), Ok(PassOutcome::Completed));
        prop_assert!(helper.messages().is_empty());
        drop(helper);

        let db = program.read();
        let twice = db.context().value_ranges(GOT_BASE_REGISTER);
        prop_assert_eq!(&once, &twice);

        for (range, value) in &twice {
            prop_assert_eq!(*value, got + image_base);
            let block = db.memory().block_at(range.start()).unwrap();
            prop_assert!(block.name().starts_with(".plt"));
        }
        for block in db.memory().blocks() {
            let painted = db.context().get_value(GOT_BASE_REGISTER, block.start());
            if block.name().starts_with(".plt") {
                prop_assert_eq!(painted, Some(got + image_base));
                prop_assert_eq!(db.context().get_value(GOT_BASE_REGISTER, block.end()), Some(got + image_base));
            } else {
                prop_assert_eq!(painted, None);
            }
        }
    }
}
