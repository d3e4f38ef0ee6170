//! ELF Fuzzing
//!
//! Targets for the ELF reader and the full load pipeline.

use alloc::format;
use alloc::vec::Vec;

use marrow_elf::dynamic::ElfDynamicType;
use marrow_elf::header::{EM_386, EM_X86_64};
use marrow_elf::section::{SHT_NOBITS, SHT_PROGBITS};
use marrow_elf::{ElfClass, ElfDynamicTable, ElfHeader, ElfSectionHeader, Endianness, SectionFlags};
use marrow_loader::x86::GOT_BASE_REGISTER;
use marrow_loader::{load_elf, resolve_language, LoaderOptions, NoCancel, NoDefaultPass};
use marrow_program::{AddressRange, Checkout, Memory, Program};

use crate::{FuzzResult, FuzzTarget};

/// Largest input handed to the targets.
pub const MAX_INPUT_SIZE: usize = 1 << 20;

/// Section size cap for loads under fuzzing.
pub const MAX_SECTION_SIZE: u64 = 1 << 16;

/// Parses the input and checks the accessors stay inside the file.
#[derive(Debug, Default)]
pub struct ElfParseTarget;

impl FuzzTarget for ElfParseTarget {
    fn name(&self) -> &str {
        "elf_parse"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        if input.len() > MAX_INPUT_SIZE {
            return FuzzResult::Ok;
        }
        let header = match ElfHeader::parse(input) {
            Ok(header) => header,
            Err(e) => return FuzzResult::ParseError(format!("{}", e)),
        };
        for section in header.sections() {
            if let Some(data) = header.section_data(section) {
                if data.len() as u64 != section.size() {
                    return FuzzResult::Violation(format!("{} data length {}", section.name(), data.len()));
                }
            }
        }
        if let Some(table) = header.dynamic_table() {
            if table.contains_tag(ElfDynamicType::DT_NULL) {
                return FuzzResult::Violation("DT_NULL kept in dynamic table".into());
            }
        }
        FuzzResult::Interesting(format!("{} sections", header.sections().len()))
    }
}

/// Runs the load pipeline and checks every EBX range sits in a PLT block.
#[derive(Debug)]
pub struct ElfLoadTarget {
    options: LoaderOptions,
}

impl Default for ElfLoadTarget {
    fn default() -> Self {
        Self::new(LoaderOptions {
            max_section_size: MAX_SECTION_SIZE,
            ..LoaderOptions::default()
        })
    }
}

impl ElfLoadTarget {
    /// Target loading with `options`
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }
}

impl FuzzTarget for ElfLoadTarget {
    fn name(&self) -> &str {
        "elf_load"
    }

    fn fuzz(&mut self, input: &[u8]) -> FuzzResult {
        if input.len() > MAX_INPUT_SIZE {
            return FuzzResult::Ok;
        }
        let header = match ElfHeader::parse(input) {
            Ok(header) => header,
            Err(e) => return FuzzResult::ParseError(format!("{}", e)),
        };
        let language = match resolve_language(&header, &self.options) {
            Ok(language) => language,
            Err(e) => return FuzzResult::ParseError(format!("{}", e)),
        };
        let program = Program::new("fuzz", language, Checkout::Exclusive);
        let report = match load_elf(&program, &header, &self.options, &mut NoDefaultPass, &NoCancel) {
            Ok(report) => report,
            Err(e) => return FuzzResult::ParseError(format!("{}", e)),
        };

        let db = program.read();
        for (range, _) in db.context().value_ranges(GOT_BASE_REGISTER) {
            if !covered_by_plt_blocks(db.memory(), &range) {
                return FuzzResult::Violation(format!("{} painted outside PLT blocks at {}", GOT_BASE_REGISTER, range));
            }
        }
        FuzzResult::Interesting(format!("{:?} {:?}", report.extension, report.outcome))
    }
}

/// Whether consecutive `.plt*` blocks cover all of `range`. Painted ranges
/// coalesce, so one range may span several adjacent blocks.
fn covered_by_plt_blocks(memory: &Memory, range: &AddressRange) -> bool {
    let mut at = range.start();
    loop {
        let Some(block) = memory.block_at(at) else {
            return false;
        };
        if !block.name().starts_with(".plt") {
            return false;
        }
        if block.contains(range.end()) {
            return true;
        }
        match block.end().checked_add(1) {
            Some(next) => at = next,
            None => return false,
        }
    }
}

/// Well-formed images to start mutation from.
pub fn seed_corpus() -> Vec<Vec<u8>> {
    let exec = SectionFlags::ALLOC | SectionFlags::EXECINSTR;
    let got = ElfDynamicTable::new()
        .with(ElfDynamicType::DT_NEEDED, 1)
        .with(ElfDynamicType::DT_PLTGOT, 0x2000);
    let sections = |builder: marrow_elf::ElfHeaderBuilder| {
        builder
            .section_with_data(ElfSectionHeader::new(".plt", SHT_PROGBITS, exec, 0x1000, 0x20), alloc::vec![0xff; 0x20])
            .section_with_data(ElfSectionHeader::new(".plt.sec", SHT_PROGBITS, exec, 0x1020, 0x10), alloc::vec![0xf3; 0x10])
            .section_with_data(ElfSectionHeader::new(".text", SHT_PROGBITS, exec, 0x1100, 0x10), alloc::vec![0x90; 0x10])
            .section(ElfSectionHeader::new(".bss", SHT_NOBITS, SectionFlags::ALLOC | SectionFlags::WRITE, 0x3000, 0x40))
    };
    alloc::vec![
        sections(ElfHeader::builder(EM_386, ElfClass::Elf32)).dynamic(got.clone()).to_bytes(),
        sections(ElfHeader::builder(EM_386, ElfClass::Elf32))
            .dynamic(got.clone())
            .dynamic_in_section()
            .prelink_base(0xb000_0000)
            .to_bytes(),
        sections(ElfHeader::builder(EM_X86_64, ElfClass::Elf64)).dynamic(got.clone()).to_bytes(),
        sections(ElfHeader::builder(EM_386, ElfClass::Elf32).endian(Endianness::Big)).dynamic(got).to_bytes(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_load_cleanly() {
        let mut parse = ElfParseTarget;
        let mut load = ElfLoadTarget::default();
        for seed in seed_corpus() {
            assert!(matches!(parse.fuzz(&seed), FuzzResult::Interesting(_)));
            assert!(matches!(load.fuzz(&seed), FuzzResult::Interesting(_)));
        }
    }

    #[test]
    fn mutated_seeds_never_violate() {
        let mut parse = ElfParseTarget;
        let mut load = ElfLoadTarget::default();
        let mut targets: [&mut dyn FuzzTarget; 2] = [&mut parse, &mut load];
        let stats = crate::run(&mut targets, &seed_corpus(), 2_000, 0x5eed);
        assert_eq!(stats.iterations, 2_000);
        assert!(stats.violations.is_empty(), "{:?}", stats.violations);
        assert!(stats.interesting > 0);
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(ElfParseTarget.fuzz(b"\x7fELF"), FuzzResult::ParseError(_)));
        assert!(matches!(ElfLoadTarget::default().fuzz(&[]), FuzzResult::ParseError(_)));
    }
}
