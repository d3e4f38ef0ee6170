//! Section import.
//!
//! Creates one memory block per allocated section so later passes can find
//! sections by name. Sections that cannot be placed are logged on the load
//! and skipped.

use alloc::format;
use alloc::string::ToString;

use marrow_elf::ElfSectionHeader;
use marrow_program::{MemoryError, Provenance};

use crate::error::LoadError;
use crate::helper::ElfLoadHelper;

/// Create blocks for every `SHF_ALLOC` section in `helper`'s header that is
/// no larger than `max_size` bytes.
///
/// Returns the number of blocks created.
pub fn import_sections(helper: &mut ElfLoadHelper<'_>, max_size: u64) -> Result<usize, LoadError> {
    let header = helper.header();
    let mut created = 0;
    for section in header.sections().iter().filter(|s| s.is_alloc()) {
        let name = section.name();
        if section.size() == 0 {
            helper.log(format!("Skipped empty section {}", name));
            continue;
        }
        if section.size() > max_size {
            helper.log(format!("Skipped section {}: size {:#x} too large", name, section.size()));
            continue;
        }
        let start = match helper.resolve_loaded_address(section.address()) {
            Ok(start) => start,
            Err(LoadError::Memory(e)) => {
                helper.log(format!("Skipped section {}: {}", name, e));
                continue;
            }
            Err(e) => return Err(e),
        };

        match create_block(helper, section, start) {
            Ok(()) => {
                if !header.data().is_empty() && !section.is_nobits() && header.section_data(section).is_none() {
                    helper.log(format!("Section {} data outside file; block left uninitialized", name));
                }
                created += 1;
            }
            Err(
                e @ (MemoryError::InvalidName(_)
                | MemoryError::DuplicateName(_)
                | MemoryError::Overlap(_)
                | MemoryError::AddressOverflow
                | MemoryError::InvalidRange),
            ) => helper.log(format!("Skipped section {}: {}", name, e)),
            Err(e) => return Err(e.into()),
        }
    }
    log::info!("[marrow/loader] imported {} section blocks from {}", created, helper.source_name());
    Ok(created)
}

fn create_block(
    helper: &mut ElfLoadHelper<'_>,
    section: &ElfSectionHeader,
    start: marrow_program::Address,
) -> Result<(), MemoryError> {
    let header = helper.header();
    let name = section.name();
    let source_name = helper.source_name().to_string();
    let provenance = Provenance::File {
        name: source_name.clone(),
        offset: section.offset(),
    };
    let memory = helper.program_mut().memory_mut();
    match header.section_data(section) {
        Some(bytes) => memory.create_initialized_block(name, start, bytes.to_vec(), provenance)?,
        None => memory.create_uninitialized_block(name, start, section.size(), provenance)?,
    };

    let mut block = memory.block_mut(name).ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
    block.set_permissions(true, section.is_writable(), section.is_executable())?;
    block.set_source_name(&source_name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::DEFAULT_MAX_SECTION_SIZE;
    use marrow_elf::header::{EM_386, EM_X86_64};
    use marrow_elf::section::{SHT_NOBITS, SHT_PROGBITS, SHT_SYMTAB};
    use marrow_elf::{ElfClass, ElfHeader, SectionFlags};
    use marrow_program::{Checkout, Language, MemoryBlockType, Program};

    fn flags(extra: SectionFlags) -> SectionFlags {
        SectionFlags::ALLOC | extra
    }

    #[test]
    fn test_import_from_image() {
        let code = vec![0xff, 0xb3, 0x04, 0x00, 0x00, 0x00];
        let bytes = ElfHeader::builder(EM_386, ElfClass::Elf32)
            .section_with_data(
                ElfSectionHeader::new(".plt", SHT_PROGBITS, flags(SectionFlags::EXECINSTR), 0x1000, 6),
                code.clone(),
            )
            .section_with_data(
                ElfSectionHeader::new(".data", SHT_PROGBITS, flags(SectionFlags::WRITE), 0x2000, 4),
                vec![1, 2, 3, 4],
            )
            .section(ElfSectionHeader::new(".bss", SHT_NOBITS, flags(SectionFlags::WRITE), 0x3000, 0x100))
            .section_with_data(
                ElfSectionHeader::new(".symtab", SHT_SYMTAB, SectionFlags::empty(), 0, 16),
                vec![0; 16],
            )
            .to_bytes();
        let header = ElfHeader::parse(&bytes).unwrap();
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(3));
        assert!(helper.messages().is_empty());
        drop(helper);

        let db = program.read();
        let memory = db.memory();
        assert_eq!(memory.num_blocks(), 3);

        let plt = memory.block(".plt").unwrap();
        assert!(plt.is_execute() && !plt.is_write());
        assert_eq!(plt.source_name(), "a.out");
        let mut buf = [0u8; 6];
        assert_eq!(plt.get_bytes(plt.start(), &mut buf), Ok(6));
        assert_eq!(buf.to_vec(), code);
        assert!(matches!(
            plt.source_infos()[0].provenance(),
            Provenance::File { name, .. } if name == "a.out"
        ));

        let data = memory.block(".data").unwrap();
        assert!(data.is_write() && !data.is_execute());

        let bss = memory.block(".bss").unwrap();
        assert_eq!(bss.block_type(), MemoryBlockType::Default);
        assert!(!bss.is_initialized());
        assert_eq!(bss.size(), 0x100);
        assert!(memory.block(".symtab").is_none());
    }

    #[test]
    fn test_image_base_applies() {
        let header = ElfHeader::builder(EM_386, ElfClass::Elf32)
            .section(ElfSectionHeader::new(".text", SHT_PROGBITS, flags(SectionFlags::EXECINSTR), 0x400, 0x10))
            .build();
        let program = Program::new("lib.so", Language::x86_32(), Checkout::Exclusive);
        program.exclusive().set_image_base(0x1000_0000);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "lib.so");
        assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(1));
        drop(helper);
        let db = program.read();
        assert_eq!(db.memory().block(".text").unwrap().start().offset(), 0x1000_0400);
    }

    #[test]
    fn test_unplaceable_sections_are_logged() {
        let exec = flags(SectionFlags::EXECINSTR);
        let header = ElfHeader::builder(EM_386, ElfClass::Elf32)
            .section(ElfSectionHeader::new(".plt", SHT_PROGBITS, exec, 0x1000, 0x10))
            .section(ElfSectionHeader::new(".plt", SHT_PROGBITS, exec, 0x2000, 0x10))
            .section(ElfSectionHeader::new(".overlap", SHT_PROGBITS, exec, 0x1008, 0x10))
            .section(ElfSectionHeader::new(".empty", SHT_PROGBITS, exec, 0x3000, 0))
            .section(ElfSectionHeader::new(".far", SHT_PROGBITS, exec, 0x1_0000_0000, 0x10))
            .build();
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(1));
        assert_eq!(helper.messages().len(), 4);
        assert!(helper.messages()[0].contains(".plt"));
        assert_eq!(helper.messages()[2], "Skipped empty section .empty");
    }

    #[test]
    fn test_section_past_end_of_space_is_skipped() {
        let exec = flags(SectionFlags::EXECINSTR);
        let header = ElfHeader::builder(EM_X86_64, ElfClass::Elf64)
            .section(ElfSectionHeader::new(".text", SHT_PROGBITS, exec, 0x1000, 0x10))
            .section(ElfSectionHeader::new(".far", SHT_PROGBITS, exec, 0xffff_ffff_ffff_ff00, 0x10))
            .build();
        let program = Program::new("a.out", Language::x86_64(), Checkout::Exclusive);
        program.exclusive().set_image_base(0x1000_0000);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(1));
        assert_eq!(helper.messages().len(), 1);
        assert!(helper.messages()[0].starts_with("Skipped section .far"));
        drop(helper);
        assert_eq!(program.read().memory().block(".text").unwrap().start().offset(), 0x1000_1000);
    }

    #[test]
    fn test_section_data_outside_file_is_logged() {
        let mut bytes = ElfHeader::builder(EM_386, ElfClass::Elf32)
            .section_with_data(
                ElfSectionHeader::new(".text", SHT_PROGBITS, flags(SectionFlags::EXECINSTR), 0x1000, 0x10),
                vec![0x90; 0x10],
            )
            .section(ElfSectionHeader::new(".bss", SHT_NOBITS, flags(SectionFlags::WRITE), 0x2000, 0x10))
            .to_bytes();
        // point .text's sh_offset past the end of the file
        let index = ElfHeader::parse(&bytes).unwrap().sections().iter().position(|s| s.name() == ".text").unwrap();
        let shoff = u32::from_le_bytes(bytes[32..36].try_into().unwrap()) as usize;
        let at = shoff + index * 40 + 16;
        bytes[at..at + 4].copy_from_slice(&0x10_0000u32.to_le_bytes());
        let header = ElfHeader::parse(&bytes).unwrap();

        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert_eq!(import_sections(&mut helper, DEFAULT_MAX_SECTION_SIZE), Ok(2));
        assert_eq!(helper.messages(), ["Section .text data outside file; block left uninitialized"]);
        drop(helper);
        assert!(!program.read().memory().block(".text").unwrap().is_initialized());
        assert!(!program.read().memory().block(".bss").unwrap().is_initialized());
    }
}
