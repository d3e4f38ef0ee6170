//! Load context handed to extensions.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use marrow_elf::ElfHeader;
use marrow_program::{Address, ExclusiveAccess, Language, MemoryError, ProgramDb};

use crate::error::LoadError;
use crate::messages::MessageLog;

/// Everything an extension needs during one load: the parsed header, the
/// program under exclusive access, address resolution and a message log.
///
/// The program stays locked for as long as the helper lives.
pub struct ElfLoadHelper<'a> {
    header: &'a ElfHeader,
    program: ExclusiveAccess<'a>,
    source_name: String,
    log: MessageLog,
}

impl<'a> ElfLoadHelper<'a> {
    /// Start a load of `header` into `program`. `source_name` names the
    /// input file in block provenance.
    pub fn new(header: &'a ElfHeader, program: ExclusiveAccess<'a>, source_name: &str) -> Self {
        Self {
            header,
            program,
            source_name: source_name.to_string(),
            log: MessageLog::new(),
        }
    }

    /// Parsed ELF header.
    pub fn header(&self) -> &'a ElfHeader {
        self.header
    }

    /// Program database.
    pub fn program(&self) -> &ProgramDb {
        &self.program
    }

    /// Program database, mutable.
    pub fn program_mut(&mut self) -> &mut ProgramDb {
        &mut self.program
    }

    /// Language the program is being loaded with.
    pub fn language(&self) -> &Language {
        self.program.language()
    }

    /// Name of the input file.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Address of `offset` in the default space, unadjusted.
    pub fn default_address(&self, offset: u64) -> Result<Address, LoadError> {
        Ok(self.program.memory().address_factory().default_address(offset)?)
    }

    /// Map a raw file-relative value to its loaded address: undo any prelink
    /// shift first, then add the image base.
    pub fn resolve_loaded_address(&self, raw: u64) -> Result<Address, LoadError> {
        let adjusted = self.header.adjust_address_for_prelink(raw);
        let offset = adjusted
            .checked_add(self.program.image_base())
            .ok_or(MemoryError::AddressOverflow)?;
        self.default_address(offset)
    }

    /// Record a non-fatal notice.
    pub fn log(&mut self, msg: impl Into<String>) {
        self.log.append_msg(msg);
    }

    /// Notices recorded so far.
    pub fn messages(&self) -> &[String] {
        self.log.messages()
    }

    /// Release the program and return the notices.
    pub fn into_messages(self) -> Vec<String> {
        self.log.into_messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marrow_elf::header::{EM_386, EM_X86_64};
    use marrow_elf::{ElfClass, ElfHeaderBuilder};
    use marrow_program::{Checkout, Program};

    fn prelinked() -> ElfHeaderBuilder {
        ElfHeader::builder(EM_386, ElfClass::Elf32).prelink_base(0xb000_0000)
    }

    #[test]
    fn test_resolution_adjusts_then_adds_base() {
        let header = prelinked().build();
        let program = Program::new("libfoo.so", Language::x86_32(), Checkout::Exclusive);
        program.exclusive().set_image_base(0x1_0000);
        let helper = ElfLoadHelper::new(&header, program.exclusive(), "libfoo.so");

        let resolved = helper.resolve_loaded_address(0xb000_2000).unwrap();
        assert_eq!(resolved.offset(), 0x1_2000);
        assert_eq!(resolved, helper.default_address(0x1_2000).unwrap());
    }

    #[test]
    fn test_resolution_order_matters() {
        let header = prelinked().build();
        let program = Program::new("libfoo.so", Language::x86_32(), Checkout::Exclusive);
        let image_base = 0xb000_0000;
        program.exclusive().set_image_base(image_base);
        let helper = ElfLoadHelper::new(&header, program.exclusive(), "libfoo.so");

        let raw = 0x2000;
        let resolved = helper.resolve_loaded_address(raw).unwrap().offset();
        let swapped = header.adjust_address_for_prelink(raw + image_base);
        assert_eq!(resolved, header.adjust_address_for_prelink(raw) + image_base);
        assert_eq!(resolved, 0xb000_2000);
        assert_ne!(resolved, swapped);
    }

    #[test]
    fn test_resolution_outside_space_fails() {
        let header = ElfHeader::builder(EM_386, ElfClass::Elf32).build();
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        program.exclusive().set_image_base(0xffff_f000);
        let helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert!(helper.resolve_loaded_address(0x2000).is_err());
    }

    #[test]
    fn test_resolution_overflow_is_a_memory_error() {
        let header = ElfHeader::builder(EM_X86_64, ElfClass::Elf64).build();
        let program = Program::new("a.out", Language::x86_64(), Checkout::Exclusive);
        program.exclusive().set_image_base(0x1000_0000);
        let helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        assert_eq!(
            helper.resolve_loaded_address(0xffff_ffff_ffff_ff00),
            Err(LoadError::Memory(MemoryError::AddressOverflow))
        );
    }

    #[test]
    fn test_messages_are_kept_in_order() {
        let header = ElfHeader::builder(EM_386, ElfClass::Elf32).build();
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        let mut helper = ElfLoadHelper::new(&header, program.exclusive(), "a.out");
        helper.log("first");
        helper.log(alloc::format!("second {}", 2));
        assert_eq!(helper.messages(), ["first", "second 2"]);
        assert_eq!(helper.into_messages().len(), 2);
        assert!(program.try_exclusive().is_some());
    }
}
