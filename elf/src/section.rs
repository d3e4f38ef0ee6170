//! Section headers.

use alloc::format;
use alloc::string::{String, ToString};
use bitflags::bitflags;

/// Section type: inactive
pub const SHT_NULL: u32 = 0;
/// Section type: program-defined contents
pub const SHT_PROGBITS: u32 = 1;
/// Section type: symbol table
pub const SHT_SYMTAB: u32 = 2;
/// Section type: string table
pub const SHT_STRTAB: u32 = 3;
/// Section type: relocations with addends
pub const SHT_RELA: u32 = 4;
/// Section type: dynamic linking info
pub const SHT_DYNAMIC: u32 = 6;
/// Section type: notes
pub const SHT_NOTE: u32 = 7;
/// Section type: occupies no file space (.bss)
pub const SHT_NOBITS: u32 = 8;
/// Section type: relocations without addends
pub const SHT_REL: u32 = 9;
/// Section type: dynamic symbol table
pub const SHT_DYNSYM: u32 = 11;

/// Name of the procedure linkage table section. Linkers may emit further
/// PLT sections named with this prefix and a `.` separator (`.plt.sec`).
pub const PLT_SECTION_NAME: &str = ".plt";

bitflags! {
    /// Section attribute flags (`sh_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SectionFlags: u64 {
        /// Writable at run time
        const WRITE = 0x1;
        /// Occupies memory at run time
        const ALLOC = 0x2;
        /// Contains executable instructions
        const EXECINSTR = 0x4;
        /// May be merged
        const MERGE = 0x10;
        /// Contains NUL-terminated strings
        const STRINGS = 0x20;
        /// `sh_info` holds a section index
        const INFO_LINK = 0x40;
        /// Thread-local storage
        const TLS = 0x400;
    }
}

/// A section header with its resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSectionHeader {
    name: String,
    section_type: u32,
    flags: SectionFlags,
    address: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

impl ElfSectionHeader {
    /// Section with the given name, type, flags, address and size; the
    /// remaining fields are zero.
    pub fn new(name: &str, section_type: u32, flags: SectionFlags, address: u64, size: u64) -> Self {
        Self {
            name: name.to_string(),
            section_type,
            flags,
            address,
            offset: 0,
            size,
            link: 0,
            info: 0,
            addralign: 0,
            entsize: 0,
        }
    }

    /// Set the file offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub(crate) fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn set_raw(&mut self, link: u32, info: u32, addralign: u64, entsize: u64) {
        self.link = link;
        self.info = info;
        self.addralign = addralign;
        self.entsize = entsize;
    }

    /// Section name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `sh_type`.
    pub fn section_type(&self) -> u32 {
        self.section_type
    }

    /// `sh_flags`.
    pub fn flags(&self) -> SectionFlags {
        self.flags
    }

    /// File-relative virtual address (`sh_addr`).
    pub fn address(&self) -> u64 {
        self.address
    }

    /// File offset of the contents.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// `sh_link`.
    pub fn link(&self) -> u32 {
        self.link
    }

    /// `sh_info`.
    pub fn info(&self) -> u32 {
        self.info
    }

    /// Required alignment.
    pub fn addralign(&self) -> u64 {
        self.addralign
    }

    /// Size of table entries, if the section is a table.
    pub fn entsize(&self) -> u64 {
        self.entsize
    }

    /// Contains instructions.
    pub fn is_executable(&self) -> bool {
        self.flags.contains(SectionFlags::EXECINSTR)
    }

    /// Writable at run time.
    pub fn is_writable(&self) -> bool {
        self.flags.contains(SectionFlags::WRITE)
    }

    /// Occupies memory at run time.
    pub fn is_alloc(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC)
    }

    /// Has no file contents.
    pub fn is_nobits(&self) -> bool {
        self.section_type == SHT_NOBITS
    }

    /// Whether the name is `base` or `base` followed by `.` and a suffix.
    pub fn is_in_group(&self, base: &str) -> bool {
        self.name == base || self.name.starts_with(&format!("{}.", base))
    }

    /// Inclusive `(first, last)` file-relative addresses, `None` if empty.
    pub fn address_range(&self) -> Option<(u64, u64)> {
        let last = self.address.checked_add(self.size.checked_sub(1)?)?;
        Some((self.address, last))
    }
}
