//! Dynamic table.

use alloc::vec::Vec;
use core::fmt;

use crate::error::ElfError;
use crate::header::ElfClass;
use crate::reader::Reader;

/// Dynamic entry tag (`d_tag`).
///
/// Tags form an open set, so unknown values are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElfDynamicType(pub i64);

impl ElfDynamicType {
    /// End of the dynamic table
    pub const DT_NULL: Self = Self(0);
    /// Needed library name
    pub const DT_NEEDED: Self = Self(1);
    /// Size of PLT relocations
    pub const DT_PLTRELSZ: Self = Self(2);
    /// Address of the PLT/GOT base
    pub const DT_PLTGOT: Self = Self(3);
    /// Symbol hash table
    pub const DT_HASH: Self = Self(4);
    /// String table
    pub const DT_STRTAB: Self = Self(5);
    /// Symbol table
    pub const DT_SYMTAB: Self = Self(6);
    /// Rela relocations
    pub const DT_RELA: Self = Self(7);
    /// String table size
    pub const DT_STRSZ: Self = Self(10);
    /// Initialization function
    pub const DT_INIT: Self = Self(12);
    /// Termination function
    pub const DT_FINI: Self = Self(13);
    /// Shared object name
    pub const DT_SONAME: Self = Self(14);
    /// Rel relocations
    pub const DT_REL: Self = Self(17);
    /// Type of PLT relocations
    pub const DT_PLTREL: Self = Self(20);
    /// Debugger hook
    pub const DT_DEBUG: Self = Self(21);
    /// PLT relocations
    pub const DT_JMPREL: Self = Self(23);

    /// Symbolic name of well-known tags.
    pub fn name(&self) -> Option<&'static str> {
        Some(match *self {
            Self::DT_NULL => "DT_NULL",
            Self::DT_NEEDED => "DT_NEEDED",
            Self::DT_PLTRELSZ => "DT_PLTRELSZ",
            Self::DT_PLTGOT => "DT_PLTGOT",
            Self::DT_HASH => "DT_HASH",
            Self::DT_STRTAB => "DT_STRTAB",
            Self::DT_SYMTAB => "DT_SYMTAB",
            Self::DT_RELA => "DT_RELA",
            Self::DT_STRSZ => "DT_STRSZ",
            Self::DT_INIT => "DT_INIT",
            Self::DT_FINI => "DT_FINI",
            Self::DT_SONAME => "DT_SONAME",
            Self::DT_REL => "DT_REL",
            Self::DT_PLTREL => "DT_PLTREL",
            Self::DT_DEBUG => "DT_DEBUG",
            Self::DT_JMPREL => "DT_JMPREL",
            _ => return None,
        })
    }
}

impl fmt::Display for ElfDynamicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "DT_{:#x}", self.0),
        }
    }
}

/// One dynamic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfDynamic {
    /// Entry tag
    pub tag: ElfDynamicType,
    /// `d_val` / `d_ptr`
    pub value: u64,
}

/// Parsed dynamic table. Tags may repeat (`DT_NEEDED`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElfDynamicTable {
    entries: Vec<ElfDynamic>,
}

impl ElfDynamicTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn push(&mut self, tag: ElfDynamicType, value: u64) {
        self.entries.push(ElfDynamic { tag, value });
    }

    /// Add an entry, builder style.
    pub fn with(mut self, tag: ElfDynamicType, value: u64) -> Self {
        self.push(tag, value);
        self
    }

    /// All entries in file order, excluding the terminator.
    pub fn entries(&self) -> &[ElfDynamic] {
        &self.entries
    }

    /// Whether `tag` appears at least once.
    pub fn contains_tag(&self, tag: ElfDynamicType) -> bool {
        self.entries.iter().any(|e| e.tag == tag)
    }

    /// Value of the first entry with `tag`.
    pub fn get_value(&self, tag: ElfDynamicType) -> Result<u64, ElfError> {
        self.entries
            .iter()
            .find(|e| e.tag == tag)
            .map(|e| e.value)
            .ok_or(ElfError::NotFound(tag))
    }

    /// Values of every entry with `tag`, in file order.
    pub fn get_values(&self, tag: ElfDynamicType) -> impl Iterator<Item = u64> + '_ {
        self.entries
            .iter()
            .filter(move |e| e.tag == tag)
            .map(|e| e.value)
    }

    /// Read entries from `[offset, offset + size)`, clamped to the file.
    /// Stops at `DT_NULL` or when no whole entry remains.
    pub(crate) fn parse(reader: &Reader<'_>, offset: u64, size: u64) -> Self {
        let entry_size = match reader.class() {
            ElfClass::Elf32 => 8,
            ElfClass::Elf64 => 16,
        };
        let end = offset.saturating_add(size).min(reader.len());
        let mut table = Self::new();
        let mut pos = offset;
        while pos.saturating_add(entry_size) <= end {
            let (Ok(tag), Ok(value)) = (reader.sword(pos), reader.word(pos + entry_size / 2)) else {
                break;
            };
            let tag = ElfDynamicType(tag);
            if tag == ElfDynamicType::DT_NULL {
                break;
            }
            table.push(tag, value);
            pos += entry_size;
        }
        table
    }
}
