//! ELF parsing errors.

use crate::dynamic::ElfDynamicType;

/// ELF parsing and lookup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ElfError {
    /// Binary too small to contain an ELF header
    #[error("file too small for an ELF header")]
    TooSmall,
    /// Invalid ELF magic number
    #[error("invalid ELF magic")]
    InvalidMagic,
    /// Class is neither ELFCLASS32 nor ELFCLASS64
    #[error("invalid ELF class")]
    InvalidClass,
    /// Data encoding is neither little nor big endian
    #[error("invalid ELF data encoding")]
    InvalidEncoding,
    /// Unknown ELF version
    #[error("invalid ELF version")]
    InvalidVersion,
    /// A read ran past the end of the file
    #[error("truncated: {len} bytes at offset {offset:#x}")]
    Truncated { offset: u64, len: u64 },
    /// Program header table is malformed
    #[error("invalid program header table")]
    InvalidProgramTable,
    /// Section header table is malformed
    #[error("invalid section header table")]
    InvalidSectionTable,
    /// Section name string table is missing or malformed
    #[error("invalid section name string table")]
    InvalidStringTable,
    /// Dynamic tag is not present
    #[error("dynamic tag {0} not found")]
    NotFound(ElfDynamicType),
}
