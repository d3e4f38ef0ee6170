//! ELF metadata for marrow.
//!
//! Parses the parts of an ELF32 or ELF64 file that loading needs: the file
//! header, program headers, the section table with names, the dynamic table
//! and an Android-style prelink trailer. Every read is bounds-checked; a
//! malformed file produces an [`ElfError`], never a panic.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod dynamic;
pub mod error;
pub mod header;
mod reader;
pub mod section;
pub mod segment;

pub use dynamic::{ElfDynamic, ElfDynamicTable, ElfDynamicType};
pub use error::ElfError;
pub use header::{ElfClass, ElfHeader, ElfHeaderBuilder, Endianness};
pub use section::{ElfSectionHeader, SectionFlags};
pub use segment::ElfProgramHeader;
