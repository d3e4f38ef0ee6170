//! Program headers.

/// Program header type: unused entry
pub const PT_NULL: u32 = 0;

/// Program header type: loadable segment
pub const PT_LOAD: u32 = 1;

/// Program header type: dynamic linking info
pub const PT_DYNAMIC: u32 = 2;

/// Program header type: interpreter path
pub const PT_INTERP: u32 = 3;

/// Program header type: auxiliary notes
pub const PT_NOTE: u32 = 4;

/// Program header type: program header table
pub const PT_PHDR: u32 = 6;

/// Program header type: read-only after relocation
pub const PT_GNU_RELRO: u32 = 0x6474_e552;

/// Segment permission: executable
pub const PF_X: u32 = 1;

/// Segment permission: writable
pub const PF_W: u32 = 2;

/// Segment permission: readable
pub const PF_R: u32 = 4;

/// A program header, widened to 64-bit fields for both classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfProgramHeader {
    /// Segment type
    pub p_type: u32,
    /// Segment flags (PF_R, PF_W, PF_X)
    pub flags: u32,
    /// File offset of segment data
    pub offset: u64,
    /// Virtual address
    pub vaddr: u64,
    /// Physical address
    pub paddr: u64,
    /// Size of segment data in file
    pub file_size: u64,
    /// Size of segment in memory
    pub mem_size: u64,
    /// Alignment requirement
    pub align: u64,
}

impl ElfProgramHeader {
    /// Check if segment is loadable
    pub fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }

    /// Check if segment is readable
    pub fn is_readable(&self) -> bool {
        self.flags & PF_R != 0
    }

    /// Check if segment is writable
    pub fn is_writable(&self) -> bool {
        self.flags & PF_W != 0
    }

    /// Check if segment is executable
    pub fn is_executable(&self) -> bool {
        self.flags & PF_X != 0
    }
}
