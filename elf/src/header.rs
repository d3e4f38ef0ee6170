//! ELF file header and whole-file parsing.

use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::dynamic::ElfDynamicTable;
use crate::error::ElfError;
use crate::reader::Reader;
use crate::section::{ElfSectionHeader, SectionFlags, SHT_DYNAMIC, SHT_STRTAB};
use crate::segment::{ElfProgramHeader, PF_R, PF_W, PT_DYNAMIC};

/// ELF magic number: 0x7F 'E' 'L' 'F'
pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

/// Size of `e_ident`
pub const EI_NIDENT: usize = 16;

/// ELF class: 32-bit
pub const ELFCLASS32: u8 = 1;

/// ELF class: 64-bit
pub const ELFCLASS64: u8 = 2;

/// ELF data encoding: little endian
pub const ELFDATA2LSB: u8 = 1;

/// ELF data encoding: big endian
pub const ELFDATA2MSB: u8 = 2;

/// Current ELF version
pub const EV_CURRENT: u8 = 1;

/// ELF type: relocatable object
pub const ET_REL: u16 = 1;

/// ELF type: executable
pub const ET_EXEC: u16 = 2;

/// ELF type: shared object (PIE)
pub const ET_DYN: u16 = 3;

/// Machine type: Intel 80386
pub const EM_386: u16 = 3;

/// Machine type: ARM
pub const EM_ARM: u16 = 40;

/// Machine type: x86_64
pub const EM_X86_64: u16 = 62;

/// Machine type: AArch64
pub const EM_AARCH64: u16 = 183;

/// Undefined section index
pub const SHN_UNDEF: u16 = 0;

/// Trailer written by the Android prelinker: a 32-bit base followed by this
/// tag in the last eight bytes of the file.
pub const PRELINK_TAG: [u8; 4] = *b"PRE ";

/// Word size of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElfClass {
    /// ELFCLASS32
    Elf32,
    /// ELFCLASS64
    Elf64,
}

impl ElfClass {
    /// Address width in bits.
    pub fn bits(&self) -> u32 {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 64,
        }
    }

    fn header_size(&self) -> u16 {
        match self {
            Self::Elf32 => 52,
            Self::Elf64 => 64,
        }
    }

    fn phent_size(&self) -> u16 {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 56,
        }
    }

    fn shent_size(&self) -> u16 {
        match self {
            Self::Elf32 => 40,
            Self::Elf64 => 64,
        }
    }

    fn dyn_size(&self) -> usize {
        match self {
            Self::Elf32 => 8,
            Self::Elf64 => 16,
        }
    }
}

/// Byte order of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// ELFDATA2LSB
    Little,
    /// ELFDATA2MSB
    Big,
}

/// Parsed ELF metadata plus the file image it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfHeader {
    class: ElfClass,
    endian: Endianness,
    file_type: u16,
    machine: u16,
    entry: u64,
    flags: u32,
    segments: Vec<ElfProgramHeader>,
    sections: Vec<ElfSectionHeader>,
    dynamic: Option<ElfDynamicTable>,
    prelink_base: Option<u64>,
    data: Vec<u8>,
}

impl ElfHeader {
    /// Parse and validate an ELF image.
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        if data.len() < EI_NIDENT {
            return Err(ElfError::TooSmall);
        }
        if data[0..4] != ELF_MAGIC {
            return Err(ElfError::InvalidMagic);
        }
        let class = match data[4] {
            ELFCLASS32 => ElfClass::Elf32,
            ELFCLASS64 => ElfClass::Elf64,
            _ => return Err(ElfError::InvalidClass),
        };
        let endian = match data[5] {
            ELFDATA2LSB => Endianness::Little,
            ELFDATA2MSB => Endianness::Big,
            _ => return Err(ElfError::InvalidEncoding),
        };
        if data[6] != EV_CURRENT {
            return Err(ElfError::InvalidVersion);
        }
        if data.len() < usize::from(class.header_size()) {
            return Err(ElfError::TooSmall);
        }

        let r = Reader::new(data, endian, class);
        let (phoff, shoff, flags, tail) = match class {
            ElfClass::Elf32 => (r.word(28)?, r.word(32)?, r.u32(36)?, 40),
            ElfClass::Elf64 => (r.word(32)?, r.word(40)?, r.u32(48)?, 52),
        };
        let phentsize = r.u16(tail + 2)?;
        let phnum = r.u16(tail + 4)?;
        let shentsize = r.u16(tail + 6)?;
        let shnum = r.u16(tail + 8)?;
        let shstrndx = r.u16(tail + 10)?;

        let segments = Self::parse_program_headers(&r, phoff, phentsize, phnum)?;
        let sections = Self::parse_section_headers(&r, shoff, shentsize, shnum, shstrndx)?;
        let dynamic = Self::find_dynamic(&r, &segments, &sections);
        let prelink_base = Self::find_prelink_base(&r, data);

        let header = Self {
            class,
            endian,
            file_type: r.u16(16)?,
            machine: r.u16(18)?,
            entry: r.word(24)?,
            flags,
            segments,
            sections,
            dynamic,
            prelink_base,
            data: data.to_vec(),
        };
        log::debug!(
            "[marrow/elf] ELF{} machine {} type {}: {} segments, {} sections, dynamic={}",
            class.bits(),
            header.machine,
            header.file_type,
            header.segments.len(),
            header.sections.len(),
            header.dynamic.is_some()
        );
        Ok(header)
    }

    /// Offset of entry `i` in a table at `base` with entries of `entsize`.
    /// The whole entry must be addressable so field offsets cannot overflow.
    fn table_entry(base: u64, entsize: u16, i: u16) -> Option<u64> {
        let at = base.checked_add(u64::from(entsize).checked_mul(u64::from(i))?)?;
        at.checked_add(u64::from(entsize))?;
        Some(at)
    }

    fn parse_program_headers(
        r: &Reader<'_>,
        phoff: u64,
        phentsize: u16,
        phnum: u16,
    ) -> Result<Vec<ElfProgramHeader>, ElfError> {
        if phnum == 0 {
            return Ok(Vec::new());
        }
        if phentsize < r.class().phent_size() {
            return Err(ElfError::InvalidProgramTable);
        }
        let mut segments = Vec::with_capacity(usize::from(phnum));
        for i in 0..phnum {
            let at = Self::table_entry(phoff, phentsize, i).ok_or(ElfError::InvalidProgramTable)?;
            let ph = match r.class() {
                ElfClass::Elf32 => ElfProgramHeader {
                    p_type: r.u32(at)?,
                    offset: r.word(at + 4)?,
                    vaddr: r.word(at + 8)?,
                    paddr: r.word(at + 12)?,
                    file_size: r.word(at + 16)?,
                    mem_size: r.word(at + 20)?,
                    flags: r.u32(at + 24)?,
                    align: r.word(at + 28)?,
                },
                ElfClass::Elf64 => ElfProgramHeader {
                    p_type: r.u32(at)?,
                    flags: r.u32(at + 4)?,
                    offset: r.word(at + 8)?,
                    vaddr: r.word(at + 16)?,
                    paddr: r.word(at + 24)?,
                    file_size: r.word(at + 32)?,
                    mem_size: r.word(at + 40)?,
                    align: r.word(at + 48)?,
                },
            };
            segments.push(ph);
        }
        Ok(segments)
    }

    fn parse_section_headers(
        r: &Reader<'_>,
        shoff: u64,
        shentsize: u16,
        shnum: u16,
        shstrndx: u16,
    ) -> Result<Vec<ElfSectionHeader>, ElfError> {
        if shnum == 0 {
            return Ok(Vec::new());
        }
        if shentsize < r.class().shent_size() {
            return Err(ElfError::InvalidSectionTable);
        }

        struct Raw {
            name: u32,
            header: ElfSectionHeader,
        }

        let mut raw = Vec::with_capacity(usize::from(shnum));
        for i in 0..shnum {
            let at = Self::table_entry(shoff, shentsize, i).ok_or(ElfError::InvalidSectionTable)?;
            let (name, sh_type) = (r.u32(at)?, r.u32(at + 4)?);
            let (flags, addr, offset, size, link, info, align, entsize) = match r.class() {
                ElfClass::Elf32 => (
                    u64::from(r.u32(at + 8)?),
                    r.word(at + 12)?,
                    r.word(at + 16)?,
                    r.word(at + 20)?,
                    r.u32(at + 24)?,
                    r.u32(at + 28)?,
                    r.word(at + 32)?,
                    r.word(at + 36)?,
                ),
                ElfClass::Elf64 => (
                    r.u64(at + 8)?,
                    r.word(at + 16)?,
                    r.word(at + 24)?,
                    r.word(at + 32)?,
                    r.u32(at + 40)?,
                    r.u32(at + 44)?,
                    r.word(at + 48)?,
                    r.word(at + 56)?,
                ),
            };
            let mut header = ElfSectionHeader::new("", sh_type, SectionFlags::from_bits_retain(flags), addr, size)
                .with_offset(offset);
            header.set_raw(link, info, align, entsize);
            raw.push(Raw { name, header });
        }

        if shstrndx == SHN_UNDEF {
            return Ok(raw.into_iter().map(|s| s.header).collect());
        }
        let strtab = raw
            .get(usize::from(shstrndx))
            .map(|s| &s.header)
            .ok_or(ElfError::InvalidStringTable)?;
        if strtab.section_type() != SHT_STRTAB {
            return Err(ElfError::InvalidStringTable);
        }
        let table = r
            .bytes(strtab.offset(), strtab.size())
            .map_err(|_| ElfError::InvalidStringTable)?;

        raw.into_iter()
            .map(|s| -> Result<ElfSectionHeader, ElfError> {
                let name = Reader::c_str(table, u64::from(s.name)).ok_or(ElfError::InvalidStringTable)?;
                let mut header = s.header;
                header.rename(&String::from_utf8_lossy(name));
                Ok(header)
            })
            .collect()
    }

    /// Dynamic table from `PT_DYNAMIC`, else from an `SHT_DYNAMIC` section.
    fn find_dynamic(
        r: &Reader<'_>,
        segments: &[ElfProgramHeader],
        sections: &[ElfSectionHeader],
    ) -> Option<ElfDynamicTable> {
        let (offset, size) = segments
            .iter()
            .find(|s| s.p_type == PT_DYNAMIC)
            .map(|s| (s.offset, s.file_size))
            .or_else(|| {
                sections
                    .iter()
                    .find(|s| s.section_type() == SHT_DYNAMIC)
                    .map(|s| (s.offset(), s.size()))
            })?;
        if offset >= r.len() {
            log::warn!("[marrow/elf] dynamic table at {:#x} lies beyond the end of the file", offset);
            return None;
        }
        Some(ElfDynamicTable::parse(r, offset, size))
    }

    fn find_prelink_base(r: &Reader<'_>, data: &[u8]) -> Option<u64> {
        let len = data.len();
        if len < 8 || data[len - 4..] != PRELINK_TAG {
            return None;
        }
        let base = r.u32(r.len() - 8).ok()?;
        log::debug!("[marrow/elf] prelinked, base {:#x}", base);
        Some(u64::from(base))
    }

    /// Start building a header without file bytes.
    pub fn builder(machine: u16, class: ElfClass) -> ElfHeaderBuilder {
        ElfHeaderBuilder::new(machine, class)
    }

    /// Word size.
    pub fn class(&self) -> ElfClass {
        self.class
    }

    /// ELFCLASS32.
    pub fn is_32bit(&self) -> bool {
        self.class == ElfClass::Elf32
    }

    /// ELFCLASS64.
    pub fn is_64bit(&self) -> bool {
        self.class == ElfClass::Elf64
    }

    /// Byte order.
    pub fn endian(&self) -> Endianness {
        self.endian
    }

    /// `e_type`.
    pub fn file_type(&self) -> u16 {
        self.file_type
    }

    /// `e_machine`.
    pub fn machine(&self) -> u16 {
        self.machine
    }

    /// Entry point.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    /// Processor-specific flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Program headers in file order.
    pub fn segments(&self) -> &[ElfProgramHeader] {
        &self.segments
    }

    /// Section headers in file order, including the null section at index 0
    /// for parsed files.
    pub fn sections(&self) -> &[ElfSectionHeader] {
        &self.sections
    }

    /// First section named `name`.
    pub fn section(&self, name: &str) -> Option<&ElfSectionHeader> {
        self.sections.iter().find(|s| s.name() == name)
    }

    /// Dynamic table, if the file has one.
    pub fn dynamic_table(&self) -> Option<&ElfDynamicTable> {
        self.dynamic.as_ref()
    }

    /// Prelink base, if the file carries a prelink trailer.
    pub fn prelink_base(&self) -> Option<u64> {
        self.prelink_base
    }

    /// Undo the prelinker's shift of a stored address.
    ///
    /// Addresses at or above the prelink base are rebased to zero; lower
    /// addresses were never shifted and pass through unchanged.
    pub fn adjust_address_for_prelink(&self, address: u64) -> u64 {
        match self.prelink_base {
            Some(base) if address >= base => address - base,
            _ => address,
        }
    }

    /// File contents of `section`, `None` for `SHT_NOBITS`, empty sections
    /// or contents outside the file.
    pub fn section_data(&self, section: &ElfSectionHeader) -> Option<&[u8]> {
        if section.is_nobits() || section.size() == 0 {
            return None;
        }
        let start = usize::try_from(section.offset()).ok()?;
        let end = start.checked_add(usize::try_from(section.size()).ok()?)?;
        self.data.get(start..end)
    }

    /// The raw file image; empty for built headers.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Builds headers for synthetic inputs and tests.
#[derive(Debug, Clone)]
pub struct ElfHeaderBuilder {
    class: ElfClass,
    endian: Endianness,
    file_type: u16,
    machine: u16,
    entry: u64,
    sections: Vec<(ElfSectionHeader, Vec<u8>)>,
    segments: Vec<ElfProgramHeader>,
    dynamic: Option<ElfDynamicTable>,
    dynamic_segment: bool,
    prelink_base: Option<u32>,
}

impl ElfHeaderBuilder {
    fn new(machine: u16, class: ElfClass) -> Self {
        Self {
            class,
            endian: Endianness::Little,
            file_type: ET_DYN,
            machine,
            entry: 0,
            sections: Vec::new(),
            segments: Vec::new(),
            dynamic: None,
            dynamic_segment: true,
            prelink_base: None,
        }
    }

    /// Byte order (default little endian).
    pub fn endian(mut self, endian: Endianness) -> Self {
        self.endian = endian;
        self
    }

    /// `e_type` (default `ET_DYN`).
    pub fn file_type(mut self, file_type: u16) -> Self {
        self.file_type = file_type;
        self
    }

    /// Entry point.
    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    /// Add a section without contents.
    pub fn section(self, section: ElfSectionHeader) -> Self {
        self.section_with_data(section, Vec::new())
    }

    /// Add a section with contents; only used by [`Self::to_bytes`].
    pub fn section_with_data(mut self, section: ElfSectionHeader, data: Vec<u8>) -> Self {
        self.sections.push((section, data));
        self
    }

    /// Add a program header.
    pub fn segment(mut self, segment: ElfProgramHeader) -> Self {
        self.segments.push(segment);
        self
    }

    /// Attach a dynamic table.
    pub fn dynamic(mut self, table: ElfDynamicTable) -> Self {
        self.dynamic = Some(table);
        self
    }

    /// Emit the dynamic table as an `SHT_DYNAMIC` section instead of a
    /// `PT_DYNAMIC` segment when writing bytes.
    pub fn dynamic_in_section(mut self) -> Self {
        self.dynamic_segment = false;
        self
    }

    /// Mark the file as prelinked at `base`.
    pub fn prelink_base(mut self, base: u32) -> Self {
        self.prelink_base = Some(base);
        self
    }

    /// Header with the configured metadata and no file image.
    pub fn build(self) -> ElfHeader {
        ElfHeader {
            class: self.class,
            endian: self.endian,
            file_type: self.file_type,
            machine: self.machine,
            entry: self.entry,
            flags: 0,
            segments: self.segments,
            sections: self.sections.into_iter().map(|(s, _)| s).collect(),
            dynamic: self.dynamic,
            prelink_base: self.prelink_base.map(u64::from),
            data: Vec::new(),
        }
    }

    /// Serialize to an ELF image that [`ElfHeader::parse`] accepts.
    ///
    /// Section file offsets are assigned here; the offsets on the supplied
    /// headers are ignored. A null section and `.shstrtab` are added.
    pub fn to_bytes(&self) -> Vec<u8> {
        let class = self.class;
        let mut w = Writer {
            buf: vec![0; usize::from(class.header_size())],
            endian: self.endian,
            class,
        };

        let mut dyn_bytes = Writer {
            buf: Vec::new(),
            endian: self.endian,
            class,
        };
        if let Some(table) = &self.dynamic {
            for e in table.entries() {
                dyn_bytes.sword(e.tag.0);
                dyn_bytes.word(e.value);
            }
            dyn_bytes.buf.resize(dyn_bytes.buf.len() + class.dyn_size(), 0);
        }

        // program headers
        let mut segments = self.segments.clone();
        let dyn_offset_slot = if self.dynamic.is_some() && self.dynamic_segment {
            segments.push(ElfProgramHeader {
                p_type: PT_DYNAMIC,
                flags: PF_R | PF_W,
                offset: 0,
                vaddr: 0,
                paddr: 0,
                file_size: dyn_bytes.buf.len() as u64,
                mem_size: dyn_bytes.buf.len() as u64,
                align: 4,
            });
            Some(segments.len() - 1)
        } else {
            None
        };
        let phoff = w.buf.len() as u64;
        w.buf.resize(w.buf.len() + segments.len() * usize::from(class.phent_size()), 0);

        // section contents
        let mut placed: Vec<ElfSectionHeader> = vec![ElfSectionHeader::new("", 0, SectionFlags::empty(), 0, 0)];
        for (section, data) in &self.sections {
            let offset = w.buf.len() as u64;
            w.buf.extend_from_slice(data);
            placed.push(section.clone().with_offset(offset));
        }
        let dyn_offset = w.buf.len() as u64;
        w.buf.extend_from_slice(&dyn_bytes.buf);
        if let Some(slot) = dyn_offset_slot {
            segments[slot].offset = dyn_offset;
        } else if self.dynamic.is_some() {
            let flags = SectionFlags::ALLOC | SectionFlags::WRITE;
            placed.push(
                ElfSectionHeader::new(".dynamic", SHT_DYNAMIC, flags, 0, dyn_bytes.buf.len() as u64)
                    .with_offset(dyn_offset),
            );
        }

        // section name table
        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::with_capacity(placed.len() + 1);
        for section in &placed {
            name_offsets.push(Self::intern(&mut strtab, section.name()));
        }
        name_offsets.push(Self::intern(&mut strtab, ".shstrtab"));
        let strtab_offset = w.buf.len() as u64;
        w.buf.extend_from_slice(&strtab);
        placed.push(
            ElfSectionHeader::new(".shstrtab", SHT_STRTAB, SectionFlags::empty(), 0, strtab.len() as u64)
                .with_offset(strtab_offset),
        );

        // section header table
        let shoff = w.buf.len() as u64;
        for (section, name) in placed.iter().zip(&name_offsets) {
            w.section_header(*name, section);
        }

        for (i, ph) in segments.iter().enumerate() {
            w.program_header(phoff as usize + i * usize::from(class.phent_size()), ph);
        }

        if let Some(base) = self.prelink_base {
            w.u32(base);
            w.buf.extend_from_slice(&PRELINK_TAG);
        }

        w.file_header(self, phoff, segments.len() as u16, shoff, placed.len() as u16);
        w.buf
    }

    fn intern(strtab: &mut Vec<u8>, name: &str) -> u32 {
        if name.is_empty() {
            return 0;
        }
        let offset = strtab.len() as u32;
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
        offset
    }
}

struct Writer {
    buf: Vec<u8>,
    endian: Endianness,
    class: ElfClass,
}

impl Writer {
    fn put(&mut self, at: Option<usize>, bytes: &[u8]) {
        match at {
            Some(at) => self.buf[at..at + bytes.len()].copy_from_slice(bytes),
            None => self.buf.extend_from_slice(bytes),
        }
    }

    fn u16_at(&mut self, at: Option<usize>, v: u16) {
        match self.endian {
            Endianness::Little => self.put(at, &v.to_le_bytes()),
            Endianness::Big => self.put(at, &v.to_be_bytes()),
        }
    }

    fn u32_at(&mut self, at: Option<usize>, v: u32) {
        match self.endian {
            Endianness::Little => self.put(at, &v.to_le_bytes()),
            Endianness::Big => self.put(at, &v.to_be_bytes()),
        }
    }

    fn u64_at(&mut self, at: Option<usize>, v: u64) {
        match self.endian {
            Endianness::Little => self.put(at, &v.to_le_bytes()),
            Endianness::Big => self.put(at, &v.to_be_bytes()),
        }
    }

    fn word_at(&mut self, at: Option<usize>, v: u64) {
        match self.class {
            ElfClass::Elf32 => self.u32_at(at, v as u32),
            ElfClass::Elf64 => self.u64_at(at, v),
        }
    }

    fn u32(&mut self, v: u32) {
        self.u32_at(None, v);
    }

    fn word(&mut self, v: u64) {
        self.word_at(None, v);
    }

    fn sword(&mut self, v: i64) {
        self.word_at(None, v as u64);
    }

    fn file_header(&mut self, b: &ElfHeaderBuilder, phoff: u64, phnum: u16, shoff: u64, shnum: u16) {
        let class = b.class;
        self.buf[0..4].copy_from_slice(&ELF_MAGIC);
        self.buf[4] = match class {
            ElfClass::Elf32 => ELFCLASS32,
            ElfClass::Elf64 => ELFCLASS64,
        };
        self.buf[5] = match b.endian {
            Endianness::Little => ELFDATA2LSB,
            Endianness::Big => ELFDATA2MSB,
        };
        self.buf[6] = EV_CURRENT;
        self.u16_at(Some(16), b.file_type);
        self.u16_at(Some(18), b.machine);
        self.u32_at(Some(20), u32::from(EV_CURRENT));
        self.word_at(Some(24), b.entry);
        let tail = match class {
            ElfClass::Elf32 => {
                self.word_at(Some(28), phoff);
                self.word_at(Some(32), shoff);
                40
            }
            ElfClass::Elf64 => {
                self.word_at(Some(32), phoff);
                self.word_at(Some(40), shoff);
                52
            }
        };
        self.u16_at(Some(tail), class.header_size());
        self.u16_at(Some(tail + 2), class.phent_size());
        self.u16_at(Some(tail + 4), phnum);
        self.u16_at(Some(tail + 6), class.shent_size());
        self.u16_at(Some(tail + 8), shnum);
        self.u16_at(Some(tail + 10), shnum - 1);
    }

    fn program_header(&mut self, at: usize, ph: &ElfProgramHeader) {
        match self.class {
            ElfClass::Elf32 => {
                self.u32_at(Some(at), ph.p_type);
                self.word_at(Some(at + 4), ph.offset);
                self.word_at(Some(at + 8), ph.vaddr);
                self.word_at(Some(at + 12), ph.paddr);
                self.word_at(Some(at + 16), ph.file_size);
                self.word_at(Some(at + 20), ph.mem_size);
                self.u32_at(Some(at + 24), ph.flags);
                self.word_at(Some(at + 28), ph.align);
            }
            ElfClass::Elf64 => {
                self.u32_at(Some(at), ph.p_type);
                self.u32_at(Some(at + 4), ph.flags);
                self.word_at(Some(at + 8), ph.offset);
                self.word_at(Some(at + 16), ph.vaddr);
                self.word_at(Some(at + 24), ph.paddr);
                self.word_at(Some(at + 32), ph.file_size);
                self.word_at(Some(at + 40), ph.mem_size);
                self.word_at(Some(at + 48), ph.align);
            }
        }
    }

    fn section_header(&mut self, name: u32, s: &ElfSectionHeader) {
        self.u32(name);
        self.u32(s.section_type());
        match self.class {
            ElfClass::Elf32 => self.u32(s.flags().bits() as u32),
            ElfClass::Elf64 => self.u64_at(None, s.flags().bits()),
        }
        self.word(s.address());
        self.word(s.offset());
        self.word(s.size());
        self.u32(s.link());
        self.u32(s.info());
        self.word(s.addralign());
        self.word(s.entsize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::ElfDynamicType;
    use crate::section::{SHT_NOBITS, SHT_PROGBITS};
    use crate::segment::{PF_X, PT_LOAD};

    fn sample(class: ElfClass, endian: Endianness) -> ElfHeaderBuilder {
        let exec = SectionFlags::ALLOC | SectionFlags::EXECINSTR;
        ElfHeader::builder(EM_386, class)
            .endian(endian)
            .entry(0x1040)
            .segment(ElfProgramHeader {
                p_type: PT_LOAD,
                flags: PF_R | PF_X,
                offset: 0,
                vaddr: 0x1000,
                paddr: 0x1000,
                file_size: 0x100,
                mem_size: 0x100,
                align: 0x1000,
            })
            .section_with_data(ElfSectionHeader::new(".plt", SHT_PROGBITS, exec, 0x1000, 4), vec![0xff, 0xb3, 4, 0])
            .section_with_data(ElfSectionHeader::new(".text", SHT_PROGBITS, exec, 0x1010, 2), vec![0x90, 0xc3])
            .section(ElfSectionHeader::new(".bss", SHT_NOBITS, SectionFlags::ALLOC | SectionFlags::WRITE, 0x3000, 0x20))
            .dynamic(ElfDynamicTable::new().with(ElfDynamicType::DT_PLTGOT, 0x2000))
    }

    #[test]
    fn test_parse_written_image() {
        for class in [ElfClass::Elf32, ElfClass::Elf64] {
            for endian in [Endianness::Little, Endianness::Big] {
                let bytes = sample(class, endian).to_bytes();
                let elf = ElfHeader::parse(&bytes).unwrap();
                assert_eq!(elf.class(), class);
                assert_eq!(elf.endian(), endian);
                assert_eq!(elf.machine(), EM_386);
                assert_eq!(elf.entry(), 0x1040);
                assert_eq!(elf.segments()[0].vaddr, 0x1000);
                assert!(elf.segments()[0].is_executable());

                let plt = elf.section(".plt").unwrap();
                assert!(plt.is_executable());
                assert_eq!(elf.section_data(plt), Some(&[0xff, 0xb3, 4, 0][..]));
                assert_eq!(elf.section_data(elf.section(".bss").unwrap()), None);
                assert_eq!(elf.sections()[0].name(), "");
                assert!(elf.section(".shstrtab").is_some());

                let dynamic = elf.dynamic_table().unwrap();
                assert_eq!(dynamic.get_value(ElfDynamicType::DT_PLTGOT), Ok(0x2000));
                assert_eq!(elf.prelink_base(), None);
            }
        }
    }

    #[test]
    fn test_dynamic_section_fallback() {
        let bytes = sample(ElfClass::Elf32, Endianness::Little).dynamic_in_section().to_bytes();
        let elf = ElfHeader::parse(&bytes).unwrap();
        assert!(elf.segments().iter().all(|s| s.p_type != PT_DYNAMIC));
        assert!(elf.dynamic_table().unwrap().contains_tag(ElfDynamicType::DT_PLTGOT));
    }

    #[test]
    fn test_prelink_trailer() {
        let bytes = sample(ElfClass::Elf32, Endianness::Little)
            .prelink_base(0xb000_0000)
            .to_bytes();
        let elf = ElfHeader::parse(&bytes).unwrap();
        assert_eq!(elf.prelink_base(), Some(0xb000_0000));
        assert_eq!(elf.adjust_address_for_prelink(0xb000_2000), 0x2000);
        assert_eq!(elf.adjust_address_for_prelink(0x2000), 0x2000);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = sample(ElfClass::Elf32, Endianness::Little).to_bytes();
        bytes[0] = 0x00;
        assert_eq!(ElfHeader::parse(&bytes), Err(ElfError::InvalidMagic));
    }

    #[test]
    fn test_too_small() {
        assert_eq!(ElfHeader::parse(&[0x7F, b'E', b'L', b'F']), Err(ElfError::TooSmall));
        let mut ident = vec![0u8; 20];
        ident[..4].copy_from_slice(&ELF_MAGIC);
        ident[4] = ELFCLASS64;
        ident[5] = ELFDATA2LSB;
        ident[6] = EV_CURRENT;
        assert_eq!(ElfHeader::parse(&ident), Err(ElfError::TooSmall));
    }

    #[test]
    fn test_bad_ident_fields() {
        let good = sample(ElfClass::Elf32, Endianness::Little).to_bytes();
        let mut bad = good.clone();
        bad[4] = 7;
        assert_eq!(ElfHeader::parse(&bad), Err(ElfError::InvalidClass));
        let mut bad = good.clone();
        bad[5] = 0;
        assert_eq!(ElfHeader::parse(&bad), Err(ElfError::InvalidEncoding));
        let mut bad = good;
        bad[6] = 2;
        assert_eq!(ElfHeader::parse(&bad), Err(ElfError::InvalidVersion));
    }

    #[test]
    fn test_truncated_section_table() {
        let bytes = sample(ElfClass::Elf64, Endianness::Little).to_bytes();
        let cut = &bytes[..bytes.len() - 10];
        assert!(matches!(ElfHeader::parse(cut), Err(ElfError::Truncated { .. })));
    }

    #[test]
    fn test_builder_without_bytes() {
        let elf = ElfHeader::builder(EM_X86_64, ElfClass::Elf64).build();
        assert!(elf.is_64bit());
        assert!(elf.dynamic_table().is_none());
        assert!(elf.sections().is_empty());
        assert!(elf.data().is_empty());
    }
}
