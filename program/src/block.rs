//! Memory blocks.
//!
//! A [`MemoryBlock`] is one contiguous, named, permissioned region. Default
//! blocks own their bytes; bit-mapped and byte-mapped blocks own nothing and
//! instead translate each of their addresses into a position in whatever
//! block currently covers their source address. The translation is resolved
//! by [`crate::Memory`] on every access, so a mapped block never holds a
//! reference to its source.
//!
//! # Flags
//!
//! Block flags are persisted as a single byte. Existing bit values must not
//! be renumbered; new flags may only take unused bits.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use bitflags::bitflags;
use core::cmp::Ordering;
use core::fmt;

use crate::address::{Address, AddressRange};
use crate::error::MemoryError;

/// Reserved name of the block that stands in for unresolved external symbols.
pub const EXTERNAL_BLOCK_NAME: &str = "EXTERNAL";

bitflags! {
    /// Block permissions and attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BlockFlags: u8 {
        /// Executable.
        const EXECUTE = 0x01;
        /// Writable.
        const WRITE = 0x02;
        /// Readable.
        const READ = 0x04;
        /// I/O-like memory whose value may change between reads.
        const VOLATILE = 0x08;
        /// Fabricated for analysis; absent from a running process.
        const ARTIFICIAL = 0x10;
    }
}

/// Identity of a block within its [`crate::Memory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub(crate) u32);

/// Block kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBlockType {
    /// Owns its bytes.
    Default,
    /// Each byte views one bit of the source.
    BitMapped,
    /// Each byte views one byte of the source.
    ByteMapped,
}

/// Ratio of mapped bytes to source bytes for byte-mapped blocks.
///
/// A `2:4` scheme maps the first two bytes of every four source bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteMappingScheme {
    mapped: u8,
    source: u8,
}

impl ByteMappingScheme {
    /// One mapped byte per source byte.
    pub const IDENTITY: Self = Self { mapped: 1, source: 1 };

    /// Create a `mapped:source` scheme, `1 <= mapped <= source <= 127`.
    pub fn new(mapped: u8, source: u8) -> Result<Self, MemoryError> {
        if mapped == 0 || mapped > source || source > 127 {
            return Err(MemoryError::InvalidArgument("byte mapping ratio"));
        }
        Ok(Self { mapped, source })
    }

    /// Mapped bytes per group.
    pub fn mapped_bytes(&self) -> u8 {
        self.mapped
    }

    /// Source bytes per group.
    pub fn source_bytes(&self) -> u8 {
        self.source
    }

    /// Whether every source byte is mapped.
    pub fn is_identity(&self) -> bool {
        self.mapped == self.source
    }

    /// Source offset that backs the mapped offset, `None` if it does not
    /// fit in 64 bits.
    pub fn source_offset(&self, mapped_offset: u64) -> Option<u64> {
        let mapped = u64::from(self.mapped);
        (mapped_offset / mapped)
            .checked_mul(u64::from(self.source))?
            .checked_add(mapped_offset % mapped)
    }
}

impl fmt::Display for ByteMappingScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.mapped, self.source)
    }
}

/// Where the bytes of a block sub-range came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Loaded from `name` starting at file offset `offset`.
    File { name: String, offset: u64 },
    /// No originating file; the tag says what produced it.
    Synthetic(String),
    /// Bit-mapped view of `source`.
    BitMapped { source: Address },
    /// Byte-mapped view of `source`.
    ByteMapped {
        source: Address,
        scheme: ByteMappingScheme,
    },
}

/// Provenance of one contiguous sub-range of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    range: AddressRange,
    provenance: Provenance,
}

impl SourceInfo {
    pub(crate) fn new(range: AddressRange, provenance: Provenance) -> Self {
        Self { range, provenance }
    }

    /// Addresses this source provides.
    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Origin description.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// File offset of the first byte, for file-backed sources.
    pub fn file_offset(&self) -> Option<u64> {
        match &self.provenance {
            Provenance::File { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Split at `at`, returning `(below, at_and_above)`.
    pub(crate) fn split_at(&self, at: Address) -> (SourceInfo, SourceInfo) {
        let head_len = at.offset() - self.range.start().offset();
        let head = AddressRange::new(self.range.start(), Address::new(at.space(), at.offset() - 1));
        let tail = AddressRange::new(at, self.range.end());
        let tail_provenance = match &self.provenance {
            Provenance::File { name, offset } => Provenance::File {
                name: name.clone(),
                offset: offset + head_len,
            },
            other => other.clone(),
        };
        // `at` is strictly inside the range, so both halves are valid
        match (head, tail) {
            (Ok(head), Ok(tail)) => (
                SourceInfo::new(head, self.provenance.clone()),
                SourceInfo::new(tail, tail_provenance),
            ),
            _ => (self.clone(), self.clone()),
        }
    }

    /// Same provenance, range moved by `new_start - start`.
    pub(crate) fn rebased(&self, old_start: Address, new_start: Address) -> Option<SourceInfo> {
        let delta = self.range.start().distance_from(old_start)?;
        let start = new_start.checked_add(delta)?;
        let range = AddressRange::from_len(start, self.range.len()).ok()?;
        Some(SourceInfo::new(range, self.provenance.clone()))
    }
}

/// Owned bytes of a default block, with a per-byte "defined" bitmap.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct ByteStore {
    bytes: Vec<u8>,
    defined: Vec<u64>,
    defined_count: usize,
}

impl ByteStore {
    pub(crate) fn initialized(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        let mut defined = vec![u64::MAX; len.div_ceil(64)];
        if len % 64 != 0 {
            if let Some(last) = defined.last_mut() {
                *last = (1u64 << (len % 64)) - 1;
            }
        }
        Self {
            bytes,
            defined,
            defined_count: len,
        }
    }

    pub(crate) fn uninitialized(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
            defined: vec![0; len.div_ceil(64)],
            defined_count: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn is_defined(&self, index: usize) -> bool {
        index < self.bytes.len() && self.defined[index / 64] & (1u64 << (index % 64)) != 0
    }

    pub(crate) fn is_fully_defined(&self) -> bool {
        self.defined_count == self.bytes.len()
    }

    pub(crate) fn get(&self, index: usize) -> Option<u8> {
        if self.is_defined(index) {
            Some(self.bytes[index])
        } else {
            None
        }
    }

    /// Caller guarantees `index < len()`.
    pub(crate) fn set(&mut self, index: usize, value: u8) {
        self.bytes[index] = value;
        let mask = 1u64 << (index % 64);
        let word = &mut self.defined[index / 64];
        if *word & mask == 0 {
            *word |= mask;
            self.defined_count += 1;
        }
    }

    /// Remove and return everything from `at` onward.
    pub(crate) fn split_off(&mut self, at: usize) -> ByteStore {
        let mut tail = ByteStore::uninitialized(self.bytes.len() - at);
        for i in at..self.bytes.len() {
            if let Some(b) = self.get(i) {
                tail.set(i - at, b);
            }
        }
        let mut head = ByteStore::uninitialized(at);
        for i in 0..at {
            if let Some(b) = self.get(i) {
                head.set(i, b);
            }
        }
        *self = head;
        tail
    }

    /// Append `other` after the last byte.
    pub(crate) fn append(&mut self, other: &ByteStore) {
        let base = self.bytes.len();
        let total = base + other.len();
        self.bytes.resize(total, 0);
        self.defined.resize(total.div_ceil(64), 0);
        for i in 0..other.len() {
            if let Some(b) = other.get(i) {
                self.set(base + i, b);
            }
        }
    }
}

impl fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStore")
            .field("len", &self.bytes.len())
            .field("defined", &self.defined_count)
            .finish()
    }
}

/// Storage of a block: owned bytes or a mapping onto another address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BlockContent {
    Owned(ByteStore),
    BitMapped { source: Address },
    ByteMapped {
        source: Address,
        scheme: ByteMappingScheme,
    },
}

/// A named, contiguous memory region.
#[derive(Debug, Clone)]
pub struct MemoryBlock {
    pub(crate) id: BlockId,
    pub(crate) name: String,
    pub(crate) range: AddressRange,
    pub(crate) flags: BlockFlags,
    pub(crate) comment: String,
    pub(crate) source_name: String,
    pub(crate) overlay: bool,
    pub(crate) loaded: bool,
    pub(crate) content: BlockContent,
    pub(crate) sources: Vec<SourceInfo>,
}

impl MemoryBlock {
    /// Block identity within its memory.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Block name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First address.
    pub fn start(&self) -> Address {
        self.range.start()
    }

    /// Last address.
    pub fn end(&self) -> Address {
        self.range.end()
    }

    /// Covered range.
    pub fn range(&self) -> AddressRange {
        self.range
    }

    /// Number of bytes.
    pub fn size(&self) -> u64 {
        self.range.len()
    }

    /// Whether `addr` is in this block.
    pub fn contains(&self, addr: Address) -> bool {
        self.range.contains(addr)
    }

    /// Raw flag byte.
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// Read permission.
    pub fn is_read(&self) -> bool {
        self.flags.contains(BlockFlags::READ)
    }

    /// Write permission.
    pub fn is_write(&self) -> bool {
        self.flags.contains(BlockFlags::WRITE)
    }

    /// Execute permission.
    pub fn is_execute(&self) -> bool {
        self.flags.contains(BlockFlags::EXECUTE)
    }

    /// Volatile attribute.
    pub fn is_volatile(&self) -> bool {
        self.flags.contains(BlockFlags::VOLATILE)
    }

    /// Artificial attribute.
    pub fn is_artificial(&self) -> bool {
        self.flags.contains(BlockFlags::ARTIFICIAL)
    }

    /// Free-form comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Name of whatever supplied the data (usually the input file).
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Block kind.
    pub fn block_type(&self) -> MemoryBlockType {
        match self.content {
            BlockContent::Owned(_) => MemoryBlockType::Default,
            BlockContent::BitMapped { .. } => MemoryBlockType::BitMapped,
            BlockContent::ByteMapped { .. } => MemoryBlockType::ByteMapped,
        }
    }

    /// True only for a default block whose every byte is defined.
    ///
    /// Mapped blocks always return false, even when their source is fully
    /// initialized. Do not read "uninitialized" into that.
    pub fn is_initialized(&self) -> bool {
        match &self.content {
            BlockContent::Owned(store) => store.is_fully_defined(),
            _ => false,
        }
    }

    /// Bit- or byte-mapped.
    pub fn is_mapped(&self) -> bool {
        !matches!(self.content, BlockContent::Owned(_))
    }

    /// Lives in an overlay space.
    pub fn is_overlay(&self) -> bool {
        self.overlay
    }

    /// Lives in a loaded (non-`OTHER`) space.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether this is the reserved `EXTERNAL` block.
    pub fn is_external_block(&self) -> bool {
        self.name == EXTERNAL_BLOCK_NAME
    }

    /// Source address of a mapped block.
    pub fn mapped_source(&self) -> Option<Address> {
        match self.content {
            BlockContent::BitMapped { source } | BlockContent::ByteMapped { source, .. } => Some(source),
            BlockContent::Owned(_) => None,
        }
    }

    /// Mapping ratio of a byte-mapped block.
    pub fn mapping_scheme(&self) -> Option<ByteMappingScheme> {
        match self.content {
            BlockContent::ByteMapped { scheme, .. } => Some(scheme),
            _ => None,
        }
    }

    /// Provenance records in ascending address order.
    pub fn source_infos(&self) -> &[SourceInfo] {
        &self.sources
    }

    /// Bytes of a fully initialized default block; `None` when the block
    /// has no data of its own.
    pub fn data(&self) -> Option<impl Iterator<Item = u8> + '_> {
        match &self.content {
            BlockContent::Owned(store) if store.is_fully_defined() => {
                Some(store.bytes.iter().copied())
            }
            _ => None,
        }
    }

    /// Index of `addr` relative to the block start, or `OutOfRange`.
    pub(crate) fn index_of(&self, addr: Address) -> Result<u64, MemoryError> {
        if !self.range.contains(addr) {
            return Err(MemoryError::OutOfRange {
                block: self.name.to_string(),
                address: addr,
            });
        }
        Ok(addr.offset() - self.range.start().offset())
    }

    pub(crate) fn set_flag(&mut self, flag: BlockFlags, enabled: bool) {
        self.flags.set(flag, enabled);
    }
}

impl PartialEq for MemoryBlock {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MemoryBlock {}

impl PartialOrd for MemoryBlock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemoryBlock {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.range.space(), self.range.start().offset(), self.id)
            .cmp(&(other.range.space(), other.range.start().offset(), other.id))
    }
}
