//! Address spaces, addresses and ranges.
//!
//! An [`Address`] is a `(space, offset)` pair. Addresses in the same space
//! are totally ordered; addresses in different spaces do not compare at all
//! (`partial_cmp` returns `None`).

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::fmt;

use crate::error::MemoryError;

/// Identifier of an address space within one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpaceId(pub u16);

/// Byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// What an address space represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Loaded processor memory.
    Ram,
    /// Alternate view sharing the coordinates of a base space.
    Overlay { base: SpaceId },
    /// Storage that is not part of the loaded image (file headers, notes).
    Other,
}

/// An address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressSpace {
    id: SpaceId,
    name: String,
    size_bits: u32,
    unit_size: u32,
    endian: Endian,
    kind: SpaceKind,
}

impl AddressSpace {
    /// Create an address space.
    ///
    /// `size_bits` is clamped to `1..=64`; `unit_size` is the addressable
    /// word size in bytes (1 for byte-addressed machines).
    pub fn new(
        id: SpaceId,
        name: &str,
        size_bits: u32,
        unit_size: u32,
        endian: Endian,
        kind: SpaceKind,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            size_bits: size_bits.clamp(1, 64),
            unit_size: unit_size.max(1),
            endian,
            kind,
        }
    }

    /// Space identifier.
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Space name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address width in bits.
    pub fn size_bits(&self) -> u32 {
        self.size_bits
    }

    /// Addressable unit size in bytes.
    pub fn unit_size(&self) -> u32 {
        self.unit_size
    }

    /// Byte order of values stored in this space.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Space kind.
    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    /// Largest valid offset.
    pub fn max_offset(&self) -> u64 {
        if self.size_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.size_bits) - 1
        }
    }

    /// Whether this is an overlay space.
    pub fn is_overlay(&self) -> bool {
        matches!(self.kind, SpaceKind::Overlay { .. })
    }

    /// Whether blocks in this space are part of the loaded image.
    pub fn is_loaded(&self) -> bool {
        !matches!(self.kind, SpaceKind::Other)
    }

    /// Address at `offset`, failing if it exceeds the space.
    pub fn address(&self, offset: u64) -> Result<Address, MemoryError> {
        if offset > self.max_offset() {
            return Err(MemoryError::AddressOverflow);
        }
        Ok(Address::new(self.id, offset))
    }

    /// Address at `offset` reduced modulo the space size.
    pub fn truncated_address(&self, offset: u64) -> Address {
        Address::new(self.id, offset & self.max_offset())
    }
}

/// A location in an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    space: SpaceId,
    offset: u64,
}

impl Address {
    /// Create an address.
    pub const fn new(space: SpaceId, offset: u64) -> Self {
        Self { space, offset }
    }

    /// Space this address belongs to.
    pub fn space(&self) -> SpaceId {
        self.space
    }

    /// Offset within the space.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Address `n` units higher, if representable.
    pub fn checked_add(&self, n: u64) -> Option<Address> {
        self.offset.checked_add(n).map(|offset| Address::new(self.space, offset))
    }

    /// Address `n` units lower, if representable.
    pub fn checked_sub(&self, n: u64) -> Option<Address> {
        self.offset.checked_sub(n).map(|offset| Address::new(self.space, offset))
    }

    /// `self - base` when both are in the same space and `self >= base`.
    pub fn distance_from(&self, base: Address) -> Option<u64> {
        if self.space != base.space {
            return None;
        }
        self.offset.checked_sub(base.offset)
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.space != other.space {
            return None;
        }
        Some(self.offset.cmp(&other.offset))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:08x}", self.space.0, self.offset)
    }
}

/// Inclusive address range within one space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    start: Address,
    end: Address,
}

impl AddressRange {
    /// Create `[start, end]`. Both ends must share a space and `start <= end`.
    pub fn new(start: Address, end: Address) -> Result<Self, MemoryError> {
        if start.space != end.space || start.offset > end.offset {
            return Err(MemoryError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    /// Range of `len` units beginning at `start`.
    pub fn from_len(start: Address, len: u64) -> Result<Self, MemoryError> {
        if len == 0 {
            return Err(MemoryError::InvalidRange);
        }
        let end = start.checked_add(len - 1).ok_or(MemoryError::AddressOverflow)?;
        Ok(Self { start, end })
    }

    /// First address.
    pub fn start(&self) -> Address {
        self.start
    }

    /// Last address (inclusive).
    pub fn end(&self) -> Address {
        self.end
    }

    /// Space of both ends.
    pub fn space(&self) -> SpaceId {
        self.start.space
    }

    /// Number of units covered, saturating for the full 64-bit space.
    pub fn len(&self) -> u64 {
        (self.end.offset - self.start.offset).saturating_add(1)
    }

    /// Ranges always cover at least one unit.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `addr` falls inside the range.
    pub fn contains(&self, addr: Address) -> bool {
        addr.space == self.start.space
            && addr.offset >= self.start.offset
            && addr.offset <= self.end.offset
    }

    /// Whether the two ranges share at least one address.
    pub fn intersects(&self, other: &AddressRange) -> bool {
        self.space() == other.space()
            && self.start.offset <= other.end.offset
            && other.start.offset <= self.end.offset
    }

    /// Common sub-range, if any.
    pub fn intersection(&self, other: &AddressRange) -> Option<AddressRange> {
        if !self.intersects(other) {
            return None;
        }
        Some(AddressRange {
            start: Address::new(self.space(), self.start.offset.max(other.start.offset)),
            end: Address::new(self.space(), self.end.offset.min(other.end.offset)),
        })
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Name of the default loaded space.
pub const RAM_SPACE_NAME: &str = "ram";
/// Name of the non-loaded space.
pub const OTHER_SPACE_NAME: &str = "OTHER";

/// The set of address spaces known to a program.
#[derive(Debug, Clone)]
pub struct AddressFactory {
    spaces: Vec<AddressSpace>,
    default_space: SpaceId,
}

impl AddressFactory {
    /// Create a factory with a `ram` space of the given width and an
    /// `OTHER` space for non-loaded data.
    pub fn new(size_bits: u32, endian: Endian) -> Self {
        let ram = AddressSpace::new(SpaceId(0), RAM_SPACE_NAME, size_bits, 1, endian, SpaceKind::Ram);
        let other = AddressSpace::new(SpaceId(1), OTHER_SPACE_NAME, 64, 1, endian, SpaceKind::Other);
        Self {
            spaces: alloc::vec![ram, other],
            default_space: SpaceId(0),
        }
    }

    /// The default loaded space.
    pub fn default_space(&self) -> &AddressSpace {
        // default_space is always an index produced by `new`
        &self.spaces[self.default_space.0 as usize]
    }

    /// Address in the default space.
    pub fn default_address(&self, offset: u64) -> Result<Address, MemoryError> {
        self.default_space().address(offset)
    }

    /// Look up a space by id.
    pub fn space(&self, id: SpaceId) -> Option<&AddressSpace> {
        self.spaces.get(id.0 as usize)
    }

    /// Look up a space by name.
    pub fn space_named(&self, name: &str) -> Option<&AddressSpace> {
        self.spaces.iter().find(|s| s.name == name)
    }

    /// Whether `name` is the name of any space.
    pub fn is_space_name(&self, name: &str) -> bool {
        self.space_named(name).is_some()
    }

    /// All spaces in id order.
    pub fn spaces(&self) -> &[AddressSpace] {
        &self.spaces
    }

    /// Register an overlay space named `name` over `base`.
    pub fn add_overlay(&mut self, name: &str, base: SpaceId) -> Result<SpaceId, MemoryError> {
        if self.is_space_name(name) {
            return Err(MemoryError::InvalidName(name.to_string()));
        }
        let base_space = self.space(base).ok_or(MemoryError::InvalidArgument("unknown base space"))?;
        if base_space.is_overlay() {
            return Err(MemoryError::Unsupported("overlay of an overlay space"));
        }
        let id = u16::try_from(self.spaces.len())
            .map(SpaceId)
            .map_err(|_| MemoryError::InvalidArgument("too many address spaces"))?;
        let space = AddressSpace::new(
            id,
            name,
            base_space.size_bits,
            base_space.unit_size,
            base_space.endian,
            SpaceKind::Overlay { base },
        );
        self.spaces.push(space);
        log::debug!("[marrow/memory] added overlay space {} over {:?}", name, base);
        Ok(id)
    }
}
