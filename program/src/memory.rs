//! The memory aggregate.
//!
//! [`Memory`] owns every block of a program, keeps them ordered and
//! non-overlapping per address space, and routes byte access through mapped
//! blocks to whatever default block backs their source addresses.
//!
//! Read access goes through [`BlockRef`]; structural and byte mutation goes
//! through [`BlockMut`] or the `&mut self` methods here, both of which are
//! only reachable from an [`crate::ExclusiveAccess`] guard.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::ops::Deref;
use hashbrown::HashMap;

use crate::address::{Address, AddressFactory, AddressRange, SpaceId};
use crate::block::{
    BlockContent, BlockFlags, BlockId, ByteMappingScheme, ByteStore, MemoryBlock, Provenance,
    SourceInfo,
};
use crate::error::MemoryError;

/// Longest accepted block name.
pub const MAX_NAME_LENGTH: usize = 200;

/// Mapped blocks may view other mapped blocks; chains longer than this are
/// treated as unbacked.
const MAX_MAPPING_DEPTH: usize = 8;

/// All memory blocks of a program.
#[derive(Debug, Clone)]
pub struct Memory {
    factory: AddressFactory,
    blocks: HashMap<BlockId, MemoryBlock>,
    by_start: BTreeMap<(SpaceId, u64), BlockId>,
    by_name: HashMap<String, BlockId>,
    next_id: u32,
    exclusive: bool,
}

impl Memory {
    /// Create empty memory over the given spaces.
    ///
    /// `exclusive` records whether the program is checked out exclusively;
    /// overlay blocks can only be renamed or re-flagged when it is.
    pub fn new(factory: AddressFactory, exclusive: bool) -> Self {
        Self {
            factory,
            blocks: HashMap::new(),
            by_start: BTreeMap::new(),
            by_name: HashMap::new(),
            next_id: 0,
            exclusive,
        }
    }

    /// Address spaces of this program.
    pub fn address_factory(&self) -> &AddressFactory {
        &self.factory
    }

    /// Whether the program is checked out exclusively.
    pub fn has_exclusive_access(&self) -> bool {
        self.exclusive
    }

    pub(crate) fn set_exclusive_access(&mut self, exclusive: bool) {
        self.exclusive = exclusive;
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Block by name. Absence is not an error.
    pub fn block(&self, name: &str) -> Option<BlockRef<'_>> {
        let id = self.by_name.get(name)?;
        self.block_by_id(*id)
    }

    /// Block containing `addr`. Absence is not an error.
    pub fn block_at(&self, addr: Address) -> Option<BlockRef<'_>> {
        let id = self.block_id_at(addr)?;
        self.block_by_id(id)
    }

    /// Block by id.
    pub fn block_by_id(&self, id: BlockId) -> Option<BlockRef<'_>> {
        self.blocks.get(&id).map(|block| BlockRef { memory: self, block })
    }

    /// All blocks ordered by space, then start address.
    pub fn blocks(&self) -> impl Iterator<Item = BlockRef<'_>> + '_ {
        self.by_start
            .values()
            .filter_map(move |id| self.block_by_id(*id))
    }

    /// Whether `addr` falls in the reserved `EXTERNAL` block.
    pub fn is_external_block_address(&self, addr: Address) -> bool {
        self.block_at(addr).is_some_and(|b| b.is_external_block())
    }

    /// Mutable handle on a named block.
    pub fn block_mut(&mut self, name: &str) -> Option<BlockMut<'_>> {
        let id = *self.by_name.get(name)?;
        Some(BlockMut { memory: self, id })
    }

    /// Mutable handle on the block containing `addr`.
    pub fn block_mut_at(&mut self, addr: Address) -> Option<BlockMut<'_>> {
        let id = self.block_id_at(addr)?;
        Some(BlockMut { memory: self, id })
    }

    // ── Memory-level byte access ─────────────────────────────────────

    /// Byte at `addr` in whichever block contains it.
    pub fn get_byte(&self, addr: Address) -> Result<u8, MemoryError> {
        let id = self.block_id_at(addr).ok_or(MemoryError::NoMemory(addr))?;
        self.read_byte(id, addr, 0)
    }

    /// Fill `buf` from `addr`. The whole transfer must lie in one block.
    pub fn get_bytes(&self, addr: Address, buf: &mut [u8]) -> Result<(), MemoryError> {
        let block = self.block_at(addr).ok_or(MemoryError::NoMemory(addr))?;
        Self::check_fits(&block, addr, buf.len())?;
        block.get_bytes(addr, buf).map(|_| ())
    }

    /// Store one byte at `addr`.
    pub fn put_byte(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        let id = self.block_id_at(addr).ok_or(MemoryError::NoMemory(addr))?;
        self.write_byte(id, addr, value, 0)
    }

    /// Store `bytes` at `addr`. The whole transfer must lie in one block.
    pub fn put_bytes(&mut self, addr: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let mut block = self.block_mut_at(addr).ok_or(MemoryError::NoMemory(addr))?;
        Self::check_fits(block.block(), addr, bytes.len())?;
        block.put_bytes(addr, bytes).map(|_| ())
    }

    fn check_fits(block: &MemoryBlock, addr: Address, len: usize) -> Result<(), MemoryError> {
        let remaining = block.end().offset() - addr.offset();
        if len > 0 && (len - 1) as u64 > remaining {
            return Err(MemoryError::CrossBlock {
                block: block.name().to_string(),
                address: addr,
                len,
            });
        }
        Ok(())
    }

    // ── Block creation and management ────────────────────────────────

    /// Create a default block holding `bytes`.
    pub fn create_initialized_block(
        &mut self,
        name: &str,
        start: Address,
        bytes: Vec<u8>,
        provenance: Provenance,
    ) -> Result<BlockId, MemoryError> {
        let range = AddressRange::from_len(start, bytes.len() as u64)?;
        self.insert_block(name, range, BlockContent::Owned(ByteStore::initialized(bytes)), provenance)
    }

    /// Create a default block of `len` bytes, none of them defined yet.
    pub fn create_uninitialized_block(
        &mut self,
        name: &str,
        start: Address,
        len: u64,
        provenance: Provenance,
    ) -> Result<BlockId, MemoryError> {
        let range = AddressRange::from_len(start, len)?;
        let len = usize::try_from(len).map_err(|_| MemoryError::InvalidArgument("block too large"))?;
        self.insert_block(name, range, BlockContent::Owned(ByteStore::uninitialized(len)), provenance)
    }

    /// Create a block whose bytes view the bits starting at `source`.
    pub fn create_bit_mapped_block(
        &mut self,
        name: &str,
        start: Address,
        source: Address,
        len: u64,
    ) -> Result<BlockId, MemoryError> {
        let range = AddressRange::from_len(start, len)?;
        self.check_mapping_source(source)?;
        self.insert_block(
            name,
            range,
            BlockContent::BitMapped { source },
            Provenance::BitMapped { source },
        )
    }

    /// Create a block whose bytes view the bytes starting at `source`.
    pub fn create_byte_mapped_block(
        &mut self,
        name: &str,
        start: Address,
        source: Address,
        len: u64,
        scheme: ByteMappingScheme,
    ) -> Result<BlockId, MemoryError> {
        let range = AddressRange::from_len(start, len)?;
        self.check_mapping_source(source)?;
        self.insert_block(
            name,
            range,
            BlockContent::ByteMapped { source, scheme },
            Provenance::ByteMapped { source, scheme },
        )
    }

    /// Create an initialized block in a new overlay space named `space_name`
    /// laid over the space of `start`.
    pub fn create_overlay_block(
        &mut self,
        name: &str,
        space_name: &str,
        start: Address,
        bytes: Vec<u8>,
        provenance: Provenance,
    ) -> Result<BlockId, MemoryError> {
        self.validate_name(name, None)?;
        if name == space_name {
            return Err(MemoryError::InvalidName(name.to_string()));
        }
        // the overlay space copies the base space's bounds
        let range = AddressRange::from_len(start, bytes.len() as u64)?;
        self.check_space_bounds(&range)?;
        let overlay = self.factory.add_overlay(space_name, start.space())?;
        let start = Address::new(overlay, start.offset());
        self.create_initialized_block(name, start, bytes, provenance)
    }

    /// Remove a block. Mapped blocks viewing it become unbacked.
    pub fn remove_block(&mut self, name: &str) -> Result<MemoryBlock, MemoryError> {
        let id = self
            .by_name
            .remove(name)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        let block = self
            .blocks
            .remove(&id)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        self.by_start.remove(&(block.range.space(), block.range.start().offset()));
        log::debug!("[marrow/memory] removed block {} {}", block.name, block.range);
        Ok(block)
    }

    /// Split a default block at `at`; the tail becomes `<name>.split`.
    pub fn split(&mut self, name: &str, at: Address) -> Result<BlockId, MemoryError> {
        let id = *self
            .by_name
            .get(name)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        let tail_name = alloc::format!("{}.split", name);
        self.validate_name(&tail_name, None)?;

        let block = self
            .blocks
            .get_mut(&id)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        if at.space() != block.range.space() || at.offset() <= block.start().offset() || at.offset() > block.end().offset() {
            return Err(MemoryError::InvalidArgument("split address must be inside the block, after its start"));
        }
        let head_len = (at.offset() - block.start().offset()) as usize;
        let store = match &mut block.content {
            BlockContent::Owned(store) => store,
            _ => return Err(MemoryError::Unsupported("split of a mapped block")),
        };
        let tail_store = store.split_off(head_len);

        let tail_range = AddressRange::new(at, block.end())?;
        block.range = AddressRange::new(block.start(), Address::new(at.space(), at.offset() - 1))?;

        let mut head_sources = Vec::new();
        let mut tail_sources = Vec::new();
        for info in block.sources.drain(..) {
            if info.range().end().offset() < at.offset() {
                head_sources.push(info);
            } else if info.range().start().offset() >= at.offset() {
                tail_sources.push(info);
            } else {
                let (head, tail) = info.split_at(at);
                head_sources.push(head);
                tail_sources.push(tail);
            }
        }
        block.sources = head_sources;

        let tail = MemoryBlock {
            id: BlockId(0),
            name: tail_name,
            range: tail_range,
            flags: block.flags,
            comment: block.comment.clone(),
            source_name: block.source_name.clone(),
            overlay: block.overlay,
            loaded: block.loaded,
            content: BlockContent::Owned(tail_store),
            sources: tail_sources,
        };
        log::debug!("[marrow/memory] split {} at {}", name, at);
        Ok(self.register(tail))
    }

    /// Merge `second` into `first`. The blocks must be adjacent default
    /// blocks; `second`'s identity ends and its sources move to `first`.
    pub fn join(&mut self, first: &str, second: &str) -> Result<BlockId, MemoryError> {
        let first_id = *self
            .by_name
            .get(first)
            .ok_or_else(|| MemoryError::NotFound(first.to_string()))?;
        let second_id = *self
            .by_name
            .get(second)
            .ok_or_else(|| MemoryError::NotFound(second.to_string()))?;
        if first_id == second_id {
            return Err(MemoryError::InvalidArgument("cannot join a block with itself"));
        }
        {
            let a = &self.blocks[&first_id];
            let b = &self.blocks[&second_id];
            if a.is_mapped() || b.is_mapped() {
                return Err(MemoryError::Unsupported("join of a mapped block"));
            }
            let adjacent = a.range.space() == b.range.space()
                && a.end().offset().checked_add(1) == Some(b.start().offset());
            if !adjacent {
                return Err(MemoryError::InvalidArgument("blocks are not adjacent"));
            }
        }
        let absorbed = self.remove_block(second)?;
        let survivor = self
            .blocks
            .get_mut(&first_id)
            .ok_or_else(|| MemoryError::NotFound(first.to_string()))?;
        if let (BlockContent::Owned(store), BlockContent::Owned(other)) =
            (&mut survivor.content, &absorbed.content)
        {
            store.append(other);
        }
        survivor.range = AddressRange::new(survivor.start(), absorbed.end())?;
        survivor.sources.extend(absorbed.sources);
        log::debug!("[marrow/memory] joined {} into {}", second, first);
        Ok(first_id)
    }

    /// Move a default block so that it starts at `new_start` (same space).
    pub fn move_block(&mut self, name: &str, new_start: Address) -> Result<(), MemoryError> {
        let id = *self
            .by_name
            .get(name)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        let (old_range, mapped) = {
            let b = &self.blocks[&id];
            (b.range, b.is_mapped())
        };
        if mapped {
            return Err(MemoryError::Unsupported("move of a mapped block"));
        }
        if new_start.space() != old_range.space() {
            return Err(MemoryError::InvalidArgument("move must stay in the same space"));
        }
        let new_range = AddressRange::from_len(new_start, old_range.len())?;
        self.check_space_bounds(&new_range)?;
        self.check_free(&new_range, Some(id))?;

        self.by_start.remove(&(old_range.space(), old_range.start().offset()));
        let block = self
            .blocks
            .get_mut(&id)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))?;
        let sources = block
            .sources
            .iter()
            .map(|s| s.rebased(old_range.start(), new_start))
            .collect::<Option<Vec<_>>>()
            .ok_or(MemoryError::AddressOverflow)?;
        block.sources = sources;
        block.range = new_range;
        self.by_start.insert((new_range.space(), new_start.offset()), id);
        log::debug!("[marrow/memory] moved {} from {} to {}", name, old_range, new_range);
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    fn block_id_at(&self, addr: Address) -> Option<BlockId> {
        let (_, id) = self
            .by_start
            .range(..=(addr.space(), addr.offset()))
            .next_back()?;
        let block = self.blocks.get(id)?;
        if block.contains(addr) {
            Some(*id)
        } else {
            None
        }
    }

    fn insert_block(
        &mut self,
        name: &str,
        range: AddressRange,
        content: BlockContent,
        provenance: Provenance,
    ) -> Result<BlockId, MemoryError> {
        self.validate_name(name, None)?;
        self.check_space_bounds(&range)?;
        self.check_free(&range, None)?;
        let space = self
            .factory
            .space(range.space())
            .ok_or(MemoryError::InvalidArgument("unknown address space"))?;
        let block = MemoryBlock {
            id: BlockId(0),
            name: name.to_string(),
            range,
            flags: BlockFlags::READ,
            comment: String::new(),
            source_name: String::new(),
            overlay: space.is_overlay(),
            loaded: space.is_loaded(),
            content,
            sources: alloc::vec![SourceInfo::new(range, provenance)],
        };
        log::debug!("[marrow/memory] created block {} {}", name, range);
        Ok(self.register(block))
    }

    fn register(&mut self, mut block: MemoryBlock) -> BlockId {
        let id = BlockId(self.next_id);
        self.next_id += 1;
        block.id = id;
        self.by_start
            .insert((block.range.space(), block.range.start().offset()), id);
        self.by_name.insert(block.name.clone(), id);
        self.blocks.insert(id, block);
        id
    }

    fn check_space_bounds(&self, range: &AddressRange) -> Result<(), MemoryError> {
        let space = self
            .factory
            .space(range.space())
            .ok_or(MemoryError::InvalidArgument("unknown address space"))?;
        if range.end().offset() > space.max_offset() {
            return Err(MemoryError::AddressOverflow);
        }
        Ok(())
    }

    fn check_free(&self, range: &AddressRange, ignore: Option<BlockId>) -> Result<(), MemoryError> {
        let space = range.space();
        // Only the last block starting at or before `end` can reach back into
        // the range, plus every block starting inside it.
        let candidates = self
            .by_start
            .range((space, 0)..=(space, range.end().offset()))
            .rev();
        for (&(_, start), id) in candidates {
            if Some(*id) == ignore {
                continue;
            }
            if let Some(block) = self.blocks.get(id) {
                if block.range.intersects(range) {
                    return Err(MemoryError::Overlap(*range));
                }
            }
            if start < range.start().offset() {
                break;
            }
        }
        Ok(())
    }

    fn validate_name(&self, name: &str, ignore: Option<BlockId>) -> Result<(), MemoryError> {
        let valid = !name.is_empty()
            && name.chars().count() <= MAX_NAME_LENGTH
            && !name.chars().any(|c| c.is_whitespace() || c.is_control());
        if !valid || self.factory.is_space_name(name) {
            return Err(MemoryError::InvalidName(name.to_string()));
        }
        match self.by_name.get(name) {
            Some(id) if Some(*id) != ignore => Err(MemoryError::DuplicateName(name.to_string())),
            _ => Ok(()),
        }
    }

    fn check_mapping_source(&self, source: Address) -> Result<(), MemoryError> {
        if self.factory.space(source.space()).is_none() {
            return Err(MemoryError::InvalidArgument("mapping source in unknown space"));
        }
        Ok(())
    }

    /// Resolve a mapped address to the address that actually stores it.
    /// Returns the source address and, for bit-mapped blocks, the bit index.
    fn mapped_target(block: &MemoryBlock, index: u64) -> Option<(Address, Option<u8>)> {
        match block.content {
            BlockContent::Owned(_) => None,
            BlockContent::BitMapped { source } => {
                let addr = source.checked_add(index / 8)?;
                Some((addr, Some((index % 8) as u8)))
            }
            BlockContent::ByteMapped { source, scheme } => {
                let addr = source.checked_add(scheme.source_offset(index)?)?;
                Some((addr, None))
            }
        }
    }

    fn read_byte(&self, id: BlockId, addr: Address, depth: usize) -> Result<u8, MemoryError> {
        let block = self.blocks.get(&id).ok_or(MemoryError::NoMemory(addr))?;
        let index = block.index_of(addr)?;
        if let BlockContent::Owned(store) = &block.content {
            return store
                .get(index as usize)
                .ok_or(MemoryError::Uninitialized { address: addr });
        }
        let (source, bit) = Self::mapped_target(block, index).ok_or(MemoryError::AddressOverflow)?;
        let source_id = match self.block_id_at(source) {
            Some(sid) if depth < MAX_MAPPING_DEPTH && sid != id => sid,
            _ => return Err(MemoryError::Uninitialized { address: source }),
        };
        let byte = self.read_byte(source_id, source, depth + 1)?;
        Ok(match bit {
            Some(bit) => (byte >> bit) & 1,
            None => byte,
        })
    }

    fn write_byte(&mut self, id: BlockId, addr: Address, value: u8, depth: usize) -> Result<(), MemoryError> {
        let block = self.blocks.get(&id).ok_or(MemoryError::NoMemory(addr))?;
        let index = block.index_of(addr)?;
        if !block.is_mapped() {
            if let Some(BlockContent::Owned(store)) = self.blocks.get_mut(&id).map(|b| &mut b.content) {
                store.set(index as usize, value);
            }
            return Ok(());
        }
        let (source, bit) = Self::mapped_target(block, index).ok_or(MemoryError::AddressOverflow)?;
        let source_id = match self.block_id_at(source) {
            Some(sid) if depth < MAX_MAPPING_DEPTH && sid != id => sid,
            _ => return Err(MemoryError::Uninitialized { address: source }),
        };
        let stored = match bit {
            Some(bit) => {
                let current = self.read_byte(source_id, source, depth + 1)?;
                if value != 0 {
                    current | (1 << bit)
                } else {
                    current & !(1 << bit)
                }
            }
            None => value,
        };
        self.write_byte(source_id, source, stored, depth + 1)
    }

    fn transfer_span(
        block: &MemoryBlock,
        addr: Address,
        buffer: usize,
        offset: usize,
        len: usize,
    ) -> Result<usize, MemoryError> {
        if offset.checked_add(len).map_or(true, |end| end > buffer) {
            return Err(MemoryError::IndexOutOfBounds { offset, len, buffer });
        }
        let index = block.index_of(addr)?;
        let remaining = block.size() - index;
        Ok(usize::try_from(remaining).map_or(len, |r| r.min(len)))
    }
}

/// Read-only view of a block with byte access.
#[derive(Debug, Clone, Copy)]
pub struct BlockRef<'m> {
    memory: &'m Memory,
    block: &'m MemoryBlock,
}

impl<'m> BlockRef<'m> {
    /// Underlying block metadata.
    pub fn block(&self) -> &'m MemoryBlock {
        self.block
    }

    /// Byte at `addr`.
    pub fn get_byte(&self, addr: Address) -> Result<u8, MemoryError> {
        self.memory.read_byte(self.block.id, addr, 0)
    }

    /// Fill `buf` from `addr`; returns how many bytes were copied, which is
    /// short only when the block ends first.
    pub fn get_bytes(&self, addr: Address, buf: &mut [u8]) -> Result<usize, MemoryError> {
        let len = buf.len();
        self.get_bytes_into(addr, buf, 0, len)
    }

    /// Copy up to `len` bytes from `addr` into `buf[offset..]`.
    pub fn get_bytes_into(
        &self,
        addr: Address,
        buf: &mut [u8],
        offset: usize,
        len: usize,
    ) -> Result<usize, MemoryError> {
        let count = Memory::transfer_span(self.block, addr, buf.len(), offset, len)?;
        for i in 0..count {
            let a = Address::new(addr.space(), addr.offset() + i as u64);
            buf[offset + i] = self.memory.read_byte(self.block.id, a, 0)?;
        }
        Ok(count)
    }
}

impl Deref for BlockRef<'_> {
    type Target = MemoryBlock;

    fn deref(&self) -> &MemoryBlock {
        self.block
    }
}

/// Mutable handle on one block.
#[derive(Debug)]
pub struct BlockMut<'m> {
    memory: &'m mut Memory,
    id: BlockId,
}

impl BlockMut<'_> {
    /// Underlying block metadata.
    pub fn block(&self) -> &MemoryBlock {
        // the handle is only created for a registered id and the memory is
        // mutably borrowed for its lifetime
        &self.memory.blocks[&self.id]
    }

    fn update(&mut self, f: impl FnOnce(&mut MemoryBlock)) {
        if let Some(block) = self.memory.blocks.get_mut(&self.id) {
            f(block);
        }
    }

    fn check_lock(&self) -> Result<(), MemoryError> {
        let block = self.block();
        if block.is_overlay() && !self.memory.exclusive {
            return Err(MemoryError::Lock(block.name().to_string()));
        }
        Ok(())
    }

    /// Rename the block.
    pub fn set_name(&mut self, name: &str) -> Result<(), MemoryError> {
        self.memory.validate_name(name, Some(self.id))?;
        self.check_lock()?;
        let old = self.block().name.clone();
        self.update(|b| b.name = name.to_string());
        self.memory.by_name.remove(&old);
        self.memory.by_name.insert(name.to_string(), self.id);
        log::debug!("[marrow/memory] renamed block {} to {}", old, name);
        Ok(())
    }

    /// Set the comment.
    pub fn set_comment(&mut self, comment: &str) {
        self.update(|b| b.comment = comment.to_string());
    }

    /// Set the source name.
    pub fn set_source_name(&mut self, source_name: &str) {
        self.update(|b| b.source_name = source_name.to_string());
    }

    fn set_flag(&mut self, flag: BlockFlags, enabled: bool) -> Result<(), MemoryError> {
        self.check_lock()?;
        self.update(|b| b.set_flag(flag, enabled));
        Ok(())
    }

    /// Toggle read permission.
    pub fn set_read(&mut self, r: bool) -> Result<(), MemoryError> {
        self.set_flag(BlockFlags::READ, r)
    }

    /// Toggle write permission.
    pub fn set_write(&mut self, w: bool) -> Result<(), MemoryError> {
        self.set_flag(BlockFlags::WRITE, w)
    }

    /// Toggle execute permission.
    pub fn set_execute(&mut self, e: bool) -> Result<(), MemoryError> {
        self.set_flag(BlockFlags::EXECUTE, e)
    }

    /// Toggle the volatile attribute.
    pub fn set_volatile(&mut self, v: bool) -> Result<(), MemoryError> {
        self.set_flag(BlockFlags::VOLATILE, v)
    }

    /// Toggle the artificial attribute.
    pub fn set_artificial(&mut self, a: bool) -> Result<(), MemoryError> {
        self.set_flag(BlockFlags::ARTIFICIAL, a)
    }

    /// Set read, write and execute together.
    pub fn set_permissions(&mut self, read: bool, write: bool, execute: bool) -> Result<(), MemoryError> {
        self.check_lock()?;
        self.update(|b| {
            b.set_flag(BlockFlags::READ, read);
            b.set_flag(BlockFlags::WRITE, write);
            b.set_flag(BlockFlags::EXECUTE, execute);
        });
        Ok(())
    }

    /// Byte at `addr`.
    pub fn get_byte(&self, addr: Address) -> Result<u8, MemoryError> {
        self.memory.read_byte(self.id, addr, 0)
    }

    /// Store one byte.
    pub fn put_byte(&mut self, addr: Address, value: u8) -> Result<(), MemoryError> {
        self.memory.write_byte(self.id, addr, value, 0)
    }

    /// Store `bytes` from `addr`; returns how many were written, which is
    /// short only when the block ends first.
    pub fn put_bytes(&mut self, addr: Address, bytes: &[u8]) -> Result<usize, MemoryError> {
        self.put_bytes_from(addr, bytes, 0, bytes.len())
    }

    /// Store up to `len` bytes of `bytes[offset..]` at `addr`.
    pub fn put_bytes_from(
        &mut self,
        addr: Address,
        bytes: &[u8],
        offset: usize,
        len: usize,
    ) -> Result<usize, MemoryError> {
        let count = Memory::transfer_span(self.block(), addr, bytes.len(), offset, len)?;
        for i in 0..count {
            let a = Address::new(addr.space(), addr.offset() + i as u64);
            self.memory.write_byte(self.id, a, bytes[offset + i], 0)?;
        }
        Ok(count)
    }
}

impl Deref for BlockMut<'_> {
    type Target = MemoryBlock;

    fn deref(&self) -> &MemoryBlock {
        self.block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Endian;
    use crate::block::{MemoryBlockType, EXTERNAL_BLOCK_NAME};

    fn memory() -> Memory {
        Memory::new(AddressFactory::new(32, Endian::Little), true)
    }

    fn ram(offset: u64) -> Address {
        Address::new(SpaceId(0), offset)
    }

    fn file(name: &str, offset: u64) -> Provenance {
        Provenance::File {
            name: name.into(),
            offset,
        }
    }

    #[test]
    fn test_lookup_by_name_and_address() {
        let mut mem = memory();
        mem.create_initialized_block(".text", ram(0x1000), vec![0x90; 0x100], file("a", 0))
            .unwrap();
        assert_eq!(mem.block(".text").unwrap().start(), ram(0x1000));
        assert_eq!(mem.block_at(ram(0x10ff)).unwrap().name(), ".text");
        assert!(mem.block_at(ram(0x1100)).is_none());
        assert!(mem.block(".data").is_none());
    }

    #[test]
    fn test_get_byte_out_of_range_vs_uninitialized() {
        let mut mem = memory();
        mem.create_uninitialized_block(".bss", ram(0x2000), 0x10, Provenance::Synthetic("bss".into()))
            .unwrap();
        let bss = mem.block(".bss").unwrap();
        assert!(matches!(bss.get_byte(ram(0x1fff)), Err(MemoryError::OutOfRange { .. })));
        assert_eq!(
            bss.get_byte(ram(0x2000)),
            Err(MemoryError::Uninitialized { address: ram(0x2000) })
        );
        assert!(!bss.is_initialized());
    }

    #[test]
    fn test_put_then_get() {
        let mut mem = memory();
        mem.create_uninitialized_block(".bss", ram(0x2000), 4, Provenance::Synthetic("bss".into()))
            .unwrap();
        let mut bss = mem.block_mut(".bss").unwrap();
        assert_eq!(bss.put_bytes(ram(0x2000), &[1, 2, 3, 4, 5, 6]).unwrap(), 4);
        assert!(bss.is_initialized());
        assert_eq!(mem.get_byte(ram(0x2003)).unwrap(), 4);
    }

    #[test]
    fn test_bulk_transfer_truncates_at_block_end() {
        let mut mem = memory();
        mem.create_initialized_block("b", ram(0x100), vec![7; 16], file("a", 0))
            .unwrap();
        let block = mem.block("b").unwrap();
        let mut buf = [0u8; 32];
        assert_eq!(block.get_bytes(ram(0x10c), &mut buf).unwrap(), 4);
        assert_eq!(block.get_bytes_into(ram(0x100), &mut buf, 8, 8).unwrap(), 8);
        assert!(matches!(
            block.get_bytes_into(ram(0x100), &mut buf, 30, 4),
            Err(MemoryError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_memory_level_transfer_rejects_cross_block() {
        let mut mem = memory();
        mem.create_initialized_block("a", ram(0x100), vec![1; 16], file("a", 0))
            .unwrap();
        mem.create_initialized_block("b", ram(0x110), vec![2; 16], file("a", 16))
            .unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            mem.get_bytes(ram(0x10c), &mut buf),
            Err(MemoryError::CrossBlock { .. })
        ));
        mem.get_bytes(ram(0x108), &mut buf).unwrap();
        assert_eq!(buf, [1; 8]);
    }

    #[test]
    fn test_overlap_and_names_rejected() {
        let mut mem = memory();
        mem.create_initialized_block("a", ram(0x100), vec![0; 16], file("a", 0))
            .unwrap();
        assert!(matches!(
            mem.create_initialized_block("b", ram(0x10f), vec![0; 4], file("a", 0)),
            Err(MemoryError::Overlap(_))
        ));
        assert!(matches!(
            mem.create_initialized_block("b", ram(0xf0), vec![0; 0x20], file("a", 0)),
            Err(MemoryError::Overlap(_))
        ));
        assert!(matches!(
            mem.create_initialized_block("a", ram(0x200), vec![0; 4], file("a", 0)),
            Err(MemoryError::DuplicateName(_))
        ));
        assert!(matches!(
            mem.create_initialized_block("ram", ram(0x200), vec![0; 4], file("a", 0)),
            Err(MemoryError::InvalidName(_))
        ));
        assert!(matches!(
            mem.create_initialized_block("has space", ram(0x200), vec![0; 4], file("a", 0)),
            Err(MemoryError::InvalidName(_))
        ));
        mem.create_initialized_block("c", ram(0x110), vec![0; 4], file("a", 0))
            .unwrap();
    }

    #[test]
    fn test_byte_mapped_reads_through_source() {
        let mut mem = memory();
        mem.create_initialized_block("src", ram(0x100), (0u8..16).collect(), file("a", 0))
            .unwrap();
        let scheme = ByteMappingScheme::new(2, 4).unwrap();
        mem.create_byte_mapped_block("view", ram(0x1000), ram(0x100), 8, scheme)
            .unwrap();
        let view = mem.block("view").unwrap();
        assert_eq!(view.block_type(), MemoryBlockType::ByteMapped);
        assert!(!view.is_initialized());
        let mut buf = [0u8; 8];
        assert_eq!(view.get_bytes(ram(0x1000), &mut buf).unwrap(), 8);
        assert_eq!(buf, [0, 1, 4, 5, 8, 9, 12, 13]);
    }

    #[test]
    fn test_byte_mapped_source_past_space_end_overflows() {
        let mut mem = Memory::new(AddressFactory::new(64, Endian::Little), true);
        let scheme = ByteMappingScheme::new(1, 2).unwrap();
        mem.create_byte_mapped_block("view", ram(0x1000), ram(0), u64::MAX - 0x1000, scheme)
            .unwrap();
        assert_eq!(
            mem.get_byte(ram(0x1000 + (1 << 63))),
            Err(MemoryError::AddressOverflow)
        );
    }

    #[test]
    fn test_bit_mapped_reads_and_writes_bits() {
        let mut mem = memory();
        mem.create_initialized_block("src", ram(0x100), vec![0b1000_0001], file("a", 0))
            .unwrap();
        mem.create_bit_mapped_block("bits", ram(0x1000), ram(0x100), 8)
            .unwrap();
        assert_eq!(mem.get_byte(ram(0x1000)).unwrap(), 1);
        assert_eq!(mem.get_byte(ram(0x1001)).unwrap(), 0);
        assert_eq!(mem.get_byte(ram(0x1007)).unwrap(), 1);
        mem.put_byte(ram(0x1001), 1).unwrap();
        assert_eq!(mem.get_byte(ram(0x100)).unwrap(), 0b1000_0011);
        assert!(!mem.block("bits").unwrap().is_initialized());
    }

    #[test]
    fn test_mapped_block_propagates_uninitialized_source() {
        let mut mem = memory();
        mem.create_uninitialized_block("src", ram(0x100), 4, Provenance::Synthetic("x".into()))
            .unwrap();
        mem.create_byte_mapped_block("view", ram(0x1000), ram(0x100), 4, ByteMappingScheme::IDENTITY)
            .unwrap();
        assert_eq!(
            mem.get_byte(ram(0x1000)),
            Err(MemoryError::Uninitialized { address: ram(0x100) })
        );
        // removing the source leaves the view unbacked, not dangling
        mem.remove_block("src").unwrap();
        assert_eq!(
            mem.get_byte(ram(0x1002)),
            Err(MemoryError::Uninitialized { address: ram(0x102) })
        );
    }

    #[test]
    fn test_split_and_join_track_sources() {
        let mut mem = memory();
        mem.create_initialized_block("blk", ram(0x100), (0u8..32).collect(), file("a.out", 0x40))
            .unwrap();
        mem.split("blk", ram(0x110)).unwrap();
        let tail = mem.block("blk.split").unwrap();
        assert_eq!(tail.start(), ram(0x110));
        assert_eq!(tail.source_infos()[0].file_offset(), Some(0x50));
        assert_eq!(tail.get_byte(ram(0x110)).unwrap(), 16);
        assert_eq!(mem.block("blk").unwrap().size(), 16);

        mem.join("blk", "blk.split").unwrap();
        let joined = mem.block("blk").unwrap();
        assert!(mem.block("blk.split").is_none());
        assert_eq!(joined.size(), 32);
        assert_eq!(joined.source_infos().len(), 2);
        assert!(joined.source_infos()[0].range().start() < joined.source_infos()[1].range().start());
        assert_eq!(joined.get_byte(ram(0x11f)).unwrap(), 31);
    }

    #[test]
    fn test_join_requires_adjacency() {
        let mut mem = memory();
        mem.create_initialized_block("a", ram(0x100), vec![0; 4], file("a", 0))
            .unwrap();
        mem.create_initialized_block("b", ram(0x108), vec![0; 4], file("a", 8))
            .unwrap();
        assert!(mem.join("a", "b").is_err());
        assert!(mem.block("b").is_some());
    }

    #[test]
    fn test_move_block() {
        let mut mem = memory();
        mem.create_initialized_block("a", ram(0x100), vec![5; 4], file("a", 0))
            .unwrap();
        mem.create_initialized_block("b", ram(0x200), vec![6; 4], file("a", 4))
            .unwrap();
        assert!(matches!(mem.move_block("a", ram(0x1fe)), Err(MemoryError::Overlap(_))));
        mem.move_block("a", ram(0x300)).unwrap();
        assert_eq!(mem.get_byte(ram(0x303)).unwrap(), 5);
        assert!(mem.block_at(ram(0x100)).is_none());
        assert_eq!(mem.block("a").unwrap().source_infos()[0].range().start(), ram(0x300));
    }

    #[test]
    fn test_overlay_rename_requires_exclusive_access() {
        let mut mem = Memory::new(AddressFactory::new(32, Endian::Little), false);
        mem.create_overlay_block("ov", "ov_space", ram(0x100), vec![0; 4], file("a", 0))
            .unwrap();
        let mut ov = mem.block_mut("ov").unwrap();
        assert!(ov.is_overlay());
        assert_eq!(ov.set_name("ov2"), Err(MemoryError::Lock("ov".into())));
        assert_eq!(ov.set_execute(true), Err(MemoryError::Lock("ov".into())));

        mem.set_exclusive_access(true);
        let mut ov = mem.block_mut("ov").unwrap();
        ov.set_name("ov2").unwrap();
        assert!(mem.block("ov2").is_some());
        assert!(mem.block("ov").is_none());
    }

    #[test]
    fn test_failed_overlay_block_leaves_no_space_behind() {
        let mut mem = memory();
        let spaces = mem.address_factory().spaces().len();
        assert_eq!(
            mem.create_overlay_block("ov", "ov", ram(0x100), vec![0; 4], file("a", 0)),
            Err(MemoryError::InvalidName("ov".into()))
        );
        assert_eq!(
            mem.create_overlay_block("ovblk", "ov", ram(0xffff_fffe), vec![0; 4], file("a", 0)),
            Err(MemoryError::AddressOverflow)
        );
        assert_eq!(
            mem.create_overlay_block("ovblk", "ov", ram(0x100), Vec::new(), file("a", 0)),
            Err(MemoryError::InvalidRange)
        );
        assert_eq!(mem.address_factory().spaces().len(), spaces);

        mem.create_overlay_block("ovblk", "ov", ram(0x100), vec![0; 4], file("a", 0))
            .unwrap();
        assert!(mem.block("ovblk").unwrap().is_overlay());
        assert_eq!(mem.address_factory().spaces().len(), spaces + 1);
    }

    #[test]
    fn test_permission_setters_are_independent() {
        let mut mem = memory();
        mem.create_initialized_block("a", ram(0x100), vec![0; 4], file("a", 0))
            .unwrap();
        let mut a = mem.block_mut("a").unwrap();
        a.set_permissions(true, false, true).unwrap();
        a.set_volatile(true).unwrap();
        a.set_artificial(true).unwrap();
        a.set_write(true).unwrap();
        a.set_volatile(false).unwrap();
        assert_eq!(
            a.flags(),
            BlockFlags::READ | BlockFlags::WRITE | BlockFlags::EXECUTE | BlockFlags::ARTIFICIAL
        );
    }

    #[test]
    fn test_external_block() {
        let mut mem = memory();
        mem.create_uninitialized_block(EXTERNAL_BLOCK_NAME, ram(0x9000), 0x10, Provenance::Synthetic("external".into()))
            .unwrap();
        assert!(mem.is_external_block_address(ram(0x9004)));
        assert!(!mem.is_external_block_address(ram(0x8fff)));
        assert!(mem.block(EXTERNAL_BLOCK_NAME).unwrap().is_external_block());
    }
}
