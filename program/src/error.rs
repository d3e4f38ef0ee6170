//! Error types for the program model.

use alloc::string::String;

use crate::address::{Address, AddressRange};

/// Memory and block errors.
///
/// `OutOfRange` and `Uninitialized` are deliberately distinct: the first
/// means the address is not in the block at all, the second means it is but
/// no byte was ever assigned there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Address is not inside the addressed block.
    #[error("address {address} is not in block {block}")]
    OutOfRange { block: String, address: Address },
    /// Address is inside a block but holds no defined byte.
    #[error("uninitialized byte at {address}")]
    Uninitialized { address: Address },
    /// Name fails validation or collides with an address space name.
    #[error("invalid block name: {0:?}")]
    InvalidName(String),
    /// Another block already uses this name.
    #[error("block name already in use: {0}")]
    DuplicateName(String),
    /// New or moved block would overlap an existing one.
    #[error("range {0} overlaps an existing block")]
    Overlap(AddressRange),
    /// A memory-level transfer would run past the end of its block.
    #[error("access of {len} bytes at {address} crosses the end of block {block}")]
    CrossBlock {
        block: String,
        address: Address,
        len: usize,
    },
    /// Range spans spaces or has start after end.
    #[error("invalid address range")]
    InvalidRange,
    /// Offset/length does not fit the caller's buffer.
    #[error("buffer index out of bounds: offset {offset}, length {len}, buffer {buffer}")]
    IndexOutOfBounds {
        offset: usize,
        len: usize,
        buffer: usize,
    },
    /// No block contains the address.
    #[error("no memory block at {0}")]
    NoMemory(Address),
    /// Overlay block mutated without exclusive checkout.
    #[error("exclusive access required to modify overlay block {0}")]
    Lock(String),
    /// Named block does not exist.
    #[error("memory block not found: {0}")]
    NotFound(String),
    /// Operation does not apply to this kind of block.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// Offset arithmetic left the address space.
    #[error("address overflow")]
    AddressOverflow,
    /// Other argument validation failure.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Register context errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// A different value is already fixed over part of the range.
    #[error("conflicting {register} value in committed range {range}")]
    Conflict {
        register: String,
        range: AddressRange,
    },
    /// Register is not defined by the program's language.
    #[error("unknown register: {0}")]
    UnknownRegister(String),
    /// Value has bits set beyond the register width.
    #[error("value {value:#x} does not fit register {register}")]
    ValueTooWide { register: String, value: u64 },
    /// Range spans spaces or has start after end.
    #[error("invalid address range")]
    InvalidRange,
}
