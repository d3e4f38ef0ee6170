//! Program model for marrow.
//!
//! This crate holds the state an importer populates and analysis consumes:
//!
//! - `address`: address spaces, addresses and inclusive ranges
//! - `lang`: languages (instruction sets) and their registers
//! - `block`: memory blocks, their flags, kinds and provenance
//! - `memory`: the per-program block aggregate and byte access
//! - `context`: register values painted over address ranges
//! - `program`: the program lifecycle object and its access guards
//!
//! All mutation goes through [`ExclusiveAccess`], the write guard of the
//! program's coarse lock. Readers take [`ReadAccess`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod address;
pub mod block;
pub mod context;
pub mod error;
pub mod lang;
pub mod memory;
pub mod program;

pub use address::{Address, AddressFactory, AddressRange, AddressSpace, Endian, SpaceId, SpaceKind};
pub use block::{
    BlockFlags, BlockId, ByteMappingScheme, MemoryBlock, MemoryBlockType, Provenance, SourceInfo,
    EXTERNAL_BLOCK_NAME,
};
pub use context::{ProgramContext, RegisterValue};
pub use error::{ContextError, MemoryError};
pub use lang::{Language, Processor, Register};
pub use memory::{BlockMut, BlockRef, Memory};
pub use program::{Checkout, ExclusiveAccess, Program, ProgramDb, ReadAccess};
