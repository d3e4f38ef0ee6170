//! Programs and access guards.
//!
//! A [`Program`] owns its database behind one coarse `spin::RwLock`.
//! Analysis takes [`ReadAccess`] guards and may run concurrently; a load
//! step takes the single [`ExclusiveAccess`] guard for its whole duration.

use alloc::string::{String, ToString};
use core::ops::{Deref, DerefMut};
use spin::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::address::AddressFactory;
use crate::context::ProgramContext;
use crate::lang::Language;
use crate::memory::Memory;

/// How the program database was checked out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkout {
    /// Sole owner; overlay blocks may be renamed and re-flagged.
    Exclusive,
    /// Shared with other users.
    Shared,
}

/// Everything known about one program.
#[derive(Debug)]
pub struct ProgramDb {
    language: Language,
    memory: Memory,
    context: ProgramContext,
    image_base: u64,
    checkout: Checkout,
}

impl ProgramDb {
    fn new(language: Language, checkout: Checkout) -> Self {
        let factory = AddressFactory::new(language.size(), language.endian());
        Self {
            memory: Memory::new(factory, checkout == Checkout::Exclusive),
            context: ProgramContext::new(&language),
            language,
            image_base: 0,
            checkout,
        }
    }

    /// Instruction set.
    pub fn language(&self) -> &Language {
        &self.language
    }

    /// Memory blocks.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Memory blocks, mutable.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Register context.
    pub fn context(&self) -> &ProgramContext {
        &self.context
    }

    /// Register context, mutable.
    pub fn context_mut(&mut self) -> &mut ProgramContext {
        &mut self.context
    }

    /// Base added to file-relative addresses.
    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    /// Set the image base.
    pub fn set_image_base(&mut self, base: u64) {
        self.image_base = base;
    }

    /// Checkout mode.
    pub fn checkout(&self) -> Checkout {
        self.checkout
    }

    /// Change the checkout mode.
    pub fn set_checkout(&mut self, checkout: Checkout) {
        self.checkout = checkout;
        self.memory
            .set_exclusive_access(checkout == Checkout::Exclusive);
    }
}

/// A program under analysis.
#[derive(Debug)]
pub struct Program {
    name: String,
    db: RwLock<ProgramDb>,
}

impl Program {
    /// Create an empty program.
    pub fn new(name: &str, language: Language, checkout: Checkout) -> Self {
        log::debug!("[marrow/program] created {} ({})", name, language.id());
        Self {
            name: name.to_string(),
            db: RwLock::new(ProgramDb::new(language, checkout)),
        }
    }

    /// Program name, usually the input file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared read access. Spins while a writer holds the program.
    pub fn read(&self) -> ReadAccess<'_> {
        ReadAccess(self.db.read())
    }

    /// Exclusive access for a load step. Spins until all readers are gone.
    pub fn exclusive(&self) -> ExclusiveAccess<'_> {
        ExclusiveAccess(self.db.write())
    }

    /// Exclusive access if nobody else holds the program.
    pub fn try_exclusive(&self) -> Option<ExclusiveAccess<'_>> {
        self.db.try_write().map(ExclusiveAccess)
    }

    /// Consume the program and return its database.
    pub fn into_db(self) -> ProgramDb {
        self.db.into_inner()
    }
}

/// Read guard on a program database.
pub struct ReadAccess<'p>(RwLockReadGuard<'p, ProgramDb>);

impl Deref for ReadAccess<'_> {
    type Target = ProgramDb;

    fn deref(&self) -> &ProgramDb {
        &self.0
    }
}

/// Exclusive guard on a program database. All structural mutation goes
/// through one of these.
pub struct ExclusiveAccess<'p>(RwLockWriteGuard<'p, ProgramDb>);

impl Deref for ExclusiveAccess<'_> {
    type Target = ProgramDb;

    fn deref(&self) -> &ProgramDb {
        &self.0
    }
}

impl DerefMut for ExclusiveAccess<'_> {
    fn deref_mut(&mut self) -> &mut ProgramDb {
        &mut self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Provenance;
    use crate::error::MemoryError;

    #[test]
    fn test_exclusive_blocks_readers() {
        let program = Program::new("a.out", Language::x86_32(), Checkout::Exclusive);
        let guard = program.exclusive();
        assert!(program.db.try_read().is_none());
        assert!(program.try_exclusive().is_none());
        drop(guard);

        let r1 = program.read();
        let r2 = program.read();
        assert_eq!(r1.language().id(), r2.language().id());
        assert!(program.try_exclusive().is_none());
    }

    #[test]
    fn test_memory_sized_from_language() {
        let program = Program::new("a.out", Language::x86_32(), Checkout::Shared);
        let db = program.read();
        assert_eq!(db.memory().address_factory().default_space().max_offset(), 0xffff_ffff);
        assert!(!db.memory().has_exclusive_access());
    }

    #[test]
    fn test_checkout_controls_overlay_rename() {
        let program = Program::new("a.out", Language::x86_32(), Checkout::Shared);
        let mut db = program.exclusive();
        let start = db.memory().address_factory().default_address(0x1000).unwrap();
        db.memory_mut()
            .create_overlay_block("ov", "ov_space", start, vec![0; 4], Provenance::Synthetic("test".into()))
            .unwrap();
        let result = db.memory_mut().block_mut("ov").unwrap().set_name("ov2");
        assert_eq!(result, Err(MemoryError::Lock("ov".into())));

        db.set_checkout(Checkout::Exclusive);
        db.memory_mut().block_mut("ov").unwrap().set_name("ov2").unwrap();
        drop(db);
        assert!(program.into_db().memory().block("ov2").is_some());
    }
}
