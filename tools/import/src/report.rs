//! Import report.

use std::fmt;

use marrow_loader::x86::GOT_BASE_REGISTER;
use marrow_loader::{ExtensionKind, LoadReport, PassOutcome};
use marrow_program::{AddressRange, MemoryBlock, MemoryBlockType, ProgramDb};
use serde::Serialize;

/// One memory block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    pub name: String,
    pub space: String,
    pub start: u64,
    pub end: u64,
    pub size: u64,
    /// `rwxv` with `-` for unset flags.
    pub permissions: String,
    pub kind: String,
    pub initialized: bool,
}

impl BlockSummary {
    fn new(db: &ProgramDb, block: &MemoryBlock) -> Self {
        let flag = |set: bool, c: char| if set { c } else { '-' };
        let permissions = [
            flag(block.is_read(), 'r'),
            flag(block.is_write(), 'w'),
            flag(block.is_execute(), 'x'),
            flag(block.is_volatile(), 'v'),
        ]
        .iter()
        .collect();
        let kind = match block.block_type() {
            MemoryBlockType::Default => "default",
            MemoryBlockType::BitMapped => "bit-mapped",
            MemoryBlockType::ByteMapped => "byte-mapped",
        };
        Self {
            name: block.name().to_string(),
            space: space_name(db, &block.range()),
            start: block.start().offset(),
            end: block.end().offset(),
            size: block.size(),
            permissions,
            kind: kind.to_string(),
            initialized: block.is_initialized(),
        }
    }
}

/// A register value over an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterRange {
    pub space: String,
    pub start: u64,
    pub end: u64,
    pub value: u64,
}

/// Everything marrow-import prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub file: String,
    pub language: String,
    pub image_base: u64,
    pub extension: Option<ExtensionKind>,
    pub outcome: PassOutcome,
    pub blocks: Vec<BlockSummary>,
    pub register: &'static str,
    pub register_ranges: Vec<RegisterRange>,
    pub messages: Vec<String>,
}

impl ImportReport {
    /// Collect the report from a loaded program.
    pub fn new(file: &str, db: &ProgramDb, load: LoadReport) -> Self {
        let blocks = db
            .memory()
            .blocks()
            .map(|block| BlockSummary::new(db, &block))
            .collect();
        let register_ranges = db
            .context()
            .value_ranges(GOT_BASE_REGISTER)
            .into_iter()
            .map(|(range, value)| RegisterRange {
                space: space_name(db, &range),
                start: range.start().offset(),
                end: range.end().offset(),
                value,
            })
            .collect();
        Self {
            file: file.to_string(),
            language: db.language().id().to_string(),
            image_base: db.image_base(),
            extension: load.extension,
            outcome: load.outcome,
            blocks,
            register: GOT_BASE_REGISTER,
            register_ranges,
            messages: load.messages,
        }
    }
}

fn space_name(db: &ProgramDb, range: &AddressRange) -> String {
    db.memory()
        .address_factory()
        .space(range.space())
        .map(|s| s.name().to_string())
        .unwrap_or_default()
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({})", self.file, self.language)?;
        writeln!(f, "image base: {:#x}", self.image_base)?;
        match self.extension {
            Some(kind) => writeln!(f, "extension:  {:?} ({:?})", kind, self.outcome)?,
            None => writeln!(f, "extension:  none")?,
        }

        writeln!(f, "\nblocks ({}):", self.blocks.len())?;
        for b in &self.blocks {
            writeln!(
                f,
                "  {:<20} {}:{:08x}-{:08x} {:>8} {} {}{}",
                b.name,
                b.space,
                b.start,
                b.end,
                b.size,
                b.permissions,
                b.kind,
                if b.initialized { "" } else { " (uninitialized)" }
            )?;
        }

        writeln!(f, "\n{} ranges ({}):", self.register, self.register_ranges.len())?;
        for r in &self.register_ranges {
            writeln!(f, "  {}:{:08x}-{:08x} = {:#x}", r.space, r.start, r.end, r.value)?;
        }

        if !self.messages.is_empty() {
            writeln!(f, "\nmessages:")?;
            for m in &self.messages {
                writeln!(f, "  {m}")?;
            }
        }
        Ok(())
    }
}
