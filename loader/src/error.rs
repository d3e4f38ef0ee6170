//! Loader errors.

use alloc::string::String;
use marrow_elf::ElfError;
use marrow_program::MemoryError;

/// Errors that stop a load step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The ELF file could not be read.
    #[error("ELF error: {0}")]
    Elf(#[from] ElfError),
    /// Block creation or access failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
    /// A precondition established earlier in the pipeline did not hold.
    /// Fatal to the current pass.
    #[error("internal error: {context}")]
    Internal { context: String },
    /// No language is known for this file or override.
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
}

impl LoadError {
    /// Internal-consistency fault with a description of what broke.
    pub fn internal(context: impl Into<String>) -> Self {
        let context = context.into();
        log::error!("[marrow/loader] {}", context);
        Self::Internal { context }
    }
}
