use std::path::PathBuf;
use std::process::ExitCode;

use marrow_elf::ElfError;
use marrow_loader::LoadError;

/// All errors produced by marrow-import.
///
/// Variants are split into two categories:
/// - **Infrastructure errors** (exit code 2): unreadable files, bad config, output failures
/// - **Operational errors** (exit code 1): the input could not be imported
#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    // ── Infrastructure errors (exit code 2) ──────────────────────────
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Operational errors (exit code 1) ─────────────────────────────
    #[error("malformed ELF: {0}")]
    Elf(#[from] ElfError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),
}

impl ImportError {
    /// Numeric exit code for this error.
    ///
    /// - `2`: infrastructure error (unreadable input, bad config, I/O)
    /// - `1`: operational failure (malformed ELF, fatal load fault)
    pub fn code(&self) -> u8 {
        match self {
            Self::Read { .. }
            | Self::ConfigParse { .. }
            | Self::InvalidLogLevel(_)
            | Self::Io(_)
            | Self::Json(_) => 2,

            Self::Elf(_) | Self::Load(_) => 1,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}
