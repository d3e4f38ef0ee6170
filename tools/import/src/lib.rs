//! marrow-import: load an ELF file into a fresh program and report what the
//! loader created.

pub mod cli;
pub mod config;
pub mod error;
pub mod logger;
pub mod output;
pub mod report;

use std::path::Path;

use marrow_elf::ElfHeader;
use marrow_loader::{load_elf, resolve_language, LoaderOptions, NoCancel, NoDefaultPass};
use marrow_program::{Checkout, Program};

use crate::error::ImportError;
use crate::report::ImportReport;

/// Read `path`, load it with `options` and collect the report.
pub fn import_file(path: &Path, options: &LoaderOptions) -> Result<ImportReport, ImportError> {
    let bytes = std::fs::read(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    import_bytes(&name, &bytes, options)
}

/// Load an in-memory ELF image named `name`.
pub fn import_bytes(name: &str, bytes: &[u8], options: &LoaderOptions) -> Result<ImportReport, ImportError> {
    let header = ElfHeader::parse(bytes)?;
    let language = resolve_language(&header, options)?;
    log::info!("importing {} as {}", name, language.id());

    let checkout = if options.exclusive_checkout {
        Checkout::Exclusive
    } else {
        Checkout::Shared
    };
    let program = Program::new(name, language, checkout);
    let load = load_elf(&program, &header, options, &mut NoDefaultPass, &NoCancel)?;
    let db = program.read();
    Ok(ImportReport::new(name, &db, load))
}
