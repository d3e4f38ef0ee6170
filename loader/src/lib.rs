//! ELF loader extensions for marrow.
//!
//! The loader turns a parsed [`ElfHeader`] into program state:
//!
//! - `helper`: the per-load context extensions run against
//! - `import`: one memory block per allocated section
//! - `extension`: the ordered extension registry and GOT/PLT dispatch
//! - `x86`: the x86 extensions, including the EBX register pass for PLTs
//!
//! [`load_elf`] runs the whole pipeline against a [`Program`].

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod extension;
pub mod helper;
pub mod import;
pub mod messages;
pub mod monitor;
pub mod options;
pub mod x86;

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use marrow_elf::header::{EM_386, EM_X86_64};
use marrow_elf::ElfHeader;
use marrow_program::{Checkout, Language, Program};
use serde::Serialize;

pub use error::LoadError;
pub use extension::{
    DefaultGotPltPass, Dispatch, ElfExtension, ExtensionKind, ExtensionRegistry, NoDefaultPass, PassOutcome,
};
pub use helper::ElfLoadHelper;
pub use import::import_sections;
pub use messages::MessageLog;
pub use monitor::{CancelToken, NoCancel, TaskMonitor};
pub use options::LoaderOptions;

/// Summary of one load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Extension that handled the load, if any.
    pub extension: Option<ExtensionKind>,
    /// Outcome of the specialized GOT/PLT pass.
    pub outcome: PassOutcome,
    /// Section blocks created by the import step.
    pub blocks_created: usize,
    /// Notices logged during the load, in order.
    pub messages: Vec<String>,
}

/// Language implied by the header's machine and class.
pub fn default_language(header: &ElfHeader) -> Result<Language, LoadError> {
    match (header.machine(), header.is_32bit()) {
        (EM_386, true) => Ok(Language::x86_32()),
        (EM_X86_64, false) => Ok(Language::x86_64()),
        (machine, _) => Err(LoadError::UnsupportedLanguage(format!(
            "machine {} ({}-bit)",
            machine,
            header.class().bits()
        ))),
    }
}

/// Language for a load: the configured override if any, else the header's.
pub fn resolve_language(header: &ElfHeader, options: &LoaderOptions) -> Result<Language, LoadError> {
    match &options.language {
        Some(id) => Language::by_id(id).ok_or_else(|| LoadError::UnsupportedLanguage(id.clone())),
        None => default_language(header),
    }
}

/// Load `header` into `program` with the built-in extensions.
///
/// Holds the program's exclusive lock for the duration. An internal fault in
/// GOT/PLT processing abandons that pass only: the report carries
/// [`PassOutcome::Failed`] and the fault message, and blocks and
/// annotations made before it stay.
pub fn load_elf(
    program: &Program,
    header: &ElfHeader,
    options: &LoaderOptions,
    default_pass: &mut dyn DefaultGotPltPass,
    monitor: &dyn TaskMonitor,
) -> Result<LoadReport, LoadError> {
    load_elf_with(ExtensionRegistry::builtin(), program, header, options, default_pass, monitor)
}

/// [`load_elf`] with a caller-supplied registry.
pub fn load_elf_with(
    registry: &ExtensionRegistry,
    program: &Program,
    header: &ElfHeader,
    options: &LoaderOptions,
    default_pass: &mut dyn DefaultGotPltPass,
    monitor: &dyn TaskMonitor,
) -> Result<LoadReport, LoadError> {
    let mut access = program.exclusive();
    access.set_image_base(options.image_base.unwrap_or(0));
    access.set_checkout(if options.exclusive_checkout {
        Checkout::Exclusive
    } else {
        Checkout::Shared
    });

    let mut helper = ElfLoadHelper::new(header, access, program.name());
    let blocks_created = if options.create_section_blocks {
        import_sections(&mut helper, options.max_section_size)?
    } else {
        0
    };

    let dispatch = if options.run_extensions {
        match registry.process_got_plt(&mut helper, default_pass, monitor) {
            Ok(dispatch) => dispatch,
            // a faulting pass is abandoned; the load itself goes on
            Err(LoadError::Internal { context }) => {
                helper.log(format!("GOT/PLT processing aborted: {}", context));
                Dispatch {
                    extension: registry.select(&helper).map(|e| e.kind()),
                    outcome: PassOutcome::Failed,
                }
            }
            Err(e) => return Err(e),
        }
    } else {
        Dispatch {
            extension: None,
            outcome: PassOutcome::Skipped,
        }
    };
    log::info!(
        "[marrow/loader] loaded {}: extension {:?}, {:?}",
        program.name(),
        dispatch.extension,
        dispatch.outcome
    );

    Ok(LoadReport {
        extension: dispatch.extension,
        outcome: dispatch.outcome,
        blocks_created,
        messages: helper.into_messages(),
    })
}
