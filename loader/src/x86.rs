//! x86 extensions.
//!
//! 32-bit position-independent code keeps the GOT base in EBX while PLT
//! stubs run. The x86-32 pass records that as a register value over every
//! executable PLT block so analysis can follow `jmp *n(%ebx)` through the
//! GOT without rediscovering the convention at each call site.

use alloc::format;

use marrow_elf::dynamic::ElfDynamicType;
use marrow_elf::header::{EM_386, EM_X86_64};
use marrow_elf::section::PLT_SECTION_NAME;
use marrow_elf::ElfHeader;
use marrow_program::RegisterValue;

use crate::error::LoadError;
use crate::extension::{ElfExtension, ExtensionKind, PassOutcome};
use crate::helper::ElfLoadHelper;
use crate::monitor::TaskMonitor;

/// Data type suffix shared by the x86 extensions.
pub const X86_DATA_TYPE_SUFFIX: &str = "_x86";

/// Register holding the GOT base across PLT stubs.
pub const GOT_BASE_REGISTER: &str = "EBX";

const X86_PROCESSOR: &str = "x86";

/// 32-bit x86 with the PLT register pass.
pub const X86_32: ElfExtension = ElfExtension::new(
    ExtensionKind::X86_32,
    X86_DATA_TYPE_SUFFIX,
    is_x86_32_header,
    is_x86_32_language,
)
.with_got_plt_pass(process_x86_plt_sections);

/// x86-64; the generic pass covers it.
pub const X86_64: ElfExtension = ElfExtension::new(
    ExtensionKind::X86_64,
    X86_DATA_TYPE_SUFFIX,
    is_x86_64_header,
    is_x86_64_language,
);

fn is_x86_32_header(header: &ElfHeader) -> bool {
    header.machine() == EM_386 && header.is_32bit()
}

fn is_x86_32_language(helper: &ElfLoadHelper<'_>) -> bool {
    let language = helper.language();
    language.processor().as_str() == X86_PROCESSOR && language.size() == 32
}

fn is_x86_64_header(header: &ElfHeader) -> bool {
    header.machine() == EM_X86_64 && header.is_64bit()
}

fn is_x86_64_language(helper: &ElfLoadHelper<'_>) -> bool {
    let language = helper.language();
    language.processor().as_str() == X86_PROCESSOR && language.size() == 64
}

/// Paint the resolved `DT_PLTGOT` value into EBX across every executable
/// `.plt` / `.plt.*` block.
///
/// Skips quietly without a dynamic table or `DT_PLTGOT`. A PLT section with
/// no memory block is logged and skipped. Anything else that fails once
/// `DT_PLTGOT` is known to be present is an internal fault.
pub fn process_x86_plt_sections(
    helper: &mut ElfLoadHelper<'_>,
    monitor: &dyn TaskMonitor,
) -> Result<PassOutcome, LoadError> {
    let header = helper.header();
    let Some(dynamic) = header.dynamic_table() else {
        return Ok(PassOutcome::Skipped);
    };
    if !dynamic.contains_tag(ElfDynamicType::DT_PLTGOT) {
        return Ok(PassOutcome::Skipped);
    }

    let raw = dynamic
        .get_value(ElfDynamicType::DT_PLTGOT)
        .map_err(|e| LoadError::internal(format!("DT_PLTGOT present but unreadable: {}", e)))?;
    let got = helper
        .resolve_loaded_address(raw)
        .map_err(|e| LoadError::internal(format!("DT_PLTGOT {:#x} does not resolve: {}", raw, e)))?;
    let register = helper
        .language()
        .register(GOT_BASE_REGISTER)
        .ok_or_else(|| LoadError::internal(format!("language has no {} register", GOT_BASE_REGISTER)))?;
    let value = RegisterValue::new(register, got.offset())
        .map_err(|e| LoadError::internal(format!("GOT base {}: {}", got, e)))?;

    for section in header.sections() {
        if monitor.is_cancelled() {
            log::info!("[marrow/loader] PLT register pass cancelled");
            return Ok(PassOutcome::Cancelled);
        }
        if !section.is_executable() || !section.is_in_group(PLT_SECTION_NAME) {
            continue;
        }
        let name = section.name();
        let Some(range) = helper.program().memory().block(name).map(|b| b.range()) else {
            helper.log(format!("Skipped processing of {}: memory block not found", name));
            continue;
        };
        helper
            .program_mut()
            .context_mut()
            .set_register_value(range.start(), range.end(), &value)
            .map_err(|e| LoadError::internal(format!("setting {} over {} in {}: {}", GOT_BASE_REGISTER, range, name, e)))?;
        log::debug!("[marrow/loader] {} = {} over {} ({})", GOT_BASE_REGISTER, got, range, name);
    }
    Ok(PassOutcome::Completed)
}
