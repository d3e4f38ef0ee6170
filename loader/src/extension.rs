//! Architecture extension registry and dispatch.
//!
//! An [`ElfExtension`] is a plain descriptor: two predicates, a data type
//! suffix and an optional specialized GOT/PLT pass. Selection walks the
//! registry in order and takes the first extension whose header-level and
//! context-level predicates both accept the load. The generic GOT/PLT pass
//! always runs first; the specialized pass runs after it.

use alloc::vec::Vec;
use marrow_elf::ElfHeader;
use serde::Serialize;
use spin::Lazy;

use crate::error::LoadError;
use crate::helper::ElfLoadHelper;
use crate::monitor::TaskMonitor;
use crate::x86;

/// Which extension was selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExtensionKind {
    /// 32-bit x86
    X86_32,
    /// x86-64
    X86_64,
    /// Registered by the host application.
    Other(&'static str),
}

/// How a GOT/PLT pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassOutcome {
    /// Ran to the end.
    Completed,
    /// Preconditions were not met; nothing was done.
    Skipped,
    /// Stopped at a cancellation checkpoint; earlier work is kept.
    Cancelled,
    /// Aborted by an internal fault; earlier work is kept.
    Failed,
}

/// Header-level predicate.
pub type HeaderPredicate = fn(&ElfHeader) -> bool;

/// Context-level predicate, evaluated against the load in progress.
pub type ContextPredicate = fn(&ElfLoadHelper<'_>) -> bool;

/// Specialized GOT/PLT pass.
pub type GotPltPass = fn(&mut ElfLoadHelper<'_>, &dyn TaskMonitor) -> Result<PassOutcome, LoadError>;

/// The generic GOT/PLT pass every extension builds on.
pub trait DefaultGotPltPass {
    /// Process generic GOT/PLT relocations.
    fn process_got_plt(&mut self, helper: &mut ElfLoadHelper<'_>, monitor: &dyn TaskMonitor) -> Result<(), LoadError>;
}

/// Generic pass that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaultPass;

impl DefaultGotPltPass for NoDefaultPass {
    fn process_got_plt(&mut self, _helper: &mut ElfLoadHelper<'_>, _monitor: &dyn TaskMonitor) -> Result<(), LoadError> {
        Ok(())
    }
}

/// One architecture extension.
#[derive(Debug, Clone, Copy)]
pub struct ElfExtension {
    kind: ExtensionKind,
    data_type_suffix: &'static str,
    matches_header: HeaderPredicate,
    matches_context: ContextPredicate,
    got_plt_pass: Option<GotPltPass>,
}

impl ElfExtension {
    /// Extension without a specialized pass.
    pub const fn new(
        kind: ExtensionKind,
        data_type_suffix: &'static str,
        matches_header: HeaderPredicate,
        matches_context: ContextPredicate,
    ) -> Self {
        Self {
            kind,
            data_type_suffix,
            matches_header,
            matches_context,
            got_plt_pass: None,
        }
    }

    /// Attach a specialized GOT/PLT pass.
    pub const fn with_got_plt_pass(mut self, pass: GotPltPass) -> Self {
        self.got_plt_pass = Some(pass);
        self
    }

    /// Extension identity.
    pub fn kind(&self) -> ExtensionKind {
        self.kind
    }

    /// Suffix used to tell per-architecture data types apart.
    pub fn data_type_suffix(&self) -> &'static str {
        self.data_type_suffix
    }

    /// Coarse check on machine and class.
    pub fn matches_header(&self, header: &ElfHeader) -> bool {
        (self.matches_header)(header)
    }

    /// Check against the language actually chosen for this load.
    pub fn matches_context(&self, helper: &ElfLoadHelper<'_>) -> bool {
        (self.matches_context)(helper)
    }

    /// Whether both checks pass.
    pub fn can_handle(&self, helper: &ElfLoadHelper<'_>) -> bool {
        self.matches_header(helper.header()) && self.matches_context(helper)
    }

    /// Run the generic pass, then the specialized one if this extension
    /// has it.
    pub fn process_got_plt(
        &self,
        helper: &mut ElfLoadHelper<'_>,
        default_pass: &mut dyn DefaultGotPltPass,
        monitor: &dyn TaskMonitor,
    ) -> Result<PassOutcome, LoadError> {
        default_pass.process_got_plt(helper, monitor)?;
        match self.got_plt_pass {
            Some(pass) => pass(helper, monitor),
            None => Ok(PassOutcome::Skipped),
        }
    }
}

/// Result of dispatching one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    /// Selected extension, if any.
    pub extension: Option<ExtensionKind>,
    /// Outcome of the specialized pass.
    pub outcome: PassOutcome,
}

/// Ordered list of extensions.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    extensions: Vec<ElfExtension>,
}

static BUILTIN: Lazy<ExtensionRegistry> = Lazy::new(|| {
    let mut registry = ExtensionRegistry::new();
    registry.register(x86::X86_32);
    registry.register(x86::X86_64);
    registry
});

impl ExtensionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The extensions shipped with the loader, in selection order.
    pub fn builtin() -> &'static ExtensionRegistry {
        &BUILTIN
    }

    /// Append an extension; earlier registrations win ties.
    pub fn register(&mut self, extension: ElfExtension) {
        self.extensions.push(extension);
    }

    /// Registered extensions in selection order.
    pub fn extensions(&self) -> &[ElfExtension] {
        &self.extensions
    }

    /// Extensions whose header-level check accepts `header`.
    pub fn candidates<'r>(&'r self, header: &'r ElfHeader) -> impl Iterator<Item = &'r ElfExtension> + 'r {
        self.extensions.iter().filter(move |e| e.matches_header(header))
    }

    /// First extension passing both checks.
    pub fn select(&self, helper: &ElfLoadHelper<'_>) -> Option<&ElfExtension> {
        let header = helper.header();
        for extension in self.extensions.iter().filter(|e| e.matches_header(header)) {
            if extension.matches_context(helper) {
                log::debug!("[marrow/loader] selected extension {:?}", extension.kind());
                return Some(extension);
            }
            log::debug!(
                "[marrow/loader] extension {:?} rejected language {}",
                extension.kind(),
                helper.language().id()
            );
        }
        None
    }

    /// Select an extension and run GOT/PLT processing. Without a matching
    /// extension only the generic pass runs.
    pub fn process_got_plt(
        &self,
        helper: &mut ElfLoadHelper<'_>,
        default_pass: &mut dyn DefaultGotPltPass,
        monitor: &dyn TaskMonitor,
    ) -> Result<Dispatch, LoadError> {
        match self.select(helper).copied() {
            Some(extension) => {
                let outcome = extension.process_got_plt(helper, default_pass, monitor)?;
                Ok(Dispatch {
                    extension: Some(extension.kind()),
                    outcome,
                })
            }
            None => {
                default_pass.process_got_plt(helper, monitor)?;
                Ok(Dispatch {
                    extension: None,
                    outcome: PassOutcome::Skipped,
                })
            }
        }
    }
}
