//! Loader options.

use alloc::string::String;
use serde::{Deserialize, Serialize};

/// Default for [`LoaderOptions::max_section_size`].
pub const DEFAULT_MAX_SECTION_SIZE: u64 = 1 << 28;

/// Knobs for one ELF load. Every field has a default, so an empty config
/// table deserializes to [`LoaderOptions::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    /// Image base added to file-relative addresses (default 0).
    pub image_base: Option<u64>,
    /// Language id overriding the one derived from the ELF header.
    pub language: Option<String>,
    /// Run the selected architecture extension.
    pub run_extensions: bool,
    /// Create memory blocks for allocated sections.
    pub create_section_blocks: bool,
    /// Hold the program with an exclusive checkout.
    pub exclusive_checkout: bool,
    /// Sections larger than this are logged and not imported.
    pub max_section_size: u64,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            image_base: None,
            language: None,
            run_extensions: true,
            create_section_blocks: true,
            exclusive_checkout: true,
            max_section_size: DEFAULT_MAX_SECTION_SIZE,
        }
    }
}
