//! TOML configuration.
//!
//! ```toml
//! log_level = "debug"
//!
//! [loader]
//! image_base = 0x10000000
//! language = "x86:LE:32:default"
//! create_section_blocks = true
//! ```

use std::path::Path;

use log::LevelFilter;
use marrow_loader::LoaderOptions;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;
use crate::error::ImportError;

/// Contents of a config file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub loader: LoaderOptions,
    pub log_level: Option<String>,
}

impl ImportConfig {
    /// Parse config text; `path` is only used in the error.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ImportError> {
        toml::from_str(text).map_err(|e| ImportError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ImportError> {
        let text = std::fs::read_to_string(path).map_err(|source| ImportError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Config from `--config` if given, with command-line flags applied on top.
    pub fn from_cli(cli: &Cli) -> Result<Self, ImportError> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(base) = cli.image_base {
            config.loader.image_base = Some(base);
        }
        if let Some(language) = &cli.language {
            config.loader.language = Some(language.clone());
        }
        Ok(config)
    }

    /// Effective log level: `-v` flags win over the config file.
    pub fn level_filter(&self, verbose: u8) -> Result<LevelFilter, ImportError> {
        match (verbose, &self.log_level) {
            (0, Some(level)) => level
                .parse()
                .map_err(|_| ImportError::InvalidLogLevel(level.clone())),
            (0, None) => Ok(LevelFilter::Warn),
            (1, _) => Ok(LevelFilter::Info),
            (2, _) => Ok(LevelFilter::Debug),
            _ => Ok(LevelFilter::Trace),
        }
    }
}
