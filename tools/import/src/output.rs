use std::fmt;

use crate::report::ImportReport;

/// Output format for the import report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary on stdout.
    #[default]
    Text,
    /// Single JSON object on stdout.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Render a report in `format`.
pub fn render(format: OutputFormat, report: &ImportReport) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(report.to_string()),
        OutputFormat::Json => serde_json::to_string_pretty(report),
    }
}

/// Write an error to stdout (JSON mode) or stderr (text mode).
pub fn emit_error(format: OutputFormat, exit_code: u8, message: &str) {
    match format {
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": message,
                "exit_code": exit_code,
            });
            // JSON errors go to stdout so the caller always gets valid JSON on stdout.
            println!("{obj}");
        }
        OutputFormat::Text => eprintln!("error: {message}"),
    }
}
