use std::path::PathBuf;

use clap::Parser;

use crate::output::OutputFormat;

/// Import an ELF file into a marrow program and report the result.
#[derive(Parser, Debug)]
#[command(name = "marrow-import", version, about)]
pub struct Cli {
    /// ELF file to import.
    pub file: PathBuf,

    /// TOML config file; command-line flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Image base added to file addresses (hex, `0x` prefix optional).
    #[arg(long, value_parser = parse_hex)]
    pub image_base: Option<u64>,

    /// Language id overriding the one implied by the ELF header.
    #[arg(long)]
    pub language: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Parse a hexadecimal `u64`, with or without a `0x` prefix.
pub fn parse_hex(s: &str) -> Result<u64, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u64::from_str_radix(&digits.replace('_', ""), 16).map_err(|e| format!("invalid hex value {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parsing() {
        assert_eq!(parse_hex("0x1000"), Ok(0x1000));
        assert_eq!(parse_hex("0X08048000"), Ok(0x0804_8000));
        assert_eq!(parse_hex("b000_0000"), Ok(0xb000_0000));
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0xzz").is_err());
    }

    #[test]
    fn parses_full_command_line() {
        let cli = Cli::try_parse_from([
            "marrow-import",
            "libfoo.so",
            "--image-base",
            "0x10000000",
            "--language",
            "x86:LE:32:default",
            "--format",
            "json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.file, PathBuf::from("libfoo.so"));
        assert_eq!(cli.image_base, Some(0x1000_0000));
        assert_eq!(cli.language.as_deref(), Some("x86:LE:32:default"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.verbose, 2);
        assert!(cli.config.is_none());
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["marrow-import", "a.out"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Text);
        assert_eq!(cli.verbose, 0);
        assert!(cli.image_base.is_none());
    }

    #[test]
    fn rejects_bad_image_base() {
        assert!(Cli::try_parse_from(["marrow-import", "a.out", "--image-base", "nope"]).is_err());
    }
}
