use std::process::ExitCode;

use clap::Parser;

use marrow_import::cli::Cli;
use marrow_import::config::ImportConfig;
use marrow_import::error::ImportError;
use marrow_import::{import_file, logger, output};

fn run(cli: &Cli) -> Result<String, ImportError> {
    let config = ImportConfig::from_cli(cli)?;
    logger::init(config.level_filter(cli.verbose)?);
    let report = import_file(&cli.file, &config.loader)?;
    Ok(output::render(cli.format, &report)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            output::emit_error(cli.format, e.code(), &e.to_string());
            e.exit_code()
        }
    }
}
