//! hardlinker - Scan for and hardlink identical files
//!
//! Entry point for the hardlinker CLI.

use clap::Parser;
use hardlinker::{cli::Cli, error::ExitCode, logging::init_logging};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match hardlinker::run_app(cli) {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            log::error!("{:#}", err);
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    }
}
