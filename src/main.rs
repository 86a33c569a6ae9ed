use clap::Parser;
use ruletidy::cli::{Cli, run};
use ruletidy::logging::init_logger;
use ruletidy::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    init_logger();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            ExitCode::FAILURE
        }
    }
}
