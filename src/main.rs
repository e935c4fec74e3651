mod cli;
mod error;
mod logging;
mod run;
mod wordlist;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    let (debug_path, debug_file) = match logging::debug_log(args.debug) {
        Ok(log) => log.unzip(),
        Err(e) => {
            eprintln!("Error: {e:?}");
            return ExitCode::FAILURE;
        },
    };
    logging::init(args.verbose, debug_file);
    if let Some(path) = debug_path {
        println!("Debug mode enabled. Logging to {}", path.display());
    }

    match run::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        },
    }
}
