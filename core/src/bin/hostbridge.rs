//! hostbridge command-line runner
//!
//! Evaluates scripts with globals bound from JSON on the command line and
//! prints the completion value.

use hostbridge_core::cli;

fn main() {
    // .env is optional
    dotenvy::dotenv().ok();

    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
