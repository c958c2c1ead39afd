//
// main.rs
// Bundle-Pseudonymizer-rs
//
// Binary entry point that hands off execution to the CLI layer and turns failures into distinct exit codes.
//
// Thales Matheus Mendonça Santos - November 2025

use std::process::ExitCode;

use bundle_pseudonymizer::cli;

fn main() -> ExitCode {
    // Delegate all argument parsing and dispatching to the CLI module.
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(cli::exit_code(&err))
        }
    }
}
