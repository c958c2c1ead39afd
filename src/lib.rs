//
// lib.rs
// Bundle-Pseudonymizer-rs
//
// Exposes the crate's modules and re-exports the main entry points for both binary and library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Public surface of the library: one module per stage of the stream, plus the CLI glue.
pub mod batch;
pub mod cli;
pub mod config;
pub mod emitter;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod record;
pub mod sequencer;
pub mod transform;

pub use cli::{run as run_cli, Cli, Commands};
pub use config::{RunConfig, Salt};
pub use error::{PseudonymError, Result};
pub use models::RunSummary;
pub use pipeline::{process, process_command, process_file, process_stdio, pseudonymize};
