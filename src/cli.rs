//
// cli.rs
// Bundle-Pseudonymizer-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};

use crate::config::{parse_delimiter, RunConfig, DEFAULT_MAPPING_PATH};
use crate::error::PseudonymError;
use crate::models::RunSummary;
use crate::{batch, hashing, logging, pipeline};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "bundle-pseudonymizer")]
#[command(about = "Pseudonimização de bundles FHIR em XML", long_about = None)]
pub struct Cli {
    /// Secret salt mixed into every pseudonym
    #[arg(long, env = "SECRET_KEY", hide_env_values = true, global = true)]
    pub secret_key: Option<String>,
    /// Log filter used when RUST_LOG is not set (logs go to stderr)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn", global = true)]
    pub log_level: String,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct MappingArgs {
    /// Where the audit mapping file is written (truncated on every run)
    #[arg(long, env = "USER_MAPPING_FILENAME", default_value = DEFAULT_MAPPING_PATH)]
    pub mapping: PathBuf,
    /// Single-character field delimiter for the mapping file, or \t
    #[arg(long, env = "USER_MAPPING_SEPARATOR", default_value = "\\t")]
    pub delimiter: String,
    /// Fail instead of warning when an identity or identifier element is missing
    #[arg(long)]
    pub strict: bool,
}

impl MappingArgs {
    fn into_config(self, secret_key: Option<&str>) -> Result<RunConfig, PseudonymError> {
        Ok(RunConfig::new(secret_key)?
            .with_mapping_path(self.mapping)
            .with_delimiter(parse_delimiter(&self.delimiter)?)
            .strict(self.strict))
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pseudonymize one bundle (stdin/stdout when no paths are given)
    Pseudonymize {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        mapping: MappingArgs,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Batch processing over a directory of bundles
    Batch {
        #[arg(short, long)]
        directory: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[command(flatten)]
        mapping: MappingArgs,
    },
    /// Pseudonymize the output of a producer command as it streams
    Exec {
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        mapping: MappingArgs,
        #[arg(long)]
        json: bool,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<OsString>,
    },
    /// Print the pseudonym for one identity (audit lookup)
    Hash {
        #[arg(long, default_value = "")]
        given: String,
        #[arg(long, default_value = "")]
        family: String,
        #[arg(long, default_value = "")]
        birth_date: String,
    },
}

pub fn run() -> anyhow::Result<()> {
    // Parse the raw CLI arguments once and dispatch to a subcommand handler.
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;
    let secret_key = cli.secret_key.as_deref();

    // Every branch validates the secret before touching input or output.
    match cli.command {
        Commands::Pseudonymize {
            input,
            output,
            mapping,
            json,
        } => {
            let config = mapping.into_config(secret_key)?;
            if input.is_none() && io::stdin().is_terminal() {
                bail!("No input given: pipe a bundle on stdin or pass a file path");
            }
            let summary = pipeline::process(input.as_deref(), output.as_deref(), &config)
                .context("Pseudonymization failed")?;
            report(&summary, json, output.is_some())?;
        }
        Commands::Batch {
            directory,
            output_dir,
            mapping,
        } => {
            let config = mapping.into_config(secret_key)?;
            batch::process_directory(&directory, &output_dir, &config)?;
        }
        Commands::Exec {
            output,
            mapping,
            json,
            command,
        } => {
            let config = mapping.into_config(secret_key)?;
            let (program, args) = command
                .split_first()
                .ok_or_else(|| anyhow!("No producer command given"))?;
            let summary = pipeline::process_command(program, args, output.as_deref(), &config)
                .context("Pipeline run failed")?;
            report(&summary, json, output.is_some())?;
        }
        Commands::Hash {
            given,
            family,
            birth_date,
        } => {
            let config = RunConfig::new(secret_key)?;
            println!(
                "{}",
                hashing::derive_pseudonym(&config.salt, &given, &family, &birth_date)
            );
        }
    }

    Ok(())
}

/// Exit status for a failed run: library errors map to their class, anything else is 1.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<PseudonymError>()
        .map_or(1, PseudonymError::exit_code)
}

fn report(summary: &RunSummary, json: bool, document_in_file: bool) -> anyhow::Result<()> {
    if !json {
        return Ok(());
    }
    let rendered = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    // Keep stdout clean when it carries the document.
    if document_in_file {
        println!("{rendered}");
    } else {
        eprintln!("{rendered}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exec_keeps_producer_arguments_verbatim() {
        let cli = Cli::try_parse_from([
            "bundle-pseudonymizer",
            "--secret-key",
            "k",
            "exec",
            "--",
            "export-tool",
            "--format",
            "xml",
        ])
        .unwrap();
        match cli.command {
            Commands::Exec { command, .. } => {
                assert_eq!(command, vec!["export-tool", "--format", "xml"]);
            }
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn mapping_args_build_config() {
        let args = MappingArgs {
            mapping: PathBuf::from("audit.csv"),
            delimiter: ",".into(),
            strict: true,
        };
        let config = args.clone().into_config(Some("k")).unwrap();
        assert_eq!(config.field_delimiter, b',');
        assert!(config.strict);
        assert!(matches!(
            args.into_config(None),
            Err(PseudonymError::Configuration { .. })
        ));
    }

    #[test]
    fn exit_code_follows_error_class() {
        let err = anyhow::Error::new(PseudonymError::malformed(3, "bad"))
            .context("Pseudonymization failed");
        assert_eq!(exit_code(&err), 3);
        assert_eq!(exit_code(&anyhow!("other")), 1);
    }
}
