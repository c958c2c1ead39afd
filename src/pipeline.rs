//
// pipeline.rs
// Bundle-Pseudonymizer-rs
//
// Run orchestration: wires the stream parser, the record transformer, the XML sink and the mapping writer
// together for files, standard streams, or the stdout of a producer process.
//
// Thales Matheus Mendonça Santos - November 2025

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::emitter::{BundleSink, XmlSink};
use crate::error::{PseudonymError, Result};
use crate::mapping::MappingWriter;
use crate::models::RunSummary;
use crate::parser::{BundleVisitor, StreamParser};
use crate::record::Element;
use crate::transform::{RecordTransformer, TransformOutcome};

struct Pseudonymizer<'a, S: BundleSink, M: Write> {
    sink: &'a mut S,
    mapping: &'a mut MappingWriter<M>,
    transformer: RecordTransformer,
    summary: RunSummary,
}

impl<S: BundleSink, M: Write> BundleVisitor for Pseudonymizer<'_, S, M> {
    fn start_document(&mut self) -> Result<()> {
        self.sink.write_preamble()
    }

    fn open_root(&mut self, root: &Element) -> Result<()> {
        self.sink.write_open(root)
    }

    fn record(&mut self, index: usize, mut record: Element) -> Result<()> {
        let outcome = self.transformer.transform(index, &mut record)?;
        if let TransformOutcome::Patient(row) = &outcome {
            self.mapping.append(row)?;
        }
        self.sink.write_record(&record)?;
        debug!(record = index, kind = %outcome.kind(), "entry written");
        self.summary.count(outcome.kind());
        Ok(())
    }

    fn close_root(&mut self, name: &str) -> Result<()> {
        self.sink.write_close(name)
    }
}

/// Streams one bundle from `input` to `output`, appending audit rows to `mapping`.
///
/// Only the entry currently being transformed is held in memory. On a fatal error, entries
/// already written stay in `output`.
pub fn pseudonymize<R, W, M>(input: R, output: W, mapping: M, config: &RunConfig) -> Result<RunSummary>
where
    R: BufRead,
    W: Write,
    M: Write,
{
    let mut mapping = MappingWriter::new(mapping, config.field_delimiter)?;
    let mut sink = XmlSink::new(output);
    let summary = run(input, &mut sink, &mut mapping, config)?;
    mapping.finish()?;
    Ok(summary)
}

fn run<R, S, M>(input: R, sink: &mut S, mapping: &mut MappingWriter<M>, config: &RunConfig) -> Result<RunSummary>
where
    R: BufRead,
    S: BundleSink,
    M: Write,
{
    info!(strict = config.strict, "starting bundle pseudonymization");
    let mut visitor = Pseudonymizer {
        sink,
        mapping,
        transformer: RecordTransformer::new(config.salt.clone(), config.strict),
        summary: RunSummary::default(),
    };
    let result = StreamParser::new(input).run(&mut visitor);
    // Flush whatever was completed, even when the document turned out to be malformed.
    let flushed = visitor.sink.finish();
    result?;
    flushed?;

    let mut summary = visitor.summary;
    summary.warnings = visitor.transformer.warnings();
    info!(
        records = summary.records,
        patients = summary.patients,
        encounters = summary.encounters,
        passthrough = summary.passthrough,
        warnings = summary.warnings,
        mapping_rows = visitor.mapping.rows(),
        "pseudonymization complete"
    );
    Ok(summary)
}

/// Runs one bundle between files or standard streams (`None` means stdin/stdout).
/// The mapping file is created at `config.mapping_output_path`.
pub fn process(input: Option<&Path>, output: Option<&Path>, config: &RunConfig) -> Result<RunSummary> {
    if let (Some(input), Some(output)) = (input, output) {
        if same_file(input, output) {
            return Err(PseudonymError::configuration(format!(
                "output {} would overwrite the input",
                output.display()
            )));
        }
    }
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).map_err(|source| PseudonymError::Input { source })?,
        )),
        None => Box::new(io::stdin().lock()),
    };
    let writer = open_output(output)?;
    let mut mapping = MappingWriter::create(&config.mapping_output_path, config.field_delimiter)?;
    let mut sink = XmlSink::new(BufWriter::new(writer));
    let summary = run(reader, &mut sink, &mut mapping, config)?;
    mapping.finish()?;
    Ok(summary)
}

pub fn process_file(input: &Path, output: &Path, config: &RunConfig) -> Result<RunSummary> {
    process(Some(input), Some(output), config)
}

/// Standard input to standard output; the simplest pipeline stage.
pub fn process_stdio(config: &RunConfig) -> Result<RunSummary> {
    process(None, None, config)
}

/// Runs `program` as the producer and pseudonymizes its stdout as it arrives.
///
/// The producer's stderr is drained on its own thread so neither pipe can fill up and stall
/// the pipeline. If the transform fails, the producer is killed and reaped.
pub fn process_command<I, A>(program: &OsStr, args: I, output: Option<&Path>, config: &RunConfig) -> Result<RunSummary>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let writer = open_output(output)?;
    let mut mapping = MappingWriter::create(&config.mapping_output_path, config.field_delimiter)?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| PseudonymError::Producer {
            message: format!("could not start {}: {err}", program.to_string_lossy()),
        })?;

    let drain = child.stderr.take().map(|stderr| {
        thread::spawn(move || {
            for line in BufReader::new(stderr).lines().map_while(|line| line.ok()) {
                info!(target: "producer", "{line}");
            }
        })
    });
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(PseudonymError::Producer {
            message: "producer stdout was not captured".into(),
        });
    };

    let mut sink = XmlSink::new(BufWriter::new(writer));
    let result = run(BufReader::new(stdout), &mut sink, &mut mapping, config);
    if result.is_err() {
        warn!("transform failed; stopping producer");
        let _ = child.kill();
    }
    let status = child.wait().map_err(|err| PseudonymError::Producer {
        message: format!("could not wait for producer: {err}"),
    });
    if let Some(handle) = drain {
        let _ = handle.join();
    }

    let summary = result?;
    let status = status?;
    if !status.success() {
        return Err(PseudonymError::Producer {
            message: format!("{} exited with {status}", program.to_string_lossy()),
        });
    }
    mapping.finish()?;
    Ok(summary)
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(File::create(path).map_err(PseudonymError::output)?),
        None => Box::new(io::stdout().lock()),
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
