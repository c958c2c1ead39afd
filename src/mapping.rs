//
// mapping.rs
// Bundle-Pseudonymizer-rs
//
// Audit side-channel: one delimited row per pseudonymized patient, written as the run progresses.
// The file is truncated at the start of every run, so re-running against the same path replaces the previous audit trail.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{PseudonymError, Result};

pub const MAPPING_HEADER: [&str; 4] = ["given-names", "surname", "birthdate", "pseudonym"];

/// Original identity fields next to the pseudonym derived from them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRow {
    #[serde(rename = "given-names")]
    pub given_names: String,
    pub surname: String,
    pub birthdate: String,
    pub pseudonym: String,
}

pub struct MappingWriter<W: Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl MappingWriter<File> {
    /// Creates (or truncates) the mapping file and writes the header.
    pub fn create(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::create(path).map_err(PseudonymError::mapping)?;
        Self::new(file, delimiter)
    }
}

impl<W: Write> MappingWriter<W> {
    pub fn new(inner: W, delimiter: u8) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .delimiter(delimiter)
            .quote(b'"')
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .from_writer(inner);
        writer
            .write_record(MAPPING_HEADER)
            .map_err(PseudonymError::mapping)?;
        writer.flush().map_err(PseudonymError::mapping)?;
        Ok(Self { writer, rows: 0 })
    }

    /// Appends one row and flushes it, so the audit trail survives a later fatal error.
    pub fn append(&mut self, row: &MappingRow) -> Result<()> {
        self.writer.serialize(row).map_err(PseudonymError::mapping)?;
        self.writer.flush().map_err(PseudonymError::mapping)?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().map_err(PseudonymError::mapping)?;
        self.writer
            .into_inner()
            .map_err(|err| PseudonymError::mapping(err.into_error()))
    }
}
