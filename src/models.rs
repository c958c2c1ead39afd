//
// models.rs
// Bundle-Pseudonymizer-rs
//
// Serializable summary of a pseudonymization run, shown by the CLI and returned by every run entry point.
//
// Thales Matheus Mendonça Santos - November 2025

use serde::{Deserialize, Serialize};

use crate::record::RecordKind;

/// Counts per entry kind plus the number of recovered field anomalies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub records: usize,
    pub patients: usize,
    pub encounters: usize,
    pub passthrough: usize,
    pub warnings: usize,
}

impl RunSummary {
    pub fn count(&mut self, kind: RecordKind) {
        self.records += 1;
        match kind {
            RecordKind::Patient => self.patients += 1,
            RecordKind::Encounter => self.encounters += 1,
            RecordKind::PassThrough => self.passthrough += 1,
        }
    }
}
