//
// sequencer.rs
// Bundle-Pseudonymizer-rs
//
// Per-patient encounter renumbering: each distinct encounter identifier gets the next zero-based index for its patient.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::HashMap;
use std::fmt;

/// Owner of an encounter sequence. `Unknown` collects encounters whose patient cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatientKey {
    Known(String),
    Unknown,
}

impl fmt::Display for PatientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(id) => f.write_str(id),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Lives for one run; never shared between runs.
#[derive(Debug, Default)]
pub struct EncounterSequencer {
    sequences: HashMap<PatientKey, HashMap<String, u64>>,
}

impl EncounterSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the surrogate id for `(patient, encounter_id)`, assigning the next index on first sight.
    pub fn surrogate_id(&mut self, patient: &PatientKey, encounter_id: &str) -> u64 {
        let seen = self.sequences.entry(patient.clone()).or_default();
        let next = seen.len() as u64;
        *seen.entry(encounter_id.to_string()).or_insert(next)
    }

    /// Number of distinct encounters seen for a patient.
    pub fn encounter_count(&self, patient: &PatientKey) -> usize {
        self.sequences.get(patient).map_or(0, HashMap::len)
    }
}
