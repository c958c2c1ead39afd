//
// error.rs
// Bundle-Pseudonymizer-rs
//
// Error taxonomy for a pseudonymization run: configuration, document structure, strict field checks, and sink failures.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PseudonymError>;

/// Every fatal condition a run can hit. Field-level anomalies are warnings unless strict mode is on.
#[derive(Error, Debug)]
pub enum PseudonymError {
    /// Missing or unusable run configuration (e.g. empty secret key). Raised before any input is read.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The input is not well-formed XML or does not have a single root element.
    #[error("malformed document at byte {position}: {message}")]
    MalformedDocument { position: u64, message: String },

    /// Strict mode only: an expected identity or identifier element is absent.
    #[error("record {record}: required element '{path}' is missing")]
    MissingField { record: usize, path: String },

    /// The output document or the mapping file could not be written.
    #[error("failed to write {sink}")]
    SinkWrite {
        sink: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The input endpoint could not be opened or read.
    #[error("failed to read input")]
    Input {
        #[source]
        source: io::Error,
    },

    /// The upstream producer process failed (pipeline mode).
    #[error("producer process failed: {message}")]
    Producer { message: String },
}

impl PseudonymError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn malformed(position: u64, message: impl Into<String>) -> Self {
        Self::MalformedDocument {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn output<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SinkWrite {
            sink: "output document",
            source: Box::new(err),
        }
    }

    pub(crate) fn mapping<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SinkWrite {
            sink: "mapping file",
            source: Box::new(err),
        }
    }

    /// Process exit code used by the CLI so operators can tell failure classes apart.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration { .. } => 2,
            Self::MalformedDocument { .. } => 3,
            Self::MissingField { .. } => 4,
            Self::SinkWrite { .. } | Self::Input { .. } | Self::Producer { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_separate_failure_classes() {
        assert_eq!(PseudonymError::configuration("no key").exit_code(), 2);
        assert_eq!(PseudonymError::malformed(10, "bad").exit_code(), 3);
        let missing = PseudonymError::MissingField {
            record: 1,
            path: "name/given".into(),
        };
        assert_eq!(missing.exit_code(), 4);
        let sink = PseudonymError::output(io::Error::new(io::ErrorKind::Other, "disk full"));
        assert_eq!(sink.exit_code(), 1);
    }

    #[test]
    fn sink_error_keeps_source() {
        let err = PseudonymError::mapping(io::Error::new(io::ErrorKind::Other, "disk full"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "disk full");
    }
}
