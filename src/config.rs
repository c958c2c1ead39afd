//
// config.rs
// Bundle-Pseudonymizer-rs
//
// Run configuration: the secret salt, the mapping file location, its delimiter, and strict field checking.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::error::{PseudonymError, Result};

pub const DEFAULT_MAPPING_PATH: &str = "psn-cache.tsv";
pub const DEFAULT_DELIMITER: u8 = b'\t';

/// Secret mixed into every pseudonym. Never printed, never written to any output.
#[derive(Clone)]
pub struct Salt(SecretString);

impl Salt {
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(PseudonymError::configuration(
                "secret key must be set to a non-empty value",
            ));
        }
        Ok(Self(SecretString::new(secret)))
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt([REDACTED])")
    }
}

/// Everything a single run needs besides its input and output endpoints.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub salt: Salt,
    pub mapping_output_path: PathBuf,
    pub field_delimiter: u8,
    pub strict: bool,
}

impl RunConfig {
    /// Validates the secret key; an absent or empty key is a configuration error.
    pub fn new(secret_key: Option<&str>) -> Result<Self> {
        let secret = secret_key
            .ok_or_else(|| PseudonymError::configuration("no secret key supplied"))?;
        Ok(Self {
            salt: Salt::new(secret)?,
            mapping_output_path: PathBuf::from(DEFAULT_MAPPING_PATH),
            field_delimiter: DEFAULT_DELIMITER,
            strict: false,
        })
    }

    pub fn with_mapping_path(mut self, path: impl AsRef<Path>) -> Self {
        self.mapping_output_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.field_delimiter = delimiter;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

/// Accepts a single ASCII character, or `\t` / `tab` for the tab character.
pub fn parse_delimiter(raw: &str) -> Result<u8> {
    match raw {
        "\\t" | "tab" | "\t" => Ok(b'\t'),
        other => {
            let bytes = other.as_bytes();
            if bytes.len() == 1 && bytes[0].is_ascii() && bytes[0] != b'"' && bytes[0] != b'\n' {
                Ok(bytes[0])
            } else {
                Err(PseudonymError::configuration(format!(
                    "field delimiter must be a single ASCII character, got {other:?}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_or_missing_secret_is_rejected() {
        assert!(matches!(
            RunConfig::new(None),
            Err(PseudonymError::Configuration { .. })
        ));
        assert!(matches!(
            RunConfig::new(Some("")),
            Err(PseudonymError::Configuration { .. })
        ));
    }

    #[test]
    fn defaults_follow_mapping_conventions() {
        let config = RunConfig::new(Some("s3cr3t")).unwrap();
        assert_eq!(config.mapping_output_path, PathBuf::from("psn-cache.tsv"));
        assert_eq!(config.field_delimiter, b'\t');
        assert!(!config.strict);
    }

    #[test]
    fn salt_debug_is_redacted() {
        let salt = Salt::new("s3cr3t").unwrap();
        let rendered = format!("{salt:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert_eq!(salt.expose(), "s3cr3t");
    }

    #[test]
    fn delimiter_parsing() {
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert!(parse_delimiter(",,").is_err());
        assert!(parse_delimiter("\"").is_err());
        assert!(parse_delimiter("é").is_err());
    }
}
