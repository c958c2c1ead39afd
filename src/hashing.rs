use sha3::{Digest, Sha3_256};

use crate::config::Salt;

/// Length of a rendered pseudonym (SHA3-256 as lowercase hex).
pub const PSEUDONYM_HEX_LEN: usize = 64;

const SEPARATOR: &str = "|";

/// The identity fields a pseudonym is derived from. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientIdentity {
    pub given: String,
    pub surname: String,
    pub birth_date: String,
}

impl PatientIdentity {
    pub fn new(given: impl Into<String>, surname: impl Into<String>, birth_date: impl Into<String>) -> Self {
        Self {
            given: given.into(),
            surname: surname.into(),
            birth_date: birth_date.into(),
        }
    }

    pub fn pseudonym(&self, salt: &Salt) -> String {
        derive_pseudonym(salt, &self.given, &self.surname, &self.birth_date)
    }
}

/// SHA3-256 over `salt|given|surname|birthDate`, rendered as 64 lowercase hex characters.
pub fn derive_pseudonym(salt: &Salt, given: &str, surname: &str, birth_date: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(salt.expose().as_bytes());
    for field in [given, surname, birth_date] {
        hasher.update(SEPARATOR.as_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}
