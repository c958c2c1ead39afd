//
// transform.rs
// Bundle-Pseudonymizer-rs
//
// Mutates one buffered entry: Patient identifiers become salted pseudonyms and names are stripped,
// Encounter identifiers become per-patient sequence numbers, anything else is left alone.
//
// Thales Matheus Mendonça Santos - November 2025

use tracing::{debug, warn};

use crate::config::Salt;
use crate::error::{PseudonymError, Result};
use crate::hashing::PatientIdentity;
use crate::mapping::MappingRow;
use crate::record::{classify, Element, RecordKind};
use crate::sequencer::{EncounterSequencer, PatientKey};

const IDENTIFIER_VALUE: [&str; 2] = ["identifier", "value"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// The mapping row to append to the audit file.
    Patient(MappingRow),
    /// `None` when the encounter had no identifier to replace.
    Encounter(Option<u64>),
    PassThrough,
}

impl TransformOutcome {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Patient(_) => RecordKind::Patient,
            Self::Encounter(_) => RecordKind::Encounter,
            Self::PassThrough => RecordKind::PassThrough,
        }
    }
}

// Most recent Patient entry; encounters that follow it are attributed to it.
#[derive(Debug)]
struct CurrentPatient {
    key: String,
    resource_id: Option<String>,
}

pub struct RecordTransformer {
    salt: Salt,
    strict: bool,
    sequencer: EncounterSequencer,
    current_patient: Option<CurrentPatient>,
    warnings: usize,
}

impl RecordTransformer {
    pub fn new(salt: Salt, strict: bool) -> Self {
        Self {
            salt,
            strict,
            sequencer: EncounterSequencer::new(),
            current_patient: None,
            warnings: 0,
        }
    }

    /// Field anomalies recovered so far (missing or repeated elements).
    pub fn warnings(&self) -> usize {
        self.warnings
    }

    pub fn transform(&mut self, index: usize, record: &mut Element) -> Result<TransformOutcome> {
        match classify(record) {
            RecordKind::Patient => self.patient(index, record),
            RecordKind::Encounter => self.encounter(index, record),
            RecordKind::PassThrough => Ok(TransformOutcome::PassThrough),
        }
    }

    fn patient(&mut self, index: usize, record: &mut Element) -> Result<TransformOutcome> {
        let Some(resource) = record.find_first_mut(&["Patient"]) else {
            return Ok(TransformOutcome::PassThrough);
        };

        let names = resource.find_all(&["name"]);
        if names.len() > 1 {
            warn!(
                record = index,
                matches = names.len(),
                "patient has more than one name entry; removing all, first one used for the pseudonym"
            );
            self.warnings += 1;
        }
        let first_name = names.first().copied();
        let given = first_name.map(|n| n.find_all(&["given"])).unwrap_or_default();
        let family = first_name.map(|n| n.find_all(&["family"])).unwrap_or_default();
        let identity = PatientIdentity::new(
            self.single_value(index, &given, "Patient/name/given")?,
            self.single_value(index, &family, "Patient/name/family")?,
            self.single_value(index, &resource.find_all(&["birthDate"]), "Patient/birthDate")?,
        );
        let resource_id = resource
            .find_all(&["id"])
            .first()
            .and_then(|el| el.attribute("value"))
            .map(str::to_string);

        let pseudonym = identity.pseudonym(&self.salt);

        let identifiers = resource.find_all(&IDENTIFIER_VALUE).len();
        if identifiers > 1 {
            warn!(
                record = index,
                matches = identifiers,
                "patient has more than one identifier/value; only the first is replaced"
            );
            self.warnings += 1;
        }
        match resource.first_mut(&IDENTIFIER_VALUE) {
            Some(target) => target.set_attribute("value", pseudonym.as_str()),
            None => self.missing(index, "Patient/identifier/value")?,
        }

        let removed = resource.remove_children("name");
        debug!(record = index, removed_names = removed, "pseudonymized patient");

        self.current_patient = Some(CurrentPatient {
            key: resource_id.clone().unwrap_or_else(|| pseudonym.clone()),
            resource_id,
        });

        Ok(TransformOutcome::Patient(MappingRow {
            given_names: identity.given,
            surname: identity.surname,
            birthdate: identity.birth_date,
            pseudonym,
        }))
    }

    fn encounter(&mut self, index: usize, record: &mut Element) -> Result<TransformOutcome> {
        let Some(resource) = record.find_first_mut(&["Encounter"]) else {
            return Ok(TransformOutcome::PassThrough);
        };

        let owner = self.owner_of(index, resource);

        let identifiers = resource.find_all(&IDENTIFIER_VALUE).len();
        if identifiers > 1 {
            warn!(
                record = index,
                matches = identifiers,
                "encounter has more than one identifier/value; only the first is updated"
            );
            self.warnings += 1;
        }

        let original = resource
            .first_mut(&IDENTIFIER_VALUE)
            .and_then(|target| target.attribute("value").map(str::to_string));
        let Some(original) = original else {
            self.missing(index, "Encounter/identifier/value")?;
            return Ok(TransformOutcome::Encounter(None));
        };

        let surrogate = self.sequencer.surrogate_id(&owner, &original);
        if let Some(target) = resource.first_mut(&IDENTIFIER_VALUE) {
            target.set_attribute("value", surrogate.to_string());
        }
        debug!(
            record = index,
            patient = %owner,
            surrogate,
            distinct = self.sequencer.encounter_count(&owner),
            "renumbered encounter"
        );
        Ok(TransformOutcome::Encounter(Some(surrogate)))
    }

    // Encounters belong to the preceding Patient unless they point elsewhere or no Patient came first.
    fn owner_of(&mut self, index: usize, encounter: &Element) -> PatientKey {
        let Some(current) = &self.current_patient else {
            warn!(record = index, "encounter precedes any patient; sequencing it under 'unknown'");
            self.warnings += 1;
            return PatientKey::Unknown;
        };

        let referenced = encounter
            .find_all(&["subject", "reference"])
            .first()
            .and_then(|el| el.attribute("value"))
            .and_then(|reference| reference.rsplit_once("Patient/"))
            .map(|(_, id)| id.to_string());

        match (&current.resource_id, referenced) {
            (Some(current_id), Some(referenced)) if *current_id != referenced => {
                warn!(
                    record = index,
                    "encounter subject does not match the preceding patient; sequencing it under 'unknown'"
                );
                self.warnings += 1;
                PatientKey::Unknown
            }
            _ => PatientKey::Known(current.key.clone()),
        }
    }

    fn single_value(&mut self, index: usize, candidates: &[&Element], path: &str) -> Result<String> {
        let values: Vec<&str> = candidates
            .iter()
            .filter_map(|el| el.attribute("value"))
            .collect();
        match values.as_slice() {
            [] => {
                self.missing(index, path)?;
                Ok(String::new())
            }
            [only] => Ok(only.to_string()),
            [first, ..] => {
                warn!(record = index, path, matches = values.len(), "multiple matching values; using the first");
                self.warnings += 1;
                Ok(first.to_string())
            }
        }
    }

    fn missing(&mut self, index: usize, path: &str) -> Result<()> {
        if self.strict {
            return Err(PseudonymError::MissingField {
                record: index,
                path: path.to_string(),
            });
        }
        warn!(record = index, path, "expected element is missing; using an empty value");
        self.warnings += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashing::derive_pseudonym;

    fn valued(name: &str, value: &str) -> Element {
        Element::new(name).with_attribute("value", value)
    }

    fn entry(resource: Element) -> Element {
        Element::new("entry").with_child(Element::new("resource").with_child(resource))
    }

    fn patient(id: &str, given: &str, family: &str) -> Element {
        entry(
            Element::new("Patient")
                .with_child(valued("id", id))
                .with_child(Element::new("identifier").with_child(valued("value", "MRN-1")))
                .with_child(
                    Element::new("name")
                        .with_child(valued("family", family))
                        .with_child(valued("given", given)),
                )
                .with_child(valued("birthDate", "1980-01-01")),
        )
    }

    fn encounter(identifier: &str) -> Element {
        entry(
            Element::new("Encounter")
                .with_child(Element::new("identifier").with_child(valued("value", identifier))),
        )
    }

    fn identifier_of(record: &Element, resource: &str) -> String {
        record.find_all(&["resource", resource, "identifier", "value"])[0]
            .attribute("value")
            .unwrap()
            .to_string()
    }

    fn transformer(strict: bool) -> RecordTransformer {
        RecordTransformer::new(Salt::new("s3cr3t").unwrap(), strict)
    }

    #[test]
    fn patient_identifier_is_hashed_and_names_removed() {
        let mut t = transformer(false);
        let mut record = patient("p1", "Jane", "Doe");
        let outcome = t.transform(0, &mut record).unwrap();

        let expected = derive_pseudonym(&Salt::new("s3cr3t").unwrap(), "Jane", "Doe", "1980-01-01");
        assert_eq!(identifier_of(&record, "Patient"), expected);
        assert!(record.find_all(&["resource", "Patient", "name"]).is_empty());
        assert_eq!(
            outcome,
            TransformOutcome::Patient(MappingRow {
                given_names: "Jane".into(),
                surname: "Doe".into(),
                birthdate: "1980-01-01".into(),
                pseudonym: expected,
            })
        );
        assert_eq!(t.warnings(), 0);
    }

    #[test]
    fn only_first_name_feeds_the_hash_but_all_are_removed() {
        let mut t = transformer(false);
        let mut record = entry(
            Element::new("Patient")
                .with_child(Element::new("identifier").with_child(valued("value", "MRN-1")))
                .with_child(Element::new("name").with_child(valued("given", "Jane")).with_child(valued("family", "Doe")))
                .with_child(Element::new("name").with_child(valued("given", "Janet")).with_child(valued("family", "Smith")))
                .with_child(valued("birthDate", "1980-01-01")),
        );
        t.transform(0, &mut record).unwrap();
        let expected = derive_pseudonym(&Salt::new("s3cr3t").unwrap(), "Jane", "Doe", "1980-01-01");
        assert_eq!(identifier_of(&record, "Patient"), expected);
        assert!(record.find_all(&["resource", "Patient", "name"]).is_empty());
        assert_eq!(t.warnings(), 1);
    }

    #[test]
    fn missing_fields_fall_back_to_empty_strings() {
        let mut t = transformer(false);
        let mut record = entry(
            Element::new("Patient")
                .with_child(Element::new("identifier").with_child(valued("value", "MRN-1"))),
        );
        let outcome = t.transform(0, &mut record).unwrap();
        let expected = derive_pseudonym(&Salt::new("s3cr3t").unwrap(), "", "", "");
        assert_eq!(identifier_of(&record, "Patient"), expected);
        assert!(matches!(outcome, TransformOutcome::Patient(row) if row.given_names.is_empty()));
        assert_eq!(t.warnings(), 3);
    }

    #[test]
    fn strict_mode_escalates_missing_fields() {
        let mut t = transformer(true);
        let mut record = entry(Element::new("Patient").with_child(valued("birthDate", "1980-01-01")));
        let err = t.transform(4, &mut record).unwrap_err();
        assert!(matches!(
            err,
            PseudonymError::MissingField { record: 4, ref path } if path == "Patient/name/given"
        ));
    }

    #[test]
    fn encounters_are_numbered_per_patient() {
        let mut t = transformer(false);
        t.transform(0, &mut patient("p1", "Jane", "Doe")).unwrap();

        let mut ids = Vec::new();
        for (i, original) in ["E1", "E2", "E1"].iter().enumerate() {
            let mut record = encounter(original);
            t.transform(i + 1, &mut record).unwrap();
            ids.push(identifier_of(&record, "Encounter"));
        }
        assert_eq!(ids, vec!["0", "1", "0"]);

        t.transform(4, &mut patient("p2", "John", "Roe")).unwrap();
        let mut record = encounter("E2");
        assert_eq!(
            t.transform(5, &mut record).unwrap(),
            TransformOutcome::Encounter(Some(0))
        );
    }

    #[test]
    fn orphan_encounters_use_unknown_bucket() {
        let mut t = transformer(false);
        let mut first = encounter("E9");
        assert_eq!(
            t.transform(0, &mut first).unwrap(),
            TransformOutcome::Encounter(Some(0))
        );
        assert_eq!(t.warnings(), 1);

        t.transform(1, &mut patient("p1", "Jane", "Doe")).unwrap();
        let mut mismatched = entry(
            Element::new("Encounter")
                .with_child(Element::new("identifier").with_child(valued("value", "E7")))
                .with_child(Element::new("subject").with_child(valued("reference", "Patient/p2"))),
        );
        // second distinct id in the unknown bucket
        assert_eq!(
            t.transform(2, &mut mismatched).unwrap(),
            TransformOutcome::Encounter(Some(1))
        );

        let mut matching = entry(
            Element::new("Encounter")
                .with_child(Element::new("identifier").with_child(valued("value", "E7")))
                .with_child(Element::new("subject").with_child(valued("reference", "Patient/p1"))),
        );
        assert_eq!(
            t.transform(3, &mut matching).unwrap(),
            TransformOutcome::Encounter(Some(0))
        );
    }

    #[test]
    fn only_first_identifier_value_is_rewritten() {
        let mut t = transformer(false);
        let mut record = entry(
            Element::new("Patient")
                .with_child(Element::new("identifier").with_child(valued("value", "MRN-1")))
                .with_child(Element::new("identifier").with_child(valued("value", "MRN-2")))
                .with_child(Element::new("name").with_child(valued("given", "Jane")).with_child(valued("family", "Doe")))
                .with_child(valued("birthDate", "1980-01-01")),
        );
        t.transform(0, &mut record).unwrap();
        let values: Vec<_> = record
            .find_all(&["resource", "Patient", "identifier", "value"])
            .iter()
            .map(|el| el.attribute("value").unwrap().to_string())
            .collect();
        let expected = derive_pseudonym(&Salt::new("s3cr3t").unwrap(), "Jane", "Doe", "1980-01-01");
        assert_eq!(values, vec![expected, "MRN-2".to_string()]);
        assert_eq!(t.warnings(), 1);

        let mut record = entry(
            Element::new("Encounter")
                .with_child(Element::new("identifier").with_child(valued("value", "E1")))
                .with_child(Element::new("identifier").with_child(valued("value", "E2"))),
        );
        assert_eq!(
            t.transform(1, &mut record).unwrap(),
            TransformOutcome::Encounter(Some(0))
        );
        let values: Vec<_> = record
            .find_all(&["resource", "Encounter", "identifier", "value"])
            .iter()
            .map(|el| el.attribute("value").unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["0", "E2"]);
        assert_eq!(t.warnings(), 2);
    }

    #[test]
    fn encounter_without_identifier_is_left_alone() {
        let mut t = transformer(false);
        let mut record = entry(Element::new("Encounter").with_child(valued("status", "finished")));
        let before = record.clone();
        assert_eq!(
            t.transform(0, &mut record).unwrap(),
            TransformOutcome::Encounter(None)
        );
        assert_eq!(record, before);
    }

    #[test]
    fn other_resources_pass_through() {
        let mut t = transformer(false);
        let mut record = entry(Element::new("Observation").with_child(valued("status", "final")));
        let before = record.clone();
        assert_eq!(t.transform(0, &mut record).unwrap(), TransformOutcome::PassThrough);
        assert_eq!(record, before);
    }
}
