//! FHIR cardinality registry
//!
//! XML represents a repeating element as repeated tags; JSON represents it
//! as an array. A single occurrence in XML gives no hint that the element
//! repeats, so conversion consults this registry: any element declared
//! `0..*` / `1..*` is always wrapped in an array, one occurrence or many.
//!
//! The registry is read-only after construction and injected into the
//! converter (no process-wide singleton).

/// Field names that repeat on every FHIR type.
static UNIVERSAL_ARRAYS: phf::Set<&'static str> = phf::phf_set! {
    "extension",
    "modifierExtension",
    "contained",
};

/// `ResourceType.path` entries declared `0..*` or `1..*`. Covers the
/// resources the compliance corpus exercises; unknown paths default to
/// scalar.
static ARRAY_PATHS: phf::Set<&'static str> = phf::phf_set! {
    // Patient
    "Patient.identifier",
    "Patient.name",
    "Patient.name.given",
    "Patient.name.prefix",
    "Patient.name.suffix",
    "Patient.telecom",
    "Patient.address",
    "Patient.address.line",
    "Patient.contact",
    "Patient.contact.relationship",
    "Patient.contact.telecom",
    "Patient.communication",
    "Patient.generalPractitioner",
    "Patient.link",
    "Patient.photo",

    // Observation
    "Observation.identifier",
    "Observation.basedOn",
    "Observation.partOf",
    "Observation.category",
    "Observation.category.coding",
    "Observation.code.coding",
    "Observation.performer",
    "Observation.interpretation",
    "Observation.interpretation.coding",
    "Observation.note",
    "Observation.referenceRange",
    "Observation.hasMember",
    "Observation.derivedFrom",
    "Observation.component",
    "Observation.component.code.coding",
    "Observation.component.interpretation",

    // Condition
    "Condition.identifier",
    "Condition.category",
    "Condition.severity.coding",
    "Condition.code.coding",
    "Condition.bodySite",
    "Condition.stage",
    "Condition.evidence",
    "Condition.note",

    // Encounter
    "Encounter.identifier",
    "Encounter.type",
    "Encounter.episodeOfCare",
    "Encounter.participant",
    "Encounter.reasonCode",
    "Encounter.diagnosis",
    "Encounter.location",

    // Questionnaire
    "Questionnaire.identifier",
    "Questionnaire.subjectType",
    "Questionnaire.item",
    "Questionnaire.item.item",
    "Questionnaire.item.code",
    "Questionnaire.item.answerOption",
    "Questionnaire.item.enableWhen",

    // Bundle
    "Bundle.link",
    "Bundle.entry",

    // ValueSet
    "ValueSet.identifier",
    "ValueSet.compose.include",
    "ValueSet.compose.include.concept",
    "ValueSet.compose.include.filter",
    "ValueSet.compose.exclude",
    "ValueSet.expansion.contains",

    // Shared complex datatypes (path-relative, matched on tail)
    "CodeableConcept.coding",
    "HumanName.given",
    "HumanName.prefix",
    "HumanName.suffix",
    "Address.line",
};

/// Cardinality lookup for XML → JSON conversion.
#[derive(Debug, Default, Clone, Copy)]
pub struct CardinalityRegistry;

impl CardinalityRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Whether the element at `path` (e.g. `Patient.name.given`) repeats.
    pub fn is_array(&self, path: &str) -> bool {
        if let Some(field) = path.rsplit('.').next() {
            if UNIVERSAL_ARRAYS.contains(field) {
                return true;
            }
        }
        if ARRAY_PATHS.contains(path) {
            return true;
        }
        // Datatype-relative fall-back: `Observation.code.coding` matches
        // `CodeableConcept.coding` by its two-segment tail.
        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() >= 2 {
            let tail = segments[segments.len() - 1];
            for datatype in ["CodeableConcept", "HumanName", "Address"] {
                if ARRAY_PATHS.contains(format!("{}.{}", datatype, tail).as_str()) {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_paths_repeat() {
        let registry = CardinalityRegistry::new();
        assert!(registry.is_array("Patient.name"));
        assert!(registry.is_array("Patient.name.given"));
        assert!(!registry.is_array("Patient.birthDate"));
        assert!(!registry.is_array("Patient.name.family"));
    }

    #[test]
    fn extensions_repeat_everywhere() {
        let registry = CardinalityRegistry::new();
        assert!(registry.is_array("Patient.extension"));
        assert!(registry.is_array("Observation.component.extension"));
        assert!(registry.is_array("Anything.modifierExtension"));
    }

    #[test]
    fn datatype_tails_match() {
        let registry = CardinalityRegistry::new();
        assert!(registry.is_array("MedicationRequest.medicationCodeableConcept.coding"));
    }
}
