//! FHIR type routing for `is` / `as` / `ofType`
//!
//! Primitive type names map to JSON scalar families and dispatch to the
//! dialect's type predicates. Complex types (resources and complex
//! datatypes) are checked by the translator itself against the
//! `resourceType` discriminator. Anything else gets a poison cast that
//! fails at execution time.

use basalt_dialect::JsonTypeFamily;

/// How a type name routes through the type operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRoute {
    /// System/FHIR primitive, checked via JSON scalar type.
    Primitive(JsonTypeFamily),
    /// Temporal primitives are stored as strings; checked via shape.
    Temporal(TemporalShape),
    /// Resource or complex datatype, checked via `resourceType`.
    Complex(String),
    /// Unknown name: emitted SQL must fail at execution, never NULL.
    Unknown(String),
}

/// String-shaped temporal families (stored as ISO text in FHIR JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalShape {
    Date,
    DateTime,
    Time,
}

impl TemporalShape {
    /// Anchored regex for the textual shape.
    pub fn pattern(&self) -> &'static str {
        match self {
            TemporalShape::Date => r"^\d{4}(-\d{2}(-\d{2})?)?$",
            TemporalShape::DateTime => r"^\d{4}(-\d{2}(-\d{2}(T.*)?)?)?$",
            TemporalShape::Time => r"^\d{2}:\d{2}(:\d{2}(\.\d+)?)?$",
        }
    }
}

/// Resource names recognised as complex types. Not exhaustive FHIR — the
/// set the compliance corpus and common analytics queries touch.
static RESOURCE_TYPES: phf::Set<&'static str> = phf::phf_set! {
    "Resource", "DomainResource", "Patient", "Observation", "Condition",
    "Procedure", "Encounter", "MedicationRequest", "MedicationStatement",
    "DiagnosticReport", "Immunization", "AllergyIntolerance", "CarePlan",
    "Organization", "Practitioner", "PractitionerRole", "Location",
    "Bundle", "ValueSet", "CodeSystem", "Questionnaire",
    "QuestionnaireResponse", "Specimen", "Device", "Claim", "Coverage",
    "Goal", "List", "Group", "Medication", "RelatedPerson",
};

/// Complex (non-resource) datatypes; membership means "complex type
/// check", which on plain JSON objects can only test object-ness.
static COMPLEX_DATATYPES: phf::Set<&'static str> = phf::phf_set! {
    "HumanName", "Address", "ContactPoint", "Identifier", "Coding",
    "CodeableConcept", "Quantity", "Range", "Period", "Ratio",
    "Attachment", "Annotation", "SampledData", "Signature", "Timing",
    "Reference", "Meta", "Narrative", "Extension", "Dosage", "Money",
    "Age", "Count", "Distance", "Duration",
};

/// Strip a namespace qualifier (`System.String` → `String`,
/// `FHIR.Patient` → `Patient`).
fn local_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Resolve a type name written in an expression to its routing. Handles
/// the generated-subtype convention where a trailing `1` (e.g. `string1`)
/// means the base primitive.
pub fn route_type(name: &str) -> TypeRoute {
    let local = local_name(name);

    // Generated test subtypes: strip the trailing '1' and re-resolve.
    let base = if local.len() > 1 && local.ends_with('1') {
        &local[..local.len() - 1]
    } else {
        local
    };

    let lowered = base.to_ascii_lowercase();
    match lowered.as_str() {
        "string" | "uri" | "url" | "canonical" | "oid" | "uuid" | "id" | "code" | "markdown"
        | "base64binary" => return TypeRoute::Primitive(JsonTypeFamily::String),
        "integer" | "unsignedint" | "positiveint" | "integer64" => {
            return TypeRoute::Primitive(JsonTypeFamily::Integer)
        }
        "decimal" => return TypeRoute::Primitive(JsonTypeFamily::Decimal),
        "boolean" => return TypeRoute::Primitive(JsonTypeFamily::Boolean),
        "date" => return TypeRoute::Temporal(TemporalShape::Date),
        "datetime" | "instant" => return TypeRoute::Temporal(TemporalShape::DateTime),
        "time" => return TypeRoute::Temporal(TemporalShape::Time),
        _ => {}
    }

    if RESOURCE_TYPES.contains(base) {
        return TypeRoute::Complex(base.to_string());
    }
    if COMPLEX_DATATYPES.contains(base) {
        return TypeRoute::Complex(base.to_string());
    }
    TypeRoute::Unknown(local.to_string())
}

/// Whether `name` looks like a resource root in a path expression
/// (`Patient.name` starts navigation at the resource).
pub fn is_resource_root(name: &str) -> bool {
    RESOURCE_TYPES.contains(name)
        || name
            .chars()
            .next()
            .map(|c| c.is_ascii_uppercase())
            .unwrap_or(false)
}

/// FHIR choice-type element bases (`deceased[x]`, `value[x]`): navigation
/// on the base name must fall through the typed spellings.
static CHOICE_ELEMENTS: phf::Set<&'static str> = phf::phf_set! {
    "deceased", "onset", "value", "effective", "multipleBirth",
    "abatement", "medication", "born", "age", "serviced", "occurrence",
    "timing", "asNeeded", "performed", "scheduled", "product", "content",
};

/// Typed suffixes tried for choice elements, in extraction order.
pub const CHOICE_SUFFIXES: &[&str] = &[
    "Boolean",
    "Integer",
    "Decimal",
    "String",
    "DateTime",
    "Date",
    "Time",
    "Instant",
    "Quantity",
    "CodeableConcept",
    "Period",
    "Range",
    "Ratio",
    "Age",
    "Duration",
    "Reference",
];

pub fn is_choice_element(member: &str) -> bool {
    CHOICE_ELEMENTS.contains(member)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_route_to_families() {
        assert_eq!(
            route_type("Integer"),
            TypeRoute::Primitive(JsonTypeFamily::Integer)
        );
        assert_eq!(
            route_type("uri"),
            TypeRoute::Primitive(JsonTypeFamily::String)
        );
        assert_eq!(
            route_type("System.String"),
            TypeRoute::Primitive(JsonTypeFamily::String)
        );
    }

    #[test]
    fn generated_subtypes_strip_the_suffix() {
        assert_eq!(
            route_type("string1"),
            TypeRoute::Primitive(JsonTypeFamily::String)
        );
        assert_eq!(
            route_type("integer1"),
            TypeRoute::Primitive(JsonTypeFamily::Integer)
        );
    }

    #[test]
    fn complex_types_route_by_name() {
        assert_eq!(route_type("Patient"), TypeRoute::Complex("Patient".into()));
        assert_eq!(
            route_type("FHIR.HumanName"),
            TypeRoute::Complex("HumanName".into())
        );
    }

    #[test]
    fn unknown_types_stay_unknown() {
        assert_eq!(
            route_type("NotARealType"),
            TypeRoute::Unknown("NotARealType".into())
        );
    }

    #[test]
    fn temporals_have_shapes() {
        assert!(matches!(
            route_type("dateTime"),
            TypeRoute::Temporal(TemporalShape::DateTime)
        ));
    }

    #[test]
    fn choice_elements() {
        assert!(is_choice_element("deceased"));
        assert!(is_choice_element("value"));
        assert!(!is_choice_element("name"));
    }
}
