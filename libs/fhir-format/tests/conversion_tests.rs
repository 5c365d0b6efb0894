//! XML → JSON conversion against a realistic Patient fixture.

use basalt_format::{resource_from_xml, CardinalityRegistry, XmlConverter};
use serde_json::json;

const PATIENT: &str = r#"
<Patient xmlns="http://hl7.org/fhir">
  <id value="example"/>
  <identifier>
    <system value="urn:oid:1.2.36.146.595.217.0.1"/>
    <value value="12345"/>
  </identifier>
  <active value="true"/>
  <name>
    <use value="official"/>
    <family value="Chalmers"/>
    <given value="Peter"/>
    <given value="James"/>
  </name>
  <name>
    <use value="usual"/>
    <given value="Jim"/>
  </name>
  <telecom>
    <system value="phone"/>
    <value value="(03) 5555 6473"/>
    <use value="work"/>
    <rank value="1"/>
  </telecom>
  <gender value="male"/>
  <birthDate value="1974-12-25"/>
  <deceasedBoolean value="false"/>
  <address>
    <use value="home"/>
    <line value="534 Erewhon St"/>
    <city value="PleasantVille"/>
  </address>
</Patient>"#;

#[test]
fn realistic_patient_converts_with_cardinality() {
    let patient = resource_from_xml(PATIENT).expect("conversion");

    assert_eq!(patient["resourceType"], "Patient");
    assert_eq!(patient["id"], "example");
    assert_eq!(patient["active"], json!(true));
    assert_eq!(patient["gender"], "male");
    assert_eq!(patient["birthDate"], "1974-12-25");
    assert_eq!(patient["deceasedBoolean"], json!(false));

    // Repeating elements are arrays even with one occurrence.
    assert!(patient["identifier"].is_array());
    assert!(patient["telecom"].is_array());
    assert!(patient["address"].is_array());
    assert!(patient["address"][0]["line"].is_array());

    // Multiple occurrences accumulate in order.
    let names = patient["name"].as_array().unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(names[0]["use"], "official");
    assert_eq!(names[0]["given"], json!(["Peter", "James"]));
    assert_eq!(names[1]["given"], json!(["Jim"]));

    // Scalar-cardinality fields stay scalars.
    assert!(patient["name"][0]["family"].is_string());
    assert!(patient["gender"].is_string());

    // Numeric-typed fields become numbers.
    assert_eq!(patient["telecom"][0]["rank"], json!(1));
    // ...but value-ish strings stay strings.
    assert_eq!(patient["telecom"][0]["value"], "(03) 5555 6473");
}

#[test]
fn converter_with_explicit_registry_matches_default() {
    let explicit = XmlConverter::new(CardinalityRegistry::new())
        .resource_from_xml(PATIENT)
        .unwrap();
    let default = resource_from_xml(PATIENT).unwrap();
    assert_eq!(explicit, default);
}

#[test]
fn resulting_json_round_trips_through_serde() {
    let patient = resource_from_xml(PATIENT).unwrap();
    let text = patient.to_string();
    let reparsed: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(patient, reparsed);
}
