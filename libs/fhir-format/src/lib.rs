//! FHIR XML → JSON conversion
//!
//! Follows the official FHIR XML mapping in reverse:
//! - the root element's tag names the resource type,
//! - `value` attributes become primitive scalars,
//! - other attributes (`url`, `id`) become regular fields,
//! - child elements recurse into objects,
//! - repeated elements accumulate, and the cardinality registry forces
//!   array wrapping for `0..*`/`1..*` elements even when only one
//!   occurrence is present,
//! - XHTML narrative (`div`) is captured as its text content.

pub mod cardinality;

pub use cardinality::CardinalityRegistry;

use roxmltree::{Document, Node};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("document has no root element")]
    NoRoot,
}

/// Fields whose `value` attributes carry JSON numbers. Everything else
/// stays a string (FHIR dates, ids and codes are strings even when they
/// look numeric).
static NUMERIC_FIELDS: phf::Set<&'static str> = phf::phf_set! {
    "valueInteger",
    "valueDecimal",
    "valuePositiveInt",
    "valueUnsignedInt",
    "valueInteger64",
    "multipleBirthInteger",
    "rank",
    "sequence",
    "numberOfSeries",
    "numberOfInstances",
    "total",
};

/// XML → JSON converter with an injected cardinality registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlConverter {
    registry: CardinalityRegistry,
}

impl XmlConverter {
    pub fn new(registry: CardinalityRegistry) -> Self {
        Self { registry }
    }

    /// Convert a FHIR XML document to its JSON resource form.
    pub fn resource_from_xml(&self, xml: &str) -> Result<Value, FormatError> {
        let document = Document::parse(xml)?;
        let root = document.root_element();
        let resource_type = root.tag_name().name().to_string();

        let mut object = self.convert_element(root, &resource_type);
        if let Value::Object(map) = &mut object {
            map.insert(
                "resourceType".to_string(),
                Value::String(resource_type.clone()),
            );
            // resourceType leads; serde_json::Map preserves insertion
            // order only with the preserve_order feature, so rebuild.
            let mut ordered = Map::new();
            ordered.insert(
                "resourceType".to_string(),
                Value::String(resource_type),
            );
            for (key, value) in map.iter() {
                if key != "resourceType" {
                    ordered.insert(key.clone(), value.clone());
                }
            }
            return Ok(Value::Object(ordered));
        }
        Ok(object)
    }

    fn convert_element(&self, node: Node<'_, '_>, path: &str) -> Value {
        // Narrative XHTML collapses to its text content.
        if node.tag_name().name() == "div" {
            let text: String = node
                .descendants()
                .filter_map(|n| n.text())
                .collect::<Vec<_>>()
                .join("");
            return Value::String(text.trim().to_string());
        }

        let mut object = Map::new();

        for attribute in node.attributes() {
            if attribute.name() == "value" {
                continue; // handled by the parent
            }
            object.insert(
                attribute.name().to_string(),
                Value::String(attribute.value().to_string()),
            );
        }

        for child in node.children().filter(Node::is_element) {
            let name = child.tag_name().name().to_string();
            if name == "div" {
                object.insert("div".to_string(), self.convert_element(child, path));
                continue;
            }
            let child_path = format!("{}.{}", path, name);
            let value = self.element_value(child, &child_path, &name);

            match object.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    object.insert(name, json!([first, value]));
                }
                None => {
                    if self.registry.is_array(&child_path) {
                        object.insert(name, json!([value]));
                    } else {
                        object.insert(name, value);
                    }
                }
            }
        }

        Value::Object(object)
    }

    /// Value of one element: `value` attribute (primitive), or nested
    /// object. A primitive that also carries other attributes or children
    /// keeps the complex `{value, ...}` representation.
    fn element_value(&self, node: Node<'_, '_>, path: &str, name: &str) -> Value {
        let value_attr = node.attribute("value");
        let has_children = node.children().any(|c| c.is_element());
        let has_other_attrs = node.attributes().any(|a| a.name() != "value");

        match value_attr {
            Some(raw) if !has_children && !has_other_attrs => self.primitive(raw, name),
            Some(raw) => {
                let mut object = self.convert_element(node, path);
                if let Value::Object(map) = &mut object {
                    map.insert("value".to_string(), self.primitive(raw, name));
                }
                object
            }
            None => self.convert_element(node, path),
        }
    }

    fn primitive(&self, raw: &str, field: &str) -> Value {
        match raw {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if NUMERIC_FIELDS.contains(field) || field.starts_with("valueDecimal") {
            if let Ok(number) = serde_json::from_str::<serde_json::Number>(raw) {
                return Value::Number(number);
            }
        }
        Value::String(raw.to_string())
    }
}

/// Convert with the built-in registry.
pub fn resource_from_xml(xml: &str) -> Result<Value, FormatError> {
    XmlConverter::default().resource_from_xml(xml)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_tag_becomes_resource_type() {
        let value = resource_from_xml(r#"<Patient xmlns="http://hl7.org/fhir"/>"#).unwrap();
        assert_eq!(value["resourceType"], "Patient");
    }

    #[test]
    fn value_attributes_become_scalars() {
        let value = resource_from_xml(
            r#"<Patient><birthDate value="1970-01-01"/><active value="true"/></Patient>"#,
        )
        .unwrap();
        assert_eq!(value["birthDate"], "1970-01-01");
        assert_eq!(value["active"], Value::Bool(true));
    }

    #[test]
    fn repeating_elements_are_arrays_even_when_single() {
        let value = resource_from_xml(
            r#"<Patient>
                 <name>
                   <family value="Smith"/>
                   <given value="John"/>
                 </name>
               </Patient>"#,
        )
        .unwrap();
        assert!(value["name"].is_array());
        assert!(value["name"][0]["given"].is_array());
        assert_eq!(value["name"][0]["given"][0], "John");
        assert_eq!(value["name"][0]["family"], "Smith");
    }

    #[test]
    fn repeated_occurrences_accumulate() {
        let value = resource_from_xml(
            r#"<Patient>
                 <name><family value="Smith"/></name>
                 <name><family value="Jones"/></name>
               </Patient>"#,
        )
        .unwrap();
        assert_eq!(value["name"].as_array().unwrap().len(), 2);
        assert_eq!(value["name"][1]["family"], "Jones");
    }

    #[test]
    fn non_value_attributes_become_fields() {
        let value = resource_from_xml(
            r#"<Patient>
                 <extension url="http://example.org/weight">
                   <valueDecimal value="72.5"/>
                 </extension>
               </Patient>"#,
        )
        .unwrap();
        let extension = &value["extension"][0];
        assert_eq!(extension["url"], "http://example.org/weight");
        assert_eq!(extension["valueDecimal"], json!(72.5));
    }

    #[test]
    fn numeric_fields_are_numbers_but_dates_stay_strings() {
        let value = resource_from_xml(
            r#"<Observation>
                 <valueInteger value="42"/>
                 <effectiveDateTime value="2015-02-04"/>
               </Observation>"#,
        )
        .unwrap();
        assert_eq!(value["valueInteger"], json!(42));
        assert_eq!(value["effectiveDateTime"], "2015-02-04");
    }

    #[test]
    fn primitive_with_extension_keeps_complex_form() {
        let value = resource_from_xml(
            r#"<Patient>
                 <birthDate value="1970-01-01">
                   <extension url="http://example.org/precision">
                     <valueString value="day"/>
                   </extension>
                 </birthDate>
               </Patient>"#,
        )
        .unwrap();
        assert_eq!(value["birthDate"]["value"], "1970-01-01");
        assert!(value["birthDate"]["extension"].is_array());
    }

    #[test]
    fn narrative_div_collapses_to_text() {
        let value = resource_from_xml(
            r#"<Patient>
                 <text>
                   <status value="generated"/>
                   <div xmlns="http://www.w3.org/1999/xhtml"><p>Hello</p></div>
                 </text>
               </Patient>"#,
        )
        .unwrap();
        assert_eq!(value["text"]["div"], "Hello");
        assert_eq!(value["text"]["status"], "generated");
    }
}
