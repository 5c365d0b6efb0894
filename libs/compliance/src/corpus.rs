//! Compliance corpus loading
//!
//! The official suite is an XML file of `<group>` elements containing
//! `<test>` elements:
//!
//! ```xml
//! <group name="testAbs">
//!   <test name="testAbs1" inputfile="patient-example.xml">
//!     <expression>(-5).abs() = 5</expression>
//!     <output type="boolean" value="true"/>
//!   </test>
//! </group>
//! ```
//!
//! `invalid` marks expected failures (`syntax`, `semantic`, `execution`);
//! `predicate` marks truthiness tests; output values may appear as the
//! `value` attribute or as element text.

use crate::error::ComplianceError;
use roxmltree::{Document, Node};

/// Expected-failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidKind {
    Syntax,
    Semantic,
    Execution,
}

impl InvalidKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "syntax" => Some(InvalidKind::Syntax),
            "semantic" => Some(InvalidKind::Semantic),
            "execution" => Some(InvalidKind::Execution),
            // `true` shows up in older corpus revisions as a generic
            // marker; treat it as a semantic expectation.
            "true" => Some(InvalidKind::Semantic),
            _ => None,
        }
    }
}

/// One `<output>` element: a typed expected value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedOutput {
    pub type_name: String,
    pub value: Option<String>,
}

/// One `<test>` element.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub group: String,
    pub name: String,
    pub expression: String,
    pub input_file: Option<String>,
    pub invalid: Option<InvalidKind>,
    pub predicate: bool,
    pub expected: Vec<ExpectedOutput>,
}

/// Parse the whole corpus file.
pub fn load_corpus(xml: &str) -> Result<Vec<TestCase>, ComplianceError> {
    let document = Document::parse(xml).map_err(ComplianceError::CorpusXml)?;
    let mut cases = Vec::new();

    for group in document
        .root_element()
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "group")
    {
        let group_name = group.attribute("name").unwrap_or("ungrouped").to_string();
        for test in group
            .children()
            .filter(|n| n.is_element() && n.tag_name().name() == "test")
        {
            cases.push(parse_test(test, &group_name)?);
        }
    }
    Ok(cases)
}

fn parse_test(node: Node<'_, '_>, group: &str) -> Result<TestCase, ComplianceError> {
    let name = node
        .attribute("name")
        .ok_or_else(|| ComplianceError::Corpus("test without a name attribute".to_string()))?
        .to_string();

    let expression_node = node
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "expression")
        .ok_or_else(|| {
            ComplianceError::Corpus(format!("test '{}' has no expression element", name))
        })?;
    let expression = expression_node.text().unwrap_or("").trim().to_string();
    let invalid = expression_node
        .attribute("invalid")
        .and_then(InvalidKind::parse);

    let mut expected = Vec::new();
    for output in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "output")
    {
        let type_name = output.attribute("type").unwrap_or("string").to_string();
        // Value may be an attribute or the element text.
        let value = output
            .attribute("value")
            .map(str::to_string)
            .or_else(|| output.text().map(|t| t.trim().to_string()))
            .filter(|v| !v.is_empty());
        expected.push(ExpectedOutput { type_name, value });
    }

    Ok(TestCase {
        group: group.to_string(),
        name,
        expression,
        input_file: node.attribute("inputfile").map(str::to_string),
        invalid,
        predicate: node.attribute("predicate") == Some("true"),
        expected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        <tests xmlns="http://hl7.org/fhirpath/tests">
          <group name="testBasics">
            <test name="testSimple" inputfile="patient-example.xml">
              <expression>name.given</expression>
              <output type="string" value="John"/>
              <output type="string" value="Q"/>
            </test>
            <test name="testPredicate" predicate="true" inputfile="patient-example.xml">
              <expression>name.exists()</expression>
              <output type="boolean" value="true"/>
            </test>
            <test name="testBad">
              <expression invalid="syntax">name.(</expression>
            </test>
            <test name="testTextValue">
              <expression>1 + 1</expression>
              <output type="integer">2</output>
            </test>
          </group>
        </tests>"#;

    #[test]
    fn loads_groups_and_tests() {
        let cases = load_corpus(SAMPLE).unwrap();
        assert_eq!(cases.len(), 4);
        assert_eq!(cases[0].group, "testBasics");
        assert_eq!(cases[0].name, "testSimple");
        assert_eq!(cases[0].expression, "name.given");
        assert_eq!(cases[0].input_file.as_deref(), Some("patient-example.xml"));
        assert_eq!(cases[0].expected.len(), 2);
    }

    #[test]
    fn predicate_flag_is_read() {
        let cases = load_corpus(SAMPLE).unwrap();
        assert!(cases[1].predicate);
        assert!(!cases[0].predicate);
    }

    #[test]
    fn invalid_attribute_is_read() {
        let cases = load_corpus(SAMPLE).unwrap();
        assert_eq!(cases[2].invalid, Some(InvalidKind::Syntax));
        assert!(cases[2].expected.is_empty());
    }

    #[test]
    fn output_value_as_element_text() {
        let cases = load_corpus(SAMPLE).unwrap();
        assert_eq!(cases[3].expected[0].value.as_deref(), Some("2"));
        assert_eq!(cases[3].expected[0].type_name, "integer");
    }
}
