//! Parse and build errors

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of a parse failure, used by callers that group
/// failures (compliance harness, CLI diagnostics).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorCategory {
    /// The expression was empty or whitespace-only.
    EmptyExpression,
    /// The lexer rejected a character sequence.
    Token,
    /// The token stream did not match the grammar.
    Syntax,
    /// The raw tree was grammatically valid but structurally unusable.
    Grammar,
}

impl ParseErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorCategory::EmptyExpression => "empty_expression",
            ParseErrorCategory::Token => "token",
            ParseErrorCategory::Syntax => "syntax",
            ParseErrorCategory::Grammar => "grammar",
        }
    }
}

/// A parse failure with source location and an optional remediation hint.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub category: ParseErrorCategory,
    /// Domain-aware hint (known resource name misuse, unbalanced
    /// delimiters). Empty for failures with no obvious remediation.
    pub hint: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            category: ParseErrorCategory::Syntax,
            hint: None,
        }
    }

    pub fn with_category(mut self, category: ParseErrorCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.line, self.column
        )?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

/// FHIRPath front-end errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(ParseError),

    #[error("Build error: {0}")]
    Build(String),
}

impl Error {
    /// Convenience constructor for parser-internal call sites.
    pub fn parse(message: impl Into<String>, line: usize, column: usize) -> Self {
        Error::Parse(ParseError::new(message, line, column))
    }

    pub fn parse_error(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Build(_) => None,
        }
    }

    pub fn category(&self) -> ParseErrorCategory {
        match self {
            Error::Parse(e) => e.category,
            Error::Build(_) => ParseErrorCategory::Grammar,
        }
    }
}

/// Known FHIR resource names used to enrich parse errors with a
/// domain-aware hint when a resource-rooted expression fails to parse.
static KNOWN_RESOURCES: phf::Set<&'static str> = phf::phf_set! {
    "Patient", "Observation", "Condition", "Procedure", "Encounter",
    "MedicationRequest", "MedicationStatement", "DiagnosticReport",
    "Immunization", "AllergyIntolerance", "CarePlan", "Claim",
    "Organization", "Practitioner", "Location", "Bundle", "ValueSet",
    "Questionnaire", "QuestionnaireResponse", "Specimen", "Device",
};

/// Attach a healthcare-context hint to `error` when the failing expression
/// mentions a known resource or has unbalanced delimiters/quotes.
pub(crate) fn enrich_parse_error(mut error: ParseError, expression: &str) -> ParseError {
    if error.hint.is_some() {
        return error;
    }

    let mut parens = 0i32;
    let mut brackets = 0i32;
    let mut braces = 0i32;
    let mut quotes = 0usize;
    for c in expression.chars() {
        match c {
            '(' => parens += 1,
            ')' => parens -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            '{' => braces += 1,
            '}' => braces -= 1,
            '\'' => quotes += 1,
            _ => {}
        }
    }

    if parens != 0 {
        error.hint = Some("unbalanced parentheses in expression".to_string());
    } else if brackets != 0 {
        error.hint = Some("unbalanced square brackets in expression".to_string());
    } else if braces != 0 {
        error.hint = Some("unbalanced braces in expression".to_string());
    } else if quotes % 2 != 0 {
        error.hint = Some("unterminated string literal in expression".to_string());
    } else if let Some(resource) = expression
        .split(|c: char| !c.is_alphanumeric())
        .find(|word| KNOWN_RESOURCES.contains(word))
    {
        error.hint = Some(format!(
            "expression navigates the {} resource; check member spelling and function arguments",
            resource
        ));
    }

    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_for_unbalanced_parens() {
        let err = enrich_parse_error(
            ParseError::new("unexpected end of input", 1, 12),
            "Patient.name.where(use='official'",
        );
        assert_eq!(
            err.hint.as_deref(),
            Some("unbalanced parentheses in expression")
        );
    }

    #[test]
    fn hint_for_known_resource() {
        let err = enrich_parse_error(
            ParseError::new("unexpected token", 1, 9),
            "Patient..name",
        );
        assert!(err.hint.unwrap().contains("Patient"));
    }

    #[test]
    fn existing_hint_is_preserved() {
        let err = enrich_parse_error(
            ParseError::new("boom", 1, 1).with_hint("original"),
            "Patient.name(",
        );
        assert_eq!(err.hint.as_deref(), Some("original"));
    }
}
