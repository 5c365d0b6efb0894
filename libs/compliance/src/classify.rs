//! Failure classification
//!
//! Failed tests are bucketed by matching the failing stage and message
//! fragments, so the report shows where compliance is actually lost
//! instead of one undifferentiated count.

use serde::Serialize;

/// Pipeline stage a failure surfaced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Parse,
    Translate,
    Execute,
    Validate,
}

/// Failure buckets reported per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    SemanticValidation,
    Binder,
    InvalidInput,
    ResultLogic,
    EmptyResult,
    Conversion,
    FunctionSignature,
    Translation,
    Uncategorized,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::SemanticValidation => "semantic_validation",
            FailureCategory::Binder => "binder",
            FailureCategory::InvalidInput => "invalid_input",
            FailureCategory::ResultLogic => "result_logic",
            FailureCategory::EmptyResult => "empty_result",
            FailureCategory::Conversion => "conversion",
            FailureCategory::FunctionSignature => "function_signature",
            FailureCategory::Translation => "translation",
            FailureCategory::Uncategorized => "uncategorized",
        }
    }
}

/// Categorise a failure by stage and message content.
pub fn classify(stage: FailureStage, message: &str) -> FailureCategory {
    let lowered = message.to_lowercase();

    match stage {
        FailureStage::Parse => {
            if lowered.contains("empty expression") {
                FailureCategory::InvalidInput
            } else {
                FailureCategory::SemanticValidation
            }
        }
        FailureStage::Translate => {
            if lowered.contains("unknown function") {
                FailureCategory::FunctionSignature
            } else if lowered.contains("expects") && lowered.contains("argument") {
                FailureCategory::FunctionSignature
            } else {
                FailureCategory::Translation
            }
        }
        FailureStage::Execute => {
            if lowered.contains("binder")
                || lowered.contains("does not exist")
                || lowered.contains("no function matches")
                || lowered.contains("invalid_fhir_type")
            {
                FailureCategory::Binder
            } else if lowered.contains("cast") || lowered.contains("conversion") {
                FailureCategory::Conversion
            } else {
                FailureCategory::Uncategorized
            }
        }
        FailureStage::Validate => {
            if lowered.contains("expected empty") || lowered.contains("got empty") {
                FailureCategory::EmptyResult
            } else if lowered.contains("expected failure") {
                FailureCategory::SemanticValidation
            } else if lowered.contains("count mismatch") || lowered.contains("value mismatch") {
                FailureCategory::ResultLogic
            } else {
                FailureCategory::ResultLogic
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failures_are_semantic_validation() {
        assert_eq!(
            classify(FailureStage::Parse, "Parse error: unexpected token"),
            FailureCategory::SemanticValidation
        );
        assert_eq!(
            classify(FailureStage::Parse, "Parse error: Empty expression"),
            FailureCategory::InvalidInput
        );
    }

    #[test]
    fn unknown_functions_are_signature_failures() {
        assert_eq!(
            classify(FailureStage::Translate, "unknown function 'foo' in 'foo()'"),
            FailureCategory::FunctionSignature
        );
        assert_eq!(
            classify(
                FailureStage::Translate,
                "substring() expects 1..2 argument(s), found 0"
            ),
            FailureCategory::FunctionSignature
        );
    }

    #[test]
    fn execution_binder_errors() {
        assert_eq!(
            classify(
                FailureStage::Execute,
                "Binder Error: Type INVALID_FHIR_TYPE_X does not exist"
            ),
            FailureCategory::Binder
        );
        assert_eq!(
            classify(FailureStage::Execute, "Could not cast 'abc' to BIGINT"),
            FailureCategory::Conversion
        );
    }

    #[test]
    fn validation_failures_are_result_logic() {
        assert_eq!(
            classify(FailureStage::Validate, "value mismatch at position 0"),
            FailureCategory::ResultLogic
        );
        assert_eq!(
            classify(FailureStage::Validate, "expected empty result, got 2 items"),
            FailureCategory::EmptyResult
        );
    }
}
