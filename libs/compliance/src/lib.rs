//! FHIRPath compliance harness
//!
//! Loads the official XML test corpus, runs every case through parse →
//! translate → execute against a live dialect, validates results against
//! per-test expectations (including expected-failure and predicate
//! tests), classifies failures, and emits a JSON report with latency
//! percentiles. A cross-dialect mode runs the same corpus against two
//! engines and reports disagreements.

pub mod classify;
pub mod corpus;
pub mod cross;
pub mod error;
pub mod report;
pub mod runner;
pub mod validate;

pub use classify::{classify, FailureCategory, FailureStage};
pub use corpus::{load_corpus, ExpectedOutput, InvalidKind, TestCase};
pub use cross::{compare_dialects, CrossDialectReport, Disagreement};
pub use error::ComplianceError;
pub use report::{ComplianceReport, Percentiles, PhaseTimings, TestRecord};
pub use runner::{decode_rows, ComplianceRunner, RunnerConfig};
pub use validate::{validate, Outcome, Verdict};
