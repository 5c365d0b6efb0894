//! End-to-end harness test: a miniature corpus with fixtures on disk,
//! executed against in-memory DuckDB.

use basalt_compliance::{load_corpus, ComplianceRunner, RunnerConfig};
use basalt_dialect::DuckDbDialect;

const CORPUS: &str = r#"
<tests xmlns="http://hl7.org/fhirpath/tests">
  <group name="arithmetic">
    <test name="addition">
      <expression>1 + 1</expression>
      <output type="integer" value="2"/>
    </test>
    <test name="division_truncates">
      <expression>(-7) div 2</expression>
      <output type="integer" value="-3"/>
    </test>
  </group>
  <group name="navigation">
    <test name="first_given" inputfile="patient-example.xml">
      <expression>Patient.name.given.first()</expression>
      <output type="string" value="John"/>
    </test>
    <test name="official_family" inputfile="patient-example.xml">
      <expression>Patient.name.where(use = 'official').family</expression>
      <output type="string" value="Smith"/>
    </test>
    <test name="exists_predicate" predicate="true" inputfile="patient-example.xml">
      <expression>Patient.name.exists()</expression>
      <output type="boolean" value="true"/>
    </test>
    <test name="missing_member_is_empty" inputfile="patient-example.xml">
      <expression>Patient.contact</expression>
    </test>
  </group>
  <group name="failures">
    <test name="syntax_error">
      <expression invalid="syntax">1 + </expression>
    </test>
    <test name="semantic_error">
      <expression invalid="semantic">1.fooBar()</expression>
    </test>
    <test name="execution_error">
      <expression invalid="execution">'x' as UnheardOfType</expression>
    </test>
  </group>
</tests>"#;

const PATIENT_FIXTURE: &str = r#"
<Patient xmlns="http://hl7.org/fhir">
  <name>
    <use value="official"/>
    <family value="Smith"/>
    <given value="John"/>
    <given value="Q"/>
  </name>
  <name>
    <use value="nickname"/>
    <family value="S"/>
  </name>
  <birthDate value="1970-01-01"/>
</Patient>"#;

#[test]
fn miniature_suite_is_fully_compliant() {
    let fixtures = tempdir();
    std::fs::write(fixtures.join("patient-example.xml"), PATIENT_FIXTURE).unwrap();

    let cases = load_corpus(CORPUS).expect("corpus");
    assert_eq!(cases.len(), 9);

    let dialect = DuckDbDialect::in_memory().expect("duckdb");
    let mut runner = ComplianceRunner::new(
        &dialect,
        RunnerConfig {
            fixtures_dir: Some(fixtures.clone()),
        },
    );
    let report = runner.run_suite(&cases);

    let failures: Vec<_> = report
        .top_failures
        .iter()
        .map(|f| format!("{}: {}", f.name, f.reason))
        .collect();
    assert_eq!(report.passed, report.total, "failures: {:?}", failures);
    assert!((report.compliance_percentage - 100.0).abs() < f64::EPSILON);

    std::fs::remove_dir_all(&fixtures).ok();
}

#[test]
fn report_counts_real_failures() {
    let corpus = r#"
      <tests><group name="g">
        <test name="wrong_value">
          <expression>1 + 1</expression>
          <output type="integer" value="3"/>
        </test>
      </group></tests>"#;
    let cases = load_corpus(corpus).unwrap();
    let dialect = DuckDbDialect::in_memory().unwrap();
    let mut runner = ComplianceRunner::new(&dialect, RunnerConfig::default());
    let report = runner.run_suite(&cases);
    assert_eq!(report.failed, 1);
    assert_eq!(report.top_failures.len(), 1);
    assert!(report.top_failures[0].reason.contains("mismatch"));
}

fn tempdir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "basalt-compliance-test-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
