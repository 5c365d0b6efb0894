//! Property-style tests for the parser front-end.

use basalt_fhirpath::temporal::{parse_date, parse_datetime, parse_time};
use basalt_fhirpath::{parse, ExprNode};
use quickcheck::{Arbitrary, Gen, QuickCheck, TestResult};

/// Structural equality that ignores spans and metadata.
fn same_shape(a: &ExprNode, b: &ExprNode) -> bool {
    if std::mem::discriminant(&a.kind) != std::mem::discriminant(&b.kind) {
        return false;
    }
    let (ca, cb) = (a.children(), b.children());
    if ca.len() != cb.len() {
        return false;
    }
    ca.iter().zip(cb.iter()).all(|(x, y)| same_shape(x, y))
}

/// A small pool of representative expressions for structural properties.
const EXPRESSIONS: &[&str] = &[
    "1 + 1",
    "Patient.name.given.first()",
    "Patient.name.where(use = 'official').family",
    "(1 | 2 | 2 | 3).distinct().count()",
    "value.ofType(Quantity).value",
    "birthDate < @1980",
    "@2015 = @2015-01-01",
    "deceased.exists() and active = true",
    "5 div 2 + 5 mod 2",
    "name.given.count() > 1 implies name.family.exists()",
];

#[derive(Debug, Clone)]
struct ExprIndex(usize);

impl Arbitrary for ExprIndex {
    fn arbitrary(g: &mut Gen) -> Self {
        ExprIndex(usize::arbitrary(g) % EXPRESSIONS.len())
    }
}

#[test]
fn reparsing_is_deterministic() {
    fn property(index: ExprIndex) -> bool {
        let source = EXPRESSIONS[index.0];
        let first = parse(source).unwrap();
        let second = parse(source).unwrap();
        first == second
    }
    QuickCheck::new().quickcheck(property as fn(ExprIndex) -> bool);
}

#[test]
fn inserted_block_comments_leave_the_shape_unchanged() {
    fn property(index: ExprIndex, seed: u8) -> TestResult {
        let source = EXPRESSIONS[index.0];
        // Insert a balanced block comment after the token boundary closest
        // to `seed` percent of the way in; whitespace positions are always
        // token boundaries in this pool.
        let boundaries: Vec<usize> = source
            .char_indices()
            .filter(|(_, c)| *c == ' ')
            .map(|(i, _)| i)
            .collect();
        if boundaries.is_empty() {
            return TestResult::discard();
        }
        let at = boundaries[seed as usize % boundaries.len()];
        let commented = format!("{}/* noise */{}", &source[..at], &source[at..]);

        let plain = parse(source).unwrap();
        let with_comment = parse(&commented).unwrap();
        TestResult::from_bool(same_shape(&plain, &with_comment))
    }
    QuickCheck::new().quickcheck(property as fn(ExprIndex, u8) -> TestResult);
}

#[test]
fn temporal_normalized_form_round_trips() {
    for body in ["2015", "2015-02", "2015-02-04"] {
        let info = parse_date(body).unwrap();
        assert_eq!(parse_date(&info.normalized).unwrap(), info, "{}", body);
    }
    for body in [
        "2015T",
        "2015-02T",
        "2015-02-04T",
        "2015-02-04T14",
        "2015-02-04T14:34",
        "2015-02-04T14:34:28",
        "2015-02-04T14:34:28.123",
        "2015-02-04T14:34:28.123+10:00",
        "2015-02-04T14:34:28Z",
    ] {
        let info = parse_datetime(body).unwrap();
        assert_eq!(parse_datetime(&info.normalized).unwrap(), info, "{}", body);
    }
    for body in ["14", "14:34", "14:34:28", "14:34:28.123"] {
        let info = parse_time(body).unwrap();
        assert_eq!(parse_time(&info.normalized).unwrap(), info, "{}", body);
    }
}
