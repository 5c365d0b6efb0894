//! Temporal literal parsing
//!
//! `@`-prefixed literals carry a precision (year through fractional second)
//! and, when partially specified, compare as half-open intervals. This
//! module parses literal bodies (the text after `@`) into a `TemporalInfo`
//! record holding the normalized text, the declared precision, and the
//! `[start, end)` interval at that precision.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Which temporal literal family a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalKind {
    Date,
    DateTime,
    Time,
}

impl TemporalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalKind::Date => "date",
            TemporalKind::DateTime => "datetime",
            TemporalKind::Time => "time",
        }
    }
}

/// Declared precision of a temporal literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TemporalPrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Fraction,
}

impl TemporalPrecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemporalPrecision::Year => "year",
            TemporalPrecision::Month => "month",
            TemporalPrecision::Day => "day",
            TemporalPrecision::Hour => "hour",
            TemporalPrecision::Minute => "minute",
            TemporalPrecision::Second => "second",
            TemporalPrecision::Fraction => "fraction",
        }
    }
}

/// Parsed temporal literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalInfo {
    pub kind: TemporalKind,
    pub precision: TemporalPrecision,
    /// Canonical text preserving precision (`2015-02T`, `14:34:28`).
    /// Re-parsing this text yields an identical record.
    pub normalized: String,
    /// Half-open interval covered by the literal at its precision. Time
    /// literals are anchored on 1970-01-01.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// True when the literal specifies fewer components than its kind
    /// allows (`@2015T` is a partial datetime; `@2015-02-04` is a full
    /// date, not partial).
    pub is_partial: bool,
    /// Timezone offset in seconds east of UTC, when one was written.
    pub timezone_offset: Option<i32>,
    /// Exact source body (after `@`), kept for diagnostics and SQL
    /// emission of the original shape.
    pub original: String,
    /// Number of fractional-second digits written (0 when none).
    pub fraction_digits: u8,
}

impl TemporalInfo {
    /// The value padded to a full `YYYY-MM-DD HH:MM:SS[.fff]` shape, as SQL
    /// temporal literals want it.
    pub fn sql_text(&self) -> String {
        match self.kind {
            TemporalKind::Date => self.start.date().format("%Y-%m-%d").to_string(),
            TemporalKind::DateTime => {
                if self.fraction_digits > 0 {
                    self.start.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
                } else {
                    self.start.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
            TemporalKind::Time => {
                if self.fraction_digits > 0 {
                    self.start.format("%H:%M:%S%.3f").to_string()
                } else {
                    self.start.format("%H:%M:%S").to_string()
                }
            }
        }
    }

    /// Two temporal values are only directly comparable when their
    /// intervals are either identical or disjoint; overlap at differing
    /// precision yields an empty comparison result.
    pub fn comparable_with(&self, other: &TemporalInfo) -> bool {
        self.start == other.start && self.end == other.end
            || self.end <= other.start
            || other.end <= self.start
    }
}

fn anchor_time(time: NaiveTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .expect("epoch date")
        .and_time(time)
}

fn month_interval(year: i32, month: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = NaiveDate::from_ymd_opt(next_year, next_month, 1)?.and_hms_opt(0, 0, 0)?;
    Some((start, end))
}

/// Split a datetime body into its date part, optional time part, and
/// optional timezone suffix. Returns `(date, time, tz_text, offset_secs)`.
fn split_datetime(body: &str) -> Option<(&str, Option<&str>, Option<&str>, Option<i32>)> {
    let (date_part, rest) = match body.split_once('T') {
        Some((d, r)) => (d, r),
        None => return Some((body, None, None, None)),
    };
    if rest.is_empty() {
        return Some((date_part, None, None, None));
    }

    if let Some(stripped) = rest.strip_suffix('Z') {
        return Some((date_part, Some(stripped), Some("Z"), Some(0)));
    }
    // A timezone sign can only appear after the hour digits, so search from
    // position 1 to skip nothing (time starts with digits).
    if let Some(pos) = rest.rfind(['+', '-']) {
        let (time, tz) = rest.split_at(pos);
        if tz.len() == 6 && tz.as_bytes()[3] == b':' {
            let sign = if tz.starts_with('-') { -1 } else { 1 };
            let hours: i32 = tz[1..3].parse().ok()?;
            let minutes: i32 = tz[4..6].parse().ok()?;
            return Some((
                date_part,
                Some(time),
                Some(tz),
                Some(sign * (hours * 3600 + minutes * 60)),
            ));
        }
    }
    Some((date_part, Some(rest), None, None))
}

/// Parse the date half of a literal: `YYYY[-MM[-DD]]`.
fn parse_date_body(body: &str) -> Option<(NaiveDateTime, NaiveDateTime, TemporalPrecision)> {
    match body.len() {
        4 => {
            let year: i32 = body.parse().ok()?;
            let (start, _) = month_interval(year, 1)?;
            let (end, _) = month_interval(year + 1, 1)?;
            Some((start, end, TemporalPrecision::Year))
        }
        7 => {
            let year: i32 = body[..4].parse().ok()?;
            let month: u32 = body[5..7].parse().ok()?;
            if body.as_bytes()[4] != b'-' || !(1..=12).contains(&month) {
                return None;
            }
            let (start, end) = month_interval(year, month)?;
            Some((start, end, TemporalPrecision::Month))
        }
        10 => {
            let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").ok()?;
            let start = date.and_hms_opt(0, 0, 0)?;
            Some((start, start + Duration::days(1), TemporalPrecision::Day))
        }
        _ => None,
    }
}

/// Parse the time half: `HH[:MM[:SS[.fff]]]`. Returns the time, the
/// precision, the interval width, and the fraction digit count.
fn parse_time_body(body: &str) -> Option<(NaiveTime, TemporalPrecision, Duration, u8)> {
    let (main, frac) = match body.split_once('.') {
        Some((m, f)) => (m, Some(f)),
        None => (body, None),
    };

    let parts: Vec<&str> = main.split(':').collect();
    let (hour, minute, second, precision, step) = match parts.as_slice() {
        [hh] => (hh.parse().ok()?, 0, 0, TemporalPrecision::Hour, Duration::hours(1)),
        [hh, mm] => (
            hh.parse().ok()?,
            mm.parse().ok()?,
            0,
            TemporalPrecision::Minute,
            Duration::minutes(1),
        ),
        [hh, mm, ss] => (
            hh.parse().ok()?,
            mm.parse().ok()?,
            ss.parse().ok()?,
            if frac.is_some() {
                TemporalPrecision::Fraction
            } else {
                TemporalPrecision::Second
            },
            Duration::seconds(1),
        ),
        _ => return None,
    };

    let (nanos, digits, step) = match frac {
        Some(f) if !f.is_empty() && f.len() <= 9 && f.bytes().all(|b| b.is_ascii_digit()) => {
            let digits = f.len() as u8;
            let scale = 10u64.pow(9 - f.len() as u32);
            let nanos = f.parse::<u64>().ok()? * scale;
            (nanos as u32, digits, Duration::nanoseconds(scale as i64))
        }
        Some(_) => return None,
        None => (0, 0, step),
    };

    let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanos)?;
    Some((time, precision, step, digits))
}

/// Parse a date literal body (`2015`, `2015-02`, `2015-02-04`).
pub fn parse_date(body: &str) -> Option<TemporalInfo> {
    let (start, end, precision) = parse_date_body(body)?;
    Some(TemporalInfo {
        kind: TemporalKind::Date,
        precision,
        normalized: body.to_string(),
        start,
        end,
        is_partial: precision != TemporalPrecision::Day,
        timezone_offset: None,
        original: body.to_string(),
        fraction_digits: 0,
    })
}

/// Parse a datetime literal body. A trailing `T` (`2015T`, `2015-02T`,
/// `2015-02-04T`) marks a partial datetime whose precision is the date
/// component's precision.
pub fn parse_datetime(body: &str) -> Option<TemporalInfo> {
    let trailing_t = body.ends_with('T');
    let (date_part, time_part, tz_text, offset) = split_datetime(body)?;
    let (date_start, date_end, date_precision) = parse_date_body(date_part)?;

    match time_part {
        None | Some("") => {
            // Date-shaped datetime; partial whenever any component below
            // second-precision is unspecified (always, on this arm).
            let normalized = if trailing_t {
                format!("{}T", date_part)
            } else {
                date_part.to_string()
            };
            Some(TemporalInfo {
                kind: TemporalKind::DateTime,
                precision: date_precision,
                normalized,
                start: date_start,
                end: date_end,
                is_partial: true,
                timezone_offset: None,
                original: body.to_string(),
                fraction_digits: 0,
            })
        }
        Some(time_body) => {
            let (time, precision, step, fraction_digits) = parse_time_body(time_body)?;
            let start = date_start.date().and_time(time);
            let mut normalized = format!("{}T{}", date_part, time_body);
            if let Some(tz) = tz_text {
                normalized.push_str(tz);
            }
            Some(TemporalInfo {
                kind: TemporalKind::DateTime,
                precision,
                normalized,
                start,
                end: start + step,
                is_partial: precision < TemporalPrecision::Second,
                timezone_offset: offset,
                original: body.to_string(),
                fraction_digits,
            })
        }
    }
}

/// Parse a time literal body (`14`, `14:34`, `14:34:28.123`).
pub fn parse_time(body: &str) -> Option<TemporalInfo> {
    let (time, precision, step, fraction_digits) = parse_time_body(body)?;
    let start = anchor_time(time);
    Some(TemporalInfo {
        kind: TemporalKind::Time,
        precision,
        normalized: body.to_string(),
        start,
        end: start + step,
        is_partial: precision < TemporalPrecision::Second,
        timezone_offset: None,
        original: body.to_string(),
        fraction_digits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_precision_date() {
        let info = parse_date("2015").unwrap();
        assert_eq!(info.precision, TemporalPrecision::Year);
        assert!(info.is_partial);
        assert_eq!(info.start.to_string(), "2015-01-01 00:00:00");
        assert_eq!(info.end.to_string(), "2016-01-01 00:00:00");
    }

    #[test]
    fn month_precision_rolls_over_december() {
        let info = parse_date("2015-12").unwrap();
        assert_eq!(info.end.to_string(), "2016-01-01 00:00:00");
    }

    #[test]
    fn day_precision_date_is_not_partial() {
        let info = parse_date("2015-02-04").unwrap();
        assert_eq!(info.precision, TemporalPrecision::Day);
        assert!(!info.is_partial);
        assert_eq!(info.end - info.start, Duration::days(1));
    }

    #[test]
    fn partial_datetime_with_trailing_t() {
        let info = parse_datetime("2015T").unwrap();
        assert_eq!(info.kind, TemporalKind::DateTime);
        assert_eq!(info.precision, TemporalPrecision::Year);
        assert!(info.is_partial);
        assert_eq!(info.normalized, "2015T");
    }

    #[test]
    fn datetime_second_precision() {
        let info = parse_datetime("2015-02-04T14:34:28").unwrap();
        assert_eq!(info.precision, TemporalPrecision::Second);
        assert!(!info.is_partial);
        assert_eq!(info.end - info.start, Duration::seconds(1));
    }

    #[test]
    fn datetime_fraction_and_timezone() {
        let info = parse_datetime("2015-02-04T14:34:28.123+10:00").unwrap();
        assert_eq!(info.precision, TemporalPrecision::Fraction);
        assert_eq!(info.fraction_digits, 3);
        assert_eq!(info.timezone_offset, Some(36000));
        assert_eq!(info.end - info.start, Duration::milliseconds(1));
    }

    #[test]
    fn zulu_timezone() {
        let info = parse_datetime("2015-02-04T14:34:28Z").unwrap();
        assert_eq!(info.timezone_offset, Some(0));
    }

    #[test]
    fn time_precisions() {
        assert_eq!(
            parse_time("14").unwrap().precision,
            TemporalPrecision::Hour
        );
        assert_eq!(
            parse_time("14:34").unwrap().precision,
            TemporalPrecision::Minute
        );
        assert_eq!(
            parse_time("14:34:28").unwrap().precision,
            TemporalPrecision::Second
        );
        assert_eq!(
            parse_time("14:34:28.1").unwrap().precision,
            TemporalPrecision::Fraction
        );
    }

    #[test]
    fn normalized_text_round_trips() {
        for body in ["2015", "2015-02", "2015-02-04"] {
            let info = parse_date(body).unwrap();
            assert_eq!(parse_date(&info.normalized).unwrap(), info);
        }
        for body in ["2015T", "2015-02T", "2015-02-04T14:34", "2015-02-04T14:34:28.123+10:00"] {
            let info = parse_datetime(body).unwrap();
            assert_eq!(parse_datetime(&info.normalized).unwrap(), info);
        }
        for body in ["14", "14:34", "14:34:28.123"] {
            let info = parse_time(body).unwrap();
            assert_eq!(parse_time(&info.normalized).unwrap(), info);
        }
    }

    #[test]
    fn differing_precision_overlap_is_incomparable() {
        let year = parse_date("2015").unwrap();
        let day = parse_date("2015-01-01").unwrap();
        assert!(!year.comparable_with(&day));

        let other_year = parse_date("2016").unwrap();
        assert!(year.comparable_with(&other_year));
    }

    #[test]
    fn sql_text_pads_partials() {
        assert_eq!(parse_datetime("2015T").unwrap().sql_text(), "2015-01-01 00:00:00");
        assert_eq!(
            parse_datetime("2015-02-04T14").unwrap().sql_text(),
            "2015-02-04 14:00:00"
        );
        assert_eq!(parse_date("2015-02").unwrap().sql_text(), "2015-02-01");
    }

    #[test]
    fn invalid_bodies_are_rejected() {
        assert!(parse_date("20159").is_none());
        assert!(parse_date("2015-13").is_none());
        assert!(parse_time("25").is_none());
        assert!(parse_datetime("2015-02-30T10:00").is_none());
    }
}
