//! Search parameter matching.
//!
//! Verifies that a resource returned by a search actually satisfies the
//! query parameter that produced it. Servers are allowed to ignore
//! parameters they do not support and return unfiltered results; a resource
//! that does not match its claimed filter is therefore a hard failure, not
//! a tolerable quirk.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::outcome::CheckOutcome;
use crate::path::resolve_path;

/// Comparison mode for one search parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchKind {
    /// Comma-list membership of an exact string value.
    Token,
    /// Reference equality; the bare logical id and the `Type/id` form are
    /// equivalent.
    Reference { target: String },
    /// Prefixed date comparison against a date or period element.
    Date,
}

/// Maps one query-parameter name to the element path it constrains and the
/// way values are compared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParamSpec {
    pub name: String,
    pub path: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

impl SearchParamSpec {
    pub fn token(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: MatchKind::Token,
        }
    }

    pub fn reference(
        name: impl Into<String>,
        path: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: MatchKind::Reference {
                target: target.into(),
            },
        }
    }

    pub fn date(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: MatchKind::Date,
        }
    }
}

/// Split a comma-list parameter value on unescaped commas. A comma preceded
/// by a backslash is literal and is restored after splitting:
/// `a\,b,c` becomes `["a,b", "c"]`.
pub fn split_param_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                chars.next();
                current.push(',');
            }
            ',' => values.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    values.push(current);
    values
}

/// Test one returned resource against the parameter that was sent. A
/// resource with no matching value at the constrained path is a hard
/// failure.
pub fn match_resource(spec: &SearchParamSpec, resource: &Value, raw_value: &str) -> CheckOutcome {
    let matched = match &spec.kind {
        MatchKind::Token => {
            let values = split_param_values(raw_value);
            resolve_path(resource, &spec.path, |leaf| {
                leaf.as_str()
                    .is_some_and(|s| values.iter().any(|v| v == s))
            })
        }
        MatchKind::Reference { target } => {
            let qualified = format!("{target}/{raw_value}");
            resolve_path(resource, &spec.path, |leaf| {
                leaf.as_str()
                    .is_some_and(|s| s == raw_value || s == qualified)
            })
        }
        MatchKind::Date => {
            let Some(search) = DateSearch::parse(raw_value) else {
                return CheckOutcome::fail(format!(
                    "Could not parse '{raw_value}' as a date search value for {}",
                    spec.name
                ));
            };
            resolve_path(resource, &spec.path, |leaf| search.matches(leaf))
        }
    };
    if matched {
        CheckOutcome::Pass
    } else {
        CheckOutcome::fail(format!(
            "{} on resource does not match {} requested",
            spec.name, spec.name
        ))
    }
}

/// Search prefixes for date comparison. Absent prefix means `eq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatePrefix {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Sa,
    Eb,
}

impl DatePrefix {
    fn strip(raw: &str) -> (Self, &str) {
        let prefix = match raw.get(..2) {
            Some("eq") => DatePrefix::Eq,
            Some("ne") => DatePrefix::Ne,
            Some("gt") => DatePrefix::Gt,
            Some("lt") => DatePrefix::Lt,
            Some("ge") => DatePrefix::Ge,
            Some("le") => DatePrefix::Le,
            Some("sa") => DatePrefix::Sa,
            Some("eb") => DatePrefix::Eb,
            _ => return (DatePrefix::Eq, raw),
        };
        (prefix, &raw[2..])
    }
}

/// A parsed date search value: prefix plus the instant range the date text
/// denotes at its precision (a bare year spans the whole year, etc.).
#[derive(Debug, Clone, Copy)]
struct DateSearch {
    prefix: DatePrefix,
    lower: NaiveDateTime,
    upper: NaiveDateTime,
}

impl DateSearch {
    fn parse(raw: &str) -> Option<Self> {
        let (prefix, rest) = DatePrefix::strip(raw);
        let (lower, upper) = parse_date_range(rest)?;
        Some(Self {
            prefix,
            lower,
            upper,
        })
    }

    /// Compare against a leaf that is either a date(Time) string or a
    /// period object with optional `start`/`end`. Open period ends are
    /// unbounded.
    fn matches(&self, leaf: &Value) -> bool {
        let (target_lower, target_upper) = match leaf {
            Value::String(s) => {
                let Some((lo, up)) = parse_date_range(s) else {
                    return false;
                };
                (Some(lo), Some(up))
            }
            Value::Object(obj) => {
                let lo = obj
                    .get("start")
                    .and_then(Value::as_str)
                    .and_then(parse_date_range_str)
                    .map(|(lo, _)| lo);
                let up = obj
                    .get("end")
                    .and_then(Value::as_str)
                    .and_then(parse_date_range_str)
                    .map(|(_, up)| up);
                if lo.is_none() && up.is_none() {
                    return false;
                }
                (lo, up)
            }
            _ => return false,
        };

        // Range comparisons with None meaning unbounded on that side.
        let starts_before_search_start = target_lower.is_none_or(|lo| lo < self.lower);
        let starts_at_or_after_search_start = !starts_before_search_start;
        let ends_after_search_end = target_upper.is_none_or(|up| up > self.upper);
        let ends_at_or_before_search_end = !ends_after_search_end;

        match self.prefix {
            DatePrefix::Eq => starts_at_or_after_search_start && ends_at_or_before_search_end,
            DatePrefix::Ne => starts_before_search_start || ends_after_search_end,
            DatePrefix::Lt => starts_before_search_start,
            DatePrefix::Gt => ends_after_search_end,
            DatePrefix::Le => target_lower.is_none_or(|lo| lo <= self.upper),
            DatePrefix::Ge => target_upper.is_none_or(|up| up >= self.lower),
            DatePrefix::Sa => target_lower.is_some_and(|lo| lo > self.upper),
            DatePrefix::Eb => target_upper.is_some_and(|up| up < self.lower),
        }
    }
}

fn parse_date_range_str(s: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    parse_date_range(s)
}

/// Expand a FHIR date/dateTime literal (YYYY, YYYY-MM, YYYY-MM-DD, or full
/// timestamp) to the instant range it covers.
fn parse_date_range(s: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        let instant = dt.naive_utc();
        return Some((instant, instant));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some((dt, dt));
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(day_span(d, d));
    }
    if let Some((year, month)) = parse_year_month(s) {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last = last_day_of_month(year, month)?;
        return Some(day_span(first, last));
    }
    if s.len() == 4
        && let Ok(year) = s.parse::<i32>()
    {
        let first = NaiveDate::from_ymd_opt(year, 1, 1)?;
        let last = NaiveDate::from_ymd_opt(year, 12, 31)?;
        return Some(day_span(first, last));
    }
    None
}

fn parse_year_month(s: &str) -> Option<(i32, u32)> {
    let (year, month) = s.split_once('-')?;
    if year.len() != 4 || month.len() != 2 {
        return None;
    }
    Some((year.parse().ok()?, month.parse().ok()?))
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next.pred_opt()
}

fn day_span(first: NaiveDate, last: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    (
        first.and_hms_opt(0, 0, 0).expect("valid time"),
        last.and_hms_opt(23, 59, 59).expect("valid time"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_plain_list() {
        assert_eq!(split_param_values("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_split_escaped_comma() {
        assert_eq!(split_param_values(r"a\,b,c"), vec!["a,b", "c"]);
    }

    #[test]
    fn test_split_single_value() {
        assert_eq!(split_param_values("finished"), vec!["finished"]);
    }

    #[test]
    fn test_split_backslash_not_before_comma_is_literal() {
        assert_eq!(split_param_values(r"a\b,c"), vec![r"a\b", "c"]);
    }

    #[test]
    fn test_token_match() {
        let spec = SearchParamSpec::token("status", "status");
        let resource = json!({"resourceType": "Encounter", "status": "finished"});
        assert!(match_resource(&spec, &resource, "planned,finished").is_pass());
        assert!(match_resource(&spec, &resource, "planned").is_fail());
    }

    #[test]
    fn test_token_match_absent_field_fails() {
        let spec = SearchParamSpec::token("identifier", "identifier.value");
        let resource = json!({"resourceType": "Encounter", "id": "1"});
        assert!(match_resource(&spec, &resource, "12345").is_fail());
    }

    #[test]
    fn test_reference_match_accepts_both_forms() {
        let spec = SearchParamSpec::reference("patient", "subject.reference", "Patient");
        let bare = json!({"subject": {"reference": "Patient/42"}});
        assert!(match_resource(&spec, &bare, "42").is_pass());
        assert!(match_resource(&spec, &bare, "Patient/42").is_pass());
        assert!(match_resource(&spec, &bare, "43").is_fail());
    }

    #[test]
    fn test_date_eq_within_period() {
        let spec = SearchParamSpec::date("date", "period");
        let resource = json!({
            "period": {"start": "2020-03-01T10:00:00Z", "end": "2020-03-01T11:00:00Z"}
        });
        assert!(match_resource(&spec, &resource, "2020-03-01").is_pass());
        assert!(match_resource(&spec, &resource, "eq2020-03-01").is_pass());
        assert!(match_resource(&spec, &resource, "2020-03-02").is_fail());
    }

    #[test]
    fn test_date_prefixes_against_plain_date() {
        let spec = SearchParamSpec::date("date", "period.start");
        let resource = json!({"period": {"start": "2020-06-15"}});
        assert!(match_resource(&spec, &resource, "ge2020-01-01").is_pass());
        assert!(match_resource(&spec, &resource, "le2020-12-31").is_pass());
        assert!(match_resource(&spec, &resource, "gt2020-12-31").is_fail());
        assert!(match_resource(&spec, &resource, "lt2020-01-01").is_fail());
    }

    #[test]
    fn test_date_starts_after_and_ends_before_prefixes() {
        let spec = SearchParamSpec::date("date", "period.start");
        let resource = json!({"period": {"start": "2020-06-15"}});
        // sa/eb are strict: touching the boundary day is not enough.
        assert!(match_resource(&spec, &resource, "sa2020-01-01").is_pass());
        assert!(match_resource(&spec, &resource, "sa2020-06-15").is_fail());
        assert!(match_resource(&spec, &resource, "eb2020-12-31").is_pass());
        assert!(match_resource(&spec, &resource, "eb2020-06-15").is_fail());
    }

    #[test]
    fn test_date_sa_eb_open_period_sides_never_match() {
        let spec = SearchParamSpec::date("date", "period");
        let open_start = json!({"period": {"end": "2020-06-15"}});
        let open_end = json!({"period": {"start": "2020-06-15"}});
        // An unbounded side cannot be strictly after (or before) anything.
        assert!(match_resource(&spec, &open_start, "sa2019-01-01").is_fail());
        assert!(match_resource(&spec, &open_end, "eb2021-01-01").is_fail());
    }

    #[test]
    fn test_date_open_ended_period() {
        let spec = SearchParamSpec::date("date", "period");
        let resource = json!({"period": {"start": "2020-03-01"}});
        // Open end: the period extends past any search range.
        assert!(match_resource(&spec, &resource, "gt2021-01-01").is_pass());
        assert!(match_resource(&spec, &resource, "eq2020-03-01").is_fail());
    }

    #[test]
    fn test_date_year_precision() {
        let spec = SearchParamSpec::date("date", "period.start");
        let resource = json!({"period": {"start": "2020-06-15"}});
        assert!(match_resource(&spec, &resource, "2020").is_pass());
        assert!(match_resource(&spec, &resource, "2019").is_fail());
    }

    #[test]
    fn test_unparseable_date_search_fails() {
        let spec = SearchParamSpec::date("date", "period");
        let resource = json!({"period": {"start": "2020-03-01"}});
        assert!(match_resource(&spec, &resource, "not-a-date").is_fail());
    }

    #[test]
    fn test_spec_serde_round_trip() {
        let spec = SearchParamSpec::reference("patient", "subject.reference", "Patient");
        let encoded = serde_json::to_value(&spec).unwrap();
        assert_eq!(encoded["kind"], "reference");
        let decoded: SearchParamSpec = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, spec);
    }
}
