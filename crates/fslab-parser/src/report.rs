//! Decoding of the planner's JSON results report.

use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Number, Value};

/// Fields of the results report. Every field is optional at the decoding
/// level; the classifier decides which absences matter.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlannerReport {
    #[serde(default, deserialize_with = "flag")]
    pub out_of_memory: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub valid: Option<bool>,
    #[serde(default, deserialize_with = "flag")]
    pub solved: Option<bool>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub memory: Option<i64>,
    #[serde(default)]
    pub search_time: Option<f64>,
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub time_backend: Option<f64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub plan_length: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub expanded: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub generated: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub evaluated: Option<i64>,
    #[serde(default)]
    pub plan: Option<Vec<String>>,
    #[serde(default)]
    pub gen_per_second: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportState {
    /// Missing file or whitespace only: the planner never finished writing.
    Empty,
    /// Present but not a valid report; carries the parser's message.
    Malformed(String),
    Decoded(PlannerReport),
}

pub fn decode_report(content: Option<&str>) -> ReportState {
    let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
        return ReportState::Empty;
    };
    // Parse to a value first: serde would otherwise fill the struct
    // positionally from a JSON array.
    let value = match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        Ok(_) => return ReportState::Malformed("report is not a JSON object".to_string()),
        Err(e) => return ReportState::Malformed(e.to_string()),
    };
    match serde_json::from_value::<PlannerReport>(value) {
        Ok(report) => ReportState::Decoded(report),
        Err(e) => ReportState::Malformed(e.to_string()),
    }
}

/// Accepts `true`/`false` as well as integer `0`/`1` style flags.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|f| match f {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    }))
}

/// Integers, or floats with an integral meaning (`12.0`).
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(n) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(v) = n.as_i64() {
        return Ok(Some(v));
    }
    match n.as_f64() {
        // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(Some(f as i64)),
        _ => Err(de::Error::custom(format!("expected an integer, found {}", n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_report_is_empty() {
        assert_eq!(decode_report(None), ReportState::Empty);
        assert_eq!(decode_report(Some("")), ReportState::Empty);
        assert_eq!(decode_report(Some("  \n\t")), ReportState::Empty);
    }

    #[test]
    fn syntax_errors_are_malformed_with_message() {
        match decode_report(Some("{\"solved\": 1,")) {
            ReportState::Malformed(msg) => assert!(msg.contains("EOF"), "unexpected message: {}", msg),
            other => panic!("expected malformed, got {:?}", other),
        }
    }

    #[test]
    fn non_object_and_wrong_types_are_malformed() {
        assert!(matches!(decode_report(Some("[1, 2]")), ReportState::Malformed(_)));
        assert_eq!(
            decode_report(Some("[true, true, true]")),
            ReportState::Malformed("report is not a JSON object".to_string())
        );
        assert!(matches!(decode_report(Some("42")), ReportState::Malformed(_)));
        assert!(matches!(decode_report(Some("null")), ReportState::Malformed(_)));
        assert!(matches!(
            decode_report(Some(r#"{"plan": "not-a-list"}"#)),
            ReportState::Malformed(_)
        ));
        assert!(matches!(
            decode_report(Some(r#"{"expanded": 1.5}"#)),
            ReportState::Malformed(_)
        ));
    }

    #[test]
    fn out_of_range_integral_floats_are_malformed() {
        match decode_report(Some(r#"{"solved": 1, "valid": true, "expanded": 1e19}"#)) {
            ReportState::Malformed(msg) => assert!(msg.contains("expected an integer"), "unexpected message: {}", msg),
            other => panic!("expected malformed, got {:?}", other),
        }
        assert!(matches!(
            decode_report(Some(r#"{"memory": -1e300}"#)),
            ReportState::Malformed(_)
        ));
        let ReportState::Decoded(report) = decode_report(Some(r#"{"generated": 9.0e15}"#)) else {
            panic!("expected decoded report");
        };
        assert_eq!(report.generated, Some(9_000_000_000_000_000));
    }

    #[test]
    fn flags_accept_bools_and_integers() {
        let state = decode_report(Some(
            r#"{"solved": 1, "valid": true, "out_of_memory": 0, "memory": 2048.0, "plan": ["(a)"]}"#,
        ));
        let ReportState::Decoded(report) = state else {
            panic!("expected decoded report");
        };
        assert_eq!(report.solved, Some(true));
        assert_eq!(report.valid, Some(true));
        assert_eq!(report.out_of_memory, Some(false));
        assert_eq!(report.memory, Some(2048));
        assert_eq!(report.plan, Some(vec!["(a)".to_string()]));
        assert_eq!(report.total_time, None);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let state = decode_report(Some(r#"{"solved": 0, "planner": "fs", "extra": {"a": 1}}"#));
        assert!(matches!(state, ReportState::Decoded(_)));
    }
}
