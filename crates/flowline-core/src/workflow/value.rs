//! Loose value semantics shared by interpolation filters and condition operators.
//!
//! Workflow data arrives as untyped JSON, so comparisons and casts follow a
//! small set of coercion rules: numeric strings count as numbers, truthiness
//! treats `0`, `""`, `"0"`, empty collections and null as false, and
//! stringification renders scalars plainly and containers as JSON.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};

use super::context::EntityRef;

/// Numeric view of a value: numbers and trimmed numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

pub fn is_numeric(value: &Value) -> bool {
    as_number(value).is_some()
}

/// Boolean coercion.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Loose equality used for set membership.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(_) | Value::Null, _) | (_, Value::Bool(_) | Value::Null) => {
            is_truthy(a) == is_truthy(b)
        }
        (Value::Number(_), Value::Number(_) | Value::String(_))
        | (Value::String(_), Value::Number(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => to_display(a) == to_display(b),
        },
        (Value::String(x), Value::String(y)) => match (as_number(a), as_number(b)) {
            (Some(nx), Some(ny)) => nx == ny,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Render a value for substitution into a larger string.
///
/// Null becomes empty, booleans become `true`/`false`, entity references
/// render as their key, and other containers as compact JSON.
pub fn to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Object(_) => match EntityRef::from_value(value) {
            Some(entity) => entity.identity().to_string(),
            None => serde_json::to_string(value).unwrap_or_default(),
        },
        Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// JSON number from an `f64`, null when not finite.
pub fn number(value: f64) -> Value {
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

/// Integer cast: numbers truncate, numeric strings parse, booleans map to 0/1.
pub fn to_integer(value: &Value) -> i64 {
    match value {
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Value::String(_) => as_number(value).map_or(0, |f| f as i64),
        Value::Array(items) => i64::from(!items.is_empty()),
        Value::Object(map) => i64::from(!map.is_empty()),
        Value::Null => 0,
    }
}

/// Parse a date-like value.
///
/// Accepts unix timestamps, RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD`, and the words `now`, `today`,
/// `tomorrow`, `yesterday`. Naive values are taken as UTC.
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => Utc.timestamp_opt(n.as_i64()?, 0).single(),
        Value::String(s) => parse_datetime_str(s.trim()),
        _ => None,
    }
}

fn parse_datetime_str(s: &str) -> Option<DateTime<Utc>> {
    let now = Utc::now();
    let midnight = |dt: DateTime<Utc>| {
        dt.date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
    };
    match s.to_ascii_lowercase().as_str() {
        "now" => return Some(now),
        "today" => return midnight(now),
        "tomorrow" => return midnight(now + Duration::days(1)),
        "yesterday" => return midnight(now - Duration::days(1)),
        _ => {}
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive));
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_numbers() {
        assert_eq!(as_number(&json!("42")), Some(42.0));
        assert_eq!(as_number(&json!(" 1.5 ")), Some(1.5));
        assert_eq!(as_number(&json!("abc")), None);
        assert_eq!(as_number(&json!("")), None);
        assert_eq!(as_number(&json!(true)), None);
    }

    #[test]
    fn truthiness() {
        for falsy in [json!(null), json!(false), json!(0), json!(0.0), json!(""), json!("0"), json!([]), json!({})] {
            assert!(!is_truthy(&falsy), "{falsy} should be falsy");
        }
        for truthy in [json!(true), json!(1), json!("a"), json!("false"), json!([0])] {
            assert!(is_truthy(&truthy), "{truthy} should be truthy");
        }
    }

    #[test]
    fn loose_equality() {
        assert!(loose_eq(&json!(1), &json!("1")));
        assert!(loose_eq(&json!("1.0"), &json!("1")));
        assert!(loose_eq(&json!(null), &json!(false)));
        assert!(loose_eq(&json!(true), &json!("yes")));
        assert!(!loose_eq(&json!("a"), &json!("A")));
        assert!(!loose_eq(&json!(2), &json!("two")));
    }

    #[test]
    fn display_rules() {
        assert_eq!(to_display(&json!(null)), "");
        assert_eq!(to_display(&json!(true)), "true");
        assert_eq!(to_display(&json!(5)), "5");
        assert_eq!(to_display(&json!([1, 2])), "[1,2]");
        assert_eq!(to_display(&json!({ "a": 1 })), r#"{"a":1}"#);
        assert_eq!(to_display(&EntityRef::new("order", "42").to_value()), "42");
    }

    #[test]
    fn integer_cast() {
        assert_eq!(to_integer(&json!(3.9)), 3);
        assert_eq!(to_integer(&json!("12")), 12);
        assert_eq!(to_integer(&json!(true)), 1);
        assert_eq!(to_integer(&json!("x")), 0);
    }

    #[test]
    fn parses_common_date_formats() {
        let d = parse_datetime(&json!("2024-03-05")).unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2024, 3, 5));

        let dt = parse_datetime(&json!("2024-03-05 10:30:00")).unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-05T10:30:00+00:00");

        assert!(parse_datetime(&json!("2024-03-05T10:30:00+02:00")).is_some());
        assert!(parse_datetime(&json!(0)).is_some());
        assert!(parse_datetime(&json!("now")).is_some());
        assert!(parse_datetime(&json!("not a date")).is_none());
    }
}
