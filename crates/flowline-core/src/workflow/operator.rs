//! Atomic comparison operators used by field conditions and routing actions.
//!
//! Each operator accepts several alias spellings (`eq`, `=`, `==` all mean
//! `Equals`). Parsing an unknown spelling fails; applying an operator never
//! does. Ordering operators on non-numeric operands evaluate to false.

use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use serde_json::Value;

use super::condition::ConditionError;
use super::value::{as_number, is_truthy, loose_eq};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    IsNull,
    IsNotNull,
    IsEmpty,
    IsNotEmpty,
    In,
    NotIn,
    MatchesRegex,
    IsTrue,
    IsFalse,
    Between,
}

impl Operator {
    /// Every operator, in catalog order.
    pub const ALL: [Operator; 20] = [
        Operator::Equals,
        Operator::NotEquals,
        Operator::Contains,
        Operator::NotContains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::GreaterThan,
        Operator::GreaterOrEqual,
        Operator::LessThan,
        Operator::LessOrEqual,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::IsEmpty,
        Operator::IsNotEmpty,
        Operator::In,
        Operator::NotIn,
        Operator::MatchesRegex,
        Operator::IsTrue,
        Operator::IsFalse,
        Operator::Between,
    ];

    /// Canonical name followed by its aliases.
    pub fn spellings(&self) -> &'static [&'static str] {
        match self {
            Operator::Equals => &["equals", "eq", "=", "=="],
            Operator::NotEquals => &["not_equals", "neq", "!=", "<>"],
            Operator::Contains => &["contains"],
            Operator::NotContains => &["not_contains"],
            Operator::StartsWith => &["starts_with"],
            Operator::EndsWith => &["ends_with"],
            Operator::GreaterThan => &["greater_than", "gt", ">"],
            Operator::GreaterOrEqual => &["greater_or_equal", "gte", ">="],
            Operator::LessThan => &["less_than", "lt", "<"],
            Operator::LessOrEqual => &["less_or_equal", "lte", "<="],
            Operator::IsNull => &["is_null", "null"],
            Operator::IsNotNull => &["is_not_null", "not_null"],
            Operator::IsEmpty => &["is_empty", "empty"],
            Operator::IsNotEmpty => &["is_not_empty", "not_empty"],
            Operator::In => &["in"],
            Operator::NotIn => &["not_in"],
            Operator::MatchesRegex => &["matches_regex", "regex"],
            Operator::IsTrue => &["is_true", "true"],
            Operator::IsFalse => &["is_false", "false"],
            Operator::Between => &["between"],
        }
    }

    pub fn name(&self) -> &'static str {
        self.spellings()[0]
    }

    /// Compare `actual` (from the context) against `expected` (from config).
    pub fn apply(&self, actual: &Value, expected: &Value) -> bool {
        match self {
            Operator::Equals => equals(actual, expected),
            Operator::NotEquals => !equals(actual, expected),
            Operator::Contains => contains(actual, expected),
            Operator::NotContains => !contains(actual, expected),
            Operator::StartsWith => str_pair(actual, expected)
                .is_some_and(|(v, p)| v.to_lowercase().starts_with(&p.to_lowercase())),
            Operator::EndsWith => str_pair(actual, expected)
                .is_some_and(|(v, s)| v.to_lowercase().ends_with(&s.to_lowercase())),
            Operator::GreaterThan => numeric(actual, expected, |a, b| a > b),
            Operator::GreaterOrEqual => numeric(actual, expected, |a, b| a >= b),
            Operator::LessThan => numeric(actual, expected, |a, b| a < b),
            Operator::LessOrEqual => numeric(actual, expected, |a, b| a <= b),
            Operator::IsNull => actual.is_null(),
            Operator::IsNotNull => !actual.is_null(),
            Operator::IsEmpty => is_empty(actual),
            Operator::IsNotEmpty => !is_empty(actual),
            Operator::In => in_list(actual, expected),
            Operator::NotIn => !in_list(actual, expected),
            Operator::MatchesRegex => matches_regex(actual, expected),
            Operator::IsTrue => is_truthy(actual),
            Operator::IsFalse => !is_truthy(actual),
            Operator::Between => between(actual, expected),
        }
    }
}

impl FromStr for Operator {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Operator::ALL
            .into_iter()
            .find(|op| op.spellings().contains(&needle))
            .ok_or_else(|| ConditionError::UnknownOperator(s.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parse `operator` and apply it in one step.
pub fn evaluate_operator(
    operator: &str,
    actual: &Value,
    expected: &Value,
) -> Result<bool, ConditionError> {
    Ok(operator.parse::<Operator>()?.apply(actual, expected))
}

// ---------------------------------------------------------------------------
// Operator semantics
// ---------------------------------------------------------------------------

fn equals(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x == y;
    }
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return x.to_lowercase() == y.to_lowercase();
    }
    a == b
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Array(items), _) => items.contains(needle),
        (Value::String(h), Value::String(n)) => h.to_lowercase().contains(&n.to_lowercase()),
        _ => false,
    }
}

fn str_pair<'a>(a: &'a Value, b: &'a Value) -> Option<(&'a str, &'a str)> {
    Some((a.as_str()?, b.as_str()?))
}

fn numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        other => !is_truthy(other),
    }
}

fn in_list(value: &Value, list: &Value) -> bool {
    match list {
        Value::Array(items) => items.iter().any(|item| loose_eq(value, item)),
        single => loose_eq(value, single),
    }
}

/// Match a regex. Patterns starting with `/`, `#`, `~` or `@` are treated as
/// delimited (`/body/flags`); anything else matches case-insensitively.
fn matches_regex(value: &Value, pattern: &Value) -> bool {
    let (Some(subject), Some(pattern)) = (value.as_str(), pattern.as_str()) else {
        return false;
    };

    let (body, flags) = match pattern.chars().next() {
        Some(delim @ ('/' | '#' | '~' | '@')) => {
            let rest = &pattern[delim.len_utf8()..];
            match rest.rfind(delim) {
                Some(end) => (&rest[..end], &rest[end + delim.len_utf8()..]),
                None => return false,
            }
        }
        _ => (pattern, "i"),
    };

    let mut builder = RegexBuilder::new(body);
    builder
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'));
    builder.build().is_ok_and(|re| re.is_match(subject))
}

fn between(value: &Value, range: &Value) -> bool {
    let Some(bounds) = range.as_array().filter(|b| b.len() == 2) else {
        return false;
    };
    let Some(v) = as_number(value) else {
        return false;
    };
    let min = as_number(&bounds[0]).unwrap_or(0.0);
    let max = as_number(&bounds[1]).unwrap_or(0.0);
    v >= min && v <= max
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(op: &str, actual: Value, expected: Value) -> bool {
        evaluate_operator(op, &actual, &expected).unwrap()
    }

    #[test]
    fn aliases_behave_identically() {
        let cases = [
            (json!(5), json!("5.0")),
            (json!("Paid"), json!("paid")),
            (json!("a"), json!("b")),
            (json!(null), json!(null)),
        ];
        for op in Operator::ALL {
            for (actual, expected) in &cases {
                let canonical = op.apply(actual, expected);
                for spelling in op.spellings() {
                    assert_eq!(
                        evaluate_operator(spelling, actual, expected).unwrap(),
                        canonical,
                        "{spelling} disagrees with {}",
                        op.name()
                    );
                }
            }
        }
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let err = evaluate_operator("approximately", &json!(1), &json!(1)).unwrap_err();
        assert!(matches!(err, ConditionError::UnknownOperator(op) if op == "approximately"));
    }

    #[test]
    fn equality_is_numeric_aware_and_case_insensitive() {
        assert!(eval("equals", json!(10), json!("10")));
        assert!(eval("==", json!("1e1"), json!(10)));
        assert!(eval("eq", json!("ACTIVE"), json!("active")));
        assert!(!eval("=", json!(true), json!("true")));
        assert!(eval("!=", json!("a"), json!("b")));
        assert!(eval("<>", json!(1), json!(2)));
    }

    #[test]
    fn containment_and_affixes() {
        assert!(eval("contains", json!("Hello World"), json!("world")));
        assert!(eval("contains", json!(["a", "b"]), json!("b")));
        assert!(!eval("contains", json!([1, 2]), json!("1")));
        assert!(eval("not_contains", json!("abc"), json!("z")));
        assert!(eval("starts_with", json!("Invoice-42"), json!("invoice")));
        assert!(eval("ends_with", json!("report.PDF"), json!(".pdf")));
        assert!(!eval("starts_with", json!(42), json!("4")));
    }

    #[test]
    fn ordering_on_non_numeric_is_false() {
        assert!(eval("gt", json!(150), json!(100)));
        assert!(eval(">=", json!("100"), json!(100)));
        assert!(eval("lt", json!(1.5), json!(2)));
        assert!(eval("<=", json!(2), json!(2)));
        assert!(!eval(">", json!("abc"), json!(1)));
        assert!(!eval("<", json!(null), json!(1)));
        assert!(!eval("greater_than", json!([5]), json!(1)));
    }

    #[test]
    fn null_and_empty_checks() {
        assert!(eval("is_null", json!(null), json!(null)));
        assert!(eval("not_null", json!(0), json!(null)));
        for empty in [json!(null), json!("  "), json!([]), json!({}), json!(0), json!(false)] {
            assert!(eval("is_empty", empty.clone(), json!(null)), "{empty} should be empty");
        }
        assert!(eval("not_empty", json!("x"), json!(null)));
        assert!(eval("not_empty", json!([0]), json!(null)));
    }

    #[test]
    fn membership_is_loose() {
        assert!(eval("in", json!("2"), json!([1, 2, 3])));
        assert!(eval("in", json!("gold"), json!("gold")));
        assert!(!eval("in", json!("x"), json!(["a", "b"])));
        assert!(eval("not_in", json!("x"), json!(["a", "b"])));
    }

    #[test]
    fn regex_auto_delimits() {
        assert!(eval("regex", json!("ORDER-123"), json!("^order-\\d+$")));
        assert!(eval("matches_regex", json!("abc"), json!("/^ABC$/i")));
        assert!(!eval("matches_regex", json!("abc"), json!("/^ABC$/")));
        assert!(eval("regex", json!("a1"), json!("#\\d#")));
        assert!(!eval("regex", json!("abc"), json!("(unclosed")));
        assert!(!eval("regex", json!(5), json!("5")));
    }

    #[test]
    fn boolean_checks() {
        assert!(eval("is_true", json!(1), json!(null)));
        assert!(eval("true", json!("yes"), json!(null)));
        assert!(eval("is_false", json!("0"), json!(null)));
        assert!(eval("false", json!(null), json!(null)));
    }

    #[test]
    fn between_is_inclusive() {
        assert!(eval("between", json!(10), json!([10, 20])));
        assert!(eval("between", json!("20"), json!([10, 20])));
        assert!(!eval("between", json!(21), json!([10, 20])));
        assert!(!eval("between", json!(15), json!([10])));
        assert!(!eval("between", json!("x"), json!([10, 20])));
    }

    #[test]
    fn parses_with_surrounding_whitespace() {
        assert_eq!(" gte ".parse::<Operator>().unwrap(), Operator::GreaterOrEqual);
        assert_eq!(Operator::Between.to_string(), "between");
    }
}
