//! Template filters applied after a `{{ path | filter:args }}` token resolves.
//!
//! The set is closed. An unknown filter name passes the value through
//! unchanged. Filters that expect a string or a number leave other values
//! alone.

use std::fmt::Write;

use serde_json::Value;

use super::value::{as_number, is_truthy, number, parse_datetime, to_display, to_integer};

/// Default output format for the `date` filter.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Apply a filter expression such as `number_format:2,.,` to `value`.
pub fn apply_filter(value: Value, expr: &str) -> Value {
    let (name, args) = parse_filter(expr);
    let arg = |i: usize| args.get(i).map(String::as_str);

    match name.as_str() {
        "upper" | "uppercase" => map_str(value, |s| s.to_uppercase()),
        "lower" | "lowercase" => map_str(value, |s| s.to_lowercase()),
        "ucfirst" | "capitalize" => map_str(value, ucfirst),
        "title" | "ucwords" => map_str(value, |s| {
            s.split(' ').map(ucfirst).collect::<Vec<_>>().join(" ")
        }),
        "trim" => map_str(value, |s| s.trim().to_string()),
        "slug" => map_str(value, slug),
        "snake" => map_str(value, |s| {
            words(s).iter().map(|w| w.to_lowercase()).collect::<Vec<_>>().join("_")
        }),
        "camel" => map_str(value, |s| {
            let studly = studly(s);
            let mut chars = studly.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => String::new(),
            }
        }),
        "studly" | "pascal" => map_str(value, studly),
        "number_format" => match as_number(&value) {
            Some(n) => Value::String(format_number(
                n,
                arg(0).and_then(|a| a.parse().ok()).unwrap_or(0),
                arg(1).unwrap_or("."),
                arg(2).unwrap_or(","),
            )),
            None => Value::String(to_display(&value)),
        },
        "date" => format_date(&value, arg(0).unwrap_or(DEFAULT_DATE_FORMAT)),
        "default" => match value {
            Value::Null => Value::String(arg(0).unwrap_or_default().to_string()),
            other => other,
        },
        "json" => Value::String(serde_json::to_string(&value).unwrap_or_default()),
        "count" => match &value {
            Value::Array(items) => Value::from(items.len()),
            Value::Object(map) => Value::from(map.len()),
            _ => Value::from(0),
        },
        "first" => match value {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            other => other,
        },
        "last" => match value {
            Value::Array(items) => items.into_iter().last().unwrap_or(Value::Null),
            other => other,
        },
        "join" | "implode" => match value {
            Value::Array(items) => {
                let sep = arg(0).filter(|s| !s.is_empty()).unwrap_or(", ");
                Value::String(items.iter().map(to_display).collect::<Vec<_>>().join(sep))
            }
            other => other,
        },
        "split" | "explode" => match value {
            Value::String(s) => {
                let sep = arg(0).filter(|s| !s.is_empty()).unwrap_or(",");
                Value::Array(s.split(sep).map(|p| Value::String(p.to_string())).collect())
            }
            other => other,
        },
        "length" | "strlen" => match &value {
            Value::String(s) => Value::from(s.chars().count()),
            Value::Array(items) => Value::from(items.len()),
            _ => Value::from(0),
        },
        "substr" | "substring" => match &value {
            Value::String(s) => Value::String(substring(
                s,
                arg(0).and_then(|a| a.parse().ok()).unwrap_or(0),
                arg(1).and_then(|a| a.parse().ok()),
            )),
            other => Value::String(to_display(other)),
        },
        "replace" => match (&value, arg(0), arg(1)) {
            (Value::String(s), Some(from), Some(to)) => Value::String(s.replace(from, to)),
            _ => Value::String(to_display(&value)),
        },
        "money" | "currency" => match as_number(&value) {
            Some(n) => {
                let decimals = arg(1).and_then(|a| a.parse().ok()).unwrap_or(2);
                Value::String(format!(
                    "{}{}",
                    arg(0).unwrap_or("$"),
                    format_number(n, decimals, ".", ",")
                ))
            }
            None => Value::String(to_display(&value)),
        },
        "bool" | "boolean" => Value::Bool(is_truthy(&value)),
        "int" | "integer" => Value::from(to_integer(&value)),
        "float" => number(as_number(&value).unwrap_or_else(|| to_integer(&value) as f64)),
        "string" => Value::String(to_display(&value)),
        "abs" => match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Value::from(i.saturating_abs()),
                None => number(n.as_f64().unwrap_or(0.0).abs()),
            },
            other => as_number(&other).map_or(other, |n| number(n.abs())),
        },
        "round" => match as_number(&value) {
            Some(n) => {
                let precision: i32 = arg(0).and_then(|a| a.parse().ok()).unwrap_or(0);
                let factor = 10f64.powi(precision);
                number((n * factor).round() / factor)
            }
            None => value,
        },
        "floor" => as_number(&value).map_or(value, |n| number(n.floor())),
        "ceil" => as_number(&value).map_or(value, |n| number(n.ceil())),
        _ => value,
    }
}

/// Split `name:arg1,arg2` into a trimmed name and trimmed arguments.
fn parse_filter(expr: &str) -> (String, Vec<String>) {
    match expr.split_once(':') {
        Some((name, args)) => (
            name.trim().to_string(),
            args.split(',').map(|a| a.trim().to_string()).collect(),
        ),
        None => (expr.trim().to_string(), Vec::new()),
    }
}

fn map_str(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Words split on non-alphanumerics and on lower-to-upper case boundaries.
fn words(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_numeric();
        current.push(c);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn studly(s: &str) -> String {
    words(s).iter().map(|w| ucfirst(w)).collect()
}

fn slug(s: &str) -> String {
    let mut out = String::new();
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Character-based substring; negative `start` counts from the end and a
/// negative `len` drops that many characters from the end.
fn substring(s: &str, start: i64, len: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len() as i64;
    let begin = if start < 0 { (total + start).max(0) } else { start.min(total) };
    let end = match len {
        Some(l) if l < 0 => (total + l).max(begin),
        Some(l) => begin.saturating_add(l).min(total),
        None => total,
    };
    chars[begin as usize..end as usize].iter().collect()
}

/// Group digits with `thousands` and join the fraction with `point`.
pub fn format_number(n: f64, decimals: usize, point: &str, thousands: &str) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::new();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push_str(thousands);
        }
        grouped.push(*c);
    }

    let negative = n < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push_str(point);
        out.push_str(&frac);
    }
    out
}

fn format_date(value: &Value, format: &str) -> Value {
    if value.is_null() {
        return Value::String(String::new());
    }
    match parse_datetime(value) {
        Some(dt) => {
            // Invalid strftime items surface as fmt::Error, not a panic.
            let mut out = String::new();
            match write!(out, "{}", dt.format(format)) {
                Ok(()) => Value::String(out),
                Err(_) => {
                    tracing::debug!(format, "invalid date format, value left as is");
                    Value::String(to_display(value))
                }
            }
        }
        None => Value::String(to_display(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn f(value: Value, expr: &str) -> Value {
        apply_filter(value, expr)
    }

    #[test]
    fn case_filters() {
        assert_eq!(f(json!("hello world"), "upper"), json!("HELLO WORLD"));
        assert_eq!(f(json!("HeLLo"), "lowercase"), json!("hello"));
        assert_eq!(f(json!("hello world"), "ucfirst"), json!("Hello world"));
        assert_eq!(f(json!("hello world"), "title"), json!("Hello World"));
        assert_eq!(f(json!(5), "upper"), json!(5));
    }

    #[test]
    fn style_conversions() {
        assert_eq!(f(json!("Hello World!"), "slug"), json!("hello-world"));
        assert_eq!(f(json!("fooBar baz"), "snake"), json!("foo_bar_baz"));
        assert_eq!(f(json!("hello_world"), "camel"), json!("helloWorld"));
        assert_eq!(f(json!("hello-world"), "studly"), json!("HelloWorld"));
        assert_eq!(f(json!("  x  "), "trim"), json!("x"));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(f(json!(1234567.891), "number_format:2"), json!("1,234,567.89"));
        assert_eq!(f(json!(1234.5), "number_format:1,;,'"), json!("1'234;5"));
        assert_eq!(f(json!(-1234), "number_format"), json!("-1,234"));
        assert_eq!(f(json!(19.5), "money"), json!("$19.50"));
        assert_eq!(f(json!("7"), "currency:€,0"), json!("€7"));
        assert_eq!(f(json!("abc"), "money"), json!("abc"));
    }

    #[test]
    fn date_filter_uses_strftime() {
        assert_eq!(f(json!("2024-03-05 10:30:00"), "date:%d/%m/%Y"), json!("05/03/2024"));
        assert_eq!(f(json!("2024-03-05"), "date"), json!("2024-03-05 00:00:00"));
        assert_eq!(f(json!(null), "date"), json!(""));
        assert_eq!(f(json!("garbage"), "date"), json!("garbage"));
        assert_eq!(f(json!("2024-03-05"), "date:%Q"), json!("2024-03-05"));
    }

    #[test]
    fn default_only_replaces_null() {
        assert_eq!(f(json!(null), "default:N/A"), json!("N/A"));
        assert_eq!(f(json!(""), "default:N/A"), json!(""));
        assert_eq!(f(json!(0), "default:N/A"), json!(0));
    }

    #[test]
    fn collection_filters() {
        assert_eq!(f(json!([1, 2, 3]), "count"), json!(3));
        assert_eq!(f(json!("abc"), "count"), json!(0));
        assert_eq!(f(json!([1, 2, 3]), "first"), json!(1));
        assert_eq!(f(json!([1, 2, 3]), "last"), json!(3));
        assert_eq!(f(json!([]), "first"), json!(null));
        assert_eq!(f(json!(["a", "b"]), "join"), json!("a, b"));
        assert_eq!(f(json!(["a", "b"]), "implode:|"), json!("a|b"));
        assert_eq!(f(json!("a,b,c"), "split"), json!(["a", "b", "c"]));
        assert_eq!(f(json!("a;b"), "explode:;"), json!(["a", "b"]));
        assert_eq!(f(json!("héllo"), "length"), json!(5));
        assert_eq!(f(json!({ "a": 1 }), "json"), json!(r#"{"a":1}"#));
    }

    #[test]
    fn substring_and_replace() {
        assert_eq!(f(json!("abcdef"), "substr:1,3"), json!("bcd"));
        assert_eq!(f(json!("abcdef"), "substr:-2"), json!("ef"));
        assert_eq!(f(json!("abcdef"), "substr:0,-2"), json!("abcd"));
        assert_eq!(f(json!("abcdef"), "substr:10"), json!(""));
        assert_eq!(
            f(json!("abcdef"), "substr:1,9223372036854775807"),
            json!("bcdef")
        );
        assert_eq!(
            f(json!("abcdef"), "substr:-9223372036854775808,2"),
            json!("ab")
        );
        assert_eq!(f(json!("a-b-c"), "replace:-,+"), json!("a+b+c"));
        assert_eq!(f(json!("abc"), "replace:a"), json!("abc"));
    }

    #[test]
    fn casts_and_math() {
        assert_eq!(f(json!("1"), "bool"), json!(true));
        assert_eq!(f(json!("0"), "boolean"), json!(false));
        assert_eq!(f(json!("42"), "int"), json!(42));
        assert_eq!(f(json!("2.5"), "float"), json!(2.5));
        assert_eq!(f(json!(12), "string"), json!("12"));
        assert_eq!(f(json!(-3), "abs"), json!(3));
        assert_eq!(f(json!(3.14159), "round:2"), json!(3.14));
        assert_eq!(f(json!(2.7), "floor"), json!(2.0));
        assert_eq!(f(json!(2.1), "ceil"), json!(3.0));
        assert_eq!(f(json!("x"), "abs"), json!("x"));
    }

    #[test]
    fn unknown_filter_is_identity() {
        assert_eq!(f(json!("keep"), "shout"), json!("keep"));
        assert_eq!(f(json!([1]), "nope:1,2"), json!([1]));
    }
}
