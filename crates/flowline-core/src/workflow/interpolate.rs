//! Template interpolation of `{{ path }}` and `{{ path | filter:args }}` tokens.
//!
//! A string that is exactly one token resolves to the native value (number,
//! bool, array, ...). Tokens embedded in a larger string are stringified and
//! substituted. Maps and arrays are walked recursively, keys included.
//!
//! Reserved paths resolve outside the context:
//! - `config.<path>` -- engine configuration `values`
//! - `env.<NAME>` -- process environment
//! - `now` -- current UTC time (RFC 3339)
//!
//! A context key literally named `now`, or a top-level `config`/`env` map,
//! is shadowed by these prefixes.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use flowline_types::config::EngineConfig;
use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::context::WorkflowContext;
use super::filters::apply_filter;
use super::value::to_display;

const TOKEN_PATTERN: &str = r"\{\{\s*([^}|]+?)(?:\s*\|\s*([^}]+))?\s*\}\}";

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(TOKEN_PATTERN).expect("token pattern is valid"))
}

fn whole_token_regex() -> &'static Regex {
    static WHOLE: OnceLock<Regex> = OnceLock::new();
    WHOLE.get_or_init(|| {
        Regex::new(&format!("^{TOKEN_PATTERN}$")).expect("token pattern is valid")
    })
}

/// Resolves template tokens against a `WorkflowContext`.
#[derive(Debug, Clone, Default)]
pub struct Interpolator {
    config: Arc<EngineConfig>,
}

impl Interpolator {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self { config }
    }

    /// Interpolate any JSON value. Non-string scalars pass through.
    pub fn interpolate(&self, value: &Value, ctx: &WorkflowContext) -> Value {
        match value {
            Value::String(s) => self.interpolate_str(s, ctx),
            Value::Array(items) => Value::Array(
                items.iter().map(|item| self.interpolate(item, ctx)).collect(),
            ),
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    let key = match self.interpolate_str(key, ctx) {
                        Value::String(s) => s,
                        other => to_display(&other),
                    };
                    out.insert(key, self.interpolate(item, ctx));
                }
                Value::Object(out)
            }
            other => other.clone(),
        }
    }

    /// Interpolate a single string.
    pub fn interpolate_str(&self, input: &str, ctx: &WorkflowContext) -> Value {
        if !input.contains("{{") {
            return Value::String(input.to_string());
        }

        if let Some(caps) = whole_token_regex().captures(input) {
            return self.resolve_token(&caps, ctx);
        }

        let replaced = token_regex().replace_all(input, |caps: &Captures<'_>| {
            to_display(&self.resolve_token(caps, ctx))
        });
        Value::String(replaced.into_owned())
    }

    /// Resolve a bare path (no filter) the same way tokens do.
    pub fn resolve_path(&self, path: &str, ctx: &WorkflowContext) -> Value {
        if let Some(rest) = path.strip_prefix("config.") {
            return self.config.value(rest).cloned().unwrap_or(Value::Null);
        }
        if let Some(name) = path.strip_prefix("env.") {
            return std::env::var(name).map_or(Value::Null, Value::String);
        }
        if path == "now" {
            return Value::String(Utc::now().to_rfc3339());
        }
        ctx.get(path).cloned().unwrap_or(Value::Null)
    }

    fn resolve_token(&self, caps: &Captures<'_>, ctx: &WorkflowContext) -> Value {
        let path = caps.get(1).map_or("", |m| m.as_str().trim());
        let resolved = self.resolve_path(path, ctx);
        match caps.get(2) {
            Some(filter) => apply_filter(resolved, filter.as_str().trim()),
            None => resolved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(data: Value) -> WorkflowContext {
        WorkflowContext::from_value(data)
    }

    #[test]
    fn whole_token_keeps_native_type() {
        let i = Interpolator::default();
        let c = ctx(json!({ "n": 5, "flag": true, "tags": ["a", "b"] }));
        assert_eq!(i.interpolate_str("{{n}}", &c), json!(5));
        assert_eq!(i.interpolate_str("{{ flag }}", &c), json!(true));
        assert_eq!(i.interpolate_str("{{tags}}", &c), json!(["a", "b"]));
    }

    #[test]
    fn embedded_token_is_stringified() {
        let i = Interpolator::default();
        let c = ctx(json!({ "n": 5, "flag": false, "user": { "name": "Ann" }, "none": null }));
        assert_eq!(i.interpolate_str("v={{n}}", &c), json!("v=5"));
        assert_eq!(i.interpolate_str("{{flag}}!", &c), json!("false!"));
        assert_eq!(i.interpolate_str("hi {{ user.name }}", &c), json!("hi Ann"));
        assert_eq!(i.interpolate_str("[{{none}}]", &c), json!("[]"));
        assert_eq!(i.interpolate_str("u={{user}}", &c), json!(r#"u={"name":"Ann"}"#));
    }

    #[test]
    fn token_free_strings_are_unchanged() {
        let i = Interpolator::default();
        let c = ctx(json!({ "a": 1 }));
        for input in ["plain", "", "{ not a token }", "a } b"] {
            let once = i.interpolate_str(input, &c);
            assert_eq!(once, json!(input));
            let twice = i.interpolate(&once, &c);
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn missing_path_resolves_to_null() {
        let i = Interpolator::default();
        let c = ctx(json!({}));
        assert_eq!(i.interpolate_str("{{missing}}", &c), Value::Null);
        assert_eq!(i.interpolate_str("x{{missing}}y", &c), json!("xy"));
    }

    #[test]
    fn filters_apply_per_token() {
        let i = Interpolator::default();
        let c = ctx(json!({ "name": "ann lee", "price": 1234.5, "items": [1, 2, 3] }));
        assert_eq!(i.interpolate_str("{{ name | title }}", &c), json!("Ann Lee"));
        assert_eq!(i.interpolate_str("Total: {{ price | money }}", &c), json!("Total: $1,234.50"));
        assert_eq!(i.interpolate_str("{{ items | count }}", &c), json!(3));
        assert_eq!(i.interpolate_str("{{ missing | default:none }}", &c), json!("none"));
        assert_eq!(i.interpolate_str("{{ name | unknown }}", &c), json!("ann lee"));
    }

    #[test]
    fn recurses_into_maps_and_arrays_including_keys() {
        let i = Interpolator::default();
        let c = ctx(json!({ "key": "email", "to": "a@b.c", "n": 2 }));
        let input = json!({
            "{{key}}": "{{to}}",
            "list": ["{{n}}", "n={{n}}", 7, null],
            "nested": { "count": "{{n}}" }
        });
        let out = i.interpolate(&input, &c);
        assert_eq!(
            out,
            json!({
                "email": "a@b.c",
                "list": [2, "n=2", 7, null],
                "nested": { "count": 2 }
            })
        );
    }

    #[test]
    fn reserved_prefixes() {
        let mut config = EngineConfig::default();
        config.values.insert("app".into(), json!("Shop"));
        let i = Interpolator::new(Arc::new(config));
        let c = ctx(json!({ "now": "shadowed" }));

        assert_eq!(i.interpolate_str("{{config.app}}", &c), json!("Shop"));
        assert_eq!(i.interpolate_str("{{config.missing}}", &c), Value::Null);

        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(i.interpolate_str("{{env.PATH}}", &c), json!(path));

        let now = i.interpolate_str("{{now}}", &c);
        let now = now.as_str().unwrap();
        assert_ne!(now, "shadowed");
        assert!(chrono::DateTime::parse_from_rfc3339(now).is_ok());
    }

    #[test]
    fn entity_refs_render_as_key() {
        use crate::workflow::context::EntityRef;
        let i = Interpolator::default();
        let mut c = WorkflowContext::new();
        c.set_ref("order", &EntityRef::new("order", "42")).unwrap();
        assert_eq!(i.interpolate_str("Order #{{order}}", &c), json!("Order #42"));
    }
}
