//! Post-processing applied to every extracted string
//!
//! Order: trim, regex, condition, default, date format, type, template.
//! A `@multi` regex ends the pipeline with an array of captures; a condition
//! ends it with its own result (only the template still runs).

use serde_json::{Number, Value};
use tracing::warn;

use crate::capture::Captured;
use crate::engine::Extractor;
use crate::error::ExtractError;
use crate::selector::{Condition, PostProcess, ValueType};

const CONTENT_PREFIX: &str = "@content";

/// Full legacy markup pipeline on a raw string
pub(crate) fn process_text(ctx: &Extractor, raw: &str, post: &PostProcess) -> Value {
    let mut text = raw.trim().to_string();

    if let Some(capture) = &post.regex {
        match capture.apply(&text) {
            Captured::Many(values) => return strings(values),
            Captured::One(value) => text = value,
        }
    }

    if !text.is_empty() {
        if let Some(condition) = &post.condition {
            let value = apply_condition(ctx, condition, &text, post);
            return apply_template(ctx, value, post.template.as_deref());
        }
        if let Some(default) = &post.default {
            text = default.clone();
        }
        if let Some(format) = &post.date_format {
            text = format.format(&text);
        }
    }

    let value = convert(&text, post.value_type);
    apply_template(ctx, value, post.template.as_deref())
}

/// Pipeline for values resolved by the JSON engine, after normalization
pub(crate) fn process_value(ctx: &Extractor, mut value: Value, post: &PostProcess) -> Value {
    if let (Some(capture), Value::String(text)) = (&post.regex, &value) {
        match capture.apply(text) {
            Captured::Many(values) => return strings(values),
            Captured::One(captured) => value = Value::String(captured),
        }
    }
    if is_present(&value) {
        if let Some(default) = &post.default {
            value = Value::String(default.clone());
        }
    }
    if let (Some(format), Value::String(text)) = (&post.date_format, &value) {
        if !text.is_empty() {
            value = Value::String(format.format(text));
        }
    }
    apply_template(ctx, value, post.template.as_deref())
}

/// Null and the empty string count as missing
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn strings(values: Vec<String>) -> Value {
    Value::Array(values.into_iter().map(Value::String).collect())
}

fn apply_condition(ctx: &Extractor, condition: &Condition, text: &str, post: &PostProcess) -> Value {
    match condition {
        Condition::Function(name) => {
            let input = post
                .default
                .as_deref()
                .and_then(|d| d.strip_prefix(CONTENT_PREFIX))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .unwrap_or(text);
            ctx.functions().call(name, input)
        }
        Condition::Rules(rules) => {
            let hit = rules
                .iter()
                .find(|(needle, _)| !needle.is_empty() && text.contains(needle.as_str()));
            match (hit, &post.default) {
                (Some((_, value)), _) => convert(value, post.value_type),
                (None, Some(default)) => convert(default, post.value_type),
                (None, None) => convert(text, post.value_type),
            }
        }
    }
}

/// Convert to the declared type; failures are logged and give null
pub(crate) fn convert(text: &str, value_type: Option<ValueType>) -> Value {
    match try_convert(text, value_type) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "type conversion");
            Value::Null
        }
    }
}

pub(crate) fn try_convert(text: &str, value_type: Option<ValueType>) -> Result<Value, ExtractError> {
    let Some(value_type) = value_type else {
        return Ok(Value::String(text.to_string()));
    };
    let failed = || ExtractError::Conversion {
        value: text.to_string(),
        target: value_type.name().to_string(),
    };
    let trimmed = text.trim();
    match value_type {
        ValueType::Int => trimmed
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| failed()),
        ValueType::Float => trimmed
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(failed),
        ValueType::Bool => parse_bool(trimmed).map(Value::Bool).ok_or_else(failed),
        ValueType::Json => serde_json::from_str(trimmed).map_err(|_| failed()),
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Run the named template on the text form of a scalar
pub(crate) fn apply_template(ctx: &Extractor, value: Value, template: Option<&str>) -> Value {
    let Some(name) = template else {
        return value;
    };
    let text = match &value {
        Value::String(s) if !s.is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return value,
    };
    Value::String(ctx.template().apply(name, &text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;
    use crate::date_format::DateFormat;
    use serde_json::json;

    fn extractor() -> Extractor {
        Extractor::builder()
            .template(|name: &str, value: &str| match name {
                "upper" => value.to_uppercase(),
                _ => value.to_string(),
            })
            .build()
    }

    fn post() -> PostProcess {
        PostProcess::default()
    }

    #[test]
    fn test_trim_and_plain_text() {
        assert_eq!(process_text(&extractor(), "  hello \n", &post()), json!("hello"));
    }

    #[test]
    fn test_regex_then_type() {
        let post = PostProcess {
            regex: Capture::parse(r"(\d+) items"),
            value_type: Some(ValueType::Int),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "Total: 42 items", &post), json!(42));
        // miss gives "" which fails int conversion
        assert_eq!(process_text(&extractor(), "no count", &post), Value::Null);
    }

    #[test]
    fn test_multi_short_circuits() {
        let post = PostProcess {
            regex: Capture::parse(r"@multi (\d+)"),
            value_type: Some(ValueType::Int),
            default: Some("x".into()),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "1 2 3", &post), json!(["1", "2", "3"]));
    }

    #[test]
    fn test_condition_rules() {
        let post = PostProcess {
            condition: Condition::parse("World=China"),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "World", &post), json!("China"));

        let post = PostProcess {
            condition: Condition::parse("World2=China"),
            ..post
        };
        assert_eq!(process_text(&extractor(), "World", &post), json!("World"));

        let post = PostProcess {
            condition: Condition::parse("open=1,closed=0"),
            value_type: Some(ValueType::Bool),
            default: Some("0".into()),
            ..PostProcess::default()
        };
        assert_eq!(process_text(&extractor(), "shop is open", &post), json!(true));
        assert_eq!(process_text(&extractor(), "unknown", &post), json!(false));
    }

    #[test]
    fn test_condition_function_with_content() {
        let post = PostProcess {
            condition: Condition::parse("@function next_day"),
            default: Some("@content Mon Jan 02 15:04:05 CST 2006".into()),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "ignored", &post), json!("2006-01-03"));
    }

    #[test]
    fn test_default_replaces_present_value_only() {
        let post = PostProcess {
            default: Some("yes".into()),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "anything", &post), json!("yes"));
        assert_eq!(process_text(&extractor(), "   ", &post), json!(""));
    }

    #[test]
    fn test_date_then_template() {
        let post = PostProcess {
            date_format: Some(DateFormat::new("%d/%m/%Y", "%b %d %Y")),
            template: Some("upper".into()),
            ..post()
        };
        assert_eq!(process_text(&extractor(), "02/01/2006", &post), json!("JAN 02 2006"));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(convert("3.5", Some(ValueType::Float)), json!(3.5));
        assert_eq!(convert("T", Some(ValueType::Bool)), json!(true));
        assert_eq!(convert(r#"{"a":[1]}"#, Some(ValueType::Json)), json!({"a": [1]}));
        assert_eq!(convert("yes", Some(ValueType::Bool)), Value::Null);
        assert!(matches!(
            try_convert("4x", Some(ValueType::Int)),
            Err(ExtractError::Conversion { .. })
        ));
    }

    #[test]
    fn test_json_value_pipeline() {
        let post = PostProcess {
            regex: Capture::parse(r"#(\d+)"),
            template: Some("upper".into()),
            ..post()
        };
        assert_eq!(process_value(&extractor(), json!("order #77"), &post), json!("77"));
        assert_eq!(process_value(&extractor(), json!(["a"]), &post), json!(["a"]));
        assert_eq!(process_value(&extractor(), json!(5), &post), json!("5"));
    }

    #[test]
    fn test_json_default_needs_a_value() {
        let post = PostProcess {
            regex: Capture::parse(r"id-(\d+)"),
            default: Some("FOUND".into()),
            ..post()
        };
        assert_eq!(process_value(&extractor(), json!("nothing"), &post), json!(""));
        assert_eq!(process_value(&extractor(), json!("id-7"), &post), json!("FOUND"));

        let post = PostProcess {
            default: Some("FOUND".into()),
            ..PostProcess::default()
        };
        assert_eq!(process_value(&extractor(), json!(""), &post), json!(""));
        assert_eq!(process_value(&extractor(), json!(["a"]), &post), json!("FOUND"));
    }
}
