//! JSON path extraction
//!
//! Paths are dot separated: `items.[0].name`, `items.[*].name`,
//! `items.(price > 10).[*].title`. Resolved scalars are normalized to text
//! before the shared pipeline runs; arrays and objects pass through natively.

use serde_json::Value;
use tracing::{debug, warn};

use crate::assembly::Backend;
use crate::config::DataType;
use crate::engine::Extractor;
use crate::pipeline::process_value;
use crate::selector::JsonSelector;

const DATA_LEAF: &str = "@data";
const LITERAL_PREFIX: &str = "@key:";

/// Strip a JSONP wrapper such as `callback({...})`
///
/// Text without `(`, without `{`, with `{` before the first `(`, or without
/// anything between the first `(` and the last `)` is returned unchanged.
pub fn filter_jsonp(text: &str) -> &str {
    let (Some(open), Some(brace)) = (text.find('('), text.find('{')) else {
        return text;
    };
    if brace < open {
        return text;
    }
    match text.rfind(')') {
        Some(close) if close > open + 1 => text[open + 1..close].trim_matches('"'),
        _ => text,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Member(String),
    Index(usize),
    Wildcard,
    Query(String),
}

/// Split a path on dots outside brackets, parentheses and quotes
fn split_path(path: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth = depth.saturating_sub(1),
            (None, '.') if depth == 0 => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&path[start..]);
    parts.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in split_path(path) {
        if let Some(query) = part.strip_prefix('(').and_then(|p| p.strip_suffix(')')) {
            segments.push(Segment::Query(query.trim().to_string()));
            continue;
        }
        // `name[1][*]` is a member followed by bracket segments
        let (name, mut brackets) = match part.find('[') {
            Some(pos) if part.ends_with(']') => part.split_at(pos),
            _ => (part, ""),
        };
        if !name.is_empty() {
            segments.push(Segment::Member(name.to_string()));
        }
        while let Some(rest) = brackets.strip_prefix('[') {
            let Some(end) = rest.find(']') else {
                segments.push(Segment::Member(brackets.to_string()));
                break;
            };
            let inner = rest[..end].trim();
            segments.push(match inner {
                "*" => Segment::Wildcard,
                _ => match inner.parse() {
                    Ok(index) => Segment::Index(index),
                    Err(_) => Segment::Member(inner.trim_matches(['\'', '"']).to_string()),
                },
            });
            brackets = &rest[end + 1..];
        }
    }
    segments
}

/// Render a float like Go's `%g` with 5 significant digits
pub fn format_float(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let scientific = format!("{value:.4e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or_default();
    if !(-4..5).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs());
    }
    let decimals = (4 - exponent).max(0) as usize;
    trim_fraction(&format!("{value:.decimals$}")).to_string()
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// Scalars become text; null means the value was not found
fn normalize(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(Value::String(match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(u)) => u.to_string(),
            _ => n.as_f64().map(format_float).unwrap_or_else(|| n.to_string()),
        })),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        other => Some(other),
    }
}

fn unmarshal(value: Value) -> Value {
    match value {
        Value::String(text) => match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "unmarshal of string value failed");
                Value::String(text)
            }
        },
        other => other,
    }
}

pub(crate) struct JsonBackend<'c> {
    ctx: &'c Extractor,
}

impl<'c> JsonBackend<'c> {
    pub(crate) fn new(ctx: &'c Extractor) -> Self {
        Self { ctx }
    }

    /// Resolve a path against `scope`; `None` when any step misses
    pub(crate) fn resolve(&self, scope: &Value, path: &str) -> Option<Value> {
        self.walk(scope, &parse_path(path))
    }

    fn walk(&self, node: &Value, path: &[Segment]) -> Option<Value> {
        let Some((head, rest)) = path.split_first() else {
            return Some(node.clone());
        };
        match head {
            Segment::Member(name) => {
                let next = match node {
                    Value::Object(map) => map.get(name),
                    Value::Array(items) => name.parse::<usize>().ok().and_then(|i| items.get(i)),
                    _ => None,
                };
                match next {
                    Some(next) => self.walk(next, rest),
                    None => {
                        debug!(member = %name, "json member not found");
                        None
                    }
                }
            }
            Segment::Index(index) => match node.as_array().and_then(|items| items.get(*index)) {
                Some(next) => self.walk(next, rest),
                None => {
                    debug!(index, "json index not found");
                    None
                }
            },
            Segment::Wildcard => {
                let items = node.as_array()?;
                let mut flat = Vec::new();
                for item in items {
                    match self.walk(item, rest) {
                        Some(Value::Array(inner)) => flat.extend(inner),
                        Some(value) => flat.push(value),
                        None => {}
                    }
                }
                Some(Value::Array(flat))
            }
            Segment::Query(query) => match self.ctx.query().query(node, query) {
                Ok(result) => self.walk(&result, rest),
                Err(e) => {
                    warn!(error = %e, "query segment failed, keeping node");
                    self.walk(node, rest)
                }
            },
        }
    }
}

impl Backend for JsonBackend<'_> {
    type Node = Value;

    fn data_type(&self) -> DataType {
        DataType::Json
    }

    fn locate(&self, scope: &Value, locator: &str) -> Vec<Value> {
        match self.resolve(scope, locator) {
            Some(Value::Null) | None => Vec::new(),
            Some(found) => vec![found],
        }
    }

    fn spread(&self, mut matches: Vec<Value>) -> (Vec<Value>, bool) {
        if matches.len() == 1 && matches[0].is_array() {
            if let Some(Value::Array(items)) = matches.pop() {
                return (items, true);
            }
        }
        (matches, false)
    }

    fn leaf(&self, scope: &Value, selector: &str) -> Value {
        if selector == DATA_LEAF {
            return scope.clone();
        }
        if let Some(literal) = selector.strip_prefix(LITERAL_PREFIX) {
            return Value::String(literal.to_string());
        }
        let selector = JsonSelector::parse(selector, self.ctx.dates());
        let found = self
            .resolve(scope, &selector.path)
            .map(|value| if selector.unmarshal { unmarshal(value) } else { value })
            .and_then(normalize);
        match found {
            Some(value) => process_value(self.ctx, value, &selector.post),
            None if selector.post.regex.as_ref().is_some_and(|r| r.is_multi()) => {
                Value::Array(Vec::new())
            }
            None => Value::Null,
        }
    }

    fn passthrough(&self, scope: &Value) -> Option<Value> {
        Some(scope.clone())
    }

    fn text(&self, scope: &Value) -> String {
        match scope {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn leaf(doc: &Value, selector: &str) -> Value {
        let ctx = Extractor::default();
        JsonBackend::new(&ctx).leaf(doc, selector)
    }

    #[test]
    fn test_filter_jsonp() {
        assert_eq!(filter_jsonp(r#"cb({"a":1})"#), r#"{"a":1}"#);
        assert_eq!(filter_jsonp(r#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(filter_jsonp(r#"{"f":"(x)"}"#), r#"{"f":"(x)"}"#);
        assert_eq!(filter_jsonp("[1, 2]"), "[1, 2]");
        assert_eq!(filter_jsonp(r#"jQuery123("{\"a\":1}")"#), r#"{\"a\":1}"#);
        assert_eq!(filter_jsonp("cb({"), "cb({");
        assert_eq!(filter_jsonp("a(){"), "a(){");
        assert_eq!(filter_jsonp("cb(){}"), "cb(){}");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a.b"), vec!["a", "b"]);
        assert_eq!(
            split_path("items.(name = 'a.b').[*].x"),
            vec!["items", "(name = 'a.b')", "[*]", "x"]
        );
        assert!(split_path("").is_empty());
        assert_eq!(
            parse_path("list[2].name"),
            vec![
                Segment::Member("list".into()),
                Segment::Index(2),
                Segment::Member("name".into())
            ]
        );
    }

    #[test]
    fn test_wildcard_flatten() {
        let doc = json!({"items": [{"name": "a"}, {"name": ["b", "c"]}, {"other": 1}]});
        assert_eq!(leaf(&doc, "items.[*].name"), json!(["a", "b", "c"]));
    }

    #[test]
    fn test_scalar_normalization() {
        let doc = json!({"i": 42, "f": 3.14159, "big": 123456.7, "t": true, "n": null, "o": {"k": 1}});
        assert_eq!(leaf(&doc, "i"), json!("42"));
        assert_eq!(leaf(&doc, "f"), json!("3.1416"));
        assert_eq!(leaf(&doc, "big"), json!("1.2346e+05"));
        assert_eq!(leaf(&doc, "t"), json!("true"));
        assert_eq!(leaf(&doc, "n"), Value::Null);
        assert_eq!(leaf(&doc, "o"), json!({"k": 1}));
        assert_eq!(leaf(&doc, "missing"), Value::Null);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(100.0), "100");
        assert_eq!(format_float(99999.9), "1e+05");
        assert_eq!(format_float(0.0001234), "0.0001234");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(-2.5), "-2.5");
    }

    #[test]
    fn test_query_segment() {
        let doc = json!({"items": [
            {"name": "a", "price": 5},
            {"name": "b", "price": 20},
            {"name": "c", "price": 30}
        ]});
        assert_eq!(leaf(&doc, "items.(price > 10).[0].name"), json!("b"));
        assert_eq!(leaf(&doc, "items.(price > 10).[*].name"), json!(["b", "c"]));
        // a broken query keeps the node
        assert_eq!(leaf(&doc, "items.(price >>> 1).[0].name"), json!("a"));
    }

    #[test]
    fn test_leaf_flags() {
        let doc = json!({"raw": "{\"id\": 7}", "code": "order-991", "name": "x"});
        assert_eq!(leaf(&doc, "raw;unmarshal"), json!({"id": 7}));
        assert_eq!(leaf(&doc, r"code;;;;order-(\d+)"), json!("991"));
        assert_eq!(leaf(&doc, "name;;fixed"), json!("fixed"));
        assert_eq!(leaf(&doc, "nope;;;;@multi (x)"), json!([]));
        assert_eq!(leaf(&doc, "@key:shop"), json!("shop"));
        assert_eq!(leaf(&doc, "@data"), doc);
    }

    #[test]
    fn test_spread_single_array() {
        let ctx = Extractor::default();
        let backend = JsonBackend::new(&ctx);
        let (items, forced) = backend.spread(vec![json!([1, 2])]);
        assert_eq!(items, vec![json!(1), json!(2)]);
        assert!(forced);
        let (items, forced) = backend.spread(vec![json!({"a": 1})]);
        assert_eq!(items.len(), 1);
        assert!(!forced);
    }
}
