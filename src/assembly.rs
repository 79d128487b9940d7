//! Recursive evaluation of configuration trees, shared by all engines
//!
//! Directive handling, shape inference, dynamic keys and key deduplication live
//! here once; the engines only answer the [`Backend`] questions.

use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{is_directive, ConfigNode, DataType, Directives, FieldKey};
use crate::engine::Extractor;
use crate::selector::RootLocator;

/// Document model of one engine
pub(crate) trait Backend {
    /// A scope: element, JSON node or text segment
    type Node: Clone;

    fn data_type(&self) -> DataType;

    /// Matches of `locator` inside `scope`, in document order. Lookup failures
    /// are logged by the backend and give no matches.
    fn locate(&self, scope: &Self::Node, locator: &str) -> Vec<Self::Node>;

    /// Turn located matches into the element scopes of the field map; the flag
    /// forces list output
    fn spread(&self, matches: Vec<Self::Node>) -> (Vec<Self::Node>, bool) {
        (matches, false)
    }

    /// Evaluate a selector string against `scope`
    fn leaf(&self, scope: &Self::Node, selector: &str) -> Value;

    /// Native value returned by a mapping without fields, if the model has one
    fn passthrough(&self, _scope: &Self::Node) -> Option<Value> {
        None
    }

    /// Text handed to another engine when a subtree declares its own `_type`
    fn text(&self, scope: &Self::Node) -> String;
}

/// Where a mapping sits in the configuration tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Entry {
    /// Top-level mapping, already dispatched on its data type
    Root,
    Nested,
}

/// Output of a mapping whose `_error` locator matched nothing
pub fn page_error() -> Value {
    json!({ "error": "page error" })
}

pub(crate) fn evaluate<B: Backend>(
    ctx: &Extractor,
    backend: &B,
    config: &ConfigNode,
    scope: &B::Node,
) -> Value {
    match config {
        ConfigNode::Leaf(selector) => evaluate_leaf(ctx, backend, selector, scope),
        ConfigNode::Node(fields) => evaluate_mapping(ctx, backend, fields, scope, Entry::Nested),
    }
}

fn evaluate_leaf<B: Backend>(ctx: &Extractor, backend: &B, selector: &str, scope: &B::Node) -> Value {
    if let Some(value) = ctx.filter().filter(selector) {
        return Value::String(value);
    }
    match backend.leaf(scope, selector) {
        Value::String(s) if s.is_empty() => Value::Null,
        value => value,
    }
}

/// Resolve a directive through the Filter capability
fn directive_text(ctx: &Extractor, raw: Option<&str>) -> Option<String> {
    let raw = raw?;
    let text = ctx.filter().filter(raw).unwrap_or_else(|| raw.to_string());
    let text = text.trim().to_string();
    (!text.is_empty()).then_some(text)
}

pub(crate) fn evaluate_mapping<B: Backend>(
    ctx: &Extractor,
    backend: &B,
    fields: &IndexMap<String, ConfigNode>,
    scope: &B::Node,
    entry: Entry,
) -> Value {
    let directives = Directives::from_fields(fields);

    if entry == Entry::Nested {
        if let Some(raw) = directives.data_type {
            match raw.parse::<DataType>() {
                Ok(data_type) if data_type != backend.data_type() => {
                    debug!(from = %backend.data_type(), to = %data_type, "switching engine for subtree");
                    let text = backend.text(scope);
                    return match ctx.dispatch(data_type, fields, text.as_bytes()) {
                        Ok(value) => value,
                        Err(e) => {
                            warn!(error = %e, "nested document");
                            Value::Null
                        }
                    };
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "ignoring subtree data type");
                }
            }
        }
    }

    if let Some(locator) = directive_text(ctx, directives.error) {
        if backend.locate(scope, &locator).is_empty() {
            debug!(locator = %locator, "error locator missed, page error");
            return page_error();
        }
    }

    let (matches, force_array) = match directive_text(ctx, directives.root) {
        Some(text) => {
            let root = RootLocator::parse(&text);
            let matches = backend.locate(scope, &root.locator);
            if matches.is_empty() {
                debug!(locator = %root.locator, "root locator matched nothing");
                return if root.force_array {
                    Value::Array(Vec::new())
                } else {
                    Value::Null
                };
            }
            (matches, root.force_array)
        }
        None => (vec![scope.clone()], false),
    };

    if !fields.keys().any(|key| !is_directive(key)) {
        let natives: Option<Vec<Value>> = matches.iter().map(|m| backend.passthrough(m)).collect();
        if let Some(mut natives) = natives {
            return if natives.len() == 1 && !force_array {
                natives.remove(0)
            } else {
                Value::Array(natives)
            };
        }
    }

    let (elements, spread_forced) = backend.spread(matches);
    if elements.len() > 1 || force_array || spread_forced {
        Value::Array(
            elements
                .iter()
                .map(|element| Value::Object(evaluate_fields(ctx, backend, fields, element)))
                .collect(),
        )
    } else {
        match elements.first() {
            Some(element) => Value::Object(evaluate_fields(ctx, backend, fields, element)),
            None => Value::Null,
        }
    }
}

/// Build one output object from the non-directive fields
fn evaluate_fields<B: Backend>(
    ctx: &Extractor,
    backend: &B,
    fields: &IndexMap<String, ConfigNode>,
    scope: &B::Node,
) -> Map<String, Value> {
    let mut out = Map::new();
    let mut dup_candidates: IndexMap<&str, Vec<(usize, &ConfigNode)>> = IndexMap::new();
    for (key, config) in fields {
        if let FieldKey::Dup { order, name } = FieldKey::parse(key) {
            dup_candidates.entry(name).or_default().push((order, config));
        }
    }
    for candidates in dup_candidates.values_mut() {
        // stable: equal orders keep configuration order
        candidates.sort_by_key(|(order, _)| *order);
    }

    for (key, config) in fields {
        if is_directive(key) {
            continue;
        }
        match FieldKey::parse(key) {
            FieldKey::Plain(name) => {
                let value = evaluate(ctx, backend, config, scope);
                out.insert(name.to_string(), value);
            }
            FieldKey::Dynamic(selector) => {
                let Some(name) = dynamic_key(ctx, backend, selector, scope) else {
                    continue;
                };
                let value = evaluate(ctx, backend, config, scope);
                out.insert(name, value);
            }
            FieldKey::Dup { name, .. } => {
                let Some(candidates) = dup_candidates.shift_remove(name) else {
                    // already resolved at the first candidate's position
                    continue;
                };
                if out.get(name).is_some_and(|v| !v.is_null()) {
                    continue;
                }
                let value = candidates
                    .into_iter()
                    .map(|(_, candidate)| evaluate(ctx, backend, candidate, scope))
                    .find(|value| !value.is_null())
                    .unwrap_or(Value::Null);
                out.insert(name.to_string(), value);
            }
        }
    }
    out
}

fn dynamic_key<B: Backend>(ctx: &Extractor, backend: &B, selector: &str, scope: &B::Node) -> Option<String> {
    match evaluate_leaf(ctx, backend, selector, scope) {
        Value::Null => None,
        Value::String(name) => Some(name),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            warn!(selector = %selector, value = %other, "dynamic key is not a scalar, field skipped");
            None
        }
    }
}
