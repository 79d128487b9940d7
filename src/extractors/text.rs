//! Raw text extraction: every selector is a regex over the current segment

use serde_json::Value;
use tracing::warn;

use crate::assembly::Backend;
use crate::capture::{compile, Captured};
use crate::config::DataType;
use crate::engine::Extractor;
use crate::pipeline::apply_template;
use crate::selector::TextSelector;

pub(crate) struct TextBackend<'c> {
    ctx: &'c Extractor,
}

impl<'c> TextBackend<'c> {
    pub(crate) fn new(ctx: &'c Extractor) -> Self {
        Self { ctx }
    }
}

/// Split `text` into the matches of `pattern`, group 1 when present
pub fn segments(pattern: &str, text: &str) -> Vec<String> {
    let re = match compile(pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!(error = %e, "text segmentation skipped");
            return Vec::new();
        }
    };
    re.captures_iter(text)
        .filter_map(|caps| {
            let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
            group.map(|m| m.as_str().to_string())
        })
        .collect()
}

impl Backend for TextBackend<'_> {
    type Node = String;

    fn data_type(&self) -> DataType {
        DataType::Text
    }

    fn locate(&self, scope: &String, locator: &str) -> Vec<String> {
        segments(locator, scope)
    }

    fn leaf(&self, scope: &String, selector: &str) -> Value {
        let selector = TextSelector::parse(selector);
        let Some(capture) = selector.capture else {
            return Value::Null;
        };
        let value = match capture.apply(scope) {
            Captured::Many(values) => {
                return Value::Array(values.into_iter().map(Value::String).collect())
            }
            Captured::One(value) if value.is_empty() => return Value::Null,
            Captured::One(value) => Value::String(value),
        };
        apply_template(self.ctx, value, selector.template.as_deref())
    }

    fn text(&self, scope: &String) -> String {
        scope.clone()
    }
}
