//! The extractor: capabilities, registries and the data type dispatch

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::assembly::{evaluate_mapping, Entry};
use crate::capabilities::{Filter, IdentityTemplate, NoFilter, Template};
use crate::config::{ConfigNode, DataType, Directives, ExtractorConfig};
use crate::date_format::{DateFormat, DateFormatRegistry};
use crate::error::ExtractError;
use crate::extractors::{filter_jsonp, parse_document, HtmlBackend, JsonBackend, TextBackend};
use crate::functions::FunctionRegistry;
use crate::query::{QueryLanguage, WhereQuery};

/// Evaluates extraction configurations against fetched documents
///
/// Holds only read-only state, so one extractor can serve concurrent calls.
///
/// ```
/// use crawl_extractor::{ConfigNode, Extractor};
///
/// let config = ConfigNode::from_json_str(r#"{"title": "h1"}"#).unwrap();
/// let result = Extractor::default().extract(&config, b"<h1> Hello </h1>");
/// assert_eq!(result, Some(serde_json::json!({"title": "Hello"})));
/// ```
#[derive(Clone)]
pub struct Extractor {
    filter: Arc<dyn Filter>,
    template: Arc<dyn Template>,
    query: Arc<dyn QueryLanguage>,
    dates: DateFormatRegistry,
    functions: FunctionRegistry,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl fmt::Debug for Extractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("dates", &self.dates)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

impl Extractor {
    pub fn builder() -> ExtractorBuilder {
        ExtractorBuilder::default()
    }

    pub fn filter(&self) -> &dyn Filter {
        self.filter.as_ref()
    }

    pub fn template(&self) -> &dyn Template {
        self.template.as_ref()
    }

    pub fn query(&self) -> &dyn QueryLanguage {
        self.query.as_ref()
    }

    pub fn dates(&self) -> &DateFormatRegistry {
        &self.dates
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Evaluate `config` against `body`
    ///
    /// Failures are logged and give `None`, as does a null result.
    pub fn extract(&self, config: &ConfigNode, body: &[u8]) -> Option<Value> {
        match self.try_extract(config, body) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "extraction failed");
                None
            }
        }
    }

    /// Parse the configuration from JSON text, then [`extract`](Self::extract)
    pub fn extract_json(&self, config_json: &str, body: &[u8]) -> Option<Value> {
        match ConfigNode::from_json_str(config_json) {
            Ok(config) => self.extract(&config, body),
            Err(e) => {
                warn!(error = %e, "extraction failed");
                None
            }
        }
    }

    /// Fallible form of [`extract`](Self::extract)
    ///
    /// Errors are limited to the document level: unknown data types and
    /// documents that fail to parse. Field level failures still degrade to null.
    pub fn try_extract(&self, config: &ConfigNode, body: &[u8]) -> Result<Value, ExtractError> {
        let ConfigNode::Node(fields) = config else {
            debug!("configuration is a bare selector, nothing to extract");
            return Ok(Value::Null);
        };
        let directives = Directives::from_fields(fields);

        let source = directives.source.and_then(|source| self.filter.filter(source));
        let body = match source.as_deref() {
            Some(replacement) => {
                debug!(bytes = replacement.len(), "document replaced by _source");
                replacement.as_bytes()
            }
            None => body,
        };

        let data_type = match directives.data_type {
            Some(raw) => raw.parse()?,
            None => DataType::default(),
        };
        self.dispatch(data_type, fields, body)
    }

    /// Parse `body` for `data_type` and evaluate `fields` at its root
    pub(crate) fn dispatch(
        &self,
        data_type: DataType,
        fields: &IndexMap<String, ConfigNode>,
        body: &[u8],
    ) -> Result<Value, ExtractError> {
        match data_type {
            DataType::Html => {
                let document = parse_document(body);
                if !document.errors.is_empty() {
                    debug!(count = document.errors.len(), "markup parse errors recovered");
                }
                let backend = HtmlBackend::new(self);
                Ok(evaluate_mapping(self, &backend, fields, &document.root_element(), Entry::Root))
            }
            DataType::Json | DataType::JsonString => {
                let text = String::from_utf8_lossy(body);
                let document: Value =
                    serde_json::from_str(filter_jsonp(&text)).map_err(|e| ExtractError::Document {
                        data_type: data_type.to_string(),
                        reason: e.to_string(),
                    })?;
                let backend = JsonBackend::new(self);
                Ok(evaluate_mapping(self, &backend, fields, &document, Entry::Root))
            }
            DataType::Text => {
                let document = String::from_utf8_lossy(body).into_owned();
                let backend = TextBackend::new(self);
                Ok(evaluate_mapping(self, &backend, fields, &document, Entry::Root))
            }
            DataType::Xml => {
                debug!("xml documents are not supported, returning null");
                Ok(Value::Null)
            }
        }
    }
}

/// Builder for [`Extractor`]
pub struct ExtractorBuilder {
    filter: Arc<dyn Filter>,
    template: Arc<dyn Template>,
    query: Arc<dyn QueryLanguage>,
    dates: DateFormatRegistry,
    functions: FunctionRegistry,
}

impl Default for ExtractorBuilder {
    fn default() -> Self {
        Self {
            filter: Arc::new(NoFilter),
            template: Arc::new(IdentityTemplate),
            query: Arc::new(WhereQuery),
            dates: DateFormatRegistry::new(),
            functions: FunctionRegistry::with_builtins(),
        }
    }
}

impl ExtractorBuilder {
    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    pub fn template(mut self, template: impl Template + 'static) -> Self {
        self.template = Arc::new(template);
        self
    }

    pub fn query_language(mut self, query: impl QueryLanguage + 'static) -> Self {
        self.query = Arc::new(query);
        self
    }

    pub fn date_format(mut self, key: impl Into<String>, format: DateFormat) -> Self {
        self.dates.insert(key, format);
        self
    }

    /// Register every date format of `config`
    pub fn config(mut self, config: &ExtractorConfig) -> Self {
        self.dates.load(config);
        self
    }

    pub fn function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.functions.register(name, function);
        self
    }

    pub fn build(self) -> Extractor {
        Extractor {
            filter: self.filter,
            template: self.template,
            query: self.query,
            dates: self.dates,
            functions: self.functions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(json: &str) -> ConfigNode {
        ConfigNode::from_json_str(json).unwrap()
    }

    #[test]
    fn test_leaf_config_gives_none() {
        let extractor = Extractor::default();
        assert_eq!(extractor.extract(&"h1".into(), b"<h1>x</h1>"), None);
    }

    #[test]
    fn test_default_type_is_html() {
        let extractor = Extractor::default();
        let result = extractor.extract(&config(r#"{"t": "title"}"#), b"<title>Shop</title>");
        assert_eq!(result, Some(json!({"t": "Shop"})));
    }

    #[test]
    fn test_source_replaces_document() {
        let extractor = Extractor::builder()
            .filter(|selector: &str| {
                (selector == "{{ prev.body }}").then(|| r#"{"id": 5}"#.to_string())
            })
            .build();
        let result = extractor.extract(
            &config(r#"{"_source": "{{ prev.body }}", "_type": "json", "id": "id"}"#),
            b"ignored",
        );
        assert_eq!(result, Some(json!({"id": "5"})));
    }

    #[test]
    fn test_jsonp_body() {
        let extractor = Extractor::default();
        let result = extractor.extract(
            &config(r#"{"_jsontype": "json", "a": "a"}"#),
            br#"callback({"a": "x"})"#,
        );
        assert_eq!(result, Some(json!({"a": "x"})));
    }

    #[test]
    fn test_document_level_errors() {
        let extractor = Extractor::default();
        assert!(matches!(
            extractor.try_extract(&config(r#"{"_type": "yaml", "a": "a"}"#), b""),
            Err(ExtractError::UnsupportedDataType(name)) if name == "yaml"
        ));
        assert!(matches!(
            extractor.try_extract(&config(r#"{"_type": "json", "a": "a"}"#), b"{broken"),
            Err(ExtractError::Document { .. })
        ));
        assert_eq!(extractor.extract(&config(r#"{"_type": "json", "a": "a"}"#), b"{broken"), None);
    }

    #[test]
    fn test_xml_is_null() {
        let extractor = Extractor::default();
        assert_eq!(
            extractor.try_extract(&config(r#"{"_type": "xml", "a": "a"}"#), b"<a/>").unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_extract_json_rejects_bad_config() {
        let extractor = Extractor::default();
        assert_eq!(extractor.extract_json("{not json", b""), None);
        assert_eq!(
            extractor.extract_json(r#"{"_type": "string", "n": "n=(\\d+)"}"#, b"n=4"),
            Some(json!({"n": "4"}))
        );
    }

    #[test]
    fn test_builder_registries() {
        let extractor = Extractor::builder()
            .config(&ExtractorConfig::from_json_str(
                r#"{"date_formats": {"day": {"input": "%d/%m/%Y", "output": "%Y-%m-%d"}}}"#,
            ).unwrap())
            .function("shout", |s: &str| json!(s.to_uppercase()))
            .build();
        assert!(extractor.dates().get("day").is_some());
        assert!(extractor.functions().get("shout").is_some());
        assert!(extractor.functions().get("next_day").is_some());

        let result = extractor.extract(
            &config(r#"{"d": "p;;;;;;day", "s": "p;;;;@function shout"}"#),
            b"<p>07/03/2015</p>",
        );
        assert_eq!(result, Some(json!({"d": "2015-03-07", "s": "07/03/2015"})));
    }
}
