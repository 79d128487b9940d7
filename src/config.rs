//! Extraction configuration trees and engine configuration
//!
//! A configuration is a JSON document whose leaves are selector strings and
//! whose objects map output field names to nested configurations. Keys that
//! start with `_` are directives and never appear in the output.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ExtractError;

/// Recursive extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigNode {
    /// A selector string evaluated against the current scope
    Leaf(String),
    /// Field name -> nested configuration, in document order
    Node(IndexMap<String, ConfigNode>),
}

impl ConfigNode {
    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        serde_json::from_str(json).map_err(ExtractError::InvalidConfig)
    }

    /// Convert an already parsed JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, ExtractError> {
        serde_json::from_value(value).map_err(ExtractError::InvalidConfig)
    }
}

impl From<&str> for ConfigNode {
    fn from(selector: &str) -> Self {
        ConfigNode::Leaf(selector.to_string())
    }
}

/// Directive keys of a configuration mapping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Directives<'a> {
    /// `_root`: locator that narrows the scope
    pub root: Option<&'a str>,
    /// `_error`: locator that must match, otherwise the subtree is a page error
    pub error: Option<&'a str>,
    /// `_source`: Filter expression replacing the input document
    pub source: Option<&'a str>,
    /// `_type` / `_jsontype`: data type of this subtree
    pub data_type: Option<&'a str>,
}

impl<'a> Directives<'a> {
    pub fn from_fields(fields: &'a IndexMap<String, ConfigNode>) -> Self {
        let mut directives = Directives::default();
        for (key, value) in fields {
            let Some(name) = key.strip_prefix('_') else {
                continue;
            };
            let ConfigNode::Leaf(text) = value else {
                warn!(directive = %key, "directive value must be a string, ignoring");
                continue;
            };
            match name {
                "root" => directives.root = Some(text.as_str()),
                "error" => directives.error = Some(text.as_str()),
                "source" => directives.source = Some(text.as_str()),
                // _type wins when both are present
                "type" => directives.data_type = Some(text.as_str()),
                "jsontype" => {
                    directives.data_type.get_or_insert(text.as_str());
                }
                _ => {}
            }
        }
        directives
    }
}

/// Returns true for keys that are directives rather than output fields
pub fn is_directive(key: &str) -> bool {
    key.starts_with('_')
}

/// Output key of a configuration field, with its modifier resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKey<'a> {
    /// Emitted verbatim
    Plain(&'a str),
    /// `@key<selector>`: the key itself is extracted from the scope
    Dynamic(&'a str),
    /// `@dupkey <N> <name>`: one of several candidates for `name`
    Dup { order: usize, name: &'a str },
}

impl<'a> FieldKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        if let Some(rest) = key.strip_prefix("@dupkey") {
            let rest = rest.trim_start_matches('_').trim_start();
            let (order, name) = match rest.split_once(char::is_whitespace) {
                Some((order, name)) => (order, name.trim()),
                None => ("", rest),
            };
            let order = order.parse().unwrap_or_else(|_| {
                warn!(key = %key, "dupkey without numeric order, sorting it last");
                usize::MAX
            });
            return FieldKey::Dup { order, name };
        }
        if let Some(selector) = key.strip_prefix("@key") {
            return FieldKey::Dynamic(selector.trim());
        }
        FieldKey::Plain(key)
    }
}

/// Document model a configuration subtree is evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DataType {
    #[default]
    Html,
    Json,
    /// JSON whose scope is re-parsed from a string value
    JsonString,
    /// Raw text, regex only
    Text,
    /// Reserved, evaluates to null
    Xml,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Html => "html",
            DataType::Json => "json",
            DataType::JsonString => "jsonstring",
            DataType::Text => "string",
            DataType::Xml => "xml",
        }
    }
}

impl FromStr for DataType {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "html" => Ok(DataType::Html),
            "json" => Ok(DataType::Json),
            "jsonstring" => Ok(DataType::JsonString),
            "string" | "text" => Ok(DataType::Text),
            "xml" => Ok(DataType::Xml),
            other => Err(ExtractError::UnsupportedDataType(other.to_string())),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input/output layout pair of a named date format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFormatConfig {
    /// chrono `strftime` layout of extracted values
    pub input: String,
    /// chrono `strftime` layout of the emitted value
    pub output: String,
}

/// Engine-level configuration, loaded once when the extractor is built
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Named date formats referenced from selectors
    #[serde(default)]
    pub date_formats: IndexMap<String, DateFormatConfig>,
}

impl ExtractorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ExtractError> {
        serde_json::from_str(json).map_err(ExtractError::InvalidConfig)
    }
}
