//! Error types for configuration, document and selector failures
//!
//! Most of these never reach the caller of [`Extractor::extract`](crate::Extractor::extract):
//! the evaluator logs them and degrades the affected field to null. They surface
//! directly through [`Extractor::try_extract`](crate::Extractor::try_extract) and
//! the lower level helpers.

use thiserror::Error;

/// Errors that can occur while evaluating an extraction configuration
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The configuration JSON could not be deserialized
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[source] serde_json::Error),

    /// The fetched document could not be parsed for the declared data type
    #[error("failed to parse {data_type} document: {reason}")]
    Document { data_type: String, reason: String },

    /// `_type` names a data type no engine handles
    #[error("unsupported data type '{0}'")]
    UnsupportedDataType(String),

    /// A CSS selector was rejected by the markup engine
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// A selector regex failed to compile
    #[error("invalid regex '{pattern}'")]
    InvalidRegex {
        pattern: String,
        #[source]
        error: regex::Error,
    },

    /// A date string did not match the registered input layout
    #[error("cannot reformat date '{value}' with layout '{layout}'")]
    DateFormat { value: String, layout: String },

    /// The embedded query sub-language rejected or failed a query
    #[error("query '{query}' failed: {reason}")]
    Query { query: String, reason: String },

    /// A value could not be converted to the declared type
    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: String },
}

impl From<serde_json::Error> for ExtractError {
    fn from(e: serde_json::Error) -> Self {
        ExtractError::InvalidConfig(e)
    }
}
