//! Named date reformatting
//!
//! Layouts use chrono's `strftime` syntax. The registry is filled when the
//! extractor is built and only read afterwards.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::warn;

use crate::config::ExtractorConfig;
use crate::error::ExtractError;

/// Input layout -> output layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pub input: String,
    pub output: String,
}

impl DateFormat {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Reformat `value`; a value that does not match the input layout gives
    /// an empty string
    pub fn format(&self, value: &str) -> String {
        match self.try_format(value) {
            Ok(formatted) => formatted,
            Err(e) => {
                warn!(error = %e, "date format");
                String::new()
            }
        }
    }

    pub fn try_format(&self, value: &str) -> Result<String, ExtractError> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_str(value, &self.input) {
            return Ok(dt.format(&self.output).to_string());
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, &self.input) {
            return Ok(dt.format(&self.output).to_string());
        }
        if let Ok(date) = NaiveDate::parse_from_str(value, &self.input) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(dt.format(&self.output).to_string());
            }
        }
        Err(ExtractError::DateFormat {
            value: value.to_string(),
            layout: self.input.clone(),
        })
    }
}

/// Date formats keyed by the name selectors refer to
#[derive(Debug, Clone, Default)]
pub struct DateFormatRegistry {
    formats: HashMap<String, DateFormat>,
}

impl DateFormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every date format of `config`, replacing formats with the same key
    pub fn load(&mut self, config: &ExtractorConfig) {
        for (key, format) in &config.date_formats {
            self.insert(key, DateFormat::new(&format.input, &format.output));
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, format: DateFormat) {
        self.formats.insert(key.into(), format);
    }

    pub fn get(&self, key: &str) -> Option<&DateFormat> {
        self.formats.get(key)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }
}
