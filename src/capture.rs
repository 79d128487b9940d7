//! Regex capture shared by every engine
//!
//! A pattern either picks one value (group 1 when the pattern has groups,
//! the whole match otherwise) or, with the `@multi ` prefix, every group-1
//! capture in the input.

use regex::Regex;
use tracing::warn;

use crate::error::ExtractError;

const MULTI_PREFIX: &str = "@multi ";

/// Parsed capture pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capture {
    Single(String),
    Multi(String),
}

/// Outcome of applying a [`Capture`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    One(String),
    Many(Vec<String>),
}

impl Capture {
    /// Parse regex selector text, `None` when empty
    pub fn parse(pattern: &str) -> Option<Self> {
        if pattern.is_empty() {
            return None;
        }
        match pattern.find(MULTI_PREFIX) {
            Some(pos) => {
                let mut stripped = pattern.to_string();
                stripped.replace_range(pos..pos + MULTI_PREFIX.len(), "");
                Some(Capture::Multi(stripped))
            }
            None => Some(Capture::Single(pattern.to_string())),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Capture::Multi(_))
    }

    /// Apply the pattern; compile errors and misses are logged and degrade
    /// to an empty result
    pub fn apply(&self, text: &str) -> Captured {
        match self {
            Capture::Single(pattern) => match find_first(pattern, text) {
                Ok(Some(value)) => Captured::One(value),
                Ok(None) => {
                    warn!(pattern = %pattern, "regex found no value");
                    Captured::One(String::new())
                }
                Err(e) => {
                    warn!(error = %e, "regex capture skipped");
                    Captured::One(String::new())
                }
            },
            Capture::Multi(pattern) => match find_groups(pattern, text, 1) {
                Ok(values) => Captured::Many(values),
                Err(e) => {
                    warn!(error = %e, "regex capture skipped");
                    Captured::Many(Vec::new())
                }
            },
        }
    }
}

pub fn compile(pattern: &str) -> Result<Regex, ExtractError> {
    Regex::new(pattern).map_err(|error| ExtractError::InvalidRegex {
        pattern: pattern.to_string(),
        error,
    })
}

/// First match of `pattern`: group 1 when the pattern declares groups,
/// otherwise the whole match
pub fn find_first(pattern: &str, text: &str) -> Result<Option<String>, ExtractError> {
    let re = compile(pattern)?;
    Ok(re.captures(text).map(|caps| {
        let group = if caps.len() > 1 { caps.get(1) } else { caps.get(0) };
        group.map(|m| m.as_str().to_string()).unwrap_or_default()
    }))
}

/// Group `index` of every match; matches without that group are skipped
pub fn find_groups(pattern: &str, text: &str, index: usize) -> Result<Vec<String>, ExtractError> {
    let re = compile(pattern)?;
    Ok(re
        .captures_iter(text)
        .filter_map(|caps| caps.get(index).map(|m| m.as_str().to_string()))
        .collect())
}
