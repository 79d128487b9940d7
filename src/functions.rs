//! Named functions for `@function NAME` conditions
//!
//! Site integrations register pure `&str -> Value` transforms by name; the
//! markup pipeline only looks them up. Two transforms ship built in.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Duration, Months, NaiveDate, NaiveDateTime};
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::capture::find_first;

/// A named condition function
pub type NamedFunction = Arc<dyn Fn(&str) -> Value + Send + Sync>;

/// Registry of condition functions, built once and read afterwards
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, NamedFunction>,
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `score_history` and `next_day`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("score_history", score_history);
        registry.register("next_day", next_day);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&NamedFunction> {
        self.functions.get(name)
    }

    /// Run `name` on `content`; unknown names give null
    pub fn call(&self, name: &str, content: &str) -> Value {
        match self.get(name) {
            Some(function) => function(content),
            None => {
                warn!(function = %name, "unknown condition function");
                Value::Null
            }
        }
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

/// Monthly score table from a markup snippet carrying a daily series
///
/// The first date comes from `.year-ago p` (year, then `MM.DD`), the series
/// from `"arrYear":[...]`. Every 30th point is one month.
pub fn score_history(content: &str) -> Value {
    let Some(mut date) = score_start_date(content) else {
        return Value::Null;
    };
    let series = match find_first(r#"arrYear":\[(.*)\]"#, content) {
        Ok(Some(series)) => series,
        Ok(None) => return Value::Null,
        Err(e) => {
            warn!(error = %e, "score_history");
            return Value::Null;
        }
    };
    let points: Vec<&str> = series.split(',').map(str::trim).collect();

    let mut table = Map::new();
    for month in 0..12 {
        let index = month * 30;
        let Some(value) = points.get(index).filter(|v| !v.is_empty()) else {
            continue;
        };
        let change = if index == 0 {
            0
        } else {
            match (value.parse::<i64>(), points[index - 1].parse::<i64>()) {
                (Ok(now), Ok(previous)) => now - previous,
                _ => {
                    warn!(point = %value, "score_history: non-numeric series point");
                    continue;
                }
            }
        };
        table.insert(
            date.format("%Y.%m.%d").to_string(),
            json!({ "total": value, "change": change.to_string() }),
        );
        match date.checked_add_months(Months::new(1)) {
            Some(next) => date = next,
            None => break,
        }
    }
    Value::Object(table)
}

fn score_start_date(content: &str) -> Option<NaiveDate> {
    let document = Html::parse_fragment(content);
    let selector = Selector::parse(".year-ago p").ok()?;
    let mut parts = document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string());
    let year = parts.next()?;
    let month_day = parts.next()?;
    let raw = format!("{year}.{month_day}");
    match NaiveDate::parse_from_str(&raw, "%Y.%m.%d") {
        Ok(date) => Some(date),
        Err(e) => {
            warn!(date = %raw, error = %e, "score_history: bad start date");
            None
        }
    }
}

/// `Mon Jan 02 15:04:05 CST 2006` shifted forward one day, as `2006-01-03`
///
/// The zone abbreviation is ignored.
pub fn next_day(content: &str) -> Value {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    if tokens.len() != 6 {
        return Value::Null;
    }
    let without_zone = [tokens[0], tokens[1], tokens[2], tokens[3], tokens[5]].join(" ");
    match NaiveDateTime::parse_from_str(&without_zone, "%a %b %d %H:%M:%S %Y") {
        Ok(timestamp) => {
            Value::String((timestamp + Duration::days(1)).format("%Y-%m-%d").to_string())
        }
        Err(_) => Value::Null,
    }
}
