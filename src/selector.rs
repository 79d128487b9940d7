//! Selector grammar
//!
//! Every selector may end with `>|template`, split off first. The remainder is
//! positional and `;` separated:
//!
//! - markup: `LOCATOR;ATTR;REGEX;TYPE;CONDITION;DEFAULT;DATEFORMAT`
//! - JSON:   `PATH;FLAGS;DEFAULT;DATEFORMAT;REGEX` (the regex may contain `;`)
//! - text:   `[@multi ]REGEX`
//!
//! Markup locators accept `@index=N`, `@parent=N` and `@last`; any `_root`
//! locator accepts `@array`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::capture::Capture;
use crate::date_format::{DateFormat, DateFormatRegistry};

const TEMPLATE_MARKER: &str = ">|";
const ARRAY_MARKER: &str = "@array";
const LAST_MARKER: &str = "@last";

static INDEX_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@index\s*=\s*([^\s]+)").expect("static regex"));
static PARENT_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@parent\s*=\s*([^\s]+)").expect("static regex"));

/// Split a `>|template` suffix off selector text
pub fn split_template(text: &str) -> (&str, Option<&str>) {
    match text.rfind(TEMPLATE_MARKER) {
        Some(pos) => {
            let name = text[pos + TEMPLATE_MARKER.len()..].trim();
            (&text[..pos], (!name.is_empty()).then_some(name))
        }
        None => (text, None),
    }
}

/// `_root` locator with the `@array` marker removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLocator {
    pub locator: String,
    pub force_array: bool,
}

impl RootLocator {
    pub fn parse(text: &str) -> Self {
        match text.find(ARRAY_MARKER) {
            Some(pos) => {
                let mut locator = text.to_string();
                locator.replace_range(pos..pos + ARRAY_MARKER.len(), "");
                RootLocator {
                    locator: locator.trim().to_string(),
                    force_array: true,
                }
            }
            None => RootLocator {
                locator: text.trim().to_string(),
                force_array: false,
            },
        }
    }
}

/// Which match of a markup query a locator keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    All,
    Index(usize),
    /// First match, then this many ancestors up
    Parent(usize),
    Last,
}

/// CSS query plus locator extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupLocator {
    pub query: String,
    pub pick: Pick,
}

impl MarkupLocator {
    pub fn parse(text: &str) -> Self {
        if let Some((query, index)) = take_int_attr(&INDEX_ATTR, text) {
            return MarkupLocator {
                query: PARENT_ATTR.replace(&query, "").trim().to_string(),
                pick: Pick::Index(index),
            };
        }
        if let Some((query, levels)) = take_int_attr(&PARENT_ATTR, text) {
            return MarkupLocator {
                query,
                pick: Pick::Parent(levels),
            };
        }
        if let Some(pos) = text.find(LAST_MARKER) {
            let mut query = text.to_string();
            query.replace_range(pos..pos + LAST_MARKER.len(), "");
            return MarkupLocator {
                query: query.trim().to_string(),
                pick: Pick::Last,
            };
        }
        MarkupLocator {
            query: text.trim().to_string(),
            pick: Pick::All,
        }
    }
}

/// Remove `@name=N` from `text`, keeping the whitespace around it; `None`
/// when absent or not a number
fn take_int_attr(pattern: &Regex, text: &str) -> Option<(String, usize)> {
    let caps = pattern.captures(text)?;
    let raw = caps.get(1)?.as_str();
    let value = match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(locator = %text, value = %raw, "locator attribute is not a number");
            return None;
        }
    };
    let whole = caps.get(0)?;
    let query = format!("{}{}", &text[..whole.start()], &text[whole.end()..]);
    Some((query.trim().to_string(), value))
}

/// Declared conversion of the legacy markup selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Int,
    Float,
    Bool,
    Json,
}

impl ValueType {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "" => None,
            "int" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "bool" => Some(ValueType::Bool),
            "json" => Some(ValueType::Json),
            other => {
                warn!(value_type = %other, "unknown selector type, keeping text");
                None
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Json => "json",
        }
    }
}

/// Condition column of the markup selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// `@function NAME`
    Function(String),
    /// `needle=value` rules, in written order
    Rules(Vec<(String, String)>),
}

impl Condition {
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }
        if let Some(name) = text.strip_prefix("@function") {
            return Some(Condition::Function(name.trim().to_string()));
        }
        let rules = text
            .split(',')
            .map(|rule| match rule.split_once('=') {
                Some((needle, value)) => (needle.to_string(), value.to_string()),
                None => (rule.to_string(), String::new()),
            })
            .collect();
        Some(Condition::Rules(rules))
    }
}

/// Post-processing options shared by all selector forms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostProcess {
    pub regex: Option<Capture>,
    pub value_type: Option<ValueType>,
    pub condition: Option<Condition>,
    pub default: Option<String>,
    pub date_format: Option<DateFormat>,
    pub template: Option<String>,
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.filter(|t| !t.is_empty()).map(str::to_string)
}

fn lookup_date_format(key: Option<&str>, dates: &DateFormatRegistry) -> Option<DateFormat> {
    let key = key.map(str::trim).filter(|k| !k.is_empty())?;
    let format = dates.get(key).cloned();
    if format.is_none() {
        warn!(date_format = %key, "unknown date format");
    }
    format
}

/// Legacy typed markup selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupSelector {
    pub locator: MarkupLocator,
    /// Attribute name, or `html` for the serialized inner markup
    pub attr: Option<String>,
    pub post: PostProcess,
}

impl MarkupSelector {
    pub fn parse(text: &str, dates: &DateFormatRegistry) -> Self {
        let (body, template) = split_template(text);
        let mut fields = body.split(';');
        let locator = MarkupLocator::parse(fields.next().unwrap_or_default());
        let attr = non_empty(fields.next().map(str::trim));
        let regex = fields.next().and_then(Capture::parse);
        let value_type = fields.next().and_then(ValueType::parse);
        let condition = fields.next().and_then(Condition::parse);
        let default = non_empty(fields.next());
        let date_format = lookup_date_format(fields.next(), dates);
        MarkupSelector {
            locator,
            attr,
            post: PostProcess {
                regex,
                value_type,
                condition,
                default,
                date_format,
                template: template.map(str::to_string),
            },
        }
    }
}

/// JSON path selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSelector {
    pub path: String,
    /// Parse the resolved string as a nested JSON document
    pub unmarshal: bool,
    pub post: PostProcess,
}

impl JsonSelector {
    pub fn parse(text: &str, dates: &DateFormatRegistry) -> Self {
        let (body, template) = split_template(text);
        let mut fields = body.splitn(5, ';');
        let path = fields.next().unwrap_or_default().trim().to_string();
        let unmarshal = fields
            .next()
            .is_some_and(|flags| flags.split(',').any(|flag| flag.trim() == "unmarshal"));
        let default = non_empty(fields.next());
        let date_format = lookup_date_format(fields.next(), dates);
        let regex = fields.next().and_then(Capture::parse);
        JsonSelector {
            path,
            unmarshal,
            post: PostProcess {
                regex,
                default,
                date_format,
                template: template.map(str::to_string),
                ..PostProcess::default()
            },
        }
    }
}

/// Raw-text selector: the whole text is a capture pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSelector {
    pub capture: Option<Capture>,
    pub template: Option<String>,
}

impl TextSelector {
    pub fn parse(text: &str) -> Self {
        let (body, template) = split_template(text);
        TextSelector {
            capture: Capture::parse(body),
            template: template.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dates() -> DateFormatRegistry {
        let mut dates = DateFormatRegistry::new();
        dates.insert("day", DateFormat::new("%Y年%m月%d日", "%Y-%m-%d"));
        dates
    }

    #[test]
    fn test_split_template() {
        assert_eq!(split_template(".title>|upper"), (".title", Some("upper")));
        assert_eq!(split_template(".title"), (".title", None));
        assert_eq!(split_template(".title>|"), (".title", None));
    }

    #[test]
    fn test_root_locator() {
        assert_eq!(
            RootLocator::parse("ul li @array"),
            RootLocator { locator: "ul li".into(), force_array: true }
        );
        assert!(!RootLocator::parse("ul li").force_array);
    }

    #[test]
    fn test_locator_extensions() {
        assert_eq!(
            MarkupLocator::parse("#list ul li @index= 3 "),
            MarkupLocator { query: "#list ul li".into(), pick: Pick::Index(3) }
        );
        assert_eq!(MarkupLocator::parse("td @index=1").pick, Pick::Index(1));
        assert_eq!(
            MarkupLocator::parse("span.price @parent=2"),
            MarkupLocator { query: "span.price".into(), pick: Pick::Parent(2) }
        );
        assert_eq!(
            MarkupLocator::parse("li @last"),
            MarkupLocator { query: "li".into(), pick: Pick::Last }
        );
        // index wins over parent
        assert_eq!(
            MarkupLocator::parse("li @parent=1 @index=0"),
            MarkupLocator { query: "li".into(), pick: Pick::Index(0) }
        );
        assert_eq!(MarkupLocator::parse("li @index=x").pick, Pick::All);
        // the marker may sit directly against the selector before it
        assert_eq!(
            MarkupLocator::parse("li@index=2 b"),
            MarkupLocator { query: "li b".into(), pick: Pick::Index(2) }
        );
        assert_eq!(MarkupLocator::parse("td@parent=1 a").query, "td a");
    }

    #[test]
    fn test_markup_selector_fields() {
        let selector = MarkupSelector::parse(
            r"p.date;title;(\d+年\d+月\d+日);;;;day>|trim",
            &dates(),
        );
        assert_eq!(selector.locator.query, "p.date");
        assert_eq!(selector.attr.as_deref(), Some("title"));
        assert_eq!(
            selector.post.regex,
            Some(Capture::Single(r"(\d+年\d+月\d+日)".into()))
        );
        assert_eq!(selector.post.value_type, None);
        assert!(selector.post.date_format.is_some());
        assert_eq!(selector.post.template.as_deref(), Some("trim"));
    }

    #[test]
    fn test_markup_selector_condition() {
        let selector = MarkupSelector::parse(".state;;;int;ok=1,fail=0;-1", &dates());
        assert_eq!(selector.post.value_type, Some(ValueType::Int));
        assert_eq!(
            selector.post.condition,
            Some(Condition::Rules(vec![
                ("ok".into(), "1".into()),
                ("fail".into(), "0".into())
            ]))
        );
        assert_eq!(selector.post.default.as_deref(), Some("-1"));

        let selector = MarkupSelector::parse(";html;;;@function next_day", &dates());
        assert_eq!(selector.locator.query, "");
        assert_eq!(
            selector.post.condition,
            Some(Condition::Function("next_day".into()))
        );
    }

    #[test]
    fn test_json_selector_fields() {
        let selector = JsonSelector::parse(r"data.raw;unmarshal;;;id=(\d+);x>|wrap", &dates());
        assert_eq!(selector.path, "data.raw");
        assert!(selector.unmarshal);
        assert_eq!(selector.post.default, None);
        assert_eq!(selector.post.regex, Some(Capture::Single(r"id=(\d+);x".into())));
        assert_eq!(selector.post.template.as_deref(), Some("wrap"));

        let plain = JsonSelector::parse("items.[0].name", &dates());
        assert!(!plain.unmarshal);
        assert_eq!(plain.post, PostProcess::default());
    }

    #[test]
    fn test_unknown_date_format_is_ignored() {
        let selector = JsonSelector::parse("a;;;nope", &dates());
        assert!(selector.post.date_format.is_none());
    }
}
