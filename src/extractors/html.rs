//! Markup extraction
//!
//! Uses the scraper crate to resolve CSS locators inside the current element
//! and to read text, inner HTML or attributes of the first match.

use std::marker::PhantomData;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::warn;

use crate::assembly::Backend;
use crate::config::DataType;
use crate::engine::Extractor;
use crate::error::ExtractError;
use crate::pipeline::{convert, process_text};
use crate::selector::{MarkupLocator, MarkupSelector, Pick};

/// Whole-scope leaf: inner HTML of the current element, the full markup at
/// the document root
const DATA_LEAF: &str = "@data";

pub(crate) struct HtmlBackend<'c, 'd> {
    ctx: &'c Extractor,
    document: PhantomData<&'d Html>,
}

impl<'c> HtmlBackend<'c, '_> {
    pub(crate) fn new(ctx: &'c Extractor) -> Self {
        Self {
            ctx,
            document: PhantomData,
        }
    }

    fn locate_parsed<'d>(&self, scope: &ElementRef<'d>, locator: &MarkupLocator) -> Vec<ElementRef<'d>> {
        match query(*scope, locator) {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "markup locator");
                Vec::new()
            }
        }
    }
}

/// Parse a CSS selector, reporting scraper's error
pub fn parse_selector(query: &str) -> Result<Selector, ExtractError> {
    Selector::parse(query).map_err(|e| ExtractError::InvalidSelector {
        selector: query.to_string(),
        reason: format!("{e:?}"),
    })
}

/// True for the root element, which stands for the whole document
pub fn is_document_root(element: &ElementRef<'_>) -> bool {
    element.parent().is_some_and(|parent| parent.value().is_document())
}

/// Elements under `scope` matched by `locator`, after its extension is applied
///
/// The scope element itself only matches when it is the document root, so
/// top-level locators such as `html` behave as if run from the document.
/// An empty query selects the scope.
pub fn query<'a>(scope: ElementRef<'a>, locator: &MarkupLocator) -> Result<Vec<ElementRef<'a>>, ExtractError> {
    let found: Vec<ElementRef<'a>> = if locator.query.is_empty() {
        vec![scope]
    } else {
        let selector = parse_selector(&locator.query)?;
        let mut found: Vec<ElementRef<'a>> = scope
            .select(&selector)
            .filter(|el| el.id() != scope.id())
            .collect();
        if is_document_root(&scope) && selector.matches(&scope) {
            found.insert(0, scope);
        }
        found
    };

    Ok(match locator.pick {
        Pick::All => found,
        Pick::Index(index) => found.into_iter().nth(index).into_iter().collect(),
        Pick::Last => found.into_iter().last().into_iter().collect(),
        Pick::Parent(levels) => {
            let mut current = found.into_iter().next();
            for _ in 0..levels {
                current = current
                    .and_then(|el| el.parent())
                    .and_then(ElementRef::wrap);
            }
            current.into_iter().collect()
        }
    })
}

/// Trimmed text content of an element
pub fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Attribute value; scheme-relative `href`/`src` values become https
pub fn element_attr(element: &ElementRef<'_>, name: &str) -> String {
    let value = element.value().attr(name).unwrap_or_default();
    if matches!(name, "href" | "src") && value.starts_with("//") {
        format!("https:{value}")
    } else {
        value.to_string()
    }
}

impl<'d> Backend for HtmlBackend<'_, 'd> {
    type Node = ElementRef<'d>;

    fn data_type(&self) -> DataType {
        DataType::Html
    }

    fn locate(&self, scope: &ElementRef<'d>, locator: &str) -> Vec<ElementRef<'d>> {
        self.locate_parsed(scope, &MarkupLocator::parse(locator))
    }

    fn leaf(&self, scope: &ElementRef<'d>, selector: &str) -> Value {
        if selector == DATA_LEAF {
            let markup = if is_document_root(scope) {
                scope.html()
            } else {
                scope.inner_html()
            };
            return Value::String(markup);
        }
        let selector = MarkupSelector::parse(selector, self.ctx.dates());
        let found = self.locate_parsed(scope, &selector.locator);
        let Some(first) = found.first() else {
            if selector.post.regex.as_ref().is_some_and(|r| r.is_multi()) {
                return Value::Array(Vec::new());
            }
            return match &selector.post.default {
                Some(default) => convert(default, selector.post.value_type),
                None => Value::Null,
            };
        };
        let raw = match selector.attr.as_deref() {
            Some("html") => first.inner_html(),
            Some(name) => element_attr(first, name),
            None => element_text(first),
        };
        process_text(self.ctx, &raw, &selector.post)
    }

    fn text(&self, scope: &ElementRef<'d>) -> String {
        scope.inner_html()
    }
}

/// Parse markup bytes into a document
pub(crate) fn parse_document(body: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
    <html>
    <body>
        <ul class="menu">
            <li class="item"><a href="/home">Home</a></li>
            <li class="item"><a href="//cdn.example.com/about">About</a></li>
            <li class="item"><a href="/contact">Contact</a></li>
        </ul>
        <div class="product-card" data-id="123">
            <span class="price"> $29.99 </span>
        </div>
    </body>
    </html>
    "#;

    fn locate_texts(html: &Html, locator: &str) -> Vec<String> {
        let ctx = Extractor::default();
        let backend = HtmlBackend::new(&ctx);
        backend
            .locate(&html.root_element(), locator)
            .iter()
            .map(element_text)
            .collect()
    }

    #[test]
    fn test_locator_extensions() {
        let html = Html::parse_document(PAGE);
        assert_eq!(locate_texts(&html, "li.item"), vec!["Home", "About", "Contact"]);
        assert_eq!(locate_texts(&html, "li.item @index=2"), vec!["Contact"]);
        assert_eq!(locate_texts(&html, "li.item @last"), vec!["Contact"]);
        assert!(locate_texts(&html, "li.item @index=7").is_empty());
    }

    #[test]
    fn test_parent_walk() {
        let html = Html::parse_document(PAGE);
        let ctx = Extractor::default();
        let backend = HtmlBackend::new(&ctx);
        let found = backend.locate(&html.root_element(), "span.price @parent=1");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].value().attr("data-id"), Some("123"));

        let found = backend.locate(&html.root_element(), "a @parent=2");
        assert_eq!(found[0].value().attr("class"), Some("menu"));
    }

    #[test]
    fn test_invalid_css_matches_nothing() {
        let html = Html::parse_document(PAGE);
        assert!(locate_texts(&html, "li[[").is_empty());
        assert!(matches!(
            parse_selector("li[["),
            Err(ExtractError::InvalidSelector { .. })
        ));
    }

    #[test]
    fn test_leaf_values() {
        let html = Html::parse_document(PAGE);
        let ctx = Extractor::default();
        let backend = HtmlBackend::new(&ctx);
        let root = html.root_element();

        assert_eq!(backend.leaf(&root, "span.price"), Value::String("$29.99".into()));
        assert_eq!(
            backend.leaf(&root, "li.item @index=1 a;href"),
            Value::String("https://cdn.example.com/about".into())
        );
        assert_eq!(
            backend.leaf(&root, "div.product-card;data-id;;int"),
            serde_json::json!(123)
        );
        assert_eq!(
            backend.leaf(&root, "li.item @index=0;html"),
            Value::String(r#"<a href="/home">Home</a>"#.into())
        );
        assert_eq!(backend.leaf(&root, ".missing;;;;;n/a"), Value::String("n/a".into()));
        assert_eq!(backend.leaf(&root, ".missing;;@multi (x)"), serde_json::json!([]));
        assert_eq!(backend.leaf(&root, ".missing"), Value::Null);
    }

    #[test]
    fn test_document_root_matches_itself() {
        let html = Html::parse_document(r#"<html lang="en"><body><p>x</p></body></html>"#);
        let ctx = Extractor::default();
        let backend = HtmlBackend::new(&ctx);
        let root = html.root_element();

        assert_eq!(backend.locate(&root, "html").len(), 1);
        assert_eq!(backend.leaf(&root, "html;lang"), Value::String("en".into()));
        let Value::String(markup) = backend.leaf(&root, "@data") else {
            panic!("expected markup");
        };
        assert!(markup.starts_with("<html"));

        // below the root the scope still never matches itself
        let body = backend.locate(&root, "body").remove(0);
        assert!(backend.locate(&body, "body").is_empty());
        assert_eq!(backend.locate(&body, "p").len(), 1);
    }
}
