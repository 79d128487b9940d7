//! Extraction engines
//!
//! One module per document model. Each provides a `Backend` for the shared
//! assembly layer plus the free helpers hosts may call directly.

pub mod html;
pub mod json;
pub mod text;

pub use html::{element_attr, element_text, parse_selector, query};
pub use json::{filter_jsonp, format_float};
pub use text::segments;

pub(crate) use html::{parse_document, HtmlBackend};
pub(crate) use json::JsonBackend;
pub(crate) use text::TextBackend;
