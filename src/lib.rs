//! Declarative extraction of structured records from crawled documents
//!
//! A JSON configuration tree describes the output: string leaves are
//! selectors, objects map output fields to nested configurations. The same
//! tree drives three engines:
//! - HTML via CSS locators with `@index`, `@parent` and `@last` extensions
//! - JSON via dot paths with `[N]`, `[*]` and `(where-clause)` segments
//! - Plain text via regular expressions
//!
//! Extracted strings share one post-processing pipeline (regex capture,
//! conditions, defaults, date reformatting, type conversion, templates).

mod assembly;
pub mod capabilities;
pub mod capture;
pub mod config;
pub mod date_format;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod functions;
mod pipeline;
pub mod query;
pub mod selector;

pub use assembly::page_error;
pub use capabilities::{Filter, IdentityTemplate, NoFilter, Template};
pub use config::{ConfigNode, DataType, DateFormatConfig, ExtractorConfig};
pub use date_format::{DateFormat, DateFormatRegistry};
pub use engine::{Extractor, ExtractorBuilder};
pub use error::ExtractError;
pub use extractors::filter_jsonp;
pub use ffi::*;
pub use functions::FunctionRegistry;
pub use query::{QueryLanguage, WhereQuery};
