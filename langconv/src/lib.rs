//! Bidirectional language variant conversion
//!
//! Rewrites the text of an HTML document between variants of one language
//! (`zh-hans`/`zh-hant`, `sr-ec`/`sr-el`, ...) while keeping enough metadata
//! to restore the text as it was authored.
//!
//! # Workflow Example
//!
//! ```ignore
//! use langconv::{LanguageCache, LanguageConverter, LanguageRegistry, PageContext, SiteConfig, html};
//! use std::path::Path;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1. Register language data and share one cache between requests
//!     let registry = LanguageRegistry::from_data_dir(Path::new("data"))?;
//!     let cache = LanguageCache::new(registry);
//!     let converter = LanguageConverter::new(&cache);
//!
//!     // 2. Describe the site and the page
//!     let site = SiteConfig::from_languages([cache.get("zh").as_ref()]);
//!     let mut ctx = PageContext::new(site, "zh".parse()?);
//!
//!     // 3. Convert the document in place
//!     let mut doc = html::parse_document("<body><p>繁體字</p></body>")?;
//!     converter.maybe_convert(&mut ctx, &mut doc, Some(&"zh-hans".parse()?), None)?;
//!
//!     println!("{}", html::to_html(&doc));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod converter;
pub mod dom;
pub mod error;
pub mod guesser;
pub mod html;
pub mod language;
pub mod loader;
pub mod machine;
pub mod restore;
pub mod table;
pub mod traverser;
pub mod variant;

// End-to-end scenarios (only compiled for tests)
#[cfg(test)]
mod integration_tests;

// Re-export main types for convenient access
pub use config::{PageContext, SiteConfig, VariantInfo};
pub use converter::{ConversionOutcome, ConversionStats, LanguageConverter};
pub use dom::{Document, NodeData, NodeId, Selector};
pub use error::{LangConvError, LangConvResult};
pub use guesser::{ConstantGuesser, GuessResult, LanguageGuesser, MachineGuesser};
pub use language::{Language, LanguageCache, LanguageRegistry};
pub use loader::{LanguageData, load_language_from_file, load_language_from_str};
pub use machine::{BracketCount, Conversion, ReplacementMachine, Segment, SegmentKind};
pub use restore::restore_source;
pub use table::{Replacement, ReplacementTable};
pub use traverser::{ConversionTraverser, TraversalReport};
pub use variant::VariantCode;
