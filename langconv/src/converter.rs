//! The language converter
//!
//! [`LanguageConverter`] decides whether a document should be converted at
//! all, picks the source variant strategy and runs the traverser over the
//! page body. Every "nothing to do" case is an `Ok` outcome; only a declared
//! source the language cannot convert from, and table failures, are errors.
//!
//! # Example
//!
//! ```ignore
//! let converter = LanguageConverter::new(&cache);
//! match converter.maybe_convert_codes(&mut ctx, &mut doc, Some("zh-hans"), None)? {
//!     ConversionOutcome::Converted(report) => println!("{} wrappers", report.wrappers),
//!     other => println!("left alone: {:?}", other),
//! }
//! ```

use crate::config::PageContext;
use crate::dom::{Document, Selector};
use crate::error::{LangConvError, LangConvResult};
use crate::guesser::{ConstantGuesser, LanguageGuesser, MachineGuesser};
use crate::language::LanguageCache;
use crate::restore::restore_source;
use crate::traverser::{ConversionTraverser, TraversalReport, VariantPayload};
use crate::variant::VariantCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Instant;
use tracing::{debug, info};

static NO_CONTENT_CONVERT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="mw:PageProp/nocontentconvert"]"#).unwrap()
});

static VARIANT_WRAPPER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"span[typeof~="mw:LanguageVariant"][data-mw-variant]"#).unwrap()
});

/// Which branch a conversion request took
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Conversion is switched off for the site
    Disabled,
    /// No target variant was requested
    NoTarget,
    /// The target is not a variant the site knows about
    NotAVariant,
    /// The target is the base language itself
    BaseTarget,
    /// The page opted out of content conversion
    OptedOut,
    /// The language has no table for the target
    Unimplemented,
    /// The declared source is the target
    SourceIsTarget,
    /// The document was already converted to the target
    AlreadyConverted,
    Converted(TraversalReport),
}

impl ConversionOutcome {
    /// Whether the document was modified
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionOutcome::Converted(_))
    }
}

/// How many conversions were attempted, overall and per target variant.
///
/// Counted once the target and the declared source are known to be valid,
/// whether or not the document then needed any change.
#[derive(Debug, Default)]
pub struct ConversionStats {
    total: AtomicU64,
    by_target: Mutex<HashMap<String, u64>>,
}

impl ConversionStats {
    fn record(&self, target: &VariantCode) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let mut by_target = self.by_target.lock().unwrap_or_else(|e| e.into_inner());
        *by_target.entry(target.mw_code().to_string()).or_default() += 1;
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn count_for(&self, target: &VariantCode) -> u64 {
        let by_target = self.by_target.lock().unwrap_or_else(|e| e.into_inner());
        by_target.get(target.mw_code()).copied().unwrap_or(0)
    }
}

pub struct LanguageConverter<'a> {
    cache: &'a LanguageCache,
    stats: ConversionStats,
}

impl<'a> LanguageConverter<'a> {
    pub fn new(cache: &'a LanguageCache) -> Self {
        LanguageConverter {
            cache,
            stats: ConversionStats::default(),
        }
    }

    pub fn stats(&self) -> &ConversionStats {
        &self.stats
    }

    /// Whether the page language can convert into `target`
    pub fn implements_conversion(&self, ctx: &PageContext, target: &VariantCode) -> bool {
        self.cache
            .for_page_language(ctx.page_language())
            .implements(target)
    }

    /// Like [`maybe_convert`](Self::maybe_convert), with the variants given as
    /// codes in either MediaWiki or BCP 47 spelling.
    ///
    /// A target that does not parse is treated as not a variant; a declared
    /// source that does not parse is an error.
    pub fn maybe_convert_codes(
        &self,
        ctx: &mut PageContext,
        doc: &mut Document,
        target: Option<&str>,
        source: Option<&str>,
    ) -> LangConvResult<ConversionOutcome> {
        let target = match target.map(VariantCode::from_mw_code) {
            None => None,
            Some(Ok(code)) => Some(code),
            Some(Err(e)) => {
                debug!("Ignoring unparseable target variant: {}", e);
                return Ok(ConversionOutcome::NotAVariant);
            }
        };
        let source = match source {
            None => None,
            Some(code) => Some(VariantCode::from_mw_code(code).map_err(|_| {
                LangConvError::InvalidSourceVariant {
                    source_variant: code.to_string(),
                    target: target
                        .as_ref()
                        .map(|t| t.to_string())
                        .unwrap_or_default(),
                }
            })?),
        };
        self.maybe_convert(ctx, doc, target.as_ref(), source.as_ref())
    }

    /// Convert the body of `doc` to `target` if the page and site allow it.
    ///
    /// The target is recorded on `ctx` once it is known to be a proper
    /// variant, even when the page then opts out of conversion.
    pub fn maybe_convert(
        &self,
        ctx: &mut PageContext,
        doc: &mut Document,
        target: Option<&VariantCode>,
        source: Option<&VariantCode>,
    ) -> LangConvResult<ConversionOutcome> {
        if !ctx.langconv_enabled() {
            return Ok(ConversionOutcome::Disabled);
        }
        let Some(target) = target else {
            return Ok(ConversionOutcome::NoTarget);
        };
        let Some(info) = ctx.site().variants_for(target) else {
            return Ok(ConversionOutcome::NotAVariant);
        };
        if info.base == *target {
            return Ok(ConversionOutcome::BaseTarget);
        }

        ctx.set_variant(target.clone());

        if doc.query_selector(doc.root(), &NO_CONTENT_CONVERT).is_some() {
            debug!("Page opted out of content conversion");
            return Ok(ConversionOutcome::OptedOut);
        }
        self.base_to_variant(ctx, doc, target, source)
    }

    /// Convert the body of `doc` to `target`, guessing the source variant per
    /// element unless `source` declares it.
    ///
    /// # Errors
    /// - `InvalidSourceVariant` when `source` has no table
    /// - `UnsupportedVariant` from the machine; the document is unmodified
    pub fn base_to_variant(
        &self,
        ctx: &PageContext,
        doc: &mut Document,
        target: &VariantCode,
        source: Option<&VariantCode>,
    ) -> LangConvResult<ConversionOutcome> {
        let start = Instant::now();
        let language = self.cache.for_page_language(ctx.page_language());
        debug!("Loaded language {} in {:?}", language.code(), start.elapsed());

        let Some(machine) = language.machine().filter(|m| m.implements(target)) else {
            info!("Unimplemented variant: {}", target);
            return Ok(ConversionOutcome::Unimplemented);
        };
        if let Some(source) = source.filter(|s| !machine.implements(s)) {
            return Err(LangConvError::InvalidSourceVariant {
                source_variant: source.to_string(),
                target: target.to_string(),
            });
        }
        self.stats.record(target);
        debug!(
            "Conversion #{}, #{} to {}",
            self.stats.total(),
            self.stats.count_for(target),
            target
        );

        let root = doc.body();
        let recorded = doc.data(root).converted_to.clone();
        if recorded.as_ref() == Some(target) {
            return Ok(ConversionOutcome::AlreadyConverted);
        }

        // Converted to another variant before: start again from the source
        // text, on a copy so a failure leaves the document as it was
        let mut restored = None;
        if let Some(previous) = recorded {
            debug!("Re-targeting document from {} to {}", previous, target);
            let mut working = doc.clone();
            restore_source(&mut working, root, machine)?;
            restored = Some(working);
        }

        // The authored text is already in the target
        if source == Some(target) {
            if let Some(working) = restored {
                *doc = working;
            }
            return Ok(ConversionOutcome::SourceIsTarget);
        }

        let working = match restored.as_mut() {
            Some(working) => working,
            None => &mut *doc,
        };

        let guess_start = Instant::now();
        let guesser: Box<dyn LanguageGuesser> = match source {
            Some(source) => Box::new(ConstantGuesser::new(source.clone())),
            None => Box::new(MachineGuesser::new(&language, working, root, target)),
        };
        debug!("Built source guesser in {:?}", guess_start.elapsed());

        let convert_start = Instant::now();
        let mut traverser = ConversionTraverser::new(machine, guesser.as_ref(), target.clone());
        let report = traverser.traverse(working, root)?;
        debug!("Converted to {} in {:?}", target, convert_start.elapsed());
        if let Some(working) = restored {
            *doc = working;
        }

        for wrapper in doc.query_selector_all(root, &VARIANT_WRAPPER) {
            if VariantPayload::from_element(doc, wrapper).is_some_and(|p| p.rt) {
                doc.set_is_new(wrapper, true);
            }
        }
        Ok(ConversionOutcome::Converted(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteConfig;
    use crate::html::{parse_document, to_html};
    use crate::language::LanguageRegistry;
    use crate::test_support::{code, sr_language, zh_hans_only_language, zh_language};

    fn zh_cache() -> LanguageCache {
        let mut registry = LanguageRegistry::new();
        registry
            .register("zh", |_| Ok(zh_language()))
            .register("sr", |_| Ok(sr_language()));
        LanguageCache::new(registry)
    }

    fn zh_context(cache: &LanguageCache) -> PageContext {
        let site = SiteConfig::from_languages([cache.get("zh").as_ref()]);
        PageContext::new(site, code("zh"))
    }

    #[test]
    fn test_disabled_site() {
        let cache = zh_cache();
        let mut ctx = zh_context(&cache);
        let mut site = ctx.site().clone();
        site.with_enabled(false);
        ctx = PageContext::new(site, code("zh"));
        let mut doc = parse_document("<body>繁體</body>").unwrap();
        let outcome = LanguageConverter::new(&cache)
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), None)
            .unwrap();
        assert_eq!(outcome, ConversionOutcome::Disabled);
        assert!(ctx.variant().is_none());
    }

    #[test]
    fn test_configuration_mismatches_are_no_ops() {
        let cache = zh_cache();
        let converter = LanguageConverter::new(&cache);
        let mut ctx = zh_context(&cache);
        let mut doc = parse_document("<body>繁體</body>").unwrap();

        let none = converter.maybe_convert(&mut ctx, &mut doc, None, None).unwrap();
        assert_eq!(none, ConversionOutcome::NoTarget);
        let unknown = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("sr-el")), None)
            .unwrap();
        assert_eq!(unknown, ConversionOutcome::NotAVariant);
        let garbage = converter
            .maybe_convert_codes(&mut ctx, &mut doc, Some("not a code"), None)
            .unwrap();
        assert_eq!(garbage, ConversionOutcome::NotAVariant);

        let mut site = ctx.site().clone();
        site.with_variant(
            code("zh"),
            crate::config::VariantInfo {
                base: code("zh"),
                fallbacks: vec![],
            },
        );
        let mut ctx = PageContext::new(site, code("zh"));
        let base = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh")), None)
            .unwrap();
        assert_eq!(base, ConversionOutcome::BaseTarget);
        assert!(ctx.variant().is_none());
        assert_eq!(doc.text_content(doc.root()), "繁體");
    }

    #[test]
    fn test_page_opt_out_still_records_variant() {
        let cache = zh_cache();
        let mut ctx = zh_context(&cache);
        let html = r#"<head><meta property="mw:PageProp/nocontentconvert"></head><body>繁體</body>"#;
        let mut doc = parse_document(html).unwrap();
        let outcome = LanguageConverter::new(&cache)
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), None)
            .unwrap();
        assert_eq!(outcome, ConversionOutcome::OptedOut);
        assert_eq!(ctx.variant(), Some(&code("zh-hans")));
        assert_eq!(to_html(&doc), html);
    }

    #[test]
    fn test_invalid_declared_source() {
        let cache = zh_cache();
        let mut ctx = zh_context(&cache);
        let mut doc = parse_document("<body>繁體</body>").unwrap();
        let converter = LanguageConverter::new(&cache);

        let result = converter.maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-tw")));
        match result {
            Err(LangConvError::InvalidSourceVariant {
                source_variant,
                target,
            }) => {
                assert_eq!(source_variant, "zh-tw");
                assert_eq!(target, "zh-hans");
            }
            other => panic!("Expected InvalidSourceVariant, got {:?}", other),
        }

        let result = converter.maybe_convert_codes(&mut ctx, &mut doc, Some("zh-hans"), Some("??"));
        assert!(matches!(result, Err(LangConvError::InvalidSourceVariant { .. })));
        assert_eq!(doc.text_content(doc.root()), "繁體");
    }

    #[test]
    fn test_declared_source_conversion() {
        let cache = zh_cache();
        let mut ctx = zh_context(&cache);
        let mut doc = parse_document("<body><p>頭髮</p></body>").unwrap();
        let outcome = LanguageConverter::new(&cache)
            .maybe_convert_codes(&mut ctx, &mut doc, Some("zh-Hans"), Some("zh-hant"))
            .unwrap();
        let ConversionOutcome::Converted(report) = outcome else {
            panic!("Expected conversion, got {:?}", outcome);
        };
        assert_eq!(report.wrappers, 1);
        assert_eq!(report.guessed, 1);
        assert_eq!(doc.text_content(doc.root()), "头发");
    }

    #[test]
    fn test_wrappers_marked_new_after_reparse() {
        let cache = zh_cache();
        let converter = LanguageConverter::new(&cache);
        let mut ctx = zh_context(&cache);
        let mut doc = parse_document("<body><p>頭髮</p></body>").unwrap();
        converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-hant")))
            .unwrap();

        // a stored copy loses the in-memory flag and its root marker
        let mut stored = parse_document(&to_html(&doc)).unwrap();
        let body = stored.body();
        stored.data_mut(body).converted_to = None;
        let outcome = converter
            .maybe_convert(&mut ctx, &mut stored, Some(&code("zh-hans")), None)
            .unwrap();
        assert!(outcome.is_converted());
        let wrapper = stored
            .query_selector(stored.root(), &VARIANT_WRAPPER)
            .unwrap();
        assert!(stored.is_new(wrapper));
    }

    #[test]
    fn test_retargeting_restores_first() {
        let cache = zh_cache();
        let converter = LanguageConverter::new(&cache);
        let mut ctx = zh_context(&cache);
        let original = "<body><p>頭髮</p></body>";
        let mut doc = parse_document(original).unwrap();
        converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-hant")))
            .unwrap();
        assert_eq!(doc.text_content(doc.root()), "头发");

        let again = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-hant")))
            .unwrap();
        assert_eq!(again, ConversionOutcome::AlreadyConverted);

        let outcome = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hant")), Some(&code("zh-hans")))
            .unwrap();
        assert!(outcome.is_converted());
        // back to the authored text, then converted from zh-hans
        assert_eq!(doc.text_content(doc.root()), "頭髮");
        assert_eq!(ctx.variant(), Some(&code("zh-hant")));
    }

    #[test]
    fn test_retargeting_to_declared_source_restores() {
        let cache = zh_cache();
        let converter = LanguageConverter::new(&cache);
        let mut ctx = zh_context(&cache);
        let original = "<body><p>頭髮漢語</p></body>";
        let mut doc = parse_document(original).unwrap();
        converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-hant")))
            .unwrap();
        assert_eq!(doc.text_content(doc.root()), "头发汉语");

        let outcome = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hant")), Some(&code("zh-hant")))
            .unwrap();
        assert_eq!(outcome, ConversionOutcome::SourceIsTarget);
        assert_eq!(ctx.variant(), Some(&code("zh-hant")));
        assert_eq!(doc.text_content(doc.root()), "頭髮漢語");
        assert_eq!(to_html(&doc), original);
    }

    #[test]
    fn test_stats_count_valid_requests() {
        let cache = zh_cache();
        let converter = LanguageConverter::new(&cache);
        let mut ctx = zh_context(&cache);
        let mut doc = parse_document("<body><p>繁體</p></body>").unwrap();
        let hans = code("zh-hans");

        converter.maybe_convert(&mut ctx, &mut doc, Some(&hans), None).unwrap();
        converter.maybe_convert(&mut ctx, &mut doc, Some(&hans), None).unwrap();
        // rejected before counting
        converter.maybe_convert(&mut ctx, &mut doc, None, None).unwrap();
        let _ = converter.maybe_convert(&mut ctx, &mut doc, Some(&hans), Some(&code("zh-tw")));

        assert_eq!(converter.stats().total(), 2);
        assert_eq!(converter.stats().count_for(&hans), 2);
        assert_eq!(converter.stats().count_for(&code("zh-hant")), 0);
    }

    #[test]
    fn test_implements_conversion() {
        let mut registry = LanguageRegistry::new();
        registry.register("zh", |_| Ok(zh_hans_only_language()));
        let cache = LanguageCache::new(registry);
        let converter = LanguageConverter::new(&cache);
        let ctx = PageContext::new(SiteConfig::new(), code("zh"));
        assert!(converter.implements_conversion(&ctx, &code("zh-hans")));
        assert!(!converter.implements_conversion(&ctx, &code("zh-hant")));

        let unknown = PageContext::new(SiteConfig::new(), code("en"));
        assert!(!converter.implements_conversion(&unknown, &code("en-gb")));
    }
}
