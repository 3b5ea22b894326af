//! End-to-end scenarios: markup in, converted markup out

use crate::config::{PageContext, SiteConfig};
use crate::converter::{ConversionOutcome, LanguageConverter};
use crate::dom::Selector;
use crate::html::{HtmlSerializer, parse_document, to_html};
use crate::language::{LanguageCache, LanguageRegistry};
use crate::restore::restore_source;
use crate::test_support::{code, sr_language, zh_hans_only_language, zh_language};
use std::path::Path;

fn cache() -> LanguageCache {
    let mut registry = LanguageRegistry::new();
    registry
        .register("zh", |_| Ok(zh_language()))
        .register("sr", |_| Ok(sr_language()));
    LanguageCache::new(registry)
}

fn context(cache: &LanguageCache, page_language: &str) -> PageContext {
    let site = SiteConfig::from_languages([cache.get("zh").as_ref(), cache.get("sr").as_ref()]);
    PageContext::new(site, code(page_language))
}

fn wrapper_count(html: &str) -> usize {
    let doc = parse_document(html).unwrap();
    let selector = Selector::parse(r#"span[typeof~="mw:LanguageVariant"]"#).unwrap();
    doc.query_selector_all(doc.root(), &selector).len()
}

#[test]
fn test_traditional_body_to_simplified_without_source() {
    let cache = cache();
    let mut ctx = context(&cache, "zh");
    let mut doc = parse_document("<body><p>繁體</p></body>").unwrap();
    let outcome = LanguageConverter::new(&cache)
        .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), None)
        .unwrap();

    let ConversionOutcome::Converted(report) = outcome else {
        panic!("Expected conversion, got {:?}", outcome);
    };
    assert_eq!(report.wrappers, 0);
    let p = doc.children(doc.body())[0];
    assert_eq!(doc.text_content(p), "繁体");
    assert_eq!(doc.data(p).source_variant, Some(code("zh-hant")));

    let mut plain = HtmlSerializer::new();
    plain.with_metadata(false);
    assert_eq!(plain.serialize(&doc), "<body><p>繁体</p></body>");
}

#[test]
fn test_text_already_in_target_gets_no_wrappers() {
    let cache = cache();
    let mut ctx = context(&cache, "zh");
    let html = "<body><p>头发和说话</p></body>";
    let mut doc = parse_document(html).unwrap();
    let outcome = LanguageConverter::new(&cache)
        .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), None)
        .unwrap();

    let ConversionOutcome::Converted(report) = outcome else {
        panic!("Expected conversion, got {:?}", outcome);
    };
    assert_eq!(report.wrappers, 0);
    assert_eq!(report.converted, 0);
    assert_eq!(wrapper_count(&to_html(&doc)), 0);
    let mut plain = HtmlSerializer::new();
    plain.with_metadata(false);
    assert_eq!(plain.serialize(&doc), html);
}

#[test]
fn test_declared_source_equal_to_target_is_a_no_op() {
    let cache = cache();
    let mut ctx = context(&cache, "zh");
    let html = "<body><p>繁體</p></body>";
    let mut doc = parse_document(html).unwrap();
    let outcome = LanguageConverter::new(&cache)
        .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), Some(&code("zh-hans")))
        .unwrap();
    assert_eq!(outcome, ConversionOutcome::SourceIsTarget);
    assert_eq!(to_html(&doc), html);
}

#[test]
fn test_missing_table_is_a_silent_no_op() {
    let mut registry = LanguageRegistry::new();
    registry.register("zh", |_| Ok(zh_hans_only_language()));
    let cache = LanguageCache::new(registry);
    let converter = LanguageConverter::new(&cache);
    let mut ctx = PageContext::new(SiteConfig::from_languages([cache.get("zh").as_ref()]), code("zh"));

    assert!(!converter.implements_conversion(&ctx, &code("zh-hant")));
    let html = "<body><p>简体</p></body>";
    let mut doc = parse_document(html).unwrap();
    let outcome = converter
        .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hant")), None)
        .unwrap();
    assert_eq!(outcome, ConversionOutcome::Unimplemented);
    assert_eq!(to_html(&doc), html);
}

#[test]
fn test_round_trip_through_stored_markup() {
    let cache = cache();
    let converter = LanguageConverter::new(&cache);
    let pages = [
        ("zh", "zh-hans", "<body>\n<h1>漢語</h1>\n<p>這個頭髮<b>說話</b>, 身体 <code>體</code></p>\n</body>"),
        ("zh", "zh-hant", "<body><p>头发和说话</p><pre>体</pre></body>"),
        ("sr", "sr-el", "<body><p>Конјункција и коњ.</p><p data-noconvert>ћ</p></body>"),
    ];
    for (language, target, html) in pages {
        let mut ctx = context(&cache, language);
        let mut doc = parse_document(html).unwrap();
        let outcome = converter
            .maybe_convert(&mut ctx, &mut doc, Some(&code(target)), None)
            .unwrap();
        assert!(outcome.is_converted(), "{} -> {}: {:?}", html, target, outcome);

        let stored = to_html(&doc);
        let mut reloaded = parse_document(&stored).unwrap();
        let root = reloaded.body();
        let language = cache.get(language);
        restore_source(&mut reloaded, root, language.machine().unwrap()).unwrap();
        assert_eq!(to_html(&reloaded), html);
    }
}

#[test]
fn test_conversion_is_idempotent() {
    let cache = cache();
    let converter = LanguageConverter::new(&cache);
    let mut ctx = context(&cache, "zh");
    let mut doc = parse_document("<body><p>頭髮, 身体</p></body>").unwrap();
    let target = code("zh-hans");
    converter
        .maybe_convert(&mut ctx, &mut doc, Some(&target), Some(&code("zh-hant")))
        .unwrap();
    let first = to_html(&doc);
    assert_eq!(wrapper_count(&first), 2);

    let again = converter
        .maybe_convert(&mut ctx, &mut doc, Some(&target), None)
        .unwrap();
    assert_eq!(again, ConversionOutcome::AlreadyConverted);
    assert_eq!(to_html(&doc), first);

    // a stored copy converts to the same markup without new wrappers
    let mut stored = parse_document(&first).unwrap();
    converter
        .maybe_convert(&mut ctx, &mut stored, Some(&target), None)
        .unwrap();
    assert_eq!(to_html(&stored), first);
}

#[test]
fn test_bcp47_codes_at_the_boundary() {
    let cache = cache();
    let converter = LanguageConverter::new(&cache);
    let mut ctx = context(&cache, "sr");
    let mut doc = parse_document("<body><p>коњ</p></body>").unwrap();
    let outcome = converter
        .maybe_convert_codes(&mut ctx, &mut doc, Some("sr-Latn"), Some("sr-Cyrl"))
        .unwrap();
    assert!(outcome.is_converted());
    assert_eq!(doc.text_content(doc.body()), "konj");
    assert_eq!(ctx.variant().map(|v| v.mw_code()), Some("sr-el"));
}

#[test]
fn test_fragment_without_body() {
    let cache = cache();
    let mut ctx = context(&cache, "zh");
    let mut doc = parse_document("<p>漢語</p>").unwrap();
    LanguageConverter::new(&cache)
        .maybe_convert(&mut ctx, &mut doc, Some(&code("zh-hans")), None)
        .unwrap();
    assert_eq!(doc.text_content(doc.root()), "汉语");
}

#[test]
fn test_shipped_language_data() {
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("../data");
    let cache = LanguageCache::new(LanguageRegistry::from_data_dir(&data).unwrap());
    let zh = cache.get("zh");
    let sr = cache.get("sr");
    assert!(zh.implements(&code("zh-hans")) && zh.implements(&code("zh-hant")));
    assert!(sr.implements(&code("sr-ec")) && sr.implements(&code("sr-el")));

    let converter = LanguageConverter::new(&cache);
    let mut ctx = PageContext::new(SiteConfig::from_languages([zh.as_ref(), sr.as_ref()]), code("sr"));
    let mut doc = parse_document("<body><p>Љубав и њива</p></body>").unwrap();
    converter
        .maybe_convert(&mut ctx, &mut doc, Some(&code("sr-el")), Some(&code("sr-ec")))
        .unwrap();
    assert_eq!(doc.text_content(doc.body()), "Ljubav i njiva");
}
