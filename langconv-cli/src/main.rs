use clap::{Arg, ArgAction, Command};
use langconv::html::{self, HtmlSerializer};
use langconv::{
    ConversionOutcome, LanguageCache, LanguageConverter, LanguageRegistry, PageContext,
    SiteConfig, VariantCode, restore_source,
};
use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn read_input(input: &str) -> io::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        fs::read_to_string(input)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("langconv")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Convert the text of an HTML document between language variants")
        .arg(
            Arg::new("input")
                .help("HTML file to convert, or - for stdin")
                .required_unless_present("check")
                .index(1),
        )
        .arg(
            Arg::new("target")
                .long("target")
                .short('t')
                .help("Target variant (e.g. zh-hans, sr-el, zh-Hant)")
                .required_unless_present("restore"),
        )
        .arg(
            Arg::new("source")
                .long("source")
                .short('s')
                .help("Variant the document was written in (default: guessed per element)"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .short('d')
                .help("Directory with language data files")
                .default_value("data"),
        )
        .arg(
            Arg::new("site")
                .long("site")
                .help("Site configuration JSON (default: derived from the language data)"),
        )
        .arg(
            Arg::new("page-language")
                .long("page-language")
                .short('l')
                .help("Page language (default: the language of the target)"),
        )
        .arg(
            Arg::new("restore")
                .long("restore")
                .help("Restore the authored text of a converted document")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .help("Only report whether conversion to the target is implemented")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("plain")
                .long("plain")
                .help("Write plain HTML without round-trip wrappers and metadata")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log conversion decisions to stderr")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(io::stderr)
        .init();

    let target = matches
        .get_one::<String>("target")
        .map(|t| VariantCode::from_mw_code(t))
        .transpose()?;
    let page_language = match (matches.get_one::<String>("page-language"), &target) {
        (Some(code), _) => VariantCode::from_mw_code(code)?,
        (None, Some(target)) => VariantCode::from_mw_code(target.language())?,
        (None, None) => return Err("--page-language is required with --restore".into()),
    };

    let data_dir = matches.get_one::<String>("data").map(String::as_str).unwrap_or("data");
    let registry = LanguageRegistry::from_data_dir(Path::new(data_dir))?;
    debug!("Languages available: {:?}", registry.codes());
    let cache = LanguageCache::new(registry);
    let converter = LanguageConverter::new(&cache);

    let site = match matches.get_one::<String>("site") {
        Some(path) => SiteConfig::from_file(Path::new(path))?,
        None => SiteConfig::from_languages([cache.for_page_language(&page_language).as_ref()]),
    };
    let mut ctx = PageContext::new(site, page_language.clone());

    if matches.get_flag("check") {
        let target = target.ok_or("--check needs --target")?;
        let implemented = converter.implements_conversion(&ctx, &target);
        let report = serde_json::json!({
            "page_language": page_language.mw_code(),
            "target": target.mw_code(),
            "implemented": implemented,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        if !implemented {
            std::process::exit(1);
        }
        return Ok(());
    }

    let input = matches
        .get_one::<String>("input")
        .map(String::as_str)
        .unwrap_or("-");
    let mut doc = html::parse_document(&read_input(input)?)?;

    if matches.get_flag("restore") {
        let language = cache.for_page_language(&page_language);
        let machine = language
            .machine()
            .ok_or_else(|| format!("No conversion tables for {}", language.code()))?;
        let root = doc.body();
        let restored = restore_source(&mut doc, root, machine)?;
        info!("Restored {} nodes", restored);
    } else {
        let target = matches.get_one::<String>("target").map(String::as_str);
        let source = matches.get_one::<String>("source").map(String::as_str);
        let outcome = converter.maybe_convert_codes(&mut ctx, &mut doc, target, source)?;
        match &outcome {
            ConversionOutcome::Converted(report) => info!(
                "Converted {} text nodes, {} wrappers, {} skipped subtrees",
                report.converted, report.wrappers, report.skipped
            ),
            other => info!("Document left unchanged: {:?}", other),
        }
    }

    let mut serializer = HtmlSerializer::new();
    if matches.get_flag("plain") {
        serializer.with_wrappers(false).with_metadata(false);
    }
    print!("{}", serializer.serialize(&doc));
    Ok(())
}
