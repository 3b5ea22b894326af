//! Languages, the factory registry and the language cache
//!
//! A [`Language`] knows its declared variants, their fallbacks and (when any
//! tables exist for it) its [`ReplacementMachine`]. Languages are built by
//! factory functions registered per language code in a [`LanguageRegistry`],
//! and memoized by a [`LanguageCache`] that the caller owns and shares.

use crate::error::LangConvResult;
use crate::loader::{self, LanguageData};
use crate::machine::ReplacementMachine;
use crate::variant::VariantCode;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Language {
    code: String,
    base: Option<VariantCode>,
    variants: Vec<VariantCode>,
    fallbacks: HashMap<VariantCode, Vec<VariantCode>>,
    machine: Option<Arc<ReplacementMachine>>,
}

impl Language {
    /// A language with no variants and no conversion tables
    pub fn new(code: &str) -> Self {
        Language {
            code: code.to_string(),
            base: VariantCode::from_mw_code(code).ok(),
            variants: Vec::new(),
            fallbacks: HashMap::new(),
            machine: None,
        }
    }

    pub fn with_base(&mut self, base: VariantCode) -> &mut Self {
        self.base = Some(base);
        self
    }

    pub fn with_variants(&mut self, variants: Vec<VariantCode>) -> &mut Self {
        self.variants = variants;
        self
    }

    pub fn with_fallbacks(&mut self, variant: VariantCode, fallbacks: Vec<VariantCode>) -> &mut Self {
        self.fallbacks.insert(variant, fallbacks);
        self
    }

    pub fn with_machine(&mut self, machine: ReplacementMachine) -> &mut Self {
        self.machine = Some(Arc::new(machine));
        self
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// The language's own code as a variant, e.g. `zh` for the zh family
    pub fn base(&self) -> Option<&VariantCode> {
        self.base.as_ref()
    }

    /// Declared variants, in declaration order
    pub fn variants(&self) -> &[VariantCode] {
        &self.variants
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Ordered fallbacks of a variant; empty when none are declared
    pub fn fallbacks_for(&self, variant: &VariantCode) -> &[VariantCode] {
        self.fallbacks.get(variant).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn machine(&self) -> Option<&ReplacementMachine> {
        self.machine.as_deref()
    }

    /// Whether the machine can convert into `variant`
    pub fn implements(&self, variant: &VariantCode) -> bool {
        self.machine().is_some_and(|m| m.implements(variant))
    }
}

/// Builds a [`Language`] for the code it was registered under
pub type LanguageFactory = Arc<dyn Fn(&str) -> LangConvResult<Language> + Send + Sync>;

/// Static map from language code to factory, populated at start-up.
#[derive(Clone, Default)]
pub struct LanguageRegistry {
    factories: HashMap<String, LanguageFactory>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        LanguageRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, code: &str, factory: F) -> &mut Self
    where
        F: Fn(&str) -> LangConvResult<Language> + Send + Sync + 'static,
    {
        self.factories
            .insert(code.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// Register already-parsed language data under its own code
    pub fn register_data(&mut self, data: LanguageData) -> &mut Self {
        let code = data.code.clone();
        self.register(&code, move |_| data.clone().into_language())
    }

    /// Register one lazily-loading factory per `*.json` file in `dir`.
    ///
    /// The file stem is the language code (`zh.json` -> `zh`). Files are only
    /// read when the language is first requested.
    pub fn from_data_dir(dir: &Path) -> LangConvResult<Self> {
        let mut registry = LanguageRegistry::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(code) = path.file_stem().and_then(|stem| stem.to_str()) else {
                warn!("Skipping language data with invalid name: {}", path.display());
                continue;
            };
            let code = code.to_string();
            debug!("Registered language {} from {}", code, path.display());
            registry.register(&code, move |_| loader::load_language_from_file(&path));
        }
        if registry.factories.is_empty() {
            warn!("No language data files found in {}", dir.display());
        }
        Ok(registry)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.factories.contains_key(&code.to_ascii_lowercase())
    }

    /// Registered codes, sorted
    pub fn codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        codes.sort_unstable();
        codes
    }

    /// Build the language for `code`.
    ///
    /// Unknown codes, and factories that fail, give a plain [`Language`]
    /// without variants, so callers always get something to ask questions of.
    pub fn create(&self, code: &str) -> Language {
        let key = code.to_ascii_lowercase();
        match self.factories.get(&key) {
            Some(factory) => match factory(&key) {
                Ok(language) => language,
                Err(e) => {
                    info!("Couldn't load language: {} ({})", key, e);
                    Language::new(&key)
                }
            },
            None => {
                debug!("No language registered for {}, using default", key);
                Language::new(&key)
            }
        }
    }
}

/// Memoized languages, keyed by language code.
///
/// Owned by the caller and safe to share between threads. Two threads
/// racing on the same code may both build it; the first insert wins.
pub struct LanguageCache {
    registry: LanguageRegistry,
    languages: RwLock<HashMap<String, Arc<Language>>>,
}

impl LanguageCache {
    pub fn new(registry: LanguageRegistry) -> Self {
        LanguageCache {
            registry,
            languages: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn get(&self, code: &str) -> Arc<Language> {
        let key = code.to_ascii_lowercase();
        {
            let languages = self.languages.read().unwrap_or_else(|e| e.into_inner());
            if let Some(language) = languages.get(&key) {
                return Arc::clone(language);
            }
        }

        // Build outside the lock; loading tables can be slow
        let built = Arc::new(self.registry.create(&key));
        let mut languages = self.languages.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(languages.entry(key).or_insert(built))
    }

    /// The language for a page language code: the full code when it is
    /// registered (`zh-classical`), otherwise its primary subtag (`zh`).
    pub fn for_page_language(&self, page_language: &VariantCode) -> Arc<Language> {
        if self.registry.contains(page_language.mw_code()) {
            self.get(page_language.mw_code())
        } else {
            self.get(page_language.language())
        }
    }

    /// Number of languages built so far
    pub fn len(&self) -> usize {
        self.languages.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
