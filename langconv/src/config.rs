use crate::error::{LangConvError, LangConvResult};
use crate::language::Language;
use crate::variant::VariantCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// What the site knows about one variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantInfo {
    /// The language the variant belongs to, e.g. `zh` for `zh-hans`
    pub base: VariantCode,
    #[serde(default)]
    pub fallbacks: Vec<VariantCode>,
}

/// Site-wide language conversion settings
///
/// ```json
/// {
///     "langconv_enabled": true,
///     "variants": {
///         "zh-hans": { "base": "zh", "fallbacks": ["zh-cn", "zh-sg"] },
///         "zh-hant": { "base": "zh", "fallbacks": ["zh-tw", "zh-hk"] }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "enabled_by_default")]
    pub langconv_enabled: bool,
    #[serde(default)]
    pub variants: HashMap<VariantCode, VariantInfo>,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig::new()
    }
}

impl SiteConfig {
    /// Enabled, with no known variants
    pub fn new() -> Self {
        SiteConfig {
            langconv_enabled: true,
            variants: HashMap::new(),
        }
    }

    pub fn with_enabled(&mut self, enabled: bool) -> &mut Self {
        self.langconv_enabled = enabled;
        self
    }

    pub fn with_variant(&mut self, variant: VariantCode, info: VariantInfo) -> &mut Self {
        self.variants.insert(variant, info);
        self
    }

    /// Every declared variant of the given languages, with its base and fallbacks
    pub fn from_languages<'a, I>(languages: I) -> Self
    where
        I: IntoIterator<Item = &'a Language>,
    {
        let mut config = SiteConfig::new();
        for language in languages {
            let Some(base) = language.base() else {
                continue;
            };
            for variant in language.variants() {
                config.with_variant(
                    variant.clone(),
                    VariantInfo {
                        base: base.clone(),
                        fallbacks: language.fallbacks_for(variant).to_vec(),
                    },
                );
            }
        }
        config
    }

    pub fn from_json_str(json: &str) -> LangConvResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> LangConvResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| LangConvError::DataLoad {
            origin: path.display().to_string(),
            message: e.to_string(),
        })?;
        SiteConfig::from_json_str(&content)
    }

    /// Base and fallbacks of `variant`; `None` when it is not a known variant
    pub fn variants_for(&self, variant: &VariantCode) -> Option<&VariantInfo> {
        self.variants.get(variant)
    }
}

/// Per-page state handed to the converter
#[derive(Debug, Clone)]
pub struct PageContext {
    site: SiteConfig,
    page_language: VariantCode,
    variant: Option<VariantCode>,
}

impl PageContext {
    pub fn new(site: SiteConfig, page_language: VariantCode) -> Self {
        PageContext {
            site,
            page_language,
            variant: None,
        }
    }

    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    pub fn page_language(&self) -> &VariantCode {
        &self.page_language
    }

    pub fn langconv_enabled(&self) -> bool {
        self.site.langconv_enabled
    }

    /// The variant the page was last converted to
    pub fn variant(&self) -> Option<&VariantCode> {
        self.variant.as_ref()
    }

    pub fn set_variant(&mut self, variant: VariantCode) {
        self.variant = Some(variant);
    }
}
