//! Variant codes
//!
//! Variants are named two ways in the wild: MediaWiki-internal codes such as
//! `zh-hans` or `sr-ec`, and BCP 47 tags such as `zh-Hans` or `sr-Cyrl`.
//! [`VariantCode`] accepts either spelling once, at the boundary, and carries
//! both from then on. Equality, ordering and hashing use the canonical BCP 47
//! form, so `zh-hans` and `zh-Hans` are the same variant.

use crate::error::{LangConvError, LangConvResult};
use icu_locale::Locale;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// MediaWiki codes whose BCP 47 form does not follow the casing rules
const SPECIAL_CODES: &[(&str, &str)] = &[
    ("als", "gsw"),
    ("bat-smg", "sgs"),
    ("be-x-old", "be-tarask"),
    ("fiu-vro", "vro"),
    ("roa-rup", "rup"),
    ("zh-classical", "lzh"),
    ("zh-min-nan", "nan"),
    ("zh-yue", "yue"),
    ("sr-ec", "sr-Cyrl"),
    ("sr-el", "sr-Latn"),
    ("kk-cn", "kk-Arab-CN"),
    ("kk-kz", "kk-Cyrl-KZ"),
    ("kk-tr", "kk-Latn-TR"),
    ("simple", "en-simple"),
];

/// Convert a MediaWiki-internal language code to a BCP 47 tag.
///
/// ```
/// use langconv::variant::mw_code_to_bcp47;
/// assert_eq!(mw_code_to_bcp47("zh-hans"), "zh-Hans");
/// assert_eq!(mw_code_to_bcp47("sr-ec"), "sr-Cyrl");
/// assert_eq!(mw_code_to_bcp47("en-x-piglatin"), "en-x-piglatin");
/// ```
pub fn mw_code_to_bcp47(code: &str) -> String {
    let lower = code.trim().to_ascii_lowercase();
    if let Some((_, tag)) = SPECIAL_CODES.iter().find(|(mw, _)| *mw == lower) {
        return (*tag).to_string();
    }

    let mut subtags = Vec::new();
    // Everything after a singleton (x-..., u-...) keeps lower case
    let mut after_singleton = false;
    for (i, subtag) in lower.split('-').enumerate() {
        if i == 0 || after_singleton {
            subtags.push(subtag.to_string());
        } else if subtag.len() == 1 {
            after_singleton = true;
            subtags.push(subtag.to_string());
        } else if subtag.len() == 2 {
            subtags.push(subtag.to_ascii_uppercase());
        } else if subtag.len() == 4 && subtag.chars().all(|c| c.is_ascii_alphabetic()) {
            let mut chars = subtag.chars();
            let titled: String = chars
                .next()
                .map(|first| first.to_ascii_uppercase())
                .into_iter()
                .chain(chars)
                .collect();
            subtags.push(titled);
        } else {
            subtags.push(subtag.to_string());
        }
    }
    subtags.join("-")
}

/// Convert a BCP 47 tag back to the MediaWiki-internal code.
pub fn bcp47_to_mw_code(tag: &str) -> String {
    let tag = tag.trim();
    if let Some((mw, _)) = SPECIAL_CODES
        .iter()
        .find(|(_, bcp47)| bcp47.eq_ignore_ascii_case(tag))
    {
        return (*mw).to_string();
    }
    tag.to_ascii_lowercase()
}

/// A structured identifier for one orthographic variant of a language.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariantCode {
    mw: String,
    bcp47: String,
    language: String,
}

impl VariantCode {
    /// Parse a MediaWiki-internal code such as `zh-hans` or `sr-ec`.
    ///
    /// BCP 47 spellings are accepted too, since the casing rules are
    /// reversible; the stored MediaWiki code is always the canonical one
    /// (`sr-Cyrl` becomes `sr-ec`).
    pub fn from_mw_code(code: &str) -> LangConvResult<Self> {
        Self::build(code, &mw_code_to_bcp47(code))
    }

    /// Parse a BCP 47 tag such as `zh-Hans` or `sr-Latn`.
    pub fn from_bcp47(tag: &str) -> LangConvResult<Self> {
        Self::build(tag, tag)
    }

    fn build(input: &str, candidate: &str) -> LangConvResult<Self> {
        if candidate.is_empty() {
            return Err(LangConvError::InvalidVariantCode {
                code: input.to_string(),
                reason: "empty code".to_string(),
            });
        }
        let locale = candidate
            .parse::<Locale>()
            .map_err(|e| LangConvError::InvalidVariantCode {
                code: input.to_string(),
                reason: e.to_string(),
            })?;
        let bcp47 = locale.to_string();
        Ok(VariantCode {
            mw: bcp47_to_mw_code(&bcp47),
            language: locale.id.language.as_str().to_string(),
            bcp47,
        })
    }

    /// The MediaWiki-internal spelling, e.g. `zh-hans`
    pub fn mw_code(&self) -> &str {
        &self.mw
    }

    /// The canonical BCP 47 spelling, e.g. `zh-Hans`
    pub fn bcp47(&self) -> &str {
        &self.bcp47
    }

    /// The primary language subtag, e.g. `zh`
    pub fn language(&self) -> &str {
        &self.language
    }

    /// True when the code names a bare language rather than a variant of it
    pub fn is_bare_language(&self) -> bool {
        self.bcp47 == self.language
    }
}

impl PartialEq for VariantCode {
    fn eq(&self, other: &Self) -> bool {
        self.bcp47 == other.bcp47
    }
}

impl Eq for VariantCode {}

impl Hash for VariantCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bcp47.hash(state);
    }
}

impl PartialOrd for VariantCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VariantCode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bcp47.cmp(&other.bcp47)
    }
}

impl fmt::Display for VariantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mw)
    }
}

impl fmt::Debug for VariantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VariantCode({})", self.mw)
    }
}

impl FromStr for VariantCode {
    type Err = crate::error::LangConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantCode::from_mw_code(s)
    }
}

impl TryFrom<String> for VariantCode {
    type Error = crate::error::LangConvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        VariantCode::from_mw_code(&value)
    }
}

impl From<VariantCode> for String {
    fn from(code: VariantCode) -> Self {
        code.mw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mw_to_bcp47_casing() {
        assert_eq!(mw_code_to_bcp47("zh-hans"), "zh-Hans");
        assert_eq!(mw_code_to_bcp47("zh-tw"), "zh-TW");
        assert_eq!(mw_code_to_bcp47("zh-hant-hk"), "zh-Hant-HK");
        assert_eq!(mw_code_to_bcp47("en"), "en");
        assert_eq!(mw_code_to_bcp47("en-x-piglatin"), "en-x-piglatin");
    }

    #[test]
    fn test_special_codes() {
        assert_eq!(mw_code_to_bcp47("sr-ec"), "sr-Cyrl");
        assert_eq!(mw_code_to_bcp47("sr-el"), "sr-Latn");
        assert_eq!(mw_code_to_bcp47("zh-classical"), "lzh");
        assert_eq!(bcp47_to_mw_code("sr-Latn"), "sr-el");
        assert_eq!(bcp47_to_mw_code("kk-arab-cn"), "kk-cn");
        assert_eq!(bcp47_to_mw_code("zh-Hant"), "zh-hant");
    }

    #[test]
    fn test_spellings_are_equal() {
        let mw = VariantCode::from_mw_code("zh-hans").unwrap();
        let bcp = VariantCode::from_bcp47("zh-Hans").unwrap();
        assert_eq!(mw, bcp);
        assert_eq!(bcp.mw_code(), "zh-hans");
        assert_eq!(mw.bcp47(), "zh-Hans");
        assert_eq!(mw.language(), "zh");
    }

    #[test]
    fn test_canonical_mw_code() {
        let code: VariantCode = "sr-Cyrl".parse().unwrap();
        assert_eq!(code.mw_code(), "sr-ec");
        assert_eq!(code.to_string(), "sr-ec");
        assert_eq!(code.language(), "sr");
    }

    #[test]
    fn test_bare_language() {
        assert!(VariantCode::from_mw_code("zh").unwrap().is_bare_language());
        assert!(!VariantCode::from_mw_code("zh-hant").unwrap().is_bare_language());
    }

    #[test]
    fn test_invalid_codes() {
        assert!(VariantCode::from_mw_code("").is_err());
        assert!(VariantCode::from_mw_code("not a code").is_err());
        assert!(matches!(
            VariantCode::from_bcp47("zh_Hans!"),
            Err(LangConvError::InvalidVariantCode { .. })
        ));
    }

    #[test]
    fn test_serde_uses_mw_code() {
        let code = VariantCode::from_bcp47("sr-Latn").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"sr-el\"");
        let parsed: VariantCode = serde_json::from_str("\"zh-hant\"").unwrap();
        assert_eq!(parsed.bcp47(), "zh-Hant");
        assert!(serde_json::from_str::<VariantCode>("\"??\"").is_err());
    }
}
