use crate::error::{LangConvError, LangConvResult};
use crate::language::Language;
use crate::machine::ReplacementMachine;
use crate::table::ReplacementTable;
use crate::variant::VariantCode;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Language data as stored on disk
///
/// ```json
/// {
///     "code": "zh",
///     "variants": ["zh-hans", "zh-hant"],
///     "fallbacks": { "zh-hans": ["zh-cn", "zh-sg"] },
///     "tables": {
///         "zh-hans": { "entries": { "體": "体" }, "lossy": [] },
///         "zh-hant": { "invert": "zh-hans" }
///     }
/// }
/// ```
///
/// A table with `invert` is derived from another variant's table, keeping
/// only the entries whose reverse is unambiguous. Its own `entries`, if any,
/// are applied on top.
#[derive(Debug, Clone, Deserialize)]
pub struct LanguageData {
    pub code: String,
    #[serde(default)]
    pub base: Option<VariantCode>,
    #[serde(default)]
    pub variants: Vec<VariantCode>,
    #[serde(default)]
    pub fallbacks: BTreeMap<VariantCode, Vec<VariantCode>>,
    #[serde(default)]
    pub tables: BTreeMap<VariantCode, TableData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    /// Keys of `entries` that are irreversible
    #[serde(default)]
    pub lossy: Vec<String>,
    #[serde(default)]
    pub invert: Option<VariantCode>,
}

impl LanguageData {
    /// Build the language and its replacement machine
    ///
    /// # Errors
    /// - A variant, fallback key or table belongs to another language
    /// - A table is declared for a variant outside `variants`
    /// - `invert` names a variant without explicit entries
    pub fn into_language(self) -> LangConvResult<Language> {
        let origin = self.code.clone();
        let data_error = |message: String| LangConvError::DataLoad {
            origin: origin.clone(),
            message,
        };

        let base = match self.base {
            Some(base) => base,
            None => VariantCode::from_mw_code(&self.code)?,
        };
        for variant in self.variants.iter().chain(self.fallbacks.keys()) {
            if variant.language() != base.language() {
                return Err(data_error(format!(
                    "variant {} does not belong to language {}",
                    variant, base
                )));
            }
        }
        if let Some(undeclared) = self.tables.keys().find(|v| !self.variants.contains(v)) {
            return Err(data_error(format!(
                "table for undeclared variant {}",
                undeclared
            )));
        }

        // Explicit tables first, so inverted ones can refer to them
        let mut built: HashMap<VariantCode, ReplacementTable> = HashMap::new();
        for (variant, data) in self.tables.iter().filter(|(_, d)| d.invert.is_none()) {
            let mut table = ReplacementTable::from_pairs(variant.clone(), &data.entries);
            apply_lossy_flags(&mut table, &data.lossy);
            built.insert(variant.clone(), table);
        }
        for (variant, data) in self.tables.iter() {
            let Some(from) = &data.invert else {
                continue;
            };
            let source_table = self
                .tables
                .get(from)
                .filter(|d| d.invert.is_none())
                .and_then(|_| built.get(from))
                .ok_or_else(|| {
                    data_error(format!(
                        "table {} inverts {}, which has no explicit entries",
                        variant, from
                    ))
                })?;
            let mut table = source_table.inverted(variant.clone());
            for (key, value) in &data.entries {
                table.insert(key, value);
            }
            apply_lossy_flags(&mut table, &data.lossy);
            built.insert(variant.clone(), table);
        }

        let mut language = Language::new(&self.code);
        language.with_base(base).with_variants(self.variants.clone());
        for (variant, fallbacks) in self.fallbacks {
            language.with_fallbacks(variant, fallbacks);
        }

        if !built.is_empty() {
            let mut machine = ReplacementMachine::new(&self.code);
            // Declaration order decides the order of machine codes
            for variant in &self.variants {
                if let Some(table) = built.remove(variant) {
                    machine.with_table(table);
                }
            }
            language.with_machine(machine);
        }
        Ok(language)
    }
}

fn apply_lossy_flags(table: &mut ReplacementTable, keys: &[String]) {
    for key in keys {
        if !table.mark_lossy(key) {
            warn!(
                "Lossy flag for unknown key '{}' in table {}",
                key,
                table.variant()
            );
        }
    }
}

/// Parse language data from a JSON string
///
/// `origin` names the source in error messages.
pub fn load_language_data_from_str(json: &str, origin: &str) -> LangConvResult<LanguageData> {
    serde_json::from_str(json).map_err(|e| LangConvError::DataLoad {
        origin: origin.to_string(),
        message: e.to_string(),
    })
}

/// Parse language data from a JSON string and build the language
pub fn load_language_from_str(json: &str, origin: &str) -> LangConvResult<Language> {
    load_language_data_from_str(json, origin)?.into_language()
}

/// Load a language from a single JSON file
///
/// # Errors
/// - File not found or unreadable
/// - Invalid JSON, or data that violates the rules of [`LanguageData::into_language`]
pub fn load_language_from_file(path: &Path) -> LangConvResult<Language> {
    let content = fs::read_to_string(path).map_err(|e| LangConvError::DataLoad {
        origin: path.display().to_string(),
        message: e.to_string(),
    })?;
    load_language_from_str(&content, &path.display().to_string())
}

/// Load all language data files from a directory
///
/// Scans the directory for `*.json` files. The filename (without extension)
/// is used as the key, e.g. `zh.json` -> `"zh"`.
pub fn load_all_languages_from_dir(dir: &Path) -> LangConvResult<HashMap<String, LanguageData>> {
    if !dir.is_dir() {
        return Err(LangConvError::DataLoad {
            origin: dir.display().to_string(),
            message: "not a directory".to_string(),
        });
    }

    let mut all = HashMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(code) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let code = code.to_string();
        let content = fs::read_to_string(&path)?;
        all.insert(
            code,
            load_language_data_from_str(&content, &path.display().to_string())?,
        );
    }

    if all.is_empty() {
        warn!("No language data files found in {}", dir.display());
    }
    Ok(all)
}
