// 🔤 Label Resolution - German taxonomy labels → English
//
// Resolution order (first hit wins):
//   1. cache, whole phrase
//   2. built-in fallback table, whole phrase
//   3. token by token: cache → fallback → unchanged
//
// Never fails. Both tables are read-only for the lifetime of a run.

use super::CategoryTree;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

// ============================================================================
// FALLBACK TABLE
// ============================================================================

/// Common building-material terms. Replaceable content, stable keys.
const FALLBACK_TABLE: &[(&str, &str)] = &[
    // Main categories
    ("Mineralische Baustoffe", "Mineral Building Materials"),
    ("Dämmstoffe", "Insulation Materials"),
    ("Holz", "Wood"),
    ("Metalle", "Metals"),
    ("Beschichtungen", "Coatings"),
    ("Kunststoffe", "Plastics"),
    ("Komponenten von Fenstern und Vorhangfassaden", "Components of Windows and Curtain Facades"),
    ("Gebäudetechnik", "Building Services"),
    ("Sonstige", "Other"),
    ("Komposite", "Composites"),
    ("End of Life", "End of Life"),
    // Binders
    ("Bindemittel", "Binders"),
    ("Zement", "Cement"),
    ("Kalk", "Lime"),
    ("Gips", "Gypsum"),
    ("Lehm", "Clay"),
    // Aggregates
    ("Zuschläge", "Aggregates"),
    ("Sand und Kies", "Sand and Gravel"),
    ("Naturstein", "Natural Stone"),
    // Stones and elements
    ("Steine und Elemente", "Bricks and Elements"),
    ("Kalksandstein", "Calcium Silicate Brick"),
    ("Ziegel", "Brick"),
    ("Porenbeton", "Aerated Concrete"),
    ("Leichtbeton", "Lightweight Concrete"),
    ("Betonfertigteile und Betonwaren", "Precast Concrete Elements"),
    ("Gipsplatten", "Gypsum Board"),
    ("Fliesen und Platten", "Tiles and Slabs"),
    // Mortar and concrete
    ("Mörtel und Beton", "Mortar and Concrete"),
    ("Beton", "Concrete"),
    ("Mauermörtel", "Masonry Mortar"),
    ("Estrich trocken", "Dry Screed"),
    // Insulation
    ("Mineralwolle", "Mineral Wool"),
    ("Glaswolle", "Glass Wool"),
    ("Steinwolle", "Stone Wool"),
    ("Holzfaserdämmplatte", "Wood Fiber Insulation Board"),
    // Wood
    ("Vollholz", "Solid Wood"),
    ("Holzwerkstoffe", "Wood-Based Materials"),
    // Metals
    ("Stahl", "Steel"),
    ("Stahlprofile", "Steel Profiles"),
    ("Aluminium", "Aluminum"),
    // Common terms
    ("Platten", "Boards"),
    ("und", "and"),
    ("mit", "with"),
    ("für", "for"),
];

// ============================================================================
// TRANSLATION CACHE
// ============================================================================

/// Previously computed translations, keyed by the exact German phrase.
///
/// Loaded once at start-up and shared read-only (cheap to clone).
#[derive(Debug, Clone, Default)]
pub struct TranslationCache {
    entries: Arc<HashMap<String, String>>,
}

impl TranslationCache {
    pub fn empty() -> Self {
        TranslationCache::default()
    }

    pub fn from_map(entries: HashMap<String, String>) -> Self {
        TranslationCache {
            entries: Arc::new(entries),
        }
    }

    /// Load a JSON object `{ "German phrase": "English phrase", ... }`.
    ///
    /// A missing or unreadable cache degrades to an empty one.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_load(path.as_ref()) {
            Ok(cache) => {
                info!(entries = cache.len(), "loaded translation cache");
                cache
            }
            Err(e) => {
                warn!("translation cache unavailable ({:#}); using fallback table only", e);
                TranslationCache::empty()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read translation cache: {:?}", path))?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&content).context("Failed to parse translation cache JSON")?;
        Ok(TranslationCache::from_map(entries))
    }

    pub fn get(&self, phrase: &str) -> Option<&str> {
        self.entries.get(phrase).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// LABEL RESOLVER
// ============================================================================

pub struct LabelResolver {
    cache: TranslationCache,
    fallback: HashMap<&'static str, &'static str>,
}

impl LabelResolver {
    /// Create resolver with the given cache and the built-in fallback table
    pub fn new(cache: TranslationCache) -> Self {
        LabelResolver {
            cache,
            fallback: FALLBACK_TABLE.iter().copied().collect(),
        }
    }

    /// Resolve one label (phrase → phrase, then token by token).
    pub fn resolve(&self, native_label: &str) -> String {
        if let Some(hit) = self.lookup(native_label) {
            return hit.to_string();
        }

        native_label
            .split_whitespace()
            .map(|token| self.lookup(token).unwrap_or(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resolve every "/"-separated segment of a hierarchical path.
    pub fn resolve_path(&self, native_path: &str) -> String {
        native_path
            .split('/')
            .map(|segment| self.resolve(segment))
            .collect::<Vec<_>>()
            .join("/")
    }

    fn lookup(&self, phrase: &str) -> Option<&str> {
        self.cache
            .get(phrase)
            .or_else(|| self.fallback.get(phrase).copied())
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }
}

impl Default for LabelResolver {
    fn default() -> Self {
        Self::new(TranslationCache::empty())
    }
}

// ============================================================================
// TRANSLATION EXPORT
// ============================================================================

/// One row of the translation export (review material for translators).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationRecord {
    pub id: String,
    pub name_de: String,
    pub name_en: String,
    pub full_path_de: String,
    pub full_path_en: String,
    pub level: usize,
}

impl TranslationRecord {
    pub fn from_tree(tree: &CategoryTree) -> Vec<TranslationRecord> {
        tree.iter()
            .map(|cat| TranslationRecord {
                id: cat.id().to_string(),
                name_de: cat.native_label().to_string(),
                name_en: cat.resolved_label().unwrap_or_default().to_string(),
                full_path_de: cat.native_path().to_string(),
                full_path_en: cat.resolved_path().unwrap_or_default().to_string(),
                level: cat.depth(),
            })
            .collect()
    }

    /// Write the export as pretty JSON
    pub fn export<P: AsRef<Path>>(tree: &CategoryTree, path: P) -> Result<usize> {
        let records = Self::from_tree(tree);
        let json = serde_json::to_string_pretty(&records)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write translation export: {:?}", path.as_ref()))?;
        Ok(records.len())
    }
}

// ============================================================================
// TESTS
// ============================================================================
