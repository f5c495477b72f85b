// 💾 Local Dictionary Export - bsDD-style JSON file on disk
//
// {
//   "OrganizationCode": "etim", "DictionaryCode": "etim", "DictionaryVersion": "10.1",
//   "Classes": [{ "Code", "Name", "Definition", "Uri", "Status" }, ...]
// }
//
// Only Status == "Active" classes are listed.

use super::{apply_filter, ExternalClassSource, ExternalEntry};
use crate::error::SourceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_EXTERNAL_BASE: &str = "https://identifier.buildingsmart.org/uri";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DictionaryExport {
    organization_code: String,
    dictionary_code: String,
    dictionary_version: String,
    #[serde(default)]
    dictionary_name: Option<String>,
    #[serde(default)]
    language_iso_code: Option<String>,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    classes: Vec<DictionaryClass>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DictionaryClass {
    #[serde(default)]
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Summary of a dictionary export (shown by the CLI before a run)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DictionaryInfo {
    pub name: Option<String>,
    pub version: String,
    pub language: Option<String>,
    pub release_date: Option<String>,
    pub namespace: String,
    pub total_classes: usize,
}

pub struct LocalDictionarySource {
    path: PathBuf,
    base: String,
}

impl LocalDictionarySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        LocalDictionarySource {
            path: path.as_ref().to_path_buf(),
            base: DEFAULT_EXTERNAL_BASE.to_string(),
        }
    }

    /// Override the URI base the namespace is built from
    pub fn with_base(mut self, base: &str) -> Self {
        self.base = base.trim_end_matches('/').to_string();
        self
    }

    fn read(&self) -> Result<DictionaryExport, SourceError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn namespace(&self, export: &DictionaryExport) -> String {
        format!(
            "{}/{}/{}-{}",
            self.base, export.organization_code, export.dictionary_code, export.dictionary_version
        )
    }

    pub fn info(&self) -> Result<DictionaryInfo, SourceError> {
        let export = self.read()?;
        Ok(DictionaryInfo {
            namespace: self.namespace(&export),
            name: export.dictionary_name,
            version: export.dictionary_version,
            language: export.language_iso_code,
            release_date: export.release_date,
            total_classes: export.classes.len(),
        })
    }
}

impl ExternalClassSource for LocalDictionarySource {
    fn describe(&self) -> String {
        format!("local dictionary {:?}", self.path)
    }

    fn list(&self, filter: Option<&str>) -> Result<Vec<ExternalEntry>, SourceError> {
        let export = self.read()?;
        let namespace = self.namespace(&export);

        let mut entries = Vec::with_capacity(export.classes.len());
        let mut inactive = 0usize;
        let mut invalid = 0usize;

        for class in &export.classes {
            if class.status.as_deref() != Some("Active") {
                inactive += 1;
                continue;
            }
            match ExternalEntry::new(
                &class.code,
                &class.name,
                class.definition.as_deref().unwrap_or_default(),
                &namespace,
                class.uri.as_deref(),
            ) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!("skipping dictionary class: {}", e);
                    invalid += 1;
                }
            }
        }

        let entries = apply_filter(entries, filter);
        info!(
            active = entries.len(),
            inactive,
            invalid,
            namespace = %namespace,
            "loaded dictionary classes from {:?}",
            self.path
        );
        Ok(entries)
    }
}

// ============================================================================
// TESTS
// ============================================================================
