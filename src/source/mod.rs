// 📚 External Classification - flat entries to be aligned
//
// The external vocabulary is a flat list of coded entries. Where they come
// from (local dictionary export, REST service, test fixture) is hidden
// behind ExternalClassSource.

pub mod local;
#[cfg(feature = "remote")]
pub mod bsdd;

pub use local::LocalDictionarySource;
#[cfg(feature = "remote")]
pub use bsdd::BsddClient;

use crate::error::SourceError;
use serde::Serialize;

// ============================================================================
// EXTERNAL ENTRY
// ============================================================================

/// One entry of the external classification.
///
/// Immutable once constructed; `new` rejects empty code or namespace and
/// derives the URI when none is supplied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalEntry {
    code: String,
    name: String,
    definition: String,
    namespace: String,
    uri: String,
}

impl ExternalEntry {
    pub fn new(
        code: &str,
        name: &str,
        definition: &str,
        namespace: &str,
        uri: Option<&str>,
    ) -> Result<Self, SourceError> {
        let code = code.trim();
        let namespace = namespace.trim().trim_end_matches('/');
        if code.is_empty() {
            return Err(SourceError::InvalidEntry(format!("entry '{}' has no code", name)));
        }
        if namespace.is_empty() {
            return Err(SourceError::InvalidEntry(format!("entry '{}' has no namespace", code)));
        }

        let uri = match uri.map(str::trim).filter(|u| !u.is_empty()) {
            Some(u) => u.to_string(),
            None => format!("{}/class/{}", namespace, code),
        };

        Ok(ExternalEntry {
            code: code.to_string(),
            name: name.trim().to_string(),
            definition: definition.trim().to_string(),
            namespace: namespace.to_string(),
            uri,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

// ============================================================================
// SOURCE TRAIT
// ============================================================================

pub trait ExternalClassSource {
    /// Short description for logs
    fn describe(&self) -> String;

    /// All entries, optionally restricted to codes starting with `filter`
    fn list(&self, filter: Option<&str>) -> Result<Vec<ExternalEntry>, SourceError>;
}

/// Keep entries whose code starts with the prefix (all when no prefix)
pub(crate) fn apply_filter(entries: Vec<ExternalEntry>, filter: Option<&str>) -> Vec<ExternalEntry> {
    match filter.filter(|f| !f.is_empty()) {
        Some(prefix) => entries.into_iter().filter(|e| e.code.starts_with(prefix)).collect(),
        None => entries,
    }
}

/// Fixed list of entries (fixtures, pre-filtered batches)
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    entries: Vec<ExternalEntry>,
}

impl InMemorySource {
    pub fn new(entries: Vec<ExternalEntry>) -> Self {
        InMemorySource { entries }
    }
}

impl ExternalClassSource for InMemorySource {
    fn describe(&self) -> String {
        format!("in-memory ({} entries)", self.entries.len())
    }

    fn list(&self, filter: Option<&str>) -> Result<Vec<ExternalEntry>, SourceError> {
        Ok(apply_filter(self.entries.clone(), filter))
    }
}

// ============================================================================
// TESTS
// ============================================================================
