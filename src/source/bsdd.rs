// 🌐 Dictionary Service Client - paginated class listing over REST
//
// GET {base}/api/Dictionary/v1                      → dictionaries
// GET {base}/api/Dictionary/v1/Classes?Uri=..&Offset=..&Limit=..  → classes

use super::{apply_filter, ExternalClassSource, ExternalEntry};
use crate::error::SourceError;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.bsdd.buildingsmart.org";
pub const TEST_BASE_URL: &str = "https://test.bsdd.buildingsmart.org";

const USER_AGENT: &str = concat!("taxonomy-align/", env!("CARGO_PKG_VERSION"));
const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DictionarySummary {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub organization_code_owner: String,
    #[serde(default)]
    pub organization_name_owner: String,
}

impl DictionarySummary {
    /// ETIM dictionaries are identified by owner or code
    pub fn is_etim(&self) -> bool {
        self.organization_code_owner.to_lowercase().contains("etim")
            || self.organization_name_owner.to_lowercase().contains("etim")
            || self.code.eq_ignore_ascii_case("etim")
    }
}

#[derive(Debug, Deserialize)]
struct DictionariesPage {
    #[serde(default)]
    dictionaries: Vec<DictionarySummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassesPage {
    #[serde(default)]
    classes: Vec<ClassSummary>,
    #[serde(default)]
    classes_total_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ClassSummary {
    #[serde(default)]
    code: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    definition: Option<String>,
    #[serde(default)]
    uri: Option<String>,
}

pub struct BsddClient {
    http: reqwest::blocking::Client,
    base_url: String,
    dictionary_uri: Option<String>,
    version: Option<String>,
}

impl BsddClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Remote(format!("failed to create HTTP client: {}", e)))?;

        Ok(BsddClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            dictionary_uri: None,
            version: None,
        })
    }

    /// List classes of this dictionary instead of looking one up
    pub fn with_dictionary_uri(mut self, uri: &str) -> Self {
        self.dictionary_uri = Some(uri.to_string());
        self
    }

    /// ETIM version to look up when no dictionary URI is set ("10.1")
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    fn get<T: for<'de> Deserialize<'de>>(&self, url: &str, query: &[(&str, String)]) -> Result<T, SourceError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .query(query)
            .send()
            .map_err(|e| SourceError::Remote(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SourceError::Remote(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        response
            .json::<T>()
            .map_err(|e| SourceError::Remote(format!("invalid response body: {}", e)))
    }

    pub fn dictionaries(&self) -> Result<Vec<DictionarySummary>, SourceError> {
        let url = format!("{}/api/Dictionary/v1", self.base_url);
        let page: DictionariesPage = self.get(&url, &[])?;
        info!(count = page.dictionaries.len(), "fetched dictionary list");
        Ok(page.dictionaries)
    }

    /// Find the ETIM dictionary (given version, or the first listed)
    pub fn find_etim_dictionary(&self) -> Result<DictionarySummary, SourceError> {
        let candidates: Vec<DictionarySummary> =
            self.dictionaries()?.into_iter().filter(DictionarySummary::is_etim).collect();

        let found = match &self.version {
            Some(version) => candidates.into_iter().find(|d| &d.version == version),
            None => candidates.into_iter().next(),
        };

        found.ok_or_else(|| {
            SourceError::Remote(format!(
                "no ETIM dictionary found (version {})",
                self.version.as_deref().unwrap_or("latest")
            ))
        })
    }

    /// Every class of a dictionary, page by page
    pub fn dictionary_classes(&self, dictionary_uri: &str) -> Result<Vec<ExternalEntry>, SourceError> {
        let url = format!("{}/api/Dictionary/v1/Classes", self.base_url);
        let mut entries = Vec::new();
        let mut offset = 0usize;

        loop {
            let query = [
                ("Uri", dictionary_uri.to_string()),
                ("Offset", offset.to_string()),
                ("Limit", PAGE_SIZE.to_string()),
                ("includeTestClasses", "false".to_string()),
            ];
            let page: ClassesPage = self.get(&url, &query)?;
            let received = page.classes.len();
            debug!(offset, received, "fetched class page");

            for class in page.classes {
                match ExternalEntry::new(
                    &class.code,
                    &class.name,
                    class.definition.as_deref().unwrap_or_default(),
                    dictionary_uri,
                    class.uri.as_deref(),
                ) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!("skipping dictionary class: {}", e),
                }
            }

            offset += received;
            let total_reached = page.classes_total_count.map_or(false, |total| offset >= total);
            if received < PAGE_SIZE || total_reached {
                break;
            }
        }

        info!(count = entries.len(), "fetched classes of {}", dictionary_uri);
        Ok(entries)
    }
}

impl ExternalClassSource for BsddClient {
    fn describe(&self) -> String {
        format!("dictionary service {}", self.base_url)
    }

    fn list(&self, filter: Option<&str>) -> Result<Vec<ExternalEntry>, SourceError> {
        let dictionary_uri = match &self.dictionary_uri {
            Some(uri) => uri.clone(),
            None => {
                let dictionary = self.find_etim_dictionary()?;
                info!(name = %dictionary.name, version = %dictionary.version, "using dictionary {}", dictionary.uri);
                dictionary.uri
            }
        };

        Ok(apply_filter(self.dictionary_classes(&dictionary_uri)?, filter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_etim_detection() {
        let json = r#"{"dictionaries": [
            {"uri": "https://identifier.buildingsmart.org/uri/etim/etim-10.1", "code": "etim", "version": "10.1", "organizationCodeOwner": "etim"},
            {"uri": "https://identifier.buildingsmart.org/uri/buildingsmart/ifc/4.3", "code": "ifc", "version": "4.3", "organizationCodeOwner": "buildingsmart"}
        ]}"#;
        let page: DictionariesPage = serde_json::from_str(json).unwrap();

        let etim: Vec<&DictionarySummary> = page.dictionaries.iter().filter(|d| d.is_etim()).collect();
        assert_eq!(etim.len(), 1);
        assert_eq!(etim[0].version, "10.1");
    }

    #[test]
    fn test_class_page_shape() {
        let json = r#"{"classes": [{"code": "EC000001", "name": "Board", "uri": "https://x/EC000001"}], "classesTotalCount": 1}"#;
        let page: ClassesPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.classes.len(), 1);
        assert_eq!(page.classes_total_count, Some(1));
        assert_eq!(page.classes[0].definition, None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = BsddClient::new("https://api.example.org/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.describe(), "dictionary service https://api.example.org");
    }
}
