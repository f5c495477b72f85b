// 📥 Taxonomy Ingestion - source document → validated CategoryTree
//
// Supported sources:
// - ILCD category XML  (<categories dataType="Process"><category id name>...)
// - nested JSON        ([{"id", "name", "children": [...]}])
// - exported graph     (N-Triples written by TaxonomyGraphBuilder)
//
// All traversals use an explicit stack. Parents are always inserted before
// their children, so CategoryTree::insert can check linkage as it goes.

use super::CategoryTree;
use crate::error::IngestError;
use crate::graph::{Namespaces, RdfGraph, Term, OWL_CLASS, RDFS_COMMENT, RDFS_LABEL, RDFS_SUBCLASS_OF, RDF_TYPE};
use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Depth guard for pathological inputs (root = depth 0)
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// ILCD data type whose category block is ingested by default
pub const DEFAULT_DATA_TYPE: &str = "Process";

pub struct TaxonomyIngester {
    max_depth: usize,
    data_type: String,
    namespaces: Namespaces,
}

impl TaxonomyIngester {
    pub fn new() -> Self {
        TaxonomyIngester {
            max_depth: DEFAULT_MAX_DEPTH,
            data_type: DEFAULT_DATA_TYPE.to_string(),
            namespaces: Namespaces::default(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_data_type(mut self, data_type: &str) -> Self {
        self.data_type = data_type.to_string();
        self
    }

    /// Namespaces used to read back an exported graph
    pub fn with_namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Ingest a file, choosing the parser by extension (.xml, .json, .nt)
    pub fn ingest_file<P: AsRef<Path>>(&self, path: P) -> Result<CategoryTree> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy source: {:?}", path))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_lowercase();

        let tree = match extension.as_str() {
            "xml" => self.ingest_xml(&content),
            "json" => self.ingest_json(&content),
            "nt" => self.ingest_ntriples(&content),
            other => bail!("Unsupported taxonomy source format '.{}' ({:?})", other, path),
        }
        .with_context(|| format!("Failed to ingest taxonomy: {:?}", path))?;

        info!(
            categories = tree.len(),
            roots = tree.roots().len(),
            height = tree.height(),
            "ingested taxonomy from {:?}",
            path
        );
        Ok(tree)
    }

    fn check_depth(&self, id: &str, depth: usize) -> Result<(), IngestError> {
        if depth >= self.max_depth {
            return Err(IngestError::TooDeep {
                id: id.to_string(),
                max_depth: self.max_depth,
            });
        }
        Ok(())
    }

    // ========================================================================
    // ILCD CATEGORY XML
    // ========================================================================

    pub fn ingest_xml(&self, xml: &str) -> Result<CategoryTree, IngestError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut tree = CategoryTree::new();
        let mut open: Vec<String> = Vec::new();
        let mut in_block = false;
        let mut found_block = false;
        let mut buf = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"categories" => {
                    if self.is_wanted_block(e, position)? {
                        in_block = true;
                        found_block = true;
                    }
                }
                Ok(Event::End(ref e)) if e.local_name().as_ref() == b"categories" => {
                    in_block = false;
                    open.clear();
                }
                Ok(Event::Start(ref e)) if in_block && e.local_name().as_ref() == b"category" => {
                    let id = self.insert_xml_category(&mut tree, e, open.last(), position)?;
                    open.push(id);
                }
                Ok(Event::Empty(ref e)) if in_block && e.local_name().as_ref() == b"category" => {
                    self.insert_xml_category(&mut tree, e, open.last(), position)?;
                }
                Ok(Event::End(ref e)) if in_block && e.local_name().as_ref() == b"category" => {
                    open.pop();
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(IngestError::Malformed(format!(
                        "XML error at byte {}: {}",
                        reader.error_position(),
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        if !found_block {
            return Err(IngestError::Malformed(format!(
                "no <categories dataType=\"{}\"> block found",
                self.data_type
            )));
        }
        if in_block {
            return Err(IngestError::Malformed("unexpected end of document".to_string()));
        }

        Ok(tree)
    }

    fn is_wanted_block(&self, element: &BytesStart, position: u64) -> Result<bool, IngestError> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| malformed_attribute(position, e))?;
            if attr.key.local_name().as_ref() == b"dataType"
                && String::from_utf8_lossy(&attr.value) == self.data_type.as_str()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn insert_xml_category(
        &self,
        tree: &mut CategoryTree,
        element: &BytesStart,
        parent: Option<&String>,
        position: u64,
    ) -> Result<String, IngestError> {
        let mut id = None;
        let mut name = None;

        for attr in element.attributes() {
            let attr = attr.map_err(|e| malformed_attribute(position, e))?;
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = quick_xml::escape::unescape(&raw)
                .map(|v| v.into_owned())
                .map_err(|e| IngestError::Malformed(format!("bad entity at byte {}: {}", position, e)))?;
            match attr.key.local_name().as_ref() {
                b"id" => id = Some(value),
                b"name" => name = Some(value),
                _ => {}
            }
        }

        let id = id.filter(|i| !i.trim().is_empty()).ok_or_else(|| IngestError::MissingIdentifier {
            location: format!("byte {}", position),
        })?;
        let name = name.unwrap_or_default();

        let depth = match parent {
            Some(p) => tree.get(p).map_or(0, |c| c.depth() + 1),
            None => 0,
        };
        self.check_depth(&id, depth)?;
        let inserted = tree.insert(&id, &name, parent.map(String::as_str))?;
        debug!(id = inserted.id(), depth = inserted.depth(), "category");

        Ok(inserted.id().to_string())
    }

    // ========================================================================
    // NESTED JSON
    // ========================================================================

    pub fn ingest_json(&self, json: &str) -> Result<CategoryTree, IngestError> {
        let roots: Vec<JsonNode> = serde_json::from_str(json)
            .map_err(|e| IngestError::Malformed(format!("JSON: {}", e)))?;

        let mut tree = CategoryTree::new();
        // (node, parent id, depth), popped in document order
        let mut stack: Vec<(&JsonNode, Option<String>, usize)> =
            roots.iter().rev().map(|n| (n, None, 0)).collect();

        while let Some((node, parent, depth)) = stack.pop() {
            let id = node
                .id
                .as_deref()
                .filter(|i| !i.trim().is_empty())
                .ok_or_else(|| IngestError::MissingIdentifier {
                    location: format!("child of {}", parent.as_deref().unwrap_or("<root>")),
                })?;
            self.check_depth(id, depth)?;

            let inserted = tree.insert(id, node.name.as_deref().unwrap_or_default(), parent.as_deref())?;
            let id = inserted.id().to_string();

            for child in node.children.iter().rev() {
                stack.push((child, Some(id.clone()), depth + 1));
            }
        }

        Ok(tree)
    }

    // ========================================================================
    // EXPORTED GRAPH
    // ========================================================================

    pub fn ingest_ntriples(&self, ntriples: &str) -> Result<CategoryTree, IngestError> {
        let graph = RdfGraph::from_ntriples(ntriples)?;
        self.ingest_graph(&graph)
    }

    /// Rebuild a tree from class nodes, their cross-reference identifiers
    /// and subClassOf edges.
    pub fn ingest_graph(&self, graph: &RdfGraph) -> Result<CategoryTree, IngestError> {
        let ns = &self.namespaces;
        let category_ref = ns.category_ref();
        let classes = graph.subjects_with(RDF_TYPE, &Term::iri(OWL_CLASS));

        // class IRI → category id
        let mut class_ids: HashMap<&str, String> = HashMap::with_capacity(classes.len());
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(classes.len());
        for class in &classes {
            let id = graph
                .objects(class, &category_ref)
                .filter_map(Term::as_iri)
                .find_map(|iri| iri.strip_prefix(ns.category_ns.as_str()))
                .filter(|id| !id.is_empty())
                .ok_or_else(|| IngestError::MissingIdentifier {
                    location: class.to_string(),
                })?;
            if !seen_ids.insert(id) {
                return Err(IngestError::DuplicateIdentifier(id.to_string()));
            }
            class_ids.insert(class, id.to_string());
        }

        let mut nodes: HashMap<&str, GraphNode> = HashMap::with_capacity(classes.len());
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut roots: Vec<&str> = Vec::new();

        for class in &classes {
            let id = class_ids[class].as_str();
            let labels: Vec<&Term> = graph.objects(class, RDFS_LABEL).collect();
            let comments: Vec<&Term> = graph.objects(class, RDFS_COMMENT).collect();

            let native_label = labels
                .iter()
                .find_map(|t| t.literal_in("de"))
                .or_else(|| labels.iter().find_map(|t| plain_literal(t)))
                .ok_or_else(|| IngestError::MissingLabel { id: id.to_string() })?;

            nodes.insert(
                id,
                GraphNode {
                    native_label: native_label.to_string(),
                    resolved_label: labels.iter().find_map(|t| t.literal_in("en")).map(str::to_string),
                    resolved_path: comments.iter().find_map(|t| t.literal_in("en")).map(str::to_string),
                },
            );

            match graph.objects(class, RDFS_SUBCLASS_OF).find_map(Term::as_iri) {
                Some(parent_class) => {
                    let parent_id = class_ids.get(parent_class).ok_or_else(|| IngestError::UnknownParent {
                        child: id.to_string(),
                        parent: parent_class.to_string(),
                    })?;
                    children.entry(parent_id.as_str()).or_default().push(id);
                }
                None => roots.push(id),
            }
        }

        let mut tree = CategoryTree::new();
        let mut stack: Vec<(&str, Option<&str>, usize)> = roots.iter().rev().map(|id| (*id, None, 0)).collect();

        while let Some((id, parent, depth)) = stack.pop() {
            self.check_depth(id, depth)?;
            let node = &nodes[id];
            tree.insert(id, &node.native_label, parent)?;

            if let Some(kids) = children.get(id) {
                for child in kids.iter().rev() {
                    stack.push((*child, Some(id), depth + 1));
                }
            }
        }

        if tree.len() != nodes.len() {
            let mut unreachable: Vec<&str> = nodes.keys().copied().filter(|id| !tree.contains(id)).collect();
            unreachable.sort_by(|a, b| super::compare_ids(a, b));
            return Err(IngestError::NotAForest(format!(
                "{} categories are not reachable from any root (cycle?): {}",
                unreachable.len(),
                unreachable.join(", ")
            )));
        }

        for (id, node) in nodes {
            tree.set_resolved(id, node.resolved_label, node.resolved_path);
        }

        Ok(tree)
    }
}

impl Default for TaxonomyIngester {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct JsonNode {
    id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    children: Vec<JsonNode>,
}

struct GraphNode {
    native_label: String,
    resolved_label: Option<String>,
    resolved_path: Option<String>,
}

fn plain_literal(term: &Term) -> Option<&str> {
    match term {
        Term::Literal { value, lang: None, .. } => Some(value),
        _ => None,
    }
}

fn malformed_attribute(position: u64, e: quick_xml::events::attributes::AttrError) -> IngestError {
    IngestError::Malformed(format!("bad attribute at byte {}: {}", position, e))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TaxonomyGraphBuilder;
    use crate::taxonomy::LabelResolver;

    const ILCD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CategorySystem xmlns="http://lca.jrc.it/ILCD/Categories" name="OEKOBAUDAT">
  <categories dataType="Flow">
    <category id="9" name="Nicht relevant"/>
  </categories>
  <categories dataType="Process">
    <category id="1" name="Mineralische Baustoffe">
      <category id="1.1" name="Bindemittel">
        <category id="1.1.01" name="Zement"/>
        <category id="1.1.02" name="Kalk"/>
      </category>
      <category id="1.2" name="Sand &amp; Kies"/>
    </category>
    <category id="2" name="Dämmstoffe">
      <category id="2.1" name="Mineralwolle"/>
    </category>
  </categories>
</CategorySystem>"#;

    #[test]
    fn test_ingest_ilcd_xml() {
        let tree = TaxonomyIngester::new().ingest_xml(ILCD).unwrap();

        assert_eq!(tree.len(), 7);
        assert!(!tree.contains("9"));
        let ids: Vec<&str> = tree.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["1", "1.1", "1.1.01", "1.1.02", "1.2", "2", "2.1"]);

        let kalk = tree.get("1.1.02").unwrap();
        assert_eq!(kalk.depth(), 2);
        assert_eq!(kalk.native_path(), "Mineralische Baustoffe/Bindemittel/Kalk");
        assert_eq!(tree.get("1.2").unwrap().native_label(), "Sand & Kies");
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_xml_without_process_block() {
        let xml = r#"<CategorySystem><categories dataType="Flow"><category id="1" name="x"/></categories></CategorySystem>"#;
        assert!(matches!(
            TaxonomyIngester::new().ingest_xml(xml),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_xml_missing_id_and_duplicate() {
        let missing = r#"<c><categories dataType="Process"><category name="ohne"/></categories></c>"#;
        assert!(matches!(
            TaxonomyIngester::new().ingest_xml(missing),
            Err(IngestError::MissingIdentifier { .. })
        ));

        let dup = r#"<c><categories dataType="Process"><category id="1" name="a"/><category id="1" name="b"/></categories></c>"#;
        assert_eq!(
            TaxonomyIngester::new().ingest_xml(dup).unwrap_err(),
            IngestError::DuplicateIdentifier("1".to_string())
        );
    }

    #[test]
    fn test_xml_mismatched_tags_are_malformed() {
        let xml = r#"<c><categories dataType="Process"><category id="1" name="a"></categories></c>"#;
        assert!(matches!(
            TaxonomyIngester::new().ingest_xml(xml),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_xml_duplicate_attribute_is_malformed() {
        let xml = r#"<c><categories dataType="Process"><category id="1" id="2" name="a"/></categories></c>"#;
        assert!(matches!(
            TaxonomyIngester::new().ingest_xml(xml),
            Err(IngestError::Malformed(_))
        ));

        let xml = r#"<c><categories dataType="Process" dataType="Flow"></categories></c>"#;
        assert!(matches!(
            TaxonomyIngester::new().ingest_xml(xml),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_ingest_nested_json() {
        let json = r#"[
            {"id": "1", "name": "Holz", "children": [
                {"id": "1.1", "name": "Vollholz"},
                {"id": "1.2", "name": "Holzwerkstoffe", "children": [
                    {"id": "1.2.1", "name": "Spanplatten"}
                ]}
            ]},
            {"id": "2", "name": "Metalle"}
        ]"#;
        let tree = TaxonomyIngester::new().ingest_json(json).unwrap();

        let ids: Vec<&str> = tree.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["1", "1.1", "1.2", "1.2.1", "2"]);
        assert_eq!(tree.get("1.2.1").unwrap().native_path(), "Holz/Holzwerkstoffe/Spanplatten");
    }

    #[test]
    fn test_json_errors() {
        let ingester = TaxonomyIngester::new();
        assert!(matches!(
            ingester.ingest_json(r#"[{"name": "ohne id"}]"#),
            Err(IngestError::MissingIdentifier { .. })
        ));
        assert!(matches!(
            ingester.ingest_json(r#"[{"id": "1", "name": ""}]"#),
            Err(IngestError::MissingLabel { .. })
        ));
        assert!(matches!(ingester.ingest_json("{not json"), Err(IngestError::Malformed(_))));
        // An id with inner whitespace could not be written back as an IRI
        assert!(matches!(
            ingester.ingest_json(r#"[{"id": "1 a", "name": "Holz"}]"#),
            Err(IngestError::Malformed(_))
        ));
    }

    #[test]
    fn test_max_depth_guard() {
        let json = r#"[{"id": "a", "name": "A", "children": [
            {"id": "b", "name": "B", "children": [{"id": "c", "name": "C"}]}
        ]}]"#;
        let err = TaxonomyIngester::new().with_max_depth(2).ingest_json(json).unwrap_err();
        assert_eq!(err, IngestError::TooDeep { id: "c".to_string(), max_depth: 2 });

        let xml = r#"<c><categories dataType="Process"><category id="a" name="A"><category id="b" name="B"/></category></categories></c>"#;
        assert!(matches!(
            TaxonomyIngester::new().with_max_depth(1).ingest_xml(xml),
            Err(IngestError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_graph_reingest_preserves_structure_and_labels() {
        let mut tree = TaxonomyIngester::new().ingest_xml(ILCD).unwrap();
        tree.resolve_labels(&LabelResolver::default());

        let nt = TaxonomyGraphBuilder::default().build(&tree).to_ntriples();
        let back = TaxonomyIngester::new().ingest_ntriples(&nt).unwrap();

        assert_eq!(back.parent_pairs(), tree.parent_pairs());
        assert!(back.validate().is_ok());
        let zement = back.get("1.1.01").unwrap();
        assert_eq!(zement.native_label(), "Zement");
        assert_eq!(zement.resolved_label(), Some("Cement"));
        assert_eq!(zement.resolved_path(), tree.get("1.1.01").unwrap().resolved_path());
        assert!(back.labels_resolved());
    }

    #[test]
    fn test_graph_cycle_is_rejected() {
        let nt = "\
<http://c/A> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://c/A> <http://www.w3.org/2000/01/rdf-schema#label> \"A\"@de .
<http://c/A> <https://oekobaudat.de/class/categoryRef> <https://oekobaudat.de/category/1> .
<http://c/A> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://c/B> .
<http://c/B> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://www.w3.org/2002/07/owl#Class> .
<http://c/B> <http://www.w3.org/2000/01/rdf-schema#label> \"B\"@de .
<http://c/B> <https://oekobaudat.de/class/categoryRef> <https://oekobaudat.de/category/2> .
<http://c/B> <http://www.w3.org/2000/01/rdf-schema#subClassOf> <http://c/A> .
";
        assert!(matches!(
            TaxonomyIngester::new().ingest_ntriples(nt),
            Err(IngestError::NotAForest(_))
        ));
    }

    #[test]
    fn test_ingest_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.xml");
        fs::write(&path, ILCD).unwrap();

        let tree = TaxonomyIngester::new().ingest_file(&path).unwrap();
        assert_eq!(tree.len(), 7);

        let bad = dir.path().join("categories.yaml");
        fs::write(&bad, "x").unwrap();
        assert!(TaxonomyIngester::new().ingest_file(&bad).is_err());
    }
}
