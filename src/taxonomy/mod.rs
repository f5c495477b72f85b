// 🌳 Taxonomy - Hierarchical categories with stable identity
//
// "Category label is a VALUE (translated once), category identifier is IDENTITY"
//
// The tree is a forest:
// - every non-root has exactly one parent
// - children lists and parent pointers agree
// - no cycles (depth strictly increases from parent to child)
//
// Categories are created by the ingester, labelled once by the
// LabelResolver, and read-only for the rest of a run.

pub mod ingest;
pub mod labels;

pub use ingest::{TaxonomyIngester, DEFAULT_MAX_DEPTH};
pub use labels::{LabelResolver, TranslationCache, TranslationRecord};

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

// ============================================================================
// CATEGORY
// ============================================================================

/// Ids become the tail of the category IRI, so they may not carry
/// characters the N-Triples IRI grammar forbids.
fn is_iri_safe(c: char) -> bool {
    !(c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | '"' | '{' | '}' | '|' | '\\' | '^' | '`'))
}

/// A node of the source taxonomy.
///
/// Identity: `id` (source-assigned, never changes)
/// Values: native label + path, resolved label + path (filled by translation)
/// Hierarchy: `parent_id` / `children_ids`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Source-assigned identifier (e.g. "1.3.13")
    id: String,

    /// Label in the taxonomy's own language (e.g. "Gipsplatten")
    native_label: String,

    /// Target-language label, `None` until labels are resolved
    resolved_label: Option<String>,

    /// Parent identifier, `None` only for roots
    parent_id: Option<String>,

    /// Child identifiers in document order
    children_ids: Vec<String>,

    /// Root = 0
    depth: usize,

    /// "Mineralische Baustoffe/Steine und Elemente/Gipsplatten"
    native_path: String,

    /// Resolved-language path, `None` until labels are resolved
    resolved_path: Option<String>,
}

impl Category {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn native_label(&self) -> &str {
        &self.native_label
    }

    pub fn resolved_label(&self) -> Option<&str> {
        self.resolved_label.as_deref()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn children_ids(&self) -> &[String] {
        &self.children_ids
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn native_path(&self) -> &str {
        &self.native_path
    }

    pub fn resolved_path(&self) -> Option<&str> {
        self.resolved_path.as_deref()
    }

    /// Resolved label when available, native label otherwise
    pub fn display_label(&self) -> &str {
        self.resolved_label().unwrap_or(&self.native_label)
    }

    /// Check if this is a root category (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if this category has no children
    pub fn is_leaf(&self) -> bool {
        self.children_ids.is_empty()
    }
}

// ============================================================================
// CATEGORY TREE
// ============================================================================

/// All categories of one taxonomy, in ingestion (document) order,
/// with an identifier index for downstream lookups.
#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    categories: Vec<Category>,
    index: HashMap<String, usize>,
    labels_resolved: bool,
}

impl CategoryTree {
    /// Create new empty tree
    pub fn new() -> Self {
        CategoryTree::default()
    }

    /// Add a category under an existing parent (or as a root).
    ///
    /// The parent must already be in the tree, so callers have to insert
    /// in an order where parents precede their children.
    pub fn insert(
        &mut self,
        id: &str,
        native_label: &str,
        parent_id: Option<&str>,
    ) -> Result<&Category, IngestError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(IngestError::MissingIdentifier {
                location: format!("child of {}", parent_id.unwrap_or("<root>")),
            });
        }
        if let Some(bad) = id.chars().find(|c| !is_iri_safe(*c)) {
            return Err(IngestError::Malformed(format!(
                "category id {:?} contains {:?}, which cannot appear in an IRI",
                id, bad
            )));
        }
        if native_label.trim().is_empty() {
            return Err(IngestError::MissingLabel { id: id.to_string() });
        }
        if self.index.contains_key(id) {
            return Err(IngestError::DuplicateIdentifier(id.to_string()));
        }

        let (depth, native_path) = match parent_id {
            Some(parent) => {
                let parent_pos = *self.index.get(parent).ok_or_else(|| IngestError::UnknownParent {
                    child: id.to_string(),
                    parent: parent.to_string(),
                })?;
                let parent_cat = &mut self.categories[parent_pos];
                parent_cat.children_ids.push(id.to_string());
                (
                    parent_cat.depth + 1,
                    format!("{}/{}", parent_cat.native_path, native_label),
                )
            }
            None => (0, native_label.to_string()),
        };

        let position = self.categories.len();
        self.categories.push(Category {
            id: id.to_string(),
            native_label: native_label.to_string(),
            resolved_label: None,
            parent_id: parent_id.map(str::to_string),
            children_ids: Vec::new(),
            depth,
            native_path,
            resolved_path: None,
        });
        self.index.insert(id.to_string(), position);

        Ok(&self.categories[position])
    }

    /// Find category by identifier
    pub fn get(&self, id: &str) -> Option<&Category> {
        self.index.get(id).map(|&pos| &self.categories[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// All categories in ingestion order
    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    /// Root categories (no parent)
    pub fn roots(&self) -> Vec<&Category> {
        self.categories.iter().filter(|c| c.is_root()).collect()
    }

    /// Direct children of a category, in document order
    pub fn children(&self, id: &str) -> Vec<&Category> {
        self.get(id)
            .map(|c| c.children_ids.iter().filter_map(|child| self.get(child)).collect())
            .unwrap_or_default()
    }

    pub fn parent(&self, category: &Category) -> Option<&Category> {
        category.parent_id.as_deref().and_then(|p| self.get(p))
    }

    /// Ancestors from the direct parent up to the root.
    ///
    /// Bounded by the tree size, so a corrupted parent chain cannot loop.
    pub fn ancestors(&self, id: &str) -> Vec<&Category> {
        let mut chain = Vec::new();
        let mut current = self.get(id);

        while let Some(cat) = current.and_then(|c| self.parent(c)) {
            if chain.len() >= self.categories.len() {
                break;
            }
            chain.push(cat);
            current = Some(cat);
        }

        chain
    }

    /// All descendants (depth-first, document order)
    pub fn descendants(&self, id: &str) -> Vec<&Category> {
        let mut out = Vec::new();
        let mut stack: Vec<&Category> = self.children(id).into_iter().rev().collect();

        while let Some(cat) = stack.pop() {
            out.push(cat);
            stack.extend(self.children(&cat.id).into_iter().rev());
        }

        out
    }

    /// Maximum depth of any category (0 for a flat list of roots)
    pub fn height(&self) -> usize {
        self.categories.iter().map(|c| c.depth).max().unwrap_or(0)
    }

    /// (identifier, parent identifier) pairs - the structural fingerprint
    /// used to compare a tree with its re-ingested export.
    pub fn parent_pairs(&self) -> BTreeSet<(String, Option<String>)> {
        self.categories
            .iter()
            .map(|c| (c.id.clone(), c.parent_id.clone()))
            .collect()
    }

    /// Re-check every forest invariant.
    pub fn validate(&self) -> Result<(), IngestError> {
        for cat in &self.categories {
            match &cat.parent_id {
                None => {
                    if cat.depth != 0 {
                        return Err(IngestError::NotAForest(format!(
                            "root '{}' has depth {}",
                            cat.id, cat.depth
                        )));
                    }
                }
                Some(parent_id) => {
                    let parent = self.get(parent_id).ok_or_else(|| IngestError::UnknownParent {
                        child: cat.id.clone(),
                        parent: parent_id.clone(),
                    })?;
                    if parent.depth + 1 != cat.depth {
                        return Err(IngestError::NotAForest(format!(
                            "'{}' has depth {} but parent '{}' has depth {}",
                            cat.id, cat.depth, parent.id, parent.depth
                        )));
                    }
                    if !parent.children_ids.iter().any(|c| c == &cat.id) {
                        return Err(IngestError::NotAForest(format!(
                            "'{}' is missing from the children of '{}'",
                            cat.id, parent.id
                        )));
                    }
                }
            }

            for child_id in &cat.children_ids {
                let child = self.get(child_id).ok_or_else(|| {
                    IngestError::NotAForest(format!("'{}' lists unknown child '{}'", cat.id, child_id))
                })?;
                if child.parent_id.as_deref() != Some(cat.id.as_str()) {
                    return Err(IngestError::NotAForest(format!(
                        "'{}' lists '{}' as child, but its parent is {:?}",
                        cat.id, child_id, child.parent_id
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn labels_resolved(&self) -> bool {
        self.labels_resolved
    }

    /// Fill resolved label and resolved path of every category.
    ///
    /// Runs once per tree; later calls leave the tree untouched.
    pub fn resolve_labels(&mut self, resolver: &LabelResolver) {
        if self.labels_resolved {
            warn!("labels already resolved; ignoring second resolution pass");
            return;
        }

        for cat in &mut self.categories {
            cat.resolved_label = Some(resolver.resolve(&cat.native_label));
            cat.resolved_path = Some(resolver.resolve_path(&cat.native_path));
        }
        self.labels_resolved = true;
    }

    /// Restore a resolved label/path pair read back from an export.
    pub(crate) fn set_resolved(&mut self, id: &str, label: Option<String>, path: Option<String>) {
        if let Some(&pos) = self.index.get(id) {
            let cat = &mut self.categories[pos];
            if label.is_some() {
                cat.resolved_label = label;
            }
            if path.is_some() {
                cat.resolved_path = path;
            }
            if cat.resolved_label.is_some() {
                self.labels_resolved = true;
            }
        }
    }
}

// ============================================================================
// IDENTIFIER ORDER
// ============================================================================

/// Natural order for dotted identifiers: "1.2" < "1.10" < "2".
///
/// Segments that are both numeric compare as numbers, otherwise as text.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny).then_with(|| x.cmp(y)),
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> CategoryTree {
        let mut tree = CategoryTree::new();
        tree.insert("1", "Mineralische Baustoffe", None).unwrap();
        tree.insert("1.1", "Bindemittel", Some("1")).unwrap();
        tree.insert("1.1.01", "Zement", Some("1.1")).unwrap();
        tree.insert("1.1.02", "Kalk", Some("1.1")).unwrap();
        tree.insert("2", "Dämmstoffe", None).unwrap();
        tree.insert("2.1", "Mineralwolle", Some("2")).unwrap();
        tree
    }

    #[test]
    fn test_insert_computes_depth_and_path() {
        let tree = sample_tree();
        let zement = tree.get("1.1.01").unwrap();

        assert_eq!(zement.depth(), 2);
        assert_eq!(zement.native_path(), "Mineralische Baustoffe/Bindemittel/Zement");
        assert_eq!(zement.parent_id(), Some("1.1"));
        assert!(zement.is_leaf());
        assert!(!zement.is_root());
        assert_eq!(tree.get("1").unwrap().native_path(), "Mineralische Baustoffe");
    }

    #[test]
    fn test_children_and_roots() {
        let tree = sample_tree();

        let roots: Vec<&str> = tree.roots().iter().map(|c| c.id()).collect();
        assert_eq!(roots, vec!["1", "2"]);

        let children: Vec<&str> = tree.children("1.1").iter().map(|c| c.id()).collect();
        assert_eq!(children, vec!["1.1.01", "1.1.02"]);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut tree = CategoryTree::new();
        let err = tree.insert("1.1", "Bindemittel", Some("1")).unwrap_err();

        assert_eq!(
            err,
            IngestError::UnknownParent { child: "1.1".to_string(), parent: "1".to_string() }
        );
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut tree = sample_tree();
        let err = tree.insert("1.1", "Noch einmal", Some("1")).unwrap_err();
        assert_eq!(err, IngestError::DuplicateIdentifier("1.1".to_string()));
    }

    #[test]
    fn test_ids_unusable_in_iris_rejected() {
        let mut tree = CategoryTree::new();
        for id in ["1 a", "1<2", "a\"b", "x{y}", "p|q", "back\\slash", "c^d", "tick`"] {
            assert!(
                matches!(tree.insert(id, "Holz", None), Err(IngestError::Malformed(_))),
                "accepted {:?}",
                id
            );
        }
        assert!(tree.is_empty());
        // Surrounding whitespace is trimmed, not rejected
        assert_eq!(tree.insert(" 1.2 ", "Holz", None).unwrap().id(), "1.2");
    }

    #[test]
    fn test_missing_label_rejected() {
        let mut tree = CategoryTree::new();
        assert!(matches!(tree.insert("1", "  ", None), Err(IngestError::MissingLabel { .. })));
    }

    #[test]
    fn test_parent_chain_terminates_within_height() {
        let tree = sample_tree();
        let height = tree.height();

        for cat in tree.iter() {
            let ancestors = tree.ancestors(cat.id());
            assert!(ancestors.len() <= height);
            assert_eq!(ancestors.len(), cat.depth());
            if let Some(top) = ancestors.last() {
                assert!(top.is_root());
            } else {
                assert!(cat.is_root());
            }
        }
    }

    #[test]
    fn test_descendants_depth_first() {
        let tree = sample_tree();
        let ids: Vec<&str> = tree.descendants("1").iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["1.1", "1.1.01", "1.1.02"]);
    }

    #[test]
    fn test_validate_accepts_well_formed_tree() {
        assert!(sample_tree().validate().is_ok());
    }

    #[test]
    fn test_compare_ids_natural_order() {
        assert_eq!(compare_ids("1.2", "1.10"), Ordering::Less);
        assert_eq!(compare_ids("1.10", "2"), Ordering::Less);
        assert_eq!(compare_ids("1", "1.1"), Ordering::Less);
        assert_eq!(compare_ids("1.1.03", "1.1.03"), Ordering::Equal);
        assert_eq!(compare_ids("1.1.03", "1.1.3"), Ordering::Less);
    }

    #[test]
    fn test_resolve_labels_runs_once() {
        let mut tree = sample_tree();
        let resolver = LabelResolver::new(TranslationCache::empty());

        tree.resolve_labels(&resolver);
        assert!(tree.labels_resolved());
        assert_eq!(tree.get("1.1.01").unwrap().resolved_label(), Some("Cement"));
        assert_eq!(
            tree.get("1.1.01").unwrap().resolved_path(),
            Some("Mineral Building Materials/Binders/Cement")
        );

        let mut cache = std::collections::HashMap::new();
        cache.insert("Zement".to_string(), "Portland".to_string());
        tree.resolve_labels(&LabelResolver::new(TranslationCache::from_map(cache)));
        assert_eq!(tree.get("1.1.01").unwrap().resolved_label(), Some("Cement"));
    }
}
