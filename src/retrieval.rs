// 🔎 Candidate Retrieval - entry → ordered top-K categories
//
// Deterministic pure function of (entry, tree): same inputs, same order.
//
// LexicalRetriever scores token overlap between the entry (name tokens
// weighted 2, definition tokens 1) and four category fields:
//   resolved label 1.0, resolved path 0.5, native label 0.8, native path 0.3
// Ties break by identifier in natural order. Zero-score categories follow
// the positive ones so K candidates come back whenever the tree has K nodes.

use crate::source::ExternalEntry;
use crate::taxonomy::{compare_ids, Category, CategoryTree};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

const RESOLVED_LABEL_WEIGHT: f64 = 1.0;
const RESOLVED_PATH_WEIGHT: f64 = 0.5;
const NATIVE_LABEL_WEIGHT: f64 = 0.8;
const NATIVE_PATH_WEIGHT: f64 = 0.3;

const NAME_TOKEN_WEIGHT: f64 = 2.0;
const DEFINITION_TOKEN_WEIGHT: f64 = 1.0;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "into", "is", "it",
    "of", "on", "or", "other", "that", "the", "to", "used", "which", "with", "without",
    // German connectives that survive translation
    "und", "mit", "für", "von", "oder", "der", "die", "das",
];

// ============================================================================
// TOKENS
// ============================================================================

/// Lowercase word tokens with stop words removed and plurals stemmed.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| t.chars().count() > 1 && !STOP_WORDS.contains(&t.as_str()))
        .map(|t| stem(&t))
        .collect()
}

/// Light English plural stemming: "boards" → "board", "glasses" → "glass",
/// "batteries" → "battery". Words ending in "ss" are left alone.
pub fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len > 4 && token.ends_with("ies") {
        return format!("{}y", &token[..token.len() - 3]);
    }
    if len > 4 && token.ends_with("es") {
        let base = &token[..token.len() - 2];
        if base.ends_with("ss") || base.ends_with('x') || base.ends_with('z') || base.ends_with("ch") || base.ends_with("sh") {
            return base.to_string();
        }
    }
    if len > 3 && token.ends_with('s') && !token.ends_with("ss") {
        return token[..token.len() - 1].to_string();
    }
    token.to_string()
}

/// Token → weight for an entry (name tokens outrank definition tokens).
/// Ordered, so score sums are bit-identical between runs.
fn entry_weights(entry: &ExternalEntry) -> BTreeMap<String, f64> {
    let mut weights: BTreeMap<String, f64> = BTreeMap::new();
    for token in tokenize(entry.definition()) {
        weights.insert(token, DEFINITION_TOKEN_WEIGHT);
    }
    for token in tokenize(entry.name()) {
        weights.insert(token, NAME_TOKEN_WEIGHT);
    }
    weights
}

#[derive(Debug, Clone, Default)]
struct CategoryTokens {
    resolved_label: HashSet<String>,
    resolved_path: HashSet<String>,
    native_label: HashSet<String>,
    native_path: HashSet<String>,
}

impl CategoryTokens {
    fn of(category: &Category) -> Self {
        let set = |text: Option<&str>| -> HashSet<String> {
            text.map(|t| tokenize(t).into_iter().collect()).unwrap_or_default()
        };
        CategoryTokens {
            resolved_label: set(category.resolved_label()),
            resolved_path: set(category.resolved_path()),
            native_label: set(Some(category.native_label())),
            native_path: set(Some(category.native_path())),
        }
    }

    fn score(&self, weights: &BTreeMap<String, f64>) -> f64 {
        weights
            .iter()
            .map(|(token, w)| {
                let mut field = 0.0;
                if self.resolved_label.contains(token) {
                    field += RESOLVED_LABEL_WEIGHT;
                }
                if self.resolved_path.contains(token) {
                    field += RESOLVED_PATH_WEIGHT;
                }
                if self.native_label.contains(token) {
                    field += NATIVE_LABEL_WEIGHT;
                }
                if self.native_path.contains(token) {
                    field += NATIVE_PATH_WEIGHT;
                }
                w * field
            })
            .sum()
    }
}

// ============================================================================
// RETRIEVER
// ============================================================================

/// A category with its retrieval score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate<'t> {
    #[serde(skip)]
    pub category: &'t Category,
    pub id: String,
    pub score: f64,
}

pub trait CandidateRetriever: Send + Sync {
    /// At most `k` categories, best first
    fn top_k<'t>(&self, entry: &ExternalEntry, tree: &'t CategoryTree, k: usize) -> Vec<&'t Category>;
}

/// Token index borrowed against the tree it was built from
#[derive(Debug)]
struct TreeIndex<'i> {
    tree: &'i CategoryTree,
    tokens: HashMap<String, CategoryTokens>,
}

#[derive(Debug, Default)]
pub struct LexicalRetriever<'i> {
    index: Option<TreeIndex<'i>>,
}

impl<'i> LexicalRetriever<'i> {
    /// Retriever that tokenizes categories on every call
    pub fn new() -> Self {
        LexicalRetriever { index: None }
    }

    /// Retriever with category tokens precomputed for `tree`.
    ///
    /// The borrow keeps `tree` frozen while the index lives; any other
    /// tree passed to `ranked` is tokenized fresh.
    pub fn for_tree(tree: &'i CategoryTree) -> Self {
        LexicalRetriever {
            index: Some(TreeIndex {
                tree,
                tokens: tree
                    .iter()
                    .map(|c| (c.id().to_string(), CategoryTokens::of(c)))
                    .collect(),
            }),
        }
    }

    fn indexed_tokens(&self, tree: &CategoryTree) -> Option<&HashMap<String, CategoryTokens>> {
        self.index
            .as_ref()
            .filter(|index| std::ptr::eq(index.tree, tree))
            .map(|index| &index.tokens)
    }

    /// Every category with its score, best first
    pub fn ranked<'t>(&self, entry: &ExternalEntry, tree: &'t CategoryTree) -> Vec<ScoredCandidate<'t>> {
        let weights = entry_weights(entry);
        let indexed = self.indexed_tokens(tree);

        let mut scored: Vec<ScoredCandidate<'t>> = tree
            .iter()
            .map(|category| {
                let score = match indexed.and_then(|tokens| tokens.get(category.id())) {
                    Some(tokens) => tokens.score(&weights),
                    None => CategoryTokens::of(category).score(&weights),
                };
                ScoredCandidate {
                    category,
                    id: category.id().to_string(),
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| compare_ids(&a.id, &b.id))
        });
        scored
    }
}

impl CandidateRetriever for LexicalRetriever<'_> {
    fn top_k<'t>(&self, entry: &ExternalEntry, tree: &'t CategoryTree, k: usize) -> Vec<&'t Category> {
        self.ranked(entry, tree)
            .into_iter()
            .take(k)
            .map(|c| c.category)
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::LabelResolver;

    fn tree() -> CategoryTree {
        let mut tree = CategoryTree::new();
        tree.insert("1", "Mineralische Baustoffe", None).unwrap();
        tree.insert("1.3", "Steine und Elemente", Some("1")).unwrap();
        tree.insert("1.3.13", "Gipsplatten", Some("1.3")).unwrap();
        tree.insert("1.3.02", "Ziegel", Some("1.3")).unwrap();
        tree.insert("2", "Dämmstoffe", None).unwrap();
        tree.insert("2.1", "Mineralwolle", Some("2")).unwrap();
        tree.resolve_labels(&LabelResolver::default());
        tree
    }

    fn entry(name: &str, definition: &str) -> ExternalEntry {
        ExternalEntry::new("EC000001", name, definition, "https://example.org/etim", None).unwrap()
    }

    #[test]
    fn test_tokenize_and_stem() {
        assert_eq!(tokenize("Gypsum Boards, for walls"), vec!["gypsum", "board", "wall"]);
        assert_eq!(stem("glasses"), "glass");
        assert_eq!(stem("batteries"), "battery");
        assert_eq!(stem("boxes"), "box");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("gas"), "gas");
    }

    #[test]
    fn test_best_candidate_first() {
        let tree = tree();
        let top = LexicalRetriever::new().top_k(&entry("Gypsum board", "Board of gypsum plaster"), &tree, 3);

        assert_eq!(top.len(), 3);
        assert_eq!(top[0].id(), "1.3.13");
    }

    #[test]
    fn test_zero_scores_fill_up_to_k() {
        let tree = tree();
        let top = LexicalRetriever::new().top_k(&entry("Xylophone", ""), &tree, 10);

        // Everything scores zero → all nodes in natural id order
        let ids: Vec<&str> = top.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec!["1", "1.3", "1.3.02", "1.3.13", "2", "2.1"]);
    }

    #[test]
    fn test_indexed_and_unindexed_agree() {
        let tree = tree();
        let e = entry("Mineral wool insulation", "Insulation material of stone wool");

        let plain: Vec<&str> = LexicalRetriever::new().top_k(&e, &tree, 6).iter().map(|c| c.id()).collect();
        let indexed: Vec<&str> = LexicalRetriever::for_tree(&tree).top_k(&e, &tree, 6).iter().map(|c| c.id()).collect();

        assert_eq!(plain, indexed);
        assert_eq!(plain[0], "2.1");
    }

    #[test]
    fn test_index_ignored_for_other_tree() {
        let mut unresolved = CategoryTree::new();
        unresolved.insert("1", "Holz", None).unwrap();
        unresolved.insert("2", "Stahl", None).unwrap();
        let mut resolved = unresolved.clone();
        resolved.resolve_labels(&LabelResolver::default());

        // Index built from German-only labels, queried with the resolved tree
        let stale = LexicalRetriever::for_tree(&unresolved);
        let e = entry("Steel", "");
        let indexed: Vec<&str> = stale.top_k(&e, &resolved, 1).iter().map(|c| c.id()).collect();
        let fresh: Vec<&str> = LexicalRetriever::new().top_k(&e, &resolved, 1).iter().map(|c| c.id()).collect();

        assert_eq!(fresh, vec!["2"]);
        assert_eq!(indexed, fresh);
    }

    #[test]
    fn test_ranked_exposes_scores() {
        let tree = tree();
        let ranked = LexicalRetriever::new().ranked(&entry("Mineral wool", ""), &tree);
        assert_eq!(ranked[0].id, "2.1");
        assert!(ranked[0].score > 0.0);
        assert_eq!(ranked.last().map(|c| c.score), Some(0.0));
    }
}
