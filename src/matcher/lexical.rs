// 🏷️ Lexical Matcher - Rules as Data, then token similarity
//
// 1. Rules (sorted by priority, higher first): the first rule whose pattern
//    matches the entry and whose category is among the candidates wins,
//    with the rule's confidence.
// 2. Otherwise: best Dice overlap between the entry name and each candidate's
//    resolved label, topped up by how much of the name the path covers.

use super::{MatchOutcome, Matcher};
use crate::error::MatchError;
use crate::retrieval::tokenize;
use crate::source::ExternalEntry;
use crate::taxonomy::Category;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::debug;

const LABEL_SHARE: f64 = 0.75;
const PATH_SHARE: f64 = 0.25;

// ============================================================================
// RULE DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRule {
    /// Rule ID for tracking
    pub id: String,

    /// Pattern matched against entry name and code (supports wildcards with *)
    pub pattern: String,

    /// Category to select
    pub category_id: String,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,

    /// Description/notes about this rule
    pub description: Option<String>,

    /// Priority (higher = applied first)
    #[serde(default)]
    pub priority: i32,
}

impl MatchRule {
    /// Case-insensitive; without '*' the pattern may appear anywhere
    pub fn matches(&self, text: &str) -> bool {
        let pattern = self.pattern.to_lowercase();
        let text = text.to_lowercase();

        if !pattern.contains('*') {
            return text.contains(&pattern);
        }

        let parts: Vec<&str> = pattern.split('*').collect();
        let (first, last) = (parts[0], parts[parts.len() - 1]);

        if !text.starts_with(first) {
            return false;
        }
        if !text[first.len()..].ends_with(last) {
            return false;
        }

        // Middle parts must appear in order between prefix and suffix
        let end = text.len() - last.len();
        let mut pos = first.len();
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            match text[pos..end.max(pos)].find(part) {
                Some(found) => pos += found + part.len(),
                None => return false,
            }
        }

        true
    }

    fn applies_to(&self, entry: &ExternalEntry) -> bool {
        self.matches(entry.name()) || self.matches(entry.code())
    }
}

// ============================================================================
// LEXICAL MATCHER
// ============================================================================

#[derive(Debug, Default)]
pub struct LexicalMatcher {
    rules: Vec<MatchRule>,
}

impl LexicalMatcher {
    /// Matcher without rules (token similarity only)
    pub fn new() -> Self {
        LexicalMatcher { rules: Vec::new() }
    }

    /// Load rules from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: Vec<MatchRule> = serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        Ok(LexicalMatcher::from_rules(rules))
    }

    pub fn from_rules(mut rules: Vec<MatchRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        LexicalMatcher { rules }
    }

    pub fn add_rule(&mut self, rule: MatchRule) {
        self.rules.push(rule);
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn match_by_rule(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Option<MatchOutcome> {
        self.rules
            .iter()
            .filter(|rule| rule.applies_to(entry))
            .find(|rule| candidates.iter().any(|c| c.id() == rule.category_id))
            .map(|rule| {
                let rationale = match &rule.description {
                    Some(desc) => format!("rule {}: {}", rule.id, desc),
                    None => format!("rule {} matched pattern '{}'", rule.id, rule.pattern),
                };
                MatchOutcome::new(&rule.category_id, rule.confidence.clamp(0.0, 1.0), &rationale)
            })
    }
}

/// Dice coefficient of two token sets (0 when both are empty)
fn dice(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    2.0 * a.intersection(b).count() as f64 / (a.len() + b.len()) as f64
}

/// Share of `a` found in `b`
fn coverage(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    a.intersection(b).count() as f64 / a.len() as f64
}

impl Matcher for LexicalMatcher {
    fn method(&self) -> &str {
        "lexical"
    }

    fn match_entry(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Result<MatchOutcome, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::NoCandidates(entry.code().to_string()));
        }

        if let Some(outcome) = self.match_by_rule(entry, candidates) {
            debug!(code = entry.code(), selected = %outcome.selected_id, "rule match");
            return Ok(outcome);
        }

        let name: HashSet<String> = tokenize(entry.name()).into_iter().collect();

        // Strictly greater keeps the earliest (best-retrieved) candidate on ties
        let mut best: Option<(&Category, f64, f64, f64)> = None;
        for candidate in candidates {
            let label: HashSet<String> = tokenize(candidate.display_label()).into_iter().collect();
            let path: HashSet<String> =
                tokenize(candidate.resolved_path().unwrap_or(candidate.native_path())).into_iter().collect();

            let label_sim = dice(&name, &label);
            let path_sim = coverage(&name, &path);
            let confidence = (LABEL_SHARE * label_sim + PATH_SHARE * path_sim).clamp(0.0, 1.0);

            if best.map_or(true, |(_, c, _, _)| confidence > c) {
                best = Some((candidate, confidence, label_sim, path_sim));
            }
        }

        let (category, confidence, label_sim, path_sim) = match best {
            Some(b) => b,
            None => return Err(MatchError::NoCandidates(entry.code().to_string())),
        };

        let rationale = if confidence == 0.0 {
            "no lexical overlap with any candidate; kept best-retrieved candidate".to_string()
        } else {
            format!(
                "token overlap with '{}' (label {:.2}, path {:.2})",
                category.display_label(),
                label_sim,
                path_sim
            )
        };

        Ok(MatchOutcome::new(category.id(), confidence, &rationale))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{CategoryTree, LabelResolver};

    fn rule(id: &str, pattern: &str, category_id: &str, confidence: f64, priority: i32) -> MatchRule {
        MatchRule {
            id: id.to_string(),
            pattern: pattern.to_string(),
            category_id: category_id.to_string(),
            confidence,
            description: None,
            priority,
        }
    }

    fn tree() -> CategoryTree {
        let mut tree = CategoryTree::new();
        tree.insert("1", "Mineralische Baustoffe", None).unwrap();
        tree.insert("1.3", "Steine und Elemente", Some("1")).unwrap();
        tree.insert("1.3.13", "Gipsplatten", Some("1.3")).unwrap();
        tree.insert("2", "Dämmstoffe", None).unwrap();
        tree.insert("2.1", "Mineralwolle", Some("2")).unwrap();
        tree.resolve_labels(&LabelResolver::default());
        tree
    }

    fn entry(code: &str, name: &str) -> ExternalEntry {
        ExternalEntry::new(code, name, "", "https://example.org/etim", None).unwrap()
    }

    #[test]
    fn test_exact_pattern_match() {
        let r = rule("r1", "GYPSUM", "1.3.13", 0.95, 0);
        assert!(r.matches("Gypsum board"));
        assert!(r.matches("fibre gypsum"));
        assert!(!r.matches("Brick"));
    }

    #[test]
    fn test_wildcard_pattern() {
        let r = rule("r2", "mineral*wool", "2.1", 0.9, 0);
        assert!(r.matches("Mineral wool"));
        assert!(r.matches("mineral glass wool"));
        assert!(!r.matches("glass wool mineral"));

        let prefix = rule("r3", "EC00*", "2.1", 0.9, 0);
        assert!(prefix.matches("EC000123"));
        assert!(!prefix.matches("XEC00"));

        let middle = rule("r4", "a*b*c", "2.1", 0.9, 0);
        assert!(middle.matches("a-b-c"));
        assert!(!middle.matches("ac"));
    }

    #[test]
    fn test_rule_priority_and_candidate_check() {
        let tree = tree();
        let candidates: Vec<&Category> = vec![tree.get("1.3.13").unwrap(), tree.get("2.1").unwrap()];

        let matcher = LexicalMatcher::from_rules(vec![
            rule("low", "board", "1.3.13", 0.8, 1),
            rule("high", "board", "2.1", 0.6, 10),
            // Category not among candidates: skipped
            rule("absent", "board", "9.9", 1.0, 100),
        ]);

        let outcome = matcher.match_entry(&entry("EC1", "Insulation board"), &candidates).unwrap();
        assert_eq!(outcome.selected_id, "2.1");
        assert_eq!(outcome.confidence, 0.6);
        assert!(outcome.rationale.starts_with("rule high"));
    }

    #[test]
    fn test_token_similarity_exact_label() {
        let tree = tree();
        let candidates: Vec<&Category> = vec![tree.get("2.1").unwrap(), tree.get("1.3.13").unwrap()];

        let outcome = LexicalMatcher::new()
            .match_entry(&entry("EC1", "Gypsum boards"), &candidates)
            .unwrap();
        assert_eq!(outcome.selected_id, "1.3.13");
        assert!((outcome.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_overlap_keeps_first_candidate() {
        let tree = tree();
        let candidates: Vec<&Category> = vec![tree.get("2.1").unwrap(), tree.get("1.3.13").unwrap()];

        let outcome = LexicalMatcher::new().match_entry(&entry("EC1", "Xylophone"), &candidates).unwrap();
        assert_eq!(outcome.selected_id, "2.1");
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(
            LexicalMatcher::new().match_entry(&entry("EC1", "x"), &[]).unwrap_err(),
            MatchError::NoCandidates("EC1".to_string())
        );
    }

    #[test]
    fn test_rules_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        fs::write(
            &path,
            r#"[{"id": "gips", "pattern": "gypsum*", "category_id": "1.3.13", "confidence": 0.92, "description": "plasterboard"}]"#,
        )
        .unwrap();

        let matcher = LexicalMatcher::from_file(&path).unwrap();
        assert_eq!(matcher.rule_count(), 1);
    }
}
