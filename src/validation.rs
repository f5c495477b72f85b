// 🧪 Validation Harness - measure alignment quality against ground truth
//
// Workflow:
//   1. sample()                     → entries to annotate (stratified by score)
//   2. export_annotation_template() → JSON for a human annotator
//   3. load_ground_truth()          → annotated records only
//   4. score() / compare()          → accuracy per method, A/B recommendation
//
// Strata (on matcher confidence):
//   high    ≥ 0.8
//   medium  0.5 ≤ s < 0.8
//   low     < 0.5

use crate::alignment::{Correspondence, CorrespondenceSet};
use crate::retrieval::LexicalRetriever;
use crate::source::ExternalEntry;
use crate::taxonomy::CategoryTree;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const HIGH_THRESHOLD: f64 = 0.8;
pub const MEDIUM_THRESHOLD: f64 = 0.5;

/// Errors at or above this confidence are the dangerous ones
pub const DEFAULT_ERROR_SPLIT: f64 = 0.7;

/// Candidates listed per entry in the annotation template
pub const SUGGESTIONS_PER_ENTRY: usize = 5;

// ============================================================================
// SAMPLING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stratum {
    High,
    Medium,
    Low,
}

impl Stratum {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_THRESHOLD {
            Stratum::High
        } else if score >= MEDIUM_THRESHOLD {
            Stratum::Medium
        } else {
            Stratum::Low
        }
    }
}

#[derive(Debug, Clone)]
pub struct Sample<'e> {
    pub entries: Vec<&'e ExternalEntry>,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub stratified: bool,
}

impl Sample<'_> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ValidationHarness<R: Rng = StdRng> {
    rng: R,
}

impl ValidationHarness<StdRng> {
    /// Reproducible samples for a given seed
    pub fn seeded(seed: u64) -> Self {
        ValidationHarness::new(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        ValidationHarness::new(StdRng::from_entropy())
    }
}

impl<R: Rng> ValidationHarness<R> {
    pub fn new(rng: R) -> Self {
        ValidationHarness { rng }
    }

    /// Draw without replacement. Stratified: ⌊size/2⌋ high, ⌊size/3⌋ medium,
    /// the rest low (each capped by stratum population). Entries without a
    /// score are left out of stratified samples.
    pub fn sample<'e>(
        &mut self,
        entries: &'e [ExternalEntry],
        scores: &HashMap<String, f64>,
        size: usize,
        stratified: bool,
    ) -> Sample<'e> {
        if !stratified {
            let n = size.min(entries.len());
            let picked: Vec<&ExternalEntry> = entries.choose_multiple(&mut self.rng, n).collect();
            info!(sampled = picked.len(), population = entries.len(), "uniform sample drawn");
            return Sample {
                entries: picked,
                high: 0,
                medium: 0,
                low: 0,
                stratified: false,
            };
        }

        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();
        let mut unscored = 0usize;
        for entry in entries {
            match scores.get(entry.code()) {
                Some(&s) => match Stratum::from_score(s) {
                    Stratum::High => high.push(entry),
                    Stratum::Medium => medium.push(entry),
                    Stratum::Low => low.push(entry),
                },
                None => unscored += 1,
            }
        }
        if unscored > 0 {
            warn!("{} entries have no score and are excluded from stratified sampling", unscored);
        }
        info!(
            high = high.len(),
            medium = medium.len(),
            low = low.len(),
            "confidence distribution"
        );

        let n_high = high.len().min(size / 2);
        let n_medium = medium.len().min(size / 3);
        let n_low = low.len().min(size.saturating_sub(n_high + n_medium));

        let mut picked: Vec<&ExternalEntry> = Vec::with_capacity(n_high + n_medium + n_low);
        picked.extend(high.choose_multiple(&mut self.rng, n_high).copied());
        picked.extend(medium.choose_multiple(&mut self.rng, n_medium).copied());
        picked.extend(low.choose_multiple(&mut self.rng, n_low).copied());

        info!("sampled: {} high + {} medium + {} low = {}", n_high, n_medium, n_low, picked.len());

        Sample {
            entries: picked,
            high: n_high,
            medium: n_medium,
            low: n_low,
            stratified: true,
        }
    }
}

/// Code → confidence, for stratification
pub fn scores_from(set: &CorrespondenceSet) -> HashMap<String, f64> {
    set.iter().map(|c| (c.code().to_string(), c.confidence())).collect()
}

// ============================================================================
// ANNOTATION TEMPLATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedCandidate {
    pub id: String,
    pub name_de: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub path_en: String,
    pub score: f64,
}

/// One annotation record; the template ships with the correct_* fields empty
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub suggested_candidates: Vec<SuggestedCandidate>,
    #[serde(default, alias = "correct_oekobaudat_id")]
    pub correct_category_id: String,
    #[serde(default)]
    pub correct_category_name: String,
    /// "certain" | "likely" | "unclear" (empty until annotated)
    #[serde(default)]
    pub confidence_level: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub ambiguous: bool,
    #[serde(default)]
    pub annotator: String,
}

impl AnnotationRecord {
    pub fn is_annotated(&self) -> bool {
        !self.correct_category_id.trim().is_empty()
    }
}

/// Top retrieval candidates per entry, to help the annotator
pub fn suggest_candidates(
    retriever: &LexicalRetriever,
    entry: &ExternalEntry,
    tree: &CategoryTree,
    n: usize,
) -> Vec<SuggestedCandidate> {
    retriever
        .ranked(entry, tree)
        .into_iter()
        .take(n)
        .map(|scored| SuggestedCandidate {
            id: scored.id,
            name_de: scored.category.native_label().to_string(),
            name_en: scored.category.resolved_label().unwrap_or_default().to_string(),
            path_en: scored.category.resolved_path().unwrap_or_default().to_string(),
            score: (scored.score * 1000.0).round() / 1000.0,
        })
        .collect()
}

pub fn export_annotation_template(
    sample: &[&ExternalEntry],
    suggestions: &HashMap<String, Vec<SuggestedCandidate>>,
) -> Vec<AnnotationRecord> {
    sample
        .iter()
        .map(|entry| AnnotationRecord {
            code: entry.code().to_string(),
            name: entry.name().to_string(),
            definition: entry.definition().to_string(),
            uri: entry.uri().to_string(),
            suggested_candidates: suggestions.get(entry.code()).cloned().unwrap_or_default(),
            correct_category_id: String::new(),
            correct_category_name: String::new(),
            confidence_level: String::new(),
            notes: String::new(),
            ambiguous: false,
            annotator: String::new(),
        })
        .collect()
}

pub fn write_annotation_template<P: AsRef<Path>>(records: &[AnnotationRecord], path: P) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("Failed to serialize annotation template")?;
    fs::write(path.as_ref(), json)
        .with_context(|| format!("Failed to write annotation template: {:?}", path.as_ref()))?;
    info!(records = records.len(), "annotation template written to {:?}", path.as_ref());
    Ok(())
}

// ============================================================================
// GROUND TRUTH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotatorConfidence {
    Certain,
    Likely,
    Unclear,
}

impl std::str::FromStr for AnnotatorConfidence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "certain" => Ok(AnnotatorConfidence::Certain),
            "likely" => Ok(AnnotatorConfidence::Likely),
            "unclear" => Ok(AnnotatorConfidence::Unclear),
            other => bail!("unknown confidence_level '{}' (expected certain, likely or unclear)", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthRecord {
    pub code: String,
    pub correct_category_id: String,
    pub confidence_level: Option<AnnotatorConfidence>,
    pub ambiguous: bool,
    pub notes: String,
    pub annotator: String,
    pub correct_category_name: Option<String>,
}

impl GroundTruthRecord {
    pub fn new(code: &str, correct_category_id: &str) -> Self {
        GroundTruthRecord {
            code: code.to_string(),
            correct_category_id: correct_category_id.to_string(),
            confidence_level: None,
            ambiguous: false,
            notes: String::new(),
            annotator: String::new(),
            correct_category_name: None,
        }
    }

    fn from_annotation(record: AnnotationRecord) -> Result<Self> {
        let confidence_level = if record.confidence_level.trim().is_empty() {
            None
        } else {
            Some(
                record
                    .confidence_level
                    .parse()
                    .with_context(|| format!("Invalid annotation for {}", record.code))?,
            )
        };
        let name = record.correct_category_name.trim();

        Ok(GroundTruthRecord {
            code: record.code,
            correct_category_id: record.correct_category_id.trim().to_string(),
            confidence_level,
            ambiguous: record.ambiguous,
            notes: record.notes,
            annotator: record.annotator,
            correct_category_name: (!name.is_empty()).then(|| name.to_string()),
        })
    }
}

pub fn load_ground_truth<P: AsRef<Path>>(path: P) -> Result<Vec<GroundTruthRecord>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read ground truth: {:?}", path.as_ref()))?;
    parse_ground_truth(&content)
}

/// Annotated records only; unannotated ones are counted and skipped
pub fn parse_ground_truth(content: &str) -> Result<Vec<GroundTruthRecord>> {
    let records: Vec<AnnotationRecord> = serde_json::from_str(content).context("Failed to parse ground truth JSON")?;
    let total = records.len();

    let (annotated, unannotated): (Vec<_>, Vec<_>) = records.into_iter().partition(AnnotationRecord::is_annotated);
    if !unannotated.is_empty() {
        warn!(
            "{}/{} records not yet annotated; validating annotated records only",
            unannotated.len(),
            total
        );
    }

    annotated.into_iter().map(GroundTruthRecord::from_annotation).collect()
}

// ============================================================================
// SCORING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredError {
    pub code: String,
    pub predicted: String,
    pub actual: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodScore {
    pub method: String,
    pub correct: usize,
    /// Ground-truth codes present in the correspondence set
    pub evaluated: usize,
    pub accuracy: f64,
    pub errors: Vec<ScoredError>,
    /// evaluated / ground-truth size
    pub coverage: f64,
}

impl MethodScore {
    /// (below threshold, at or above threshold)
    pub fn errors_split(&self, threshold: f64) -> (Vec<&ScoredError>, Vec<&ScoredError>) {
        self.errors.iter().partition(|e| e.confidence < threshold)
    }

    pub fn summary(&self) -> String {
        let (low, high) = self.errors_split(DEFAULT_ERROR_SPLIT);
        format!(
            "{}: {}/{} correct ({:.1}%), coverage {:.1}%, errors <{:.1}: {}, errors ≥{:.1}: {}",
            self.method,
            self.correct,
            self.evaluated,
            self.accuracy * 100.0,
            self.coverage * 100.0,
            DEFAULT_ERROR_SPLIT,
            low.len(),
            DEFAULT_ERROR_SPLIT,
            high.len()
        )
    }
}

/// Score one correspondence set. The method tag comes from the set itself.
pub fn score(correspondences: &CorrespondenceSet, ground_truth: &[GroundTruthRecord]) -> MethodScore {
    let method = correspondences
        .iter()
        .next()
        .map(|c| c.method().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let predictions = correspondences.by_code();

    let mut correct = 0;
    let mut evaluated = 0;
    let mut errors = Vec::new();
    for truth in ground_truth {
        let Some(prediction) = predictions.get(truth.code.as_str()) else {
            continue;
        };
        evaluated += 1;
        if prediction.category().id == truth.correct_category_id {
            correct += 1;
        } else {
            errors.push(ScoredError {
                code: truth.code.clone(),
                predicted: prediction.category().id.clone(),
                actual: truth.correct_category_id.clone(),
                confidence: prediction.confidence(),
            });
        }
    }

    let accuracy = if evaluated == 0 {
        warn!(method = %method, "no ground-truth codes found in correspondence set");
        0.0
    } else {
        correct as f64 / evaluated as f64
    };
    let coverage = if ground_truth.is_empty() {
        0.0
    } else {
        evaluated as f64 / ground_truth.len() as f64
    };

    MethodScore {
        method,
        correct,
        evaluated,
        accuracy,
        errors,
        coverage,
    }
}

// ============================================================================
// METHOD COMPARISON
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// B is better by more than 10 points
    PreferB,
    /// B is better by 5-10 points: run A, fall back to B under the threshold
    Hybrid { threshold: f64 },
    /// Within ±5 points: keep the cheaper A
    Comparable,
    PreferA,
}

impl Recommendation {
    pub fn from_difference(difference: f64) -> Self {
        if difference > 0.10 {
            Recommendation::PreferB
        } else if difference > 0.05 {
            Recommendation::Hybrid {
                threshold: DEFAULT_ERROR_SPLIT,
            }
        } else if difference > -0.05 {
            Recommendation::Comparable
        } else {
            Recommendation::PreferA
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodComparison {
    pub method_a: String,
    pub method_b: String,
    pub both_correct: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub both_wrong: usize,
    /// accuracy(B) − accuracy(A)
    pub accuracy_difference: f64,
    pub recommendation: Recommendation,
}

impl MethodComparison {
    pub fn summary(&self) -> String {
        let advice = match &self.recommendation {
            Recommendation::PreferB => format!("use {} by default", self.method_b),
            Recommendation::Hybrid { threshold } => format!(
                "hybrid: {} first, {} when confidence < {:.1}",
                self.method_a, self.method_b, threshold
            ),
            Recommendation::Comparable => format!("comparable; use {} (cheaper)", self.method_a),
            Recommendation::PreferA => format!("use {}", self.method_a),
        };
        format!(
            "both correct {}, only {} {}, only {} {}, both wrong {}; difference {:+.1}pp → {}",
            self.both_correct,
            self.method_a,
            self.only_a,
            self.method_b,
            self.only_b,
            self.both_wrong,
            self.accuracy_difference * 100.0,
            advice
        )
    }
}

fn predicted_correctly(predictions: &BTreeMap<&str, &Correspondence>, truth: &GroundTruthRecord) -> bool {
    predictions
        .get(truth.code.as_str())
        .is_some_and(|c| c.category().id == truth.correct_category_id)
}

/// Agreement over every ground-truth code; a missing prediction counts as wrong.
pub fn compare(a: &CorrespondenceSet, b: &CorrespondenceSet, ground_truth: &[GroundTruthRecord]) -> MethodComparison {
    let score_a = score(a, ground_truth);
    let score_b = score(b, ground_truth);
    let pred_a = a.by_code();
    let pred_b = b.by_code();

    let (mut both_correct, mut only_a, mut only_b, mut both_wrong) = (0, 0, 0, 0);
    for truth in ground_truth {
        match (predicted_correctly(&pred_a, truth), predicted_correctly(&pred_b, truth)) {
            (true, true) => both_correct += 1,
            (true, false) => only_a += 1,
            (false, true) => only_b += 1,
            (false, false) => both_wrong += 1,
        }
    }

    let accuracy_difference = score_b.accuracy - score_a.accuracy;
    MethodComparison {
        method_a: score_a.method,
        method_b: score_b.method,
        both_correct,
        only_a,
        only_b,
        both_wrong,
        accuracy_difference,
        recommendation: Recommendation::from_difference(accuracy_difference),
    }
}

// ============================================================================
// SCORING REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringReport {
    pub validation_dataset: String,
    pub sample_size: usize,
    pub scores: Vec<MethodScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<MethodComparison>,
    pub generated_at: DateTime<Utc>,
}

impl ScoringReport {
    pub fn new(validation_dataset: &str, sample_size: usize) -> Self {
        ScoringReport {
            validation_dataset: validation_dataset.to_string(),
            sample_size,
            scores: Vec::new(),
            comparison: None,
            generated_at: Utc::now(),
        }
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize scoring report")?;
        fs::write(path.as_ref(), json).with_context(|| format!("Failed to write scoring report: {:?}", path.as_ref()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::{CategoryRef, EntryRef};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn entry(code: &str) -> ExternalEntry {
        ExternalEntry::new(code, &format!("Product {}", code), "", "https://example.org/etim", None).unwrap()
    }

    fn corr(code: &str, id: &str, confidence: f64, method: &str) -> Correspondence {
        Correspondence::restore(
            EntryRef {
                code: code.to_string(),
                name: code.to_string(),
                definition: String::new(),
                uri: format!("https://example.org/{}", code),
            },
            CategoryRef {
                id: id.to_string(),
                native_label: id.to_string(),
                native_path: id.to_string(),
            },
            confidence,
            String::new(),
            method.to_string(),
            None,
        )
        .unwrap()
    }

    /// 100 entries: 40 high, 30 medium, 30 low
    fn population() -> (Vec<ExternalEntry>, HashMap<String, f64>) {
        let entries: Vec<ExternalEntry> = (0..100).map(|i| entry(&format!("C{:03}", i))).collect();
        let scores = entries
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let s = if i < 40 {
                    0.85
                } else if i < 70 {
                    0.6
                } else {
                    0.2
                };
                (e.code().to_string(), s)
            })
            .collect();
        (entries, scores)
    }

    #[test]
    fn test_stratified_sample_counts() {
        let (entries, scores) = population();
        let sample = ValidationHarness::seeded(7).sample(&entries, &scores, 30, true);

        assert_eq!((sample.high, sample.medium, sample.low), (15, 10, 5));
        assert_eq!(sample.len(), 30);
        let unique: HashSet<&str> = sample.entries.iter().map(|e| e.code()).collect();
        assert_eq!(unique.len(), 30);
    }

    #[test]
    fn test_small_strata_fill_from_low() {
        let (entries, mut scores) = population();
        // Only 3 high entries left
        for i in 3..40 {
            scores.insert(format!("C{:03}", i), 0.1);
        }
        let sample = ValidationHarness::seeded(1).sample(&entries, &scores, 30, true);
        assert_eq!((sample.high, sample.medium, sample.low), (3, 10, 17));
    }

    #[test]
    fn test_unscored_entries_excluded() {
        let (entries, mut scores) = population();
        scores.retain(|code, _| code.as_str() < "C010");
        let sample = ValidationHarness::seeded(3).sample(&entries, &scores, 30, true);
        assert_eq!(sample.len(), 10);
        assert!(sample.entries.iter().all(|e| e.code() < "C010"));
    }

    #[test]
    fn test_uniform_sample() {
        let (entries, _) = population();
        let sample = ValidationHarness::seeded(5).sample(&entries, &HashMap::new(), 500, false);
        assert_eq!(sample.len(), 100);
        assert!(!sample.stratified);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let (entries, scores) = population();
        let a = ValidationHarness::seeded(42).sample(&entries, &scores, 20, true);
        let b = ValidationHarness::seeded(42).sample(&entries, &scores, 20, true);
        let codes = |s: &Sample| s.entries.iter().map(|e| e.code().to_string()).collect::<Vec<_>>();
        assert_eq!(codes(&a), codes(&b));
    }

    #[test]
    fn test_annotation_template_fields() {
        let e = entry("C1");
        let mut suggestions = HashMap::new();
        suggestions.insert(
            "C1".to_string(),
            vec![SuggestedCandidate {
                id: "1.3.13".to_string(),
                name_de: "Gipsplatten".to_string(),
                name_en: "Gypsum boards".to_string(),
                path_en: "Mineral building materials/Gypsum boards".to_string(),
                score: 2.5,
            }],
        );

        let records = export_annotation_template(&[&e], &suggestions);
        let value = serde_json::to_value(&records).unwrap();
        let first = &value[0];
        assert_eq!(first["code"], "C1");
        assert_eq!(first["suggested_candidates"][0]["id"], "1.3.13");
        assert_eq!(first["correct_category_id"], "");
        assert_eq!(first["confidence_level"], "");
        assert_eq!(first["ambiguous"], false);
        assert_eq!(first["annotator"], "");
    }

    #[test]
    fn test_ground_truth_skips_unannotated() {
        let content = r#"[
            {"code": "C1", "correct_category_id": "A.1", "confidence_level": "certain", "annotator": "kim"},
            {"code": "C2", "correct_oekobaudat_id": "A.2", "confidence_level": "", "ambiguous": true},
            {"code": "C3", "correct_category_id": "  "}
        ]"#;

        let truth = parse_ground_truth(content).unwrap();
        assert_eq!(truth.len(), 2);
        assert_eq!(truth[0].confidence_level, Some(AnnotatorConfidence::Certain));
        assert_eq!(truth[1].correct_category_id, "A.2");
        assert_eq!(truth[1].confidence_level, None);
        assert!(truth[1].ambiguous);
    }

    #[test]
    fn test_ground_truth_unknown_confidence_level() {
        let content = r#"[{"code": "C1", "correct_category_id": "A.1", "confidence_level": "maybe"}]"#;
        assert!(parse_ground_truth(content).is_err());
    }

    #[test]
    fn test_score_accuracy_and_errors() {
        let truth = vec![GroundTruthRecord::new("C1", "A.1"), GroundTruthRecord::new("C2", "A.2")];
        let set: CorrespondenceSet = vec![corr("C1", "A.1", 0.95, "llm-only"), corr("C2", "A.3", 0.8, "llm-only")]
            .into_iter()
            .collect();

        let result = score(&set, &truth);
        assert_eq!(result.method, "llm-only");
        assert_eq!(result.correct, 1);
        assert_eq!(result.evaluated, 2);
        assert!((result.accuracy - 0.5).abs() < 1e-9);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, "C2");
        assert_eq!(result.errors[0].predicted, "A.3");
        assert_eq!(result.errors[0].actual, "A.2");
        assert!((result.coverage - 1.0).abs() < 1e-9);

        let (low, high) = result.errors_split(DEFAULT_ERROR_SPLIT);
        assert!(low.is_empty());
        assert_eq!(high.len(), 1);
    }

    #[test]
    fn test_score_without_overlap() {
        let truth = vec![GroundTruthRecord::new("C9", "A")];
        let set: CorrespondenceSet = vec![corr("C1", "A", 0.9, "lexical")].into_iter().collect();
        let result = score(&set, &truth);
        assert_eq!(result.evaluated, 0);
        assert_eq!(result.accuracy, 0.0);
        assert_eq!(result.coverage, 0.0);
    }

    #[test]
    fn test_compare_methods() {
        let truth: Vec<GroundTruthRecord> = (0..10).map(|i| GroundTruthRecord::new(&format!("C{}", i), "A")).collect();

        // A: 6 correct, B: 8 correct (C0..C5 both, C6,C7 only B)
        let a: CorrespondenceSet = (0..10)
            .map(|i| corr(&format!("C{}", i), if i < 6 { "A" } else { "X" }, 0.8, "lexical"))
            .collect();
        let b: CorrespondenceSet = (0..10)
            .map(|i| corr(&format!("C{}", i), if i < 8 { "A" } else { "X" }, 0.8, "llm-only"))
            .collect();

        let cmp = compare(&a, &b, &truth);
        assert_eq!(cmp.both_correct, 6);
        assert_eq!(cmp.only_a, 0);
        assert_eq!(cmp.only_b, 2);
        assert_eq!(cmp.both_wrong, 2);
        assert!((cmp.accuracy_difference - 0.2).abs() < 1e-9);
        assert_eq!(cmp.recommendation, Recommendation::PreferB);
        assert!(cmp.summary().contains("use llm-only by default"));
    }

    #[test]
    fn test_recommendation_bands() {
        assert_eq!(Recommendation::from_difference(0.11), Recommendation::PreferB);
        assert_eq!(Recommendation::from_difference(0.07), Recommendation::Hybrid { threshold: 0.7 });
        assert_eq!(Recommendation::from_difference(0.0), Recommendation::Comparable);
        assert_eq!(Recommendation::from_difference(-0.04), Recommendation::Comparable);
        assert_eq!(Recommendation::from_difference(-0.2), Recommendation::PreferA);
    }

    #[test]
    fn test_scoring_report_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        let mut report = ScoringReport::new("annotations.json", 2);
        report.scores.push(score(&CorrespondenceSet::new(), &[]));
        report.write_json(&path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["validation_dataset"], "annotations.json");
        assert_eq!(value["scores"][0]["method"], "unknown");
        assert!(value.get("comparison").is_none());
    }

    proptest! {
        #[test]
        fn prop_stratified_sample_bounds(seed in any::<u64>(), size in 0usize..60) {
            let (entries, scores) = population();
            let sample = ValidationHarness::seeded(seed).sample(&entries, &scores, size, true);

            prop_assert!(sample.high <= size / 2);
            prop_assert!(sample.medium <= size / 3);
            prop_assert!(sample.len() <= size);
            prop_assert_eq!(sample.len(), sample.high + sample.medium + sample.low);

            let unique: HashSet<&str> = sample.entries.iter().map(|e| e.code()).collect();
            prop_assert_eq!(unique.len(), sample.len());

            for (i, e) in sample.entries.iter().enumerate() {
                let expected = if i < sample.high {
                    Stratum::High
                } else if i < sample.high + sample.medium {
                    Stratum::Medium
                } else {
                    Stratum::Low
                };
                prop_assert_eq!(Stratum::from_score(scores[e.code()]), expected);
            }
        }
    }
}
