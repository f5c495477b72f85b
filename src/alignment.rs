// ⚖️ Alignment Engine - retrieval + matching + banding for every entry
//
// "Confidence is the VALUE, match type is DERIVED"
//
// For each external entry:
//   1. retrieve top-K candidate categories (K ≤ MAX_CANDIDATES)
//   2. ask the matcher for (selected id, confidence, rationale)
//   3. reject answers outside the candidate list, outside [0, 1], or late
//   4. band the confidence and append a Correspondence
//
// A MatchError skips the entry (logged + recorded); the run continues.

use crate::config::AlignConfig;
use crate::error::MatchError;
use crate::matcher::{MatchOutcome, Matcher, MAX_CANDIDATES};
use crate::retrieval::CandidateRetriever;
use crate::source::ExternalEntry;
use crate::taxonomy::{Category, CategoryTree};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const EXACT_THRESHOLD: f64 = 0.90;
pub const CLOSE_THRESHOLD: f64 = 0.70;
pub const RELATED_THRESHOLD: f64 = 0.50;

// ============================================================================
// MATCH TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "exactMatch")]
    Exact,
    #[serde(rename = "closeMatch")]
    Close,
    #[serde(rename = "relatedMatch")]
    Related,
    #[serde(rename = "noMatch")]
    None,
}

impl MatchType {
    /// The banding policy. Single source of truth for every correspondence.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= EXACT_THRESHOLD {
            MatchType::Exact
        } else if confidence >= CLOSE_THRESHOLD {
            MatchType::Close
        } else if confidence >= RELATED_THRESHOLD {
            MatchType::Related
        } else {
            MatchType::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exactMatch",
            MatchType::Close => "closeMatch",
            MatchType::Related => "relatedMatch",
            MatchType::None => "noMatch",
        }
    }

    /// Parse a band label as matchers write it ("closeMatch", "close", "related")
    pub fn from_skos_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "exactmatch" | "exact" => Some(MatchType::Exact),
            "closematch" | "close" => Some(MatchType::Close),
            "relatedmatch" | "related" => Some(MatchType::Related),
            "nomatch" | "none" => Some(MatchType::None),
            _ => None,
        }
    }

    pub fn all() -> [MatchType; 4] {
        [MatchType::Exact, MatchType::Close, MatchType::Related, MatchType::None]
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CORRESPONDENCE
// ============================================================================

/// Snapshot of the external entry a correspondence was made for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRef {
    pub code: String,
    pub name: String,
    pub definition: String,
    pub uri: String,
}

impl From<&ExternalEntry> for EntryRef {
    fn from(entry: &ExternalEntry) -> Self {
        EntryRef {
            code: entry.code().to_string(),
            name: entry.name().to_string(),
            definition: entry.definition().to_string(),
            uri: entry.uri().to_string(),
        }
    }
}

/// Snapshot of the selected category (kept even for the none band)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub native_label: String,
    pub native_path: String,
}

impl From<&Category> for CategoryRef {
    fn from(category: &Category) -> Self {
        CategoryRef {
            id: category.id().to_string(),
            native_label: category.native_label().to_string(),
            native_path: category.native_path().to_string(),
        }
    }
}

/// One entry ↔ category link. No setter for the band: it always follows
/// the confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correspondence {
    entry: EntryRef,
    category: CategoryRef,
    match_type: MatchType,
    confidence: f64,
    rationale: String,
    method: String,
    proposed_band: Option<MatchType>,
}

impl Correspondence {
    /// Confidence must already be checked to lie in [0, 1]
    pub(crate) fn new(entry: &ExternalEntry, category: &Category, outcome: MatchOutcome, method: &str) -> Self {
        Correspondence {
            entry: EntryRef::from(entry),
            category: CategoryRef::from(category),
            match_type: MatchType::from_confidence(outcome.confidence),
            confidence: outcome.confidence,
            rationale: outcome.rationale,
            method: method.to_string(),
            proposed_band: outcome.proposed_band,
        }
    }

    /// Rebuild a correspondence read back from a report
    pub fn restore(
        entry: EntryRef,
        category: CategoryRef,
        confidence: f64,
        rationale: String,
        method: String,
        proposed_band: Option<MatchType>,
    ) -> Result<Self, MatchError> {
        check_confidence(confidence)?;
        Ok(Correspondence {
            entry,
            category,
            match_type: MatchType::from_confidence(confidence),
            confidence,
            rationale,
            method,
            proposed_band,
        })
    }

    pub fn entry(&self) -> &EntryRef {
        &self.entry
    }

    pub fn code(&self) -> &str {
        &self.entry.code
    }

    pub fn category(&self) -> &CategoryRef {
        &self.category
    }

    pub fn match_type(&self) -> MatchType {
        self.match_type
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn proposed_band(&self) -> Option<MatchType> {
        self.proposed_band
    }
}

fn check_confidence(confidence: f64) -> Result<(), MatchError> {
    if confidence.is_nan() || !(0.0..=1.0).contains(&confidence) {
        return Err(MatchError::InvalidConfidence(confidence));
    }
    Ok(())
}

// ============================================================================
// CORRESPONDENCE SET
// ============================================================================

/// Append-only collection of one run's correspondences, in input order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrespondenceSet {
    items: Vec<Correspondence>,
}

impl CorrespondenceSet {
    pub fn new() -> Self {
        CorrespondenceSet::default()
    }

    pub fn push(&mut self, correspondence: Correspondence) {
        self.items.push(correspondence);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Correspondence> {
        self.items.iter()
    }

    pub fn get(&self, code: &str) -> Option<&Correspondence> {
        self.items.iter().find(|c| c.code() == code)
    }

    /// Code → correspondence (last one wins if a code repeats)
    pub fn by_code(&self) -> BTreeMap<&str, &Correspondence> {
        self.items.iter().map(|c| (c.code(), c)).collect()
    }

    /// SHA-256 over (code, category id, confidence, band) in code order.
    /// Equal fingerprints ⇔ equal alignment outcome, whatever the run order.
    pub fn fingerprint(&self) -> String {
        let mut rows: Vec<&Correspondence> = self.items.iter().collect();
        rows.sort_by(|a, b| a.code().cmp(b.code()).then_with(|| a.category.id.cmp(&b.category.id)));

        let mut hasher = Sha256::new();
        for c in rows {
            hasher.update(c.code().as_bytes());
            hasher.update(b"\t");
            hasher.update(c.category.id.as_bytes());
            hasher.update(b"\t");
            hasher.update(c.confidence.to_bits().to_be_bytes());
            hasher.update(b"\t");
            hasher.update(c.match_type.as_str().as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

impl FromIterator<Correspondence> for CorrespondenceSet {
    fn from_iter<I: IntoIterator<Item = Correspondence>>(iter: I) -> Self {
        CorrespondenceSet {
            items: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a CorrespondenceSet {
    type Item = &'a Correspondence;
    type IntoIter = std::slice::Iter<'a, Correspondence>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

// ============================================================================
// RUN RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchFailure {
    pub code: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub matched: usize,
    pub failed: usize,
    /// Band label → count (all four bands present)
    pub distribution: BTreeMap<String, usize>,
    pub mean_confidence: f64,
}

impl RunStats {
    pub fn compute(set: &CorrespondenceSet, failures: &[MatchFailure]) -> Self {
        let mut distribution: BTreeMap<String, usize> =
            MatchType::all().iter().map(|t| (t.as_str().to_string(), 0)).collect();
        for c in set.iter() {
            *distribution.entry(c.match_type().as_str().to_string()).or_insert(0) += 1;
        }

        let mean_confidence = if set.is_empty() {
            0.0
        } else {
            set.iter().map(Correspondence::confidence).sum::<f64>() / set.len() as f64
        };

        RunStats {
            processed: set.len() + failures.len(),
            matched: set.len(),
            failed: failures.len(),
            distribution,
            mean_confidence,
        }
    }

    pub fn count(&self, band: MatchType) -> usize {
        self.distribution.get(band.as_str()).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AlignmentRun {
    pub run_id: String,
    pub method: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub correspondences: CorrespondenceSet,
    pub failures: Vec<MatchFailure>,
    pub stats: RunStats,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AlignmentEngine<'t> {
    tree: &'t CategoryTree,
    retriever: Box<dyn CandidateRetriever + 't>,
    matcher: Box<dyn Matcher>,
    top_k: usize,
    throttle: Duration,
    timeout: Duration,
    workers: usize,
}

impl<'t> AlignmentEngine<'t> {
    /// Engine with K = MAX_CANDIDATES, no throttle, 30 s timeout, one worker
    pub fn new(tree: &'t CategoryTree, retriever: Box<dyn CandidateRetriever + 't>, matcher: Box<dyn Matcher>) -> Self {
        AlignmentEngine {
            tree,
            retriever,
            matcher,
            top_k: MAX_CANDIDATES,
            throttle: Duration::ZERO,
            timeout: Duration::from_secs(30),
            workers: 1,
        }
    }

    pub fn from_config(
        tree: &'t CategoryTree,
        retriever: Box<dyn CandidateRetriever + 't>,
        matcher: Box<dyn Matcher>,
        config: &AlignConfig,
    ) -> Self {
        Self::new(tree, retriever, matcher)
            .with_top_k(config.effective_top_k())
            .with_throttle(config.throttle())
            .with_timeout(config.timeout())
            .with_workers(config.workers)
    }

    /// Clamped to 1..=MAX_CANDIDATES
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k.clamp(1, MAX_CANDIDATES);
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn method(&self) -> &str {
        self.matcher.method()
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Match one entry against the given candidates and band the result.
    pub fn align(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Result<Correspondence, MatchError> {
        if candidates.is_empty() {
            return Err(MatchError::NoCandidates(entry.code().to_string()));
        }
        let candidates = &candidates[..candidates.len().min(MAX_CANDIDATES)];

        let started = Instant::now();
        let outcome = self.matcher.match_entry(entry, candidates)?;
        let elapsed = started.elapsed();
        if elapsed > self.timeout {
            return Err(MatchError::Timeout(elapsed.as_millis()));
        }

        check_confidence(outcome.confidence)?;

        let category = candidates
            .iter()
            .find(|c| c.id() == outcome.selected_id)
            .ok_or_else(|| MatchError::UnknownCandidate {
                selected: outcome.selected_id.clone(),
            })?;

        // Candidates normally come from this tree; anything else is an error too
        if !self.tree.contains(category.id()) {
            return Err(MatchError::UnknownCandidate {
                selected: outcome.selected_id.clone(),
            });
        }

        Ok(Correspondence::new(entry, category, outcome, self.matcher.method()))
    }

    /// Retrieve candidates for one entry, then align.
    pub fn process(&self, entry: &ExternalEntry) -> Result<Correspondence, MatchError> {
        let candidates = self.retriever.top_k(entry, self.tree, self.top_k);
        self.align(entry, &candidates)
    }

    /// Process every entry. Output order is input order, whatever the
    /// worker count.
    pub fn run(&self, entries: &[ExternalEntry]) -> AlignmentRun {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            entries = entries.len(),
            method = self.method(),
            workers = self.workers,
            top_k = self.top_k,
            "alignment run started"
        );

        let results = if self.workers <= 1 || entries.len() < 2 {
            self.run_slice(entries, 0, entries.len())
        } else {
            self.run_pool(entries)
        };

        let mut correspondences = CorrespondenceSet::new();
        let mut failures = Vec::new();
        for (entry, result) in entries.iter().zip(results) {
            match result {
                Ok(c) => correspondences.push(c),
                Err(e) => failures.push(MatchFailure {
                    code: entry.code().to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        let stats = RunStats::compute(&correspondences, &failures);
        let finished_at = Utc::now();
        info!(
            run_id = %run_id,
            matched = stats.matched,
            failed = stats.failed,
            exact = stats.count(MatchType::Exact),
            close = stats.count(MatchType::Close),
            related = stats.count(MatchType::Related),
            none = stats.count(MatchType::None),
            mean_confidence = stats.mean_confidence,
            "alignment run finished"
        );

        AlignmentRun {
            run_id,
            method: self.method().to_string(),
            started_at,
            finished_at,
            correspondences,
            failures,
            stats,
        }
    }

    /// Sequential pass over a slice; `offset`/`total` only feed progress logs.
    fn run_slice(&self, entries: &[ExternalEntry], offset: usize, total: usize) -> Vec<Result<Correspondence, MatchError>> {
        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                if i > 0 && !self.throttle.is_zero() {
                    std::thread::sleep(self.throttle);
                }
                let result = self.process(entry);
                match &result {
                    Ok(c) => debug!(
                        code = entry.code(),
                        selected = %c.category().id,
                        confidence = c.confidence(),
                        band = %c.match_type(),
                        "aligned"
                    ),
                    Err(e) => warn!(code = entry.code(), "skipping entry: {}", e),
                }
                let done = offset + i + 1;
                if done % 50 == 0 {
                    info!("progress: {}/{}", done, total);
                }
                result
            })
            .collect()
    }

    /// Fixed pool of scoped threads over contiguous partitions.
    fn run_pool(&self, entries: &[ExternalEntry]) -> Vec<Result<Correspondence, MatchError>> {
        let chunk_size = (entries.len() + self.workers - 1) / self.workers;
        let total = entries.len();

        std::thread::scope(|scope| {
            let handles: Vec<_> = entries
                .chunks(chunk_size)
                .enumerate()
                .map(|(n, chunk)| scope.spawn(move || self.run_slice(chunk, n * chunk_size, total)))
                .collect();

            // Joined in spawn order, so partitions concatenate back to input order
            let mut results = Vec::with_capacity(total);
            for handle in handles {
                match handle.join() {
                    Ok(part) => results.extend(part),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            results
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
