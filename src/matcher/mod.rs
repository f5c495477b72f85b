// 🎯 Matchers - pick one candidate category for an external entry
//
// A matcher sees one entry and at most MAX_CANDIDATES categories and
// returns the selected identifier, a raw confidence and a rationale.
// It never decides the match band: the engine derives that from the
// confidence. A band the matcher proposes is kept as metadata only.

pub mod lexical;
#[cfg(feature = "remote")]
pub mod llm;

pub use lexical::{LexicalMatcher, MatchRule};
#[cfg(feature = "remote")]
pub use llm::LlmMatcher;

use crate::alignment::MatchType;
use crate::error::MatchError;
use crate::source::ExternalEntry;
use crate::taxonomy::Category;
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on candidates handed to a matcher
pub const MAX_CANDIDATES: usize = 10;

// ============================================================================
// MATCH OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub selected_id: String,
    pub confidence: f64,
    pub rationale: String,
    /// Advisory only, never used for banding
    pub proposed_band: Option<MatchType>,
}

impl MatchOutcome {
    pub fn new(selected_id: &str, confidence: f64, rationale: &str) -> Self {
        MatchOutcome {
            selected_id: selected_id.to_string(),
            confidence,
            rationale: rationale.to_string(),
            proposed_band: None,
        }
    }

    pub fn with_proposed_band(mut self, band: MatchType) -> Self {
        self.proposed_band = Some(band);
        self
    }
}

// ============================================================================
// MATCHER TRAIT
// ============================================================================

pub trait Matcher: Send + Sync {
    /// Method tag recorded on every correspondence ("lexical", "llm-only", ...)
    fn method(&self) -> &str;

    fn match_entry(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Result<MatchOutcome, MatchError>;
}

// ============================================================================
// STUB MATCHER (deterministic, for tests and dry runs)
// ============================================================================

#[derive(Debug, Clone)]
enum StubStrategy {
    /// First candidate with a fixed confidence
    First(f64),
    /// Always the same id, whether or not it is a candidate
    Fixed { id: String, confidence: f64 },
    /// Per entry code; codes not listed fall back to First(0.0)
    Table(HashMap<String, (String, f64)>),
    /// Always fail
    Fail(MatchError),
}

#[derive(Debug, Clone)]
pub struct StubMatcher {
    strategy: StubStrategy,
    proposed_band: Option<MatchType>,
    delay: Option<Duration>,
}

impl StubMatcher {
    fn with_strategy(strategy: StubStrategy) -> Self {
        StubMatcher {
            strategy,
            proposed_band: None,
            delay: None,
        }
    }

    pub fn first_candidate(confidence: f64) -> Self {
        Self::with_strategy(StubStrategy::First(confidence))
    }

    pub fn fixed(id: &str, confidence: f64) -> Self {
        Self::with_strategy(StubStrategy::Fixed {
            id: id.to_string(),
            confidence,
        })
    }

    pub fn table(answers: &[(&str, &str, f64)]) -> Self {
        Self::with_strategy(StubStrategy::Table(
            answers
                .iter()
                .map(|(code, id, conf)| (code.to_string(), (id.to_string(), *conf)))
                .collect(),
        ))
    }

    pub fn failing(error: MatchError) -> Self {
        Self::with_strategy(StubStrategy::Fail(error))
    }

    pub fn proposing(mut self, band: MatchType) -> Self {
        self.proposed_band = Some(band);
        self
    }

    /// Sleep before answering (exercises the engine's timeout check)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Matcher for StubMatcher {
    fn method(&self) -> &str {
        "stub"
    }

    fn match_entry(&self, entry: &ExternalEntry, candidates: &[&Category]) -> Result<MatchOutcome, MatchError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let first = || {
            candidates
                .first()
                .map(|c| c.id().to_string())
                .ok_or_else(|| MatchError::NoCandidates(entry.code().to_string()))
        };

        let (id, confidence) = match &self.strategy {
            StubStrategy::First(conf) => (first()?, *conf),
            StubStrategy::Fixed { id, confidence } => (id.clone(), *confidence),
            StubStrategy::Table(answers) => match answers.get(entry.code()) {
                Some((id, conf)) => (id.clone(), *conf),
                None => (first()?, 0.0),
            },
            StubStrategy::Fail(error) => return Err(error.clone()),
        };

        let mut outcome = MatchOutcome::new(&id, confidence, "stub answer");
        outcome.proposed_band = self.proposed_band;
        Ok(outcome)
    }
}
