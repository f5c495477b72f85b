// Taxonomy Alignment - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod config;
pub mod taxonomy;   // Category tree, ingestion, label resolution
pub mod graph;      // RDF projection + Turtle / N-Triples
pub mod source;     // External classification entries
pub mod retrieval;  // Top-K candidate retrieval
pub mod matcher;    // Lexical / LLM / stub matchers
pub mod alignment;  // Banding + engine
pub mod report;     // JSON / CSV reports
pub mod validation; // Sampling + ground-truth scoring
pub mod db;         // SQLite run store

// Re-export commonly used types
pub use error::{ConfigError, GraphError, IngestError, MatchError, SourceError};
pub use config::{AlignConfig, LlmConfig, MatcherKind};
pub use taxonomy::{
    compare_ids, Category, CategoryTree, LabelResolver, TaxonomyIngester, TranslationCache, TranslationRecord,
};
pub use graph::{CorrespondenceGraphBuilder, Namespaces, RdfGraph, TaxonomyGraphBuilder, Term, Triple};
pub use source::{ExternalClassSource, ExternalEntry, InMemorySource, LocalDictionarySource};
pub use retrieval::{CandidateRetriever, LexicalRetriever, ScoredCandidate};
pub use matcher::{LexicalMatcher, MatchOutcome, MatchRule, Matcher, StubMatcher, MAX_CANDIDATES};
pub use alignment::{
    AlignmentEngine, AlignmentRun, Correspondence, CorrespondenceSet, MatchFailure, MatchType, RunStats,
};
pub use validation::{
    compare, load_ground_truth, score, GroundTruthRecord, MethodComparison, MethodScore, Recommendation,
    ScoringReport, ValidationHarness,
};
pub use db::{get_correspondences, get_events_for_entity, get_runs, insert_run, open_store, setup_database, Event};

#[cfg(feature = "remote")]
pub use matcher::LlmMatcher;
#[cfg(feature = "remote")]
pub use source::BsddClient;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
