// ⚠️ Error Types - one enum per failure domain
//
// Ingest and config errors are fatal for a run.
// Match errors are entry-local: the engine logs them and moves on.

use thiserror::Error;

// ============================================================================
// INGEST ERRORS (fatal)
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("malformed taxonomy source: {0}")]
    Malformed(String),

    #[error("category at {location} has no identifier")]
    MissingIdentifier { location: String },

    #[error("category '{id}' has no label")]
    MissingLabel { id: String },

    #[error("duplicate category identifier '{0}'")]
    DuplicateIdentifier(String),

    #[error("category '{child}' declares unknown parent '{parent}'")]
    UnknownParent { child: String, parent: String },

    #[error("category '{id}' exceeds maximum depth {max_depth}")]
    TooDeep { id: String, max_depth: usize },

    #[error("taxonomy structure is not a forest: {0}")]
    NotAForest(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

// ============================================================================
// GRAPH ERRORS (reading an exported graph back)
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("N-Triples line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("blank nodes are not supported (line {0})")]
    BlankNode(usize),
}

// ============================================================================
// MATCH ERRORS (entry-local, skip-and-continue)
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchError {
    #[error("no candidates supplied for '{0}'")]
    NoCandidates(String),

    #[error("selected category '{selected}' is not among the supplied candidates")]
    UnknownCandidate { selected: String },

    #[error("confidence {0} is outside [0, 1]")]
    InvalidConfidence(f64),

    #[error("matcher call timed out after {0} ms")]
    Timeout(u128),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("matcher returned an empty response")]
    EmptyResponse,

    #[error("failed to parse matcher response: {0}")]
    Parse(String),
}

// ============================================================================
// SOURCE ERRORS (external classification)
// ============================================================================

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read dictionary: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse dictionary: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    #[error("dictionary service error: {0}")]
    Remote(String),
}

// ============================================================================
// CONFIG ERRORS (fatal, detected before the alignment loop)
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} not set (required for the LLM matcher)")]
    MissingCredential(&'static str),

    #[error("invalid setting '{field}': {message}")]
    Invalid { field: &'static str, message: String },

    #[error("matcher '{0}' is not available in this build")]
    Unavailable(String),
}
