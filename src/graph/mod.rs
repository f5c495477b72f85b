// 🕸️ RDF Graph - triple model + Turtle / N-Triples
//
// Triples keep insertion order, so builder output is stable and
// diff-friendly. Subjects and predicates are IRIs; objects are IRIs or
// literals. Blank nodes are not supported.

pub mod correspondence;
pub mod taxonomy;

pub use correspondence::CorrespondenceGraphBuilder;
pub use taxonomy::TaxonomyGraphBuilder;

use crate::error::GraphError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

// Vocabulary IRIs
pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";
pub const SKOS: &str = "http://www.w3.org/2004/02/skos/core#";
pub const DCTERMS: &str = "http://purl.org/dc/terms/";

pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";
pub const RDFS_COMMENT: &str = "http://www.w3.org/2000/01/rdf-schema#comment";
pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
pub const OWL_CLASS: &str = "http://www.w3.org/2002/07/owl#Class";
pub const OWL_OBJECT_PROPERTY: &str = "http://www.w3.org/2002/07/owl#ObjectProperty";
pub const SKOS_CONCEPT: &str = "http://www.w3.org/2004/02/skos/core#Concept";
pub const SKOS_PREF_LABEL: &str = "http://www.w3.org/2004/02/skos/core#prefLabel";
pub const SKOS_NOTATION: &str = "http://www.w3.org/2004/02/skos/core#notation";
pub const SKOS_EXACT_MATCH: &str = "http://www.w3.org/2004/02/skos/core#exactMatch";
pub const SKOS_CLOSE_MATCH: &str = "http://www.w3.org/2004/02/skos/core#closeMatch";
pub const SKOS_RELATED: &str = "http://www.w3.org/2004/02/skos/core#related";

/// Local name of the cross-reference property inside the class namespace
pub const CATEGORY_REF_LOCAL: &str = "categoryRef";

// ============================================================================
// NAMESPACES
// ============================================================================

/// Project namespaces used by both graph builders and by re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespaces {
    /// OWL classes built from taxonomy categories
    pub class_ns: String,
    /// Category identifiers (cross-reference targets)
    pub category_ns: String,
    /// External classification entries
    pub external_ns: String,
    /// Custom link for rejected matches (not part of SKOS)
    pub no_match_property: String,
}

impl Namespaces {
    /// Property linking a class to its category identifier
    pub fn category_ref(&self) -> String {
        format!("{}{}", self.class_ns, CATEGORY_REF_LOCAL)
    }

    pub fn category_iri(&self, id: &str) -> String {
        format!("{}{}", self.category_ns, id)
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Namespaces {
            class_ns: "https://oekobaudat.de/class/".to_string(),
            category_ns: "https://oekobaudat.de/category/".to_string(),
            external_ns: "https://identifier.buildingsmart.org/uri/".to_string(),
            no_match_property: "https://identifier.buildingsmart.org/uri/noMatch".to_string(),
        }
    }
}

// ============================================================================
// TERMS AND TRIPLES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Term {
    Iri(String),
    Literal {
        value: String,
        lang: Option<String>,
        datatype: Option<String>,
    },
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(iri.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal {
            value: value.into(),
            lang: None,
            datatype: None,
        }
    }

    pub fn lang_literal(value: impl Into<String>, lang: &str) -> Self {
        Term::Literal {
            value: value.into(),
            lang: Some(lang.to_string()),
            datatype: None,
        }
    }

    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal { .. } => None,
        }
    }

    /// Literal value if this is a literal with the given language tag
    pub fn literal_in(&self, language: &str) -> Option<&str> {
        match self {
            Term::Literal { value, lang: Some(l), .. } if l == language => Some(value),
            _ => None,
        }
    }

    pub fn literal_value(&self) -> Option<&str> {
        match self {
            Term::Literal { value, .. } => Some(value),
            Term::Iri(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

// ============================================================================
// GRAPH
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdfGraph {
    prefixes: Vec<(String, String)>,
    triples: Vec<Triple>,
}

impl RdfGraph {
    pub fn new() -> Self {
        RdfGraph::default()
    }

    /// Register a prefix for Turtle output (later bindings of the same prefix win)
    pub fn bind(&mut self, prefix: &str, namespace: &str) {
        self.prefixes.retain(|(p, _)| p != prefix);
        self.prefixes.push((prefix.to_string(), namespace.to_string()));
    }

    pub fn add(&mut self, subject: impl Into<String>, predicate: impl Into<String>, object: Term) {
        self.triples.push(Triple {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        });
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn prefixes(&self) -> &[(String, String)] {
        &self.prefixes
    }

    /// Objects of (subject, predicate, ?)
    pub fn objects<'a>(&'a self, subject: &'a str, predicate: &'a str) -> impl Iterator<Item = &'a Term> + 'a {
        self.triples
            .iter()
            .filter(move |t| t.subject == subject && t.predicate == predicate)
            .map(|t| &t.object)
    }

    /// Subjects of (?, predicate, object), first appearance order, no repeats
    pub fn subjects_with(&self, predicate: &str, object: &Term) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.triples
            .iter()
            .filter(|t| t.predicate == predicate && &t.object == object)
            .map(|t| t.subject.as_str())
            .filter(|s| seen.insert(*s))
            .collect()
    }

    // ========================================================================
    // TURTLE
    // ========================================================================

    /// Serialize as Turtle: prefix block, then one statement per subject.
    pub fn to_turtle(&self) -> String {
        let mut out = String::with_capacity(64 * self.triples.len() + 256);

        for (prefix, ns) in &self.prefixes {
            out.push_str(&format!("@prefix {}: <{}> .\n", prefix, ns));
        }
        if !self.prefixes.is_empty() {
            out.push('\n');
        }

        // Group by subject, keeping first-appearance order
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&Triple>> = HashMap::new();
        for triple in &self.triples {
            let entry = groups.entry(triple.subject.as_str()).or_default();
            if entry.is_empty() {
                order.push(triple.subject.as_str());
            }
            entry.push(triple);
        }

        for subject in order {
            let statements = &groups[subject];
            out.push_str(&self.compact_iri(subject));
            for (i, triple) in statements.iter().enumerate() {
                let predicate = if triple.predicate == RDF_TYPE {
                    "a".to_string()
                } else {
                    self.compact_iri(&triple.predicate)
                };
                let sep = if i + 1 == statements.len() { " ." } else { " ;" };
                out.push_str(&format!(
                    "\n    {} {}{}",
                    predicate,
                    self.turtle_term(&triple.object),
                    sep
                ));
            }
            out.push_str("\n\n");
        }

        out
    }

    fn compact_iri(&self, iri: &str) -> String {
        for (prefix, ns) in &self.prefixes {
            if let Some(local) = iri.strip_prefix(ns.as_str()) {
                if is_safe_local_name(local) {
                    return format!("{}:{}", prefix, local);
                }
            }
        }
        format!("<{}>", iri)
    }

    fn turtle_term(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) => self.compact_iri(iri),
            Term::Literal { value, lang, datatype } => {
                let mut out = format!("\"{}\"", escape_literal(value));
                if let Some(l) = lang {
                    out.push('@');
                    out.push_str(l);
                } else if let Some(dt) = datatype {
                    out.push_str("^^");
                    out.push_str(&self.compact_iri(dt));
                }
                out
            }
        }
    }

    pub fn write_turtle<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_turtle())
            .with_context(|| format!("Failed to write Turtle: {:?}", path.as_ref()))
    }

    // ========================================================================
    // N-TRIPLES
    // ========================================================================

    pub fn to_ntriples(&self) -> String {
        let mut out = String::with_capacity(96 * self.triples.len());
        for t in &self.triples {
            out.push_str(&format!(
                "<{}> <{}> {} .\n",
                t.subject,
                t.predicate,
                ntriples_term(&t.object)
            ));
        }
        out
    }

    pub fn write_ntriples<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_ntriples())
            .with_context(|| format!("Failed to write N-Triples: {:?}", path.as_ref()))
    }

    /// Parse an N-Triples document (no blank nodes).
    pub fn from_ntriples(input: &str) -> Result<RdfGraph, GraphError> {
        let mut graph = RdfGraph::new();

        for (idx, raw) in input.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut cursor = LineCursor::new(line, line_no);
            let subject = cursor.iri()?;
            cursor.skip_ws();
            let predicate = cursor.iri()?;
            cursor.skip_ws();
            let object = cursor.object()?;
            cursor.skip_ws();
            cursor.expect('.')?;
            cursor.skip_ws();
            if !cursor.at_end() && cursor.peek() != Some('#') {
                return Err(cursor.error("trailing content after '.'"));
            }

            graph.triples.push(Triple { subject, predicate, object });
        }

        Ok(graph)
    }

    pub fn read_ntriples<P: AsRef<Path>>(path: P) -> Result<RdfGraph> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read N-Triples: {:?}", path.as_ref()))?;
        Ok(RdfGraph::from_ntriples(&content)?)
    }
}

fn is_safe_local_name(local: &str) -> bool {
    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

fn escape_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn ntriples_term(term: &Term) -> String {
    match term {
        Term::Iri(iri) => format!("<{}>", iri),
        Term::Literal { value, lang, datatype } => {
            let mut out = format!("\"{}\"", escape_literal(value));
            if let Some(l) = lang {
                out.push('@');
                out.push_str(l);
            } else if let Some(dt) = datatype {
                out.push_str(&format!("^^<{}>", dt));
            }
            out
        }
    }
}

// ============================================================================
// N-TRIPLES LINE CURSOR
// ============================================================================

struct LineCursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl LineCursor {
    fn new(line: &str, line_no: usize) -> Self {
        LineCursor {
            chars: line.chars().collect(),
            pos: 0,
            line: line_no,
        }
    }

    fn error(&self, message: &str) -> GraphError {
        GraphError::Syntax {
            line: self.line,
            message: format!("{} (column {})", message, self.pos + 1),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<(), GraphError> {
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn iri(&mut self) -> Result<String, GraphError> {
        if self.peek() == Some('_') {
            return Err(GraphError::BlankNode(self.line));
        }
        self.expect('<')?;
        let mut iri = String::new();
        loop {
            match self.bump() {
                Some('>') => return Ok(iri),
                Some(c) if c.is_whitespace() => return Err(self.error("whitespace inside IRI")),
                Some(c) => iri.push(c),
                None => return Err(self.error("unterminated IRI")),
            }
        }
    }

    fn object(&mut self) -> Result<Term, GraphError> {
        match self.peek() {
            Some('<') => Ok(Term::Iri(self.iri()?)),
            Some('"') => self.literal(),
            Some('_') => Err(GraphError::BlankNode(self.line)),
            _ => Err(self.error("expected IRI or literal")),
        }
    }

    fn literal(&mut self) -> Result<Term, GraphError> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => value.push(self.escape()?),
                Some(c) => value.push(c),
                None => return Err(self.error("unterminated literal")),
            }
        }

        match self.peek() {
            Some('@') => {
                self.bump();
                let mut lang = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        lang.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                if lang.is_empty() {
                    return Err(self.error("empty language tag"));
                }
                Ok(Term::Literal { value, lang: Some(lang), datatype: None })
            }
            Some('^') => {
                self.bump();
                self.expect('^')?;
                let datatype = self.iri()?;
                Ok(Term::Literal { value, lang: None, datatype: Some(datatype) })
            }
            _ => Ok(Term::literal(value)),
        }
    }

    fn escape(&mut self) -> Result<char, GraphError> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('b') => Ok('\u{8}'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.unicode_escape(4),
            Some('U') => self.unicode_escape(8),
            _ => Err(self.error("invalid escape sequence")),
        }
    }

    fn unicode_escape(&mut self, digits: usize) -> Result<char, GraphError> {
        let mut hex = String::with_capacity(digits);
        for _ in 0..digits {
            match self.bump() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(self.error("invalid unicode escape")),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error("invalid unicode code point"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> RdfGraph {
        let mut g = RdfGraph::new();
        g.bind("rdfs", RDFS);
        g.bind("owl", OWL);
        g.bind("obd", "https://oekobaudat.de/class/");
        g.add("https://oekobaudat.de/class/Zement", RDF_TYPE, Term::iri(OWL_CLASS));
        g.add(
            "https://oekobaudat.de/class/Zement",
            RDFS_LABEL,
            Term::lang_literal("Zement", "de"),
        );
        g.add(
            "https://oekobaudat.de/class/Zement",
            RDFS_COMMENT,
            Term::lang_literal("Pfad \"mit\" Anführungszeichen\nund Zeilenumbruch", "de"),
        );
        g.add(
            "https://oekobaudat.de/class/Zement",
            "https://oekobaudat.de/class/categoryRef",
            Term::iri("https://oekobaudat.de/category/1.1.01"),
        );
        g
    }

    #[test]
    fn test_turtle_groups_subjects_and_compacts_iris() {
        let turtle = small_graph().to_turtle();

        assert!(turtle.contains("@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> ."));
        assert!(turtle.contains("obd:Zement\n    a owl:Class ;"));
        assert!(turtle.contains("rdfs:label \"Zement\"@de ;"));
        // Dotted identifiers are not compacted
        assert!(turtle.contains("<https://oekobaudat.de/category/1.1.01> ."));
        assert!(turtle.contains("\\\"mit\\\""));
        assert!(turtle.contains("\\n"));
    }

    #[test]
    fn test_ntriples_read_back() {
        let graph = small_graph();
        let text = graph.to_ntriples();
        let parsed = RdfGraph::from_ntriples(&text).unwrap();

        assert_eq!(parsed.triples(), graph.triples());
    }

    #[test]
    fn test_ntriples_datatype_and_unicode_escape() {
        let text = "<http://a/s> <http://a/p> \"caf\\u00E9\"^^<http://www.w3.org/2001/XMLSchema#string> .\n";
        let parsed = RdfGraph::from_ntriples(text).unwrap();

        assert_eq!(
            parsed.triples()[0].object,
            Term::Literal {
                value: "café".to_string(),
                lang: None,
                datatype: Some("http://www.w3.org/2001/XMLSchema#string".to_string()),
            }
        );
    }

    #[test]
    fn test_ntriples_rejects_blank_nodes_and_garbage() {
        assert_eq!(
            RdfGraph::from_ntriples("_:b0 <http://a/p> <http://a/o> .").unwrap_err(),
            GraphError::BlankNode(1)
        );
        assert!(matches!(
            RdfGraph::from_ntriples("# comment\n<http://a/s> <http://a/p> <http://a/o>"),
            Err(GraphError::Syntax { line: 2, .. })
        ));
        assert!(RdfGraph::from_ntriples("<http://a/s> <http://a/p> \"open .").is_err());
    }

    #[test]
    fn test_subjects_with_and_objects() {
        let g = small_graph();
        let classes = g.subjects_with(RDF_TYPE, &Term::iri(OWL_CLASS));
        assert_eq!(classes, vec!["https://oekobaudat.de/class/Zement"]);

        let labels: Vec<&str> = g
            .objects("https://oekobaudat.de/class/Zement", RDFS_LABEL)
            .filter_map(|t| t.literal_in("de"))
            .collect();
        assert_eq!(labels, vec!["Zement"]);
    }
}
