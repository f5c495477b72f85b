// 🔗 Correspondence Graph - Correspondences → SKOS mapping graph
//
// Per correspondence:
//   <entry> a skos:Concept ; skos:prefLabel "name"@en ; skos:notation "code"
//   <entry> skos:exactMatch | skos:closeMatch | skos:related <category/{id}>
//   or, for the none band:
//   <entry> noMatch <category/{id}> ; rdfs:comment "No good match found. ..."

use super::{
    Namespaces, RdfGraph, Term, RDF, RDFS, RDFS_COMMENT, RDF_TYPE, SKOS, SKOS_CLOSE_MATCH,
    SKOS_CONCEPT, SKOS_EXACT_MATCH, SKOS_NOTATION, SKOS_PREF_LABEL, SKOS_RELATED,
};
use crate::alignment::{Correspondence, MatchType};
use tracing::info;

pub struct CorrespondenceGraphBuilder {
    namespaces: Namespaces,
}

impl CorrespondenceGraphBuilder {
    pub fn new(namespaces: Namespaces) -> Self {
        CorrespondenceGraphBuilder { namespaces }
    }

    pub fn build<'a, I>(&self, correspondences: I) -> RdfGraph
    where
        I: IntoIterator<Item = &'a Correspondence>,
    {
        let ns = &self.namespaces;
        let mut graph = RdfGraph::new();
        graph.bind("rdf", RDF);
        graph.bind("rdfs", RDFS);
        graph.bind("skos", SKOS);
        graph.bind("bsdd", &ns.external_ns);
        graph.bind("oekocat", &ns.category_ns);

        let mut count = 0usize;
        for corr in correspondences {
            let entry = corr.entry();
            let subject = entry.uri.as_str();
            let target = Term::iri(ns.category_iri(&corr.category().id));

            graph.add(subject, RDF_TYPE, Term::iri(SKOS_CONCEPT));
            graph.add(subject, SKOS_PREF_LABEL, Term::lang_literal(entry.name.as_str(), "en"));
            graph.add(subject, SKOS_NOTATION, Term::literal(entry.code.as_str()));

            match corr.match_type() {
                MatchType::Exact => graph.add(subject, SKOS_EXACT_MATCH, target),
                MatchType::Close => graph.add(subject, SKOS_CLOSE_MATCH, target),
                MatchType::Related => graph.add(subject, SKOS_RELATED, target),
                MatchType::None => {
                    graph.add(subject, ns.no_match_property.as_str(), target);
                    graph.add(
                        subject,
                        RDFS_COMMENT,
                        Term::literal(format!(
                            "No good match found. Best candidate: {}",
                            corr.category().native_label
                        )),
                    );
                }
            }
            count += 1;
        }

        info!(correspondences = count, triples = graph.len(), "built correspondence graph");
        graph
    }
}

impl Default for CorrespondenceGraphBuilder {
    fn default() -> Self {
        Self::new(Namespaces::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
