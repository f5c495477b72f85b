// 🏛️ Taxonomy Graph - CategoryTree → OWL class hierarchy
//
// Per category:
//   <class> a owl:Class
//   <class> rdfs:label "native"@de, "resolved"@en
//   <class> rdfs:comment "native path"@de, "resolved path"@en
//   <class> obd:categoryRef <category/{id}>
//   <class> rdfs:subClassOf <parent class>      (non-roots)
//
// Class IRIs come from the native label; the identifier is the
// cross-reference, so re-ingestion never depends on the IRI shape.

use super::{
    Namespaces, CATEGORY_REF_LOCAL, RdfGraph, Term, OWL, OWL_CLASS, OWL_OBJECT_PROPERTY, RDF, RDFS, RDFS_COMMENT,
    RDFS_LABEL, RDFS_SUBCLASS_OF, RDF_TYPE,
};
use crate::taxonomy::CategoryTree;
use std::collections::{HashMap, HashSet};
use tracing::info;

pub struct TaxonomyGraphBuilder {
    namespaces: Namespaces,
}

impl TaxonomyGraphBuilder {
    pub fn new(namespaces: Namespaces) -> Self {
        TaxonomyGraphBuilder { namespaces }
    }

    pub fn namespaces(&self) -> &Namespaces {
        &self.namespaces
    }

    /// Project the whole tree. Pure: same tree, same graph.
    pub fn build(&self, tree: &CategoryTree) -> RdfGraph {
        let ns = &self.namespaces;
        let mut graph = RdfGraph::new();
        graph.bind("rdf", RDF);
        graph.bind("rdfs", RDFS);
        graph.bind("owl", OWL);
        graph.bind("obd", &ns.class_ns);
        graph.bind("oekocat", &ns.category_ns);

        let category_ref = ns.category_ref();
        self.declare_category_ref(&mut graph, &category_ref);

        let class_iris = self.class_iris(tree);

        for cat in tree.iter() {
            let class_iri = &class_iris[cat.id()];

            graph.add(class_iri.as_str(), RDF_TYPE, Term::iri(OWL_CLASS));
            graph.add(class_iri.as_str(), RDFS_LABEL, Term::lang_literal(cat.native_label(), "de"));
            if let Some(resolved) = cat.resolved_label() {
                graph.add(class_iri.as_str(), RDFS_LABEL, Term::lang_literal(resolved, "en"));
            }
            graph.add(class_iri.as_str(), RDFS_COMMENT, Term::lang_literal(cat.native_path(), "de"));
            if let Some(path) = cat.resolved_path() {
                graph.add(class_iri.as_str(), RDFS_COMMENT, Term::lang_literal(path, "en"));
            }
            graph.add(
                class_iri.as_str(),
                category_ref.as_str(),
                Term::iri(ns.category_iri(cat.id())),
            );
            if let Some(parent) = cat.parent_id() {
                if let Some(parent_iri) = class_iris.get(parent) {
                    graph.add(class_iri.as_str(), RDFS_SUBCLASS_OF, Term::iri(parent_iri.as_str()));
                }
            }
        }

        info!(classes = tree.len(), triples = graph.len(), "built taxonomy graph");
        graph
    }

    fn declare_category_ref(&self, graph: &mut RdfGraph, property: &str) {
        graph.add(property, RDF_TYPE, Term::iri(OWL_OBJECT_PROPERTY));
        graph.add(property, RDFS_LABEL, Term::lang_literal("ÖKOBAUDAT category reference", "en"));
        graph.add(property, RDFS_LABEL, Term::lang_literal("ÖKOBAUDAT Kategorie-Referenz", "de"));
        graph.add(
            property,
            RDFS_COMMENT,
            Term::lang_literal("Links an OWL class to its Ökobaudat category ID", "en"),
        );
    }

    /// Unique class IRI per category, assigned in document order.
    ///
    /// A label already taken by an earlier category gets the identifier
    /// appended, then a counter until the name is free, so earlier IRIs
    /// never change when later ones collide. The cross-reference property
    /// name is reserved.
    pub fn class_iris(&self, tree: &CategoryTree) -> HashMap<String, String> {
        let mut taken: HashSet<String> = HashSet::new();
        taken.insert(CATEGORY_REF_LOCAL.to_string());
        let mut iris = HashMap::with_capacity(tree.len());

        for cat in tree.iter() {
            let mut local = sanitize_label(cat.native_label());
            if local.is_empty() {
                local = format!("category_{}", sanitize_id(cat.id()));
            }
            if taken.contains(&local) {
                let base = format!("{}_{}", local, sanitize_id(cat.id()));
                local = base.clone();
                let mut n = 2;
                while taken.contains(&local) {
                    local = format!("{}_{}", base, n);
                    n += 1;
                }
            }
            taken.insert(local.clone());
            iris.insert(cat.id().to_string(), format!("{}{}", self.namespaces.class_ns, local));
        }

        iris
    }
}

impl Default for TaxonomyGraphBuilder {
    fn default() -> Self {
        Self::new(Namespaces::default())
    }
}

/// Drop everything except word characters, whitespace and hyphens,
/// then collapse whitespace/hyphen runs into a single underscore.
pub fn sanitize_label(label: &str) -> String {
    let kept: String = label
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace() || *c == '-')
        .collect();

    let mut out = String::with_capacity(kept.len());
    let mut in_run = false;
    for c in kept.chars() {
        if c.is_whitespace() || c == '-' {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::RDFS_SUBCLASS_OF;
    use crate::taxonomy::LabelResolver;

    fn tree() -> CategoryTree {
        let mut tree = CategoryTree::new();
        tree.insert("1", "Mineralische Baustoffe", None).unwrap();
        tree.insert("1.1", "Bindemittel", Some("1")).unwrap();
        tree.insert("1.1.01", "Zement", Some("1.1")).unwrap();
        tree.insert("2", "Sonstige", None).unwrap();
        tree.insert("2.1", "Sonstige", Some("2")).unwrap();
        tree
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("Mineralische Baustoffe"), "Mineralische_Baustoffe");
        assert_eq!(sanitize_label("Holz (Vollholz) - roh"), "Holz_Vollholz_roh");
        assert_eq!(sanitize_label("Dämm-Stoffe"), "Dämm_Stoffe");
        assert_eq!(sanitize_label("Fenster, Türen & Tore"), "Fenster_Türen_Tore");
    }

    #[test]
    fn test_duplicate_labels_get_unique_iris() {
        let builder = TaxonomyGraphBuilder::default();
        let iris = builder.class_iris(&tree());

        assert_eq!(iris["2"], "https://oekobaudat.de/class/Sonstige");
        assert_eq!(iris["2.1"], "https://oekobaudat.de/class/Sonstige_2_1");
        let unique: HashSet<&String> = iris.values().collect();
        assert_eq!(unique.len(), iris.len());
    }

    #[test]
    fn test_suffixed_iri_never_reuses_a_taken_name() {
        let mut tree = CategoryTree::new();
        tree.insert("9", "A_1", None).unwrap();
        tree.insert("0", "A", None).unwrap();
        tree.insert("1", "A", None).unwrap();
        tree.insert("2", "categoryRef", None).unwrap();

        let iris = TaxonomyGraphBuilder::default().class_iris(&tree);
        assert_eq!(iris["9"], "https://oekobaudat.de/class/A_1");
        assert_eq!(iris["1"], "https://oekobaudat.de/class/A_1_2");
        assert_eq!(iris["2"], "https://oekobaudat.de/class/categoryRef_2");
        let unique: HashSet<&String> = iris.values().collect();
        assert_eq!(unique.len(), iris.len());

        let graph = TaxonomyGraphBuilder::default().build(&tree);
        let back = crate::taxonomy::TaxonomyIngester::new()
            .ingest_ntriples(&graph.to_ntriples())
            .unwrap();
        assert_eq!(back.parent_pairs(), tree.parent_pairs());
    }

    #[test]
    fn test_class_statements() {
        let mut tree = tree();
        tree.resolve_labels(&LabelResolver::default());
        let graph = TaxonomyGraphBuilder::default().build(&tree);
        let zement = "https://oekobaudat.de/class/Zement";

        let labels: Vec<&Term> = graph.objects(zement, RDFS_LABEL).collect();
        assert_eq!(
            labels,
            vec![&Term::lang_literal("Zement", "de"), &Term::lang_literal("Cement", "en")]
        );

        let parents: Vec<&Term> = graph.objects(zement, RDFS_SUBCLASS_OF).collect();
        assert_eq!(parents, vec![&Term::iri("https://oekobaudat.de/class/Bindemittel")]);

        let refs: Vec<&Term> = graph
            .objects(zement, "https://oekobaudat.de/class/categoryRef")
            .collect();
        assert_eq!(refs, vec![&Term::iri("https://oekobaudat.de/category/1.1.01")]);

        // Roots have no superclass
        assert_eq!(
            graph
                .objects("https://oekobaudat.de/class/Mineralische_Baustoffe", RDFS_SUBCLASS_OF)
                .count(),
            0
        );
    }

    #[test]
    fn test_unresolved_tree_has_no_english_literals() {
        let graph = TaxonomyGraphBuilder::default().build(&tree());
        let english = graph
            .objects("https://oekobaudat.de/class/Zement", RDFS_LABEL)
            .filter(|t| t.literal_in("en").is_some())
            .count();
        assert_eq!(english, 0);
    }

    #[test]
    fn test_property_declaration_in_turtle() {
        let turtle = TaxonomyGraphBuilder::default().build(&tree()).to_turtle();
        assert!(turtle.contains("obd:categoryRef\n    a owl:ObjectProperty ;"));
        assert!(turtle.contains("\"ÖKOBAUDAT Kategorie-Referenz\"@de"));
        assert!(turtle.contains("rdfs:subClassOf obd:Bindemittel"));
    }
}
