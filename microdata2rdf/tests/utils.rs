use std::collections::HashSet;

use itertools::Itertools;
use microdata2rdf::{Options, RegistryIndex};
use oxiri::Iri;
use oxrdf::Graph;

pub const BASE: &str = "http://example.org/";

const PREFIXES: &[(&str, &str)] = &[
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("owl", "http://www.w3.org/2002/07/owl#"),
    ("schema", "http://schema.org/"),
    ("foaf", "http://xmlns.com/foaf/0.1/"),
    ("rdfa", "http://www.w3.org/ns/rdfa#"),
    ("dc", "http://purl.org/dc/terms/"),
];

pub fn base() -> Iri<String> {
    Iri::parse(BASE.to_string()).unwrap()
}

pub fn serialize_graph(graph: Graph, base: &str) -> String {
    // NB: rdf_canon gives blank nodes stable labels so graphs can be compared as text
    let idents = rdf_canon::issue_graph_with::<sha2::Sha256>(&graph, &Default::default()).unwrap();
    let graph = rdf_canon::relabel_graph(&graph, &idents).unwrap();

    let mut output = Vec::new();
    let mut ttl = oxttl::TurtleSerializer::new().with_base_iri(base).unwrap();

    // slow but makes test output nicer
    let mut prefixes_to_use = HashSet::new();
    let mut add_prefix = |full_iri: &str| {
        if let Some(&(known_prefix, iri)) =
            PREFIXES.iter().find(|(_, iri)| full_iri.starts_with(*iri))
        {
            prefixes_to_use.insert((known_prefix, iri));
        }
    };

    for triple in graph.iter() {
        if let oxrdf::SubjectRef::NamedNode(n) = triple.subject {
            add_prefix(n.as_str());
        }

        add_prefix(triple.predicate.as_str());

        if let oxrdf::TermRef::NamedNode(n) = triple.object {
            add_prefix(n.as_str());
        } else if let oxrdf::TermRef::Literal(l) = triple.object {
            if !l.is_plain() {
                add_prefix(l.datatype().as_str());
            }
        }
    }

    for (prefix, iri) in prefixes_to_use.into_iter().sorted() {
        ttl = ttl.with_prefix(prefix, iri).unwrap();
    }

    let mut ttl = ttl.for_writer(&mut output);
    for triple in graph.iter().sorted_by_cached_key(|t| {
        (
            t.subject.to_string(),
            if t.predicate.as_str() == "http://www.w3.org/1999/02/22-rdf-syntax-ns#type" {
                // make "a" come first
                None
            } else {
                Some(t.predicate.to_string())
            },
            t.object.to_string(),
        )
    }) {
        ttl.serialize_triple(triple).unwrap();
    }

    ttl.finish().unwrap();

    String::from_utf8_lossy(&output).into_owned()
}

/// Runs extraction with the built-in registry, returning the output and
/// processor graphs.
#[allow(unused)]
pub fn extract_graphs(html: &str, registry: &RegistryIndex, options: &Options) -> (Graph, Graph) {
    let mut output_graph = Graph::new();
    let mut processor_graph = Graph::new();
    microdata2rdf::process(
        html,
        base(),
        registry,
        options,
        &mut output_graph,
        &mut processor_graph,
    )
    .unwrap();
    (output_graph, processor_graph)
}

/// Triples in the order extraction produces them, one N-Triples-like line each.
#[allow(unused)]
pub fn triple_lines(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    let root = microdata2rdf::HtmlElement::new(doc.root_element());
    let mut lines = Vec::new();
    microdata2rdf::extract(
        &root,
        base(),
        RegistryIndex::builtin(),
        &Options::default(),
        &mut |triple| lines.push(triple.to_string()),
        &mut Graph::new(),
    )
    .unwrap();
    lines.join("\n")
}

/// Number of diagnostics of the given `rdfa:` class in a processor graph.
#[allow(unused)]
pub fn diagnostics(processor_graph: &Graph, class: &str) -> usize {
    let class = oxrdf::NamedNode::new_unchecked(format!("http://www.w3.org/ns/rdfa#{class}"));
    processor_graph.triples_for_object(&class).count()
}

#[allow(unused)]
pub fn assert_graph(html: &str, ttl: &str) {
    assert_graph_with(html, RegistryIndex::builtin(), &Options::default(), ttl);
}

#[allow(unused)]
pub fn assert_graph_with(html: &str, registry: &RegistryIndex, options: &Options, ttl: &str) {
    let (output_graph, _) = extract_graphs(html, registry, options);

    let mut ttl_graph = Graph::new();
    {
        let ttl_rdf = oxttl::TurtleParser::new()
            .with_base_iri(BASE)
            .unwrap()
            .for_slice(ttl.as_bytes());
        for triple in ttl_rdf {
            ttl_graph.insert(&triple.unwrap());
        }
    }

    let output = serialize_graph(output_graph, BASE);
    let ttl_output = serialize_graph(ttl_graph, BASE);

    pretty_assertions::assert_eq!(output, ttl_output);
}
