//! Extracts RDF from HTML Microdata.
//!
//! Every top-level item of a document (an element with `itemscope` and no
//! `itemprop`) becomes a subject; its properties become triples whose
//! predicates are built with the help of a [`RegistryIndex`]. Optionally the
//! resulting graph is closed under the registry's `subPropertyOf` and
//! `equivalentProperty` declarations (see [`expansion`]).

use oxiri::Iri;
use oxrdf::{Graph, NamedOrBlankNode, Triple, TripleRef};
use scraper::Html;
use tracing::{debug, trace};

mod builder;
pub mod element;
pub mod expansion;
pub mod registry;
mod value;

pub use element::{Element, HtmlElement};
pub use registry::{PropertyMetadata, Registry, RegistryError, RegistryIndex};

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Turn recoverable errors into a failed extraction.
    pub validate: bool,
    /// Emit typed literals in their canonical lexical form.
    pub canonicalize: bool,
    /// Close the output graph under the registry's property declarations.
    pub vocab_expansion: bool,
}

/// Parses `input` and extracts its items into `output_graph`, then applies
/// vocabulary expansion if requested.
pub fn process(
    input: &str,
    base: Iri<String>,
    registry: &RegistryIndex,
    options: &Options,
    output_graph: &mut Graph,
    processor_graph: &mut Graph,
) -> Result<(), Error> {
    parse(input, base, registry, options, output_graph, processor_graph)?;

    if options.vocab_expansion {
        expansion::expand_in_place(output_graph);
    }

    Ok(())
}

/// Parses `input` as HTML and extracts its items into `output_graph`.
///
/// A `<base href>` in the document head overrides `base`. Diagnostics are
/// recorded in `processor_graph`; unless [`Options::validate`] is set, only
/// a fatal problem with the document itself (an unusable `<base>`) stops
/// extraction, and it is reported as a document error rather than returned.
/// The output graph is only written to when extraction succeeds.
pub fn parse(
    input: &str,
    mut base: Iri<String>,
    registry: &RegistryIndex,
    options: &Options,
    output_graph: &mut Graph,
    processor_graph: &mut Graph,
) -> Result<(), Error> {
    let mut triples = Vec::new();

    let result = (|| -> Result<(), Error> {
        let doc = Html::parse_document(input);
        for err in doc.errors.iter() {
            debug!("HTML parse error: {err}");
        }

        let base_sel =
            scraper::selector::Selector::parse("html>head>base").expect("selector is valid");

        if let Some(base_el) = doc.select(&base_sel).next() {
            if let Some(base_href) = base_el.attr("href") {
                base = base.resolve(base_href).map_err(|source| Error::IriParseError {
                    source,
                    iri: base_href.to_string(),
                })?;

                trace!("<base> found: {base}");
            }
        }

        let root = HtmlElement::new(doc.root_element());
        extract(
            &root,
            base.clone(),
            registry,
            options,
            &mut |triple| triples.push(triple),
            processor_graph,
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            for triple in &triples {
                output_graph.insert(triple);
            }
            Ok(())
        }
        Err(e) if options.validate => Err(e),
        Err(e) => {
            emit_processor(processor_graph, PGType::DocumentError, &e.to_string());
            Ok(())
        }
    }
}

/// Extracts the items found under `root`, passing each triple to `sink`.
///
/// Works over any [`Element`] implementation. The fragment of `base` is
/// ignored. Returns the subjects of the top-level items in document order.
/// Triples are delivered in generation order and no exact duplicate is
/// delivered twice.
pub fn extract<E: Element>(
    root: &E,
    base: Iri<String>,
    registry: &RegistryIndex,
    options: &Options,
    sink: &mut dyn FnMut(Triple),
    processor_graph: &mut Graph,
) -> Result<Vec<NamedOrBlankNode>, Error> {
    let base = base.resolve("").map_err(|source| Error::IriParseError {
        source,
        iri: base.to_string(),
    })?;

    builder::ItemGraphBuilder::new(registry, options, sink, processor_graph)
        .parse_document(root, base)
}

/// Whether `sample` looks like it carries microdata: some tag in it has an
/// `itemprop`, `itemtype`, `itemref`, `itemscope` or `itemid` attribute.
pub fn detect(sample: &str) -> bool {
    const ATTRIBUTES: [&str; 5] = ["itemprop", "itemtype", "itemref", "itemscope", "itemid"];

    let mut rest = sample;
    while let Some(start) = rest.find('<') {
        let tag = &rest[start + 1..];
        let Some(end) = tag.find('>') else {
            break;
        };

        if ATTRIBUTES.iter().any(|attr| tag[..end].contains(attr)) {
            return true;
        }

        rest = &tag[end + 1..];
    }

    false
}

#[derive(derive_more::Error, derive_more::Display, derive_more::From, Debug)]
pub enum Error {
    #[display("IRI parse error: `{iri}`")]
    IriParseError {
        source: oxiri::IriParseError,
        iri: String,
    },

    Registry(RegistryError),

    #[display("Validation failed: {message}")]
    #[from(skip)]
    Validation { message: String },
}

mod dc_vocab {
    pub static DESCRIPTION: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://purl.org/dc/terms/description");
}

mod rdfa_vocab {
    pub static ERROR: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://www.w3.org/ns/rdfa#Error");

    pub static WARNING: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://www.w3.org/ns/rdfa#Warning");

    pub static DOCUMENT_ERROR: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://www.w3.org/ns/rdfa#DocumentError");
}

mod owl_vocab {
    pub static EQUIVALENT_PROPERTY: oxrdf::NamedNodeRef =
        oxrdf::NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#equivalentProperty");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PGType {
    Error,
    Warning,
    DocumentError,
}

impl From<PGType> for oxrdf::NamedNodeRef<'static> {
    fn from(val: PGType) -> Self {
        match val {
            PGType::Error => rdfa_vocab::ERROR,
            PGType::Warning => rdfa_vocab::WARNING,
            PGType::DocumentError => rdfa_vocab::DOCUMENT_ERROR,
        }
    }
}

fn emit_processor(pg: &mut Graph, pg_type: PGType, msg: &str) {
    let warning_subj: oxrdf::Subject = oxrdf::BlankNode::default().into();
    let pg_type: oxrdf::NamedNodeRef = pg_type.into();
    // new bnode is-a PGClass
    let node = TripleRef::new(&warning_subj, oxrdf::vocab::rdf::TYPE, pg_type);
    // add description
    let desc = TripleRef::new(
        &warning_subj,
        dc_vocab::DESCRIPTION,
        oxrdf::LiteralRef::new_simple_literal(msg),
    );
    trace!("Emitting processor: {node}");
    pg.insert(node);
    trace!("Emitting processor: {desc}");
    pg.insert(desc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_finds_microdata_attributes() {
        assert!(detect(r#"<div itemscope itemtype="http://schema.org/Person">"#));
        assert!(detect("<p>text</p><span itemprop=name>x</span>"));
        assert!(!detect("<p>itemprop outside of a tag</p>"));
        assert!(!detect("<div itemscope"));
        assert!(!detect(""));
    }

    #[test]
    fn bad_base_is_a_document_error() {
        let mut output = Graph::new();
        let mut processor = Graph::new();
        let html = r#"<html><head><base href="http://[bad"></head>
            <body><div itemscope><span itemprop="name">x</span></div></body></html>"#;

        parse(
            html,
            Iri::parse("http://example.org/".to_string()).unwrap(),
            &RegistryIndex::new(),
            &Options::default(),
            &mut output,
            &mut processor,
        )
        .unwrap();

        assert!(output.is_empty());
        assert_eq!(
            processor
                .triples_for_object(rdfa_vocab::DOCUMENT_ERROR)
                .count(),
            1
        );
    }

    #[test]
    fn bad_base_fails_validation() {
        let html = r#"<html><head><base href="http://[bad"></head><body></body></html>"#;
        let result = parse(
            html,
            Iri::parse("http://example.org/".to_string()).unwrap(),
            &RegistryIndex::new(),
            &Options {
                validate: true,
                ..Options::default()
            },
            &mut Graph::new(),
            &mut Graph::new(),
        );
        assert!(matches!(result, Err(Error::IriParseError { .. })));
    }
}
