use std::borrow::Cow;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::str::FromStr;

use icu::locale::LanguageIdentifier;
use itertools::Itertools;
use oxiri::Iri;
use oxrdf::vocab::rdf;
use oxrdf::{
    BlankNode, Graph, Literal, NamedNode, NamedNodeRef, NamedOrBlankNode, SubjectRef, TermRef,
    Triple, TripleRef,
};
use tracing::{error, trace, warn};

use crate::element::Element;
use crate::registry::{self, Registry, RegistryIndex};
use crate::value::{self, PropertyValue};
use crate::{Error, Options, PGType, emit_processor};

/// Which attribute names an item's properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    const ALL: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    fn attribute(self) -> &'static str {
        match self {
            Direction::Forward => "itemprop",
            Direction::Reverse => "itemprop-reverse",
        }
    }
}

/// Whether `element` names a property of its item in either direction.
fn is_property<E: Element>(element: &E) -> bool {
    Direction::ALL
        .iter()
        .any(|direction| element.has_attribute(direction.attribute()))
}

#[derive(Clone)]
struct EvaluationContext<'r> {
    document_base: Rc<Iri<String>>,
    current_type: Option<NamedNode>,
    current_vocabulary: Option<Cow<'r, Registry>>,
}

/// The object of a generated triple.
enum Object {
    Resource(NamedOrBlankNode),
    Literal(Literal),
}

impl Object {
    fn as_term(&self) -> TermRef<'_> {
        match self {
            Object::Resource(resource) => resource.into(),
            Object::Literal(literal) => literal.into(),
        }
    }
}

#[derive(Debug, derive_more::Display)]
enum CrawlFailure {
    #[display("item {path} is its own property value")]
    RecursiveItem { path: String },

    #[display("element {path} is reached twice while collecting item properties")]
    RepeatedElement { path: String },
}

#[derive(Debug, derive_more::Display)]
#[display("itemref recursion: item {path} is already being expanded")]
struct ItemRecursion {
    path: String,
}

pub(crate) struct ItemGraphBuilder<'a, E> {
    registry: &'a RegistryIndex,
    options: &'a Options,
    output: &'a mut dyn FnMut(Triple),
    processor_graph: &'a mut Graph,
    // subjects already assigned to item elements
    memory: HashMap<E, NamedOrBlankNode>,
    // items whose triples are being generated further up the stack
    in_progress: HashSet<E>,
    emitted: HashSet<Triple>,
}

impl<'a, E: Element> ItemGraphBuilder<'a, E> {
    pub(crate) fn new(
        registry: &'a RegistryIndex,
        options: &'a Options,
        output: &'a mut dyn FnMut(Triple),
        processor_graph: &'a mut Graph,
    ) -> Self {
        Self {
            registry,
            options,
            output,
            processor_graph,
            memory: HashMap::new(),
            in_progress: HashSet::new(),
            emitted: HashSet::new(),
        }
    }

    pub(crate) fn parse_document(
        &mut self,
        root: &E,
        base: Iri<String>,
    ) -> Result<Vec<NamedOrBlankNode>, Error> {
        trace!("extracting items with base <{base}>");
        let ctx = EvaluationContext {
            document_base: Rc::new(base),
            current_type: None,
            current_vocabulary: None,
        };

        top_level_items(root)
            .iter()
            .map(|item| self.generate_triples(item, &ctx))
            .collect()
    }

    fn generate_triples(
        &mut self,
        item: &E,
        ctx: &EvaluationContext<'a>,
    ) -> Result<NamedOrBlankNode, Error> {
        let subject = match self.memory.get(item) {
            Some(subject) => subject.clone(),
            None => {
                let subject = self.item_subject(item, ctx)?;
                self.memory.insert(item.clone(), subject.clone());
                subject
            }
        };
        trace!("item {} has subject {subject}", item.display_path());

        if !self.in_progress.insert(item.clone()) {
            let recursion = ItemRecursion {
                path: item.display_path(),
            };
            self.error(item, recursion.to_string())?;
            return Ok(subject);
        }
        let result = self.expand_item(item, &subject, ctx);
        self.in_progress.remove(item);
        result.map(|()| subject)
    }

    /// Types and properties of an item whose subject is already known.
    fn expand_item(
        &mut self,
        item: &E,
        subject: &NamedOrBlankNode,
        ctx: &EvaluationContext<'a>,
    ) -> Result<(), Error> {
        let mut item_type = None;
        for token in item
            .attribute("itemtype")
            .unwrap_or_default()
            .split_ascii_whitespace()
        {
            // relative types are meaningless
            let Ok(type_iri) = NamedNode::new(token) else {
                trace!("ignoring relative item type {token:?}");
                continue;
            };
            self.emit(subject, rdf::TYPE, &type_iri);
            item_type.get_or_insert(type_iri);
        }

        let registry: &'a RegistryIndex = self.registry;
        let ctx = match item_type {
            Some(item_type) => {
                let vocabulary = match registry.find(item_type.as_str()) {
                    Some(vocabulary) => Cow::Borrowed(vocabulary),
                    None => Cow::Owned(Registry::derive(item_type.as_str())),
                };
                trace!(
                    "item type <{item_type}> uses property base <{}>",
                    vocabulary.property_base()
                );
                EvaluationContext {
                    document_base: ctx.document_base.clone(),
                    current_type: Some(item_type),
                    current_vocabulary: Some(vocabulary),
                }
            }
            None => ctx.clone(),
        };

        let properties = self.item_properties(item)?;
        let [forward, reverse] = Direction::ALL.map(|direction| {
            properties
                .iter()
                .filter(|el| el.has_attribute(direction.attribute()))
                .collect_vec()
        });

        for element in forward {
            for name in element
                .attribute(Direction::Forward.attribute())
                .unwrap_or_default()
                .split_ascii_whitespace()
            {
                let Some(predicate) = self.predicate(element, name, &ctx)? else {
                    continue;
                };
                let Some(value) = self.property_value(element, &ctx)? else {
                    continue;
                };

                self.emit(subject, &predicate, value.as_term());
                if let Some(vocabulary) = &ctx.current_vocabulary {
                    for implied in vocabulary.expand(predicate.as_str()) {
                        self.emit(subject, implied, value.as_term());
                    }
                }
            }
        }

        for element in reverse {
            for name in element
                .attribute(Direction::Reverse.attribute())
                .unwrap_or_default()
                .split_ascii_whitespace()
            {
                let Some(predicate) = self.predicate(element, name, &ctx)? else {
                    continue;
                };
                let Some(value) = self.property_value(element, &ctx)? else {
                    continue;
                };

                match value {
                    Object::Resource(resource) => self.emit(&resource, &predicate, subject),
                    Object::Literal(literal) => self.error(
                        element,
                        format!("reverse property `{name}` has literal value {literal}"),
                    )?,
                }
            }
        }

        Ok(())
    }

    fn item_subject(
        &mut self,
        item: &E,
        ctx: &EvaluationContext<'a>,
    ) -> Result<NamedOrBlankNode, Error> {
        if let Some(itemid) = item.attribute("itemid") {
            match value::resolve(itemid, item.base().as_deref(), &ctx.document_base) {
                Ok(iri) => return Ok(iri.into()),
                Err(e) => self.error(item, format!("invalid itemid {itemid:?}: {e}"))?,
            }
        }

        Ok(BlankNode::default().into())
    }

    fn predicate(
        &mut self,
        element: &E,
        name: &str,
        ctx: &EvaluationContext<'a>,
    ) -> Result<Option<NamedNode>, Error> {
        match registry::predicate_uri(
            name,
            ctx.current_vocabulary.as_deref(),
            &ctx.document_base,
        ) {
            Ok(predicate) => {
                trace!(current_type = ?ctx.current_type, "property `{name}` is <{predicate}>");
                Ok(Some(predicate))
            }
            Err(e) => {
                self.error(element, format!("invalid property name {name:?}: {e}"))?;
                Ok(None)
            }
        }
    }

    fn property_value(
        &mut self,
        element: &E,
        ctx: &EvaluationContext<'a>,
    ) -> Result<Option<Object>, Error> {
        let canonicalize = self.options.canonicalize;
        let result = value::property_value(element, &ctx.document_base, canonicalize, || {
            self.language(element)
        });

        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.error(element, format!("invalid IRI in property value: {e}"))?;
                return Ok(None);
            }
        };

        Ok(Some(match value {
            PropertyValue::Item => Object::Resource(self.generate_triples(element, ctx)?),
            PropertyValue::Iri(iri) => Object::Resource(iri.into()),
            PropertyValue::Literal(literal) => Object::Literal(literal),
        }))
    }

    fn language(&mut self, element: &E) -> Option<String> {
        let language = element.language().filter(|lang| !lang.is_empty())?;
        match LanguageIdentifier::from_str(&language) {
            Ok(_) => Some(language),
            Err(e) => {
                self.warn(
                    element,
                    format!("invalid language identifier ({language}): {e}"),
                );
                None
            }
        }
    }

    /// Properties of `item`, or none if collecting them loops.
    fn item_properties(&mut self, item: &E) -> Result<Vec<E>, Error> {
        match crawl_properties(item, &[]) {
            Ok(properties) => {
                trace!(
                    "item {} has properties [{}]",
                    item.display_path(),
                    properties.iter().map(Element::display_path).join(", ")
                );
                Ok(properties)
            }
            Err(failure) => {
                self.error(item, failure.to_string())?;
                Ok(Vec::new())
            }
        }
    }

    fn emit<'t>(
        &mut self,
        subject: impl Into<SubjectRef<'t>>,
        predicate: impl Into<NamedNodeRef<'t>>,
        object: impl Into<TermRef<'t>>,
    ) {
        let triple = TripleRef::new(subject, predicate, object).into_owned();
        if self.emitted.insert(triple.clone()) {
            trace!("Emitting output: {triple}");
            (self.output)(triple);
        }
    }

    fn warn(&mut self, element: &E, message: String) {
        let message = format!("{}: {message}", element.display_path());
        warn!("{message}");
        emit_processor(self.processor_graph, PGType::Warning, &message);
    }

    fn error(&mut self, element: &E, message: String) -> Result<(), Error> {
        let message = format!("{}: {message}", element.display_path());
        if self.options.validate {
            return Err(Error::Validation { message });
        }

        error!("{message}");
        emit_processor(self.processor_graph, PGType::Error, &message);
        Ok(())
    }
}

/// Items not themselves property values, in document order.
fn top_level_items<E: Element>(root: &E) -> Vec<E> {
    let mut items = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(element) = stack.pop() {
        if element.has_attribute("itemscope") && !element.has_attribute("itemprop") {
            items.push(element.clone());
        }

        stack.extend(element.children().into_iter().rev());
    }
    items
}

/// The elements carrying forward or reverse properties of `root`.
///
/// `memory` holds the items currently being crawled; meeting one of them
/// again means an item is (transitively) a property of itself.
fn crawl_properties<E: Element>(root: &E, memory: &[E]) -> Result<Vec<E>, CrawlFailure> {
    if memory.contains(root) {
        return Err(CrawlFailure::RecursiveItem {
            path: root.display_path(),
        });
    }

    let results = elements_in_item(root)?
        .into_iter()
        .filter(is_property)
        .collect_vec();

    let memory = memory
        .iter()
        .cloned()
        .chain(std::iter::once(root.clone()))
        .collect_vec();
    for nested in results.iter().filter(|el| el.has_attribute("itemscope")) {
        crawl_properties(nested, &memory)?;
    }

    Ok(results)
}

/// Breadth-first walk of an item's subtree and `itemref` targets, not
/// descending into nested items.
fn elements_in_item<E: Element>(root: &E) -> Result<Vec<E>, CrawlFailure> {
    let mut pending = VecDeque::from(root.children());
    for id in root
        .attribute("itemref")
        .unwrap_or_default()
        .split_ascii_whitespace()
    {
        match root.find_by_id(id) {
            Some(referenced) => pending.push_back(referenced),
            None => trace!("itemref {id:?} of {} matches nothing", root.display_path()),
        }
    }

    let mut seen = HashSet::new();
    let mut results = Vec::new();
    while let Some(current) = pending.pop_front() {
        if !seen.insert(current.clone()) {
            return Err(CrawlFailure::RepeatedElement {
                path: current.display_path(),
            });
        }

        if !current.has_attribute("itemscope") {
            pending.extend(current.children());
        }
        results.push(current);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;
    use crate::element::HtmlElement;

    fn ids<E: Element>(elements: &[E]) -> Vec<String> {
        elements
            .iter()
            .map(|el| el.attribute("id").unwrap_or("?").to_string())
            .collect()
    }

    fn by_id<'a>(doc: &'a Html, id: &str) -> HtmlElement<'a> {
        HtmlElement::new(doc.root_element()).find_by_id(id).unwrap()
    }

    #[test]
    fn top_level_items_skip_property_values() {
        let doc = Html::parse_document(
            r#"<div id="a" itemscope>
                 <div id="b" itemprop="p" itemscope></div>
                 <div id="c" itemscope></div>
               </div>
               <div id="d" itemscope></div>"#,
        );
        let items = top_level_items(&HtmlElement::new(doc.root_element()));
        assert_eq!(ids(&items), ["a", "c", "d"]);
    }

    #[test]
    fn elements_in_item_is_breadth_first_with_refs_last() {
        let doc = Html::parse_document(
            r#"<div id="item" itemscope itemref="r">
                 <p id="p1"><span id="s1"></span></p>
                 <p id="p2"></p>
                 <div id="nested" itemscope><span id="hidden"></span></div>
               </div>
               <p id="r"></p>"#,
        );
        let elements = elements_in_item(&by_id(&doc, "item")).unwrap();
        assert_eq!(ids(&elements), ["p1", "p2", "nested", "r", "s1"]);
    }

    #[test]
    fn elements_in_item_rejects_repeats() {
        let doc = Html::parse_document(
            r#"<div id="item" itemscope itemref="n"><span id="n" itemprop="name">x</span></div>"#,
        );
        assert!(matches!(
            elements_in_item(&by_id(&doc, "item")),
            Err(CrawlFailure::RepeatedElement { .. })
        ));
    }

    #[test]
    fn crawl_properties_rejects_self_reference() {
        let doc = Html::parse_document(
            r#"<div id="outer" itemscope>
                 <div id="a" itemprop="knows" itemscope itemref="a"></div>
               </div>"#,
        );
        assert!(matches!(
            crawl_properties(&by_id(&doc, "outer"), &[]),
            Err(CrawlFailure::RecursiveItem { .. })
        ));
    }

    #[test]
    fn item_in_progress_is_not_expanded_again() {
        let doc = Html::parse_document(
            r#"<div id="item" itemscope itemtype="http://schema.org/Thing"></div>"#,
        );
        let item = by_id(&doc, "item");
        let options = Options::default();
        let mut triples = Vec::new();
        let mut sink = |triple: Triple| triples.push(triple);
        let mut processor_graph = Graph::new();
        let mut builder = ItemGraphBuilder::new(
            RegistryIndex::builtin(),
            &options,
            &mut sink,
            &mut processor_graph,
        );

        let ctx = EvaluationContext {
            document_base: Rc::new(Iri::parse("http://example.org/".to_string()).unwrap()),
            current_type: None,
            current_vocabulary: None,
        };
        builder.in_progress.insert(item.clone());
        let subject = builder.generate_triples(&item, &ctx).unwrap();
        assert!(matches!(subject, NamedOrBlankNode::BlankNode(_)));
        drop(builder);

        assert!(triples.is_empty());
        // one rdfa:Error node with its description
        assert_eq!(processor_graph.len(), 2);
    }

    #[test]
    fn crawl_properties_collects_both_directions() {
        let doc = Html::parse_document(
            r#"<div id="item" itemscope>
                 <span id="f" itemprop="name">x</span>
                 <span id="plain">x</span>
                 <a id="r" itemprop-reverse="author" href="/x">x</a>
               </div>"#,
        );
        let item = by_id(&doc, "item");
        assert_eq!(ids(&crawl_properties(&item, &[]).unwrap()), ["f", "r"]);
    }

    #[test]
    fn crawl_properties_follows_cycles_across_directions() {
        let doc = Html::parse_document(
            r#"<div id="a" itemprop-reverse="r" itemscope itemref="b"></div>
               <div id="b" itemprop="p" itemscope itemref="a"></div>"#,
        );
        assert!(matches!(
            crawl_properties(&by_id(&doc, "a"), &[]),
            Err(CrawlFailure::RecursiveItem { .. })
        ));
    }
}
