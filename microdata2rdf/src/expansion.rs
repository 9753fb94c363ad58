//! Vocabulary expansion.
//!
//! Closes a graph under three OWL 2 RL property rules:
//!
//! * `prp-spo1`: `p1 rdfs:subPropertyOf p2` and `x p1 y` entail `x p2 y`
//! * `prp-eqp1`: `p1 owl:equivalentProperty p2` and `x p1 y` entail `x p2 y`
//! * `prp-eqp2`: `p1 owl:equivalentProperty p2` and `x p2 y` entail `x p1 y`
//!
//! The schema triples are read from the graph itself. Rules are applied in
//! passes until a pass adds nothing new.

use oxrdf::vocab::rdfs;
use oxrdf::{Graph, NamedNodeRef, SubjectRef, TermRef, Triple, TripleRef};
use tracing::{debug, trace};

use crate::owl_vocab;

#[derive(Clone, Copy, Debug)]
enum RuleDirection {
    /// From the schema triple's subject property to its object property.
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug)]
struct Rule {
    name: &'static str,
    schema: NamedNodeRef<'static>,
    direction: RuleDirection,
}

fn rules() -> [Rule; 3] {
    [
        Rule {
            name: "prp-spo1",
            schema: rdfs::SUB_PROPERTY_OF,
            direction: RuleDirection::Forward,
        },
        Rule {
            name: "prp-eqp1",
            schema: owl_vocab::EQUIVALENT_PROPERTY,
            direction: RuleDirection::Forward,
        },
        Rule {
            name: "prp-eqp2",
            schema: owl_vocab::EQUIVALENT_PROPERTY,
            direction: RuleDirection::Backward,
        },
    ]
}

impl Rule {
    fn apply(&self, graph: &Graph, consequents: &mut Vec<Triple>) {
        for schema in graph.triples_for_predicate(self.schema) {
            let (SubjectRef::NamedNode(p1), TermRef::NamedNode(p2)) = (schema.subject, schema.object)
            else {
                continue;
            };

            let (from, to) = match self.direction {
                RuleDirection::Forward => (p1, p2),
                RuleDirection::Backward => (p2, p1),
            };

            for fact in graph.triples_for_predicate(from) {
                let entailed = TripleRef::new(fact.subject, to, fact.object);
                if !graph.contains(entailed) {
                    trace!("{}: {entailed}", self.name);
                    consequents.push(entailed.into_owned());
                }
            }
        }
    }
}

/// Returns `graph` together with everything the rules entail from it.
pub fn expand(graph: &Graph) -> Graph {
    let mut expanded = graph.clone();
    expand_in_place(&mut expanded);
    expanded
}

/// Like [`expand`], for a sequence of triples.
pub fn expand_triples(triples: impl IntoIterator<Item = Triple>) -> Graph {
    let mut graph = Graph::new();
    for triple in triples {
        graph.insert(&triple);
    }
    expand_in_place(&mut graph);
    graph
}

/// Adds everything the rules entail to `graph`.
pub fn expand_in_place(graph: &mut Graph) {
    let rules = rules();
    let initial = graph.len();

    let mut added_any = true;
    let mut passes = 0;
    while added_any {
        added_any = false;
        passes += 1;

        let mut new_triples = Vec::new();
        for rule in &rules {
            rule.apply(graph, &mut new_triples);
        }

        for triple in &new_triples {
            added_any |= graph.insert(triple);
        }
    }

    debug!(
        "expansion added {} triples in {passes} passes",
        graph.len() - initial
    );
}
