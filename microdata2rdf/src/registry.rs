//! Vocabulary registries.
//!
//! A [`Registry`] describes how unqualified property names are turned into
//! predicate IRIs for items of a given vocabulary, and which additional
//! predicates (`subPropertyOf`, `equivalentProperty`) each property implies.
//! A [`RegistryIndex`] maps vocabulary prefixes to registries; the registry
//! for an item is the first one whose prefix starts its type IRI.

use std::borrow::Cow;
use std::fmt::Write;
use std::sync::OnceLock;

use indexmap::IndexMap;
use oxiri::{Iri, IriParseError};
use oxrdf::NamedNode;
use serde::Deserialize;
use tracing::debug;

#[derive(derive_more::Error, derive_more::Display, derive_more::From, Debug)]
pub enum RegistryError {
    #[display("Invalid registry JSON: {_0}")]
    Json(serde_json::Error),

    #[display("Invalid IRI in registry entry <{prefix}>, property `{property}`: `{iri}`")]
    #[from(skip)]
    InvalidIri {
        prefix: String,
        property: String,
        source: IriParseError,
        iri: String,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMetadata {
    pub sub_property_of: Vec<NamedNode>,
    pub equivalent_property: Vec<NamedNode>,
}

#[derive(Clone, Debug)]
pub struct Registry {
    prefix: String,
    property_base: String,
    properties: IndexMap<String, PropertyMetadata>,
}

impl Registry {
    pub fn new(prefix: impl Into<String>, properties: IndexMap<String, PropertyMetadata>) -> Self {
        let prefix = prefix.into();
        let property_base = if prefix.ends_with(['/', '#']) {
            prefix.clone()
        } else {
            format!("{prefix}#")
        };

        Self {
            prefix,
            property_base,
            properties,
        }
    }

    /// The ad-hoc registry for a type with no registered vocabulary: the type
    /// IRI up to and including its last `/` or `#`.
    pub fn derive(type_iri: &str) -> Self {
        let prefix = match type_iri.rfind(['/', '#']) {
            Some(ix) => &type_iri[..=ix],
            None => type_iri,
        };
        Self::new(prefix, IndexMap::new())
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn property_base(&self) -> &str {
        &self.property_base
    }

    pub fn properties(&self) -> &IndexMap<String, PropertyMetadata> {
        &self.properties
    }

    /// Recovers the registry-local name of a predicate IRI.
    pub fn tokenize<'p>(&self, predicate: &'p str) -> &'p str {
        predicate
            .strip_prefix(self.property_base.as_str())
            .unwrap_or(predicate)
    }

    /// Additional predicates implied by `predicate`: its `subPropertyOf`
    /// targets, then its `equivalentProperty` targets.
    pub fn expand(
        &self,
        predicate: &str,
    ) -> std::iter::Chain<std::slice::Iter<'_, NamedNode>, std::slice::Iter<'_, NamedNode>> {
        let (sub_property_of, equivalent_property): (&[NamedNode], &[NamedNode]) =
            match self.properties.get(self.tokenize(predicate)) {
                Some(metadata) => (
                    metadata.sub_property_of.as_slice(),
                    metadata.equivalent_property.as_slice(),
                ),
                None => (&[], &[]),
            };
        sub_property_of.iter().chain(equivalent_property.iter())
    }
}

/// Builds the predicate IRI for a property name.
///
/// Absolute names are used verbatim. Otherwise the escaped name is appended to
/// the vocabulary's property base, or used as a fragment of the document base
/// when the item has no vocabulary.
pub fn predicate_uri(
    name: &str,
    vocabulary: Option<&Registry>,
    document_base: &Iri<String>,
) -> Result<NamedNode, IriParseError> {
    if let Ok(iri) = Iri::parse(name) {
        return Ok(NamedNode::new_unchecked(iri.into_inner()));
    }

    let escaped = fragment_escape(name);
    match vocabulary {
        Some(vocabulary) => NamedNode::new(format!("{}{escaped}", vocabulary.property_base())),
        None => {
            let iri = document_base.resolve(&format!("#{escaped}"))?;
            Ok(NamedNode::new_unchecked(iri.into_inner()))
        }
    }
}

/// Percent-encodes the characters that may not appear in an IRI fragment.
pub fn fragment_escape(name: &str) -> Cow<'_, str> {
    const RESERVED: &[char] = &['"', '#', '%', '<', '>', '[', '\\', ']', '^', '{', '|', '}'];

    if !name.contains(RESERVED) {
        return Cow::Borrowed(name);
    }

    let mut escaped = String::with_capacity(name.len() + 8);
    for c in name.chars() {
        if RESERVED.contains(&c) {
            // all reserved characters are ASCII
            let _ = write!(escaped, "%{:02X}", c as u32);
        } else {
            escaped.push(c);
        }
    }
    Cow::Owned(escaped)
}

#[derive(Clone, Debug, Default)]
pub struct RegistryIndex {
    registries: IndexMap<String, Registry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Deserialize)]
struct RegistrySource {
    #[serde(default)]
    properties: IndexMap<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct PropertySource {
    #[serde(rename = "subPropertyOf")]
    sub_property_of: Option<OneOrMany>,
    #[serde(rename = "equivalentProperty")]
    equivalent_property: Option<OneOrMany>,
}

impl RegistryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries shipped with the crate (schema.org and the microformats
    /// profiles).
    pub fn builtin() -> &'static RegistryIndex {
        static BUILTIN: OnceLock<RegistryIndex> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            RegistryIndex::from_json(include_str!("registry.json"))
                .expect("built-in registry must be valid")
        })
    }

    /// Parses a registry document: a JSON object keyed by vocabulary prefix,
    /// each value optionally holding a `properties` object. Entries that are
    /// not objects are skipped.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let source: IndexMap<String, serde_json::Value> = serde_json::from_str(json)?;

        let mut index = Self::new();
        for (prefix, entry) in source {
            if !entry.is_object() {
                debug!("skipping registry entry <{prefix}>: not an object");
                continue;
            }

            let entry: RegistrySource = serde_json::from_value(entry)?;
            let mut properties = IndexMap::with_capacity(entry.properties.len());
            for (property, metadata) in entry.properties {
                if !metadata.is_object() {
                    debug!("skipping property `{property}` of <{prefix}>: not an object");
                    continue;
                }

                let metadata: PropertySource = serde_json::from_value(metadata)?;
                let to_iris = |values: Option<OneOrMany>| {
                    values
                        .map(OneOrMany::into_vec)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|iri| {
                            NamedNode::new(iri.clone()).map_err(|source| {
                                RegistryError::InvalidIri {
                                    prefix: prefix.clone(),
                                    property: property.clone(),
                                    source,
                                    iri,
                                }
                            })
                        })
                        .collect::<Result<Vec<_>, _>>()
                };

                let metadata = PropertyMetadata {
                    sub_property_of: to_iris(metadata.sub_property_of)?,
                    equivalent_property: to_iris(metadata.equivalent_property)?,
                };
                properties.insert(property, metadata);
            }

            debug!("loaded registry <{prefix}> with {} properties", properties.len());
            index.insert(Registry::new(prefix, properties));
        }

        Ok(index)
    }

    /// Adds a registry, replacing any with the same prefix.
    pub fn insert(&mut self, registry: Registry) -> Option<Registry> {
        self.registries.insert(registry.prefix.clone(), registry)
    }

    /// The first registry, in registration order, whose prefix starts `type_iri`.
    pub fn find(&self, type_iri: &str) -> Option<&Registry> {
        self.registries
            .values()
            .find(|registry| type_iri.starts_with(registry.prefix.as_str()))
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Registry> {
        self.registries.values()
    }
}
