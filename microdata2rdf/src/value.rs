use std::borrow::Cow;
use std::str::FromStr;

use oxiri::{Iri, IriParseError};
use oxrdf::vocab::xsd;
use oxrdf::{Literal, NamedNode, NamedNodeRef};
use oxsdatatypes::{Date, DateTime, Double, Duration, Float, Integer, Time};

use crate::element::Element;

/// How an element's property value is obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ValueKind {
    /// A nested item.
    Item,
    /// The `content` attribute, whatever the element.
    Content,
    /// `data`/`meter` with a `value` attribute.
    Number,
    /// URL-valued `src` attribute.
    Src,
    /// URL-valued `href` attribute.
    Href,
    /// URL-valued `data` attribute of `object`.
    Data,
    /// `time`: the `datetime` attribute or the text content.
    Time,
    Text,
}

impl ValueKind {
    pub(crate) fn of<E: Element>(element: &E) -> Self {
        if element.has_attribute("itemscope") {
            return ValueKind::Item;
        }
        if element.has_attribute("content") {
            return ValueKind::Content;
        }

        match element.tag_name() {
            "data" | "meter" if element.has_attribute("value") => ValueKind::Number,
            "audio" | "embed" | "iframe" | "img" | "source" | "track" | "video" => ValueKind::Src,
            "a" | "area" | "link" => ValueKind::Href,
            "object" => ValueKind::Data,
            "time" => ValueKind::Time,
            _ => ValueKind::Text,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PropertyValue {
    Item,
    Iri(NamedNode),
    Literal(Literal),
}

/// Computes the value of a property-bearing element.
///
/// `language` is only consulted for untyped literals.
pub(crate) fn property_value<E: Element>(
    element: &E,
    document_base: &Iri<String>,
    canonicalize: bool,
    language: impl FnOnce() -> Option<String>,
) -> Result<PropertyValue, IriParseError> {
    let url_attribute = |name: &str| {
        let value = element.attribute(name).unwrap_or_default();
        resolve(value, element.base().as_deref(), document_base).map(PropertyValue::Iri)
    };

    let value = match ValueKind::of(element) {
        ValueKind::Item => PropertyValue::Item,
        ValueKind::Content => {
            let content = element.attribute("content").unwrap_or_default();
            PropertyValue::Literal(plain_literal(content, language()))
        }
        ValueKind::Number => {
            let value = element.attribute("value").unwrap_or_default();
            PropertyValue::Literal(match LexicalValue::numeric(value) {
                Some(number) => number.to_literal(value, canonicalize),
                None => Literal::new_simple_literal(value),
            })
        }
        ValueKind::Src => url_attribute("src")?,
        ValueKind::Href => url_attribute("href")?,
        ValueKind::Data => url_attribute("data")?,
        ValueKind::Time => {
            let value: Cow<str> = match element.attribute("datetime") {
                Some(datetime) => Cow::Borrowed(datetime),
                None => Cow::Owned(element.text()),
            };
            PropertyValue::Literal(match LexicalValue::temporal(&value) {
                Some(temporal) => temporal.to_literal(&value, canonicalize),
                None => plain_literal(&value, language()),
            })
        }
        ValueKind::Text => PropertyValue::Literal(plain_literal(&element.text(), language())),
    };

    Ok(value)
}

/// Resolves `value` against the element's `xml:base` (itself resolved
/// against the document base), or the document base alone.
pub(crate) fn resolve(
    value: &str,
    element_base: Option<&str>,
    document_base: &Iri<String>,
) -> Result<NamedNode, IriParseError> {
    let base = match element_base {
        Some(element_base) => Cow::Owned(document_base.resolve(element_base)?),
        None => Cow::Borrowed(document_base),
    };
    let iri = base.resolve(value)?;
    Ok(NamedNode::new_unchecked(iri.into_inner()))
}

fn plain_literal(value: &str, language: Option<String>) -> Literal {
    match language {
        Some(language) => Literal::new_language_tagged_literal_unchecked(value, language),
        None => Literal::new_simple_literal(value),
    }
}

/// The `xsd:double`/`xsd:float` lexical space: an optionally signed decimal
/// mantissa with an optional exponent, or one of `INF`, `-INF` and `NaN`.
fn is_floating_point_lexical(lexical: &str) -> bool {
    if matches!(lexical, "INF" | "-INF" | "NaN") {
        return true;
    }

    fn digits(s: &str) -> (usize, &str) {
        let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        (end, &s[end..])
    }

    let unsigned = lexical.strip_prefix(['+', '-']).unwrap_or(lexical);
    let (whole, rest) = digits(unsigned);
    let (fraction, rest) = match rest.strip_prefix('.') {
        Some(rest) => digits(rest),
        None => (0, rest),
    };
    if whole + fraction == 0 {
        return false;
    }

    match rest.strip_prefix(['e', 'E']) {
        Some(exponent) => {
            let exponent = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            let (count, rest) = digits(exponent);
            count > 0 && rest.is_empty()
        }
        None => rest.is_empty(),
    }
}

/// A lexical form recognised as one of the XSD datatypes microdata values
/// are sniffed for.
#[derive(Clone, Copy, Debug)]
pub(crate) enum LexicalValue {
    Integer(Integer),
    Double(Double),
    Float(Float),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Duration(Duration),
}

impl LexicalValue {
    /// `data`/`meter` values: integer, then double, then float.
    pub(crate) fn numeric(lexical: &str) -> Option<Self> {
        if let Ok(value) = Integer::from_str(lexical) {
            return Some(Self::Integer(value));
        }

        if !is_floating_point_lexical(lexical) {
            return None;
        }

        // the double grammar is tried first, so a float is only reported for
        // forms the double parser rejects
        match (Double::from_str(lexical), Float::from_str(lexical)) {
            (Ok(value), _) => Some(Self::Double(value)),
            (Err(_), Ok(value)) => Some(Self::Float(value)),
            (Err(_), Err(_)) => None,
        }
    }

    /// `time` values: date, then time, then dateTime, then duration.
    pub(crate) fn temporal(lexical: &str) -> Option<Self> {
        if let Ok(value) = Date::from_str(lexical) {
            Some(Self::Date(value))
        } else if let Ok(value) = Time::from_str(lexical) {
            Some(Self::Time(value))
        } else if let Ok(value) = DateTime::from_str(lexical) {
            Some(Self::DateTime(value))
        } else if let Ok(value) = Duration::from_str(lexical) {
            Some(Self::Duration(value))
        } else {
            None
        }
    }

    pub(crate) fn datatype(&self) -> NamedNodeRef<'static> {
        match self {
            Self::Integer(_) => xsd::INTEGER,
            Self::Double(_) => xsd::DOUBLE,
            Self::Float(_) => xsd::FLOAT,
            Self::Date(_) => xsd::DATE,
            Self::Time(_) => xsd::TIME,
            Self::DateTime(_) => xsd::DATE_TIME,
            Self::Duration(_) => xsd::DURATION,
        }
    }

    fn canonical(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Double(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::Date(value) => value.to_string(),
            Self::Time(value) => value.to_string(),
            Self::DateTime(value) => value.to_string(),
            Self::Duration(value) => value.to_string(),
        }
    }

    fn to_literal(self, lexical: &str, canonicalize: bool) -> Literal {
        if canonicalize {
            Literal::new_typed_literal(self.canonical(), self.datatype())
        } else {
            Literal::new_typed_literal(lexical, self.datatype())
        }
    }
}
