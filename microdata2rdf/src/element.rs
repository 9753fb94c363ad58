use std::hash::{Hash, Hasher};
use std::iter::successors;

use itertools::Itertools;
use scraper::ElementRef;

/// The view of a parsed document node that item extraction needs.
///
/// Equality and hashing must follow *node identity*: two handles are equal
/// only if they refer to the same node of the same parsed document. The
/// extractor keys its per-document subject memory on the handle itself.
pub trait Element: Clone + Eq + Hash {
    fn attribute(&self, name: &str) -> Option<&str>;

    fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// Child elements, in document order.
    fn children(&self) -> Vec<Self>;

    fn parent(&self) -> Option<Self>;

    fn tag_name(&self) -> &str;

    /// Concatenated text of all descendant text nodes.
    fn text(&self) -> String;

    /// The first element in the whole document with the given `id`.
    fn find_by_id(&self, id: &str) -> Option<Self>;

    /// The nearest `xml:base` in effect for this element, if any.
    fn base(&self) -> Option<String> {
        inherited(self, |el| el.attribute("xml:base").map(str::to_string))
    }

    /// The language in effect for this element.
    ///
    /// `xml:lang` takes precedence over `lang` on the same element. An empty
    /// value is returned as-is and means “no language”; it stops inheritance.
    fn language(&self) -> Option<String> {
        inherited(self, |el| {
            el.attribute("xml:lang")
                .or_else(|| el.attribute("lang"))
                .map(str::to_string)
        })
    }

    /// Slash-separated tag names from the root down to this element.
    fn display_path(&self) -> String {
        let mut names = successors(Some(self.clone()), Self::parent)
            .map(|el| el.tag_name().to_string())
            .collect_vec();
        names.reverse();
        names.join("/")
    }
}

fn inherited<E: Element>(element: &E, lookup: impl Fn(&E) -> Option<String>) -> Option<String> {
    successors(Some(element.clone()), E::parent).find_map(|el| lookup(&el))
}

/// [`Element`] over a `scraper` parse tree.
#[derive(Clone, Copy, Debug)]
pub struct HtmlElement<'a> {
    element: ElementRef<'a>,
}

impl<'a> HtmlElement<'a> {
    pub fn new(element: ElementRef<'a>) -> Self {
        Self { element }
    }
}

// identity is the node's index in the tree arena
impl PartialEq for HtmlElement<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.element.id() == other.element.id()
    }
}

impl Eq for HtmlElement<'_> {}

impl Hash for HtmlElement<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.element.id().hash(state);
    }
}

impl Element for HtmlElement<'_> {
    fn attribute(&self, name: &str) -> Option<&str> {
        self.element.value().attr(name)
    }

    fn children(&self) -> Vec<Self> {
        self.element
            .children()
            .filter_map(ElementRef::wrap)
            .map(HtmlElement::new)
            .collect()
    }

    fn parent(&self) -> Option<Self> {
        self.element
            .parent()
            .and_then(ElementRef::wrap)
            .map(HtmlElement::new)
    }

    fn tag_name(&self) -> &str {
        self.element.value().name()
    }

    fn text(&self) -> String {
        self.element.text().join("")
    }

    fn find_by_id(&self, id: &str) -> Option<Self> {
        // climb to the document node so the search covers the whole tree
        let root = self.element.ancestors().last().unwrap_or(*self.element);
        root.descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().id() == Some(id))
            .map(HtmlElement::new)
    }
}

#[cfg(test)]
mod tests {
    use scraper::Html;

    use super::*;

    fn find<'a>(doc: &'a Html, id: &str) -> HtmlElement<'a> {
        HtmlElement::new(doc.root_element())
            .find_by_id(id)
            .expect("element exists")
    }

    #[test]
    fn language_prefers_xml_lang_and_inherits() {
        let doc = Html::parse_document(
            r#"<html lang="en"><body>
                <p id="a">a</p>
                <p id="b" lang="de" xml:lang="fr">b</p>
                <div lang=""><p id="c">c</p></div>
            </body></html>"#,
        );

        assert_eq!(find(&doc, "a").language().as_deref(), Some("en"));
        assert_eq!(find(&doc, "b").language().as_deref(), Some("fr"));
        assert_eq!(find(&doc, "c").language().as_deref(), Some(""));
    }

    #[test]
    fn identity_distinguishes_identical_elements() {
        let doc = Html::parse_document(r#"<p id="x">same</p><p id="y">same</p>"#);
        let x = find(&doc, "x");
        let y = find(&doc, "y");
        assert_ne!(x, y);
        assert_eq!(x, find(&doc, "x"));
        assert_eq!(x.display_path(), "html/body/p");
    }

    #[test]
    fn base_is_inherited() {
        let doc = Html::parse_document(
            r#"<div xml:base="http://example.org/dir/"><span id="s">s</span></div>"#,
        );
        assert_eq!(
            find(&doc, "s").base().as_deref(),
            Some("http://example.org/dir/")
        );
    }
}
