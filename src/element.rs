/// Output tree produced by the block and inline engines
use crate::inline::InlineKind;
use serde::{Deserialize, Serialize};

/// What an element carries between its tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    /// Nothing. Void elements (`hr`, `br`, `img`) self-close.
    Empty,
    /// Plain text, HTML-escaped exactly once at render time.
    Text(String),
    /// Text that re-enters the inline engine at render time.
    Inline(String),
    /// Block-level children, newline-separated in the output.
    Children(Vec<Element>),
    /// Inline children, concatenated without separators.
    Span(Vec<Element>),
    /// Pre-rendered markup. Escaped under safe mode unless the element
    /// carries the `trusted_raw` flag.
    Raw(String),
}

/// A single node of the output tree: tag name, ordered attributes and
/// content. An empty name renders content only, with no surrounding tag.
///
/// Attributes keep insertion order; a `None` value means the attribute is
/// omitted entirely (so recognizers can record "no id" without reordering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, Option<String>)>,
    pub content: Content,
    /// Inline kinds that must not match inside this element's own nested
    /// inline parse (a link label cannot contain another link).
    pub forbidden: Vec<InlineKind>,
    /// Permits `Raw` content to pass through even in safe mode. Only an
    /// extension that guarantees safety itself should set this.
    pub trusted_raw: bool,
}

impl Element {
    pub fn new(name: &str, content: Content) -> Self {
        Element {
            name: name.to_string(),
            attributes: Vec::new(),
            content,
            forbidden: Vec::new(),
            trusted_raw: false,
        }
    }

    /// A bare text run, escaped at render time.
    pub fn text(text: &str) -> Self {
        Element::new("", Content::Text(text.to_string()))
    }

    /// A tagless raw fragment.
    pub fn raw(html: String) -> Self {
        Element::new("", Content::Raw(html))
    }

    pub fn with_attr(mut self, name: &str, value: Option<String>) -> Self {
        self.attributes.push((name.to_string(), value));
        self
    }

    /// Sets an existing attribute in place, or appends it.
    pub fn set_attr(&mut self, name: &str, value: Option<String>) {
        for (existing, slot) in &mut self.attributes {
            if existing == name {
                *slot = value;
                return;
            }
        }
        self.attributes.push((name.to_string(), value));
    }

    pub fn forbid(mut self, kinds: &[InlineKind]) -> Self {
        self.forbidden.extend_from_slice(kinds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_attr_replaces_in_place() {
        let mut el = Element::new("tr", Content::Empty)
            .with_attr("class", Some("wide".to_string()));
        el.set_attr("class", Some("anchor".to_string()));
        el.set_attr("id", Some("row-1".to_string()));
        assert_eq!(
            el.attributes,
            vec![
                ("class".to_string(), Some("anchor".to_string())),
                ("id".to_string(), Some("row-1".to_string())),
            ]
        );
    }

    #[test]
    fn none_valued_attribute_is_kept_in_order() {
        let el = Element::new("h1", Content::Empty).with_attr("id", None);
        assert_eq!(el.attributes.len(), 1);
        assert!(el.attributes[0].1.is_none());
    }
}
