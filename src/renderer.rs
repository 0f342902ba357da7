/// Element-tree serialization and the safe-mode sanitizer
use crate::Markdown;
use crate::element::{Content, Element};

/// Escape text for an HTML text node or double-quoted attribute value.
pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Attribute names must start with an alphanumeric and contain only
/// alphanumerics, dashes and underscores. Event handlers are dropped.
fn is_safe_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !(name.len() >= 2 && name[..2].eq_ignore_ascii_case("on"))
}

const SAFE_URL_PREFIXES: &[&str] = &[
    "http://",
    "https://",
    "ftp://",
    "ftps://",
    "mailto:",
    "data:image/png;base64,",
    "data:image/gif;base64,",
    "data:image/jpeg;base64,",
    "irc:",
    "ircs:",
    "git:",
    "ssh:",
    "news:",
    "steam:",
];

/// URLs on an unknown scheme keep working as relative links: every colon
/// is percent-encoded, which neutralizes `javascript:` and friends
/// without dropping the attribute.
fn filter_unsafe_url(url: &str) -> String {
    for prefix in SAFE_URL_PREFIXES {
        if url.len() >= prefix.len()
            && url.is_char_boundary(prefix.len())
            && url[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            return url.to_string();
        }
    }
    url.replace(':', "%3A")
}

impl Markdown {
    /// Serialize an element. Sanitization happens here, while emitting,
    /// so the tree itself is never mutated.
    pub(crate) fn render_element(&self, element: &Element) -> String {
        let mut out = String::new();
        if !element.name.is_empty() {
            out.push('<');
            out.push_str(&element.name);
            for (name, value) in &element.attributes {
                let Some(value) = value else { continue };
                if self.safe_mode && !is_safe_attribute_name(name) {
                    continue;
                }
                let value = if self.safe_mode && (name == "href" || name == "src") {
                    filter_unsafe_url(value)
                } else {
                    value.clone()
                };
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&escape_html(&value));
                out.push('"');
            }
        }
        let rendered = match &element.content {
            Content::Empty => None,
            Content::Text(text) => Some(escape_html(text)),
            Content::Inline(text) => Some(self.parse_spans(text, &element.forbidden)),
            Content::Raw(html) => Some(if self.safe_mode && !element.trusted_raw {
                escape_html(html)
            } else {
                html.clone()
            }),
            Content::Span(children) => Some(
                children
                    .iter()
                    .map(|child| self.render_element(child))
                    .collect(),
            ),
            Content::Children(children) => {
                let mut inner = String::new();
                // Named children sit on their own lines; a nameless child
                // (unwrapped tight list item text) glues to the tag.
                if children.first().is_some_and(|c| !c.name.is_empty()) {
                    inner.push('\n');
                }
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        inner.push('\n');
                    }
                    inner.push_str(&self.render_element(child));
                }
                if children.last().is_some_and(|c| !c.name.is_empty()) {
                    inner.push('\n');
                }
                Some(inner)
            }
        };
        if element.name.is_empty() {
            return rendered.unwrap_or_default();
        }
        match rendered {
            None => out.push_str(" />"),
            Some(content) => {
                out.push('>');
                out.push_str(&content);
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Content, Element};

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html("a < b & \"c\" > d"), "a &lt; b &amp; &quot;c&quot; &gt; d");
    }

    #[test]
    fn empty_content_self_closes() {
        let md = Markdown::new();
        let hr = Element::new("hr", Content::Empty);
        assert_eq!(md.render_element(&hr), "<hr />");
    }

    #[test]
    fn none_valued_attributes_are_omitted() {
        let md = Markdown::new();
        let el = Element::new("a", Content::Text("x".to_string()))
            .with_attr("href", Some("/u".to_string()))
            .with_attr("title", None);
        assert_eq!(md.render_element(&el), "<a href=\"/u\">x</a>");
    }

    #[test]
    fn safe_mode_drops_event_handlers() {
        let mut md = Markdown::new();
        md.set_safe_mode(true);
        let el = Element::new("a", Content::Text("x".to_string()))
            .with_attr("href", Some("/u".to_string()))
            .with_attr("onclick", Some("alert(1)".to_string()))
            .with_attr("ONMOUSEOVER", Some("alert(2)".to_string()))
            .with_attr("data-x", Some("ok".to_string()));
        assert_eq!(
            md.render_element(&el),
            "<a href=\"/u\" data-x=\"ok\">x</a>"
        );
    }

    #[test]
    fn safe_mode_neutralizes_unknown_schemes() {
        assert_eq!(filter_unsafe_url("javascript:alert(1)"), "javascript%3Aalert(1)");
        assert_eq!(filter_unsafe_url("JAVASCRIPT:x"), "JAVASCRIPT%3Ax");
        assert_eq!(filter_unsafe_url("/relative/path"), "/relative/path");
        assert_eq!(filter_unsafe_url("https://ok.example"), "https://ok.example");
        assert_eq!(
            filter_unsafe_url("data:image/png;base64,AAAA"),
            "data:image/png;base64,AAAA"
        );
        assert_eq!(filter_unsafe_url("data:text/html,x"), "data%3Atext/html,x");
    }

    #[test]
    fn safe_mode_escapes_untrusted_raw() {
        let mut md = Markdown::new();
        md.set_safe_mode(true);
        let raw = Element::raw("<p>x</p>".to_string());
        assert_eq!(md.render_element(&raw), "&lt;p&gt;x&lt;/p&gt;");
        let mut trusted = Element::raw("<p>x</p>".to_string());
        trusted.trusted_raw = true;
        assert_eq!(md.render_element(&trusted), "<p>x</p>");
    }

    #[test]
    fn children_layout_newlines() {
        let md = Markdown::new();
        let list = Element::new(
            "ul",
            Content::Children(vec![
                Element::new("li", Content::Children(vec![Element::new(
                    "",
                    Content::Text("a".to_string()),
                )])),
            ]),
        );
        assert_eq!(md.render_element(&list), "<ul>\n<li>a</li>\n</ul>");
    }
}
