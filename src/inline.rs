/// Span-level parsing: marker scanning and recognizers
use crate::element::{Content, Element};
use crate::renderer::escape_html;
use crate::{Hook, Markdown};
use serde::{Deserialize, Serialize};

/// The slice handed to an inline recognizer.
pub struct Excerpt<'a> {
    /// Remaining text starting at the marker character.
    pub text: &'a str,
    /// The whole remaining inline run, for recognizers whose match may
    /// begin before the marker (bare URLs).
    pub context: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InlineKind {
    Code,
    Emphasis,
    Escape,
    Image,
    Link,
    Markup,
    Email,
    BareUrl,
    UrlTag,
    Strikethrough,
    Special,
}

/// A successful inline match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineMatch {
    /// Byte offset in `context` where the match begins. `None` means the
    /// marker position. A position past the marker is rejected by the
    /// engine, so a recognizer cannot skip text forward.
    pub position: Option<usize>,
    /// Bytes consumed, counted from the match position.
    pub extent: usize,
    pub element: Element,
}

const MARKERS: &[u8] = b"!&*:<[`~_\\";

/// Marker character to candidate kinds, in priority order.
fn marker_kinds(marker: u8) -> &'static [InlineKind] {
    use InlineKind::*;
    match marker {
        b'!' => &[Image],
        b'&' => &[Special],
        b'*' | b'_' => &[Emphasis],
        b':' => &[BareUrl],
        b'<' => &[UrlTag, Email, Markup],
        b'[' => &[Link],
        b'`' => &[Code],
        b'~' => &[Strikethrough],
        b'\\' => &[Escape],
        _ => &[],
    }
}

fn find_marker(text: &str) -> Option<usize> {
    text.bytes().position(|b| MARKERS.contains(&b))
}

impl Markdown {
    /// Scan a text run for markers, rendering recognized spans and
    /// escaping everything in between.
    pub(crate) fn parse_spans(&self, text: &str, forbidden: &[InlineKind]) -> String {
        let mut out = String::new();
        let mut rest = text;
        'scan: while let Some(pos) = find_marker(rest) {
            let marker = rest.as_bytes()[pos];
            let excerpt = Excerpt {
                text: &rest[pos..],
                context: rest,
            };
            for kind in marker_kinds(marker) {
                if forbidden.contains(kind) {
                    continue;
                }
                let hooked = match &self.hooks {
                    Some(hooks) => hooks.match_inline(*kind, &excerpt),
                    None => Hook::Default,
                };
                let matched = match hooked {
                    Hook::Match(m) => Some(m),
                    Hook::NoMatch => None,
                    Hook::Default => self.try_match(*kind, &excerpt),
                };
                let Some(m) = matched else { continue };
                let position = m.position.unwrap_or(pos);
                if position > pos {
                    continue;
                }
                // A zero-width match cannot advance the scan.
                if position == pos && m.extent == 0 {
                    continue;
                }
                self.push_text(&mut out, &rest[..position]);
                let mut element = m.element;
                element.forbidden.extend_from_slice(forbidden);
                out.push_str(&self.render_element(&element));
                rest = &rest[position + m.extent..];
                continue 'scan;
            }
            // Unmatched markers are literal text.
            self.push_text(&mut out, &rest[..=pos]);
            rest = &rest[pos + 1..];
        }
        self.push_text(&mut out, rest);
        out
    }

    /// Escape a plain-text run and resolve line breaks. A backslash or
    /// two trailing spaces force a break; with `breaks_enabled` every
    /// newline does.
    fn push_text(&self, out: &mut String, text: &str) {
        let segments: Vec<&str> = text.split('\n').collect();
        let last = segments.len() - 1;
        for (index, segment) in segments.iter().enumerate() {
            let mut segment = *segment;
            let mut hard_break = false;
            if index < last {
                if self.breaks_enabled {
                    hard_break = true;
                    segment = segment.trim_end_matches(' ');
                } else if let Some(stripped) = segment.strip_suffix('\\') {
                    hard_break = true;
                    segment = stripped.trim_end_matches(' ');
                } else if segment.ends_with("  ") {
                    hard_break = true;
                    segment = segment.trim_end_matches(' ');
                } else {
                    segment = segment.strip_suffix(' ').unwrap_or(segment);
                }
            }
            out.push_str(&escape_html(segment));
            if index < last {
                out.push_str(if hard_break { "<br />\n" } else { "\n" });
            }
        }
    }

    fn try_match(&self, kind: InlineKind, excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
        match kind {
            InlineKind::Code => match_code(excerpt),
            InlineKind::Emphasis => match_emphasis(excerpt),
            InlineKind::Escape => match_escape(excerpt),
            InlineKind::Image => self.match_image(excerpt),
            InlineKind::Link => self.match_link(excerpt),
            InlineKind::Markup => self.match_markup(excerpt),
            InlineKind::Email => match_email(excerpt),
            InlineKind::BareUrl => self.match_bare_url(excerpt),
            InlineKind::UrlTag => match_url_tag(excerpt),
            InlineKind::Strikethrough => match_strikethrough(excerpt),
            InlineKind::Special => match_special(excerpt),
        }
    }

    fn match_image(&self, excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
        let text = excerpt.text;
        if !text[1..].starts_with('[') {
            return None;
        }
        let sub = Excerpt {
            text: &text[1..],
            context: excerpt.context,
        };
        let link = self.match_link(&sub)?;
        let mut src = None;
        let mut title = None;
        for (name, value) in &link.element.attributes {
            match name.as_str() {
                "href" => src = value.clone(),
                "title" => title = value.clone(),
                _ => {}
            }
        }
        let Content::Inline(label) = &link.element.content else {
            return None;
        };
        let img = Element::new("img", Content::Empty)
            .with_attr("src", src)
            .with_attr("alt", Some(label.clone()))
            .with_attr("loading", Some("lazy".to_string()))
            .with_attr("decoding", Some("async".to_string()));
        // A caption promotes the image to a figure.
        let element = match title.filter(|t| !t.is_empty()) {
            Some(caption) => {
                let figcaption = Element::new("figcaption", Content::Text(caption));
                Element::new("figure", Content::Children(vec![img, figcaption]))
            }
            None => img,
        };
        Some(InlineMatch {
            position: None,
            extent: link.extent + 1,
            element,
        })
    }

    fn match_link(&self, excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
        let text = excerpt.text;
        let bytes = text.as_bytes();
        // Label scan counts bracket depth so labels may nest brackets.
        let mut i = 1;
        let mut depth = 0;
        let mut label_end = None;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'[' => {
                    depth += 1;
                    i += 1;
                }
                b']' => {
                    if depth == 0 {
                        label_end = Some(i);
                        break;
                    }
                    depth -= 1;
                    i += 1;
                }
                _ => i += 1,
            }
        }
        let label_end = label_end?;
        let label = &text[1..label_end];
        let mut extent = label_end + 1;
        let rest = &text[extent..];

        let (url, title, consumed) = if let Some(found) = parse_inline_destination(rest) {
            found
        } else {
            let (ref_label, consumed) = match parse_reference_suffix(rest) {
                Some((l, n)) if !l.is_empty() => (l, n),
                Some((_, n)) => (label.to_string(), n),
                None => (label.to_string(), 0),
            };
            let reference = self.references.get(&crate::normalize_label(&ref_label))?;
            (reference.url.clone(), reference.title.clone(), consumed)
        };
        extent += consumed;
        let element = Element::new("a", Content::Inline(label.to_string()))
            .with_attr("href", Some(url))
            .with_attr("title", title)
            .forbid(&[InlineKind::Link, InlineKind::BareUrl]);
        Some(InlineMatch {
            position: None,
            extent,
            element,
        })
    }

    fn match_markup(&self, excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
        if self.markup_escaped || self.safe_mode {
            return None;
        }
        let text = excerpt.text;
        if let Some(rest) = text.strip_prefix("</") {
            // Closing tag.
            let name_len = rest
                .bytes()
                .take_while(|b| b.is_ascii_alphanumeric() || *b == b'-' || *b == b'_')
                .count();
            if name_len == 0 || !rest.as_bytes().first()?.is_ascii_alphabetic() {
                return None;
            }
            let after = rest[name_len..].trim_start_matches(' ');
            if !after.starts_with('>') {
                return None;
            }
            let extent = text.len() - after.len() + 1;
            return Some(raw_markup(&text[..extent], extent));
        }
        if text.starts_with("<!--") {
            let close = text.find("-->")?;
            let extent = close + 3;
            return Some(raw_markup(&text[..extent], extent));
        }
        let tag = scan_open_tag(text)?;
        Some(raw_markup(&text[..tag.len], tag.len))
    }

    fn match_bare_url(&self, excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
        if !self.urls_linked || !excerpt.text[1..].starts_with("//") {
            return None;
        }
        let context = excerpt.context;
        let start = find_url_scheme(context)?;
        let tail = &context[start..];
        let mut len = tail
            .find(|c: char| c.is_whitespace() || c == '<')
            .unwrap_or(tail.len());
        // Trailing punctuation stays outside the link; trailing slashes
        // stay inside.
        while len > 0 {
            let ch = tail[..len].chars().next_back()?;
            if ch.is_alphanumeric() || ch == '/' || ch == '_' {
                break;
            }
            len -= ch.len_utf8();
        }
        if len == 0 {
            return None;
        }
        let url = tail[..len].to_string();
        let element = Element::new("a", Content::Text(url.clone()))
            .with_attr("href", Some(url));
        Some(InlineMatch {
            position: Some(start),
            extent: len,
            element,
        })
    }
}

fn raw_markup(markup: &str, extent: usize) -> InlineMatch {
    InlineMatch {
        position: None,
        extent,
        element: Element::raw(markup.to_string()),
    }
}

/// First `http://` or `https://` in the text, at a word boundary.
fn find_url_scheme(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    for i in 0..bytes.len() {
        if bytes.len() - i < 7 {
            break;
        }
        if i > 0 && bytes[i - 1].is_ascii_alphanumeric() {
            continue;
        }
        if !bytes[i..i + 4].eq_ignore_ascii_case(b"http") {
            continue;
        }
        let scheme_len = if bytes[i + 4].eq_ignore_ascii_case(&b's') {
            5
        } else {
            4
        };
        if bytes[i + scheme_len..].starts_with(b"://") {
            return Some(i);
        }
    }
    None
}

fn match_code(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    let bytes = text.as_bytes();
    let open = bytes.iter().take_while(|b| **b == b'`').count();
    let mut i = open;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
        if run != open {
            i += run;
            continue;
        }
        let content = text[open..i].trim_matches(' ');
        if content.is_empty() {
            return None;
        }
        let collapsed = content
            .split('\n')
            .map(|l| l.trim_end_matches(' '))
            .collect::<Vec<_>>()
            .join(" ");
        // `^target` turns the span into an in-page cross-reference.
        let element = match collapsed.strip_prefix('^') {
            Some(target) if !target.is_empty() => {
                let code = Element::new("code", Content::Text(target.to_string()));
                Element::new("a", Content::Span(vec![code]))
                    .with_attr("href", Some(format!("#{target}")))
                    .with_attr("class", Some("anchor".to_string()))
            }
            _ => Element::new("code", Content::Text(collapsed)),
        };
        return Some(InlineMatch {
            position: None,
            extent: i + run,
            element,
        });
    }
    None
}

fn match_emphasis(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    let bytes = text.as_bytes();
    let marker = bytes[0];
    if bytes.get(1) == Some(&marker)
        && let Some(end) = scan_strong(text, marker)
    {
        let element = Element::new("strong", Content::Inline(text[2..end].to_string()));
        return Some(InlineMatch {
            position: None,
            extent: end + 2,
            element,
        });
    }
    let end = scan_em(text, marker)?;
    let element = Element::new("em", Content::Inline(text[1..end].to_string()));
    Some(InlineMatch {
        position: None,
        extent: end + 1,
        element,
    })
}

/// Index of the closing double marker, skipping escapes and nested
/// single-marker spans.
fn scan_strong(text: &str, marker: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 2;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == marker => {
                if bytes.get(i + 1) == Some(&marker) {
                    if i == 2 {
                        return None;
                    }
                    // Underscores close only at a word boundary.
                    if marker == b'_'
                        && text[i + 2..]
                            .chars()
                            .next()
                            .is_some_and(|c| c.is_alphanumeric() || c == '_')
                    {
                        i += 1;
                        continue;
                    }
                    return Some(i);
                }
                let mut j = i + 1;
                let mut closed = None;
                while j < bytes.len() {
                    match bytes[j] {
                        b'\\' => j += 2,
                        b if b == marker => {
                            closed = Some(j);
                            break;
                        }
                        _ => j += 1,
                    }
                }
                i = closed? + 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Index of the closing single marker, skipping escapes and nested
/// double-marker spans.
fn scan_em(text: &str, marker: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == marker => {
                if bytes.get(i + 1) == Some(&marker) {
                    // Nested strong: skip to its closing pair.
                    let mut j = i + 2;
                    let mut closed = None;
                    while j + 1 < bytes.len() {
                        match bytes[j] {
                            b'\\' => j += 2,
                            b if b == marker && bytes[j + 1] == marker => {
                                closed = Some(j);
                                break;
                            }
                            _ => j += 1,
                        }
                    }
                    i = closed? + 2;
                    continue;
                }
                if i == 1 {
                    return None;
                }
                if marker == b'_'
                    && text[i + 1..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphanumeric() || c == '_')
                {
                    i += 1;
                    continue;
                }
                return Some(i);
            }
            _ => i += 1,
        }
    }
    None
}

const ESCAPABLE: &str = "\\`*_{}[]()<>#+-.!|~\"'&:;%^=?@/";

fn match_escape(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let mut chars = excerpt.text.chars();
    chars.next();
    let ch = chars.next()?;
    if !ESCAPABLE.contains(ch) {
        return None;
    }
    Some(InlineMatch {
        position: None,
        extent: 1 + ch.len_utf8(),
        element: Element::text(&ch.to_string()),
    })
}

fn match_url_tag(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    let rest = text.strip_prefix('<')?;
    let close = rest.find('>')?;
    let inner = &rest[..close];
    if inner.contains([' ', '<']) {
        return None;
    }
    let scheme_len = inner
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'))
        .count();
    if scheme_len == 0 || !inner[scheme_len..].starts_with("://") {
        return None;
    }
    if inner.len() == scheme_len + 3 {
        return None;
    }
    let element = Element::new("a", Content::Text(inner.to_string()))
        .with_attr("href", Some(inner.to_string()));
    Some(InlineMatch {
        position: None,
        extent: close + 2,
        element,
    })
}

fn match_email(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    let rest = text.strip_prefix('<')?;
    let close = rest.find('>')?;
    let inner = &rest[..close];
    if inner.contains([' ', '<']) {
        return None;
    }
    let address = inner.strip_prefix("mailto:").unwrap_or(inner);
    let at = address.find('@')?;
    if at == 0 || at + 1 == address.len() || address[at + 1..].contains('@') {
        return None;
    }
    let href = if inner.len() == address.len() {
        format!("mailto:{inner}")
    } else {
        inner.to_string()
    };
    let element = Element::new("a", Content::Text(inner.to_string())).with_attr("href", Some(href));
    Some(InlineMatch {
        position: None,
        extent: close + 2,
        element,
    })
}

fn match_strikethrough(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    if !text[1..].starts_with('~') {
        return None;
    }
    let mut search = 2;
    while let Some(found) = text[search..].find("~~") {
        let close = search + found;
        let content = &text[2..close];
        if !content.is_empty()
            && !content.starts_with(|c: char| c.is_whitespace())
            && !content.ends_with(|c: char| c.is_whitespace())
        {
            let element = Element::new("del", Content::Inline(content.to_string()));
            return Some(InlineMatch {
                position: None,
                extent: close + 2,
                element,
            });
        }
        search = close + 1;
    }
    None
}

/// HTML entities pass through unescaped, so escaping stays idempotent.
fn match_special(excerpt: &Excerpt<'_>) -> Option<InlineMatch> {
    let text = excerpt.text;
    let rest = &text[1..];
    let (hash, body) = match rest.strip_prefix('#') {
        Some(body) => (1, body),
        None => (0, rest),
    };
    let run = body.bytes().take_while(|b| b.is_ascii_alphanumeric()).count();
    if run == 0 || !body[run..].starts_with(';') {
        return None;
    }
    let extent = 1 + hash + run + 1;
    let mut element = Element::raw(text[..extent].to_string());
    element.trusted_raw = true;
    Some(InlineMatch {
        position: None,
        extent,
        element,
    })
}

/// Inline destination: `(url "title")` with one nesting level of parens
/// allowed in the url and no spaces outside the title.
fn parse_inline_destination(rest: &str) -> Option<(String, Option<String>, usize)> {
    let inner = rest.strip_prefix('(')?;
    let bytes = inner.as_bytes();
    let mut i = 0;
    while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\n')) {
        i += 1;
    }
    let dest_start = i;
    loop {
        match bytes.get(i) {
            None | Some(b' ' | b'\t' | b'\n' | b')') => break,
            Some(b'(') => {
                let mut j = i + 1;
                while j < bytes.len() && !matches!(bytes[j], b')' | b' ') {
                    j += 1;
                }
                if bytes.get(j) != Some(&b')') || j == i + 1 {
                    return None;
                }
                i = j + 1;
            }
            Some(_) => i += 1,
        }
    }
    if i == dest_start {
        return None;
    }
    let url = inner[dest_start..i].to_string();
    let mut title = None;
    let after_dest = i;
    while bytes.get(i) == Some(&b' ') {
        i += 1;
    }
    if i > after_dest && matches!(bytes.get(i), Some(b'"' | b'\'')) {
        let quote = bytes[i] as char;
        let close = inner[i + 1..].find(quote)? + i + 1;
        title = Some(inner[i + 1..close].to_string());
        i = close + 1;
    }
    while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\n')) {
        i += 1;
    }
    if bytes.get(i) != Some(&b')') {
        return None;
    }
    Some((url, title, i + 2))
}

/// Second-label suffix of a reference link: `[label2]`, possibly empty.
fn parse_reference_suffix(rest: &str) -> Option<(String, usize)> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\n')) {
        i += 1;
    }
    if bytes.get(i) != Some(&b'[') {
        return None;
    }
    let close = rest[i + 1..].find(']')? + i + 1;
    Some((rest[i + 1..close].to_string(), close + 1))
}

pub(crate) struct ScannedTag {
    pub name: String,
    pub self_closing: bool,
    pub len: usize,
}

/// Scan an opening HTML tag with optional attributes. Attribute values
/// may be double-quoted, single-quoted or unquoted.
pub(crate) fn scan_open_tag(text: &str) -> Option<ScannedTag> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'<') || !bytes.get(1)?.is_ascii_alphabetic() {
        return None;
    }
    let mut i = 2;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'-' | b'_')) {
        i += 1;
    }
    let name = text[1..i].to_string();
    loop {
        let ws_start = i;
        while matches!(bytes.get(i), Some(b' ' | b'\t' | b'\n')) {
            i += 1;
        }
        match bytes.get(i)? {
            b'>' => {
                return Some(ScannedTag {
                    name,
                    self_closing: false,
                    len: i + 1,
                });
            }
            b'/' => {
                if bytes.get(i + 1) != Some(&b'>') {
                    return None;
                }
                return Some(ScannedTag {
                    name,
                    self_closing: true,
                    len: i + 2,
                });
            }
            _ => {
                if ws_start == i {
                    return None;
                }
                let attr_start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric()
                        || matches!(bytes[i], b'-' | b'_' | b':' | b'.'))
                {
                    i += 1;
                }
                if i == attr_start {
                    return None;
                }
                if bytes.get(i) == Some(&b'=') {
                    i += 1;
                    match bytes.get(i)? {
                        b'"' => {
                            i = text[i + 1..].find('"')? + i + 2;
                        }
                        b'\'' => {
                            i = text[i + 1..].find('\'')? + i + 2;
                        }
                        _ => {
                            let value_start = i;
                            while i < bytes.len()
                                && !matches!(
                                    bytes[i],
                                    b' ' | b'\t' | b'\n' | b'"' | b'\'' | b'=' | b'<' | b'>' | b'`'
                                )
                            {
                                i += 1;
                            }
                            if i == value_start {
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Tags that cannot open an HTML block because they are text-level.
pub(crate) fn is_text_level_element(name: &str) -> bool {
    const TEXT_LEVEL: &[&str] = &[
        "a", "abbr", "acronym", "b", "bdo", "big", "br", "button", "cite", "code", "del", "dfn",
        "em", "i", "img", "input", "ins", "kbd", "label", "map", "mark", "object", "output", "q",
        "rp", "rt", "ruby", "s", "samp", "select", "small", "span", "strike", "strong", "sub",
        "sup", "textarea", "time", "tt", "u", "var", "wbr",
    ];
    let lower = name.to_ascii_lowercase();
    TEXT_LEVEL.contains(&lower.as_str())
}

pub(crate) fn is_void_element(name: &str) -> bool {
    const VOID: &[&str] = &[
        "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
        "source", "track", "wbr",
    ];
    let lower = name.to_ascii_lowercase();
    VOID.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Markdown, markdown_to_html};

    #[test]
    fn emphasis_nesting() {
        assert_eq!(
            markdown_to_html("**a *b* c**"),
            "<p><strong>a <em>b</em> c</strong></p>"
        );
        assert_eq!(
            markdown_to_html("*a **b** c*"),
            "<p><em>a <strong>b</strong> c</em></p>"
        );
    }

    #[test]
    fn underscore_does_not_close_mid_word() {
        assert_eq!(markdown_to_html("_snake_case here_"), "<p><em>snake_case here</em></p>");
    }

    #[test]
    fn unclosed_emphasis_stays_literal() {
        assert_eq!(markdown_to_html("*oops"), "<p>*oops</p>");
        assert_eq!(markdown_to_html("**oops"), "<p>**oops</p>");
    }

    #[test]
    fn code_span_collapses_newlines_and_shields_markers() {
        assert_eq!(markdown_to_html("`a *b*`"), "<p><code>a *b*</code></p>");
        assert_eq!(markdown_to_html("`a\nb`"), "<p><code>a b</code></p>");
        assert_eq!(markdown_to_html("`` a`b ``"), "<p><code>a`b</code></p>");
    }

    #[test]
    fn code_span_cross_reference() {
        assert_eq!(
            markdown_to_html("see `^setup`"),
            "<p>see <a href=\"#setup\" class=\"anchor\"><code>setup</code></a></p>"
        );
    }

    #[test]
    fn nested_brackets_in_link_label() {
        assert_eq!(
            markdown_to_html("[a [b] c](/u)"),
            "<p><a href=\"/u\">a [b] c</a></p>"
        );
    }

    #[test]
    fn link_label_cannot_contain_a_link() {
        // The balanced label wins; the inner link stays literal because
        // labels forbid nested links.
        assert_eq!(
            markdown_to_html("[x [y](/inner)](/outer)"),
            "<p><a href=\"/outer\">x [y](/inner)</a></p>"
        );
    }

    #[test]
    fn link_title_variants() {
        assert_eq!(
            markdown_to_html("[a](/u \"T\")"),
            "<p><a href=\"/u\" title=\"T\">a</a></p>"
        );
        assert_eq!(
            markdown_to_html("[a](/u 'T')"),
            "<p><a href=\"/u\" title=\"T\">a</a></p>"
        );
    }

    #[test]
    fn collapsed_reference_uses_first_label() {
        assert_eq!(
            markdown_to_html("[a][]\n\n[a]: /u"),
            "<p><a href=\"/u\">a</a></p>"
        );
    }

    #[test]
    fn bare_url_autolinked_with_position() {
        assert_eq!(
            markdown_to_html("go to https://example.com/ now"),
            "<p>go to <a href=\"https://example.com/\">https://example.com/</a> now</p>"
        );
    }

    #[test]
    fn bare_url_trailing_punctuation_excluded() {
        assert_eq!(
            markdown_to_html("see https://example.com/a."),
            "<p>see <a href=\"https://example.com/a\">https://example.com/a</a>.</p>"
        );
    }

    #[test]
    fn urls_linked_can_be_disabled() {
        let mut md = Markdown::new();
        md.set_urls_linked(false);
        assert_eq!(
            md.text("see https://example.com"),
            "<p>see https://example.com</p>"
        );
    }

    #[test]
    fn url_tag_and_email_autolinks() {
        assert_eq!(
            markdown_to_html("<https://example.com>"),
            "<p><a href=\"https://example.com\">https://example.com</a></p>"
        );
        assert_eq!(
            markdown_to_html("<me@example.com>"),
            "<p><a href=\"mailto:me@example.com\">me@example.com</a></p>"
        );
    }

    #[test]
    fn escapes_are_idempotent_with_entities() {
        assert_eq!(markdown_to_html("AT&T &amp; &#169;"), "<p>AT&amp;T &amp; &#169;</p>");
    }

    #[test]
    fn backslash_escape_suppresses_emphasis() {
        assert_eq!(markdown_to_html("\\*not em\\*"), "<p>*not em*</p>");
    }

    #[test]
    fn strikethrough_requires_tight_edges() {
        assert_eq!(markdown_to_html("~~gone~~"), "<p><del>gone</del></p>");
        assert_eq!(markdown_to_html("~~ nope ~~"), "<p>~~ nope ~~</p>");
    }

    #[test]
    fn hard_break_with_trailing_spaces() {
        assert_eq!(markdown_to_html("a  \nb"), "<p>a<br />\nb</p>");
        assert_eq!(markdown_to_html("a \nb"), "<p>a\nb</p>");
    }

    #[test]
    fn hard_break_with_backslash() {
        assert_eq!(markdown_to_html("a\\\nb"), "<p>a<br />\nb</p>");
    }

    #[test]
    fn breaks_enabled_turns_every_newline() {
        let mut md = Markdown::new();
        md.set_breaks_enabled(true);
        assert_eq!(md.text("a\nb"), "<p>a<br />\nb</p>");
    }

    #[test]
    fn inline_markup_passthrough() {
        assert_eq!(
            markdown_to_html("a <span class=\"x\">b</span> c"),
            "<p>a <span class=\"x\">b</span> c</p>"
        );
    }

    #[test]
    fn scan_open_tag_variants() {
        assert!(scan_open_tag("<div>").is_some());
        assert!(scan_open_tag("<img src=\"/x\" />").is_some_and(|t| t.self_closing));
        assert!(scan_open_tag("<a href=unquoted>").is_some());
        assert!(scan_open_tag("<1bad>").is_none());
        assert!(scan_open_tag("<div foo=>").is_none());
    }
}
