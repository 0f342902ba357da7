//! Behavior of installed extension hooks: overriding block completion,
//! suppressing a recognizer, replacing an inline match, and the raw-HTML
//! trust escape hatch under safe mode.

use extramark::{
    Block, BlockData, BlockKind, Content, Element, Excerpt, Hook, Hooks, InlineKind, InlineMatch,
    Markdown,
};
use pretty_assertions::assert_eq;

/// Renders ```callout fences as an aside instead of a code block.
struct CalloutFences;

impl Hooks for CalloutFences {
    fn finish_block(&self, kind: BlockKind, block: &Block) -> Hook<Element> {
        if kind != BlockKind::FencedCode {
            return Hook::Default;
        }
        let BlockData::FencedCode {
            language: Some(language),
            lines,
            ..
        } = &block.data
        else {
            return Hook::Default;
        };
        if language != "callout" {
            return Hook::Default;
        }
        Hook::Match(Element::new("aside", Content::Inline(lines.join("\n"))))
    }
}

#[test]
fn completion_override_replaces_fenced_output() {
    let mut md = Markdown::new();
    md.set_hooks(Box::new(CalloutFences));
    assert_eq!(
        md.text("```callout\n*note*\n```"),
        "<aside><em>note</em></aside>"
    );
    // Other languages keep the built-in rendering.
    assert_eq!(
        md.text("```rust\nfn x() {}\n```"),
        "<pre><code class=\"language-rust\">fn x() {}</code></pre>"
    );
}

/// Claims the rule recognizer and rejects every candidate.
struct NoRules;

impl Hooks for NoRules {
    fn open_block(
        &self,
        kind: BlockKind,
        _line: &extramark::Line,
        _current: Option<&Block>,
    ) -> Hook<extramark::Opened> {
        if kind == BlockKind::Rule {
            Hook::NoMatch
        } else {
            Hook::Default
        }
    }
}

#[test]
fn recognizer_suppression_falls_through() {
    let mut md = Markdown::new();
    md.set_hooks(Box::new(NoRules));
    assert_eq!(md.text("---"), "<p>---</p>");
}

/// Rewrites the strikethrough recognizer to emit `<mark>`.
struct Highlight;

impl Hooks for Highlight {
    fn match_inline(&self, kind: InlineKind, excerpt: &Excerpt<'_>) -> Hook<InlineMatch> {
        if kind != InlineKind::Strikethrough || !excerpt.text.starts_with("~~") {
            return Hook::Default;
        }
        let Some(close) = excerpt.text[2..].find("~~") else {
            return Hook::Default;
        };
        let inner = &excerpt.text[2..2 + close];
        if inner.is_empty() {
            return Hook::Default;
        }
        Hook::Match(InlineMatch {
            position: None,
            extent: close + 4,
            element: Element::new("mark", Content::Inline(inner.to_string())),
        })
    }
}

#[test]
fn inline_override_takes_priority() {
    let mut md = Markdown::new();
    md.set_hooks(Box::new(Highlight));
    assert_eq!(md.text("a ~~b~~ c"), "<p>a <mark>b</mark> c</p>");
}

/// Emits raw HTML from a fence, optionally vouching for it.
struct RawWidget {
    trusted: bool,
}

impl Hooks for RawWidget {
    fn finish_block(&self, kind: BlockKind, block: &Block) -> Hook<Element> {
        if kind != BlockKind::FencedCode {
            return Hook::Default;
        }
        let BlockData::FencedCode {
            language: Some(language),
            lines,
            ..
        } = &block.data
        else {
            return Hook::Default;
        };
        if language != "widget" {
            return Hook::Default;
        }
        let mut element = Element::raw(format!("<p>{}</p>", lines.join("\n")));
        element.trusted_raw = self.trusted;
        Hook::Match(element)
    }
}

#[test]
fn untrusted_raw_output_is_escaped_in_safe_mode() {
    let mut md = Markdown::new();
    md.set_safe_mode(true);
    md.set_hooks(Box::new(RawWidget { trusted: false }));
    assert_eq!(md.text("```widget\nhello\n```"), "&lt;p&gt;hello&lt;/p&gt;");
}

#[test]
fn trusted_raw_output_passes_safe_mode() {
    let mut md = Markdown::new();
    md.set_safe_mode(true);
    md.set_hooks(Box::new(RawWidget { trusted: true }));
    assert_eq!(md.text("```widget\nhello\n```"), "<p>hello</p>");
}

#[test]
fn hidden_finish_suppresses_output() {
    struct DropQuotes;
    impl Hooks for DropQuotes {
        fn finish_block(&self, kind: BlockKind, _block: &Block) -> Hook<Element> {
            if kind == BlockKind::Quote {
                Hook::NoMatch
            } else {
                Hook::Default
            }
        }
    }
    let mut md = Markdown::new();
    md.set_hooks(Box::new(DropQuotes));
    assert_eq!(md.text("before\n\n> gone\n\nafter"), "<p>before</p>\n\n<p>after</p>");
}
