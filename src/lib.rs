//! Markdown-to-HTML rendering with a CommonMark-like structural model and
//! a handful of custom extensions: header anchors (`# Title {#id}`),
//! captioned images (a titled image becomes `<figure>`), table row
//! ids/classes (`{.class #id}` at the start of a row) and quote classes
//! (`> {.note}`).
//!
//! ```
//! use extramark::markdown_to_html;
//!
//! let html = markdown_to_html("**bold** and _italic_");
//! assert_eq!(html, "<p><strong>bold</strong> and <em>italic</em></p>");
//! ```
//!
//! Parsing is a two-level pipeline: a line-oriented block engine with an
//! explicit continue/complete protocol builds an [`Element`] tree, and the
//! inline engine resolves span-level markers (reference links are looked
//! up after the whole document has been scanned, so forward references
//! work). Rendering never fails; malformed input degrades to literal text.

pub mod block;
pub mod element;
pub mod inline;
pub mod renderer;

pub use block::{Block, BlockData, BlockKind, Line, Opened};
pub use element::{Content, Element};
pub use inline::{Excerpt, InlineKind, InlineMatch};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use unicode_casefold::UnicodeCaseFold;

/// A link reference definition collected by the block engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub url: String,
    pub title: Option<String>,
}

/// Result of consulting an extension hook.
pub enum Hook<T> {
    /// No override installed; use the built-in step.
    Default,
    /// The override matched and produced a result.
    Match(T),
    /// The override claims the step and rejects (recognizer fails, or a
    /// finished block produces no output).
    NoMatch,
}

/// Extension surface: override a single block recognizer, a block's
/// completion step, or an inline recognizer. All methods default to
/// [`Hook::Default`], so an implementation only overrides what it needs.
///
/// A completion override may substitute [`Content::Raw`] for a block's
/// content; setting [`Element::trusted_raw`] on the produced element opts
/// that markup out of safe-mode escaping, which makes the override itself
/// responsible for its safety.
pub trait Hooks: Send {
    fn open_block(&self, kind: BlockKind, line: &Line, current: Option<&Block>) -> Hook<Opened> {
        let _ = (kind, line, current);
        Hook::Default
    }

    fn finish_block(&self, kind: BlockKind, block: &Block) -> Hook<Element> {
        let _ = (kind, block);
        Hook::Default
    }

    fn match_inline(&self, kind: InlineKind, excerpt: &Excerpt<'_>) -> Hook<InlineMatch> {
        let _ = (kind, excerpt);
        Hook::Default
    }
}

/// The rendering engine. One in-flight parse per instance: [`text`]
/// resets the per-parse reference table at entry.
///
/// [`text`]: Markdown::text
pub struct Markdown {
    pub(crate) breaks_enabled: bool,
    pub(crate) markup_escaped: bool,
    pub(crate) urls_linked: bool,
    pub(crate) safe_mode: bool,
    pub(crate) references: HashMap<String, Reference>,
    pub(crate) hooks: Option<Box<dyn Hooks>>,
}

impl Markdown {
    pub fn new() -> Self {
        Markdown {
            breaks_enabled: false,
            markup_escaped: false,
            urls_linked: true,
            safe_mode: false,
            references: HashMap::new(),
            hooks: None,
        }
    }

    /// Every newline in paragraph text becomes `<br />`.
    pub fn set_breaks_enabled(&mut self, enabled: bool) -> &mut Self {
        self.breaks_enabled = enabled;
        self
    }

    /// Escape raw HTML instead of passing it through.
    pub fn set_markup_escaped(&mut self, escaped: bool) -> &mut Self {
        self.markup_escaped = escaped;
        self
    }

    /// Autolink bare `http(s)://` URLs in text.
    pub fn set_urls_linked(&mut self, linked: bool) -> &mut Self {
        self.urls_linked = linked;
        self
    }

    /// Sanitize attributes and URLs and disable raw HTML.
    pub fn set_safe_mode(&mut self, safe: bool) -> &mut Self {
        self.safe_mode = safe;
        self
    }

    pub fn set_hooks(&mut self, hooks: Box<dyn Hooks>) -> &mut Self {
        self.hooks = Some(hooks);
        self
    }

    /// Render a Markdown document to an HTML fragment. Top-level blocks
    /// are separated by a blank line; there is no document shell.
    pub fn text(&mut self, input: &str) -> String {
        self.references.clear();
        let lines = block::preprocess(input);
        let elements = self.parse_blocks(&lines);
        let mut out = String::new();
        for element in &elements {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&self.render_element(element));
        }
        out.trim_matches('\n').to_string()
    }
}

impl Default for Markdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Render with default options.
pub fn markdown_to_html(markdown: &str) -> String {
    Markdown::new().text(markdown)
}

/// Case-fold a reference label so lookups are case-insensitive.
pub(crate) fn normalize_label(label: &str) -> String {
    label.trim().case_fold().collect()
}

/// A caller-owned map from name to engine. Instances are created lazily
/// and are identity-stable: the same name always yields the same
/// `Arc<Mutex<Markdown>>`. The mutex enforces the one-in-flight-parse
/// contract per instance.
pub struct Registry {
    instances: Mutex<HashMap<String, Arc<Mutex<Markdown>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn instance(&self, name: &str) -> Arc<Mutex<Markdown>> {
        let mut map = self.instances.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Markdown::new())))
            .clone()
    }

    /// The process-wide registry, for hosts that want shared defaults
    /// rather than wiring their own.
    pub fn global() -> &'static Registry {
        static GLOBAL: OnceLock<Registry> = OnceLock::new();
        GLOBAL.get_or_init(Registry::new)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for `Registry::global().instance(name)`.
pub fn instance(name: &str) -> Arc<Mutex<Markdown>> {
    Registry::global().instance(name)
}
