/// Line-oriented block-structure recognition
use crate::element::{Content, Element};
use crate::inline::{self, InlineKind};
use crate::{Hook, Markdown, Reference};
use serde::{Deserialize, Serialize};

/// One source line after preprocessing: tab-expanded body, leading-space
/// indent count and the indent-stripped text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub body: String,
    pub indent: usize,
    pub text: String,
}

impl Line {
    pub fn new(raw: &str) -> Self {
        let body = expand_tabs(raw);
        let indent = body.chars().take_while(|c| *c == ' ').count();
        let text = body[indent..].to_string();
        Line { body, indent, text }
    }

    fn is_blank(&self) -> bool {
        self.text.is_empty()
    }
}

/// Tabs expand to 4-column stops, measured in characters.
fn expand_tabs(raw: &str) -> String {
    if !raw.contains('\t') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len() + 8);
    let mut col = 0;
    for ch in raw.chars() {
        if ch == '\t' {
            let pad = 4 - col % 4;
            for _ in 0..pad {
                out.push(' ');
            }
            col += pad;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

/// Normalize line endings, trim outer blank lines and split.
pub fn preprocess(text: &str) -> Vec<Line> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.trim_matches('\n');
    if text.is_empty() {
        return Vec::new();
    }
    text.split('\n').map(Line::new).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    IndentedCode,
    FencedCode,
    Header,
    SetextHeader,
    List,
    Quote,
    Rule,
    Markup,
    Reference,
    Table,
    Paragraph,
}

/// Kind-specific working state. Buffers are resolved into [`Element`]s at
/// completion, so all structural recursion happens during the block scan
/// and the reference table is complete before any inline parse runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockData {
    Paragraph {
        text: String,
    },
    IndentedCode {
        lines: Vec<String>,
    },
    FencedCode {
        fence: char,
        language: Option<String>,
        extra_class: Option<String>,
        lines: Vec<String>,
        complete: bool,
    },
    List {
        indent: usize,
        ordered: bool,
        start: String,
        loose: bool,
        items: Vec<Vec<String>>,
    },
    Quote {
        class: Option<String>,
        lines: Vec<String>,
    },
    Markup {
        tag: String,
        depth: usize,
        closed: bool,
        comment: bool,
        lines: Vec<String>,
    },
    Reference,
    Table {
        alignments: Vec<Option<String>>,
        head_row: Element,
        rows: Vec<Element>,
    },
    /// Recognized in one shot; the element is already built (header,
    /// setext header, rule).
    Ready {
        element: Element,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub continuable: bool,
    /// Number of blank lines seen while this block was open.
    pub interrupted: Option<usize>,
    /// Hidden blocks (reference definitions) produce no output.
    pub hidden: bool,
    pub data: BlockData,
}

impl Block {
    fn new(kind: BlockKind, data: BlockData) -> Self {
        Block {
            kind,
            continuable: is_continuable(kind),
            interrupted: None,
            hidden: false,
            data,
        }
    }

    fn paragraph(line: &Line) -> Self {
        Block::new(
            BlockKind::Paragraph,
            BlockData::Paragraph {
                text: line.text.clone(),
            },
        )
    }
}

/// A freshly recognized block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opened {
    pub block: Block,
    /// The recognizer absorbed the current block in place (setext header
    /// and table promote the open paragraph); the engine must not flush
    /// the previous block to the output.
    pub replaces_current: bool,
}

impl Opened {
    pub fn new(block: Block) -> Self {
        Opened {
            block,
            replaces_current: false,
        }
    }
}

/// Continuable means the kind defines a continuation test. Derived by
/// exhaustive match, so a new kind cannot forget to decide.
fn is_continuable(kind: BlockKind) -> bool {
    match kind {
        BlockKind::IndentedCode
        | BlockKind::FencedCode
        | BlockKind::List
        | BlockKind::Quote
        | BlockKind::Markup
        | BlockKind::Table => true,
        BlockKind::Header
        | BlockKind::SetextHeader
        | BlockKind::Rule
        | BlockKind::Reference
        | BlockKind::Paragraph => false,
    }
}

/// Static dispatch table: a line's first character selects the candidate
/// kinds, tried in priority order.
fn marked_kinds(first: char) -> &'static [BlockKind] {
    use BlockKind::*;
    match first {
        '#' => &[Header],
        '*' => &[Rule, List],
        '+' => &[List],
        '-' => &[SetextHeader, Table, Rule, List],
        '0'..='9' => &[List],
        ':' => &[Table],
        '<' => &[Markup],
        '=' => &[SetextHeader],
        '>' => &[Quote],
        '[' => &[Reference],
        '_' => &[Rule],
        '`' => &[FencedCode],
        '|' => &[Table],
        '~' => &[FencedCode],
        _ => &[],
    }
}

/// Kinds with no marker are always tried, before the marked candidates.
const UNMARKED_KINDS: &[BlockKind] = &[BlockKind::IndentedCode];

impl Markdown {
    /// Consume lines in order, maintaining one open block plus an
    /// append-only output list.
    pub(crate) fn parse_blocks(&mut self, lines: &[Line]) -> Vec<Element> {
        let mut closed: Vec<Element> = Vec::new();
        let mut current: Option<Block> = None;

        for line in lines {
            if line.is_blank() {
                if let Some(block) = current.as_mut() {
                    *block.interrupted.get_or_insert(0) += 1;
                }
                continue;
            }

            if let Some(block) = current.as_mut()
                && block.continuable
            {
                if self.continue_block(block, line) {
                    continue;
                }
                self.complete_block(block);
            }

            if let Some(opened) = self.open_block(line, current.as_ref()) {
                if !opened.replaces_current
                    && let Some(previous) = current.take()
                {
                    self.finish(previous, &mut closed);
                }
                current = Some(opened.block);
                continue;
            }

            // Lazy continuation: an unclaimed line extends the open,
            // untyped, uninterrupted block.
            match current.as_mut() {
                Some(block)
                    if block.kind == BlockKind::Paragraph && block.interrupted.is_none() =>
                {
                    if let BlockData::Paragraph { text } = &mut block.data {
                        text.push('\n');
                        text.push_str(&line.text);
                    }
                }
                _ => {
                    if let Some(previous) = current.take() {
                        self.finish(previous, &mut closed);
                    }
                    current = Some(Block::paragraph(line));
                }
            }
        }

        if let Some(mut block) = current.take() {
            if block.continuable {
                self.complete_block(&mut block);
            }
            self.finish(block, &mut closed);
        }
        closed
    }

    fn finish(&mut self, block: Block, out: &mut Vec<Element>) {
        let hooked = match &self.hooks {
            Some(hooks) => hooks.finish_block(block.kind, &block),
            None => Hook::Default,
        };
        match hooked {
            Hook::Match(element) => out.push(element),
            Hook::NoMatch => {}
            Hook::Default => {
                if let Some(element) = self.finalize_block(block) {
                    out.push(element);
                }
            }
        }
    }

    fn open_block(&mut self, line: &Line, current: Option<&Block>) -> Option<Opened> {
        let first = line.text.chars().next()?;
        for kind in UNMARKED_KINDS.iter().chain(marked_kinds(first)) {
            let hooked = match &self.hooks {
                Some(hooks) => hooks.open_block(*kind, line, current),
                None => Hook::Default,
            };
            match hooked {
                Hook::Match(opened) => return Some(opened),
                Hook::NoMatch => continue,
                Hook::Default => {}
            }
            if let Some(opened) = self.try_open(*kind, line, current) {
                return Some(opened);
            }
        }
        None
    }

    fn try_open(&mut self, kind: BlockKind, line: &Line, current: Option<&Block>) -> Option<Opened> {
        match kind {
            BlockKind::IndentedCode => open_indented_code(line, current),
            BlockKind::FencedCode => open_fenced_code(line),
            BlockKind::Header => open_header(line),
            BlockKind::SetextHeader => open_setext_header(line, current),
            BlockKind::List => open_list(line),
            BlockKind::Quote => open_quote(line),
            BlockKind::Rule => open_rule(line),
            BlockKind::Markup => self.open_markup(line),
            BlockKind::Reference => self.open_reference(line),
            BlockKind::Table => open_table(line, current),
            BlockKind::Paragraph => None,
        }
    }

    fn continue_block(&mut self, block: &mut Block, line: &Line) -> bool {
        match block.kind {
            BlockKind::IndentedCode => continue_indented_code(block, line),
            BlockKind::FencedCode => continue_fenced_code(block, line),
            BlockKind::List => self.continue_list(block, line),
            BlockKind::Quote => continue_quote(block, line),
            BlockKind::Markup => continue_markup(block, line),
            BlockKind::Table => continue_table(block, line),
            _ => false,
        }
    }

    /// A kind's completion step runs when its continuation rejects a line
    /// or input ends; it may adjust buffered state before finalization.
    fn complete_block(&mut self, block: &mut Block) {
        if let BlockData::List { loose, items, .. } = &mut block.data
            && *loose
        {
            // Loose lists paragraph-wrap every item.
            for item in items {
                if item.last().is_none_or(|last| !last.is_empty()) {
                    item.push(String::new());
                }
            }
        }
    }

    /// Turn a closed block into its output element. Hidden blocks yield
    /// nothing. Exhaustive over the data variants by construction.
    fn finalize_block(&mut self, block: Block) -> Option<Element> {
        match block.data {
            BlockData::Paragraph { text } => {
                Some(Element::new("p", Content::Inline(text)))
            }
            BlockData::Ready { element } => Some(element),
            BlockData::IndentedCode { lines } => {
                let code = Element::new("code", Content::Text(lines.join("\n")));
                Some(Element::new("pre", Content::Span(vec![code])))
            }
            BlockData::FencedCode {
                language,
                extra_class,
                lines,
                ..
            } => {
                let mut code = Element::new("code", Content::Text(lines.join("\n")));
                if let Some(language) = language {
                    code.set_attr("class", Some(format!("language-{language}")));
                }
                let mut pre = Element::new("pre", Content::Span(vec![code]));
                if let Some(extra) = extra_class {
                    pre.set_attr("class", Some(extra));
                }
                Some(pre)
            }
            BlockData::List {
                ordered,
                start,
                items,
                ..
            } => Some(self.finalize_list(ordered, &start, items)),
            BlockData::Quote { class, lines } => {
                let parsed: Vec<Line> = lines.iter().map(|l| Line::new(l)).collect();
                let children = self.parse_blocks(&parsed);
                let mut quote = Element::new("blockquote", Content::Children(children));
                if let Some(class) = class {
                    quote.set_attr("class", Some(class));
                }
                Some(quote)
            }
            BlockData::Markup { lines, .. } => Some(Element::raw(lines.join("\n"))),
            BlockData::Reference => None,
            BlockData::Table {
                head_row, rows, ..
            } => {
                let head = Element::new("thead", Content::Children(vec![head_row]));
                let body = Element::new("tbody", Content::Children(rows));
                Some(Element::new("table", Content::Children(vec![head, body])))
            }
        }
    }

    fn finalize_list(&mut self, ordered: bool, start: &str, items: Vec<Vec<String>>) -> Element {
        let mut list = Element::new(
            if ordered { "ol" } else { "ul" },
            Content::Children(Vec::new()),
        );
        if ordered && start != "1" {
            list.set_attr("start", Some(start.to_string()));
        }
        let mut list_items = Vec::with_capacity(items.len());
        for item in items {
            let tight = !item.iter().any(|l| l.is_empty());
            let parsed: Vec<Line> = item.iter().map(|l| Line::new(l)).collect();
            let mut children = self.parse_blocks(&parsed);
            // Tight list contract: a lone leading paragraph is unwrapped.
            if tight
                && let Some(first) = children.first_mut()
                && first.name == "p"
                && let Content::Inline(text) = &first.content
            {
                *first = Element::new("", Content::Inline(text.clone()));
            }
            list_items.push(Element::new("li", Content::Children(children)));
        }
        if let Content::Children(children) = &mut list.content {
            *children = list_items;
        }
        list
    }

    fn open_markup(&self, line: &Line) -> Option<Opened> {
        if self.markup_escaped || self.safe_mode {
            return None;
        }
        if line.text.starts_with("<!--") {
            let data = BlockData::Markup {
                tag: String::new(),
                depth: 0,
                closed: line.text.contains("-->"),
                comment: true,
                lines: vec![line.body.clone()],
            };
            return Some(Opened::new(Block::new(BlockKind::Markup, data)));
        }
        let tag = inline::scan_open_tag(&line.text)?;
        if inline::is_text_level_element(&tag.name) {
            return None;
        }
        let closed = tag.self_closing
            || inline::is_void_element(&tag.name)
            || has_closing_tag(&line.text, &tag.name);
        let data = BlockData::Markup {
            tag: tag.name,
            depth: 0,
            closed,
            comment: false,
            lines: vec![line.body.clone()],
        };
        Some(Opened::new(Block::new(BlockKind::Markup, data)))
    }

    fn open_reference(&mut self, line: &Line) -> Option<Opened> {
        if !self.try_reference(&line.text) {
            return None;
        }
        let mut block = Block::new(BlockKind::Reference, BlockData::Reference);
        block.hidden = true;
        Some(Opened::new(block))
    }

    /// `[label]: url "title"?` — registered with unconditional
    /// last-write-wins on duplicate labels.
    pub(crate) fn try_reference(&mut self, text: &str) -> bool {
        if !text.starts_with('[') {
            return false;
        }
        let Some(close) = text.find("]:") else {
            return false;
        };
        let label = &text[1..close];
        if label.is_empty() {
            return false;
        }
        let rest = text[close + 2..].trim_start_matches(' ');
        let token_end = rest.find(' ').unwrap_or(rest.len());
        let mut url = &rest[..token_end];
        url = url.strip_prefix('<').unwrap_or(url);
        url = url.strip_suffix('>').unwrap_or(url);
        if url.is_empty() {
            return false;
        }
        let after = rest[token_end..].trim_end_matches(' ');
        let title = if after.is_empty() {
            None
        } else {
            let trimmed = after.trim_start_matches(' ');
            if trimmed.len() == after.len() {
                // The title must be separated from the url by spaces.
                return false;
            }
            let mut chars = trimmed.chars();
            let (opener, closer) = match chars.next() {
                Some('"') => ('"', '"'),
                Some('\'') => ('\'', '\''),
                Some('(') => ('(', ')'),
                _ => return false,
            };
            let _ = opener;
            if !trimmed.ends_with(closer) || trimmed.len() < 3 {
                return false;
            }
            Some(trimmed[1..trimmed.len() - closer.len_utf8()].to_string())
        };
        self.references.insert(
            crate::normalize_label(label),
            Reference {
                url: url.to_string(),
                title,
            },
        );
        true
    }

    fn continue_list(&mut self, block: &mut Block, line: &Line) -> bool {
        let interrupted = block.interrupted.take();
        let BlockData::List {
            indent,
            ordered,
            loose,
            items,
            ..
        } = &mut block.data
        else {
            return false;
        };
        if line.indent == *indent
            && let Some(content) = match_list_item(&line.text, *ordered)
        {
            if interrupted.is_some() {
                if let Some(item) = items.last_mut() {
                    item.push(String::new());
                }
                *loose = true;
            }
            items.push(vec![content]);
            return true;
        }
        if line.text.starts_with('[') && self.try_reference(&line.text) {
            block.interrupted = interrupted;
            return true;
        }
        if interrupted.is_none() {
            if let Some(item) = items.last_mut() {
                item.push(strip_item_indent(&line.body));
            }
            return true;
        }
        if line.indent > 0 {
            if let Some(item) = items.last_mut() {
                item.push(String::new());
                item.push(strip_item_indent(&line.body));
            }
            return true;
        }
        block.interrupted = interrupted;
        false
    }
}

/// Does the line end with `</tag>`?
fn has_closing_tag(text: &str, tag: &str) -> bool {
    let trimmed = text.trim_end_matches(' ');
    let Some(tail_start) = trimmed.len().checked_sub(tag.len() + 3) else {
        return false;
    };
    if !trimmed.is_char_boundary(tail_start) {
        return false;
    }
    let tail = &trimmed[tail_start..];
    tail.starts_with("</")
        && tail.ends_with('>')
        && tail[2..tail.len() - 1].eq_ignore_ascii_case(tag)
}

fn open_indented_code(line: &Line, current: Option<&Block>) -> Option<Opened> {
    if let Some(block) = current
        && block.kind == BlockKind::Paragraph
        && block.interrupted.is_none()
    {
        return None;
    }
    if line.indent < 4 {
        return None;
    }
    let data = BlockData::IndentedCode {
        lines: vec![line.body[4..].to_string()],
    };
    Some(Opened::new(Block::new(BlockKind::IndentedCode, data)))
}

fn continue_indented_code(block: &mut Block, line: &Line) -> bool {
    if line.indent < 4 {
        return false;
    }
    let blanks = block.interrupted.take().unwrap_or(0);
    if let BlockData::IndentedCode { lines } = &mut block.data {
        // Blank-interrupted gaps stay part of the block.
        for _ in 0..blanks {
            lines.push(String::new());
        }
        lines.push(line.body[4..].to_string());
    }
    true
}

fn open_fenced_code(line: &Line) -> Option<Opened> {
    let fence = line.text.chars().next()?;
    let run = line.text.chars().take_while(|c| *c == fence).count();
    if run < 3 {
        return None;
    }
    let info = line.text[run..].trim_matches(' ');
    if info.contains('`') {
        return None;
    }
    let (language, extra_class) = if info.is_empty() {
        (None, None)
    } else {
        let token_end = info
            .find([' ', '\t', '\n', '\x0c', '\r'])
            .unwrap_or(info.len());
        let language = info[..token_end].to_string();
        let extras = info[token_end..].trim_matches(' ');
        (
            Some(language),
            (!extras.is_empty()).then(|| extras.to_string()),
        )
    };
    let data = BlockData::FencedCode {
        fence,
        language,
        extra_class,
        lines: Vec::new(),
        complete: false,
    };
    Some(Opened::new(Block::new(BlockKind::FencedCode, data)))
}

fn continue_fenced_code(block: &mut Block, line: &Line) -> bool {
    let blanks = block.interrupted.take().unwrap_or(0);
    let BlockData::FencedCode {
        fence,
        lines,
        complete,
        ..
    } = &mut block.data
    else {
        return false;
    };
    if *complete {
        return false;
    }
    for _ in 0..blanks {
        lines.push(String::new());
    }
    let fence = *fence;
    let run = line.text.chars().take_while(|c| *c == fence).count();
    if run >= 3 && line.text[run..].trim_matches(' ').is_empty() {
        *complete = true;
        return true;
    }
    // Content is verbatim, indentation included; it never reaches the
    // inline engine.
    lines.push(line.body.clone());
    true
}

fn open_header(line: &Line) -> Option<Opened> {
    let text = &line.text;
    if text.len() < 2 {
        return None;
    }
    let level = text.chars().take_while(|c| *c == '#').count();
    if level > 6 {
        return None;
    }
    let mut body = text.trim_matches(['#', ' ']).to_string();
    let mut id = None;
    if let Some(found) = leading_brace_id(&body) {
        body = body[found.len() + 2..].trim_start().to_string();
        id = Some(found);
    } else if let Some(found) = trailing_hash_id(&body) {
        body = body[..body.len() - found.len() - 3].trim_end().to_string();
        id = Some(found);
    }
    let name = ["h1", "h2", "h3", "h4", "h5", "h6"][level - 1];
    let element = match &id {
        Some(id) => {
            let anchor = Element::new("a", Content::Inline(body))
                .with_attr("href", Some(format!("#{id}")))
                .with_attr("class", Some("anchor".to_string()))
                .forbid(&[InlineKind::Link, InlineKind::BareUrl]);
            Element::new(name, Content::Span(vec![anchor]))
        }
        None => Element::new(name, Content::Inline(body)),
    };
    let element = element.with_attr("id", id);
    Some(Opened::new(Block::new(
        BlockKind::Header,
        BlockData::Ready { element },
    )))
}

/// `{word}` at the start of a heading.
fn leading_brace_id(text: &str) -> Option<String> {
    let inner = text.strip_prefix('{')?;
    let end = inner.find('}')?;
    let id = &inner[..end];
    (!id.is_empty() && id.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-'))
        .then(|| id.to_string())
}

/// `{#word}` at the end of a heading.
fn trailing_hash_id(text: &str) -> Option<String> {
    let inner = text.strip_suffix('}')?;
    let start = inner.rfind("{#")?;
    let id = &inner[start + 2..];
    (!id.is_empty()
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-'))
    .then(|| id.to_string())
}

fn open_setext_header(line: &Line, current: Option<&Block>) -> Option<Opened> {
    let block = current?;
    if block.kind != BlockKind::Paragraph || block.interrupted.is_some() || line.indent >= 4 {
        return None;
    }
    let marker = line.text.chars().next()?;
    if !line.text.trim_end_matches(' ').chars().all(|c| c == marker) {
        return None;
    }
    let BlockData::Paragraph { text } = &block.data else {
        return None;
    };
    let name = if marker == '=' { "h1" } else { "h2" };
    let element = Element::new(name, Content::Inline(text.clone()));
    Some(Opened {
        block: Block::new(BlockKind::SetextHeader, BlockData::Ready { element }),
        replaces_current: true,
    })
}

fn open_list(line: &Line) -> Option<Opened> {
    let first = line.text.chars().next()?;
    let ordered = first.is_ascii_digit();
    let (marker_len, start) = if ordered {
        let digits = line.text.chars().take_while(|c| c.is_ascii_digit()).count();
        if !line.text[digits..].starts_with('.') {
            return None;
        }
        (digits + 1, line.text[..digits].to_string())
    } else {
        (1, String::new())
    };
    let rest = &line.text[marker_len..];
    if !rest.starts_with(' ') {
        return None;
    }
    let content = rest.trim_start_matches(' ').to_string();
    let data = BlockData::List {
        indent: line.indent,
        ordered,
        start,
        loose: false,
        items: vec![vec![content]],
    };
    Some(Opened::new(Block::new(BlockKind::List, data)))
}

/// Continuation marker: same family as the list, empty items allowed.
fn match_list_item(text: &str, ordered: bool) -> Option<String> {
    let marker_len = if ordered {
        let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
        if digits == 0 || !text[digits..].starts_with('.') {
            return None;
        }
        digits + 1
    } else {
        if !matches!(text.chars().next(), Some('*' | '+' | '-')) {
            return None;
        }
        1
    };
    let rest = &text[marker_len..];
    if rest.is_empty() {
        return Some(String::new());
    }
    if !rest.starts_with(' ') {
        return None;
    }
    Some(rest.trim_start_matches(' ').to_string())
}

fn strip_item_indent(body: &str) -> String {
    let spaces = body.chars().take_while(|c| *c == ' ').count().min(4);
    body[spaces..].to_string()
}

fn open_quote(line: &Line) -> Option<Opened> {
    let rest = line.text.strip_prefix('>')?;
    let mut rest = rest.strip_prefix(' ').unwrap_or(rest);
    let mut class = None;
    if let Some(inner) = rest.strip_prefix("{.")
        && let Some(end) = inner.find('}')
        && !inner[..end].is_empty()
        && inner[..end]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        class = Some(inner[..end].to_string());
        rest = &inner[end + 1..];
    }
    let data = BlockData::Quote {
        class,
        lines: vec![rest.to_string()],
    };
    Some(Opened::new(Block::new(BlockKind::Quote, data)))
}

fn continue_quote(block: &mut Block, line: &Line) -> bool {
    let BlockData::Quote { lines, .. } = &mut block.data else {
        return false;
    };
    if let Some(rest) = line.text.strip_prefix('>') {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        if block.interrupted.take().is_some() {
            lines.push(String::new());
        }
        lines.push(rest.to_string());
        return true;
    }
    if block.interrupted.is_none() {
        // Lazy continuation, as for paragraphs.
        lines.push(line.text.clone());
        return true;
    }
    false
}

fn open_rule(line: &Line) -> Option<Opened> {
    let marker = line.text.chars().next()?;
    let mut count = 0;
    for ch in line.text.chars() {
        if ch == marker {
            count += 1;
        } else if ch != ' ' {
            return None;
        }
    }
    if count < 3 {
        return None;
    }
    let mut element = Element::new("hr", Content::Empty);
    if line.text == "***" {
        element.set_attr("class", Some("type-minor".to_string()));
    }
    Some(Opened::new(Block::new(
        BlockKind::Rule,
        BlockData::Ready { element },
    )))
}

fn continue_markup(block: &mut Block, line: &Line) -> bool {
    let blanks = block.interrupted.take().unwrap_or(0);
    let BlockData::Markup {
        tag,
        depth,
        closed,
        comment,
        lines,
    } = &mut block.data
    else {
        return false;
    };
    if *closed {
        return false;
    }
    for _ in 0..blanks {
        lines.push(String::new());
    }
    if *comment {
        lines.push(line.body.clone());
        if line.text.contains("-->") {
            *closed = true;
        }
        return true;
    }
    if opens_same_tag(&line.text, tag) {
        *depth += 1;
    }
    if has_closing_tag(&line.text, tag) {
        if *depth > 0 {
            *depth -= 1;
        } else {
            *closed = true;
        }
    }
    lines.push(line.body.clone());
    true
}

fn opens_same_tag(text: &str, tag: &str) -> bool {
    let Some(rest) = text.strip_prefix('<') else {
        return false;
    };
    if rest.len() < tag.len() || !rest[..tag.len()].eq_ignore_ascii_case(tag) {
        return false;
    }
    matches!(rest[tag.len()..].chars().next(), Some(' ' | '>'))
}

fn open_table(line: &Line, current: Option<&Block>) -> Option<Opened> {
    let block = current?;
    if block.kind != BlockKind::Paragraph || block.interrupted.is_some() {
        return None;
    }
    let BlockData::Paragraph { text: header } = &block.data else {
        return None;
    };
    if !header.contains('|') {
        return None;
    }
    if !line.text.chars().all(|c| matches!(c, ' ' | '-' | ':' | '|')) {
        return None;
    }

    let mut alignments = Vec::new();
    for cell in line.text.trim().trim_matches('|').split('|') {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        let mut alignment = None;
        if cell.starts_with(':') {
            alignment = Some("left");
        }
        if cell.ends_with(':') {
            alignment = Some(if alignment == Some("left") {
                "center"
            } else {
                "right"
            });
        }
        alignments.push(alignment.map(String::from));
    }

    let mut header_cells = Vec::new();
    for (index, cell) in header.trim().trim_matches('|').split('|').enumerate() {
        let mut th = Element::new("th", Content::Inline(cell.trim().to_string()));
        if let Some(Some(alignment)) = alignments.get(index) {
            th.set_attr("align", Some(alignment.clone()));
        }
        header_cells.push(th);
    }
    let head_row = Element::new("tr", Content::Children(header_cells));

    let data = BlockData::Table {
        alignments,
        head_row,
        rows: Vec::new(),
    };
    Some(Opened {
        block: Block::new(BlockKind::Table, data),
        replaces_current: true,
    })
}

fn continue_table(block: &mut Block, line: &Line) -> bool {
    if block.interrupted.is_some() {
        return false;
    }
    if !line.text.contains('|') {
        return false;
    }
    let BlockData::Table {
        alignments, rows, ..
    } = &mut block.data
    else {
        return false;
    };
    let mut row = line.text.trim().trim_matches('|');

    let mut row_class = None;
    let mut row_id = None;
    if let Some((class, id, directive_len)) = parse_row_directive(row) {
        row = &row[directive_len..];
        row_class = class;
        row_id = id;
    }

    let mut cells = Vec::new();
    for cell in split_row_cells(row) {
        let mut td = Element::new("td", Content::Inline(cell.trim().to_string()));
        if let Some(Some(alignment)) = alignments.get(cells.len()) {
            td.set_attr("align", Some(alignment.clone()));
        }
        cells.push(td);
    }

    let mut tr = Element::new("tr", Content::Children(Vec::new()));
    if let Some(class) = row_class {
        tr.set_attr("class", Some(class));
    }
    if let Some(id) = row_id
        && let Some(first) = cells.first_mut()
    {
        tr.set_attr("class", Some("anchor".to_string()));
        tr.set_attr("id", Some(id.clone()));
        if let Content::Inline(text) = &first.content {
            let anchor = Element::new("a", Content::Span(Vec::new()))
                .with_attr("href", Some(format!("#{id}")))
                .with_attr("class", Some("anchor".to_string()));
            let cell_text = Element::new("", Content::Inline(text.clone()));
            first.content = Content::Span(vec![anchor, cell_text]);
        }
    }
    tr.content = Content::Children(cells);
    rows.push(tr);
    true
}

/// `{.class #id}` at the start of a table body row. Either part may be
/// missing; both names are word characters and dashes.
fn parse_row_directive(row: &str) -> Option<(Option<String>, Option<String>, usize)> {
    let inner = row.strip_prefix('{')?;
    let end = inner.find('}')?;
    let directive = &inner[..end];
    let mut class = None;
    let mut id = None;
    let mut rest = directive;
    if let Some(after) = rest.strip_prefix('.') {
        let name_end = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        if name_end == 0 {
            return None;
        }
        class = Some(after[..name_end].to_string());
        rest = after[name_end..].trim_start();
    }
    if let Some(after) = rest.strip_prefix('#') {
        let name_end = after
            .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(after.len());
        if name_end == 0 || name_end != after.len() {
            return None;
        }
        id = Some(after.to_string());
        rest = "";
    }
    if !rest.is_empty() {
        return None;
    }
    Some((class, id, end + 2))
}

/// Split a row on unescaped `|`, keeping `\|` and backtick code spans
/// intact.
fn split_row_cells(row: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let bytes = row.as_bytes();
    let mut i = 0;
    while i < row.len() {
        match bytes[i] {
            b'\\' if bytes.get(i + 1) == Some(&b'|') => {
                cell.push_str("\\|");
                i += 2;
            }
            b'`' => {
                // A complete code span shields any pipes inside it.
                if let Some(close) = row[i + 1..].find('`').map(|p| i + 1 + p)
                    && close > i + 1
                {
                    cell.push_str(&row[i..=close]);
                    i = close + 1;
                } else {
                    cell.push('`');
                    i += 1;
                }
            }
            b'|' => {
                cells.push(std::mem::take(&mut cell));
                i += 1;
            }
            _ => {
                let ch = row[i..].chars().next().unwrap_or('\0');
                cell.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    cells.push(cell);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markdown_to_html;

    #[test]
    fn tabs_expand_to_four_column_stops() {
        let line = Line::new("ab\tc");
        assert_eq!(line.body, "ab  c");
        let line = Line::new("\tcode");
        assert_eq!(line.indent, 4);
        assert_eq!(line.text, "code");
    }

    #[test]
    fn preprocess_normalizes_endings_and_trims() {
        let lines = preprocess("\r\na\r\nb\r\n\r\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn seven_hashes_is_a_paragraph() {
        assert_eq!(markdown_to_html("####### x"), "<p>####### x</p>");
    }

    #[test]
    fn header_anchor_trailing() {
        assert_eq!(
            markdown_to_html("# Setup {#setup}"),
            "<h1 id=\"setup\"><a href=\"#setup\" class=\"anchor\">Setup</a></h1>"
        );
    }

    #[test]
    fn header_anchor_leading() {
        assert_eq!(
            markdown_to_html("## {install} Install it"),
            "<h2 id=\"install\"><a href=\"#install\" class=\"anchor\">Install it</a></h2>"
        );
    }

    #[test]
    fn setext_requires_open_paragraph() {
        // A bare underline with nothing to promote is just a paragraph.
        assert_eq!(markdown_to_html("==="), "<p>===</p>");
        // An interrupted paragraph is not eligible either.
        assert_eq!(
            markdown_to_html("text\n\n==="),
            "<p>text</p>\n\n<p>===</p>"
        );
        assert_eq!(markdown_to_html("Title\n====="), "<h1>Title</h1>");
        assert_eq!(markdown_to_html("Title\n-----"), "<h2>Title</h2>");
    }

    #[test]
    fn fenced_code_is_never_inline_parsed() {
        assert_eq!(
            markdown_to_html("```\n*x*\n```"),
            "<pre><code>*x*</code></pre>"
        );
    }

    #[test]
    fn fenced_code_language_and_extra_class() {
        assert_eq!(
            markdown_to_html("```php\nfoobar\n```"),
            "<pre><code class=\"language-php\">foobar</code></pre>"
        );
        assert_eq!(
            markdown_to_html("```php lines\nfoobar\n```"),
            "<pre class=\"lines\"><code class=\"language-php\">foobar</code></pre>"
        );
    }

    #[test]
    fn indented_code_preserves_blank_gaps() {
        assert_eq!(
            markdown_to_html("    a\n\n    b"),
            "<pre><code>a\n\nb</code></pre>"
        );
    }

    #[test]
    fn tight_and_loose_lists() {
        let tight = markdown_to_html("- a\n- b");
        assert_eq!(tight, "<ul>\n<li>a</li>\n<li>b</li>\n</ul>");
        let loose = markdown_to_html("- a\n\n- b");
        assert_eq!(
            loose,
            "<ul>\n<li>\n<p>a</p>\n</li>\n<li>\n<p>b</p>\n</li>\n</ul>"
        );
    }

    #[test]
    fn ordered_list_start_attribute() {
        assert_eq!(
            markdown_to_html("3. a\n4. b"),
            "<ol start=\"3\">\n<li>a</li>\n<li>b</li>\n</ol>"
        );
        assert_eq!(markdown_to_html("1. a"), "<ol>\n<li>a</li>\n</ol>");
    }

    #[test]
    fn nested_list_via_deeper_indent() {
        assert_eq!(
            markdown_to_html("- a\n    - b"),
            "<ul>\n<li>a\n<ul>\n<li>b</li>\n</ul>\n</li>\n</ul>"
        );
    }

    #[test]
    fn reference_line_does_not_break_a_list() {
        let html = markdown_to_html("- [a][1]\n[1]: /url\n- b");
        assert_eq!(
            html,
            "<ul>\n<li><a href=\"/url\">a</a></li>\n<li>b</li>\n</ul>"
        );
    }

    #[test]
    fn quote_with_class_and_lazy_continuation() {
        assert_eq!(
            markdown_to_html("> {.note}watch\nout"),
            "<blockquote class=\"note\">\n<p>watch\nout</p>\n</blockquote>"
        );
    }

    #[test]
    fn quote_continues_across_blank_with_marker() {
        assert_eq!(
            markdown_to_html("> a\n\n> b"),
            "<blockquote>\n<p>a</p>\n<p>b</p>\n</blockquote>"
        );
    }

    #[test]
    fn rules_and_minor_style() {
        assert_eq!(markdown_to_html("---"), "<hr />");
        assert_eq!(markdown_to_html("* * *"), "<hr />");
        assert_eq!(markdown_to_html("***"), "<hr class=\"type-minor\" />");
    }

    #[test]
    fn table_alignment_and_short_rows() {
        let html = markdown_to_html("| A | B | C |\n|:--|:-:|--:|\n| 1 | 2 |");
        assert_eq!(
            html,
            "<table>\n<thead>\n<tr>\n<th align=\"left\">A</th>\n<th align=\"center\">B</th>\n<th align=\"right\">C</th>\n</tr>\n</thead>\n<tbody>\n<tr>\n<td align=\"left\">1</td>\n<td align=\"center\">2</td>\n</tr>\n</tbody>\n</table>"
        );
    }

    #[test]
    fn table_requires_eligible_paragraph() {
        // No preceding paragraph with a pipe: the divider is a rule, the
        // row is a paragraph.
        let html = markdown_to_html("---\n| a |");
        assert_eq!(html, "<hr />\n\n<p>| a |</p>");
    }

    #[test]
    fn table_row_directive() {
        let html = markdown_to_html("| A |\n|---|\n|{.hl #r1} 1 |");
        assert_eq!(
            html,
            "<table>\n<thead>\n<tr>\n<th>A</th>\n</tr>\n</thead>\n<tbody>\n<tr class=\"anchor\" id=\"r1\">\n<td><a href=\"#r1\" class=\"anchor\"></a>1</td>\n</tr>\n</tbody>\n</table>"
        );
    }

    #[test]
    fn escaped_pipe_and_code_span_do_not_split_cells() {
        let cells = split_row_cells("a \\| b | `c|d` | e");
        assert_eq!(cells, vec!["a \\| b ", " `c|d` ", " e"]);
    }

    #[test]
    fn markup_block_tracks_depth() {
        let html = markdown_to_html("<div>\n<div class=\"inner\">\n_x_\n</div>\n</div>");
        assert_eq!(html, "<div>\n<div class=\"inner\">\n_x_\n</div>\n</div>");
    }

    #[test]
    fn markup_block_disabled_when_escaped() {
        let mut md = crate::Markdown::new();
        md.set_markup_escaped(true);
        assert_eq!(
            md.text("<div>_content_</div>"),
            "<p>&lt;div&gt;<em>content</em>&lt;/div&gt;</p>"
        );
    }

    #[test]
    fn reference_definition_last_write_wins() {
        let html = markdown_to_html("[x]\n\n[x]: /first\n\n[x]: /second");
        assert_eq!(html, "<p><a href=\"/second\">x</a></p>");
    }

    #[test]
    fn reference_label_is_case_insensitive() {
        let html = markdown_to_html("[Link Me][LABEL]\n\n[label]: /url \"T\"");
        assert_eq!(html, "<p><a href=\"/url\" title=\"T\">Link Me</a></p>");
    }
}
