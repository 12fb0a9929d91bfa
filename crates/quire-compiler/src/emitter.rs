//! AST to mutation requests.
//!
//! Emission is depth-first. Range starts are recorded before a node's
//! children are emitted and range-scoped style requests are pushed after, so
//! a style always covers text that an earlier request in the same batch
//! inserted.

use quire_common::docs::{Dimension, NamedStyleType, Range, Request, Size, TextStyle};
use quire_common::{ExportOptions, TableStrategy};

use crate::ast::{Document, Node, NodeKind};
use crate::cursor::Cursor;
use crate::resolver::AssetMap;
use crate::tables::{TablePlan, placeholder};

pub const CODE_FONT: &str = "Roboto Mono";
const CODE_BACKGROUND: (f32, f32, f32) = (0.95, 0.95, 0.95);
/// Point sizes approximating the preview's h1-h6.
const HEADING_POINTS: [f64; 6] = [24.0, 20.0, 16.0, 14.0, 12.0, 11.0];

/// Phase-1 output of the compiler.
#[derive(Debug)]
pub struct CompiledDocument<'a> {
    /// Structure batch, in submission order.
    pub requests: Vec<Request>,
    /// Tables deferred to the placeholder protocol, in document order.
    pub tables: Vec<TablePlan<'a>>,
    /// Cursor value after the last request.
    pub end_index: usize,
}

/// Compile a whole document against an already resolved asset map.
pub fn compile<'a>(
    document: &'a Document,
    assets: &'a AssetMap,
    options: &'a ExportOptions,
) -> CompiledDocument<'a> {
    let mut emitter = Emitter::new(document.fingerprint(), assets, options);
    emitter.emit(document.root());
    emitter.finish()
}

/// Push a text style over `[start, end)`, skipping empty ranges.
pub(crate) fn push_style(
    requests: &mut Vec<Request>,
    start: usize,
    end: usize,
    style: TextStyle,
) {
    let range = Range::new(start, end);
    if !range.is_empty() {
        requests.push(Request::text_style(range, style));
    }
}

pub fn code_style() -> TextStyle {
    let (r, g, b) = CODE_BACKGROUND;
    TextStyle::monospace(CODE_FONT).with_background(r, g, b)
}

pub fn heading_text_style(depth: u8) -> TextStyle {
    let level = usize::from(depth.clamp(1, 6)) - 1;
    TextStyle::default()
        .with_font_size(HEADING_POINTS[level])
        .with_bold(true)
}

pub fn is_absolute_url(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

pub struct Emitter<'a> {
    cursor: Cursor,
    requests: Vec<Request>,
    /// Source fingerprint embedded in table markers.
    fingerprint: &'a str,
    assets: &'a AssetMap,
    options: &'a ExportOptions,
    tables: Vec<TablePlan<'a>>,
}

impl<'a> Emitter<'a> {
    pub fn new(fingerprint: &'a str, assets: &'a AssetMap, options: &'a ExportOptions) -> Self {
        Self {
            cursor: Cursor::new(),
            requests: Vec::new(),
            fingerprint,
            assets,
            options,
            tables: Vec::new(),
        }
    }

    pub fn finish(self) -> CompiledDocument<'a> {
        CompiledDocument {
            requests: self.requests,
            tables: self.tables,
            end_index: self.cursor.index(),
        }
    }

    fn insert_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let at = self.cursor.advance_text(text);
        self.requests.push(Request::insert_text(at, text));
    }

    fn insert_image(&mut self, uri: &str) {
        let size = self.options.image_size.map(|size| Size {
            height: Dimension::points(size.height_pt),
            width: Dimension::points(size.width_pt),
        });
        self.requests
            .push(Request::inline_image(self.cursor.index(), uri, size));
        // An inline image occupies one position.
        self.cursor.advance(1);
    }

    fn terminate(&mut self) {
        self.insert_text("\n");
    }

    fn emit_children(&mut self, node: &'a Node) {
        for child in &node.children {
            self.emit(child);
        }
    }

    fn styled_children(&mut self, node: &'a Node, style: TextStyle) {
        let start = self.cursor.index();
        self.emit_children(node);
        let end = self.cursor.index();
        push_style(&mut self.requests, start, end, style);
    }

    pub fn emit(&mut self, node: &'a Node) {
        match &node.kind {
            NodeKind::Document | NodeKind::TableRow | NodeKind::TableCell => {
                self.emit_children(node)
            }
            NodeKind::List { start } => {
                for (offset, item) in (0..).zip(&node.children) {
                    self.emit_item(item, start.map(|first| first + offset));
                }
            }
            NodeKind::Heading { depth } => {
                let start = self.cursor.index();
                self.emit_children(node);
                self.terminate();
                let end = self.cursor.index();
                self.requests.push(Request::paragraph_style(
                    Range::new(start, end),
                    NamedStyleType::heading(*depth),
                ));
                if self.options.heading_text_styles {
                    push_style(&mut self.requests, start, end, heading_text_style(*depth));
                }
            }
            NodeKind::Paragraph => {
                self.emit_children(node);
                self.terminate();
            }
            NodeKind::Text(value) => self.insert_text(value),
            NodeKind::InlineCode(value) => {
                let start = self.cursor.index();
                self.insert_text(value);
                let end = self.cursor.index();
                push_style(&mut self.requests, start, end, TextStyle::monospace(CODE_FONT));
            }
            NodeKind::Strong => self.styled_children(node, TextStyle::bold()),
            NodeKind::Emphasis => self.styled_children(node, TextStyle::italic()),
            NodeKind::Link { url } => self.styled_children(node, TextStyle::link(url.as_str())),
            NodeKind::ListItem => self.emit_item(node, None),
            NodeKind::Image { url, alt } => {
                if is_absolute_url(url) {
                    self.insert_image(url);
                } else {
                    self.insert_text(alt);
                }
            }
            NodeKind::Code { lang, value } => {
                let diagram = lang
                    .as_deref()
                    .is_some_and(|l| self.options.is_diagram_language(l));
                if diagram {
                    self.emit_asset(node);
                } else {
                    let start = self.cursor.index();
                    self.insert_text(value);
                    let end = self.cursor.index();
                    self.terminate();
                    push_style(&mut self.requests, start, end, code_style());
                }
            }
            NodeKind::Table { .. } => match self.options.table_strategy {
                TableStrategy::Native => self.emit_placeholder(node),
                TableStrategy::Image => {
                    if !self.emit_asset(node) {
                        self.emit_table_text(node);
                    }
                }
            },
        }
    }

    /// A list item prefixed with its number, or the bullet when unordered.
    fn emit_item(&mut self, node: &'a Node, number: Option<u64>) {
        match number {
            Some(n) => self.insert_text(&format!("{n}. ")),
            None => {
                let options = self.options;
                self.insert_text(&options.bullet);
            }
        }
        self.emit_children(node);
    }

    /// Inline image for a resolved asset. Returns false when the node has none.
    fn emit_asset(&mut self, node: &Node) -> bool {
        let assets = self.assets;
        let Some(uri) = assets.get(node.id) else {
            tracing::debug!(node = %node.id, "no asset resolved, skipping");
            return false;
        };
        self.insert_image(uri);
        self.terminate();
        true
    }

    fn emit_placeholder(&mut self, node: &'a Node) {
        let ordinal = self.tables.len();
        let fingerprint = self.fingerprint;
        self.insert_text(&placeholder(fingerprint, ordinal));
        self.terminate();
        self.tables.push(TablePlan::new(ordinal, node));
    }

    /// Tab separated fallback for a table that has no image.
    fn emit_table_text(&mut self, node: &Node) {
        for row in &node.children {
            let line = row
                .children
                .iter()
                .map(Node::plain_text)
                .collect::<Vec<_>>()
                .join("\t");
            self.insert_text(&line);
            self.terminate();
        }
    }
}
