//! Markdown to [`Document`] via `pulldown-cmark`.

use std::ops::Range;

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};

use crate::ast::{Document, Node, NodeKind};
use crate::error::ParseError;

pub fn md_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH
}

/// Parse markdown into an owned tree with node ids assigned.
pub fn parse(markdown: &str) -> Result<Document, ParseError> {
    let mut builder = TreeBuilder::new(markdown);
    for (event, range) in Parser::new_ext(markdown, md_options()).into_offset_iter() {
        builder.event(event, range)?;
    }
    Ok(builder.finish()?.with_source(markdown))
}

enum FrameKind {
    Node(NodeKind),
    /// Unsupported container: its children are lifted into the parent.
    Transparent,
    Image { url: String },
    CodeBlock { lang: Option<String> },
}

struct Frame {
    kind: FrameKind,
    children: Vec<Node>,
    text: String,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn push(&mut self, node: Node) {
        if let NodeKind::Text(value) = &node.kind {
            if let Some(Node {
                kind: NodeKind::Text(last),
                ..
            }) = self.children.last_mut()
            {
                last.push_str(value);
                return;
            }
        }
        self.children.push(node);
    }
}

struct TreeBuilder<'s> {
    source: &'s str,
    stack: Vec<Frame>,
}

impl<'s> TreeBuilder<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            stack: vec![Frame::new(FrameKind::Node(NodeKind::Document))],
        }
    }

    fn top(&mut self) -> Result<&mut Frame, ParseError> {
        self.stack.last_mut().ok_or(ParseError::Unbalanced)
    }

    fn event(&mut self, event: Event<'_>, range: Range<usize>) -> Result<(), ParseError> {
        match event {
            Event::Start(tag) => {
                let kind = self.frame_for(tag, range);
                self.stack.push(Frame::new(kind));
            }
            Event::End(_) => self.close()?,
            Event::Text(text) => {
                let top = self.top()?;
                match top.kind {
                    FrameKind::CodeBlock { .. } => top.text.push_str(&text),
                    _ => top.push(Node::leaf(NodeKind::Text(text.into_string()))),
                }
            }
            Event::Code(code) => self
                .top()?
                .push(Node::leaf(NodeKind::InlineCode(code.into_string()))),
            Event::SoftBreak | Event::HardBreak => {
                self.top()?.push(Node::leaf(NodeKind::Text(" ".to_owned())))
            }
            _ => {}
        }
        Ok(())
    }

    fn frame_for(&self, tag: Tag<'_>, range: Range<usize>) -> FrameKind {
        match tag {
            Tag::Paragraph => FrameKind::Node(NodeKind::Paragraph),
            Tag::Heading { level, .. } => FrameKind::Node(NodeKind::Heading { depth: level as u8 }),
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_owned),
                    CodeBlockKind::Indented => None,
                };
                FrameKind::CodeBlock { lang }
            }
            Tag::List(start) => FrameKind::Node(NodeKind::List { start }),
            Tag::Item => FrameKind::Node(NodeKind::ListItem),
            Tag::Table(_) => FrameKind::Node(NodeKind::Table {
                source: self
                    .source
                    .get(range)
                    .unwrap_or_default()
                    .trim_end()
                    .to_owned(),
            }),
            // The header is just the first row.
            Tag::TableHead | Tag::TableRow => FrameKind::Node(NodeKind::TableRow),
            Tag::TableCell => FrameKind::Node(NodeKind::TableCell),
            Tag::Emphasis => FrameKind::Node(NodeKind::Emphasis),
            Tag::Strong => FrameKind::Node(NodeKind::Strong),
            Tag::Link { dest_url, .. } => FrameKind::Node(NodeKind::Link {
                url: dest_url.into_string(),
            }),
            Tag::Image { dest_url, .. } => FrameKind::Image {
                url: dest_url.into_string(),
            },
            _ => FrameKind::Transparent,
        }
    }

    fn close(&mut self) -> Result<(), ParseError> {
        // The root frame is only closed by `finish`.
        if self.stack.len() < 2 {
            return Err(ParseError::Unbalanced);
        }
        let frame = self.stack.pop().ok_or(ParseError::Unbalanced)?;
        let parent = self.top()?;

        match frame.kind {
            FrameKind::Node(NodeKind::ListItem) => {
                parent.push(Node::new(NodeKind::ListItem, wrap_inline_runs(frame.children)))
            }
            FrameKind::Node(kind) => parent.push(Node::new(kind, frame.children)),
            FrameKind::Transparent => {
                for child in frame.children {
                    parent.push(child);
                }
            }
            FrameKind::Image { url } => {
                let alt = Node::new(NodeKind::Paragraph, frame.children).plain_text();
                parent.push(Node::leaf(NodeKind::Image { url, alt }));
            }
            FrameKind::CodeBlock { lang } => {
                let mut value = frame.text;
                if value.ends_with('\n') {
                    value.pop();
                }
                parent.push(Node::leaf(NodeKind::Code { lang, value }));
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<Document, ParseError> {
        let root = self.stack.pop().ok_or(ParseError::Unbalanced)?;
        if !self.stack.is_empty() {
            return Err(ParseError::Unbalanced);
        }
        Ok(Document::new(root.children))
    }
}

/// Tight list items hold inline content directly; give each run its own
/// paragraph so every item ends in a terminator.
fn wrap_inline_runs(children: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(children.len());
    let mut run: Vec<Node> = Vec::new();
    for child in children {
        if child.is_inline() {
            run.push(child);
        } else {
            if !run.is_empty() {
                out.push(Node::new(NodeKind::Paragraph, std::mem::take(&mut run)));
            }
            out.push(child);
        }
    }
    if !run.is_empty() {
        out.push(Node::new(NodeKind::Paragraph, run));
    }
    out
}
