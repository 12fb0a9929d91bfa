//! Owned markdown tree consumed by the compiler.
//!
//! Every node carries a [`NodeId`] assigned in one pre-order pass after the
//! tree is built. Ids are the keys of the asset map and of table plans; nodes
//! are never compared structurally.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Document,
    Heading { depth: u8 },
    Paragraph,
    Text(String),
    InlineCode(String),
    Strong,
    Emphasis,
    Link { url: String },
    /// `start` is the first item number of an ordered list.
    List { start: Option<u64> },
    ListItem,
    Image { url: String, alt: String },
    Code { lang: Option<String>, value: String },
    /// `source` is the table's original markdown, used when rendering it as an image.
    Table { source: String },
    TableRow,
    TableCell,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    /// Node with an unassigned id; ids are handed out by [`Document::new`].
    pub fn new(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            id: NodeId(0),
            kind,
            children,
        }
    }

    pub fn leaf(kind: NodeKind) -> Self {
        Self::new(kind, Vec::new())
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Text(_)
                | NodeKind::InlineCode(_)
                | NodeKind::Strong
                | NodeKind::Emphasis
                | NodeKind::Link { .. }
                | NodeKind::Image { .. }
        )
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Concatenated literal text below this node.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for node in self.descendants() {
            match &node.kind {
                NodeKind::Text(value) | NodeKind::InlineCode(value) => out.push_str(value),
                NodeKind::Image { alt, .. } => out.push_str(alt),
                _ => {}
            }
        }
        out
    }

    /// `(rows, columns)` of a table node; columns is the widest row.
    pub fn table_shape(&self) -> (usize, usize) {
        let rows = self.children.len();
        let columns = self
            .children
            .iter()
            .map(|row| row.children.len())
            .max()
            .unwrap_or(0);
        (rows, columns)
    }

    fn number(&mut self, next: &mut u32) {
        self.id = NodeId(*next);
        *next += 1;
        for child in &mut self.children {
            child.number(next);
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// A parsed markdown document; the root is always [`NodeKind::Document`].
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    root: Node,
    len: usize,
    fingerprint: String,
}

/// Hex digits of the source hash kept as the document fingerprint.
const FINGERPRINT_LEN: usize = 12;

/// Short content hash of `source`.
pub fn fingerprint(source: &str) -> String {
    blake3::hash(source.as_bytes()).to_hex().as_str()[..FINGERPRINT_LEN].to_owned()
}

impl Document {
    /// Wrap `children` in a document root and number every node.
    pub fn new(children: Vec<Node>) -> Self {
        let mut root = Node::new(NodeKind::Document, children);
        let mut next = 0;
        root.number(&mut next);
        Self {
            root,
            len: next as usize,
            fingerprint: fingerprint(""),
        }
    }

    /// Record the hash of the markdown this document was parsed from.
    pub fn with_source(mut self, source: &str) -> Self {
        self.fingerprint = fingerprint(source);
        self
    }

    /// Hash of the source, distinguishing this document's table markers
    /// from marker-like text written by the author.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn nodes(&self) -> Descendants<'_> {
        self.root.descendants()
    }

    pub fn find(&self, id: NodeId) -> Option<&Node> {
        self.nodes().find(|node| node.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &str) -> Node {
        Node::leaf(NodeKind::Text(value.into()))
    }

    #[test]
    fn test_ids_are_assigned_in_preorder() {
        let doc = Document::new(vec![
            Node::new(
                NodeKind::Paragraph,
                vec![text("a"), Node::new(NodeKind::Strong, vec![text("b")])],
            ),
            Node::new(NodeKind::Heading { depth: 2 }, vec![text("c")]),
        ]);

        let ids: Vec<u32> = doc.nodes().map(|n| n.id.get()).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(doc.len(), 7);
        assert_eq!(
            doc.find(NodeId(4)).map(|n| &n.kind),
            Some(&NodeKind::Text("b".into()))
        );
    }

    #[test]
    fn test_fingerprint_follows_source() {
        let a = Document::new(Vec::new()).with_source("# a");
        let b = Document::new(Vec::new()).with_source("# b");
        assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
        assert!(a.fingerprint().bytes().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), fingerprint("# a"));
    }

    #[test]
    fn test_table_shape_uses_widest_row() {
        let cell = || Node::new(NodeKind::TableCell, vec![text("x")]);
        let table = Node::new(
            NodeKind::Table { source: String::new() },
            vec![
                Node::new(NodeKind::TableRow, vec![cell(), cell()]),
                Node::new(NodeKind::TableRow, vec![cell(), cell(), cell()]),
            ],
        );
        assert_eq!(table.table_shape(), (2, 3));
        assert_eq!(table.plain_text(), "xxxxx");
    }
}
