use serde::Deserialize;

/// Read-only view of a committed document, as returned by `documents.get`.
///
/// Only the structure needed to address content is kept; everything else in
/// the response is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Body,
}

impl DocumentSnapshot {
    /// Top-level tables in document order.
    pub fn tables(&self) -> impl Iterator<Item = (&StructuralElement, &Table)> {
        self.body
            .content
            .iter()
            .filter_map(|element| element.table.as_ref().map(|table| (element, table)))
    }

    /// Index one past the last character in the body.
    pub fn end_index(&self) -> usize {
        self.body
            .content
            .last()
            .map(|element| element.end_index)
            .unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    /// Absent on the leading section break, which starts at 0.
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
    #[serde(default)]
    pub paragraph: Option<Paragraph>,
    #[serde(default)]
    pub table: Option<Table>,
}

impl StructuralElement {
    /// Concatenated text of a paragraph element; empty for anything else.
    pub fn text(&self) -> String {
        self.paragraph
            .as_ref()
            .map(|p| {
                p.elements
                    .iter()
                    .filter_map(|e| e.text_run.as_ref())
                    .map(|run| run.content.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
    #[serde(default)]
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TextRun {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub columns: usize,
    #[serde(default)]
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(default)]
    pub start_index: usize,
    #[serde(default)]
    pub end_index: usize,
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

impl TableCell {
    /// Where text typed into this cell lands: the start of its first paragraph.
    pub fn content_start(&self) -> usize {
        self.content
            .first()
            .map(|element| element.start_index)
            .unwrap_or(self.start_index + 1)
    }

    /// A freshly inserted cell holds a single empty paragraph.
    pub fn is_blank(&self) -> bool {
        self.content.iter().all(|element| {
            element.table.is_none() && element.text().trim_end_matches('\n').is_empty()
        })
    }
}
