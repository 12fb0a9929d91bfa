use serde::{Deserialize, Serialize};

/// A single mutation request as sent in a `batchUpdate` body.
///
/// Requests are plain data; building one does not talk to the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    InsertText {
        location: Location,
        text: String,
    },
    UpdateParagraphStyle {
        range: Range,
        paragraph_style: ParagraphStyle,
        fields: String,
    },
    UpdateTextStyle {
        range: Range,
        text_style: TextStyle,
        fields: String,
    },
    InsertInlineImage {
        location: Location,
        uri: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_size: Option<Size>,
    },
    InsertTable {
        location: Location,
        rows: usize,
        columns: usize,
    },
    DeleteContentRange {
        range: Range,
    },
}

impl Request {
    pub fn insert_text(index: usize, text: impl Into<String>) -> Self {
        Request::InsertText {
            location: Location { index },
            text: text.into(),
        }
    }

    pub fn paragraph_style(range: Range, named_style_type: NamedStyleType) -> Self {
        Request::UpdateParagraphStyle {
            range,
            paragraph_style: ParagraphStyle { named_style_type },
            fields: "namedStyleType".to_owned(),
        }
    }

    /// Style update whose field mask covers exactly the members set on `style`.
    pub fn text_style(range: Range, text_style: TextStyle) -> Self {
        let fields = text_style.fields();
        Request::UpdateTextStyle {
            range,
            text_style,
            fields,
        }
    }

    pub fn inline_image(index: usize, uri: impl Into<String>, object_size: Option<Size>) -> Self {
        Request::InsertInlineImage {
            location: Location { index },
            uri: uri.into(),
            object_size,
        }
    }

    pub fn insert_table(index: usize, rows: usize, columns: usize) -> Self {
        Request::InsertTable {
            location: Location { index },
            rows,
            columns,
        }
    }

    pub fn delete(range: Range) -> Self {
        Request::DeleteContentRange { range }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub index: usize,
}

/// Half-open `[start_index, end_index)` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_index: usize,
    pub end_index: usize,
}

impl Range {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }
}

impl From<std::ops::Range<usize>> for Range {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphStyle {
    pub named_style_type: NamedStyleType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedStyleType {
    #[serde(rename = "HEADING_1")]
    Heading1,
    #[serde(rename = "HEADING_2")]
    Heading2,
    #[serde(rename = "HEADING_3")]
    Heading3,
    #[serde(rename = "HEADING_4")]
    Heading4,
    #[serde(rename = "HEADING_5")]
    Heading5,
    #[serde(rename = "HEADING_6")]
    Heading6,
}

impl NamedStyleType {
    /// Heading style for `depth`, clamped to the supported 1-6.
    pub fn heading(depth: u8) -> Self {
        match depth.clamp(1, 6) {
            1 => NamedStyleType::Heading1,
            2 => NamedStyleType::Heading2,
            3 => NamedStyleType::Heading3,
            4 => NamedStyleType::Heading4,
            5 => NamedStyleType::Heading5,
            _ => NamedStyleType::Heading6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_font_family: Option<WeightedFontFamily>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<OptionalColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<Dimension>,
}

impl TextStyle {
    pub fn bold() -> Self {
        Self {
            bold: Some(true),
            ..Default::default()
        }
    }

    pub fn italic() -> Self {
        Self {
            italic: Some(true),
            ..Default::default()
        }
    }

    pub fn link(url: impl Into<String>) -> Self {
        Self {
            link: Some(Link { url: url.into() }),
            ..Default::default()
        }
    }

    pub fn monospace(font_family: impl Into<String>) -> Self {
        Self {
            weighted_font_family: Some(WeightedFontFamily {
                font_family: font_family.into(),
                weight: None,
            }),
            ..Default::default()
        }
    }

    pub fn with_background(mut self, red: f32, green: f32, blue: f32) -> Self {
        self.background_color = Some(OptionalColor {
            color: Color {
                rgb_color: RgbColor { red, green, blue },
            },
        });
        self
    }

    pub fn with_font_size(mut self, points: f64) -> Self {
        self.font_size = Some(Dimension::points(points));
        self
    }

    pub fn with_bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    /// Comma separated field mask naming every member that is set.
    pub fn fields(&self) -> String {
        let mut fields = Vec::new();
        if self.bold.is_some() {
            fields.push("bold");
        }
        if self.italic.is_some() {
            fields.push("italic");
        }
        if self.link.is_some() {
            fields.push("link");
        }
        if self.weighted_font_family.is_some() {
            fields.push("weightedFontFamily");
        }
        if self.background_color.is_some() {
            fields.push("backgroundColor");
        }
        if self.font_size.is_some() {
            fields.push("fontSize");
        }
        fields.join(",")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedFontFamily {
    pub font_family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionalColor {
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Color {
    pub rgb_color: RgbColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RgbColor {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    pub magnitude: f64,
    pub unit: Unit,
}

impl Dimension {
    pub fn points(magnitude: f64) -> Self {
        Self {
            magnitude,
            unit: Unit::Pt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Unit {
    Pt,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub height: Dimension,
    pub width: Dimension,
}

/// Body of a `documents.batchUpdate` call.
#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdate<'a> {
    pub requests: &'a [Request],
}
