use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in page coordinates: (x0, y0, x1, y1).
pub type Outline = [f64; 4];

/// Per-page outline lists, keyed by page number.
pub type Outlines = BTreeMap<u32, Vec<Outline>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementClass {
    Paragraph,
    Table,
    PageHeader,
    PageFooter,
}

/// A single character with its bounding box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharBox {
    pub text: String,
    pub page: u32,
    #[serde(rename = "box")]
    pub outline: Outline,
}

/// DOCX provenance metadata attached by the upstream parser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocxMeta {
    pub xpath: Option<String>,
}

/// A table cell. Cells are keyed `"row_col"` on the owning element; merged
/// continuation cells carry `dummy = true` and are skipped in hit-testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub text: String,
    #[serde(default)]
    pub chars: Vec<CharBox>,
    pub page: u32,
    #[serde(rename = "box")]
    pub outline: Outline,
    #[serde(default)]
    pub dummy: bool,
    #[serde(default)]
    pub docx_meta: Option<DocxMeta>,
}

/// One block element of the parsed document in reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    pub index: usize,
    pub class: ElementClass,
    pub page: u32,
    pub outline: Outline,
    pub text: String,
    #[serde(default)]
    pub chars: Vec<CharBox>,
    /// Continuation fragment of a cross-page paragraph or table.
    #[serde(default)]
    pub fragment: bool,
    #[serde(default)]
    pub cells: BTreeMap<String, Cell>,
    #[serde(default)]
    pub syllabus: Option<usize>,
    #[serde(default)]
    pub docx_meta: Option<DocxMeta>,
}

/// A node of the document outline tree. `range` is a half-open element
/// index interval covering the section anchor and all descendants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyllabusNode {
    pub index: usize,
    pub title: String,
    pub level: u32,
    pub element: usize,
    pub range: (usize, usize),
    #[serde(default)]
    pub children: Vec<usize>,
}

/// The read-only output of the external parsing layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub elements: Vec<Element>,
    pub syllabuses: Vec<SyllabusNode>,
}

/// Similarity/matcher input: either a document element projected down to
/// its text, or a pseudo-paragraph rebuilt from answer evidence (which
/// carries precomputed per-page outlines instead of a single box).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paragraph {
    pub index: usize,
    pub page: u32,
    pub text: String,
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub outlines: Outlines,
}

impl Paragraph {
    /// Reference text that has no location in the document.
    pub fn from_text(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            page: 0,
            text: text.into(),
            outline: None,
            outlines: Outlines::new(),
        }
    }
}

impl From<&Element> for Paragraph {
    fn from(element: &Element) -> Self {
        Self {
            index: element.index,
            page: element.page,
            text: element.text.clone(),
            outline: Some(element.outline),
            outlines: Outlines::new(),
        }
    }
}

impl ParsedDocument {
    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.iter().find(|item| item.index == index)
    }

    pub fn syllabus(&self, index: usize) -> Option<&SyllabusNode> {
        self.syllabuses.iter().find(|item| item.index == index)
    }
}
