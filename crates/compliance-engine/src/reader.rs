//! Read-only adapter over a parsed document: paragraph access, chapter
//! location by outline patterns and geometric element lookup.

use regex::Regex;
use shared_types::{Element, ElementClass, Outline, Paragraph, ParsedDocument, SyllabusNode};
use tracing::warn;

use crate::text::clean;

/// Overlap threshold for outline to element resolution.
const OUTLINE_OVERLAP_THRESHOLD: f64 = 0.618;

/// Denominator choice for [`DocumentReader::overlap_percent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapBase {
    Box,
    Element,
    Min,
    Max,
}

fn area(outline: &Outline) -> f64 {
    (outline[2] - outline[0]).max(0.0) * (outline[3] - outline[1]).max(0.0)
}

fn intersection(a: &Outline, b: &Outline) -> f64 {
    let x = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let y = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    x * y
}

pub struct DocumentReader<'a> {
    doc: &'a ParsedDocument,
}

impl<'a> DocumentReader<'a> {
    pub fn new(doc: &'a ParsedDocument) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &'a ParsedDocument {
        self.doc
    }

    /// PARAGRAPH elements in reading order, continuation fragments
    /// excluded.
    pub fn paragraphs(&self) -> Vec<Paragraph> {
        self.doc
            .elements
            .iter()
            .filter(|element| element.class == ElementClass::Paragraph && !element.fragment)
            .map(Paragraph::from)
            .collect()
    }

    pub fn find_element_by_index(&self, index: usize) -> Option<&'a Element> {
        self.doc.element(index)
    }

    pub fn syllabus(&self, index: usize) -> Option<&'a SyllabusNode> {
        self.doc.syllabus(index)
    }

    /// Ancestor outline chain of an element, outermost first.
    pub fn find_syllabuses_by_index(&self, element_index: usize) -> Vec<&'a SyllabusNode> {
        let mut chain: Vec<&SyllabusNode> = self
            .doc
            .syllabuses
            .iter()
            .filter(|node| node.range.0 <= element_index && element_index < node.range.1)
            .collect();
        chain.sort_by_key(|node| node.level);
        chain
    }

    /// Outline nodes whose cleaned title matches any pattern, in
    /// document order.
    pub fn find_sylls_by_pattern(&self, patterns: &[Regex], reverse: bool) -> Vec<&'a SyllabusNode> {
        let mut nodes: Vec<&SyllabusNode> = self
            .doc
            .syllabuses
            .iter()
            .filter(|node| {
                let title = clean(&node.title);
                patterns.iter().any(|pattern| pattern.is_match(&title))
            })
            .collect();
        nodes.sort_by_key(|node| node.element);
        if reverse {
            nodes.reverse();
        }
        nodes
    }

    /// Locate chapters by title patterns and return their paragraphs.
    /// With `is_continued_chapter` only the last matching chapter's
    /// contiguous range is used; otherwise the union of all ranges.
    pub fn find_paragraphs_by_chapters(
        &self,
        patterns: &[Regex],
        is_continued_chapter: bool,
    ) -> (Vec<&'a SyllabusNode>, Vec<Paragraph>) {
        let chapters = self.find_sylls_by_pattern(patterns, false);
        if chapters.is_empty() {
            return (chapters, Vec::new());
        }

        let ranges: Vec<(usize, usize)> = if is_continued_chapter {
            chapters
                .last()
                .map(|chapter| vec![chapter.range])
                .unwrap_or_default()
        } else {
            chapters.iter().map(|chapter| chapter.range).collect()
        };

        let mut seen: Vec<usize> = Vec::new();
        let mut paragraphs: Vec<Paragraph> = Vec::new();
        for element in &self.doc.elements {
            if element.class != ElementClass::Paragraph || element.fragment {
                continue;
            }
            if ranges
                .iter()
                .any(|(start, end)| *start <= element.index && element.index < *end)
                && !seen.contains(&element.index)
            {
                seen.push(element.index);
                paragraphs.push(Paragraph::from(element));
            }
        }
        (chapters, paragraphs)
    }

    pub fn overlap_percent(&self, element: &Outline, reference: &Outline, base: OverlapBase) -> f64 {
        let inter = intersection(element, reference);
        let denominator = match base {
            OverlapBase::Box => area(reference),
            OverlapBase::Element => area(element),
            OverlapBase::Min => area(element).min(area(reference)),
            OverlapBase::Max => area(element).max(area(reference)),
        };
        if denominator <= 0.0 {
            return 0.0;
        }
        inter / denominator
    }

    /// Elements on `page` overlapping `outline`. Falls back to the
    /// single best-overlapping element when none passes the threshold.
    pub fn find_elements_by_outline(&self, page: u32, outline: &Outline) -> Vec<&'a Element> {
        let candidates: Vec<&Element> = self
            .doc
            .elements
            .iter()
            .filter(|element| element.page == page)
            .collect();

        let passed: Vec<&Element> = candidates
            .iter()
            .copied()
            .filter(|element| {
                self.overlap_percent(&element.outline, outline, OverlapBase::Min)
                    >= OUTLINE_OVERLAP_THRESHOLD
            })
            .collect();
        if !passed.is_empty() {
            return passed;
        }

        let best = candidates
            .iter()
            .copied()
            .map(|element| {
                (
                    element,
                    self.overlap_percent(&element.outline, outline, OverlapBase::Min),
                )
            })
            .filter(|(_, overlap)| *overlap > 0.0)
            .max_by(|(_, a), (_, b)| a.total_cmp(b));
        match best {
            Some((element, _)) => vec![element],
            None => {
                warn!(page, ?outline, "no element found for outline");
                Vec::new()
            }
        }
    }

    /// XPaths of table cells hit by `outline`: the cell box overlaps
    /// and at least one character center falls inside the outline.
    pub fn find_cell_xpaths(&self, element: &Element, page: u32, outline: &Outline) -> Vec<String> {
        let mut xpaths = Vec::new();
        for cell in element.cells.values() {
            if cell.dummy || cell.page != page {
                continue;
            }
            if self.overlap_percent(&cell.outline, outline, OverlapBase::Min) <= 0.0 {
                continue;
            }
            let hit = cell.chars.iter().any(|char_box| {
                let center_x = (char_box.outline[0] + char_box.outline[2]) / 2.0;
                let center_y = (char_box.outline[1] + char_box.outline[3]) / 2.0;
                center_x >= outline[0]
                    && center_x <= outline[2]
                    && center_y >= outline[1]
                    && center_y <= outline[3]
            });
            if !hit {
                continue;
            }
            if let Some(xpath) = cell.docx_meta.as_ref().and_then(|meta| meta.xpath.clone()) {
                xpaths.push(xpath);
            }
        }
        xpaths
    }

    /// The outline chain of the first element under `outline` that has
    /// one, in element order.
    pub fn find_chapters_by_outline(&self, page: u32, outline: &Outline) -> Vec<&'a SyllabusNode> {
        let mut elements = self.find_elements_by_outline(page, outline);
        elements.sort_by_key(|element| element.index);
        for element in elements {
            let chain = self.find_syllabuses_by_index(element.index);
            if !chain.is_empty() {
                return chain;
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn element(index: usize, class: ElementClass, page: u32, outline: Outline, text: &str) -> Element {
        Element {
            index,
            class,
            page,
            outline,
            text: text.to_string(),
            chars: vec![],
            fragment: false,
            cells: BTreeMap::new(),
            syllabus: None,
            docx_meta: None,
        }
    }

    fn fixture() -> ParsedDocument {
        ParsedDocument {
            elements: vec![
                element(0, ElementClass::Paragraph, 1, [0.0, 0.0, 100.0, 10.0], "第一章 总则"),
                element(1, ElementClass::Paragraph, 1, [0.0, 12.0, 100.0, 22.0], "本基金为契约型开放式基金。"),
                element(2, ElementClass::Paragraph, 1, [0.0, 24.0, 100.0, 34.0], "第二章 基金份额的申购与赎回"),
                element(3, ElementClass::Paragraph, 2, [0.0, 0.0, 100.0, 10.0], "投资人可在开放日申购。"),
                element(4, ElementClass::Table, 2, [0.0, 12.0, 100.0, 50.0], ""),
            ],
            syllabuses: vec![
                SyllabusNode {
                    index: 0,
                    title: "第一章 总则".to_string(),
                    level: 1,
                    element: 0,
                    range: (0, 2),
                    children: vec![],
                },
                SyllabusNode {
                    index: 1,
                    title: "第二章 基金份额的申购与赎回".to_string(),
                    level: 1,
                    element: 2,
                    range: (2, 5),
                    children: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_paragraphs_skip_tables() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        assert_eq!(reader.paragraphs().len(), 4);
    }

    #[test]
    fn test_find_paragraphs_by_chapters() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let patterns = vec![Regex::new("申购与赎回").unwrap()];
        let (chapters, paragraphs) = reader.find_paragraphs_by_chapters(&patterns, true);
        assert_eq!(chapters.len(), 1);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[1].text, "投资人可在开放日申购。");
    }

    #[test]
    fn test_find_paragraphs_no_chapter() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let patterns = vec![Regex::new("不存在的章节").unwrap()];
        let (chapters, paragraphs) = reader.find_paragraphs_by_chapters(&patterns, true);
        assert!(chapters.is_empty());
        assert!(paragraphs.is_empty());
    }

    #[test]
    fn test_overlap_percent() {
        let doc = ParsedDocument::default();
        let reader = DocumentReader::new(&doc);
        let a = [0.0, 0.0, 10.0, 10.0];
        let b = [5.0, 0.0, 15.0, 10.0];
        assert_eq!(reader.overlap_percent(&a, &b, OverlapBase::Min), 0.5);
        assert_eq!(reader.overlap_percent(&a, &b, OverlapBase::Max), 0.5);
        let zero = [0.0, 0.0, 0.0, 0.0];
        assert_eq!(reader.overlap_percent(&a, &zero, OverlapBase::Box), 0.0);
    }

    #[test]
    fn test_find_elements_by_outline_threshold_and_fallback() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let hits = reader.find_elements_by_outline(1, &[0.0, 12.0, 100.0, 22.0]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);

        // partial overlap below threshold still resolves the best one
        let hits = reader.find_elements_by_outline(1, &[0.0, 21.5, 100.0, 23.5]);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);

        let hits = reader.find_elements_by_outline(5, &[0.0, 0.0, 10.0, 10.0]);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_syllabus_chain() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let chain = reader.find_syllabuses_by_index(3);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].title, "第二章 基金份额的申购与赎回");
    }
}
