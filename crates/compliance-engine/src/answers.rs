//! Schema answer access: field values, classification predicates and
//! evidence lookup through the reader.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::{AnswerRecord, ChapterInfo, Paragraph, SchemaResult};

use crate::reader::DocumentReader;
use crate::text::is_empty;

/// Predicate on a classification field, used to ignore template rules
/// that do not apply to the document at hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelationOperation {
    Equal,
    Unequal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRelation {
    pub field: String,
    pub operation: RelationOperation,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct AnswerManager {
    answers: BTreeMap<String, AnswerRecord>,
    classifications: BTreeMap<String, Vec<String>>,
}

impl AnswerManager {
    pub fn new(answers: BTreeMap<String, AnswerRecord>) -> Self {
        Self {
            answers,
            classifications: BTreeMap::new(),
        }
    }

    pub fn with_classifications(mut self, classifications: BTreeMap<String, Vec<String>>) -> Self {
        self.classifications = classifications;
        self
    }

    /// Convenience constructor for plain value answers.
    pub fn from_values(pairs: &[(&str, &str)]) -> Self {
        Self::new(
            pairs
                .iter()
                .map(|(name, value)| (name.to_string(), AnswerRecord::with_value(*value)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&AnswerRecord> {
        self.answers.get(name)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|record| record.value.as_deref())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|record| record.text.as_deref())
    }

    pub fn is_schema_field(&self, name: &str) -> bool {
        self.answers.contains_key(name)
    }

    pub fn classification(&self, name: &str) -> &[String] {
        self.classifications
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All relations must hold for the template to apply.
    pub fn verify_condition(&self, relations: &[TemplateRelation]) -> bool {
        relations.iter().all(|relation| {
            let values = self.classification(&relation.field);
            match relation.operation {
                RelationOperation::Equal => values.iter().any(|value| value == &relation.value),
                RelationOperation::Unequal => values.iter().all(|value| value != &relation.value),
            }
        })
    }

    /// Document paragraphs supporting a field's answer, resolved from
    /// its evidence outlines.
    pub fn related_paragraphs(&self, name: &str, reader: &DocumentReader) -> Vec<Paragraph> {
        let Some(record) = self.get(name) else {
            return Vec::new();
        };
        let mut seen: Vec<usize> = Vec::new();
        let mut paragraphs: Vec<Paragraph> = Vec::new();
        for (page, boxes) in &record.outlines {
            for outline in boxes {
                for element in reader.find_elements_by_outline(*page, outline) {
                    if !seen.contains(&element.index) {
                        seen.push(element.index);
                        paragraphs.push(Paragraph::from(element));
                    }
                }
            }
        }
        paragraphs.sort_by_key(|paragraph| paragraph.index);
        paragraphs
    }

    /// Ancestor chapters of a field's first evidence location.
    pub fn chapters(&self, name: &str, reader: &DocumentReader) -> Vec<ChapterInfo> {
        let Some(record) = self.get(name) else {
            return Vec::new();
        };
        for (page, boxes) in &record.outlines {
            for outline in boxes {
                let chain = reader.find_chapters_by_outline(*page, outline);
                if !chain.is_empty() {
                    return chain
                        .into_iter()
                        .map(|node| ChapterInfo {
                            index: node.index,
                            title: node.title.clone(),
                        })
                        .collect();
                }
            }
        }
        Vec::new()
    }

    /// Title of the innermost chapter containing the field's answer.
    pub fn chapter_title(&self, name: &str, reader: &DocumentReader) -> Option<String> {
        self.chapters(name, reader)
            .last()
            .map(|chapter| chapter.title.clone())
    }

    /// Per-field evidence summary attached to the rule result.
    pub fn build_schema_results(&self, fields: &[String], reader: &DocumentReader) -> Vec<SchemaResult> {
        fields
            .iter()
            .map(|name| {
                let record = self.get(name);
                let outlines = record.map(|record| record.outlines.clone()).unwrap_or_default();
                let xpath = {
                    let mut xpaths: Vec<String> = Vec::new();
                    for (page, boxes) in &outlines {
                        for outline in boxes {
                            for element in reader.find_elements_by_outline(*page, outline) {
                                if let Some(path) =
                                    element.docx_meta.as_ref().and_then(|meta| meta.xpath.clone())
                                {
                                    if !xpaths.contains(&path) {
                                        xpaths.push(path);
                                    }
                                }
                            }
                        }
                    }
                    if xpaths.is_empty() {
                        None
                    } else {
                        Some(xpaths.join(","))
                    }
                };
                SchemaResult {
                    name: name.clone(),
                    matched: !is_empty(self.value(name)),
                    text: self.text(name).map(str::to_string),
                    page: record.map(AnswerRecord::page),
                    outlines: if outlines.is_empty() { None } else { Some(outlines) },
                    xpath,
                    chapters: self.chapters(name, reader),
                }
            })
            .collect()
    }
}
