//! Sentence-level paragraph similarity with HTML diff rendering.
//!
//! Both sides are split into sentences, normalized (cleaned, numbering
//! and punctuation stripped, synonyms folded) and paired by longest
//! common subsequence ratio. The aggregate ratios drive template
//! classification.

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::{DiffItem, DiffKind, Outlines, Paragraph};

use crate::text::{clean, replace_synonym, strip_junk, strip_numbering};

/// A left/right sentence pair is accepted at this ratio.
const PAIR_MIN_RATIO: f64 = 0.5;
/// Tolerance for treating a ratio as a full match.
const FULL_MATCH_TOL: f64 = 1e-5;
/// Below this aggregate ratio a similarity is considered unrelated.
pub const MIN_RATIO_THRESHOLD_VALUE: f64 = 0.2;

lazy_static! {
    static ref P_SENTENCE_SEP: Regex = Regex::new(r"[。;；？:：\n]+").unwrap();
}

/// Similarity construction options.
#[derive(Debug, Clone, Default)]
pub struct SimilarityOptions {
    /// Synonym equivalence classes; the first word is the canonical form.
    pub synonyms: Vec<Vec<String>>,
    /// Extra document sentences do not count against the match ratio.
    pub ignore_extra_para: bool,
    /// Overrides the default sentence separator class.
    pub separators: Option<String>,
}

#[derive(Debug, Clone)]
struct Sentence {
    text: String,
    normalized: String,
    paragraph: usize,
}

/// One paired sentence with its diff. `origin` is the document
/// paragraph the matched sentence came from.
#[derive(Debug, Clone)]
pub struct DiffResult {
    pub left: String,
    pub right: Option<String>,
    pub ratio: f64,
    pub diff: Vec<DiffItem>,
    pub origin: Option<Paragraph>,
}

impl DiffResult {
    pub fn is_full_matched(&self) -> bool {
        self.ratio >= 1.0 - FULL_MATCH_TOL
    }
}

enum DiffOp {
    Equal(String),
    Del(String),
    Ins(String),
}

/// Character-level LCS diff as merged runs.
fn lcs_ops(left: &str, right: &str) -> Vec<DiffOp> {
    let left: Vec<char> = left.chars().collect();
    let right: Vec<char> = right.chars().collect();
    let rows = left.len() + 1;
    let cols = right.len() + 1;
    let mut table = vec![0usize; rows * cols];
    for i in (0..left.len()).rev() {
        for j in (0..right.len()).rev() {
            table[i * cols + j] = if left[i] == right[j] {
                table[(i + 1) * cols + j + 1] + 1
            } else {
                table[(i + 1) * cols + j].max(table[i * cols + j + 1])
            };
        }
    }

    let mut ops: Vec<DiffOp> = Vec::new();
    let mut push = |ops: &mut Vec<DiffOp>, op: DiffOp| match (ops.last_mut(), op) {
        (Some(DiffOp::Equal(run)), DiffOp::Equal(text)) => run.push_str(&text),
        (Some(DiffOp::Del(run)), DiffOp::Del(text)) => run.push_str(&text),
        (Some(DiffOp::Ins(run)), DiffOp::Ins(text)) => run.push_str(&text),
        (_, op) => ops.push(op),
    };

    let (mut i, mut j) = (0usize, 0usize);
    while i < left.len() && j < right.len() {
        if left[i] == right[j] {
            push(&mut ops, DiffOp::Equal(left[i].to_string()));
            i += 1;
            j += 1;
        } else if table[(i + 1) * cols + j] >= table[i * cols + j + 1] {
            push(&mut ops, DiffOp::Del(left[i].to_string()));
            i += 1;
        } else {
            push(&mut ops, DiffOp::Ins(right[j].to_string()));
            j += 1;
        }
    }
    while i < left.len() {
        push(&mut ops, DiffOp::Del(left[i].to_string()));
        i += 1;
    }
    while j < right.len() {
        push(&mut ops, DiffOp::Ins(right[j].to_string()));
        j += 1;
    }
    ops
}

fn lcs_len(left: &str, right: &str) -> usize {
    lcs_ops(left, right)
        .iter()
        .map(|op| match op {
            DiffOp::Equal(run) => run.chars().count(),
            _ => 0,
        })
        .sum()
}

/// `2M / (L + R)` over characters; two empty strings are equal.
pub fn ratio(left: &str, right: &str) -> f64 {
    let total = left.chars().count() + right.chars().count();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(left, right) as f64 / total as f64
}

/// Deleted runs are struck out, inserted runs underlined.
fn render_diff_html(left: &str, right: &str) -> String {
    lcs_ops(left, right)
        .iter()
        .map(|op| match op {
            DiffOp::Equal(run) => run.clone(),
            DiffOp::Del(run) => format!("<s>{}</s>", run),
            DiffOp::Ins(run) => format!("<u>{}</u>", run),
        })
        .collect()
}

pub struct ParagraphSimilarity {
    right_paragraphs: Vec<Paragraph>,
    left_sentences: Vec<Sentence>,
    right_sentences: Vec<Sentence>,
    /// Per left sentence: matched right sentence index and ratio.
    pairs: Vec<(Option<usize>, f64)>,
    results: Vec<DiffResult>,
    ignore_extra_para: bool,
}

impl ParagraphSimilarity {
    pub fn new(left: &[Paragraph], right: &[Paragraph], options: &SimilarityOptions) -> Self {
        let separator = options
            .separators
            .as_deref()
            .map(|pattern| Regex::new(pattern).unwrap_or_else(|_| P_SENTENCE_SEP.clone()))
            .unwrap_or_else(|| P_SENTENCE_SEP.clone());

        let left_sentences = split_sentences(left, &separator, &options.synonyms);
        let right_sentences = split_sentences(right, &separator, &options.synonyms);

        let mut taken = vec![false; right_sentences.len()];
        let mut pairs: Vec<(Option<usize>, f64)> = Vec::with_capacity(left_sentences.len());
        let mut results: Vec<DiffResult> = Vec::with_capacity(left_sentences.len());
        for sentence in &left_sentences {
            let mut best: Option<(usize, f64)> = None;
            for (index, candidate) in right_sentences.iter().enumerate() {
                if taken[index] {
                    continue;
                }
                let pair_ratio = ratio(&sentence.normalized, &candidate.normalized);
                if pair_ratio >= PAIR_MIN_RATIO
                    && best.map(|(_, current)| pair_ratio > current).unwrap_or(true)
                {
                    best = Some((index, pair_ratio));
                }
            }
            match best {
                Some((index, pair_ratio)) => {
                    taken[index] = true;
                    let candidate = &right_sentences[index];
                    results.push(DiffResult {
                        left: sentence.text.clone(),
                        right: Some(candidate.text.clone()),
                        ratio: pair_ratio,
                        diff: vec![DiffItem {
                            html: render_diff_html(&sentence.text, &candidate.text),
                            kind: if pair_ratio >= 1.0 - FULL_MATCH_TOL {
                                DiffKind::Equal
                            } else {
                                DiffKind::Match
                            },
                            left: sentence.text.clone(),
                            right: Some(candidate.text.clone()),
                        }],
                        origin: right.get(candidate.paragraph).cloned(),
                    });
                    pairs.push((Some(index), pair_ratio));
                }
                None => {
                    results.push(DiffResult {
                        left: sentence.text.clone(),
                        right: None,
                        ratio: 0.0,
                        diff: vec![DiffItem {
                            html: format!("<s>{}</s>", sentence.text),
                            kind: DiffKind::Del,
                            left: sentence.text.clone(),
                            right: None,
                        }],
                        origin: None,
                    });
                    pairs.push((None, 0.0));
                }
            }
        }

        Self {
            right_paragraphs: right.to_vec(),
            left_sentences,
            right_sentences,
            pairs,
            results,
            ignore_extra_para: options.ignore_extra_para,
        }
    }

    fn extra_right_indices(&self) -> Vec<usize> {
        (0..self.right_sentences.len())
            .filter(|index| !self.pairs.iter().any(|(paired, _)| paired == &Some(*index)))
            .collect()
    }

    /// Length-weighted aggregate ratio. Unpaired document sentences
    /// weigh in at ratio 0 unless extras are ignored.
    pub fn max_ratio(&self) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for (sentence, (paired, pair_ratio)) in self.left_sentences.iter().zip(&self.pairs) {
            let mut weight = sentence.normalized.chars().count() as f64;
            if let Some(index) = paired {
                weight = weight.max(self.right_sentences[*index].normalized.chars().count() as f64);
            }
            weighted += pair_ratio * weight;
            total += weight;
        }
        if !self.ignore_extra_para {
            for index in self.extra_right_indices() {
                total += self.right_sentences[index].normalized.chars().count() as f64;
            }
        }
        if total == 0.0 {
            return 0.0;
        }
        weighted / total
    }

    /// Unweighted mean of per-sentence ratios.
    pub fn avg_ratio(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        self.pairs.iter().map(|(_, pair_ratio)| pair_ratio).sum::<f64>() / self.pairs.len() as f64
    }

    pub fn valid_sentences_count(&self) -> usize {
        self.pairs.iter().filter(|(paired, _)| paired.is_some()).count()
    }

    pub fn is_full_matched(&self) -> bool {
        !self.pairs.is_empty() && self.max_ratio() >= 1.0 - FULL_MATCH_TOL
    }

    /// Every reference sentence has a full match in the document; the
    /// document may carry extra content.
    pub fn is_full_matched_or_contain(&self) -> bool {
        if self.is_full_matched() {
            return true;
        }
        !self.pairs.is_empty()
            && self
                .pairs
                .iter()
                .all(|(paired, pair_ratio)| paired.is_some() && *pair_ratio >= 1.0 - FULL_MATCH_TOL)
    }

    pub fn is_matched(&self) -> bool {
        self.is_full_matched_or_contain() || self.max_ratio() > MIN_RATIO_THRESHOLD_VALUE
    }

    pub fn results(&self) -> &[DiffResult] {
        &self.results
    }

    /// Flat JSON-serializable diff including unmatched document content.
    pub fn simple_results(&self) -> Vec<DiffItem> {
        let mut items: Vec<DiffItem> = self
            .results
            .iter()
            .flat_map(|result| result.diff.iter().cloned())
            .collect();
        for index in self.extra_right_indices() {
            let text = self.right_sentences[index].text.clone();
            items.push(DiffItem {
                html: format!("<u>{}</u>", text),
                kind: DiffKind::Add,
                left: String::new(),
                right: Some(text),
            });
        }
        items
    }

    fn matched_right_paragraphs(&self) -> Vec<&Paragraph> {
        let mut indices: Vec<usize> = self
            .pairs
            .iter()
            .filter_map(|(paired, _)| paired.map(|index| self.right_sentences[index].paragraph))
            .collect();
        indices.sort_unstable();
        indices.dedup();
        indices
            .into_iter()
            .filter_map(|index| self.right_paragraphs.get(index))
            .collect()
    }

    pub fn right_outlines(&self) -> Outlines {
        let mut outlines = Outlines::new();
        for paragraph in self.matched_right_paragraphs() {
            if !paragraph.outlines.is_empty() {
                for (page, boxes) in &paragraph.outlines {
                    outlines.entry(*page).or_default().extend(boxes.iter().copied());
                }
            } else if let Some(outline) = paragraph.outline {
                outlines.entry(paragraph.page).or_default().push(outline);
            }
        }
        outlines
    }

    pub fn page(&self) -> u32 {
        self.matched_right_paragraphs()
            .iter()
            .map(|paragraph| paragraph.page)
            .min()
            .unwrap_or(0)
    }

    pub fn right_content(&self) -> String {
        self.pairs
            .iter()
            .filter_map(|(paired, _)| paired.map(|index| self.right_sentences[index].text.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn left_content(&self) -> String {
        self.left_sentences
            .iter()
            .map(|sentence| sentence.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn split_sentences(paragraphs: &[Paragraph], separator: &Regex, synonyms: &[Vec<String>]) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    for (index, paragraph) in paragraphs.iter().enumerate() {
        let cleaned = clean(&paragraph.text);
        for piece in separator.split(&cleaned) {
            let text = strip_numbering(piece);
            if text.is_empty() {
                continue;
            }
            let normalized = replace_synonym(synonyms, &strip_junk(&text));
            if normalized.is_empty() {
                continue;
            }
            sentences.push(Sentence {
                text,
                normalized,
                paragraph: index,
            });
        }
    }
    sentences
}

/// Find each item independently inside the document paragraphs. A
/// direct substring hit counts as a full match.
pub fn search_sentences(
    items: &[String],
    right_paragraphs: &[Paragraph],
    options: &SimilarityOptions,
) -> Vec<DiffResult> {
    let separator = options
        .separators
        .as_deref()
        .map(|pattern| Regex::new(pattern).unwrap_or_else(|_| P_SENTENCE_SEP.clone()))
        .unwrap_or_else(|| P_SENTENCE_SEP.clone());
    let right_sentences = split_sentences(right_paragraphs, &separator, &options.synonyms);
    let haystack: String = right_sentences
        .iter()
        .map(|sentence| sentence.normalized.as_str())
        .collect();

    items
        .iter()
        .map(|item| {
            let cleaned = clean(item);
            let normalized = replace_synonym(&options.synonyms, &strip_junk(&cleaned));
            if !normalized.is_empty() && haystack.contains(&normalized) {
                let origin = right_sentences
                    .iter()
                    .find(|sentence| sentence.normalized.contains(&normalized))
                    .map(|sentence| sentence.paragraph)
                    .and_then(|index| right_paragraphs.get(index))
                    .or_else(|| right_paragraphs.first())
                    .cloned();
                return DiffResult {
                    left: cleaned.clone(),
                    right: Some(cleaned.clone()),
                    ratio: 1.0,
                    diff: vec![DiffItem {
                        html: cleaned.clone(),
                        kind: DiffKind::Equal,
                        left: cleaned.clone(),
                        right: Some(cleaned),
                    }],
                    origin,
                };
            }

            let mut best: Option<(&Sentence, f64)> = None;
            for candidate in &right_sentences {
                let pair_ratio = ratio(&normalized, &candidate.normalized);
                if best.map(|(_, current)| pair_ratio > current).unwrap_or(true) {
                    best = Some((candidate, pair_ratio));
                }
            }
            match best {
                Some((candidate, pair_ratio)) if pair_ratio >= PAIR_MIN_RATIO => DiffResult {
                    left: cleaned.clone(),
                    right: Some(candidate.text.clone()),
                    ratio: pair_ratio,
                    diff: vec![DiffItem {
                        html: render_diff_html(&cleaned, &candidate.text),
                        kind: DiffKind::Match,
                        left: cleaned,
                        right: Some(candidate.text.clone()),
                    }],
                    origin: right_paragraphs.get(candidate.paragraph).cloned(),
                },
                _ => DiffResult {
                    left: cleaned.clone(),
                    right: None,
                    ratio: 0.0,
                    diff: vec![DiffItem {
                        html: format!("<s>{}</s>", cleaned),
                        kind: DiffKind::Del,
                        left: cleaned,
                        right: None,
                    }],
                    origin: None,
                },
            }
        })
        .collect()
}
