//! Template matching: checks document content against configured
//! reference texts (model contract clauses and statute excerpts) and
//! classifies every comparison as a reason.
//!
//! Four template shapes are supported. Normal templates search the best
//! reference variant inside located paragraphs; chapters templates
//! compare two chapter ranges of the same document; chapter-with
//! templates run literal sub-templates against each side; sentence
//! templates count independently searched sentences.

use std::collections::{BTreeMap, BTreeSet};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shared_types::{
    ConflictReasonItem, DiffItem, DiffKind, ExprItem, IgnoreConditionItem, MatchFailedItem,
    MatchReasonItem, MissContentReasonItem, NoMatchReasonItem, Paragraph, Reason, ReasonTemplate,
    ResultItem, SchemaFailedItem, SyllabusNode,
};
use tracing::{error, warn};

use crate::answers::{AnswerManager, TemplateRelation};
use crate::expr::ExprCalculator;
use crate::numerals::{cn2digit, number2chinese};
use crate::reader::DocumentReader;
use crate::similarity::{search_sentences, DiffResult, ParagraphSimilarity, SimilarityOptions};
use crate::suggest::{
    get_outlines, get_xpath_by_outlines, render_reason_suggestion, render_suggestion_by_reasons,
    P_CATALOG_TITLE,
};

/// Aggregate ratio above which a grouped pick is trusted as-is.
pub const THRESHOLD_VALUE: f64 = 0.8;
/// Ratio margin a global pick must win by to override the grouped pick.
pub const DIFFERENCE_VALUE: f64 = 0.2;

lazy_static! {
    static ref P_CHAPTER_NUMBERING: Regex =
        Regex::new(r"^\s*第?\s*([一二三四五六七八九十零〇0-9]+)\s*[章节.\s、，,]+").unwrap();
    static ref P_TOP_CHAPTER_NUMBERING: Regex =
        Regex::new(r"^\s*第?\s*([一二三四五六七八九十零〇]+)\s*[章节.\s、，,]+").unwrap();
}

fn default_true() -> bool {
    true
}

/// Failure wording attached to a locator or sub-template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissDetail {
    #[serde(default)]
    pub reason_text: String,
    #[serde(default)]
    pub miss_content: Option<String>,
    #[serde(default)]
    pub suggestion: Option<String>,
}

/// Marker pair delimiting a paragraph range inside located chapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterRange {
    pub chapters: Vec<String>,
    pub start: Vec<String>,
    pub end: Vec<String>,
}

/// Chapter title patterns locating the paragraphs a template applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterLocator {
    pub chapters: Vec<String>,
    #[serde(default = "default_true")]
    pub is_continued_chapter: bool,
    #[serde(default)]
    pub range: Option<ChapterRange>,
    #[serde(default)]
    pub miss_detail: Option<MissDetail>,
}

/// Paragraph source override: the supporting paragraphs of a schema
/// field's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementFrom {
    pub field: String,
}

/// One slot of a normal template's reference text. A slot is a fixed
/// sentence, a one-of list of sentences, or a conditional block that
/// expands to further slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateItem {
    Text(String),
    Options(Vec<String>),
    Choice(TemplateChoice),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateChoice {
    #[serde(default)]
    pub conditions: Vec<TemplateRelation>,
    /// Mutually exclusive alternatives; the first one whose conditions
    /// hold wins.
    #[serde(default)]
    pub single_optional: Vec<TemplateChoice>,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
}

/// Fallback validation when no reference variant matched: search a
/// pattern in the candidate paragraphs and accept the hit when the
/// expression over its named captures holds, otherwise diff against the
/// rewritten form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexValidator {
    pub regex: String,
    pub expr: Vec<ExprItem>,
    pub format: String,
}

/// Referenced fields may not all be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldChecker {
    pub names: Vec<String>,
    pub reason_text: String,
    pub suggestion: String,
}

/// One sub-template of a normal template rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content_title: String,
    #[serde(default)]
    pub items: Vec<TemplateItem>,
    /// Alternate reference sequences tried when the main pick is weak.
    #[serde(default)]
    pub other_items: Vec<Vec<String>>,
    #[serde(default)]
    pub chapter: Option<ChapterLocator>,
    #[serde(default)]
    pub element_from: Option<ElementFrom>,
    /// Extra paragraph sources (schema fields) searched after the
    /// located paragraphs.
    #[serde(default)]
    pub addition_element_from: Vec<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub ignore: Vec<TemplateRelation>,
    #[serde(default)]
    pub ignore_text: String,
    #[serde(default)]
    pub schema_fields: Vec<String>,
    #[serde(default)]
    pub field_checker: Vec<FieldChecker>,
    #[serde(default)]
    pub miss_detail: Option<MissDetail>,
    #[serde(default)]
    pub diff_text: Option<String>,
    #[serde(default)]
    pub regex: Option<RegexValidator>,
}

/// One side of a chapters template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterSide {
    pub chapters: Vec<String>,
    #[serde(default)]
    pub miss_detail: MissDetail,
}

/// A literal sub-template of a chapter-with template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiteralTemplate {
    pub name: String,
    #[serde(default)]
    pub content_title: String,
    pub items: Vec<String>,
    #[serde(default)]
    pub diff_text: Option<String>,
    #[serde(default)]
    pub miss_detail: Option<MissDetail>,
}

/// One side of a chapter-with template: a locator plus its literal
/// sub-templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSide {
    #[serde(default)]
    pub chapter: Option<ChapterLocator>,
    #[serde(default)]
    pub element_from: Option<ElementFrom>,
    #[serde(default)]
    pub miss_detail: Option<MissDetail>,
    #[serde(default)]
    pub templates: Vec<LiteralTemplate>,
}

/// One sentence-search sub-template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentenceTemplate {
    pub name: String,
    #[serde(default)]
    pub content_title: String,
    pub items: Vec<String>,
    pub sentence_count: usize,
    #[serde(default)]
    pub chapter: Option<ChapterLocator>,
    #[serde(default)]
    pub element_from: Option<ElementFrom>,
    #[serde(default)]
    pub diff_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TemplateMode {
    Normal {
        templates: Vec<SubTemplate>,
    },
    Chapters {
        left: ChapterSide,
        right: ChapterSide,
        #[serde(default)]
        diff_text: Option<String>,
        #[serde(default)]
        diff_suggestion: Option<String>,
        #[serde(default)]
        miss_detail: Option<MissDetail>,
    },
    ChapterWith {
        left: TemplateSide,
        right: TemplateSide,
    },
    Sentences {
        templates: Vec<SentenceTemplate>,
    },
}

/// Downgrade a matched rule when a mandatory chapter is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckChapter {
    pub chapters: Vec<String>,
    #[serde(default)]
    pub miss_detail: MissDetail,
}

/// One configured template rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRule {
    pub name: String,
    #[serde(default)]
    pub related_name: String,
    pub label: String,
    #[serde(default)]
    pub tip: Option<String>,
    /// Statute or model-contract source documents.
    #[serde(default, rename = "from")]
    pub source: Vec<String>,
    /// Verbatim reference excerpts shown alongside the result.
    #[serde(default)]
    pub origin: Vec<String>,
    #[serde(default)]
    pub schema_fields: Vec<String>,
    /// Per sub-template name, the minimum number of matched reasons.
    #[serde(default)]
    pub group_count: Vec<(String, usize)>,
    /// One satisfied group suffices.
    #[serde(default)]
    pub group_count_or: bool,
    #[serde(default)]
    pub check_chapter: Option<CheckChapter>,
    #[serde(flatten)]
    pub mode: TemplateMode,
}

impl TemplateRule {
    /// Source titles (bracketed) followed by the reference excerpts.
    pub fn origin_contents(&self) -> Vec<String> {
        let sources: Vec<String> = self
            .source
            .iter()
            .map(|item| {
                if item.starts_with('《') && item.ends_with('》') {
                    item.clone()
                } else {
                    format!("《{}》", item)
                }
            })
            .collect();
        vec![sources.join("\n"), self.origin.join("\n")]
    }
}

fn compile_patterns(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(err) => {
                warn!(pattern, %err, "invalid chapter pattern");
                None
            }
        })
        .collect()
}

/// Expand a choice structure into slots; each slot lists the sentence
/// options competing for that position.
fn split_template_slots(choice: &TemplateChoice, manager: &AnswerManager) -> Vec<Vec<String>> {
    if !choice.conditions.is_empty() && !manager.verify_condition(&choice.conditions) {
        return Vec::new();
    }
    for option in &choice.single_optional {
        if !option.conditions.is_empty() && !manager.verify_condition(&option.conditions) {
            continue;
        }
        return split_template_slots(option, manager);
    }

    let mut slots = Vec::new();
    for item in &choice.items {
        match item {
            TemplateItem::Text(text) => slots.push(vec![text.clone()]),
            TemplateItem::Options(options) => {
                if options.len() < 2 {
                    error!("template options slot needs at least two alternatives");
                    return Vec::new();
                }
                slots.push(options.clone());
            }
            TemplateItem::Choice(nested) => {
                slots.extend(split_template_slots(nested, manager));
            }
        }
    }
    slots
}

/// Cartesian product over slots, first slot varying slowest.
fn recombine_slots(slots: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut candidates: Vec<Vec<String>> = vec![Vec::new()];
    for slot in slots {
        let mut next = Vec::with_capacity(candidates.len() * slot.len());
        for candidate in &candidates {
            for option in slot {
                let mut expanded = candidate.clone();
                expanded.push(option.clone());
                next.push(expanded);
            }
        }
        candidates = next;
    }
    if slots.is_empty() {
        return Vec::new();
    }
    candidates
}

fn expand_items(items: &[TemplateItem], manager: &AnswerManager) -> Vec<Vec<String>> {
    let choice = TemplateChoice {
        conditions: Vec::new(),
        single_optional: Vec::new(),
        items: items.to_vec(),
    };
    recombine_slots(&split_template_slots(&choice, manager))
}

/// Collapse duplicated inapplicability and miss reasons, keeping the
/// first occurrence per `reason_text`, in stable order.
pub fn filter_same_reason(reasons: Vec<Reason>) -> Vec<Reason> {
    let mut seen: Vec<String> = Vec::new();
    let mut filtered = Vec::with_capacity(reasons.len());
    for reason in reasons {
        if reason.is_dedup_family() {
            let text = reason.reason_text().to_string();
            if seen.contains(&text) {
                continue;
            }
            seen.push(text);
        }
        filtered.push(reason);
    }
    filtered
}

fn miss_content_reason(miss_content: String, reason_text: String) -> MissContentReasonItem {
    let mut reason = MissContentReasonItem::new(miss_content, None);
    if !reason_text.is_empty() {
        reason.reason_text = reason_text;
    }
    reason
}

fn left_paragraphs_from_items(items: &[String]) -> Vec<Paragraph> {
    items
        .iter()
        .enumerate()
        .map(|(index, text)| Paragraph::from_text(index, text))
        .collect()
}

fn min_page(outlines: &shared_types::Outlines) -> u32 {
    outlines.keys().next().copied().unwrap_or(0)
}

pub struct TemplateMatcher<'a> {
    reader: &'a DocumentReader<'a>,
    manager: &'a AnswerManager,
    fid: i64,
    schema_id: Option<i64>,
    options: SimilarityOptions,
}

impl<'a> TemplateMatcher<'a> {
    pub fn new(reader: &'a DocumentReader<'a>, manager: &'a AnswerManager, fid: i64) -> Self {
        Self {
            reader,
            manager,
            fid,
            schema_id: None,
            options: SimilarityOptions::default(),
        }
    }

    pub fn with_schema_id(mut self, schema_id: Option<i64>) -> Self {
        self.schema_id = schema_id;
        self
    }

    pub fn with_options(mut self, options: SimilarityOptions) -> Self {
        self.options = options;
        self
    }

    /// Evaluate one template rule to exactly one result.
    pub fn check_rule(&self, rule: &TemplateRule) -> ResultItem {
        match &rule.mode {
            TemplateMode::Normal { templates } => self.check_normal(rule, templates),
            TemplateMode::Chapters {
                left,
                right,
                diff_text,
                diff_suggestion,
                miss_detail,
            } => self.check_chapters(
                rule,
                left,
                right,
                diff_text.as_deref(),
                diff_suggestion.as_deref(),
                miss_detail.as_ref(),
            ),
            TemplateMode::ChapterWith { left, right } => self.check_chapter_with(rule, left, right),
            TemplateMode::Sentences { templates } => self.check_sentences(rule, templates),
        }
    }

    fn result_item(
        &self,
        rule: &TemplateRule,
        is_compliance: bool,
        reasons: Vec<Reason>,
        suggestion: Option<String>,
    ) -> ResultItem {
        ResultItem {
            name: rule.name.clone(),
            related_name: rule.related_name.clone(),
            is_compliance: Some(is_compliance),
            reasons,
            suggestion,
            label: rule.label.clone(),
            schema_id: self.schema_id,
            fid: self.fid,
            origin_contents: rule.origin_contents(),
            schema_results: self.manager.build_schema_results(&rule.schema_fields, self.reader),
            tip: rule.tip.clone(),
            rule_type: None,
        }
    }

    /// Paragraphs a sub-template applies to, with the located chapters.
    fn locate_paragraphs(
        &self,
        element_from: Option<&ElementFrom>,
        chapter: Option<&ChapterLocator>,
    ) -> (Vec<&'a SyllabusNode>, Vec<Paragraph>) {
        if let Some(element_from) = element_from {
            return (
                Vec::new(),
                self.manager.related_paragraphs(&element_from.field, self.reader),
            );
        }
        let Some(locator) = chapter else {
            return (Vec::new(), self.reader.paragraphs());
        };
        let patterns = compile_patterns(&locator.chapters);
        let (chapters, paragraphs) = self
            .reader
            .find_paragraphs_by_chapters(&patterns, locator.is_continued_chapter);
        if paragraphs.is_empty() {
            if let Some(range) = &locator.range {
                return self.find_paragraphs_by_range(range);
            }
        }
        (chapters, paragraphs)
    }

    /// Paragraphs between a start and an end marker inside the located
    /// chapters.
    fn find_paragraphs_by_range(&self, range: &ChapterRange) -> (Vec<&'a SyllabusNode>, Vec<Paragraph>) {
        let patterns = compile_patterns(&range.chapters);
        let (chapters, paragraphs) = self.reader.find_paragraphs_by_chapters(&patterns, true);
        let start = compile_patterns(&range.start);
        let end = compile_patterns(&range.end);

        let mut selected = Vec::new();
        let mut find_start = false;
        for paragraph in paragraphs {
            if start.iter().any(|pattern| pattern.is_match(&paragraph.text)) {
                find_start = true;
                continue;
            }
            if find_start {
                if end.iter().any(|pattern| pattern.is_match(&paragraph.text)) {
                    break;
                }
                selected.push(paragraph);
            }
        }
        (chapters, selected)
    }

    /// Merged supporting paragraphs of several schema fields, in
    /// document order.
    fn paragraphs_by_schema_fields(&self, fields: &[String]) -> Vec<Paragraph> {
        let mut seen: Vec<usize> = Vec::new();
        let mut paragraphs: Vec<Paragraph> = Vec::new();
        for field in fields {
            for paragraph in self.manager.related_paragraphs(field, self.reader) {
                if !seen.contains(&paragraph.index) {
                    seen.push(paragraph.index);
                    paragraphs.push(paragraph);
                }
            }
        }
        paragraphs.sort_by_key(|paragraph| paragraph.index);
        paragraphs
    }

    fn check_field(&self, sub: &SubTemplate) -> Option<SchemaFailedItem> {
        for checker in &sub.field_checker {
            let all_empty = checker
                .names
                .iter()
                .all(|name| self.manager.value(name).map(str::is_empty).unwrap_or(true));
            if all_empty {
                return Some(SchemaFailedItem {
                    reason_text: checker.reason_text.clone(),
                    suggestion: checker.suggestion.clone(),
                });
            }
        }
        None
    }

    fn check_schema_fields(&self, fields: &[String]) -> Vec<Reason> {
        fields
            .iter()
            .filter(|field| self.manager.value(field).map(str::is_empty).unwrap_or(true))
            .map(|field| {
                Reason::SchemaFailed(SchemaFailedItem {
                    reason_text: format!("要素“{}”为空", field),
                    suggestion: format!("请补充“{}”", field),
                })
            })
            .collect()
    }

    fn similarity(&self, items: &[String], paragraphs: &[Paragraph]) -> ParagraphSimilarity {
        ParagraphSimilarity::new(&left_paragraphs_from_items(items), paragraphs, &self.options)
    }

    /// The regex fallback: accept a pattern hit whose captured values
    /// satisfy the validator expression, otherwise diff against the
    /// rewritten text.
    fn validate_by_regex(
        &self,
        validator: &RegexValidator,
        paragraph_groups: &[Vec<Paragraph>],
    ) -> Option<(ParagraphSimilarity, String)> {
        let regex = match Regex::new(&validator.regex) {
            Ok(regex) => regex,
            Err(err) => {
                warn!(pattern = %validator.regex, %err, "invalid template validator pattern");
                return None;
            }
        };
        for paragraphs in paragraph_groups {
            for paragraph in paragraphs {
                let Some(caps) = regex.captures(&paragraph.text) else {
                    continue;
                };
                let matched_text = caps
                    .get(0)
                    .map(|whole| whole.as_str().to_string())
                    .unwrap_or_default();
                let hit = Paragraph {
                    index: 0,
                    page: paragraph.page,
                    text: matched_text.clone(),
                    outline: paragraph.outline,
                    outlines: paragraph.outlines.clone(),
                };

                let expr = substitute_captures(&validator.expr, &caps);
                let accepted = ExprCalculator::new(&expr)
                    .run()
                    .map(|node| node.value.truthy())
                    .unwrap_or(false);
                let left = if accepted {
                    matched_text.clone()
                } else {
                    regex.replace(&matched_text, validator.format.as_str()).into_owned()
                };
                let similarity = ParagraphSimilarity::new(
                    &[Paragraph::from_text(0, left.clone())],
                    &[hit],
                    &self.options,
                );
                return Some((similarity, left));
            }
        }
        None
    }

    /// Match one sub-template against located (or given) paragraphs.
    fn match_sub_template(
        &self,
        sub: &SubTemplate,
        paragraphs: Option<Vec<Paragraph>>,
        required: bool,
    ) -> Reason {
        let candidates = expand_items(&sub.items, self.manager);
        if candidates.is_empty() {
            return Reason::MatchFailed(MatchFailedItem {
                page: None,
                outlines: None,
                reason_text: "模板配置有误".to_string(),
            });
        }
        let mut origin_content = candidates[0].join("\n");

        let paragraphs = match paragraphs {
            Some(paragraphs) => paragraphs,
            None => self.locate_paragraphs(sub.element_from.as_ref(), sub.chapter.as_ref()).1,
        };
        if paragraphs.is_empty() {
            if let Some(locator) = &sub.chapter {
                let detail = locator.miss_detail.clone().unwrap_or_default();
                let mut reason = MissContentReasonItem::new(
                    detail.miss_content.unwrap_or_default(),
                    Some(ReasonTemplate::new(origin_content, sub.name.clone())),
                );
                if !detail.reason_text.is_empty() {
                    reason.reason_text = detail.reason_text;
                }
                return Reason::MissContent(reason);
            }
            return Reason::NoMatch(NoMatchReasonItem::new(ReasonTemplate::new(
                origin_content,
                sub.name.clone(),
            )));
        }

        // Group candidate variants by how many sentences they matched.
        // Keep the best ratio of the largest group, but let the global
        // best ratio override a weak grouped pick.
        let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut similarities: Vec<(Vec<String>, ParagraphSimilarity)> = Vec::new();
        for items in &candidates {
            let similarity = self.similarity(items, &paragraphs);
            if similarity.max_ratio() > crate::similarity::MIN_RATIO_THRESHOLD_VALUE {
                grouped
                    .entry(similarity.valid_sentences_count())
                    .or_default()
                    .push(similarities.len());
                similarities.push((items.clone(), similarity));
            }
        }

        let mut selected: Option<usize> = None;
        if let Some((_, group)) = grouped.iter().next_back() {
            let mut best = group[0];
            for index in group {
                if similarities[*index].1.max_ratio() > similarities[best].1.max_ratio() {
                    best = *index;
                }
            }
            let mut global = 0;
            for index in 1..similarities.len() {
                if similarities[index].1.max_ratio() > similarities[global].1.max_ratio() {
                    global = index;
                }
            }
            if global != best
                && similarities[global].1.max_ratio() - similarities[best].1.max_ratio()
                    > DIFFERENCE_VALUE
                && similarities[best].1.max_ratio() < THRESHOLD_VALUE
            {
                best = global;
            }
            selected = Some(best);
        }

        let Some(selected) = selected else {
            let detail = sub.miss_detail.clone().unwrap_or_default();
            let mut reason =
                NoMatchReasonItem::new(ReasonTemplate::new(origin_content, sub.name.clone()));
            if !detail.reason_text.is_empty() {
                reason.reason_text = detail.reason_text;
            }
            if let Some(suggestion) = detail.suggestion {
                reason.suggestion = suggestion;
            }
            return Reason::NoMatch(reason);
        };
        let (chosen_items, mut similarity) = similarities.swap_remove(selected);
        origin_content = chosen_items.join("\n");

        // The located paragraphs come first; answer-derived paragraph
        // groups are searched afterwards with every alternate sequence.
        let mut paragraph_groups: Vec<Vec<Paragraph>> = vec![paragraphs];
        for field in &sub.addition_element_from {
            paragraph_groups.push(self.manager.related_paragraphs(field, self.reader));
        }

        'outer: for (para_index, group) in paragraph_groups.iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let mut items_groups: Vec<&[String]> = vec![&chosen_items];
            for other in &sub.other_items {
                items_groups.push(other);
            }
            for (item_index, items) in items_groups.iter().enumerate() {
                if items.is_empty() || (para_index == 0 && item_index == 0) {
                    continue;
                }
                let other_similarity = self.similarity(items, group);
                if other_similarity.max_ratio() > similarity.max_ratio() {
                    origin_content = items.join("\n");
                    similarity = other_similarity;
                    if similarity.is_full_matched() {
                        break 'outer;
                    }
                }
            }
            if similarity.is_full_matched() {
                break;
            }
        }

        if let Some(validator) = &sub.regex {
            if !similarity.is_full_matched() {
                if let Some((regex_similarity, left_content)) =
                    self.validate_by_regex(validator, &paragraph_groups)
                {
                    similarity = regex_similarity;
                    origin_content = left_content;
                }
            }
        }

        let outlines = similarity.right_outlines();
        if similarity.is_full_matched_or_contain() {
            let mut reason = MatchReasonItem::new(
                ReasonTemplate {
                    content: origin_content,
                    content_title: sub.content_title.clone(),
                    name: sub.name.clone(),
                    page: None,
                    outlines: None,
                },
                similarity.right_content(),
            );
            reason.content_title = "当前合同".to_string();
            reason.page = Some(min_page(&outlines));
            reason.outlines = outlines;
            reason.diff = similarity.simple_results();
            return Reason::Match(reason);
        }

        if similarity.is_matched() {
            let mut reason = ConflictReasonItem::new(
                ReasonTemplate {
                    content: origin_content,
                    content_title: sub.content_title.clone(),
                    name: sub.name.clone(),
                    page: None,
                    outlines: None,
                },
                similarity.right_content(),
            );
            reason.content_title = "当前合同".to_string();
            reason.page = Some(min_page(&outlines));
            reason.xpath = Some(get_xpath_by_outlines(self.reader, &outlines));
            reason.outlines = outlines;
            reason.diff = similarity.simple_results();
            if let Some(diff_text) = &sub.diff_text {
                reason.reason_text = diff_text.clone();
            }
            return Reason::Conflict(reason);
        }

        if required {
            let detail = sub.miss_detail.clone().unwrap_or_default();
            let mut reason = MissContentReasonItem::new(
                detail.miss_content.unwrap_or_default(),
                Some(ReasonTemplate::new(origin_content, sub.name.clone())),
            );
            if !detail.reason_text.is_empty() {
                reason.reason_text = detail.reason_text;
            }
            if let Some(suggestion) = detail.suggestion {
                reason.suggestion = suggestion;
            }
            return Reason::MissContent(reason);
        }

        Reason::NoMatch(NoMatchReasonItem::new(ReasonTemplate::new(
            origin_content,
            sub.name.clone(),
        )))
    }

    fn check_normal(&self, rule: &TemplateRule, templates: &[SubTemplate]) -> ResultItem {
        let mut reasons: Vec<Reason> = Vec::new();
        let mut miss_content = false;

        for sub in templates {
            let required = sub.required;
            let mut flag = false;

            let reason = if let Some(failed) = self.check_field(sub) {
                Reason::SchemaFailed(failed)
            } else if !sub.ignore.is_empty() && self.manager.verify_condition(&sub.ignore) {
                flag = true;
                Reason::IgnoreCondition(IgnoreConditionItem {
                    reason_text: sub.ignore_text.clone(),
                })
            } else {
                // Sub-template schema fields are verified independently;
                // without any answered field the comparison is skipped.
                let mut paragraphs = None;
                if !sub.schema_fields.is_empty() {
                    let child_reasons = self.check_schema_fields(&sub.schema_fields);
                    let all_empty = child_reasons.len() == sub.schema_fields.len();
                    reasons.extend(child_reasons);
                    if all_empty {
                        continue;
                    }
                    let answer_paragraphs = self.paragraphs_by_schema_fields(&sub.schema_fields);
                    if answer_paragraphs.is_empty() {
                        reasons.push(Reason::MatchFailed(MatchFailedItem {
                            page: None,
                            outlines: None,
                            reason_text: "当前规则对应的要素答案未找到对应内容".to_string(),
                        }));
                        continue;
                    }
                    paragraphs = Some(answer_paragraphs);
                }
                let reason = self.match_sub_template(sub, paragraphs, required);
                flag = reason.matched();
                reason
            };

            if !flag && required {
                miss_content = true;
            }

            let mut reason = reason;
            if flag {
                if let Some(check) = &rule.check_chapter {
                    let patterns = compile_patterns(&check.chapters);
                    if self.reader.find_sylls_by_pattern(&patterns, false).is_empty() {
                        reason.set_matched(false);
                        reasons.push(Reason::MissContent(miss_content_reason(
                            check.miss_detail.miss_content.clone().unwrap_or_default(),
                            check.miss_detail.reason_text.clone(),
                        )));
                    }
                }
            }
            reasons.push(reason);
        }

        let matched = after_match_template(rule, templates, &mut reasons, miss_content);
        let reasons = filter_same_reason(reasons);
        let suggestion = if matched {
            None
        } else {
            Some(render_suggestion_by_reasons(self.reader, &rule.related_name, &reasons))
        };
        self.result_item(rule, matched, reasons, suggestion)
    }

    /// Chapter numbering text of the located chapters, normalized to
    /// "第X章" wording.
    fn chapter_numbering(&self, chapters: &[&SyllabusNode]) -> String {
        let Some(last) = chapters.last() else {
            return String::new();
        };
        let mut chain = self.reader.find_syllabuses_by_index(last.element);
        if chain
            .first()
            .map(|node| P_CATALOG_TITLE.is_match(node.title.trim()))
            .unwrap_or(false)
        {
            chain.remove(0);
        }
        let Some(first) = chain.first().copied() else {
            return String::new();
        };
        let mut chapter = first;
        for node in &chain {
            if P_TOP_CHAPTER_NUMBERING.is_match(&node.title) {
                chapter = node;
                break;
            }
        }
        let Some(caps) = P_CHAPTER_NUMBERING.captures(&chapter.title) else {
            return String::new();
        };
        let numbering = &caps[1];
        let value = if numbering.chars().all(|c| c.is_ascii_digit()) {
            numbering.parse::<f64>().ok()
        } else {
            cn2digit(numbering)
        };
        match value {
            Some(value) if value >= 0.0 => format!("第{}章", number2chinese(value as u64)),
            _ => String::new(),
        }
    }

    fn check_chapters(
        &self,
        rule: &TemplateRule,
        left: &ChapterSide,
        right: &ChapterSide,
        diff_text: Option<&str>,
        diff_suggestion: Option<&str>,
        miss_detail: Option<&MissDetail>,
    ) -> ResultItem {
        let (left_chapters, left_paragraphs) = self
            .reader
            .find_paragraphs_by_chapters(&compile_patterns(&left.chapters), true);
        let (right_chapters, right_paragraphs) = self
            .reader
            .find_paragraphs_by_chapters(&compile_patterns(&right.chapters), true);

        let reason = if left_paragraphs.is_empty() {
            Reason::MissContent(miss_content_reason(
                left.miss_detail.miss_content.clone().unwrap_or_default(),
                left.miss_detail.reason_text.clone(),
            ))
        } else if right_paragraphs.is_empty() {
            Reason::MissContent(miss_content_reason(
                right.miss_detail.miss_content.clone().unwrap_or_default(),
                right.miss_detail.reason_text.clone(),
            ))
        } else {
            let similarity =
                ParagraphSimilarity::new(&left_paragraphs, &right_paragraphs, &self.options);
            let left_outlines = get_outlines(&left_paragraphs);
            let right_outlines = similarity.right_outlines();
            let left_content: String = left_paragraphs
                .iter()
                .map(|paragraph| paragraph.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let template = ReasonTemplate {
                content: left_content,
                content_title: self.chapter_numbering(&left_chapters),
                name: "章节".to_string(),
                page: Some(min_page(&left_outlines)),
                outlines: Some(left_outlines),
            };

            if similarity.is_full_matched_or_contain() {
                let mut reason = MatchReasonItem::new(template, similarity.right_content());
                reason.content_title = self.chapter_numbering(&right_chapters);
                reason.page = Some(min_page(&right_outlines));
                reason.diff = similarity.simple_results();
                reason.xpath = Some(get_xpath_by_outlines(self.reader, &right_outlines));
                reason.outlines = right_outlines;
                Reason::Match(reason)
            } else if similarity.is_matched() {
                let mut reason = ConflictReasonItem::new(template, similarity.right_content());
                reason.content_title = self.chapter_numbering(&right_chapters);
                reason.page = Some(min_page(&right_outlines));
                reason.diff = similarity.simple_results();
                reason.xpath = Some(get_xpath_by_outlines(self.reader, &right_outlines));
                reason.outlines = right_outlines;
                if let Some(diff_text) = diff_text {
                    reason.reason_text = diff_text.to_string();
                }
                Reason::Conflict(reason)
            } else {
                let mut reason = NoMatchReasonItem::new(template);
                if let Some(detail) = miss_detail {
                    if !detail.reason_text.is_empty() {
                        reason.reason_text = detail.reason_text.clone();
                    }
                }
                Reason::NoMatch(reason)
            }
        };

        let matched = reason.matched();
        let suggestion = if matched {
            None
        } else if matches!(reason, Reason::Conflict(_)) {
            diff_suggestion.map(str::to_string)
        } else {
            render_reason_suggestion(&reason, self.reader, &rule.related_name)
        };
        self.result_item(rule, matched, vec![reason], suggestion)
    }

    fn match_one_template(
        &self,
        template: &LiteralTemplate,
        paragraphs: &[Paragraph],
        right_title: &str,
    ) -> Reason {
        let similarity = self.similarity(&template.items, paragraphs);
        let outlines = similarity.right_outlines();
        let origin_content = template.items.join("\n");
        let reference = ReasonTemplate {
            content: origin_content,
            content_title: template.content_title.clone(),
            name: template.name.clone(),
            page: None,
            outlines: None,
        };

        if similarity.is_full_matched_or_contain() {
            let mut reason = MatchReasonItem::new(reference, similarity.right_content());
            reason.content_title = right_title.to_string();
            reason.page = Some(min_page(&outlines));
            reason.diff = similarity.simple_results();
            reason.xpath = Some(get_xpath_by_outlines(self.reader, &outlines));
            reason.outlines = outlines;
            return Reason::Match(reason);
        }

        if similarity.is_matched() {
            let mut reason = ConflictReasonItem::new(reference, similarity.right_content());
            reason.content_title = right_title.to_string();
            reason.page = Some(min_page(&outlines));
            reason.diff = similarity.simple_results();
            reason.xpath = Some(get_xpath_by_outlines(self.reader, &outlines));
            reason.outlines = outlines;
            if let Some(diff_text) = &template.diff_text {
                reason.reason_text = diff_text.clone();
            }
            return Reason::Conflict(reason);
        }

        let mut reason = NoMatchReasonItem::new(reference);
        if let Some(detail) = &template.miss_detail {
            if !detail.reason_text.is_empty() {
                reason.reason_text = detail.reason_text.clone();
            }
        }
        Reason::NoMatch(reason)
    }

    fn match_side(&self, side: &TemplateSide, reasons: &mut Vec<Reason>) {
        let (_, paragraphs) =
            self.locate_paragraphs(side.element_from.as_ref(), side.chapter.as_ref());
        if paragraphs.is_empty() {
            let detail = side.miss_detail.clone().unwrap_or_default();
            reasons.push(Reason::MissContent(miss_content_reason(
                detail.miss_content.unwrap_or_default(),
                detail.reason_text,
            )));
            return;
        }
        for template in &side.templates {
            reasons.push(self.match_one_template(template, &paragraphs, "当前合同"));
        }
    }

    fn check_chapter_with(&self, rule: &TemplateRule, left: &TemplateSide, right: &TemplateSide) -> ResultItem {
        let mut reasons = Vec::new();
        self.match_side(left, &mut reasons);
        self.match_side(right, &mut reasons);

        let matched = reasons.iter().all(Reason::matched);
        let mut suggestions: Vec<String> = Vec::new();
        for reason in &reasons {
            if !reason.matched() {
                if let Some(suggestion) =
                    render_reason_suggestion(reason, self.reader, &rule.related_name)
                {
                    if !suggestion.is_empty() {
                        suggestions.push(suggestion);
                    }
                }
            }
        }
        let suggestion = if suggestions.is_empty() {
            None
        } else {
            Some(suggestions.join("\n"))
        };
        self.result_item(rule, matched, reasons, suggestion)
    }

    /// HTML diff entries of independently searched sentences.
    fn mock_diff(&self, results: &[&DiffResult]) -> Vec<DiffItem> {
        let kind = if results.iter().all(|result| result.is_full_matched()) {
            DiffKind::Equal
        } else {
            DiffKind::Match
        };
        results
            .iter()
            .map(|result| DiffItem {
                html: result
                    .diff
                    .first()
                    .map(|item| item.html.clone())
                    .unwrap_or_else(|| result.left.clone()),
                kind,
                left: result.left.clone(),
                right: if kind == DiffKind::Equal {
                    None
                } else {
                    result.right.clone()
                },
            })
            .collect()
    }

    fn sentence_match_reason(&self, template: &SentenceTemplate, result: &DiffResult) -> MatchReasonItem {
        let outlines = result
            .origin
            .as_ref()
            .map(|origin| get_outlines(std::slice::from_ref(origin)))
            .unwrap_or_default();
        let mut reason = MatchReasonItem::new(
            ReasonTemplate {
                content: template.items.join("\n"),
                content_title: template.content_title.clone(),
                name: template.name.clone(),
                page: None,
                outlines: None,
            },
            result.right.clone().unwrap_or_default(),
        );
        reason.content_title = "当前合同".to_string();
        reason.page = Some(min_page(&outlines));
        reason.diff = self.mock_diff(&[result]);
        reason.xpath = Some(get_xpath_by_outlines(self.reader, &outlines));
        reason.outlines = outlines;
        reason
    }

    fn check_sentences(&self, rule: &TemplateRule, templates: &[SentenceTemplate]) -> ResultItem {
        let mut searched: Vec<(&SentenceTemplate, Vec<DiffResult>)> = Vec::new();
        for template in templates {
            let (_, paragraphs) =
                self.locate_paragraphs(template.element_from.as_ref(), template.chapter.as_ref());
            let results = search_sentences(&template.items, &paragraphs, &self.options);
            searched.push((template, results));
        }

        // Any sub-template fully satisfied makes the rule compliant.
        for (template, results) in &searched {
            if results.len() >= template.sentence_count
                && results.iter().all(DiffResult::is_full_matched)
            {
                let reasons: Vec<Reason> = results
                    .iter()
                    .map(|result| Reason::Match(self.sentence_match_reason(template, result)))
                    .collect();
                return self.result_item(rule, true, reasons, None);
            }
        }

        let mut reasons: Vec<Reason> = Vec::new();
        for (template, results) in &searched {
            let left_content = template.items.join("\n");
            if results.is_empty() {
                reasons.push(Reason::NoMatch(NoMatchReasonItem::new(ReasonTemplate::new(
                    left_content,
                    template.name.clone(),
                ))));
                continue;
            }

            let mut matched_count = 0usize;
            for result in results {
                if result.is_full_matched() {
                    reasons.push(Reason::Match(self.sentence_match_reason(template, result)));
                    matched_count += 1;
                } else if result.right.is_some() {
                    let outlines = result
                        .origin
                        .as_ref()
                        .map(|origin| get_outlines(std::slice::from_ref(origin)))
                        .unwrap_or_default();
                    let mut reason = ConflictReasonItem::new(
                        ReasonTemplate {
                            content: left_content.clone(),
                            content_title: template.content_title.clone(),
                            name: template.name.clone(),
                            page: None,
                            outlines: None,
                        },
                        result.right.clone().unwrap_or_default(),
                    );
                    reason.content_title = "当前合同".to_string();
                    reason.page = Some(min_page(&outlines));
                    reason.diff = self.mock_diff(&[result]);
                    reason.xpath = Some(get_xpath_by_outlines(self.reader, &outlines));
                    reason.outlines = outlines;
                    if let Some(diff_text) = &template.diff_text {
                        reason.reason_text = diff_text.clone();
                    }
                    reasons.push(Reason::Conflict(reason));
                    matched_count += 1;
                }
            }
            if matched_count < template.sentence_count {
                let mut reason = NoMatchReasonItem::new(ReasonTemplate::new(
                    left_content,
                    template.name.clone(),
                ));
                reason.reason_text = format!(
                    "仅匹配到{}条{}",
                    number2chinese(matched_count as u64),
                    template.name
                );
                reasons.push(Reason::NoMatch(reason));
            }
        }

        // Only the model-contract failures contribute to the advice.
        let mut suggestion: Option<String> = None;
        for reason in &reasons {
            let is_editing = reason
                .template()
                .map(|template| template.name == shared_types::TEMPLATE_EDITING)
                .unwrap_or(false);
            if is_editing && !reason.matched() {
                if let Some(item) = render_reason_suggestion(reason, self.reader, &rule.related_name)
                {
                    let duplicated = suggestion
                        .as_deref()
                        .map(|current| current.contains(&item))
                        .unwrap_or(false);
                    if !duplicated {
                        suggestion =
                            crate::text::append_suggestion(suggestion, Some(&item), "\n\n");
                    }
                }
            }
        }

        self.result_item(rule, false, reasons, suggestion)
    }
}

/// Fill a validator expression's field references from named captures.
fn substitute_captures(expr: &[ExprItem], caps: &regex::Captures) -> Vec<ExprItem> {
    expr.iter()
        .map(|item| match item {
            ExprItem::Value { name: Some(name), .. } => ExprItem::Value {
                value: caps.name(name).map(|matched| matched.as_str().to_string()),
                name: Some(name.clone()),
            },
            other => other.clone(),
        })
        .collect()
}

/// Reference text of the sub-templates carrying a given name.
fn group_template_text(templates: &[SubTemplate], name: &str) -> String {
    let mut parts = Vec::new();
    for sub in templates {
        if sub.name != name {
            continue;
        }
        let lines: Vec<String> = sub
            .items
            .iter()
            .filter_map(|item| match item {
                TemplateItem::Text(text) => Some(text.clone()),
                TemplateItem::Options(options) => options.first().cloned(),
                TemplateItem::Choice(_) => None,
            })
            .collect();
        parts.push(lines.join("\n"));
    }
    parts.join("\n")
}

/// Aggregate the per-sub-template reasons into the rule verdict,
/// applying group-count limits and the dual-reference forgiveness.
fn after_match_template(
    rule: &TemplateRule,
    templates: &[SubTemplate],
    reasons: &mut Vec<Reason>,
    miss_content: bool,
) -> bool {
    let mut matched = false;
    if !reasons.is_empty() && reasons.iter().all(Reason::is_ignore) {
        matched = true;
    } else {
        for reason in reasons.iter() {
            if reason.is_ignore() {
                continue;
            }
            matched |= reason.matched();
        }
    }

    if !rule.group_count.is_empty() {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for reason in reasons.iter() {
            if let Some(template) = reason.template() {
                if reason.matched() {
                    *counts.entry(template.name.clone()).or_default() += 1;
                }
            }
        }
        let mut find_matched = false;
        let mut missing: Vec<Reason> = Vec::new();
        for (key, count) in &rule.group_count {
            if counts.get(key.as_str()).copied().unwrap_or(0) < *count {
                let mut reason =
                    MissContentReasonItem::new(group_template_text(templates, key), None);
                reason.reason_text = format!("缺少部分{}内容", key);
                missing.push(Reason::MissContent(reason));
            } else {
                find_matched = true;
            }
        }
        if rule.group_count_or {
            if !find_matched {
                matched = false;
                reasons.extend(missing);
            }
        } else if !missing.is_empty() {
            matched = false;
            reasons.extend(missing);
        }
    } else {
        // Comparing against both the statute and the model contract:
        // when one reference's mismatches are fully covered by the
        // other's matches, the document is compliant after all.
        let diff_bearing: Vec<&Reason> =
            reasons.iter().filter(|reason| reason.diff().is_some()).collect();
        if diff_bearing.len() == 2 {
            let sets: Vec<(BTreeSet<&str>, BTreeSet<&str>)> = diff_bearing
                .iter()
                .map(|reason| {
                    let mut equal = BTreeSet::new();
                    let mut unequal = BTreeSet::new();
                    for item in reason.diff().unwrap_or_default() {
                        if item.kind == DiffKind::Equal {
                            equal.insert(item.left.as_str());
                        } else {
                            unequal.insert(item.left.as_str());
                        }
                    }
                    (equal, unequal)
                })
                .collect();
            let proper_subset = |small: &BTreeSet<&str>, large: &BTreeSet<&str>| {
                small.is_subset(large) && small.len() < large.len()
            };
            if proper_subset(&sets[1].1, &sets[0].0) || proper_subset(&sets[0].1, &sets[1].0) {
                matched = true;
            }
        }
    }

    if miss_content {
        matched = false;
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::{Element, ElementClass, ParsedDocument};
    use std::collections::BTreeMap as StdBTreeMap;

    fn element(index: usize, page: u32, y: f64, text: &str) -> Element {
        Element {
            index,
            class: ElementClass::Paragraph,
            page,
            outline: [0.0, y, 100.0, y + 10.0],
            text: text.to_string(),
            chars: vec![],
            fragment: false,
            cells: StdBTreeMap::new(),
            syllabus: None,
            docx_meta: None,
        }
    }

    fn fixture() -> ParsedDocument {
        ParsedDocument {
            elements: vec![
                element(0, 1, 0.0, "第一章 总则"),
                element(1, 1, 12.0, "基金管理人应当勤勉尽责。"),
                element(2, 1, 24.0, "第二章 风险揭示"),
                element(3, 1, 36.0, "本基金存在市场风险。"),
                element(4, 2, 0.0, "第三章 基金份额的申购"),
                element(5, 2, 12.0, "本基金存在市场风险。"),
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
                    title: "第二章 风险揭示".to_string(),
                    level: 1,
                    element: 2,
                    range: (2, 4),
                    children: vec![],
                },
                SyllabusNode {
                    index: 2,
                    title: "第三章 基金份额的申购".to_string(),
                    level: 1,
                    element: 4,
                    range: (4, 6),
                    children: vec![],
                },
            ],
        }
    }

    fn normal_rule(templates: Vec<SubTemplate>) -> TemplateRule {
        TemplateRule {
            name: "勤勉尽责".to_string(),
            related_name: "总则".to_string(),
            label: "t1".to_string(),
            tip: None,
            source: vec!["证券投资基金法".to_string()],
            origin: vec!["基金管理人应当勤勉尽责。".to_string()],
            schema_fields: vec![],
            group_count: vec![],
            group_count_or: false,
            check_chapter: None,
            mode: TemplateMode::Normal { templates },
        }
    }

    fn sub_template(items: Vec<TemplateItem>) -> SubTemplate {
        SubTemplate {
            name: "法规".to_string(),
            items,
            ..SubTemplate::default()
        }
    }

    #[test]
    fn test_rule_deserializes_from_catalog_json() {
        let rule: TemplateRule = serde_json::from_str(
            r#"{
                "name": "管理人义务",
                "related_name": "总则",
                "label": "t1",
                "from": ["证券投资基金法"],
                "origin": ["基金管理人应当勤勉尽责。"],
                "mode": "normal",
                "templates": [{
                    "name": "法规",
                    "items": [
                        "基金管理人应当勤勉尽责。",
                        ["每年至少披露一次。", "每半年至少披露一次。"],
                        {
                            "conditions": [
                                {"field": "基金类型", "operation": "EQUAL", "value": "货币型"}
                            ],
                            "items": ["货币型条款。"]
                        }
                    ],
                    "required": true,
                    "chapter": {"chapters": ["总则"]}
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(rule.source, vec!["证券投资基金法".to_string()]);
        match &rule.mode {
            TemplateMode::Normal { templates } => {
                assert_eq!(templates.len(), 1);
                assert_eq!(templates[0].items.len(), 3);
                assert!(templates[0].required);
                let locator = templates[0].chapter.as_ref().unwrap();
                assert!(locator.is_continued_chapter);
                assert!(matches!(&templates[0].items[1], TemplateItem::Options(options) if options.len() == 2));
                assert!(matches!(&templates[0].items[2], TemplateItem::Choice(_)));
            }
            other => panic!("expected normal mode, got {:?}", other),
        }
    }

    #[test]
    fn test_expand_items_cartesian() {
        let manager = AnswerManager::from_values(&[]);
        let items = vec![
            TemplateItem::Text("甲".to_string()),
            TemplateItem::Options(vec!["乙".to_string(), "丙".to_string()]),
        ];
        let expanded = expand_items(&items, &manager);
        assert_eq!(
            expanded,
            vec![
                vec!["甲".to_string(), "乙".to_string()],
                vec!["甲".to_string(), "丙".to_string()],
            ]
        );
    }

    #[test]
    fn test_expand_items_single_optional_by_condition() {
        let manager = AnswerManager::from_values(&[]).with_classifications(
            [("基金类型".to_string(), vec!["货币型".to_string()])]
                .into_iter()
                .collect(),
        );
        let relation = |value: &str| TemplateRelation {
            field: "基金类型".to_string(),
            operation: crate::answers::RelationOperation::Equal,
            value: value.to_string(),
        };
        let items = vec![TemplateItem::Choice(TemplateChoice {
            conditions: vec![],
            single_optional: vec![
                TemplateChoice {
                    conditions: vec![relation("股票型")],
                    single_optional: vec![],
                    items: vec![TemplateItem::Text("股票条款".to_string())],
                },
                TemplateChoice {
                    conditions: vec![relation("货币型")],
                    single_optional: vec![],
                    items: vec![TemplateItem::Text("货币条款".to_string())],
                },
            ],
            items: vec![],
        })];
        let expanded = expand_items(&items, &manager);
        assert_eq!(expanded, vec![vec!["货币条款".to_string()]]);
    }

    #[test]
    fn test_normal_template_full_match() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let mut sub = sub_template(vec![TemplateItem::Text(
            "基金管理人应当勤勉尽责。".to_string(),
        )]);
        sub.chapter = Some(ChapterLocator {
            chapters: vec!["总则".to_string()],
            is_continued_chapter: true,
            range: None,
            miss_detail: None,
        });
        let rule = normal_rule(vec![sub]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(true));
        assert!(matches!(result.reasons[0], Reason::Match(_)));
        assert_eq!(result.suggestion, None);
        assert_eq!(result.origin_contents[0], "《证券投资基金法》");
    }

    #[test]
    fn test_normal_template_synonym_match() {
        let doc = ParsedDocument {
            elements: vec![element(0, 1, 0.0, "基金管理人应勤勉尽责。")],
            syllabuses: vec![],
        };
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1).with_options(SimilarityOptions {
            synonyms: vec![vec!["应当".to_string(), "应".to_string()]],
            ..Default::default()
        });
        let rule = normal_rule(vec![sub_template(vec![TemplateItem::Text(
            "基金管理人应当勤勉尽责。".to_string(),
        )])]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(true));
    }

    #[test]
    fn test_normal_template_conflict() {
        let doc = ParsedDocument {
            elements: vec![element(0, 1, 0.0, "投资者应当在四十八小时内撤回认购。")],
            syllabuses: vec![],
        };
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let mut sub = sub_template(vec![TemplateItem::Text(
            "投资者应当在二十四小时内撤回认购。".to_string(),
        )]);
        sub.diff_text = Some("撤回时限与法规不一致".to_string());
        let rule = normal_rule(vec![sub]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(false));
        match &result.reasons[0] {
            Reason::Conflict(item) => {
                assert_eq!(item.reason_text, "撤回时限与法规不一致");
                assert!(!item.diff.is_empty());
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(result.suggestion.is_some());
    }

    #[test]
    fn test_normal_template_missing_chapter() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let mut sub = sub_template(vec![TemplateItem::Text("封闭期安排".to_string())]);
        sub.chapter = Some(ChapterLocator {
            chapters: vec!["封闭期".to_string()],
            is_continued_chapter: true,
            range: None,
            miss_detail: Some(MissDetail {
                reason_text: "缺少封闭期章节".to_string(),
                miss_content: Some("封闭期安排".to_string()),
                suggestion: None,
            }),
        });
        let rule = normal_rule(vec![sub]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(false));
        match &result.reasons[0] {
            Reason::MissContent(item) => assert_eq!(item.reason_text, "缺少封闭期章节"),
            other => panic!("expected miss content, got {:?}", other),
        }
    }

    #[test]
    fn test_ignore_condition_makes_rule_inapplicable() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]).with_classifications(
            [("基金类型".to_string(), vec!["货币型".to_string()])]
                .into_iter()
                .collect(),
        );
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let mut sub = sub_template(vec![TemplateItem::Text("股票投资限制".to_string())]);
        sub.ignore = vec![TemplateRelation {
            field: "基金类型".to_string(),
            operation: crate::answers::RelationOperation::Equal,
            value: "货币型".to_string(),
        }];
        sub.ignore_text = "货币型基金不适用股票投资限制".to_string();
        let rule = normal_rule(vec![sub]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(true));
        assert_eq!(result.is_compliance_real(), None);
    }

    #[test]
    fn test_schema_fields_all_empty_skips_comparison() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[("封闭期", "")]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let mut sub = sub_template(vec![TemplateItem::Text("封闭期安排".to_string())]);
        sub.schema_fields = vec!["封闭期".to_string()];
        let rule = normal_rule(vec![sub]);
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(false));
        assert_eq!(result.reasons.len(), 1);
        match &result.reasons[0] {
            Reason::SchemaFailed(item) => assert_eq!(item.reason_text, "要素“封闭期”为空"),
            other => panic!("expected schema failure, got {:?}", other),
        }
    }

    #[test]
    fn test_chapters_template_conflict_uses_diff_suggestion() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let rule = TemplateRule {
            name: "风险揭示一致性".to_string(),
            related_name: "风险揭示".to_string(),
            label: "t2".to_string(),
            tip: None,
            source: vec![],
            origin: vec![],
            schema_fields: vec![],
            group_count: vec![],
            group_count_or: false,
            check_chapter: None,
            mode: TemplateMode::Chapters {
                left: ChapterSide {
                    chapters: vec!["风险揭示".to_string()],
                    miss_detail: MissDetail {
                        reason_text: "缺少风险揭示章节".to_string(),
                        ..MissDetail::default()
                    },
                },
                right: ChapterSide {
                    chapters: vec!["基金份额的申购".to_string()],
                    miss_detail: MissDetail {
                        reason_text: "缺少申购章节".to_string(),
                        ..MissDetail::default()
                    },
                },
                diff_text: None,
                diff_suggestion: Some("请保持两章风险描述一致".to_string()),
                miss_detail: None,
            },
        };
        let result = matcher.check_rule(&rule);
        // the shared risk sentence matches but the chapter headings
        // differ, so the comparison degrades to a conflict
        assert_eq!(result.is_compliance, Some(false));
        match &result.reasons[0] {
            Reason::Conflict(item) => {
                assert_eq!(item.template.name, "章节");
                assert_eq!(item.template.content_title, "第二章");
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(result.suggestion.as_deref(), Some("请保持两章风险描述一致"));
    }

    #[test]
    fn test_chapters_template_missing_side() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let rule = TemplateRule {
            name: "一致性".to_string(),
            related_name: String::new(),
            label: "t3".to_string(),
            tip: None,
            source: vec![],
            origin: vec![],
            schema_fields: vec![],
            group_count: vec![],
            group_count_or: false,
            check_chapter: None,
            mode: TemplateMode::Chapters {
                left: ChapterSide {
                    chapters: vec!["不存在的章节".to_string()],
                    miss_detail: MissDetail {
                        reason_text: "缺少该章节".to_string(),
                        ..MissDetail::default()
                    },
                },
                right: ChapterSide {
                    chapters: vec!["风险揭示".to_string()],
                    ..ChapterSide::default()
                },
                diff_text: None,
                diff_suggestion: None,
                miss_detail: None,
            },
        };
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(false));
        assert_eq!(result.reasons[0].reason_text(), "缺少该章节");
    }

    #[test]
    fn test_sentence_template_counts_matches() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let rule = TemplateRule {
            name: "风险句检查".to_string(),
            related_name: "风险揭示".to_string(),
            label: "t4".to_string(),
            tip: None,
            source: vec![],
            origin: vec![],
            schema_fields: vec![],
            group_count: vec![],
            group_count_or: false,
            check_chapter: None,
            mode: TemplateMode::Sentences {
                templates: vec![SentenceTemplate {
                    name: "法规".to_string(),
                    content_title: "法规".to_string(),
                    items: vec!["本基金存在市场风险".to_string()],
                    sentence_count: 1,
                    chapter: None,
                    element_from: None,
                    diff_text: None,
                }],
            },
        };
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(true));
        assert!(matches!(result.reasons[0], Reason::Match(_)));
    }

    #[test]
    fn test_sentence_template_below_count() {
        let doc = fixture();
        let reader = DocumentReader::new(&doc);
        let manager = AnswerManager::from_values(&[]);
        let matcher = TemplateMatcher::new(&reader, &manager, 1);
        let rule = TemplateRule {
            name: "风险句检查".to_string(),
            related_name: "风险揭示".to_string(),
            label: "t5".to_string(),
            tip: None,
            source: vec![],
            origin: vec![],
            schema_fields: vec![],
            group_count: vec![],
            group_count_or: false,
            check_chapter: None,
            mode: TemplateMode::Sentences {
                templates: vec![SentenceTemplate {
                    name: "流动性风险".to_string(),
                    content_title: "法规".to_string(),
                    items: vec![
                        "本基金存在市场风险".to_string(),
                        "投资者签署合同前请仔细阅读招募说明书".to_string(),
                    ],
                    sentence_count: 2,
                    chapter: None,
                    element_from: None,
                    diff_text: None,
                }],
            },
        };
        let result = matcher.check_rule(&rule);
        assert_eq!(result.is_compliance, Some(false));
        let last = result.reasons.last().unwrap();
        assert_eq!(last.reason_text(), "仅匹配到一条流动性风险");
    }

    #[test]
    fn test_filter_same_reason_keeps_first() {
        let reasons = vec![
            Reason::MissContent(MissContentReasonItem::new("风险揭示", None)),
            Reason::MissContent(MissContentReasonItem::new("风险揭示", None)),
            Reason::MissContent(MissContentReasonItem::new("费用说明", None)),
        ];
        let filtered = filter_same_reason(reasons);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_dual_reference_forgiveness() {
        let diff = |equal: &[&str], unequal: &[&str]| -> Vec<DiffItem> {
            let mut items: Vec<DiffItem> = equal
                .iter()
                .map(|text| DiffItem {
                    html: text.to_string(),
                    kind: DiffKind::Equal,
                    left: text.to_string(),
                    right: Some(text.to_string()),
                })
                .collect();
            items.extend(unequal.iter().map(|text| DiffItem {
                html: text.to_string(),
                kind: DiffKind::Match,
                left: text.to_string(),
                right: Some(format!("{}改", text)),
            }));
            items
        };
        let mut law =
            ConflictReasonItem::new(ReasonTemplate::new("条款", shared_types::TEMPLATE_LAW), "文");
        law.diff = diff(&["甲", "乙"], &[]);
        let mut editing = ConflictReasonItem::new(
            ReasonTemplate::new("条款", shared_types::TEMPLATE_EDITING),
            "文",
        );
        editing.diff = diff(&[], &["甲"]);

        let rule = normal_rule(vec![]);
        let mut reasons = vec![Reason::Conflict(law), Reason::Conflict(editing)];
        let matched = after_match_template(&rule, &[], &mut reasons, false);
        // the second reference's mismatches are covered by the first's
        // matched segments
        assert!(matched);
    }

    #[test]
    fn test_group_count_requires_enough_matches() {
        let mut rule = normal_rule(vec![]);
        rule.group_count = vec![("法规".to_string(), 2)];
        let matched_reason = |name: &str| {
            Reason::Match(MatchReasonItem::new(ReasonTemplate::new("条款", name), "条款"))
        };

        let mut short = vec![matched_reason("法规")];
        assert!(!after_match_template(&rule, &[], &mut short, false));
        assert_eq!(short.last().unwrap().reason_text(), "缺少部分法规内容");

        let mut enough = vec![matched_reason("法规"), matched_reason("法规")];
        assert!(after_match_template(&rule, &[], &mut enough, false));
        assert_eq!(enough.len(), 2);
    }
}
