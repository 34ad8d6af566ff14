//! Suggestion rendering: turns non-compliance reasons into actionable
//! revision advice, anchored to the chapter the offending text lives in.

use lazy_static::lazy_static;
use regex::Regex;
use shared_types::{
    ChapterInfo, ConflictReasonItem, DiffItem, DiffKind, ElementClass, Outlines, Paragraph, Reason,
    TEMPLATE_EDITING, TEMPLATE_LAW,
};

use crate::answers::AnswerManager;
use crate::reader::DocumentReader;
use crate::text::append_suggestion;

lazy_static! {
    /// `[field][anchor]` placeholder in configured suggestion texts.
    static ref P_SUGGESTION: Regex =
        Regex::new(r"\[(?P<schema_name>[^\[\]]+)\]\[(?P<anchor>[^\[\]]+)\]").unwrap();
    /// Leading list numbering of a paragraph line.
    static ref P_LINE_NUMBER: Regex = Regex::new(
        r"(?P<number>^\s*[(（【]?\s*([➢0-9一二三四五六七八九十]+|[a-zA-Z]{1,2})\s*[)）】,.，、\s]+\s*|^[➢]+)"
    )
    .unwrap();
    /// Table-of-contents chapter title, with or without inner spacing.
    pub(crate) static ref P_CATALOG_TITLE: Regex = Regex::new(r"^目\s*录$").unwrap();
}

fn rule_name_or_contract(rule_name: &str) -> &str {
    if rule_name.is_empty() {
        "合同"
    } else {
        rule_name
    }
}

/// Ancestor chapters of the first located element under the given
/// evidence boxes, outermost first.
pub fn get_chapter_info_by_outline(reader: &DocumentReader, outlines: &Outlines) -> Vec<ChapterInfo> {
    let mut elements = Vec::new();
    for (page, boxes) in outlines {
        if let Some(outline) = boxes.first() {
            elements.extend(reader.find_elements_by_outline(*page, outline));
        }
    }
    elements.sort_by_key(|element| element.index);
    for element in elements {
        let chain = reader.find_syllabuses_by_index(element.index);
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
    Vec::new()
}

/// Human-readable chapter location: outermost and innermost titles joined
/// with a trailing separator, a leading table-of-contents node dropped.
pub fn get_chapter_title_text(chapters: &[ChapterInfo]) -> String {
    let mut chapters = chapters;
    if let Some(first) = chapters.first() {
        if P_CATALOG_TITLE.is_match(first.title.trim()) {
            if chapters.len() == 1 {
                return String::new();
            }
            chapters = &chapters[1..];
        }
    }
    let Some(last) = chapters.last() else {
        return String::new();
    };

    let mut titles = vec![last.title.as_str()];
    if chapters.len() >= 2 && chapters[0].title != last.title {
        titles = vec![chapters[0].title.as_str(), last.title.as_str()];
    }

    let title = titles.join("，");
    if title.is_empty() {
        title
    } else {
        format!("{}，", title)
    }
}

/// Revision advice for one located clause.
pub fn render_suggestion(title: &str, rule_name: &str, content: &str, suggestion: &str) -> String {
    if title.contains(rule_name) {
        format!("合同，{}，请将“{}”修改为“{}”", title, content, suggestion)
    } else {
        format!("合同，{}{}，请将“{}”修改为“{}”", title, rule_name, content, suggestion)
    }
}

/// Carry the document line numbering over to the replacement text so the
/// advice reads in the document's own numbering scheme.
pub fn combine_line_no(content: &str, template: &str) -> String {
    if !content.contains('\n') {
        if let Some(caps) = P_LINE_NUMBER.captures(content) {
            let stripped = P_LINE_NUMBER.replace(template, "");
            return format!("{}{}", &caps["number"], stripped);
        }
    }
    template.to_string()
}

fn generate_suggestion(
    diff: &DiffItem,
    suggestion: Option<String>,
    title: &str,
    rule_name: &str,
) -> Option<String> {
    match diff.kind {
        DiffKind::Del => append_suggestion(
            suggestion,
            Some(&format!("请在{}中补充“{}”", rule_name, diff.left)),
            "\n\n",
        ),
        DiffKind::Match => {
            let right = diff.right.as_deref().unwrap_or_default();
            append_suggestion(
                suggestion,
                Some(&render_suggestion(
                    title,
                    rule_name,
                    right,
                    &combine_line_no(right, &diff.left),
                )),
                "\n\n",
            )
        }
        DiffKind::Equal | DiffKind::Add => suggestion,
    }
}

fn render_conflict_suggestion(
    item: &ConflictReasonItem,
    reader: &DocumentReader,
    rule_name: &str,
) -> Option<String> {
    let chapters = get_chapter_info_by_outline(reader, &item.outlines);
    if chapters.is_empty() {
        if !item.content.contains('\n') {
            return Some(format!(
                "请在{}中补充“{}”",
                rule_name_or_contract(rule_name),
                item.template.content
            ));
        }
        let mut suggestion = None;
        for line in item.template.content.split('\n') {
            suggestion = append_suggestion(
                suggestion,
                Some(&format!("请在{}中补充“{}”", rule_name, line)),
                "\n\n",
            );
        }
        return suggestion;
    }

    let title = get_chapter_title_text(&chapters);
    if !item.content.contains('\n') {
        let replacement = combine_line_no(&item.content, &item.template.content);
        return Some(render_suggestion(&title, rule_name, &item.content, &replacement));
    }

    // Fold the diff so that runs around additions collapse into one
    // replacement advice: an equal segment absorbed by a following add
    // becomes a match with its own text as the replacement base.
    let mut suggestion: Option<String> = None;
    let mut prev: Option<DiffItem> = None;
    for diff in &item.diff {
        let Some(mut folded) = prev.take() else {
            prev = Some(diff.clone());
            continue;
        };
        if folded.kind != DiffKind::Add && diff.kind != DiffKind::Add {
            suggestion = generate_suggestion(&folded, suggestion, &title, rule_name);
            prev = Some(diff.clone());
            continue;
        }
        if folded.kind == DiffKind::Equal && folded.right.is_none() {
            folded.right = Some(folded.left.clone());
        }
        folded.kind = if folded.kind == DiffKind::Equal {
            DiffKind::Match
        } else {
            diff.kind
        };
        folded.left =
            append_suggestion(Some(folded.left), Some(&diff.left), "\n").unwrap_or_default();
        folded.right = append_suggestion(folded.right, diff.right.as_deref(), "\n");
        prev = Some(folded);
    }
    if let Some(folded) = prev {
        suggestion = generate_suggestion(&folded, suggestion, &title, rule_name);
    }
    suggestion
}

/// Suggestion of a single reason, None when the reason kind carries no
/// advice.
pub fn render_reason_suggestion(
    reason: &Reason,
    reader: &DocumentReader,
    rule_name: &str,
) -> Option<String> {
    match reason {
        Reason::NoMatch(item) => {
            if !item.suggestion.is_empty() {
                return Some(item.suggestion.clone());
            }
            Some(format!(
                "请在{}中补充“{}”",
                rule_name_or_contract(rule_name),
                item.template.content
            ))
        }
        Reason::Conflict(item) => render_conflict_suggestion(item, reader, rule_name),
        Reason::MissContent(item) => {
            if !item.suggestion.is_empty() {
                return Some(item.suggestion.clone());
            }
            let mut suggestion = None;
            for line in item.miss_content.split('\n') {
                suggestion = append_suggestion(
                    suggestion,
                    Some(&format!("请在{}中补充{}", rule_name, line)),
                    "\n\n",
                );
            }
            suggestion
        }
        Reason::SchemaFailed(item) => Some(item.suggestion.clone()),
        Reason::FieldNoMatch(item) => Some(format!("请修改 {}。", item.content)),
        Reason::Match(_)
        | Reason::IgnoreCondition(_)
        | Reason::MatchFailed(_)
        | Reason::CustomRuleNoMatch(_) => None,
    }
}

fn push_suggestion(
    suggestions: &mut Vec<String>,
    reason: &Reason,
    reader: &DocumentReader,
    rule_name: &str,
) {
    if let Some(suggestion) = render_reason_suggestion(reason, reader, rule_name) {
        if !suggestion.is_empty() && !suggestions.contains(&suggestion) {
            suggestions.push(suggestion);
        }
    }
}

/// Combined advice of a rule result. Field-failure advice is always kept;
/// when every failure is a mismatch against a reference text, the
/// model-contract wording wins over the statute wording; otherwise only
/// the last failure speaks.
pub fn render_suggestion_by_reasons(
    reader: &DocumentReader,
    rule_name: &str,
    reasons: &[Reason],
) -> String {
    let mut suggestions: Vec<String> = Vec::new();
    let unmatched: Vec<&Reason> = reasons.iter().filter(|reason| !reason.matched()).collect();
    if !unmatched.is_empty() {
        for reason in &unmatched {
            if matches!(reason, Reason::SchemaFailed(_)) {
                push_suggestion(&mut suggestions, reason, reader, rule_name);
            }
        }

        let mismatches: Vec<&Reason> = unmatched
            .iter()
            .copied()
            .filter(|reason| matches!(reason, Reason::NoMatch(_) | Reason::Conflict(_)))
            .collect();
        if !mismatches.is_empty() && mismatches.len() == unmatched.len() {
            let by_template = |name: &str| -> Vec<&Reason> {
                unmatched
                    .iter()
                    .copied()
                    .filter(|reason| {
                        reason
                            .template()
                            .map(|template| template.name == name)
                            .unwrap_or(false)
                    })
                    .collect()
            };
            let editing = by_template(TEMPLATE_EDITING);
            let law = by_template(TEMPLATE_LAW);
            if !editing.is_empty() {
                for reason in editing {
                    push_suggestion(&mut suggestions, reason, reader, rule_name);
                }
            } else if !law.is_empty() {
                for reason in law {
                    push_suggestion(&mut suggestions, reason, reader, rule_name);
                }
            } else {
                push_suggestion(&mut suggestions, mismatches[0], reader, rule_name);
            }
        } else if let Some(last) = unmatched.last() {
            push_suggestion(&mut suggestions, last, reader, rule_name);
        }
    }
    suggestions.join("\n")
}

/// Interpolate `[field][anchor]` placeholders from the extracted answers.
/// A referenced field without an answer aborts the whole text.
pub fn format_suggestion(
    content: &str,
    manager: &AnswerManager,
    reader: &DocumentReader,
) -> Option<String> {
    let mut out = String::new();
    let mut cursor = 0;
    for caps in P_SUGGESTION.captures_iter(content) {
        let Some(whole) = caps.get(0) else { continue };
        let schema_name = &caps["schema_name"];
        if !manager.is_schema_field(schema_name) {
            continue;
        }
        let Some(value) = manager.value(schema_name) else {
            return None;
        };
        let replacement = match &caps["anchor"] {
            "position" => manager
                .chapter_title(schema_name, reader)
                .unwrap_or_default()
                .trim_end_matches('，')
                .to_string(),
            "paragraph" => value.to_string(),
            _ => continue,
        };
        out.push_str(&content[cursor..whole.start()]);
        out.push_str(&replacement);
        cursor = whole.end();
    }
    out.push_str(&content[cursor..]);
    Some(out)
}

/// Per-page evidence boxes of a paragraph set, collapsed to one bounding
/// box per page.
pub fn get_outlines(paragraphs: &[Paragraph]) -> Outlines {
    let mut merged = Outlines::new();
    for paragraph in paragraphs {
        if paragraph.outlines.is_empty() {
            if let Some(outline) = paragraph.outline {
                merged.entry(paragraph.page).or_default().push(outline);
            }
        } else {
            for (page, boxes) in &paragraph.outlines {
                merged.entry(*page).or_default().extend(boxes.iter().copied());
            }
        }
    }
    for boxes in merged.values_mut() {
        if boxes.len() > 1 {
            let combined = [
                boxes.iter().map(|b| b[0]).fold(f64::INFINITY, f64::min),
                boxes.iter().map(|b| b[1]).fold(f64::INFINITY, f64::min),
                boxes.iter().map(|b| b[2]).fold(f64::NEG_INFINITY, f64::max),
                boxes.iter().map(|b| b[3]).fold(f64::NEG_INFINITY, f64::max),
            ];
            *boxes = vec![combined];
        }
    }
    merged
}

pub fn split_suggestion(suggestion: &str, separator: &str) -> Vec<String> {
    suggestion
        .split(separator)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// XPath of the document content under the evidence boxes, table hits
/// resolved down to the individual cells.
pub fn get_xpath_by_outlines(reader: &DocumentReader, outlines: &Outlines) -> String {
    let mut parts = Vec::new();
    for (page, boxes) in outlines {
        if let Some(outline) = boxes.first() {
            parts.push(get_xpath_by_outline(reader, *page, outline));
        }
    }
    parts.join(",")
}

pub fn get_xpath_by_outline(reader: &DocumentReader, page: u32, outline: &shared_types::Outline) -> String {
    let elements = reader.find_elements_by_outline(page, outline);
    let Some(first) = elements.first() else {
        return String::new();
    };
    if first.class == ElementClass::Table {
        let cells = reader.find_cell_xpaths(first, page, outline);
        if !cells.is_empty() {
            return cells.join(",");
        }
    }
    elements
        .iter()
        .filter_map(|element| element.docx_meta.as_ref().and_then(|meta| meta.xpath.clone()))
        .collect::<Vec<_>>()
        .join(",")
}
