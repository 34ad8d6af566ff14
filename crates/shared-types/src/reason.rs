use serde::{Deserialize, Serialize};

use crate::document::Outlines;

/// Reference-template display names carried on reasons. Suggestion
/// selection prefers model-contract (范文) wording over statute (法规)
/// wording.
pub const TEMPLATE_EDITING: &str = "范文";
pub const TEMPLATE_LAW: &str = "法规";
pub const TEMPLATE_DEFAULT: &str = "模板";

/// The reference text a reason was produced against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasonTemplate {
    pub content: String,
    #[serde(default)]
    pub content_title: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub outlines: Option<Outlines>,
}

impl ReasonTemplate {
    pub fn new(content: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Display name used in reason texts.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "范文与法规"
        } else {
            &self.name
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    Equal,
    Add,
    Del,
    Match,
}

/// One machine-readable diff segment on a template-bearing reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    pub html: String,
    #[serde(rename = "type")]
    pub kind: DiffKind,
    pub left: String,
    pub right: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReasonItem {
    pub template: ReasonTemplate,
    pub content: String,
    pub page: Option<u32>,
    pub outlines: Outlines,
    pub diff: Vec<DiffItem>,
    pub content_title: String,
    #[serde(default)]
    pub xpath: Option<String>,
    pub matched: bool,
    pub reason_text: String,
}

impl MatchReasonItem {
    pub fn new(template: ReasonTemplate, content: impl Into<String>) -> Self {
        let reason_text = format!("匹配到{}的内容", template.display_name());
        Self {
            template,
            content: content.into(),
            page: None,
            outlines: Outlines::new(),
            diff: vec![],
            content_title: String::new(),
            xpath: None,
            matched: true,
            reason_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReasonItem {
    pub template: ReasonTemplate,
    pub content: String,
    pub page: Option<u32>,
    pub outlines: Outlines,
    pub diff: Vec<DiffItem>,
    pub content_title: String,
    #[serde(default)]
    pub xpath: Option<String>,
    pub matched: bool,
    pub reason_text: String,
}

impl ConflictReasonItem {
    pub fn new(template: ReasonTemplate, content: impl Into<String>) -> Self {
        let reason_text = format!("与{}不一致", template.display_name());
        Self {
            template,
            content: content.into(),
            page: None,
            outlines: Outlines::new(),
            diff: vec![],
            content_title: String::new(),
            xpath: None,
            matched: false,
            reason_text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoMatchReasonItem {
    pub template: ReasonTemplate,
    pub matched: bool,
    pub reason_text: String,
    #[serde(default)]
    pub suggestion: String,
}

impl NoMatchReasonItem {
    pub fn new(template: ReasonTemplate) -> Self {
        let reason_text = format!("未找到与{}匹配的内容", template.display_name());
        Self {
            template,
            matched: false,
            reason_text,
            suggestion: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissContentReasonItem {
    pub miss_content: String,
    #[serde(default)]
    pub template: Option<ReasonTemplate>,
    pub matched: bool,
    pub reason_text: String,
    #[serde(default)]
    pub suggestion: String,
}

impl MissContentReasonItem {
    pub fn new(miss_content: impl Into<String>, template: Option<ReasonTemplate>) -> Self {
        let mut miss_content = miss_content.into();
        if miss_content.is_empty() {
            if let Some(template) = &template {
                miss_content = template.content.clone();
            }
        }
        let reason_text = format!("{} 缺失", miss_content);
        Self {
            miss_content,
            template,
            matched: false,
            reason_text,
            suggestion: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoreConditionItem {
    pub reason_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaFailedItem {
    pub reason_text: String,
    #[serde(default)]
    pub suggestion: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchFailedItem {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub outlines: Option<Outlines>,
    pub reason_text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomRuleNoMatchItem {
    pub reason_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNoMatchItem {
    #[serde(default)]
    pub template: Option<ReasonTemplate>,
    pub name: String,
    pub page: Option<u32>,
    pub outlines: Outlines,
    pub content: String,
    pub diff: Vec<DiffItem>,
    pub matched: bool,
    pub reason_text: String,
}

impl FieldNoMatchItem {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        let name = name.into();
        let content = content.into();
        let reason_text = format!("{}与{}不匹配。", content, name);
        Self {
            template: None,
            name,
            page: None,
            outlines: Outlines::new(),
            content,
            diff: vec![],
            matched: false,
            reason_text,
        }
    }
}

/// Per-check reason, discriminated on `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Reason {
    #[serde(rename = "tpl_match")]
    Match(MatchReasonItem),
    #[serde(rename = "tpl_conflict")]
    Conflict(ConflictReasonItem),
    #[serde(rename = "tpl_no_match")]
    NoMatch(NoMatchReasonItem),
    #[serde(rename = "tpl_miss_content")]
    MissContent(MissContentReasonItem),
    #[serde(rename = "tpl_ignore_condition")]
    IgnoreCondition(IgnoreConditionItem),
    #[serde(rename = "schema_failed")]
    SchemaFailed(SchemaFailedItem),
    #[serde(rename = "tpl_failed")]
    MatchFailed(MatchFailedItem),
    #[serde(rename = "rule_no_match")]
    CustomRuleNoMatch(CustomRuleNoMatchItem),
    #[serde(rename = "field_no_match")]
    FieldNoMatch(FieldNoMatchItem),
}

impl Reason {
    pub fn matched(&self) -> bool {
        match self {
            Self::Match(item) => item.matched,
            Self::Conflict(item) => item.matched,
            Self::NoMatch(item) => item.matched,
            Self::MissContent(item) => item.matched,
            Self::IgnoreCondition(_) => true,
            Self::SchemaFailed(_) => false,
            Self::MatchFailed(_) => false,
            Self::CustomRuleNoMatch(_) => false,
            Self::FieldNoMatch(item) => item.matched,
        }
    }

    pub fn set_matched(&mut self, matched: bool) {
        match self {
            Self::Match(item) => item.matched = matched,
            Self::Conflict(item) => item.matched = matched,
            Self::NoMatch(item) => item.matched = matched,
            Self::MissContent(item) => item.matched = matched,
            Self::FieldNoMatch(item) => item.matched = matched,
            Self::IgnoreCondition(_) | Self::SchemaFailed(_) | Self::MatchFailed(_) | Self::CustomRuleNoMatch(_) => {}
        }
    }

    pub fn reason_text(&self) -> &str {
        match self {
            Self::Match(item) => &item.reason_text,
            Self::Conflict(item) => &item.reason_text,
            Self::NoMatch(item) => &item.reason_text,
            Self::MissContent(item) => &item.reason_text,
            Self::IgnoreCondition(item) => &item.reason_text,
            Self::SchemaFailed(item) => &item.reason_text,
            Self::MatchFailed(item) => &item.reason_text,
            Self::CustomRuleNoMatch(item) => &item.reason_text,
            Self::FieldNoMatch(item) => &item.reason_text,
        }
    }

    pub fn template(&self) -> Option<&ReasonTemplate> {
        match self {
            Self::Match(item) => Some(&item.template),
            Self::Conflict(item) => Some(&item.template),
            Self::NoMatch(item) => Some(&item.template),
            Self::MissContent(item) => item.template.as_ref(),
            Self::FieldNoMatch(item) => item.template.as_ref(),
            _ => None,
        }
    }

    /// Diff segments, for the dual-reference forgiveness check.
    pub fn diff(&self) -> Option<&[DiffItem]> {
        match self {
            Self::Match(item) => Some(&item.diff),
            Self::Conflict(item) => Some(&item.diff),
            Self::FieldNoMatch(item) => Some(&item.diff),
            _ => None,
        }
    }

    pub fn is_ignore(&self) -> bool {
        matches!(self, Self::IgnoreCondition(_))
    }

    /// Reasons collapsed by identical `reason_text` during deduplication.
    pub fn is_dedup_family(&self) -> bool {
        matches!(self, Self::IgnoreCondition(_) | Self::MissContent(_))
    }
}

/// Evidence summary of a referenced schema field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaResult {
    pub name: String,
    pub matched: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub outlines: Option<Outlines>,
    #[serde(default)]
    pub xpath: Option<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterInfo {
    pub index: usize,
    pub title: String,
}

/// One evaluated rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultItem {
    pub name: String,
    #[serde(default)]
    pub related_name: String,
    pub is_compliance: Option<bool>,
    pub reasons: Vec<Reason>,
    #[serde(default)]
    pub suggestion: Option<String>,
    pub label: String,
    #[serde(default)]
    pub schema_id: Option<i64>,
    pub fid: i64,
    #[serde(default)]
    pub origin_contents: Vec<String>,
    #[serde(default)]
    pub schema_results: Vec<SchemaResult>,
    #[serde(default)]
    pub tip: Option<String>,
    #[serde(default)]
    pub rule_type: Option<String>,
}

impl ResultItem {
    /// Tri-state compliance: None when every reason says the rule was
    /// inapplicable.
    pub fn is_compliance_real(&self) -> Option<bool> {
        if !self.reasons.is_empty() && self.reasons.iter().all(Reason::is_ignore) {
            return None;
        }
        self.is_compliance
    }

    pub fn schema_fields(&self) -> Vec<&str> {
        self.schema_results
            .iter()
            .filter(|item| !item.name.is_empty())
            .map(|item| item.name.as_str())
            .collect()
    }
}

/// The output of one document check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditReport {
    pub fid: i64,
    pub results: Vec<ResultItem>,
    pub checked_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result_with(reasons: Vec<Reason>, is_compliance: Option<bool>) -> ResultItem {
        ResultItem {
            name: "测试".into(),
            related_name: "测试".into(),
            is_compliance,
            reasons,
            suggestion: None,
            label: "t1".into(),
            schema_id: None,
            fid: 1,
            origin_contents: vec![],
            schema_results: vec![],
            tip: None,
            rule_type: None,
        }
    }

    #[test]
    fn test_compliance_none_when_only_ignore_reasons() {
        let result = result_with(
            vec![Reason::IgnoreCondition(IgnoreConditionItem {
                reason_text: "不适用".into(),
            })],
            Some(true),
        );
        assert_eq!(result.is_compliance_real(), None);
    }

    #[test]
    fn test_compliance_kept_with_mixed_reasons() {
        let result = result_with(
            vec![
                Reason::IgnoreCondition(IgnoreConditionItem::default()),
                Reason::Match(MatchReasonItem::new(
                    ReasonTemplate::new("内容", TEMPLATE_LAW),
                    "内容",
                )),
            ],
            Some(true),
        );
        assert_eq!(result.is_compliance_real(), Some(true));
    }

    #[test]
    fn test_default_reason_texts() {
        let no_match = NoMatchReasonItem::new(ReasonTemplate::new("条款", ""));
        assert_eq!(no_match.reason_text, "未找到与范文与法规匹配的内容");

        let conflict = ConflictReasonItem::new(ReasonTemplate::new("条款", TEMPLATE_LAW), "内容");
        assert_eq!(conflict.reason_text, "与法规不一致");

        let miss = MissContentReasonItem::new("", Some(ReasonTemplate::new("风险揭示", TEMPLATE_EDITING)));
        assert_eq!(miss.miss_content, "风险揭示");
        assert_eq!(miss.reason_text, "风险揭示 缺失");
    }

    #[test]
    fn test_reason_serializes_with_type_tag() {
        let reason = Reason::SchemaFailed(SchemaFailedItem {
            reason_text: "要素“公司名称”为空".into(),
            suggestion: "请补充“公司名称”".into(),
        });
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["type"], "schema_failed");
    }
}
