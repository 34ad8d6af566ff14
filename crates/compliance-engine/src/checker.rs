//! Check orchestration: runs configured template rules and custom
//! authored rules against one document and assembles the report.

use std::collections::BTreeMap;

use shared_types::{
    AuditReport, AuditRule, CustomRuleNoMatchItem, FieldNoMatchItem, IgnoreConditionItem,
    MatchFailedItem, Reason, ResultItem, SchemaFailedItem,
};
use tracing::debug;

use crate::answers::AnswerManager;
use crate::reader::DocumentReader;
use crate::rules::{rule_content, rule_schema_fields, validate_rule};
use crate::similarity::SimilarityOptions;
use crate::suggest::{format_suggestion, render_reason_suggestion};
use crate::text::{append_suggestion, clean, is_empty};
use crate::template::{TemplateMatcher, TemplateRule};

pub struct Checker<'a> {
    reader: &'a DocumentReader<'a>,
    manager: &'a AnswerManager,
    fid: i64,
    schema_id: Option<i64>,
    options: SimilarityOptions,
    reference_info: BTreeMap<String, String>,
}

impl<'a> Checker<'a> {
    pub fn new(reader: &'a DocumentReader<'a>, manager: &'a AnswerManager, fid: i64) -> Self {
        Self {
            reader,
            manager,
            fid,
            schema_id: None,
            options: SimilarityOptions::default(),
            reference_info: BTreeMap::new(),
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

    /// Registered fund or company information, keyed by schema field.
    /// Field answers are checked for consistency against it.
    pub fn with_reference_info(mut self, reference_info: BTreeMap<String, String>) -> Self {
        self.reference_info = reference_info;
        self
    }

    pub fn check_template_rule(&self, rule: &TemplateRule) -> ResultItem {
        debug!(rule = %rule.name, "checking template rule");
        TemplateMatcher::new(self.reader, self.manager, self.fid)
            .with_schema_id(self.schema_id)
            .with_options(self.options.clone())
            .check_rule(rule)
    }

    /// Consistency of answered fields against the registered fund or
    /// company information. Fields without a registered entry are skipped.
    fn check_reference_info(&self, fields: &[String]) -> Vec<Reason> {
        let mut reasons = Vec::new();
        for field in fields {
            let Some(reference) = self.reference_info.get(field) else {
                continue;
            };
            if is_empty(self.manager.value(field)) {
                reasons.push(Reason::SchemaFailed(SchemaFailedItem {
                    reason_text: format!("要素“{}”为空", field),
                    suggestion: format!("请补充“{}”", field),
                }));
                continue;
            }
            let text = self.manager.text(field).unwrap_or_default();
            if !clean(text).contains(&clean(reference)) {
                reasons.push(Reason::FieldNoMatch(FieldNoMatchItem::new(
                    field.as_str(),
                    text,
                )));
            }
        }
        reasons
    }

    /// Evaluate one authored rule. Rules authored against several schema
    /// fields are not auditable and report a neutral verdict.
    pub fn check_custom_rule(&self, rule: &AuditRule) -> ResultItem {
        debug!(rule = rule.id, "checking custom rule");
        let fields = if rule.schema_fields.is_empty() {
            rule_schema_fields(&rule.detail)
        } else {
            rule.schema_fields.clone()
        };
        let schema_results = self.manager.build_schema_results(&fields, self.reader);

        let (is_compliance, reasons, suggestion) = if rule.schema_fields.len() > 1 {
            (
                None,
                vec![Reason::IgnoreCondition(IgnoreConditionItem {
                    reason_text: "规则建立不合理".to_string(),
                })],
                None,
            )
        } else {
            match validate_rule(&rule.detail, self.manager) {
                Err(err) => (
                    None,
                    vec![Reason::MatchFailed(MatchFailedItem {
                        page: None,
                        outlines: None,
                        reason_text: err.to_string(),
                    })],
                    None,
                ),
                Ok(outcome) => {
                    let mut reasons = self.check_reference_info(&fields);
                    let field_failed = !reasons.is_empty();
                    if outcome.result != Some(true) {
                        if let Some(reason) = &outcome.reason {
                            reasons.push(Reason::CustomRuleNoMatch(CustomRuleNoMatchItem {
                                reason_text: reason.clone(),
                            }));
                        }
                    }
                    let mut suggestion = if outcome.result == Some(true) {
                        None
                    } else {
                        outcome.message.as_deref().and_then(|message| {
                            format_suggestion(message, self.manager, self.reader)
                        })
                    };
                    for reason in &reasons {
                        if matches!(reason, Reason::SchemaFailed(_) | Reason::FieldNoMatch(_)) {
                            suggestion = append_suggestion(
                                suggestion,
                                render_reason_suggestion(reason, self.reader, "").as_deref(),
                                "\n",
                            );
                        }
                    }
                    let is_compliance = if field_failed {
                        Some(false)
                    } else {
                        outcome.result
                    };
                    (is_compliance, reasons, suggestion)
                }
            }
        };

        ResultItem {
            name: rule.name.clone().unwrap_or_default(),
            related_name: String::new(),
            is_compliance,
            reasons,
            suggestion,
            label: rule.label(),
            schema_id: self.schema_id,
            fid: self.fid,
            origin_contents: vec![rule_content(&rule.detail)],
            schema_results,
            tip: None,
            rule_type: Some("custom".to_string()),
        }
    }

    /// Run the full check and assemble the report.
    pub fn run(&self, template_rules: &[TemplateRule], custom_rules: &[AuditRule]) -> AuditReport {
        let mut results: Vec<ResultItem> = template_rules
            .iter()
            .map(|rule| self.check_template_rule(rule))
            .collect();
        results.extend(custom_rules.iter().map(|rule| self.check_custom_rule(rule)));
        AuditReport {
            fid: self.fid,
            results,
            checked_at: chrono::Utc::now().timestamp() as u64,
        }
    }
}
