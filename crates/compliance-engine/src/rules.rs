//! The four authored rule kinds: empty, regex, expression and
//! conditional. Every kind validates against the answer mapping and
//! yields a tri-state result with failure message and reason.

use regex::Regex;
use shared_types::{ConditionSpec, ExprItem, FieldRef, RuleDetail, OP_NULL};
use thiserror::Error;

use crate::answers::AnswerManager;
use crate::expr::{ExprCalculator, ExprError};
use crate::text::{clean, is_empty};

/// Fields that may legitimately be filled in as "无" instead of a value.
const FILL_NONE_FIELDS: &[&str] = &["封闭期"];

#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error("规则正则无效: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Outcome of one rule validation. `result` is None when a conditional
/// rule matched no condition.
#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    pub result: Option<bool>,
    pub message: Option<String>,
    pub reason: Option<String>,
}

impl RuleOutcome {
    fn passed() -> Self {
        Self {
            result: Some(true),
            message: None,
            reason: None,
        }
    }

    fn failed(message: Option<String>, reason: Option<String>) -> Self {
        Self {
            result: Some(false),
            message,
            reason,
        }
    }
}

/// "请补充X" style suggestion for empty fields, with the "或填写为“无”"
/// variant for fields that accept an explicit none.
pub fn get_suggestion_by_fields(fields: &[&str]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut normal: Vec<&str> = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    for field in fields {
        if seen.contains(field) {
            continue;
        }
        seen.push(field);
        if FILL_NONE_FIELDS.contains(field) {
            parts.push(format!("请补充{}，或填写为“无”", field));
        } else {
            normal.push(field);
        }
    }
    if !normal.is_empty() {
        parts.push(format!("请补充{}", normal.join("、")));
    }
    parts.join("；")
}

fn named_fields(expr: &[ExprItem]) -> Vec<&str> {
    expr.iter().filter_map(ExprItem::field_name).collect()
}

/// Aggregated "X、Y为空" reason for referenced fields without a value.
fn expr_empty_message(
    expr: &[ExprItem],
    answers: &AnswerManager,
) -> (Option<String>, Option<String>) {
    let empty_fields: Vec<&str> = named_fields(expr)
        .into_iter()
        .filter(|name| is_empty(answers.value(name)))
        .collect();
    if empty_fields.is_empty() {
        return (None, None);
    }
    let mut unique: Vec<&str> = Vec::new();
    for field in &empty_fields {
        if !unique.contains(field) {
            unique.push(field);
        }
    }
    (
        Some(format!("{}为空", unique.join("、"))),
        Some(get_suggestion_by_fields(&empty_fields)),
    )
}

/// Substitute each field reference with its cleaned answer value.
fn substitute(expr: &[ExprItem], answers: &AnswerManager) -> Vec<ExprItem> {
    expr.iter()
        .map(|item| match item {
            ExprItem::Value {
                name: Some(name),
                value: _,
            } => ExprItem::Value {
                name: Some(name.clone()),
                value: answers.value(name).map(clean),
            },
            other => other.clone(),
        })
        .collect()
}

fn has_null_op(expr: &[ExprItem]) -> bool {
    expr.iter().any(|item| match item {
        ExprItem::Op(op) => op == OP_NULL,
        ExprItem::Value { value, .. } => value.as_deref() == Some(OP_NULL),
    })
}

fn validate_empty(
    field: &FieldRef,
    message: Option<&str>,
    reason: Option<&str>,
    answers: &AnswerManager,
) -> RuleOutcome {
    if !is_empty(answers.value(&field.name)) {
        return RuleOutcome::passed();
    }
    RuleOutcome::failed(
        Some(
            message
                .map(str::to_string)
                .unwrap_or_else(|| get_suggestion_by_fields(&[&field.name])),
        ),
        Some(
            reason
                .map(str::to_string)
                .unwrap_or_else(|| format!("{} 不能为空", field.name)),
        ),
    )
}

fn validate_regex(
    pattern: &str,
    field: &FieldRef,
    message: Option<&str>,
    reason: Option<&str>,
    answers: &AnswerManager,
) -> Result<RuleOutcome, RuleError> {
    let Some(value) = answers.value(&field.name).filter(|value| !value.is_empty()) else {
        return Ok(RuleOutcome::failed(
            Some(get_suggestion_by_fields(&[&field.name])),
            Some(format!("{}为空", field.name)),
        ));
    };
    let regex = Regex::new(pattern)?;
    if regex.is_match(&clean(value)) {
        return Ok(RuleOutcome::passed());
    }
    Ok(RuleOutcome::failed(
        Some(
            message
                .map(str::to_string)
                .unwrap_or_else(|| format!("不满足规则:{}", pattern)),
        ),
        Some(
            reason
                .map(str::to_string)
                .unwrap_or_else(|| format!("不满足规则:{}", pattern)),
        ),
    ))
}

fn validate_expr(
    expr: &[ExprItem],
    unique: bool,
    message: Option<&str>,
    reason: Option<&str>,
    answers: &AnswerManager,
) -> Result<RuleOutcome, RuleError> {
    // emptiness is meaningful when the expression tests NULL itself
    if !has_null_op(expr) {
        let (empty_reason, empty_message) = expr_empty_message(expr, answers);
        if empty_reason.is_some() {
            return Ok(RuleOutcome::failed(empty_message, empty_reason));
        }
    }

    let substituted = substitute(expr, answers);
    let result = ExprCalculator::new(&substituted)
        .with_unique(unique)
        .run()?;
    if result.value.truthy() {
        return Ok(RuleOutcome::passed());
    }
    let (rendered_message, rendered_reason) = ExprCalculator::render_message_by_result(&result, None);
    Ok(RuleOutcome::failed(
        message.map(str::to_string).or(rendered_message),
        reason.map(str::to_string).or(rendered_reason),
    ))
}

fn validate_condition(
    conditions: &[ConditionSpec],
    answers: &AnswerManager,
) -> Result<RuleOutcome, RuleError> {
    for condition in conditions {
        let expr_if = substitute(&condition.expr_if.expr, answers);
        let if_result = ExprCalculator::new(&expr_if)
            .with_unique(condition.expr_if.unique)
            .run()?;
        if !if_result.value.truthy() {
            continue;
        }

        // emptiness is meaningful when the branch tests NULL itself
        if !has_null_op(&condition.expr_then.expr) {
            let (empty_reason, empty_message) =
                expr_empty_message(&condition.expr_then.expr, answers);
            if empty_reason.is_some() {
                return Ok(RuleOutcome {
                    result: None,
                    message: empty_message,
                    reason: empty_reason,
                });
            }
        }

        let expr_then = substitute(&condition.expr_then.expr, answers);
        let then_result = ExprCalculator::new(&expr_then)
            .with_unique(condition.expr_then.unique)
            .run()?;
        if then_result.value.truthy() {
            return Ok(RuleOutcome::passed());
        }

        let if_text = ExprCalculator::new(&expr_if).expr_text();
        let (rendered_message, rendered_reason) =
            ExprCalculator::render_message_by_result(&then_result, Some(&if_text));
        return Ok(RuleOutcome::failed(
            condition.message.clone().or(rendered_message),
            condition.reason.clone().or(rendered_reason),
        ));
    }
    Ok(RuleOutcome {
        result: None,
        message: None,
        reason: Some("不符合任一条件".to_string()),
    })
}

/// Run one rule against the answer mapping.
pub fn validate_rule(detail: &RuleDetail, answers: &AnswerManager) -> Result<RuleOutcome, RuleError> {
    match detail {
        RuleDetail::Empty {
            field,
            message,
            reason,
        } => Ok(validate_empty(
            field,
            message.as_deref(),
            reason.as_deref(),
            answers,
        )),
        RuleDetail::Regex {
            regex,
            field,
            message,
            reason,
        } => validate_regex(
            regex,
            field,
            message.as_deref(),
            reason.as_deref(),
            answers,
        ),
        RuleDetail::Expr {
            expr,
            unique,
            message,
            reason,
        } => validate_expr(expr, *unique, message.as_deref(), reason.as_deref(), answers),
        RuleDetail::Condition { conditions } => validate_condition(conditions, answers),
    }
}

/// Structural check used when a rule is authored.
pub fn is_valid(detail: &RuleDetail) -> bool {
    match detail {
        RuleDetail::Empty { field, .. } => !field.name.is_empty(),
        RuleDetail::Regex { regex, .. } => Regex::new(regex).is_ok(),
        RuleDetail::Expr { expr, .. } => ExprCalculator::new(expr).validate().is_ok(),
        RuleDetail::Condition { conditions } => {
            !conditions.is_empty()
                && conditions.iter().all(|condition| {
                    ExprCalculator::new(&condition.expr_if.expr).validate().is_ok()
                        && ExprCalculator::new(&condition.expr_then.expr).validate().is_ok()
                })
        }
    }
}

/// Human-readable description of what a rule checks.
pub fn rule_content(detail: &RuleDetail) -> String {
    match detail {
        RuleDetail::Empty { field, .. } => format!("{} 是否为空", field.name),
        RuleDetail::Regex { regex, .. } => regex.clone(),
        RuleDetail::Expr { expr, .. } => ExprCalculator::new(expr).expr_text(),
        RuleDetail::Condition { conditions } => conditions
            .iter()
            .enumerate()
            .map(|(index, condition)| {
                format!(
                    "条件{}: {}, 则 {}",
                    index + 1,
                    ExprCalculator::new(&condition.expr_if.expr).expr_text(),
                    ExprCalculator::new(&condition.expr_then.expr).expr_text()
                )
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// The schema fields a rule reads, deduplicated in authoring order.
pub fn rule_schema_fields(detail: &RuleDetail) -> Vec<String> {
    let names: Vec<&str> = match detail {
        RuleDetail::Empty { field, .. } | RuleDetail::Regex { field, .. } => {
            if field.name.is_empty() {
                Vec::new()
            } else {
                vec![field.name.as_str()]
            }
        }
        RuleDetail::Expr { expr, .. } => named_fields(expr),
        RuleDetail::Condition { conditions } => conditions
            .iter()
            .flat_map(|condition| {
                named_fields(&condition.expr_if.expr)
                    .into_iter()
                    .chain(named_fields(&condition.expr_then.expr))
            })
            .collect(),
    };
    let mut unique: Vec<String> = Vec::new();
    for name in names {
        if !unique.iter().any(|existing| existing == name) {
            unique.push(name.to_string());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shared_types::ExprSpec;

    fn answers(pairs: &[(&str, &str)]) -> AnswerManager {
        AnswerManager::from_values(pairs)
    }

    #[test]
    fn test_empty_rule_defaults() {
        let detail = RuleDetail::Empty {
            field: FieldRef::named("公司名称"),
            message: None,
            reason: None,
        };
        let outcome = validate_rule(&detail, &answers(&[("公司名称", "")])).unwrap();
        assert_eq!(outcome.result, Some(false));
        assert_eq!(outcome.reason.as_deref(), Some("公司名称 不能为空"));
        assert_eq!(outcome.message.as_deref(), Some("请补充公司名称"));

        let outcome = validate_rule(&detail, &answers(&[("公司名称", "平安")])).unwrap();
        assert_eq!(outcome.result, Some(true));
        assert_eq!(outcome.reason, None);
    }

    #[test]
    fn test_regex_rule() {
        let detail = RuleDetail::Regex {
            regex: "有限公司$".to_string(),
            field: FieldRef::named("公司名称"),
            message: None,
            reason: None,
        };
        let outcome = validate_rule(&detail, &answers(&[("公司名称", "平安集团")])).unwrap();
        assert_eq!(outcome.result, Some(false));
        assert_eq!(outcome.reason.as_deref(), Some("不满足规则:有限公司$"));

        let outcome =
            validate_rule(&detail, &answers(&[("公司名称", "平安有限公司")])).unwrap();
        assert_eq!(outcome.result, Some(true));

        let outcome = validate_rule(&detail, &answers(&[("公司名称", "")])).unwrap();
        assert_eq!(outcome.result, Some(false));
        assert_eq!(outcome.reason.as_deref(), Some("公司名称为空"));
    }

    #[test]
    fn test_regex_rule_matches_cleaned_value() {
        let detail = RuleDetail::Regex {
            regex: r"^\d+万元$".to_string(),
            field: FieldRef::named("公司注册资本"),
            message: None,
            reason: None,
        };
        // 全角数字与空白在比对前归一化
        let outcome =
            validate_rule(&detail, &answers(&[("公司注册资本", "３０００ 万元")])).unwrap();
        assert_eq!(outcome.result, Some(true));
    }

    #[test]
    fn test_expr_rule_empty_fields_aggregated() {
        let detail = RuleDetail::Expr {
            expr: vec![
                ExprItem::field("公司注册资本"),
                ExprItem::op("≥"),
                ExprItem::field("最低出资额"),
            ],
            unique: false,
            message: None,
            reason: None,
        };
        let outcome = validate_rule(&detail, &answers(&[])).unwrap();
        assert_eq!(outcome.result, Some(false));
        assert_eq!(
            outcome.reason.as_deref(),
            Some("公司注册资本、最低出资额为空")
        );
        assert_eq!(
            outcome.message.as_deref(),
            Some("请补充公司注册资本、最低出资额")
        );
    }

    #[test]
    fn test_expr_rule_null_operand_skips_empty_precheck() {
        let detail = RuleDetail::Expr {
            expr: vec![
                ExprItem::field("封闭期"),
                ExprItem::op("="),
                ExprItem::value(OP_NULL),
            ],
            unique: false,
            message: None,
            reason: None,
        };
        let outcome = validate_rule(&detail, &answers(&[("封闭期", "")])).unwrap();
        assert_eq!(outcome.result, Some(true));
        assert_eq!(outcome.reason, None);

        let outcome = validate_rule(&detail, &answers(&[("封闭期", "3个月")])).unwrap();
        assert_eq!(outcome.result, Some(false));
    }

    #[test]
    fn test_expr_rule_with_values() {
        let detail = RuleDetail::Expr {
            expr: vec![
                ExprItem::field("公司注册资本"),
                ExprItem::op("≥"),
                ExprItem::value("1万元"),
            ],
            unique: false,
            message: None,
            reason: None,
        };
        let outcome =
            validate_rule(&detail, &answers(&[("公司注册资本", "3 万元")])).unwrap();
        assert_eq!(outcome.result, Some(true));

        let outcome =
            validate_rule(&detail, &answers(&[("公司注册资本", "3000元")])).unwrap();
        assert_eq!(outcome.result, Some(false));
        assert_eq!(outcome.reason.as_deref(), Some("公司注册资本 < 1万元"));
    }

    #[test]
    fn test_expr_rule_message_override() {
        let detail = RuleDetail::Expr {
            expr: vec![
                ExprItem::field("公司注册资本"),
                ExprItem::op("≥"),
                ExprItem::value("1万元"),
            ],
            unique: false,
            message: Some("注册资本不足".to_string()),
            reason: Some("注册资本低于限额".to_string()),
        };
        let outcome =
            validate_rule(&detail, &answers(&[("公司注册资本", "3000元")])).unwrap();
        assert_eq!(outcome.message.as_deref(), Some("注册资本不足"));
        assert_eq!(outcome.reason.as_deref(), Some("注册资本低于限额"));
    }

    #[test]
    fn test_condition_rule_no_condition_matched() {
        let detail = RuleDetail::Condition {
            conditions: vec![ConditionSpec {
                expr_if: ExprSpec {
                    expr: vec![
                        ExprItem::field("基金类型"),
                        ExprItem::op("包含"),
                        ExprItem::value("货币"),
                    ],
                    unique: false,
                },
                expr_then: ExprSpec {
                    expr: vec![
                        ExprItem::field("赎回期"),
                        ExprItem::op("≤"),
                        ExprItem::value("7天"),
                    ],
                    unique: false,
                },
                message: None,
                reason: None,
            }],
        };
        let outcome =
            validate_rule(&detail, &answers(&[("基金类型", "股票型"), ("赎回期", "10天")]))
                .unwrap();
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.reason.as_deref(), Some("不符合任一条件"));
    }

    #[test]
    fn test_condition_rule_then_failure_prefixed_by_if() {
        let detail = RuleDetail::Condition {
            conditions: vec![ConditionSpec {
                expr_if: ExprSpec {
                    expr: vec![
                        ExprItem::field("基金类型"),
                        ExprItem::op("包含"),
                        ExprItem::value("货币"),
                    ],
                    unique: false,
                },
                expr_then: ExprSpec {
                    expr: vec![
                        ExprItem::field("赎回期"),
                        ExprItem::op("≤"),
                        ExprItem::value("7天"),
                    ],
                    unique: false,
                },
                message: None,
                reason: None,
            }],
        };
        let outcome = validate_rule(
            &detail,
            &answers(&[("基金类型", "货币型"), ("赎回期", "10天")]),
        )
        .unwrap();
        assert_eq!(outcome.result, Some(false));
        let reason = outcome.reason.unwrap();
        assert!(reason.starts_with("基金类型 包含 货币"));
        assert!(reason.contains("赎回期 > 7天"));
    }

    #[test]
    fn test_condition_rule_null_then_skips_empty_check() {
        let detail = RuleDetail::Condition {
            conditions: vec![ConditionSpec {
                expr_if: ExprSpec {
                    expr: vec![
                        ExprItem::field("基金类型"),
                        ExprItem::op("包含"),
                        ExprItem::value("货币"),
                    ],
                    unique: false,
                },
                expr_then: ExprSpec {
                    expr: vec![
                        ExprItem::field("封闭期"),
                        ExprItem::op("="),
                        ExprItem::value(OP_NULL),
                    ],
                    unique: false,
                },
                message: None,
                reason: None,
            }],
        };
        let outcome = validate_rule(&detail, &answers(&[("基金类型", "货币型")])).unwrap();
        assert_eq!(outcome.result, Some(true));
    }

    #[test]
    fn test_rule_schema_fields_dedup() {
        let detail = RuleDetail::Expr {
            expr: vec![
                ExprItem::field("A"),
                ExprItem::op("包含"),
                ExprItem::value("x"),
                ExprItem::op("或"),
                ExprItem::field("A"),
                ExprItem::op("包含"),
                ExprItem::value("y"),
            ],
            unique: true,
            message: None,
            reason: None,
        };
        assert_eq!(rule_schema_fields(&detail), vec!["A".to_string()]);
    }

    #[test]
    fn test_get_suggestion_by_fields() {
        assert_eq!(
            get_suggestion_by_fields(&["封闭期", "基金管理人概况-名称", "基金名称", "封闭期"]),
            "请补充封闭期，或填写为“无”；请补充基金管理人概况-名称、基金名称"
        );
        assert_eq!(get_suggestion_by_fields(&["封闭期"]), "请补充封闭期，或填写为“无”");
    }

    #[test]
    fn test_is_valid() {
        assert!(is_valid(&RuleDetail::Regex {
            regex: "公司".to_string(),
            field: FieldRef::named("公司名称"),
            message: None,
            reason: None,
        }));
        assert!(!is_valid(&RuleDetail::Regex {
            regex: "(".to_string(),
            field: FieldRef::named("公司名称"),
            message: None,
            reason: None,
        }));
        assert!(!is_valid(&RuleDetail::Condition { conditions: vec![] }));
    }
}
