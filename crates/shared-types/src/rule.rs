use serde::{Deserialize, Serialize};

/// Sentinel operand meaning "is empty" in rule expressions.
pub const OP_NULL: &str = "NULL";

/// A field reference inside a rule definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldRef {
    pub name: String,
    #[serde(default)]
    pub schema_path: Option<String>,
    #[serde(default)]
    pub schema_id: Option<i64>,
}

impl FieldRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_path: None,
            schema_id: None,
        }
    }
}

/// One token of an infix rule expression: an operand (literal value or
/// named field reference) or an operator string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprItem {
    Value {
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
    Op(String),
}

impl ExprItem {
    pub fn value(value: impl Into<String>) -> Self {
        Self::Value {
            value: Some(value.into()),
            name: None,
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        Self::Value {
            value: None,
            name: Some(name.into()),
        }
    }

    pub fn field_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Value {
            value: Some(value.into()),
            name: Some(name.into()),
        }
    }

    pub fn op(op: impl Into<String>) -> Self {
        Self::Op(op.into())
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Value { name, .. } => name.as_deref(),
            Self::Op(_) => None,
        }
    }
}

/// An expression plus its evaluation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExprSpec {
    pub expr: Vec<ExprItem>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub expr_if: ExprSpec,
    pub expr_then: ExprSpec,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The four authored rule shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RuleDetail {
    Empty {
        field: FieldRef,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Regex {
        regex: String,
        field: FieldRef,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Expr {
        expr: Vec<ExprItem>,
        #[serde(default)]
        unique: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        reason: Option<String>,
    },
    Condition {
        conditions: Vec<ConditionSpec>,
    },
}

/// A custom-authored audit rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRule {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    /// The schema fields the rule is authored against. A rule bound to
    /// more than one field is not auditable.
    #[serde(default)]
    pub schema_fields: Vec<String>,
    pub detail: RuleDetail,
}

impl AuditRule {
    pub fn label(&self) -> String {
        format!("custom_{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expr_item_untagged_parsing() {
        let items: Vec<ExprItem> =
            serde_json::from_str(r#"[{"name": "冷静期", "value": "24小时"}, "=", {"value": "1天"}]"#)
                .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].field_name(), Some("冷静期"));
        assert!(matches!(&items[1], ExprItem::Op(op) if op == "="));
        assert_eq!(items[2].field_name(), None);
    }

    #[test]
    fn test_field_only_operand_parses_as_value() {
        let item: ExprItem = serde_json::from_str(r#"{"name": "公司注册资本"}"#).unwrap();
        assert!(matches!(item, ExprItem::Value { value: None, .. }));
    }

    #[test]
    fn test_rule_label() {
        let rule = AuditRule {
            id: 42,
            name: None,
            schema_fields: vec![],
            detail: RuleDetail::Empty {
                field: FieldRef::named("公司名称"),
                message: None,
                reason: None,
            },
        };
        assert_eq!(rule.label(), "custom_42");
    }
}
