pub mod answer;
pub mod document;
pub mod reason;
pub mod rule;

pub use answer::AnswerRecord;
pub use document::{
    Cell, CharBox, DocxMeta, Element, ElementClass, Outline, Outlines, Paragraph, ParsedDocument,
    SyllabusNode,
};
pub use reason::{
    AuditReport, ChapterInfo, ConflictReasonItem, CustomRuleNoMatchItem, DiffItem, DiffKind,
    FieldNoMatchItem, IgnoreConditionItem, MatchFailedItem, MatchReasonItem, MissContentReasonItem,
    NoMatchReasonItem, Reason, ReasonTemplate, ResultItem, SchemaFailedItem, SchemaResult,
    TEMPLATE_DEFAULT, TEMPLATE_EDITING, TEMPLATE_LAW,
};
pub use rule::{AuditRule, ConditionSpec, ExprItem, ExprSpec, FieldRef, RuleDetail, OP_NULL};
