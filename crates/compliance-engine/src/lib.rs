//! Rule and template compliance checks for regulated fund documents.
//!
//! The engine takes a parsed document, the extracted schema answers and
//! a set of configured rules, and produces one result per rule with
//! machine-readable reasons and editing suggestions.

pub mod answers;
pub mod checker;
pub mod expr;
pub mod numerals;
pub mod reader;
pub mod rules;
pub mod similarity;
pub mod suggest;
pub mod template;
pub mod text;
pub mod value;

use std::collections::BTreeMap;

use shared_types::{AuditReport, AuditRule, ParsedDocument};

pub use answers::AnswerManager;
pub use checker::Checker;
pub use reader::DocumentReader;
pub use similarity::SimilarityOptions;
pub use template::TemplateRule;

/// ComplianceEngine entry point.
pub struct ComplianceEngine {
    options: SimilarityOptions,
    schema_id: Option<i64>,
    reference_info: BTreeMap<String, String>,
}

impl ComplianceEngine {
    pub fn new() -> Self {
        Self {
            options: SimilarityOptions::default(),
            schema_id: None,
            reference_info: BTreeMap::new(),
        }
    }

    /// Synonym classes and comparison flags shared by every rule.
    pub fn with_options(mut self, options: SimilarityOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_schema_id(mut self, schema_id: Option<i64>) -> Self {
        self.schema_id = schema_id;
        self
    }

    /// Registered fund or company information, checked for consistency
    /// against the fields custom rules are authored on.
    pub fn with_reference_info(mut self, reference_info: BTreeMap<String, String>) -> Self {
        self.reference_info = reference_info;
        self
    }

    pub fn check(
        &self,
        fid: i64,
        document: &ParsedDocument,
        manager: &AnswerManager,
        template_rules: &[TemplateRule],
        custom_rules: &[AuditRule],
    ) -> AuditReport {
        let reader = DocumentReader::new(document);
        Checker::new(&reader, manager, fid)
            .with_schema_id(self.schema_id)
            .with_options(self.options.clone())
            .with_reference_info(self.reference_info.clone())
            .run(template_rules, custom_rules)
    }
}

impl Default for ComplianceEngine {
    fn default() -> Self {
        Self::new()
    }
}
