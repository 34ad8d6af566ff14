use serde::{Deserialize, Serialize};

use crate::document::Outlines;

/// The raw answer of one schema field, as produced by the upstream
/// extractor. `value` is the normalized text (None when the field was not
/// answered); `text` keeps the verbatim evidence; `outlines` locate the
/// evidence boxes per page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerRecord {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub outlines: Outlines,
    #[serde(default)]
    pub manual: bool,
}

impl AnswerRecord {
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Smallest page carrying evidence, 0 when unanswered.
    pub fn page(&self) -> u32 {
        self.outlines.keys().next().copied().unwrap_or(0)
    }
}
