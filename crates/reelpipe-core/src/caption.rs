//! Structured caption produced by the workflow's AI step.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

pub const MAX_TITLE_CHARS: usize = 100;
pub const MAX_DESCRIPTION_CHARS: usize = 5000;
pub const MAX_TAGS_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caption {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Caption {
    /// Parse and validate. Accepts either the bare object or the AI node's
    /// `{"output": {...}}` wrapper.
    pub fn parse(data: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(data)
            .map_err(|e| PipelineError::InvalidCaption(format!("not JSON: {e}")))?;
        let inner = match value.get("output") {
            Some(o) if o.is_object() => o.clone(),
            _ => value,
        };
        let caption: Caption = serde_json::from_value(inner)
            .map_err(|e| PipelineError::InvalidCaption(e.to_string()))?;
        caption.validate()?;
        Ok(caption)
    }

    pub fn validate(&self) -> Result<()> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(PipelineError::InvalidCaption("title is empty".into()));
        }
        let n = title.chars().count();
        if n > MAX_TITLE_CHARS {
            return Err(PipelineError::InvalidCaption(format!(
                "title is {n} characters (max {MAX_TITLE_CHARS})"
            )));
        }
        let n = self.description.chars().count();
        if n > MAX_DESCRIPTION_CHARS {
            return Err(PipelineError::InvalidCaption(format!(
                "description is {n} characters (max {MAX_DESCRIPTION_CHARS})"
            )));
        }
        if let Some(i) = self.tags.iter().position(|t| t.trim().is_empty()) {
            return Err(PipelineError::InvalidCaption(format!("tag {i} is empty")));
        }
        let total = self.tags_len();
        if total > MAX_TAGS_CHARS {
            return Err(PipelineError::InvalidCaption(format!(
                "tags total {total} characters (max {MAX_TAGS_CHARS})"
            )));
        }
        Ok(())
    }

    /// Combined tag length as YouTube counts it (comma separated).
    pub fn tags_len(&self) -> usize {
        let chars: usize = self.tags.iter().map(|t| t.chars().count()).sum();
        chars + self.tags.len().saturating_sub(1)
    }
}
