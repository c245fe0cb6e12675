//! Batch input files.
//!
//! ```yaml
//! prompts:
//!   - prompt: "a cat in space"
//!     model: black-forest-labs/flux-schnell
//!   - prompt: "a dog on the moon"   # uses the default model
//! ```

use std::{collections::HashMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    work::{RunOptions, WorkItem},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PromptFile {
    #[serde(default)]
    pub prompts: Vec<PromptEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PromptEntry {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
}

impl PromptEntry {
    pub fn model_or<'a>(&'a self, default_model: &'a str) -> &'a str {
        match self.model.as_deref() {
            Some(m) if !m.is_empty() => m,
            _ => default_model,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSummary {
    pub total_prompts: usize,
    pub unique_prompts: usize,
    pub duplicates: usize,
    pub empty_prompts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    /// A report for a file that could not even be parsed.
    pub fn unreadable(error: &Error) -> Self {
        Self {
            valid: false,
            errors: vec![error.to_string()],
            ..Default::default()
        }
    }
}

impl PromptFile {
    pub fn parse(src: &str) -> Result<Self> {
        serde_yaml::from_str(src)
            .map_err(|e| Error::InvalidInput(format!("Invalid YAML syntax: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|e| {
            Error::InvalidInput(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&src)
    }

    /// Empty prompts are errors, repeated (prompt, model) pairs are warnings. Prompts are numbered
    /// from 1 in messages.
    pub fn validate(&self, default_model: &str) -> ValidationReport {
        let mut errors = vec![];
        let mut warnings = vec![];
        let mut seen: HashMap<(&str, &str), usize> = HashMap::new();
        let mut empty = 0;

        if self.prompts.is_empty() {
            errors.push("No prompts found in file".to_string());
        }

        for (i, entry) in self.prompts.iter().enumerate() {
            let n = i + 1;
            if entry.prompt.trim().is_empty() {
                errors.push(format!("Prompt {n}: empty prompt text"));
                empty += 1;
                continue;
            }

            let key = (entry.prompt.as_str(), entry.model_or(default_model));
            if let Some(first) = seen.get(&key) {
                warnings.push(format!(
                    "Prompt {n}: duplicate of prompt {first} (same prompt and model)"
                ));
            } else {
                seen.insert(key, n);
            }
        }

        let total = self.prompts.len();
        ValidationReport {
            valid: errors.is_empty(),
            summary: ValidationSummary {
                total_prompts: total,
                unique_prompts: seen.len(),
                duplicates: total - seen.len() - empty,
                empty_prompts: empty,
            },
            errors,
            warnings,
        }
    }

    /// Work items in file order. Fails with the first validation error, if any.
    pub fn work_items(&self, default_model: &str, options: &RunOptions) -> Result<Vec<WorkItem>> {
        let report = self.validate(default_model);
        if let Some(first) = report.errors.first() {
            return Err(Error::InvalidInput(first.clone()));
        }
        Ok(self
            .prompts
            .iter()
            .map(|p| options.work_item(p.prompt.clone(), p.model_or(default_model)))
            .collect())
    }
}
