//! Named-placeholder prompt templates
//!
//! Placeholders are `{name}` where `name` is ASCII alphanumeric or underscore.
//! Substitution is a single pass over the template, so braces inside substituted
//! values (menu JSON, user text) are never re-expanded.

use crate::errors::{AppError, Result};
use regex_lite::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-zA-Z0-9_]+)\}").expect("placeholder pattern is valid"))
}

/// A prompt with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        let template = template.into();
        let mut input_variables: Vec<String> = Vec::new();
        for caps in placeholder_pattern().captures_iter(&template) {
            let name = &caps[1];
            if !input_variables.iter().any(|v| v == name) {
                input_variables.push(name.to_string());
            }
        }
        Self {
            template,
            input_variables,
        }
    }

    /// Load a template from disk
    pub fn from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AppError::Configuration {
            message: format!("Failed to read prompt template {}: {}", path, e),
        })?;
        Ok(Self::new(text))
    }

    /// Distinct placeholder names, in order of first appearance
    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn declares(&self, name: &str) -> bool {
        self.input_variables.iter().any(|v| v == name)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Substitute every occurrence of each provided placeholder.
    ///
    /// Placeholders without a value are left exactly as written.
    pub fn format(&self, values: &HashMap<&str, &str>) -> String {
        placeholder_pattern()
            .replace_all(&self.template, |caps: &Captures| match values.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_variables_are_distinct_and_ordered() {
        let template = PromptTemplate::new("{question} and {context}, again {question}");
        assert_eq!(template.input_variables(), ["question", "context"]);
        assert!(template.declares("context"));
        assert!(!template.declares("history"));
    }

    #[test]
    fn test_format_replaces_every_occurrence() {
        let template = PromptTemplate::new("Q: {question}\nRepeat: {question}");
        let values = HashMap::from([("question", "spicy?")]);
        assert_eq!(template.format(&values), "Q: spicy?\nRepeat: spicy?");
    }

    #[test]
    fn test_unmatched_placeholders_untouched() {
        let template = PromptTemplate::new("{context} / {history}");
        let values = HashMap::from([("context", "menu")]);
        assert_eq!(template.format(&values), "menu / {history}");
    }

    #[test]
    fn test_values_are_not_re_expanded() {
        let template = PromptTemplate::new("{context}|{question}");
        let values = HashMap::from([("context", "{question}"), ("question", "q")]);
        assert_eq!(template.format(&values), "{question}|q");
    }

    #[test]
    fn test_non_identifier_braces_ignored() {
        let template = PromptTemplate::new(r#"Return {"message": "..."} for {question}"#);
        assert_eq!(template.input_variables(), ["question"]);
    }
}
