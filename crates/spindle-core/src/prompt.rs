//! Prompt formatting with a fixed chat template

use crate::{validation::Validator, CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder replaced by the user's text
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Template used when none is configured
pub const DEFAULT_CHAT_TEMPLATE: &str = "<|user|>\n{input} <|end|>\n<|assistant|>";

/// Raw user text that passed the non-empty check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        Validator::validate_input_text(&text)?;
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Prompt wrapped in the chat template, ready for encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedPrompt(String);

impl FormattedPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Wraps already-templated text; the controller re-validates it before encoding
impl From<String> for FormattedPrompt {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl fmt::Display for FormattedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A chat template with exactly one `{input}` placeholder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_CHAT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        let placeholders = template.matches(INPUT_PLACEHOLDER).count();
        if placeholders != 1 {
            return Err(CoreError::configuration(
                "TEMPLATE_PLACEHOLDER_COUNT",
                format!(
                    "Chat template must contain {} exactly once (found {})",
                    INPUT_PLACEHOLDER, placeholders
                ),
                "Chat template validation",
                format!("Example template: {:?}", DEFAULT_CHAT_TEMPLATE),
            ));
        }
        Ok(Self { template })
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Wrap `user_text` in the template. The text is inserted verbatim.
    pub fn format(&self, user_text: &str) -> Result<FormattedPrompt> {
        let prompt = Prompt::new(user_text)?;
        Ok(self.format_prompt(&prompt))
    }

    pub fn format_prompt(&self, prompt: &Prompt) -> FormattedPrompt {
        FormattedPrompt(self.template.replacen(INPUT_PLACEHOLDER, prompt.as_str(), 1))
    }
}

impl TryFrom<String> for PromptTemplate {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PromptTemplate> for String {
    fn from(value: PromptTemplate) -> Self {
        value.template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_format_reference_example() {
        let formatted = PromptTemplate::default().format("Hello").unwrap();
        assert_eq!(formatted.as_str(), "<|user|>\nHello <|end|>\n<|assistant|>");
    }

    #[test]
    fn test_format_rejects_blank_input() {
        let template = PromptTemplate::default();
        for text in ["", "   "] {
            let err = template.format(text).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::EmptyInput);
        }
    }

    #[test]
    fn test_format_keeps_braces_in_user_text() {
        let formatted = PromptTemplate::default().format("what is {input}?").unwrap();
        assert_eq!(
            formatted.as_str(),
            "<|user|>\nwhat is {input}? <|end|>\n<|assistant|>"
        );
    }

    #[test]
    fn test_template_requires_single_placeholder() {
        assert!(PromptTemplate::new("no placeholder").is_err());
        let err = PromptTemplate::new("{input} and {input}").unwrap_err();
        assert_eq!(err.code(), "TEMPLATE_PLACEHOLDER_COUNT");
        assert!(PromptTemplate::new("Q: {input}\nA:").is_ok());
    }

    #[test]
    fn test_template_deserializes_with_validation() {
        let template: PromptTemplate = serde_json::from_str("\"[INST] {input} [/INST]\"").unwrap();
        assert_eq!(template.format("hi").unwrap().as_str(), "[INST] hi [/INST]");
        assert!(serde_json::from_str::<PromptTemplate>("\"nothing\"").is_err());
    }
}
