//! Instructions steering the inference call
//!
//! An instruction is immutable once persisted. Optimization produces a new
//! named instruction rather than editing an existing one.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::id::now_iso;

/// Language tag used when a record does not carry one
pub const DEFAULT_LANGUAGE: &str = "Python";

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// A named pair of directives: what to do, and what never to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub name: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub positive: String,
    pub negative: String,
    /// ISO-8601 creation time
    #[serde(default = "now_iso")]
    pub created: String,
}

impl Instruction {
    /// Create an instruction stamped with the current time
    pub fn new(name: impl Into<String>, positive: impl Into<String>, negative: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            language: default_language(),
            positive: positive.into(),
            negative: negative.into(),
            created: now_iso(),
        }
    }

    /// Set the language tag
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Build a named instruction from a bare directive pair
    pub fn from_parts(name: impl Into<String>, parts: InstructionParts) -> Self {
        Self::new(name, parts.positive, parts.negative)
    }

    /// The directive pair without name or metadata
    pub fn parts(&self) -> InstructionParts {
        InstructionParts {
            positive: self.positive.clone(),
            negative: self.negative.clone(),
        }
    }

    /// Both directives must be present and non-blank
    pub fn validate(&self) -> Result<()> {
        self.parts().validate()
    }
}

/// The two free-text directives of an instruction
///
/// This is the shape sent to and expected back from the optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionParts {
    pub positive: String,
    pub negative: String,
}

impl InstructionParts {
    pub fn validate(&self) -> Result<()> {
        if self.positive.trim().is_empty() {
            return Err(PipelineError::Validation(
                "instruction is missing its positive directive".to_string(),
            ));
        }
        if self.negative.trim().is_empty() {
            return Err(PipelineError::Validation(
                "instruction is missing its negative directive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let instruction = Instruction::new("doc", "Add docstrings", "Do not change logic");
        assert_eq!(instruction.name, "doc");
        assert_eq!(instruction.language, DEFAULT_LANGUAGE);
        assert!(!instruction.created.is_empty());
        assert!(instruction.validate().is_ok());
    }

    #[test]
    fn test_blank_negative_is_invalid() {
        let instruction = Instruction::new("doc", "Add docstrings", "   ");
        let err = instruction.validate().unwrap_err();
        assert!(err.to_string().contains("negative"));
    }

    #[test]
    fn test_blank_positive_is_invalid() {
        let instruction = Instruction::new("doc", "", "Do not change logic");
        let err = instruction.validate().unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_deserialize_fills_language() {
        let json = r#"{"name":"x","positive":"p","negative":"n","created":"2026-01-01T00:00:00"}"#;
        let instruction: Instruction = serde_json::from_str(json).unwrap();
        assert_eq!(instruction.language, "Python");
        assert_eq!(instruction.created, "2026-01-01T00:00:00");
    }

    #[test]
    fn test_deserialize_requires_negative() {
        let json = r#"{"name":"x","positive":"p"}"#;
        assert!(serde_json::from_str::<Instruction>(json).is_err());
    }

    #[test]
    fn test_parts_round_trip_through_name() {
        let original = Instruction::new("a", "p", "n").with_language("Rust");
        let copy = Instruction::from_parts("b", original.parts());
        assert_eq!(copy.positive, "p");
        assert_eq!(copy.negative, "n");
        assert_eq!(copy.name, "b");
    }
}
