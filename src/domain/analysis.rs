//! Analysis records written by the evolution stage

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::Instruction;

/// Evaluation of one processed file. Never mutated after it is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub file: PathBuf,
    /// ISO-8601 time of the analysis
    pub timestamp: String,
    pub score: i64,
    pub diff: Vec<String>,
    /// Instruction in effect when the analysis ran
    pub instruction: Option<Instruction>,
}
