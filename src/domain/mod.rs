//! Domain types for promptmill
//!
//! This module contains the records that move through the pipeline:
//! - Instruction: named positive/negative directive pair
//! - IngestTask / InferenceTask / ProcessedResult: the per-file work items
//! - AnalysisRecord: persisted evaluation of one processed file

pub mod analysis;
pub mod instruction;
pub mod task;

pub use analysis::AnalysisRecord;
pub use instruction::{DEFAULT_LANGUAGE, Instruction, InstructionParts};
pub use task::{InferenceTask, IngestTask, ProcessedResult};
