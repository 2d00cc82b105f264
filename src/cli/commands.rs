//! CLI command definitions using clap.
//!
//! - run: process files through the pipeline
//! - instructions: manage stored instructions
//! - optimize: ask the endpoint to improve an instruction
//! - history: show saved analysis records

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const RUN_NOTES: &str = "\
Files that are missing or have an unsupported extension are skipped.
A file is left untouched when the model returns empty or whitespace-only
output, and the run refuses instructions whose positive or negative text
is blank. Failed files are reported and counted as dropped.";

/// promptmill - rewrite source files through a local LLM and tune the instruction
#[derive(Parser, Debug)]
#[command(name = "promptmill")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process files (directories are searched recursively)
    #[command(after_help = RUN_NOTES)]
    Run {
        /// Files or directories to process
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Name of the stored instruction to apply
        #[arg(short, long)]
        instruction: String,

        /// Never regenerate the instruction, whatever the scores
        #[arg(long)]
        no_auto_tune: bool,

        /// Give up waiting for the batch after this many seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Manage stored instructions
    Instructions {
        #[command(subcommand)]
        command: InstructionCommands,
    },

    /// Generate an improved copy of a stored instruction
    Optimize {
        /// Instruction to improve
        name: String,
    },

    /// Show saved analysis records, newest last
    History {
        /// Show only the most recent N records
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Instruction management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum InstructionCommands {
    /// List stored instruction names
    List,

    /// Print one instruction
    Show {
        name: String,
    },

    /// Create or replace an instruction
    Save {
        name: String,

        /// What the model should do
        #[arg(short, long)]
        positive: String,

        /// Constraints the model must respect
        #[arg(short, long)]
        negative: String,

        /// Source language tag
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Delete an instruction
    Delete {
        name: String,
    },
}
