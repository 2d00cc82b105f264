//! Storage layer for promptmill - one JSON file per record.
//!
//! Instructions live under a named-record directory and are addressed by
//! name. Analysis records are append-only: every save writes a new file and
//! never replaces an existing one.

mod analysis;
mod instructions;

pub use analysis::AnalysisStore;
pub use instructions::{FileInstructionStore, InstructionStore};

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Write `value` as pretty JSON to `path` only if the file does not exist yet
///
/// Returns `Ok(false)` when the path is already taken.
fn write_new_json<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let json = serde_json::to_string_pretty(value)?;
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(true)
}

/// Write `value` as pretty JSON to `path`, replacing any existing file
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{}\n", json))?;
    Ok(())
}
