//! Named instruction persistence

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Instruction;
use crate::error::{PipelineError, Result};

use super::{write_json, write_new_json};

/// Fields a stored record must carry to be listed
const REQUIRED_FIELDS: [&str; 3] = ["name", "positive", "negative"];

/// Durable mapping of name to instruction
pub trait InstructionStore: Send + Sync {
    /// Save an instruction under its name, replacing any previous record
    fn save(&self, instruction: &Instruction) -> Result<()>;

    /// Save an instruction only if its name is free; `Ok(false)` if taken
    fn create(&self, instruction: &Instruction) -> Result<bool>;

    /// Load an instruction by name
    fn load(&self, name: &str) -> Result<Option<Instruction>>;

    /// Names of all well-formed records, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Delete a record; `Ok(false)` if it did not exist
    fn delete(&self, name: &str) -> Result<bool>;

    /// Check whether a record with this name exists
    fn exists(&self, name: &str) -> Result<bool>;
}

/// One `<name>.json` file per instruction
#[derive(Debug, Clone)]
pub struct FileInstructionStore {
    dir: PathBuf,
}

impl FileInstructionStore {
    /// Open or create a store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{}.json", name)))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(PipelineError::Validation(format!("invalid instruction name '{}'", name)));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(PipelineError::Validation(format!(
            "instruction name '{}' must not contain path separators",
            name
        )));
    }
    Ok(())
}

/// True when the JSON object carries every required field as a string
fn is_well_formed(value: &serde_json::Value) -> bool {
    REQUIRED_FIELDS
        .iter()
        .all(|field| value.get(field).map(|v| v.is_string()).unwrap_or(false))
}

impl InstructionStore for FileInstructionStore {
    fn save(&self, instruction: &Instruction) -> Result<()> {
        let path = self.record_path(&instruction.name)?;
        write_json(&path, instruction)?;
        log::info!("Saved instruction '{}'", instruction.name);
        Ok(())
    }

    fn create(&self, instruction: &Instruction) -> Result<bool> {
        let path = self.record_path(&instruction.name)?;
        let created = write_new_json(&path, instruction)?;
        if created {
            log::info!("Created instruction '{}'", instruction.name);
        }
        Ok(created)
    }

    fn load(&self, name: &str) -> Result<Option<Instruction>> {
        let path = self.record_path(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let instruction: Instruction = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Storage(format!("Invalid instruction format in '{}': {}", name, e)))?;
        Ok(Some(instruction))
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
                log::debug!("Skipping unparsable instruction file {}", path.display());
                continue;
            };
            if !is_well_formed(&value) {
                log::debug!("Skipping incomplete instruction file {}", path.display());
                continue;
            }

            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let path = self.record_path(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        log::info!("Deleted instruction '{}'", name);
        Ok(true)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.record_path(name)?.exists())
    }
}
