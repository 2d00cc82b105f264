//! Analysis record persistence

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::AnalysisRecord;
use crate::error::{PipelineError, Result};
use crate::id::{safe_filename, with_attempt};

use super::write_new_json;

/// Give up after this many name collisions for one timestamp
const MAX_NAME_ATTEMPTS: u32 = 100;

/// One `analysis_<timestamp>.json` file per analysis event
#[derive(Debug, Clone)]
pub struct AnalysisStore {
    dir: PathBuf,
}

impl AnalysisStore {
    /// Open or create a store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a record under a name derived from its timestamp
    ///
    /// Existing files are never replaced; a numeric suffix is added instead.
    pub fn save(&self, record: &AnalysisRecord) -> Result<PathBuf> {
        let base = format!("analysis_{}", safe_filename(&record.timestamp));

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(format!("{}.json", with_attempt(&base, attempt)));
            if write_new_json(&path, record)? {
                log::info!("Saved analysis: {}", path.display());
                return Ok(path);
            }
        }

        Err(PipelineError::Storage(format!(
            "no free file name for analysis at {}",
            record.timestamp
        )))
    }

    /// All readable records, oldest first
    pub fn list(&self) -> Result<Vec<AnalysisRecord>> {
        let mut records = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_analysis = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("analysis_") && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_analysis {
                continue;
            }

            match fs::read_to_string(&path)
                .map_err(PipelineError::from)
                .and_then(|content| serde_json::from_str::<AnalysisRecord>(&content).map_err(PipelineError::from))
            {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping analysis file {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }
}
