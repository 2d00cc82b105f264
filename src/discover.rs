//! Turn command-line inputs into a list of files to submit

use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// Expand directories recursively, keeping only supported source files
///
/// Plain file arguments go through the same filter; each one left out is
/// logged. Output is sorted and free of duplicates.
pub fn collect_files(inputs: &[PathBuf], config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            let found = expand_dir(input, config)?;
            log::debug!("{}: {} supported file(s)", input.display(), found.len());
            files.extend(found);
        } else if input.is_file() && config.supports(input) {
            files.push(input.clone());
        } else {
            log::warn!("Skipping {}: missing or unsupported file", input.display());
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

fn expand_dir(dir: &Path, config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let base = dir
        .to_str()
        .ok_or_else(|| PipelineError::Validation(format!("non-UTF-8 path: {}", dir.display())))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(base));

    let matches = glob::glob(&pattern)
        .map_err(|e| PipelineError::Validation(format!("bad search pattern {}: {}", pattern, e)))?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|path| path.is_file() && config.supports(path))
        .collect();
    Ok(matches)
}
