//! Change scoring, analysis persistence, and the auto-tune trigger

use std::sync::Arc;

use async_trait::async_trait;
use similar::{ChangeTag, TextDiff};

use crate::config::PipelineConfig;
use crate::domain::{AnalysisRecord, ProcessedResult};
use crate::error::{PipelineError, Result};
use crate::id::now_iso;
use crate::storage::AnalysisStore;

use super::context::PipelineContext;
use super::optimize::Optimizer;
use super::stage::StageHandler;

pub const FROM_HEADER: &str = "--- original";
pub const TO_HEADER: &str = "+++ processed";

/// Unified line diff, three lines of context
///
/// Empty when the texts have the same lines.
pub fn compute_diff(original: &str, processed: &str) -> Vec<String> {
    let old: Vec<&str> = original.lines().collect();
    let new: Vec<&str> = processed.lines().collect();
    let diff = TextDiff::from_slices(&old, &new);

    let mut lines = Vec::new();
    for hunk in diff.unified_diff().iter_hunks() {
        if lines.is_empty() {
            lines.push(FROM_HEADER.to_string());
            lines.push(TO_HEADER.to_string());
        }
        lines.push(hunk.header().to_string());
        for change in hunk.iter_changes() {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => ' ',
            };
            lines.push(format!("{}{}", sign, change.value()));
        }
    }
    lines
}

/// `added comment lines - 10 * removed non-comment lines`
///
/// File headers and `@@` lines are not counted. An added line counts when it
/// contains any marker; a removed line is spared when, ignoring indentation,
/// it starts with one.
pub fn score_diff(diff: &[String], markers: &[String]) -> i64 {
    let body = match diff {
        [from, to, rest @ ..] if from == FROM_HEADER && to == TO_HEADER => rest,
        _ => diff,
    };

    let mut added = 0i64;
    let mut removed = 0i64;
    for line in body {
        if let Some(text) = line.strip_prefix('+') {
            if markers.iter().any(|m| text.contains(m.as_str())) {
                added += 1;
            }
        } else if let Some(text) = line.strip_prefix('-') {
            let trimmed = text.trim_start();
            if !markers.iter().any(|m| trimmed.starts_with(m.as_str())) {
                removed += 1;
            }
        }
    }
    added - 10 * removed
}

pub struct EvolutionStage {
    ctx: Arc<PipelineContext>,
    store: AnalysisStore,
    optimizer: Arc<Optimizer>,
    config: PipelineConfig,
}

impl EvolutionStage {
    pub fn new(
        ctx: Arc<PipelineContext>,
        store: AnalysisStore,
        optimizer: Arc<Optimizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ctx,
            store,
            optimizer,
            config,
        }
    }
}

#[async_trait]
impl StageHandler for EvolutionStage {
    type Task = Arc<ProcessedResult>;

    fn name(&self) -> &'static str {
        "evolution"
    }

    async fn handle(&self, result: Arc<ProcessedResult>) -> Result<()> {
        result.validate()?;

        let instruction = self.ctx.active_instruction();
        let markers = match &instruction {
            Some(active) => self.config.markers_for(&active.language),
            None => self.config.comment_markers.as_slice(),
        };

        let diff = compute_diff(result.original(), result.processed());
        let score = score_diff(&diff, markers);
        log::info!("Scored {}: {} ({} diff lines)", result.path().display(), score, diff.len());

        let record = AnalysisRecord {
            file: result.path().to_path_buf(),
            timestamp: now_iso(),
            score,
            diff,
            instruction: instruction.map(|i| (*i).clone()),
        };
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(&record))
            .await
            .map_err(|e| PipelineError::Storage(format!("analysis save task failed: {}", e)))??;

        let threshold = self.config.score_threshold;
        if score < threshold && self.ctx.auto_tune() {
            log::info!("Score {} below {}, optimizing instruction", score, threshold);
            // Outcome is reported by the optimizer itself
            let _ = self.optimizer.optimize_and_report().await;
        }
        Ok(())
    }
}
