//! State shared by every stage

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::domain::Instruction;
use crate::error::PipelineError;
use crate::presenter::Presenter;

use super::progress::ProgressState;

/// Active instruction, batch progress, auto-tune flag, and the presenter
///
/// Readers always see a whole instruction: the cell swaps `Arc`s, never
/// mutates in place.
pub struct PipelineContext {
    active: RwLock<Option<Arc<Instruction>>>,
    auto_tune: AtomicBool,
    progress: Arc<ProgressState>,
    presenter: Arc<dyn Presenter>,
}

impl PipelineContext {
    pub fn new(presenter: Arc<dyn Presenter>, auto_tune: bool) -> Self {
        Self {
            active: RwLock::new(None),
            auto_tune: AtomicBool::new(auto_tune),
            progress: Arc::new(ProgressState::new()),
            presenter,
        }
    }

    /// Replace the active instruction
    pub fn set_instruction(&self, instruction: Arc<Instruction>) {
        log::info!("Active instruction: {}", instruction.name);
        let mut active = self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = Some(instruction);
    }

    pub fn clear_instruction(&self) {
        let mut active = self.active.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *active = None;
    }

    pub fn active_instruction(&self) -> Option<Arc<Instruction>> {
        self.active
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn auto_tune(&self) -> bool {
        self.auto_tune.load(Ordering::SeqCst)
    }

    pub fn set_auto_tune(&self, enabled: bool) {
        self.auto_tune.store(enabled, Ordering::SeqCst);
    }

    pub fn progress(&self) -> &Arc<ProgressState> {
        &self.progress
    }

    pub fn presenter(&self) -> &Arc<dyn Presenter> {
        &self.presenter
    }

    /// Log an error and forward it to the presenter
    pub fn report_error(&self, origin: &str, error: &PipelineError) {
        log::error!("{} failed ({:?}): {}", origin, error.kind(), error);
        self.presenter.show_error(&format!("{}: {}", origin, error));
    }

    pub fn report_status(&self, message: &str) {
        self.presenter.update_status(message);
    }
}

impl std::fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineContext")
            .field("active", &self.active_instruction().map(|i| i.name.clone()))
            .field("auto_tune", &self.auto_tune())
            .field("progress", &self.progress.snapshot())
            .finish()
    }
}
