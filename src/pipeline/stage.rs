//! Queue plus single consumer task, shared by every stage
//!
//! Each [`Stage`] owns an unbounded FIFO and one tokio task that drains it.
//! Producers hold a cloneable [`StageSender`]. Stopping clears the running
//! flag and pushes a shutdown sentinel so a parked worker wakes and exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PipelineError, Result};

use super::context::PipelineContext;

/// Per-task behaviour of a stage
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    type Task: Send + 'static;

    /// Short name used in logs and error reports
    fn name(&self) -> &'static str;

    /// Process one task; errors are reported and the worker moves on
    async fn handle(&self, task: Self::Task) -> Result<()>;

    /// Whether a failed task means its file will never be applied
    fn drops_file_on_error(&self) -> bool {
        false
    }
}

enum Envelope<T> {
    Task(T),
    Shutdown,
}

/// Producer handle for a stage's queue
pub struct StageSender<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Envelope<T>>,
    running: Arc<AtomicBool>,
}

impl<T> Clone for StageSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            running: Arc::clone(&self.running),
        }
    }
}

impl<T> StageSender<T> {
    /// Queue a task; never blocks
    pub fn enqueue(&self, task: T) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(PipelineError::Stopped(self.name));
        }
        self.tx
            .send(Envelope::Task(task))
            .map_err(|_| PipelineError::Stopped(self.name))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A running stage
pub struct Stage<T> {
    sender: StageSender<T>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Stage<T> {
    /// Start the consumer task for `handler`
    pub fn spawn<H>(handler: H, ctx: Arc<PipelineContext>) -> Self
    where
        H: StageHandler<Task = T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let name = handler.name();

        let worker = tokio::spawn(run_worker(handler, rx, Arc::clone(&running), ctx));
        log::debug!("{} stage started", name);

        Self {
            sender: StageSender { name, tx, running },
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn enqueue(&self, task: T) -> Result<()> {
        self.sender.enqueue(task)
    }

    pub fn sender(&self) -> StageSender<T> {
        self.sender.clone()
    }

    pub fn name(&self) -> &'static str {
        self.sender.name
    }

    pub fn is_running(&self) -> bool {
        self.sender.running.load(Ordering::SeqCst)
    }

    /// Refuse new work and wake the worker so it exits
    ///
    /// A task already being handled runs to completion. Anything still queued
    /// is discarded.
    pub fn stop(&self) {
        if self.sender.running.swap(false, Ordering::SeqCst) {
            log::info!("Stopping {} stage", self.sender.name);
            let _ = self.sender.tx.send(Envelope::Shutdown);
        }
    }

    /// Wait for the worker task to exit
    pub async fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            log::error!("{} worker task failed: {:?}", self.sender.name, e);
        }
    }
}

async fn run_worker<H: StageHandler>(
    handler: H,
    mut rx: mpsc::UnboundedReceiver<Envelope<H::Task>>,
    running: Arc<AtomicBool>,
    ctx: Arc<PipelineContext>,
) {
    let name = handler.name();

    while let Some(envelope) = rx.recv().await {
        let task = match envelope {
            Envelope::Task(task) => task,
            Envelope::Shutdown => break,
        };
        if !running.load(Ordering::SeqCst) {
            log::debug!("{} stage stopped, discarding queued task", name);
            break;
        }
        if let Err(e) = handler.handle(task).await {
            if handler.drops_file_on_error() {
                ctx.progress().record_drop();
            }
            ctx.report_error(name, &e);
        }
    }

    log::debug!("{} worker exited", name);
}
