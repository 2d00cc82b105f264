//! Presentation callbacks
//!
//! The pipeline reports through a [`Presenter`] and never waits on it. The
//! console implementation backs the CLI; [`RecordingPresenter`] captures
//! everything for tests.

use std::sync::Mutex;

use colored::*;

/// Sink for user-facing pipeline notifications
pub trait Presenter: Send + Sync {
    fn show_error(&self, message: &str);

    fn update_status(&self, message: &str);

    /// Percentage complete, 0.0 to 100.0
    fn update_progress(&self, percent: f64);

    fn show_completion(&self);
}

/// Prints to stdout/stderr with colour and mirrors into the log
#[derive(Debug, Default)]
pub struct ConsolePresenter {
    verbose: bool,
}

impl ConsolePresenter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Presenter for ConsolePresenter {
    fn show_error(&self, message: &str) {
        log::error!("{}", message);
        eprintln!("{} {}", "ERROR:".red().bold(), message);
    }

    fn update_status(&self, message: &str) {
        log::info!("{}", message);
        if self.verbose {
            println!("{}", message.cyan());
        }
    }

    fn update_progress(&self, percent: f64) {
        println!("{} {:.1}%", "Progress:".green(), percent);
    }

    fn show_completion(&self) {
        log::info!("Processing completed");
        println!("{}", "Processing completed successfully".green().bold());
    }
}

/// One captured notification
#[derive(Debug, Clone, PartialEq)]
pub enum PresenterEvent {
    Error(String),
    Status(String),
    Progress(f64),
    Completion,
}

/// Presenter that stores every notification in order
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<PresenterEvent>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: PresenterEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<PresenterEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresenterEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                PresenterEvent::Status(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, PresenterEvent::Completion))
            .count()
    }

    pub fn last_progress(&self) -> Option<f64> {
        self.events().into_iter().rev().find_map(|e| match e {
            PresenterEvent::Progress(p) => Some(p),
            _ => None,
        })
    }
}

impl Presenter for RecordingPresenter {
    fn show_error(&self, message: &str) {
        self.push(PresenterEvent::Error(message.to_string()));
    }

    fn update_status(&self, message: &str) {
        self.push(PresenterEvent::Status(message.to_string()));
    }

    fn update_progress(&self, percent: f64) {
        self.push(PresenterEvent::Progress(percent));
    }

    fn show_completion(&self) {
        self.push(PresenterEvent::Completion);
    }
}
