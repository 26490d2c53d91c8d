//! Report runs: lifecycle, history and orchestration

pub mod history;
pub mod lifecycle;
pub mod orchestrator;

#[cfg(test)]
mod orchestrator_tests;

pub use history::{clamp_limit, HistoryRecorder, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT};
pub use lifecycle::{LifecycleError, ReportLifecycleTracker};
pub use orchestrator::{ReportError, ReportOrchestrator};
