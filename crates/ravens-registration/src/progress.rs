//! Progress tracking and callbacks for registration workflows.
//!
//! Stages report every optimizer iteration through a [`ProgressTracker`],
//! which fans the update out to any number of [`ProgressCallback`]s.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Registration stage that produced a progress update or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Moments,
    Affine,
    Deformable,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Moments => "moments",
            Stage::Affine => "affine",
            Stage::Deformable => "deformable",
            Stage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Position of an optimization loop inside the pyramid schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelContext {
    pub stage: Stage,
    /// Level index, 0 is the coarsest.
    pub level: usize,
    pub levels: usize,
    /// Shrink factor of this level.
    pub factor: usize,
}

impl LevelContext {
    pub fn new(stage: Stage, level: usize, levels: usize, factor: usize) -> Self {
        Self {
            stage,
            level,
            levels,
            factor,
        }
    }
}

/// Progress information for registration iterations.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub context: LevelContext,
    /// Current iteration number (1-based).
    pub iteration: usize,
    /// Iteration budget of the current level.
    pub total_iterations: usize,
    /// Current loss value.
    pub loss: f64,
    /// Time elapsed since the tracker started.
    pub elapsed: Duration,
    /// Current learning rate.
    pub learning_rate: f64,
}

impl ProgressInfo {
    pub fn new(
        context: LevelContext,
        iteration: usize,
        total_iterations: usize,
        loss: f64,
        elapsed: Duration,
        learning_rate: f64,
    ) -> Self {
        Self {
            context,
            iteration,
            total_iterations,
            loss,
            elapsed,
            learning_rate,
        }
    }

    /// Calculate progress percentage within the current level.
    pub fn progress_percent(&self) -> f64 {
        if self.total_iterations == 0 {
            return 100.0;
        }
        (self.iteration as f64 / self.total_iterations as f64) * 100.0
    }
}

/// Progress callback trait for monitoring registration progress.
pub trait ProgressCallback: Send + Sync {
    /// Called at each iteration with progress information.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called when a stage starts optimizing a pyramid level.
    fn on_level_start(&self, _context: &LevelContext, _iterations: usize) {
        // Default: no-op
    }

    /// Called when a stage finishes.
    fn on_stage_complete(&self, _stage: Stage) {
        // Default: no-op
    }

    /// Called when registration fails.
    fn on_error(&self, _error: &str) {
        // Default: no-op
    }
}

/// Console progress callback that logs to tracing.
#[derive(Debug, Clone)]
pub struct ConsoleProgressCallback {
    /// Log interval (iterations).
    pub log_interval: usize,
}

impl Default for ConsoleProgressCallback {
    fn default() -> Self {
        Self { log_interval: 50 }
    }
}

impl ConsoleProgressCallback {
    pub fn new(log_interval: usize) -> Self {
        Self {
            log_interval: log_interval.max(1),
        }
    }
}

impl ProgressCallback for ConsoleProgressCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        if info.iteration % self.log_interval == 0 || info.iteration == info.total_iterations {
            tracing::info!(
                "{} level {}/{} iter {}/{} ({:.1}%) | Loss: {:.6} | LR: {:.2e} | Elapsed: {:.2}s",
                info.context.stage,
                info.context.level + 1,
                info.context.levels,
                info.iteration,
                info.total_iterations,
                info.progress_percent(),
                info.loss,
                info.learning_rate,
                info.elapsed.as_secs_f64(),
            );
        }
    }

    fn on_level_start(&self, context: &LevelContext, iterations: usize) {
        tracing::info!(
            "Starting {} level {}/{} (shrink {}) with {} iterations",
            context.stage,
            context.level + 1,
            context.levels,
            context.factor,
            iterations
        );
    }

    fn on_stage_complete(&self, stage: Stage) {
        tracing::info!("{} stage complete", stage);
    }

    fn on_error(&self, error: &str) {
        tracing::error!("Registration failed: {}", error);
    }
}

/// History callback that records all progress information.
#[derive(Debug, Clone, Default)]
pub struct HistoryCallback {
    history: Arc<Mutex<Vec<ProgressInfo>>>,
}

impl HistoryCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the recorded history.
    pub fn get_history(&self) -> Vec<ProgressInfo> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Recorded updates of one stage.
    pub fn stage_history(&self, stage: Stage) -> Vec<ProgressInfo> {
        self.get_history()
            .into_iter()
            .filter(|info| info.context.stage == stage)
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl ProgressCallback for HistoryCallback {
    fn on_progress(&self, info: &ProgressInfo) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(info.clone());
    }
}

/// Progress tracker that manages multiple callbacks.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    callbacks: Vec<Arc<dyn ProgressCallback>>,
    start_time: Arc<Mutex<Option<Instant>>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker with a [`ConsoleProgressCallback`] already registered.
    pub fn console() -> Self {
        let mut tracker = Self::new();
        tracker.add_callback(Arc::new(ConsoleProgressCallback::default()));
        tracker
    }

    pub fn add_callback(&mut self, callback: Arc<dyn ProgressCallback>) {
        self.callbacks.push(callback);
    }

    /// Start (or restart) the elapsed-time clock.
    pub fn start(&self) {
        *self.start_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn elapsed(&self) -> Duration {
        self.start_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    pub fn level_start(&self, context: &LevelContext, iterations: usize) {
        for callback in &self.callbacks {
            callback.on_level_start(context, iterations);
        }
    }

    pub fn update(
        &self,
        context: LevelContext,
        iteration: usize,
        total_iterations: usize,
        loss: f64,
        learning_rate: f64,
    ) {
        let info = ProgressInfo::new(
            context,
            iteration,
            total_iterations,
            loss,
            self.elapsed(),
            learning_rate,
        );
        for callback in &self.callbacks {
            callback.on_progress(&info);
        }
    }

    pub fn stage_complete(&self, stage: Stage) {
        for callback in &self.callbacks {
            callback.on_stage_complete(stage);
        }
    }

    pub fn error(&self, error: &str) {
        for callback in &self.callbacks {
            callback.on_error(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> LevelContext {
        LevelContext::new(Stage::Affine, 0, 3, 4)
    }

    #[test]
    fn test_progress_info() {
        let info = ProgressInfo::new(context(), 10, 100, 0.5, Duration::from_secs(10), 0.01);
        assert_eq!(info.iteration, 10);
        assert_eq!(info.loss, 0.5);
        assert_eq!(info.progress_percent(), 10.0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Deformable.to_string(), "deformable");
        assert_eq!(Stage::Moments.to_string(), "moments");
    }

    #[test]
    fn test_history_callback() {
        let history = Arc::new(HistoryCallback::new());
        let mut tracker = ProgressTracker::new();
        tracker.add_callback(history.clone());
        tracker.start();

        tracker.update(context(), 1, 2, 1.0, 0.01);
        tracker.update(context(), 2, 2, 0.5, 0.01);
        tracker.update(LevelContext::new(Stage::Deformable, 0, 3, 4), 1, 1, -3.0, 0.5);

        assert_eq!(history.get_history().len(), 3);
        assert_eq!(history.stage_history(Stage::Affine).len(), 2);
        history.clear();
        assert!(history.get_history().is_empty());
    }
}
