//! Reporter trait for dependency injection
//!
//! Core operations report progress through this trait instead of printing,
//! so a CLI, GUI or test harness can render (or record) it however it likes.

/// Progress value for phases with no meaningful percentage (e.g. waiting
/// for the backend to create a release group).
pub const INDETERMINATE: i16 = -1;

/// Sink for progress and status events.
pub trait Reporter: Send + Sync {
    /// A new phase of the operation has started.
    fn phase(&self, title: &str);

    /// Progress for one task, `0..=100`, or [`INDETERMINATE`].
    fn progress(&self, task: &str, percent: i16);

    /// A task finished successfully.
    fn done(&self, task: &str, detail: &str);

    /// A non-fatal problem the user should see.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn phase(&self, title: &str) {
        (**self).phase(title);
    }
    fn progress(&self, task: &str, percent: i16) {
        (**self).progress(task, percent);
    }
    fn done(&self, task: &str, detail: &str) {
        (**self).done(task, detail);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// Convert a byte count into a clamped `0..=100` percentage.
pub fn percent(current: u64, total: u64) -> i16 {
    if total == 0 {
        return 100;
    }
    ((current.min(total) * 100) / total) as i16
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn phase(&self, _: &str) {}
    fn progress(&self, _: &str, _: i16) {}
    fn done(&self, _: &str, _: &str) {}
    fn warning(&self, _: &str) {}
}

/// Reporter that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn phase(&self, title: &str) {
        tracing::info!("{title}");
    }
    fn progress(&self, task: &str, percent: i16) {
        if percent == INDETERMINATE {
            tracing::debug!(task, "in progress");
        } else {
            tracing::debug!(task, percent, "progress");
        }
    }
    fn done(&self, task: &str, detail: &str) {
        tracing::info!(task, "{detail}");
    }
    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Reporter;
    use std::sync::Mutex;

    /// Records every event for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingReporter {
        pub(crate) progress: Mutex<Vec<(String, i16)>>,
        pub(crate) warnings: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn phase(&self, _: &str) {}
        fn progress(&self, task: &str, percent: i16) {
            self.progress.lock().unwrap().push((task.to_string(), percent));
        }
        fn done(&self, _: &str, _: &str) {}
        fn warning(&self, msg: &str) {
            self.warnings.lock().unwrap().push(msg.to_string());
        }
    }
}
