use std::sync::{Mutex, MutexGuard};

use crate::UploadPhase;

/// Callback invoked with the externally observable percentage (0–100).
pub type ProgressCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Percentage reported while parts are being uploaded.
///
/// `clamp(round(100 * done / total) - 1, 1, 99)`: strictly inside `(0, 100)`
/// whatever the number of parts.
pub fn uploading_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 1;
    }
    let (done, total) = (done.min(total) as u64, total as u64);
    // Round half up.
    let rounded = (200 * done + total) / (2 * total);
    (rounded.saturating_sub(1)).clamp(1, 99) as u8
}

/// Maps the session phase and part ratio onto a single 0–100 scale and
/// notifies registered callbacks.
///
/// Within a phase the reported value never decreases; entering a new phase
/// reports that phase's floor. Callbacks run while the reporter is locked, so
/// observers see values in order and must not call back into the reporter.
pub struct ProgressReporter {
    inner: Mutex<ReporterInner>,
}

struct ReporterInner {
    callbacks: Vec<ProgressCallback>,
    phase: UploadPhase,
    current: u8,
}

impl ReporterInner {
    fn emit(&mut self, percent: u8) {
        self.current = percent;
        for cb in &self.callbacks {
            cb(percent);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReporterInner {
                callbacks: Vec::new(),
                phase: UploadPhase::Idle,
                current: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReporterInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a progress callback.
    pub fn on_progress(&self, callback: ProgressCallback) {
        self.lock().callbacks.push(callback);
    }

    /// Reports entry into `phase`.
    pub fn report_phase(&self, phase: UploadPhase) -> u8 {
        let mut inner = self.lock();
        let percent = phase.percent_floor();
        if inner.phase == phase && inner.current >= percent {
            return inner.current;
        }
        inner.phase = phase;
        inner.emit(percent);
        percent
    }

    /// Reports `done` of `total` parts finished.
    ///
    /// Ignored outside `Uploading`; values lower than the last report are
    /// not emitted.
    pub fn report_parts(&self, done: usize, total: usize) -> u8 {
        let mut inner = self.lock();
        if inner.phase != UploadPhase::Uploading {
            return inner.current;
        }
        let percent = uploading_percent(done, total);
        if percent > inner.current {
            inner.emit(percent);
        }
        inner.current
    }

    /// Drops back to 0 (`NOTHING`) and idles.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = UploadPhase::Idle;
        inner.emit(0);
    }

    /// Last reported percentage.
    pub fn current(&self) -> u8 {
        self.lock().current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording_reporter() -> (ProgressReporter, Arc<Mutex<Vec<u8>>>) {
        let reporter = ProgressReporter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        reporter.on_progress(Box::new(move |p| s.lock().unwrap().push(p)));
        (reporter, seen)
    }

    #[test]
    fn uploading_percent_formula() {
        assert_eq!(uploading_percent(0, 3), 1);
        assert_eq!(uploading_percent(1, 3), 32);
        assert_eq!(uploading_percent(2, 3), 66);
        assert_eq!(uploading_percent(3, 3), 99);
        assert_eq!(uploading_percent(1, 2), 49);
        assert_eq!(uploading_percent(1, 1), 99);
        assert_eq!(uploading_percent(0, 0), 1);
    }

    #[test]
    fn uploading_percent_bounds_for_many_parts() {
        for total in [1usize, 2, 7, 100, 101, 1000, 10_000] {
            let mut last = 0;
            for done in 0..=total {
                let p = uploading_percent(done, total);
                assert!((1..=99).contains(&p), "{done}/{total} -> {p}");
                assert!(p >= last);
                last = p;
            }
        }
    }

    #[test]
    fn reporter_full_sequence() {
        let (reporter, seen) = recording_reporter();
        reporter.report_phase(UploadPhase::FetchingLink);
        reporter.report_phase(UploadPhase::Uploading);
        for done in 1..=3 {
            reporter.report_parts(done, 3);
        }
        reporter.report_phase(UploadPhase::Completing);
        reporter.report_phase(UploadPhase::Completed);

        assert_eq!(*seen.lock().unwrap(), vec![1, 1, 32, 66, 99, 99, 100]);
        assert_eq!(reporter.current(), 100);
    }

    #[test]
    fn reporter_never_decreases_within_uploading() {
        let (reporter, seen) = recording_reporter();
        reporter.report_phase(UploadPhase::Uploading);
        reporter.report_parts(2, 3);
        reporter.report_parts(1, 3);
        assert_eq!(reporter.current(), 66);
        assert_eq!(*seen.lock().unwrap(), vec![1, 66]);
    }

    #[test]
    fn reporter_ignores_parts_outside_uploading() {
        let (reporter, seen) = recording_reporter();
        reporter.report_parts(1, 2);
        assert_eq!(reporter.current(), 0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn reporter_reset_returns_to_nothing() {
        let (reporter, seen) = recording_reporter();
        reporter.report_phase(UploadPhase::Uploading);
        reporter.report_parts(1, 2);
        reporter.reset();
        assert_eq!(reporter.current(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![1, 49, 0]);
    }
}
