use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};
use uupd_drivers::{ProgressLabel, ProgressSink};

/// Redraw cadence of the progress display.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Shared progress state for one run.
///
/// The total is fixed at construction. The run loop is the only writer; the
/// display thread only reads through [`snapshot`](Self::snapshot).
#[derive(Debug)]
pub struct StepTracker {
    total: usize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    label: Mutex<Option<ProgressLabel>>,
    log_labels: bool,
}

/// Point-in-time copy of a [`StepTracker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub label: Option<ProgressLabel>,
}

impl StepTracker {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            label: Mutex::new(None),
            log_labels: false,
        }
    }

    /// Also log every label change at info, for runs without a display.
    #[must_use]
    pub fn with_label_logging(mut self, enabled: bool) -> Self {
        self.log_labels = enabled;
        self
    }

    pub fn logs_labels(&self) -> bool {
        self.log_labels
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn label(&self) -> Option<ProgressLabel> {
        self.label
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed(),
            failed: self.failed(),
            label: self.label(),
        }
    }

    /// Count one finished unit. Never moves past the total.
    pub fn increment(&self) {
        let total = self.total;
        let _ = self
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                (c < total).then_some(c + 1)
            });
    }

    /// Bring the counter up to `target` (capped at the total). Never moves it
    /// backwards.
    pub fn advance_to(&self, target: usize) {
        self.completed
            .fetch_max(target.min(self.total), Ordering::SeqCst);
    }
}

impl ProgressSink for StepTracker {
    fn begin(&self, label: &ProgressLabel) {
        if self.log_labels {
            info!("{label}");
        }
        *self.label.lock().unwrap_or_else(PoisonError::into_inner) = Some(label.clone());
    }

    fn step_done(&self, failed: bool) {
        if failed {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
        self.increment();
    }
}

/// Terminal progress bar redrawn from a background thread.
///
/// It only reads the tracker; stopping it (or dropping it) joins the thread.
pub struct ProgressDisplay {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressDisplay {
    pub fn start(tracker: Arc<StepTracker>) -> Self {
        Self::start_with(tracker, ProgressDrawTarget::stderr(), DEFAULT_TICK)
    }

    pub fn start_with(
        tracker: Arc<StepTracker>,
        target: ProgressDrawTarget,
        tick: Duration,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let bar = ProgressBar::with_draw_target(Some(tracker.total() as u64), target);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan.bold} [{bar:30.cyan/blue}] {pos:>2}/{len:2} {msg}",
        ) {
            bar.set_style(
                style
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✓"])
                    .progress_chars("=>-"),
            );
        }

        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            loop {
                let done = flag.load(Ordering::SeqCst);
                draw(&bar, &tracker.snapshot());
                if done {
                    break;
                }
                bar.tick();
                std::thread::sleep(tick);
            }
            bar.finish_and_clear();
        });
        debug!("progress display started");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("progress display thread panicked");
            }
        }
    }
}

fn draw(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    bar.set_position(snapshot.completed as u64);
    if let Some(label) = &snapshot.label {
        bar.set_message(label.to_string());
    }
}

impl Drop for ProgressDisplay {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_success_and_failure_alike() {
        let tracker = StepTracker::new(3);
        tracker.step_done(false);
        tracker.step_done(true);
        assert_eq!(tracker.completed(), 2);
        assert_eq!(tracker.failed(), 1);
    }

    #[test]
    fn never_exceeds_total() {
        let tracker = StepTracker::new(2);
        for _ in 0..5 {
            tracker.step_done(false);
        }
        assert_eq!(tracker.completed(), 2);
        tracker.advance_to(10);
        assert_eq!(tracker.completed(), 2);
    }

    #[test]
    fn advance_is_monotonic() {
        let tracker = StepTracker::new(5);
        tracker.advance_to(3);
        tracker.advance_to(1);
        assert_eq!(tracker.completed(), 3);
    }

    #[test]
    fn label_tracks_latest_begin() {
        let tracker = StepTracker::new(2);
        assert!(tracker.label().is_none());
        tracker.begin(&ProgressLabel::new("Flatpak", "System Apps"));
        tracker.begin(&ProgressLabel::new("Flatpak", "Apps for User: alice"));
        assert_eq!(
            tracker.snapshot().label.unwrap().description,
            "Apps for User: alice"
        );
    }

    #[test]
    fn display_reads_while_tracker_advances() {
        let tracker = Arc::new(StepTracker::new(4));
        let display = ProgressDisplay::start_with(
            Arc::clone(&tracker),
            ProgressDrawTarget::hidden(),
            Duration::from_millis(1),
        );
        for i in 0..4 {
            tracker.begin(&ProgressLabel::new("Distrobox", &format!("step {i}")));
            tracker.step_done(false);
        }
        display.stop();
        assert_eq!(tracker.completed(), 4);
    }

    #[test]
    fn dropping_display_joins_thread() {
        let tracker = Arc::new(StepTracker::new(1));
        let display = ProgressDisplay::start_with(
            Arc::clone(&tracker),
            ProgressDrawTarget::hidden(),
            Duration::from_millis(1),
        );
        drop(display);
        assert_eq!(Arc::strong_count(&tracker), 1);
    }
}
