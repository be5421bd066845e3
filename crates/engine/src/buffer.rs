use std::time::{Duration, Instant};

use canvas_core::Version;

pub const DEFAULT_SETTLE_WINDOW: Duration = Duration::from_millis(500);

/// Cancellable quiet-period timer. Every `reset` pushes the deadline out by
/// one full window; nothing ever sleeps on it.
#[derive(Debug, Clone)]
pub struct SettleTimer {
    window: Duration,
    deadline: Option<Instant>,
}

impl SettleTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn reset(&mut self, now: Instant) {
        self.deadline = Some(now + self.window);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn has_elapsed(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now >= deadline)
    }
}

/// The human editor's in-progress text, tracked against the version it was
/// derived from.
#[derive(Debug, Clone)]
pub struct LocalEditBuffer {
    baseline: Version,
    content: String,
    timer: SettleTimer,
}

impl LocalEditBuffer {
    pub fn new(baseline: Version, window: Duration) -> Self {
        Self {
            content: baseline.content.clone(),
            baseline,
            timer: SettleTimer::new(window),
        }
    }

    pub fn baseline(&self) -> &Version {
        &self.baseline
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// True when the buffer holds text the baseline does not.
    pub fn is_dirty(&self) -> bool {
        self.content != self.baseline.content
    }

    pub fn settle_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    pub fn edit(&mut self, content: impl Into<String>, now: Instant) {
        self.content = content.into();
        self.timer.reset(now);
    }

    /// Content eligible for persistence once the quiet window has passed.
    /// A buffer that settles back onto its baseline is disarmed instead.
    pub fn take_settled(&mut self, now: Instant) -> Option<String> {
        if !self.timer.has_elapsed(now) {
            return None;
        }
        self.force_settle()
    }

    /// Settle immediately regardless of the timer.
    pub fn force_settle(&mut self) -> Option<String> {
        if self.is_dirty() {
            Some(self.content.clone())
        } else {
            self.timer.cancel();
            None
        }
    }

    /// The settled content was handled without a new baseline.
    pub fn acknowledge(&mut self) {
        self.timer.cancel();
    }

    /// The settled content was persisted as `version`.
    pub fn commit(&mut self, version: Version) {
        self.baseline = version;
        self.timer.cancel();
    }

    /// Adopt an externally produced baseline if there is nothing unsaved.
    /// Returns false, leaving the buffer untouched, when it is dirty.
    pub fn adopt_baseline(&mut self, version: Version) -> bool {
        if self.is_dirty() {
            return false;
        }
        self.reset_to(version);
        true
    }

    /// Replace both baseline and content, dropping any pending edit.
    pub fn reset_to(&mut self, version: Version) {
        self.content = version.content.clone();
        self.baseline = version;
        self.timer.cancel();
    }

    /// Throw away the pending edit.
    pub fn discard(&mut self) {
        self.content = self.baseline.content.clone();
        self.timer.cancel();
    }
}
