//! Progress reporting hooks for long-running operations.
//!
//! Shuffles, tour boot-up, and chromosome scans can take minutes on a full
//! genome. They report through this trait instead of owning any UI. The
//! callbacks observe; they never feed anything back into the operation.

/// Receiver for progress notifications.
pub trait Progress {
    /// Announce the operation currently running.
    fn set_message(&mut self, _msg: &str) {}

    /// Report completion as a percentage in `0..=100`.
    fn set_progress(&mut self, _percent: u8) {}

    /// Signal that the operation is still alive inside a long loop.
    fn tick(&mut self) {}
}

/// Discards every notification.
pub struct Quiet;

impl Progress for Quiet {}

/// Reports through the `log` facade at Info level.
///
/// Percentages are only logged when they move by at least `step` points, so
/// tight loops do not flood the log.
pub struct LogProgress {
    label: String,
    last_logged: Option<u8>,
    step: u8,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_logged: None,
            step: 10,
        }
    }
}

impl Progress for LogProgress {
    fn set_message(&mut self, msg: &str) {
        self.label = msg.to_string();
        self.last_logged = None;
        log::info!("{}", msg);
    }

    fn set_progress(&mut self, percent: u8) {
        let due = match self.last_logged {
            Some(last) => percent >= last.saturating_add(self.step) || percent == 100,
            None => true,
        };
        if due && self.last_logged != Some(percent) {
            log::info!("{}: {}%", self.label, percent.min(100));
            self.last_logged = Some(percent);
        }
    }
}
