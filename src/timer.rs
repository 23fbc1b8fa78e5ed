//! Talk timer shown on the presenter window.

use std::time::{Duration, Instant};

/// Pausable stopwatch with an optional target talk length.
///
/// Starts paused; the first unpause begins the talk.
#[derive(Debug)]
pub struct TalkTimer {
    accumulated: Duration,
    running_since: Option<Instant>,
    target: Option<Duration>,
}

impl TalkTimer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            accumulated: Duration::ZERO,
            running_since: None,
            target: None,
        }
    }

    /// Planned talk length, used for the overrun indicator
    pub fn set_target(&mut self, target: Option<Duration>) {
        self.target = target;
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    pub fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    pub fn toggle(&mut self) {
        if self.is_running() {
            self.pause();
        } else {
            self.start();
        }
    }

    /// Back to zero, paused
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.running_since = None;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Elapsed time has passed the target
    #[must_use]
    pub fn is_overrun(&self) -> bool {
        self.target.is_some_and(|target| self.elapsed() > target)
    }

    fn start_at(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    fn pause_at(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    fn elapsed_at(&self, now: Instant) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + now.saturating_duration_since(since),
            None => self.accumulated,
        }
    }
}

impl Default for TalkTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// h:mm:ss if an hour has passed, otherwise mm:ss
#[must_use]
pub fn format_clock(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
