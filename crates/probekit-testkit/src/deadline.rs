//! Nested deadline windows
//!
//! TigerStyle: Explicit stack with a depth limit; every push is paired with
//! a pop by the caller's drop guard.

use probekit_core::constants::DEADLINE_STACK_DEPTH_MAX;
use probekit_core::error::{Error, Result};
use std::time::{Duration, Instant};

/// A `[min, max]` window opened at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineFrame {
    pub min: Duration,
    pub max: Duration,
    pub start: Instant,
}

impl DeadlineFrame {
    pub fn new(min: Duration, max: Duration, start: Instant) -> Self {
        debug_assert!(min <= max, "deadline min must not exceed max");
        Self { min, max, start }
    }

    /// Instant the window closes; `None` when it never does
    pub fn end(&self) -> Option<Instant> {
        self.start.checked_add(self.max)
    }

    /// Time left at `now`, zero once the window closed
    pub fn remaining_at(&self, now: Instant) -> Duration {
        match self.end() {
            Some(end) => end.saturating_duration_since(now),
            None => Duration::MAX,
        }
    }
}

/// Stack of open windows; the top one is the active deadline
#[derive(Debug, Default)]
pub struct DeadlineStack {
    frames: Vec<DeadlineFrame>,
}

impl DeadlineStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: DeadlineFrame) -> Result<()> {
        if self.frames.len() >= DEADLINE_STACK_DEPTH_MAX {
            return Err(Error::internal(format!(
                "deadline stack depth limit {} reached",
                DEADLINE_STACK_DEPTH_MAX
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<DeadlineFrame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&DeadlineFrame> {
        self.frames.last()
    }

    /// Time left in the active window, if any
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.top().map(|frame| frame.remaining_at(now))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
