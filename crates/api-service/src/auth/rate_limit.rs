//! Fixed-window limiter for key discovery fetches.
//!
//! The window opens at the first attempt and lasts `window`; once it has
//! elapsed the next attempt opens a fresh window with a zeroed counter.
//! Exceeding the ceiling fails immediately instead of waiting.

use std::time::Duration;
use tokio::time::Instant;

/// Counter state for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// When the current window opened. `None` before the first attempt.
    pub window_start: Option<Instant>,

    /// Attempts admitted in the current window. Never exceeds the ceiling.
    pub requests_in_window: u32,
}

/// Fixed-window rate limiter.
///
/// Not internally synchronized; the owner serializes access (the key cache
/// only touches it while holding its refresh lock).
#[derive(Debug)]
pub struct FixedWindowLimiter {
    ceiling: u32,
    window: Duration,
    state: RateLimitState,
}

impl FixedWindowLimiter {
    /// Create a limiter admitting `ceiling` attempts per `window`.
    pub fn new(ceiling: u32, window: Duration) -> Self {
        Self {
            ceiling,
            window,
            state: RateLimitState {
                window_start: None,
                requests_in_window: 0,
            },
        }
    }

    /// Try to admit one attempt at `now`.
    ///
    /// Returns `Err(retry_after)` when the window is full, with the time left
    /// until it closes.
    pub fn try_acquire(&mut self, now: Instant) -> Result<(), Duration> {
        let window_open = self
            .state
            .window_start
            .is_some_and(|start| now.duration_since(start) < self.window);

        if !window_open {
            self.state = RateLimitState {
                window_start: Some(now),
                requests_in_window: 0,
            };
        }

        if self.state.requests_in_window >= self.ceiling {
            let elapsed = self
                .state
                .window_start
                .map_or(Duration::ZERO, |start| now.duration_since(start));
            return Err(self.window.saturating_sub(elapsed));
        }

        self.state.requests_in_window += 1;
        Ok(())
    }

    /// Snapshot of the current counter state.
    pub fn state(&self) -> RateLimitState {
        self.state
    }
}
