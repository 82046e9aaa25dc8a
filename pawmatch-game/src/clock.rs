//! Per-round countdown timer.
//!
//! The clock itself never sleeps; the runtime calls [`SessionClock::tick`] once
//! per second and forwards the remaining seconds to the UI.
use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::{LOG_CLOCK_EXPIRED, MAX_TIMER_SECONDS, TARGET_CLOCK};
use crate::error::GameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockState {
    #[default]
    Idle,
    Running,
    Paused,
    Expired,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionClock {
    state: ClockState,
    remaining: u32,
}

fn check_duration(seconds: u32) -> Result<(), GameError> {
    if seconds > MAX_TIMER_SECONDS {
        return Err(GameError::InvalidDuration {
            seconds,
            max: MAX_TIMER_SECONDS,
        });
    }
    Ok(())
}

impl SessionClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> ClockState {
        self.state
    }

    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running)
    }

    /// Begin counting down from `seconds`. A zero duration expires immediately.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` when `seconds` exceeds 30.
    pub fn start(&mut self, seconds: u32) -> Result<(), GameError> {
        check_duration(seconds)?;
        self.remaining = seconds;
        self.state = if seconds == 0 {
            ClockState::Expired
        } else {
            ClockState::Running
        };
        Ok(())
    }

    /// Load a new duration without starting the countdown.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDuration` when `seconds` exceeds 30.
    pub fn reset(&mut self, seconds: u32) -> Result<(), GameError> {
        check_duration(seconds)?;
        self.remaining = seconds;
        self.state = ClockState::Idle;
        Ok(())
    }

    /// Running -> Paused; anything else is a no-op.
    pub fn pause(&mut self) -> bool {
        if self.state == ClockState::Running {
            self.state = ClockState::Paused;
            return true;
        }
        false
    }

    /// Paused -> Running; anything else is a no-op.
    pub fn resume(&mut self) -> bool {
        if self.state == ClockState::Paused {
            self.state = ClockState::Running;
            return true;
        }
        false
    }

    /// Add time to a running or paused clock, capped at 30 seconds total.
    pub fn add_time(&mut self, seconds: u32) -> bool {
        if !matches!(self.state, ClockState::Running | ClockState::Paused) {
            return false;
        }
        self.remaining = self.remaining.saturating_add(seconds).min(MAX_TIMER_SECONDS);
        true
    }

    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Advance one second. Returns the new remaining value while running,
    /// `None` otherwise. Reaching zero moves the clock to `Expired`.
    pub fn tick(&mut self) -> Option<u32> {
        if self.state != ClockState::Running {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state = ClockState::Expired;
            debug!(target: TARGET_CLOCK, "{LOG_CLOCK_EXPIRED}");
        }
        Some(self.remaining)
    }
}
