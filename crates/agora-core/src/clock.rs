//! World clock and time tracking for the Agora simulation.
//!
//! The clock is the single source of truth for simulated time. Cooldowns,
//! turn pacing, and speech bubbles all read milliseconds derived from the
//! tick counter, never the wall clock, so the whole simulation can be driven
//! deterministically in tests. Persisted timestamps are the wall-clock epoch
//! plus elapsed simulated time.

use chrono::{DateTime, TimeDelta, Utc};

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,

    /// Invalid time configuration (e.g. zero tick interval).
    #[error("invalid time configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Simulated clock advanced once per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldClock {
    /// Current tick number (0 before the first tick).
    tick: u64,

    /// Simulated milliseconds per tick.
    tick_interval_ms: u64,

    /// Wall-clock instant corresponding to tick 0.
    epoch: DateTime<Utc>,
}

impl WorldClock {
    /// Create a clock at tick 0 anchored at `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `tick_interval_ms` is zero.
    pub fn new(tick_interval_ms: u64, epoch: DateTime<Utc>) -> Result<Self, ClockError> {
        if tick_interval_ms == 0 {
            return Err(ClockError::InvalidConfig {
                reason: String::from("tick_interval_ms must be greater than zero"),
            });
        }
        Ok(Self {
            tick: 0,
            tick_interval_ms,
            epoch,
        })
    }

    /// Advance to the next tick and return its number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the counter is exhausted.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    #[cfg(test)]
    pub(crate) const fn set_tick(&mut self, tick: u64) {
        self.tick = tick;
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated milliseconds per tick.
    pub const fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms
    }

    /// Simulated milliseconds elapsed since tick 0.
    pub const fn now_ms(&self) -> u64 {
        self.tick.saturating_mul(self.tick_interval_ms)
    }

    /// Wall-clock timestamp of a simulated instant.
    pub fn wall_time(&self, sim_ms: u64) -> DateTime<Utc> {
        let offset = i64::try_from(sim_ms)
            .ok()
            .and_then(TimeDelta::try_milliseconds)
            .unwrap_or(TimeDelta::MAX);
        self.epoch.checked_add_signed(offset).unwrap_or(self.epoch)
    }

    /// Wall-clock timestamp of the current tick.
    pub fn wall_now(&self) -> DateTime<Utc> {
        self.wall_time(self.now_ms())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_rejected() {
        assert!(matches!(
            WorldClock::new(0, Utc::now()),
            Err(ClockError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn simulated_time_follows_ticks() {
        let epoch = Utc::now();
        let mut clock = WorldClock::new(100, epoch).unwrap();
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.advance().unwrap(), 1);
        clock.advance().unwrap();
        assert_eq!(clock.tick(), 2);
        assert_eq!(clock.now_ms(), 200);
        assert_eq!(clock.wall_now(), epoch + TimeDelta::milliseconds(200));
    }

    #[test]
    fn wall_time_saturates_instead_of_panicking() {
        let epoch = Utc::now();
        let clock = WorldClock::new(100, epoch).unwrap();
        assert_eq!(clock.wall_time(u64::MAX), epoch);
    }
}
