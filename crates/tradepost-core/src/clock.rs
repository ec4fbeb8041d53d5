//! Logical world clock.
//!
//! Every deadline in the market is measured in ticks of this clock, never in
//! wall-clock time, so a run replays identically under test. The runner
//! advances the clock once per tick; the board and the town AIs read it
//! through the [`Clock`] trait.

use tradepost_market::Clock;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// Tick counter for one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldClock {
    /// Current tick number (0 before the first tick runs).
    tick: u64,
}

impl WorldClock {
    /// Create a clock at tick 0.
    pub const fn new() -> Self {
        Self { tick: 0 }
    }

    /// Create a clock at a restored tick.
    pub const fn at(tick: u64) -> Self {
        Self { tick }
    }

    /// Advance the clock by one tick. Returns the new tick number.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TickOverflow`] if the tick counter would exceed
    /// `u64::MAX`.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Return the current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }
}

impl Clock for WorldClock {
    fn now(&self) -> u64 {
        self.tick
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn advance_increments() {
        let mut clock = WorldClock::new();
        assert_eq!(clock.advance().unwrap(), 1);
        assert_eq!(clock.advance().unwrap(), 2);
        assert_eq!(clock.now(), 2);
    }

    #[test]
    fn advance_overflow_is_an_error() {
        let mut clock = WorldClock::at(u64::MAX);
        assert_eq!(clock.advance(), Err(ClockError::TickOverflow));
        assert_eq!(clock.tick(), u64::MAX);
    }
}
