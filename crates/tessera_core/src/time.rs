//! Deterministic time system
//!
//! Fixed tick rate (60Hz unless configured otherwise). Wall-clock time never
//! feeds into the simulation.

use std::time::Duration;

/// Default simulation tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;

/// Simulation time tracker
#[derive(Debug, Clone)]
pub struct SimulationTime {
    tick_count: u64,
    tick_duration: Duration,
    accumulated_time: Duration,
}

impl SimulationTime {
    pub fn new() -> Self {
        Self::with_rate(TICK_RATE_HZ)
    }

    /// # Panics
    /// If `rate_hz` is zero.
    pub fn with_rate(rate_hz: u32) -> Self {
        assert!(rate_hz > 0, "tick rate must be positive");
        Self {
            tick_count: 0,
            tick_duration: Duration::from_secs(1) / rate_hz,
            accumulated_time: Duration::ZERO,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Tick length in seconds, for integrating per-second quantities.
    pub fn delta_seconds(&self) -> f32 {
        self.tick_duration.as_secs_f32()
    }

    pub fn advance_tick(&mut self) {
        self.tick_count += 1;
        self.accumulated_time += self.tick_duration;
    }

    pub fn total_time(&self) -> Duration {
        self.accumulated_time
    }
}

impl Default for SimulationTime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate_fixed_duration() {
        let mut time = SimulationTime::with_rate(50);
        for _ in 0..10 {
            time.advance_tick();
        }
        assert_eq!(time.tick_count(), 10);
        assert_eq!(time.tick_duration(), Duration::from_millis(20));
        assert_eq!(time.total_time(), Duration::from_millis(200));
    }

    #[test]
    fn default_runs_at_sixty_hertz() {
        let time = SimulationTime::default();
        assert_eq!(time.tick_duration(), Duration::from_secs(1) / 60);
    }
}
