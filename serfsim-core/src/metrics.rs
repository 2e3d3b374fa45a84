use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Accumulated counters and timings for a simulation run.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct SimMetrics {
    pub total_ticks: u64,
    pub serf_updates: u64,
    pub state_transitions: u64,
    pub fights: u64,
    pub deadlocks_broken: u64,
    pub serfs_lost: u64,
    pub resources_produced: u64,
    pub total_time: Duration,
}

impl SimMetrics {
    pub fn tick_avg_ms(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.total_time.as_secs_f64() * 1000.0 / self.total_ticks as f64
        }
    }

    pub fn updates_per_tick(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.serf_updates as f64 / self.total_ticks as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_averages_handle_zero_ticks() {
        let m = SimMetrics::default();
        assert_eq!(m.tick_avg_ms(), 0.0);
        assert_eq!(m.updates_per_tick(), 0.0);
    }

    #[test]
    fn test_updates_per_tick() {
        let m = SimMetrics {
            total_ticks: 4,
            serf_updates: 10,
            ..Default::default()
        };
        assert_eq!(m.updates_per_tick(), 2.5);
    }
}
