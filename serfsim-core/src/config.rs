use serde::{Deserialize, Serialize};

/// Simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Compute a state checksum every N ticks (0 = disabled).
    pub checksum_frequency: u32,
    /// Game ticks advanced by one call to `Game::update`.
    pub tick_step: u16,
    /// Consecutive blocked steps on a road before deadlock detection runs.
    pub wait_limit_on_road: i32,
    /// Same as `wait_limit_on_road`, for a serf standing on a flag.
    pub wait_limit_on_flag: i32,
    /// Ticks a defeated knight lies on the field before removal.
    pub defeat_delay: i32,
    /// Knight morale used for fights on land the player does not own (0x1000 = neutral).
    pub default_knight_morale: u32,
    /// Number of spiral positions a lost serf scans for a flag.
    pub lost_search_radius: usize,
    /// A geologist stops sampling with probability 1 in N after each sample.
    pub geologist_samples: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            checksum_frequency: 30,
            tick_step: 1,
            wait_limit_on_road: 10,
            wait_limit_on_flag: 50,
            defeat_delay: 255,
            default_knight_morale: 0x1000,
            lost_search_radius: 258,
            geologist_samples: 8,
        }
    }
}

impl SimConfig {
    /// Parse a (possibly partial) JSON config; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.checksum_frequency, 30);
        assert_eq!(config.wait_limit_on_road, 10);
        assert_eq!(config.wait_limit_on_flag, 50);
        assert_eq!(config.defeat_delay, 255);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SimConfig::from_json(r#"{ "tick_step": 4 }"#).unwrap();
        assert_eq!(config.tick_step, 4);
        assert_eq!(config.default_knight_morale, 0x1000);
    }
}
