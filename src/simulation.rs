use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::telemetry::{TelemetryFrame, TELEMETRY_CHANNELS};

// Simulated channels are whole numbers in [min, max)
const DEFAULT_MIN_VALUE: u32 = 0;
const DEFAULT_MAX_VALUE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub min_value: u32,
    /// Exclusive upper bound.
    pub max_value: u32,
    /// Fixed seed for reproducible output; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_value: DEFAULT_MIN_VALUE,
            max_value: DEFAULT_MAX_VALUE,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationStats {
    pub frames_generated: u32,
    pub last_generated_at: Option<u64>,
}

/// Synthetic telemetry source used while no genuine data is held.
#[derive(Debug)]
pub struct FallbackGenerator {
    config: SimulationConfig,
    rng: StdRng,
    stats: SimulationStats,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self::new_with_config(SimulationConfig::default())
    }

    pub fn new_with_config(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            config,
            rng,
            stats: SimulationStats::default(),
        }
    }

    /// Draw a frame whose channels are independent whole numbers in the configured range.
    pub fn generate(&mut self, current_time: u64) -> TelemetryFrame {
        let span = self.config.max_value.saturating_sub(self.config.min_value).max(1);

        let mut values = [0.0f32; TELEMETRY_CHANNELS];
        for value in &mut values {
            *value = (self.config.min_value + self.rng.random_range(0..span)) as f32;
        }

        self.stats.frames_generated = self.stats.frames_generated.saturating_add(1);
        self.stats.last_generated_at = Some(current_time);

        TelemetryFrame::new(values)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn get_config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn get_stats(&self) -> &SimulationStats {
        &self.stats
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}
