use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Stream,
    Batch,
}

impl Mode {
    pub const fn profile_name(&self) -> &'static str {
        match self {
            Mode::Stream => "stream",
            Mode::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Archetype {
    BasicEtl,
    BatchProcessing,
    RealtimeAnalytics,
    PredictiveAnalytics,
}

/// Numeric knobs the formulas and the failure injector read. The defaults
/// are presentation-tuning values, not contracts; only their shape
/// (bounded, monotonic, bounded retry) is load-bearing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tuning {
    pub failure_probability: f64,
    pub recovery_probability: f64,
    pub recovery_delay_ticks: u64,
    pub error_rate_spike: f64,
    pub load_floor: f64,
    pub load_ceiling: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            failure_probability: 0.4,
            recovery_probability: 0.7,
            recovery_delay_ticks: 4,
            error_rate_spike: 35.0,
            load_floor: 10.0,
            load_ceiling: 98.0,
        }
    }
}

impl Tuning {
    fn clamped(mut self) -> Self {
        self.failure_probability = self.failure_probability.clamp(0.0, 1.0);
        self.recovery_probability = self.recovery_probability.clamp(0.0, 1.0);
        self.recovery_delay_ticks = self.recovery_delay_ticks.clamp(1, 100);
        self.error_rate_spike = self.error_rate_spike.clamp(0.0, 100.0);
        self.load_floor = self.load_floor.clamp(0.0, 100.0);
        self.load_ceiling = self.load_ceiling.clamp(self.load_floor, 100.0);
        self
    }
}

/// Immutable-per-run snapshot of user-chosen parameters. Out-of-range
/// values are clamped on the way in, never rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub name: String,
    pub mode: Mode,
    pub archetype: Archetype,
    /// GB per batch or MB/s for streaming.
    pub data_volume: f64,
    pub parallelism: u32,
    pub partitions: u32,
    /// Seconds for streaming windows, minutes for batch intervals.
    pub window_size: f64,
    /// Percentage; doubles as resource allocation in batch mode.
    pub backpressure_limit: f64,
    pub compression_level: u32,
    pub caching_enabled: bool,
    pub error_simulation: bool,
    pub speed_multiplier: f64,
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,
    /// Safety guard so a stalled configuration still terminates.
    pub max_ticks: u64,
    pub metric_history: usize,
    pub log_history: usize,
    /// Fixed seed makes a run fully reproducible; None draws from entropy.
    pub seed: Option<u64>,
    pub tuning: Tuning,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "pipeline".to_string(),
            mode: Mode::Stream,
            archetype: Archetype::BasicEtl,
            data_volume: 50.0,
            parallelism: 2,
            partitions: 4,
            window_size: 10.0,
            backpressure_limit: 70.0,
            compression_level: 3,
            caching_enabled: true,
            error_simulation: false,
            speed_multiplier: 1.0,
            tick_interval: Duration::from_millis(500),
            max_ticks: 300,
            metric_history: 30,
            log_history: 15,
            seed: None,
            tuning: Tuning::default(),
        }
    }
}

impl SimConfig {
    /// Applies every documented bound. Called once when a run is created,
    /// after which the configuration is read-only.
    pub fn clamped(mut self) -> Self {
        self.data_volume = self.data_volume.clamp(10.0, 200.0);
        self.parallelism = self.parallelism.clamp(1, 16);
        self.partitions = self.partitions.clamp(1, 16);
        self.window_size = self.window_size.clamp(1.0, 60.0);
        self.backpressure_limit = self.backpressure_limit.clamp(20.0, 100.0);
        self.compression_level = self.compression_level.clamp(1, 5);
        self.speed_multiplier = self.speed_multiplier.clamp(1.0, 3.0);
        self.max_ticks = self.max_ticks.clamp(1, 10_000);
        self.metric_history = self.metric_history.clamp(1, 1_000);
        self.log_history = self.log_history.clamp(1, 1_000);
        self.tuning = self.tuning.clamped();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.data_volume = volume;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_backpressure(mut self, limit: f64) -> Self {
        self.backpressure_limit = limit;
        self
    }

    pub fn with_errors(mut self, enabled: bool) -> Self {
        self.error_simulation = enabled;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
