pub mod batch;
pub mod streaming;

use crate::engine::config::SimConfig;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::fmt;

/// Per-mode load/throughput/latency math. Profiles are pure in everything
/// except the jitter term, which draws from the run's seeded RNG so a run
/// is reproducible end to end.
pub trait LoadProfile: Send + Sync + fmt::Debug {
    /// Load for the node at `position` (1-based) of `total` pipeline
    /// stages, at simulated second `t`. Always within the configured
    /// floor/ceiling for an in-bounds config.
    fn node_load(
        &self,
        position: usize,
        total: usize,
        config: &SimConfig,
        t: u64,
        rng: &mut StdRng,
    ) -> f64;

    /// Aggregate throughput given the current average node load.
    fn throughput(&self, config: &SimConfig, avg_load: f64, t: u64) -> f64;

    /// End-to-end latency given the current average node load. Monotone
    /// non-increasing in the backpressure limit.
    fn latency(&self, config: &SimConfig, avg_load: f64, t: u64) -> f64;

    fn name(&self) -> &str;

    fn clone_box(&self) -> Box<dyn LoadProfile>;
}

pub struct ProfileRegistry {
    profiles: HashMap<String, Box<dyn Fn() -> Box<dyn LoadProfile> + Send + Sync>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            profiles: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register("stream", || Box::new(streaming::StreamingProfile::new()));
        self.register("streaming", || Box::new(streaming::StreamingProfile::new()));
        self.register("batch", || Box::new(batch::BatchProfile::new()));
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn LoadProfile> + Send + Sync + 'static,
    {
        self.profiles.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn LoadProfile>> {
        self.profiles.get(&name.to_lowercase()).map(|f| f())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn global() -> &'static ProfileRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<ProfileRegistry> = OnceLock::new();
        REGISTRY.get_or_init(ProfileRegistry::new)
    }
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Multiplicative jitter in `1 ± spread`, bounded so the periodic terms
/// stay visible underneath it.
pub fn jitter(rng: &mut StdRng, spread: f64) -> f64 {
    1.0 + rng.gen_range(-spread..=spread)
}

/// Weighted CPU / IO / memory pressure, capped at 100. Monotone increasing
/// in volume and window size, decreasing in backpressure headroom.
pub fn system_load(config: &SimConfig, avg_load: f64) -> f64 {
    let cpu = avg_load * 0.7;
    let io = (config.data_volume / 200.0) * 30.0;
    let memory = memory_pressure(config);
    (cpu + io + memory).min(100.0)
}

fn memory_pressure(config: &SimConfig) -> f64 {
    (config.window_size / 20.0) * 10.0 + ((100.0 - config.backpressure_limit) / 100.0) * 20.0
}

/// Memory usage tracks window size, backpressure headroom, and a share of
/// the working load.
pub fn memory_usage(config: &SimConfig, avg_load: f64) -> f64 {
    (20.0 + memory_pressure(config) + avg_load * 0.4).min(100.0)
}

pub fn cache_hit_ratio(config: &SimConfig, rng: &mut StdRng) -> f64 {
    if config.caching_enabled {
        rng.gen_range(70.0..100.0)
    } else {
        0.0
    }
}

/// Compression ratio improves as more of the pipeline has run the data
/// through, scaled by the configured level.
pub fn compression_ratio(config: &SimConfig, fraction_complete: f64) -> f64 {
    config.compression_level as f64 * (1.5 + fraction_complete.clamp(0.0, 1.0))
}

/// How much of the nominal parallelism is actually doing work.
pub fn effective_parallelism(parallelism: u32, avg_load: f64) -> f64 {
    parallelism as f64 * (avg_load / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::Mode;
    use proptest::prelude::*;
    use rand::SeedableRng;

    fn config(volume: f64, parallelism: u32, window: f64, limit: f64, mode: Mode) -> SimConfig {
        SimConfig {
            mode,
            data_volume: volume,
            parallelism,
            window_size: window,
            backpressure_limit: limit,
            ..SimConfig::default()
        }
        .clamped()
    }

    #[test]
    fn registry_resolves_both_modes() {
        let registry = ProfileRegistry::global();
        assert!(registry.create("stream").is_some());
        assert!(registry.create("BATCH").is_some());
        assert!(registry.create("mapreduce").is_none());
    }

    #[test]
    fn cache_ratio_zero_when_disabled() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = SimConfig {
            caching_enabled: false,
            ..SimConfig::default()
        };
        assert_eq!(cache_hit_ratio(&cfg, &mut rng), 0.0);
        let cfg = SimConfig::default();
        let ratio = cache_hit_ratio(&cfg, &mut rng);
        assert!((70.0..100.0).contains(&ratio));
    }

    #[test]
    fn system_load_caps_at_100() {
        let cfg = config(200.0, 16, 60.0, 20.0, Mode::Stream);
        assert!(system_load(&cfg, 98.0) <= 100.0);
    }

    proptest! {
        /// Loads stay inside [floor, ceiling] for any in-bounds config on
        /// any tick, both modes, any pipeline position.
        #[test]
        fn node_load_respects_clamp_range(
            volume in 10.0f64..200.0,
            parallelism in 1u32..=16,
            window in 1.0f64..60.0,
            limit in 20.0f64..=100.0,
            t in 0u64..500,
            position in 1usize..=5,
            seed in 0u64..1000,
            is_stream in any::<bool>(),
        ) {
            let mode = if is_stream { Mode::Stream } else { Mode::Batch };
            let cfg = config(volume, parallelism, window, limit, mode);
            let profile = ProfileRegistry::global()
                .create(cfg.mode.profile_name())
                .unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let load = profile.node_load(position, 5, &cfg, t, &mut rng);
            prop_assert!(load >= cfg.tuning.load_floor - 1e-9);
            prop_assert!(load <= cfg.tuning.load_ceiling + 1e-9);
        }

        /// Tightening the backpressure limit never lowers streaming
        /// latency, for any load level and tick.
        #[test]
        fn stream_latency_monotone_in_backpressure(
            volume in 10.0f64..200.0,
            avg_load in 10.0f64..98.0,
            t in 0u64..500,
            low in 20.0f64..99.0,
            delta in 1.0f64..80.0,
        ) {
            let high = (low + delta).min(100.0);
            let tight = config(volume, 4, 10.0, low, Mode::Stream);
            let loose = config(volume, 4, 10.0, high, Mode::Stream);
            let profile = streaming::StreamingProfile::new();
            prop_assert!(
                profile.latency(&tight, avg_load, t) >= profile.latency(&loose, avg_load, t)
            );
        }

        /// Same shape holds for batch mode, where the limit acts as a
        /// resource allocation.
        #[test]
        fn batch_latency_monotone_in_allocation(
            volume in 10.0f64..200.0,
            avg_load in 10.0f64..98.0,
            t in 0u64..500,
            low in 20.0f64..99.0,
            delta in 1.0f64..80.0,
        ) {
            let high = (low + delta).min(100.0);
            let tight = config(volume, 4, 10.0, low, Mode::Batch);
            let loose = config(volume, 4, 10.0, high, Mode::Batch);
            let profile = batch::BatchProfile::new();
            prop_assert!(
                profile.latency(&tight, avg_load, t) >= profile.latency(&loose, avg_load, t)
            );
        }

        /// More volume never lowers system load, all else fixed.
        #[test]
        fn system_load_monotone_in_volume(
            small in 10.0f64..100.0,
            delta in 0.0f64..100.0,
            avg_load in 10.0f64..98.0,
        ) {
            let lo = config(small, 4, 10.0, 70.0, Mode::Stream);
            let hi = config(small + delta, 4, 10.0, 70.0, Mode::Stream);
            prop_assert!(system_load(&hi, avg_load) >= system_load(&lo, avg_load));
        }
    }
}
