use super::{LoadProfile, effective_parallelism, jitter};
use crate::engine::config::SimConfig;
use rand::rngs::StdRng;

/// Stream-mode formulas. Loads ride smooth periodic terms whose phase
/// depends on the stage's position in the pipeline, so early stages
/// (ingestion and partitioning), middle stages (transformations), and late
/// stages (aggregation and output) peak at different times.
#[derive(Debug, Clone, Default)]
pub struct StreamingProfile;

impl StreamingProfile {
    pub fn new() -> Self {
        Self
    }
}

const JITTER_SPREAD: f64 = 0.15;

impl LoadProfile for StreamingProfile {
    fn node_load(
        &self,
        position: usize,
        total: usize,
        config: &SimConfig,
        t: u64,
        rng: &mut StdRng,
    ) -> f64 {
        let t = t as f64;
        let p = position as f64;
        let v = config.data_volume;
        let first_third = total.div_ceil(3);
        let second_third = (2 * total).div_ceil(3);

        let mut load = if position <= first_third {
            // Ingestion and partitioning.
            50.0 + (v / 2.0) * (t / 10.0 + p).sin()
        } else if position <= second_third {
            // Transformations.
            60.0 + (v / 3.0) * (t / 8.0 + p).cos()
        } else {
            // Aggregation and output.
            40.0 + (v / 4.0) * (t / 12.0 + p).sin()
        };

        // A tight backpressure limit throttles the system, which shows up
        // as extra work on every core.
        if config.backpressure_limit < 50.0 {
            load += (50.0 - config.backpressure_limit) * 0.6;
        }

        load *= jitter(rng, JITTER_SPREAD);
        load.clamp(config.tuning.load_floor, config.tuning.load_ceiling)
    }

    fn throughput(&self, config: &SimConfig, avg_load: f64, t: u64) -> f64 {
        let max_throughput = config.data_volume * 20.0;
        let effective = effective_parallelism(config.parallelism, avg_load);
        let base = max_throughput * (effective / config.parallelism as f64);

        let backpressure_factor = (config.backpressure_limit / 100.0).min(1.0);
        let cycle = (t as f64 / 15.0).sin() * max_throughput * 0.1;

        (base * backpressure_factor + cycle).max(0.0)
    }

    fn latency(&self, config: &SimConfig, avg_load: f64, t: u64) -> f64 {
        let _ = t;
        let base = 20.0 + config.data_volume / 10.0;
        let utilization_penalty = (avg_load / 50.0).powi(2);
        let backpressure_penalty = (100.0 / config.backpressure_limit).powi(2).max(1.0);
        base * utilization_penalty * backpressure_penalty
    }

    fn name(&self) -> &str {
        "streaming"
    }

    fn clone_box(&self) -> Box<dyn LoadProfile> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn tight_backpressure_raises_load() {
        let tight = SimConfig::default().with_backpressure(20.0).clamped();
        let loose = SimConfig::default().with_backpressure(90.0).clamped();
        let profile = StreamingProfile::new();

        // Same seed, so the jitter draws line up between the two configs.
        let mut sum_tight = 0.0;
        let mut sum_loose = 0.0;
        for t in 0..50 {
            let mut rng = StdRng::seed_from_u64(42 + t);
            sum_tight += profile.node_load(2, 4, &tight, t, &mut rng);
            let mut rng = StdRng::seed_from_u64(42 + t);
            sum_loose += profile.node_load(2, 4, &loose, t, &mut rng);
        }
        assert!(sum_tight > sum_loose);
    }

    #[test]
    fn throughput_never_negative_and_bounded_by_theory() {
        let cfg = SimConfig::default().clamped();
        let profile = StreamingProfile::new();
        for t in 0..100 {
            let tp = profile.throughput(&cfg, 80.0, t);
            assert!(tp >= 0.0);
            assert!(tp <= cfg.data_volume * 20.0 * 1.1);
        }
    }

    #[test]
    fn latency_grows_with_utilization() {
        let cfg = SimConfig::default().clamped();
        let profile = StreamingProfile::new();
        assert!(profile.latency(&cfg, 90.0, 0) > profile.latency(&cfg, 30.0, 0));
    }
}
