use super::{LoadProfile, jitter};
use crate::engine::config::SimConfig;
use rand::rngs::StdRng;

/// Batch-mode formulas. Work arrives in cycles of `2 * window_size`
/// simulated seconds: a loading phase, a main processing phase, an
/// aggregation phase, and a result-writing lull. The backpressure limit
/// acts as a resource allocation that scales the whole cycle.
#[derive(Debug, Clone, Default)]
pub struct BatchProfile;

impl BatchProfile {
    pub fn new() -> Self {
        Self
    }
}

const JITTER_SPREAD: f64 = 0.1;

fn batch_phase(config: &SimConfig, t: u64) -> f64 {
    let cycle = config.window_size * 2.0;
    (t as f64) % cycle
}

impl LoadProfile for BatchProfile {
    fn node_load(
        &self,
        position: usize,
        total: usize,
        config: &SimConfig,
        t: u64,
        rng: &mut StdRng,
    ) -> f64 {
        let w = config.window_size;
        let phase = batch_phase(config, t);
        let p = position as f64;
        let mid = total as f64 / 2.0;
        let early = position <= 2;
        let late = p > mid;

        let mut load = if phase < w * 0.2 {
            // Loading: early stages carry the input split work.
            80.0 + if early { 15.0 } else { 0.0 } - if late { 20.0 } else { 0.0 }
        } else if phase < w * 0.6 {
            // Main processing: everything busy, hottest in the middle.
            85.0 - (p - mid).abs() * 3.0
        } else if phase < w * 0.9 {
            // Aggregation: work shifts to the tail of the pipeline.
            75.0 - if early { 20.0 } else { 0.0 } + if late { 15.0 } else { 0.0 }
        } else {
            // Writing results out.
            40.0 + if late { 20.0 } else { 0.0 }
        };

        // Resource allocation scales every stage uniformly.
        load *= config.backpressure_limit / 70.0;
        load *= jitter(rng, JITTER_SPREAD);
        load.clamp(config.tuning.load_floor, config.tuning.load_ceiling)
    }

    fn throughput(&self, config: &SimConfig, _avg_load: f64, t: u64) -> f64 {
        let w = config.window_size;
        let phase = batch_phase(config, t);
        let max_throughput = config.data_volume * 20.0;

        let value = if phase < w * 0.2 {
            // Ramp-up while the batch loads.
            max_throughput * 0.5 * (phase / (w * 0.2))
        } else if phase < w * 0.8 {
            max_throughput * 0.8
        } else if phase < w * 0.9 {
            max_throughput * 0.4
        } else {
            // Idle between batches.
            max_throughput * 0.1
        };

        value * (config.backpressure_limit / 100.0)
    }

    fn latency(&self, config: &SimConfig, _avg_load: f64, t: u64) -> f64 {
        let w = config.window_size;
        let phase = batch_phase(config, t);
        let base = 100.0 + config.data_volume * 5.0;

        let value = if phase < w {
            base * (0.5 + phase / w)
        } else {
            base * 0.3
        };

        // Less allocated headroom means slower batches, inverse-linear.
        value * (100.0 / config.backpressure_limit)
    }

    fn name(&self) -> &str {
        "batch"
    }

    fn clone_box(&self) -> Box<dyn LoadProfile> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::Mode;
    use rand::SeedableRng;

    fn batch_config() -> SimConfig {
        SimConfig {
            mode: Mode::Batch,
            ..SimConfig::default()
        }
        .clamped()
    }

    #[test]
    fn throughput_cycles_with_the_batch_window() {
        let cfg = batch_config();
        let profile = BatchProfile::new();
        let w = cfg.window_size as u64;

        let loading = profile.throughput(&cfg, 50.0, 1);
        let main = profile.throughput(&cfg, 50.0, w / 2);
        let idle = profile.throughput(&cfg, 50.0, 2 * w - 1);
        assert!(main > loading);
        assert!(main > idle);
    }

    #[test]
    fn latency_drops_between_batches() {
        let cfg = batch_config();
        let profile = BatchProfile::new();
        let w = cfg.window_size as u64;
        let active = profile.latency(&cfg, 50.0, w - 1);
        let between = profile.latency(&cfg, 50.0, w + 1);
        assert!(active > between);
    }

    #[test]
    fn load_stays_clamped_across_a_full_cycle() {
        let cfg = batch_config();
        let profile = BatchProfile::new();
        let mut rng = StdRng::seed_from_u64(9);
        for t in 0..(cfg.window_size as u64 * 2) {
            for pos in 1..=4 {
                let load = profile.node_load(pos, 4, &cfg, t, &mut rng);
                assert!((cfg.tuning.load_floor..=cfg.tuning.load_ceiling).contains(&load));
            }
        }
    }
}
