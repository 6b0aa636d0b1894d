use crate::engine::config::{SimConfig, Tuning};
use crate::node::{NodeKind, NodeRegistry, NodeState};
use anyhow::{Context, Result};
use rand::Rng;
use rand::rngs::StdRng;

/// What the injector did on a tick. The engine turns these into log lines
/// and metric movement; none of them are software errors.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectorEvent {
    Failed { node: String, progress: f64 },
    Recovered { node: String, forced: bool },
    RetryScheduled { node: String },
}

#[derive(Debug, Clone)]
struct PendingRecovery {
    node: String,
    due_tick: u64,
    /// The single guaranteed retry after a failed recovery roll. Bounds
    /// the protocol: probabilistic attempt, then one forced success.
    forced: bool,
}

/// Probabilistic failure overlay for the transformation stage. Fires at
/// most once per run; recovery is delayed, probabilistic, and followed by
/// exactly one forced retry so the run always terminates.
#[derive(Debug)]
pub struct FailureInjector {
    enabled: bool,
    tuning: Tuning,
    attempted: bool,
    pending: Option<PendingRecovery>,
    failures: u32,
    recoveries: u32,
}

impl FailureInjector {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            enabled: config.error_simulation,
            tuning: config.tuning,
            attempted: false,
            pending: None,
            failures: 0,
            recoveries: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempted = false;
        self.pending = None;
        self.failures = 0;
        self.recoveries = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }

    /// True while a failed node is waiting on its recovery attempt.
    pub fn recovery_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Single per-tick entry point. May fail the eligible node or run a due
    /// recovery attempt. Only a broken contract (recovery aimed at a node
    /// that cannot accept it) returns Err.
    pub fn on_tick(
        &mut self,
        tick: u64,
        registry: &mut NodeRegistry,
        rng: &mut StdRng,
    ) -> Result<Vec<InjectorEvent>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let mut events = Vec::new();

        if let Some(pending) = self.pending.clone() {
            if tick >= pending.due_tick {
                events.push(self.attempt_recovery(pending, tick, registry, rng)?);
            }
            return Ok(events);
        }

        if !self.attempted {
            if let Some(event) = self.maybe_fail(tick, registry, rng)? {
                events.push(event);
            }
        }

        Ok(events)
    }

    /// Rolls the failure probability once per run, the first tick the
    /// eligible node is processing with some progress behind it.
    fn maybe_fail(
        &mut self,
        tick: u64,
        registry: &mut NodeRegistry,
        rng: &mut StdRng,
    ) -> Result<Option<InjectorEvent>> {
        let eligible = NodeKind::Transformation.id();
        let (load, progress) = match registry.get(eligible) {
            Some(node) if node.state == NodeState::Processing && node.progress > 0.0 => {
                (node.load, node.progress)
            }
            _ => return Ok(None),
        };

        self.attempted = true;
        if rng.r#gen::<f64>() >= self.tuning.failure_probability {
            return Ok(None);
        }

        registry
            .transition(eligible, NodeState::Failed, load, progress)
            .context("failure injection")?;
        self.failures += 1;
        self.pending = Some(PendingRecovery {
            node: eligible.to_string(),
            due_tick: tick + self.tuning.recovery_delay_ticks,
            forced: false,
        });

        Ok(Some(InjectorEvent::Failed {
            node: eligible.to_string(),
            progress,
        }))
    }

    fn attempt_recovery(
        &mut self,
        pending: PendingRecovery,
        tick: u64,
        registry: &mut NodeRegistry,
        rng: &mut StdRng,
    ) -> Result<InjectorEvent> {
        let load = registry
            .get(&pending.node)
            .map(|n| n.load)
            .with_context(|| format!("recovery target vanished: {}", pending.node))?;

        let succeeded = pending.forced || rng.r#gen::<f64>() < self.tuning.recovery_probability;

        if succeeded {
            // Progress is restored to the failure point by the registry.
            registry
                .transition(&pending.node, NodeState::Processing, load, 0.0)
                .context("recovery resume")?;
            self.recoveries += 1;
            self.pending = None;
            Ok(InjectorEvent::Recovered {
                node: pending.node,
                forced: pending.forced,
            })
        } else {
            // One forced retry, guaranteed to succeed. Never loops.
            self.pending = Some(PendingRecovery {
                node: pending.node.clone(),
                due_tick: tick + self.tuning.recovery_delay_ticks,
                forced: true,
            });
            Ok(InjectorEvent::RetryScheduled { node: pending.node })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::Archetype;
    use rand::SeedableRng;

    fn processing_registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new(Archetype::BasicEtl);
        registry
            .transition("transformation", NodeState::Processing, 35.0, 0.0)
            .unwrap();
        registry
            .transition("transformation", NodeState::Processing, 35.0, 40.0)
            .unwrap();
        registry
    }

    fn config(enabled: bool) -> SimConfig {
        SimConfig::default().with_errors(enabled).clamped()
    }

    #[test]
    fn disabled_injector_never_fails_a_node() {
        let mut registry = processing_registry();
        let mut injector = FailureInjector::new(&config(false));
        let mut rng = StdRng::seed_from_u64(0);
        for tick in 0..200 {
            let events = injector.on_tick(tick, &mut registry, &mut rng).unwrap();
            assert!(events.is_empty());
        }
        assert!(!registry.any_failed());
        assert_eq!(injector.failures(), 0);
    }

    #[test]
    fn fails_at_most_once_per_run() {
        let cfg = SimConfig {
            tuning: Tuning {
                failure_probability: 1.0,
                recovery_probability: 1.0,
                ..Tuning::default()
            },
            ..config(true)
        };
        let mut registry = processing_registry();
        let mut injector = FailureInjector::new(&cfg);
        let mut rng = StdRng::seed_from_u64(3);

        let events = injector.on_tick(0, &mut registry, &mut rng).unwrap();
        assert!(matches!(events[0], InjectorEvent::Failed { .. }));

        // Recovery comes due, the node resumes, and no second failure fires
        // no matter how long the run continues.
        let mut recovered = false;
        for tick in 1..50 {
            for event in injector.on_tick(tick, &mut registry, &mut rng).unwrap() {
                if matches!(event, InjectorEvent::Recovered { .. }) {
                    recovered = true;
                }
                assert!(!matches!(event, InjectorEvent::Failed { .. }) || !recovered);
            }
        }
        assert!(recovered);
        assert_eq!(injector.failures(), 1);
        let node = registry.get("transformation").unwrap();
        assert_eq!(node.state, NodeState::Processing);
        assert_eq!(node.progress, 40.0);
    }

    #[test]
    fn failed_recovery_gets_exactly_one_forced_retry() {
        let cfg = SimConfig {
            tuning: Tuning {
                failure_probability: 1.0,
                recovery_probability: 0.0,
                recovery_delay_ticks: 2,
                ..Tuning::default()
            },
            ..config(true)
        };
        let mut registry = processing_registry();
        let mut injector = FailureInjector::new(&cfg);
        let mut rng = StdRng::seed_from_u64(7);

        let mut saw_retry = false;
        let mut saw_forced_recovery = false;
        for tick in 0..20 {
            for event in injector.on_tick(tick, &mut registry, &mut rng).unwrap() {
                match event {
                    InjectorEvent::RetryScheduled { .. } => {
                        assert!(!saw_retry, "retry scheduled twice");
                        saw_retry = true;
                    }
                    InjectorEvent::Recovered { forced, .. } => {
                        assert!(forced);
                        saw_forced_recovery = true;
                    }
                    InjectorEvent::Failed { .. } => {}
                }
            }
        }
        assert!(saw_retry);
        assert!(saw_forced_recovery);
        assert_eq!(
            registry.get("transformation").unwrap().state,
            NodeState::Processing
        );
    }

    #[test]
    fn same_seed_same_decisions() {
        let cfg = config(true);
        let run = |seed: u64| {
            let mut registry = processing_registry();
            let mut injector = FailureInjector::new(&cfg);
            let mut rng = StdRng::seed_from_u64(seed);
            let mut trace = Vec::new();
            for tick in 0..30 {
                trace.extend(injector.on_tick(tick, &mut registry, &mut rng).unwrap());
            }
            trace
        };
        assert_eq!(run(11), run(11));
    }
}
