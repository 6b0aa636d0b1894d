pub mod config;
pub use config::{Archetype, Mode, SimConfig, Tuning};

use crate::failure::{FailureInjector, InjectorEvent};
use crate::formulas::{self, LoadProfile, ProfileRegistry};
use crate::history::{LogEntry, Severity};
use crate::metrics::{MetricSnapshot, MetricsCollector};
use crate::node::{Node, NodeRegistry, NodeState};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Failed)
    }
}

/// Immutable point-in-time copy of engine state handed to subscribers and
/// polling callers. Holding one never blocks or observes later mutation.
#[derive(Debug, Clone, Serialize)]
pub struct RunSnapshot {
    pub tick: u64,
    pub status: RunStatus,
    pub nodes: Vec<Node>,
    pub metrics: Option<MetricSnapshot>,
    pub logs: Vec<LogEntry>,
}

/// The synchronous core of one run: configuration, node registry, failure
/// injector, seeded RNG, and bounded history. `tick()` is the single
/// mutation entry point; the scheduler (or a test) drives it.
pub struct Run {
    config: SimConfig,
    registry: NodeRegistry,
    injector: FailureInjector,
    profile: Box<dyn LoadProfile>,
    metrics: MetricsCollector,
    rng: StdRng,
    tick: u64,
    status: RunStatus,
    current: usize,
    data_processed: f64,
    error_rate: f64,
    stage_tech_logged: bool,
}

impl Run {
    pub fn new(config: SimConfig) -> Result<Self> {
        let config = config.clamped();
        let profile = ProfileRegistry::global()
            .create(config.mode.profile_name())
            .ok_or_else(|| anyhow!("no load profile registered for {:?}", config.mode))?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let registry = NodeRegistry::new(config.archetype);
        let metrics = MetricsCollector::new(config.metric_history, config.log_history);
        let injector = FailureInjector::new(&config);

        Ok(Self {
            config,
            registry,
            injector,
            profile,
            metrics,
            rng,
            tick: 0,
            status: RunStatus::Idle,
            current: 0,
            data_processed: 0.0,
            error_rate: 0.0,
            stage_tech_logged: false,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn data_processed(&self) -> f64 {
        self.data_processed
    }

    pub fn failures(&self) -> u32 {
        self.injector.failures()
    }

    pub fn recoveries(&self) -> u32 {
        self.injector.recoveries()
    }

    /// Puts the run back to its pre-start state: nodes IDLE, buffers
    /// cleared, RNG reseeded so a re-run with a fixed seed replays exactly.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.injector.reset();
        self.metrics.reset();
        self.rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.tick = 0;
        self.status = RunStatus::Idle;
        self.current = 0;
        self.data_processed = 0.0;
        self.error_rate = 0.0;
        self.stage_tech_logged = false;
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            tick: self.tick,
            status: self.status,
            nodes: self.registry.snapshot(),
            metrics: self.metrics.latest(),
            logs: self.metrics.logs(),
        }
    }

    /// Advances simulated time by one unit: stage progression, failure
    /// injection, per-node loads, aggregate metrics, history append. Errors
    /// out only on contract violations, never on simulated failures.
    pub fn tick(&mut self) -> Result<RunStatus> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        self.tick += 1;

        if self.status == RunStatus::Idle {
            self.status = RunStatus::Running;
            self.start_stage(0)?;
        }

        self.advance_current_stage()?;
        self.run_injector()?;
        self.update_loads();
        self.aggregate();

        if self.status == RunStatus::Running && self.tick >= self.config.max_ticks {
            self.metrics.log(
                self.tick,
                Severity::Warning,
                format!("Run aborted after {} ticks without completing", self.tick),
            );
            self.status = RunStatus::Failed;
        }

        Ok(self.status)
    }

    fn start_stage(&mut self, index: usize) -> Result<()> {
        self.current = index;
        self.stage_tech_logged = false;
        let kind = self.registry.nodes()[index].kind;
        let id = kind.id().to_string();
        self.registry
            .transition(&id, NodeState::Processing, 0.0, 0.0)?;

        let message = if index == 0 {
            format!(
                "{}: {} GB",
                kind.start_message(),
                self.config.data_volume as u64
            )
        } else {
            kind.start_message().to_string()
        };
        self.metrics.log(self.tick, Severity::Info, message);
        debug!(stage = %id, tick = self.tick, "stage started");
        Ok(())
    }

    /// Progress step per tick for a stage whose total work is its share of
    /// the data volume, scaled by processing speed and parallelism.
    fn progress_step(&self, work: f64) -> f64 {
        let power = self.config.speed_multiplier * self.config.parallelism as f64 * 0.5;
        (1000.0 * power / work.max(1.0)).clamp(0.5, 100.0)
    }

    fn advance_current_stage(&mut self) -> Result<()> {
        let node = &self.registry.nodes()[self.current];
        if node.state != NodeState::Processing {
            // A failed stage stalls the pipeline until recovery brings it
            // back; nothing downstream moves.
            return Ok(());
        }

        let kind = node.kind;
        let id = kind.id().to_string();
        let load = node.load;
        let work = self.config.data_volume * kind.load_share();
        let progress = node.progress + self.progress_step(work);

        if progress < 100.0 {
            self.registry
                .transition(&id, NodeState::Processing, load, progress)?;
            let prev_fraction = self.completed_fraction();
            let stage_span = kind.processed_fraction() - prev_fraction;
            self.data_processed =
                self.config.data_volume * (prev_fraction + stage_span * progress / 100.0);
            if !self.stage_tech_logged && progress >= 33.0 {
                self.stage_tech_logged = true;
                let line = self.tech_log_line(&id);
                self.metrics.log(self.tick, Severity::Tech, line);
            }
            return Ok(());
        }

        self.registry
            .transition(&id, NodeState::Complete, load, 100.0)?;
        self.data_processed = self.config.data_volume * kind.processed_fraction();
        debug!(stage = %id, tick = self.tick, "stage complete");

        if kind == crate::node::NodeKind::Analytics
            && self.config.archetype == Archetype::PredictiveAnalytics
        {
            self.metrics
                .log(self.tick, Severity::Info, "Training machine learning models...");
            self.metrics
                .log(self.tick, Severity::Success, "Models trained successfully");
        }

        if self.current + 1 < self.registry.len() {
            self.start_stage(self.current + 1)?;
        } else {
            self.data_processed = self.config.data_volume;
            self.status = RunStatus::Complete;
            self.metrics.log(
                self.tick,
                Severity::Success,
                "Data pipeline execution complete!",
            );
            info!(ticks = self.tick, "pipeline run complete");
        }
        Ok(())
    }

    /// Fraction of the volume accounted for by stages before the current
    /// one.
    fn completed_fraction(&self) -> f64 {
        if self.current == 0 {
            0.0
        } else {
            self.registry.nodes()[self.current - 1]
                .kind
                .processed_fraction()
        }
    }

    fn tech_log_line(&mut self, stage: &str) -> String {
        match self.rng.gen_range(0..4u32) {
            0 => format!(
                "Optimizing {} partitions: {} partitions active",
                stage, self.config.partitions
            ),
            1 => format!(
                "Buffer pool utilization at {}%",
                self.rng.gen_range(60..100)
            ),
            2 => format!(
                "Thread pool size: {} active workers",
                self.config.parallelism * 2
            ),
            _ => {
                if self.config.caching_enabled {
                    format!("Cache hit ratio: {}%", self.rng.gen_range(70..100))
                } else {
                    "Caching disabled".to_string()
                }
            }
        }
    }

    fn run_injector(&mut self) -> Result<()> {
        let events = self
            .injector
            .on_tick(self.tick, &mut self.registry, &mut self.rng)?;
        for event in events {
            match event {
                InjectorEvent::Failed { node, progress } => {
                    self.error_rate = self.config.tuning.error_rate_spike;
                    self.metrics.log(
                        self.tick,
                        Severity::Error,
                        "ERROR: Transformation job failed - insufficient memory",
                    );
                    self.metrics.log(
                        self.tick,
                        Severity::Warning,
                        "Attempting transformation recovery...",
                    );
                    debug!(%node, progress, "failure injected");
                }
                InjectorEvent::RetryScheduled { node } => {
                    self.metrics.log(
                        self.tick,
                        Severity::Error,
                        "ERROR: Recovery failed - restarting transformation job",
                    );
                    debug!(%node, "forced retry scheduled");
                }
                InjectorEvent::Recovered { node, forced } => {
                    let message = if forced {
                        "Transformation restart successful - resuming processing"
                    } else {
                        "Recovery successful - resuming transformation"
                    };
                    self.metrics.log(self.tick, Severity::Success, message);
                    debug!(%node, forced, "stage recovered");
                }
            }
        }
        Ok(())
    }

    fn update_loads(&mut self) {
        let total = self.registry.len();
        for index in 0..total {
            let node = &self.registry.nodes()[index];
            if node.state != NodeState::Processing {
                continue;
            }
            let load =
                self.profile
                    .node_load(index + 1, total, &self.config, self.tick, &mut self.rng);
            self.registry.nodes_mut()[index].load = load;
        }
    }

    fn aggregate(&mut self) {
        let avg_load = self.registry.avg_active_load();
        let throughput = self.profile.throughput(&self.config, avg_load, self.tick);
        let mut latency = self.profile.latency(&self.config, avg_load, self.tick);
        if self.registry.any_failed() {
            latency *= 1.5;
        }

        // The spike decays once the failed stage is back in service.
        if !self.registry.any_failed() && self.error_rate > 0.0 {
            self.error_rate *= 0.5;
            if self.error_rate < 0.5 {
                self.error_rate = 0.0;
            }
        }

        let system_load = formulas::system_load(&self.config, avg_load);
        let fraction = self.data_processed / self.config.data_volume;
        let snapshot = MetricSnapshot {
            tick: self.tick,
            throughput,
            latency,
            error_rate: self.error_rate,
            cpu_utilization: avg_load,
            memory_usage: formulas::memory_usage(&self.config, avg_load),
            system_load,
            cache_hit_ratio: formulas::cache_hit_ratio(&self.config, &mut self.rng),
            data_processed: self.data_processed,
            compression_ratio: formulas::compression_ratio(&self.config, fraction),
        };
        self.metrics.record(snapshot);

        // Sustained pressure erodes node health; slack lets it recover.
        for node in self.registry.nodes_mut() {
            if system_load > 90.0 {
                node.health = (node.health - 2.0).max(50.0);
            } else if system_load < 20.0 {
                node.health = (node.health + 5.0).min(100.0);
            }
        }
    }
}

type Subscriber = Arc<dyn Fn(&RunSnapshot) + Send + Sync>;

struct Scheduler {
    token: Option<CancellationToken>,
    generation: u64,
}

struct HandleInner {
    run: Mutex<Run>,
    subscribers: Mutex<Vec<Subscriber>>,
    scheduler: Mutex<Scheduler>,
    tick_interval: Duration,
}

/// Creates a run around the given configuration, ready to start.
pub fn create_run(config: SimConfig) -> Result<RunHandle> {
    let run = Run::new(config)?;
    let tick_interval = run.config().tick_interval;
    Ok(RunHandle {
        inner: Arc::new(HandleInner {
            run: Mutex::new(run),
            subscribers: Mutex::new(Vec::new()),
            scheduler: Mutex::new(Scheduler {
                token: None,
                generation: 0,
            }),
            tick_interval,
        }),
    })
}

/// Owning handle over a run and its scheduler task. Ticking happens at a
/// fixed wall-clock cadence on the tokio runtime; `stop()` (or dropping the
/// handle) cancels the pending tick so nothing fires after teardown.
pub struct RunHandle {
    inner: Arc<HandleInner>,
}

impl RunHandle {
    /// Begins ticking. A no-op while already running; restarting after a
    /// finished run resets it first.
    pub fn start(&self) {
        let mut scheduler = self.inner.scheduler.lock();
        if scheduler.token.is_some() {
            return;
        }

        {
            let mut run = self.inner.run.lock();
            if run.status().is_terminal() {
                run.reset();
            }
        }

        scheduler.generation += 1;
        let generation = scheduler.generation;
        let token = CancellationToken::new();
        scheduler.token = Some(token.clone());
        drop(scheduler);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut ticker = interval(inner.tick_interval);
            // The first interval fire is immediate; consume it so ticks
            // land one full period apart from start().
            ticker.tick().await;

            loop {
                tokio::select! {
                    // Cancellation wins when a tick deadline has elapsed at
                    // the same moment, so no callback fires after stop().
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let outcome = {
                            let mut run = inner.run.lock();
                            run.tick().map(|status| (status, run.snapshot()))
                        };
                        match outcome {
                            Ok((status, snapshot)) => {
                                // Invoke outside the lock so a callback may
                                // itself subscribe.
                                let subscribers: Vec<Subscriber> =
                                    inner.subscribers.lock().clone();
                                for subscriber in &subscribers {
                                    subscriber(&snapshot);
                                }
                                if status.is_terminal() {
                                    break;
                                }
                            }
                            Err(e) => {
                                error!("tick aborted run: {e:#}");
                                break;
                            }
                        }
                    }
                }
            }

            // Re-arm start() unless a newer scheduler already took over.
            let mut scheduler = inner.scheduler.lock();
            if scheduler.generation == generation {
                scheduler.token = None;
            }
        });
    }

    /// Halts ticking, leaving the last snapshot intact. Idempotent; safe to
    /// pair with a later `start()`.
    pub fn stop(&self) {
        if let Some(token) = self.inner.scheduler.lock().token.take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.scheduler.lock().token.is_some()
    }

    /// Registers a callback invoked once per tick with the fresh snapshot.
    /// Safe to call from inside another callback.
    pub fn subscribe(&self, callback: impl Fn(&RunSnapshot) + Send + Sync + 'static) {
        self.inner.subscribers.lock().push(Arc::new(callback));
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.run.lock().snapshot()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.inner.run.lock().metrics().clone()
    }

    pub fn status(&self) -> RunStatus {
        self.inner.run.lock().status()
    }

    pub fn config(&self) -> SimConfig {
        self.inner.run.lock().config().clone()
    }
}

impl Drop for RunHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn quick_config() -> SimConfig {
        SimConfig::default().with_seed(1)
    }

    #[test]
    fn run_reaches_complete_and_accounts_all_data() {
        let mut run = Run::new(quick_config().with_volume(50.0).with_parallelism(2)).unwrap();
        let mut status = RunStatus::Idle;
        for _ in 0..run.config().max_ticks {
            status = run.tick().unwrap();
            if status.is_terminal() {
                break;
            }
        }
        assert_eq!(status, RunStatus::Complete);
        assert_eq!(run.data_processed(), 50.0);
        let snapshot = run.snapshot();
        for node in &snapshot.nodes {
            assert_eq!(node.state, NodeState::Complete, "{:?}", node.kind);
        }
    }

    #[test]
    fn tick_after_terminal_is_a_no_op() {
        let mut run = Run::new(quick_config()).unwrap();
        while !run.tick().unwrap().is_terminal() {}
        let tick = run.snapshot().tick;
        assert_eq!(run.tick().unwrap(), RunStatus::Complete);
        assert_eq!(run.snapshot().tick, tick);
    }

    #[test]
    fn loads_stay_in_clamp_range_throughout() {
        let mut run = Run::new(quick_config().with_volume(200.0)).unwrap();
        while !run.tick().unwrap().is_terminal() {
            for node in run.snapshot().nodes {
                if node.state == NodeState::Processing {
                    let floor = run.config().tuning.load_floor;
                    let ceiling = run.config().tuning.load_ceiling;
                    assert!((floor..=ceiling).contains(&node.load));
                }
            }
        }
    }

    #[test]
    fn same_seed_replays_identical_history() {
        let history = |seed: u64| {
            let mut run = Run::new(SimConfig::default().with_seed(seed)).unwrap();
            while !run.tick().unwrap().is_terminal() {}
            run.metrics()
                .history()
                .iter()
                .map(|s| (s.tick, s.throughput, s.latency, s.system_load))
                .collect::<Vec<_>>()
        };
        assert_eq!(history(99), history(99));
    }

    #[test]
    fn reset_replays_from_scratch() {
        let mut run = Run::new(quick_config()).unwrap();
        while !run.tick().unwrap().is_terminal() {}
        let first = run.snapshot().tick;
        run.reset();
        assert_eq!(run.status(), RunStatus::Idle);
        assert_eq!(run.snapshot().tick, 0);
        while !run.tick().unwrap().is_terminal() {}
        assert_eq!(run.snapshot().tick, first);
    }

    #[test]
    fn analytics_stage_runs_for_predictive_archetype() {
        let config = SimConfig {
            archetype: Archetype::PredictiveAnalytics,
            ..quick_config()
        };
        let mut run = Run::new(config).unwrap();
        while !run.tick().unwrap().is_terminal() {}
        let snapshot = run.snapshot();
        assert!(
            snapshot
                .nodes
                .iter()
                .any(|n| n.kind == NodeKind::Analytics && n.state == NodeState::Complete)
        );
        assert!(
            snapshot
                .logs
                .iter()
                .any(|l| l.message.contains("Models trained"))
        );
    }
}
