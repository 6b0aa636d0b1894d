pub mod engine;
pub mod failure;
pub mod formulas;
pub mod history;
pub mod metrics;
pub mod node;

pub use engine::{Run, RunHandle, RunSnapshot, RunStatus, SimConfig, create_run};
pub use failure::FailureInjector;
pub use formulas::{LoadProfile, ProfileRegistry};
pub use metrics::MetricsCollector;
pub use node::{Node, NodeRegistry};

pub mod prelude {
    pub use crate::engine::{
        Archetype, Mode, Run, RunHandle, RunSnapshot, RunStatus, SimConfig, Tuning, create_run,
    };
    pub use crate::formulas::{LoadProfile, ProfileRegistry};
    pub use crate::history::{LogEntry, Severity};
    pub use crate::metrics::{MetricSnapshot, MetricsCollector};
    pub use crate::node::{Node, NodeKind, NodeRegistry, NodeState};
}
