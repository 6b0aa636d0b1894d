use crate::engine::config::Archetype;
use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Pipeline stage roles, in topological order. Per-kind numbers live here
/// as lookup tables rather than branching scattered through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Source,
    Extraction,
    Transformation,
    Analytics,
    Warehouse,
}

impl NodeKind {
    pub const ALL: [NodeKind; 5] = [
        NodeKind::Source,
        NodeKind::Extraction,
        NodeKind::Transformation,
        NodeKind::Analytics,
        NodeKind::Warehouse,
    ];

    pub const fn id(&self) -> &'static str {
        match self {
            NodeKind::Source => "source",
            NodeKind::Extraction => "extraction",
            NodeKind::Transformation => "transformation",
            NodeKind::Analytics => "analytics",
            NodeKind::Warehouse => "warehouse",
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            NodeKind::Source => "Data Source",
            NodeKind::Extraction => "Extraction Service",
            NodeKind::Transformation => "Transformation Service",
            NodeKind::Analytics => "Analytics Engine",
            NodeKind::Warehouse => "Data Warehouse",
        }
    }

    /// Share of the configured data volume this stage is assigned as load.
    pub const fn load_share(&self) -> f64 {
        match self {
            NodeKind::Source => 1.0,
            NodeKind::Extraction => 0.9,
            NodeKind::Transformation => 0.7,
            NodeKind::Analytics => 0.6,
            NodeKind::Warehouse => 0.5,
        }
    }

    /// Cumulative fraction of the data volume counted as processed once
    /// this stage completes. The warehouse always lands on 1.0 so a full
    /// run accounts for exactly the configured volume.
    pub const fn processed_fraction(&self) -> f64 {
        match self {
            NodeKind::Source => 0.2,
            NodeKind::Extraction => 0.4,
            NodeKind::Transformation => 0.7,
            NodeKind::Analytics => 0.9,
            NodeKind::Warehouse => 1.0,
        }
    }

    /// The analytics stage only takes part in the analytics archetypes.
    pub fn participates(&self, archetype: Archetype) -> bool {
        match self {
            NodeKind::Analytics => matches!(
                archetype,
                Archetype::RealtimeAnalytics | Archetype::PredictiveAnalytics
            ),
            _ => true,
        }
    }

    pub const fn start_message(&self) -> &'static str {
        match self {
            NodeKind::Source => "Beginning data ingestion",
            NodeKind::Extraction => "Extracting data from source systems...",
            NodeKind::Transformation => "Transforming and normalizing data...",
            NodeKind::Analytics => "Running analytics algorithms...",
            NodeKind::Warehouse => "Loading processed data to warehouse...",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Idle,
    Processing,
    Complete,
    Failed,
}

impl NodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeState::Complete | NodeState::Failed)
    }
}

/// One simulated stage. `progress` is 0-100, `load` is assigned workload
/// units, `health` is 0-100 and tracks sustained system pressure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub state: NodeState,
    pub load: f64,
    pub progress: f64,
    pub health: f64,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            id: kind.id().to_string(),
            kind,
            state: NodeState::Idle,
            load: 0.0,
            progress: 0.0,
            health: 100.0,
        }
    }
}

/// Ordered registry of the stages participating in one run. Mutated only by
/// the run's tick handler; everyone else gets cloned snapshots.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new(archetype: Archetype) -> Self {
        let nodes = NodeKind::ALL
            .iter()
            .filter(|kind| kind.participates(archetype))
            .map(|kind| Node::new(*kind))
            .collect();
        Self { nodes }
    }

    /// Puts every node back to IDLE with zero load and progress.
    pub fn reset(&mut self) {
        for node in &mut self.nodes {
            node.state = NodeState::Idle;
            node.load = 0.0;
            node.progress = 0.0;
            node.health = 100.0;
        }
    }

    /// Applies a state change after validating it is reachable. An invalid
    /// transition or unknown id is a contract violation, surfaced as a hard
    /// error rather than a simulated outcome.
    pub fn transition(
        &mut self,
        id: &str,
        new_state: NodeState,
        load: f64,
        progress: f64,
    ) -> Result<()> {
        let node = match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => node,
            None => bail!("unknown node id: {id}"),
        };

        let allowed = matches!(
            (node.state, new_state),
            (NodeState::Idle, NodeState::Processing)
                | (NodeState::Processing, NodeState::Processing)
                | (NodeState::Processing, NodeState::Complete)
                | (NodeState::Processing, NodeState::Failed)
                | (NodeState::Failed, NodeState::Processing)
        );
        if !allowed {
            bail!(
                "invalid transition for {}: {:?} -> {:?}",
                id,
                node.state,
                new_state
            );
        }

        // Resuming out of FAILED keeps the progress reached before the
        // failure instead of restarting from zero.
        let progress = if node.state == NodeState::Failed && new_state == NodeState::Processing {
            node.progress
        } else {
            progress
        };

        node.state = new_state;
        node.load = load.max(0.0);
        node.progress = progress.clamp(0.0, 100.0);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immutable copy for the presentation layer.
    pub fn snapshot(&self) -> Vec<Node> {
        self.nodes.clone()
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_terminal())
    }

    pub fn any_failed(&self) -> bool {
        self.nodes.iter().any(|n| n.state == NodeState::Failed)
    }

    /// Average load over nodes that are occupying their executor: actively
    /// processing, or failed and holding the load they carried when they
    /// went down. Idle and completed stages do not drag the average down.
    pub fn avg_active_load(&self) -> f64 {
        let active: Vec<f64> = self
            .nodes
            .iter()
            .filter(|n| matches!(n.state, NodeState::Processing | NodeState::Failed))
            .map(|n| n.load)
            .collect();
        if active.is_empty() {
            0.0
        } else {
            active.iter().sum::<f64>() / active.len() as f64
        }
    }
}
