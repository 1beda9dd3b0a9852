use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::components::flow::{Flow, ServiceClass};
use crate::error::ScenarioError;
use crate::topology::TopologyStore;
use crate::traits::{FlowId, NodeId};
use crate::{secs, SimTime};

pub const MIN_RANDOM_FLOW_BYTES: u64 = 1_000_000;
pub const MAX_RANDOM_FLOW_BYTES: u64 = 100_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSpec {
    pub id: FlowId,
    pub service_type: ServiceClass,
    pub size: u64, // bytes
    pub source: NodeId,
    pub destination: NodeId,
    /// Seconds.
    #[serde(default)]
    pub start_time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowScenario {
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
}

impl FlowScenario {
    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn flow(mut self, id: FlowId, size: u64, source: NodeId, destination: NodeId, start_time: f64) -> Self {
        self.flows.push(FlowSpec {
            id,
            service_type: ServiceClass::Data,
            size,
            source,
            destination,
            start_time,
        });
        self
    }

    /// Turns every description into a pending flow, checking ids and
    /// endpoints against the topology. `taken` holds ids already in use.
    pub fn build(
        &self,
        topology: &TopologyStore,
        taken: &BTreeSet<FlowId>,
        packet_size: u64,
    ) -> Result<Vec<Flow>, ScenarioError> {
        let mut seen = taken.clone();
        let mut flows = Vec::with_capacity(self.flows.len());
        for spec in &self.flows {
            if !seen.insert(spec.id) {
                return Err(ScenarioError::DuplicateFlow(spec.id));
            }
            for node in [spec.source, spec.destination] {
                if topology.get_node(node).is_none() {
                    return Err(ScenarioError::UnknownNode { flow: spec.id, node });
                }
            }
            if spec.source == spec.destination {
                return Err(ScenarioError::SameEndpoints(spec.id));
            }
            if spec.size == 0 {
                return Err(ScenarioError::EmptyFlow(spec.id));
            }
            if !spec.start_time.is_finite() || spec.start_time < 0.0 {
                return Err(ScenarioError::InvalidStart {
                    flow: spec.id,
                    value: spec.start_time,
                });
            }
            flows.push(Flow::new(
                spec.id,
                spec.service_type,
                spec.size,
                spec.source,
                spec.destination,
                secs(spec.start_time),
                packet_size,
            ));
        }
        Ok(flows)
    }
}

/// `count` flows with random class, a size in [1 MB, 100 MB], distinct
/// random endpoints and a start time in [0, horizon). Ids continue after
/// `first_id`. Needs at least two nodes.
pub fn random_flows<R: Rng + ?Sized>(
    topology: &TopologyStore,
    count: usize,
    first_id: FlowId,
    horizon: SimTime,
    packet_size: u64,
    rng: &mut R,
) -> Vec<Flow> {
    let nodes = topology.node_ids();
    if nodes.len() < 2 {
        return Vec::new();
    }
    (0..count)
        .filter_map(|i| {
            let service = *ServiceClass::ALL.choose(&mut *rng)?;
            let size = rng.gen_range(MIN_RANDOM_FLOW_BYTES..=MAX_RANDOM_FLOW_BYTES);
            let mut pair = nodes.choose_multiple(&mut *rng, 2);
            let (src, dst) = (*pair.next()?, *pair.next()?);
            let start = if horizon > 0 { rng.gen_range(0..horizon) } else { 0 };
            let id = first_id.checked_add(i as FlowId)?;
            Some(Flow::new(id, service, size, src, dst, start, packet_size))
        })
        .collect()
}
