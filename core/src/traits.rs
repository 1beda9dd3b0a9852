use serde::{Deserialize, Serialize};

use crate::components::flow::{Flow, Packet};
use crate::routing::{shortest_path, LinkView, NetworkState, WeightTable};
use crate::simulation::NetworkSnapshot;
use crate::{as_secs, SimTime};

pub type NodeId = u32;
pub type LinkId = u32;
pub type FlowId = u32;
pub type PacketId = u64;

/// Operational state shared by nodes and links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Failed,
}

impl Status {
    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

/// Consumer of everything the simulation reports.
///
/// The core never stores metrics itself; it hands each delivered packet,
/// each resolved flow and (optionally) periodic snapshots to the sink.
pub trait ObservationSink {
    fn on_packet_delivered(&mut self, _now: SimTime, _packet: &Packet) {}

    /// Called exactly once per flow, after every packet is delivered or lost.
    fn on_flow_resolved(&mut self, now: SimTime, flow: &Flow);

    fn on_sample(&mut self, _now: SimTime, _snapshot: &NetworkSnapshot) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservationSink for NoopSink {
    fn on_flow_resolved(&mut self, _now: SimTime, _flow: &Flow) {}
}

/// Route and weight computation over a read view of the network.
pub trait RoutingStrategy {
    fn name(&self) -> &str;

    /// Cost of a single link. Also ranks parallel links when a packet
    /// leaves a node.
    fn link_cost(&self, link: &LinkView) -> f64 {
        as_secs(link.delay) + 1.0 / link.capacity as f64
    }

    /// Per-node neighbor weights over usable links only.
    fn compute_weights(&self, state: &NetworkState) -> WeightTable {
        state.weigh(|l| self.link_cost(l))
    }

    /// Ordered node sequence from `src` to `dst`, or `None` when no route
    /// exists. `weights` is the table last produced by `compute_weights`.
    fn compute_route(
        &self,
        src: NodeId,
        dst: NodeId,
        _state: &NetworkState,
        weights: &WeightTable,
    ) -> Option<Vec<NodeId>> {
        shortest_path(weights, src, dst)
    }
}
