use thiserror::Error;

use crate::traits::{FlowId, LinkId, NodeId, PacketId};
use crate::SimTime;

/// Structural problems in a topology description. Fatal at load time.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("duplicate link id {0}")]
    DuplicateLink(LinkId),
    #[error("link {link} references unknown node {node}")]
    UnknownEndpoint { link: LinkId, node: NodeId },
    #[error("link {0} connects a node to itself")]
    SelfLoop(LinkId),
    #[error("link {link} has invalid {field}: {value}")]
    InvalidLink {
        link: LinkId,
        field: &'static str,
        value: f64,
    },
    #[error("malformed topology description: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Structural problems in a flow scenario. Fatal at load time.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("duplicate flow id {0}")]
    DuplicateFlow(FlowId),
    #[error("flow {flow} references unknown node {node}")]
    UnknownNode { flow: FlowId, node: NodeId },
    #[error("flow {0} has identical source and destination")]
    SameEndpoints(FlowId),
    #[error("flow {0} carries no bytes")]
    EmptyFlow(FlowId),
    #[error("flow {flow} has invalid start time {value}")]
    InvalidStart { flow: FlowId, value: f64 },
    #[error("malformed flow scenario: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown routing algorithm '{0}'")]
    UnknownRoutingAlgorithm(String),
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: f64 },
    #[error("packet size must be positive")]
    ZeroPacketSize,
    #[error("failure_rate * horizon = {planned} exceeds {limit} planned failures")]
    TooManyFailures { planned: f64, limit: usize },
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Soft configuration problems: the run proceeds with a default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigWarning {
    #[error("unknown failure duration distribution '{0}', falling back to uniform(0, 100)")]
    UnknownDistribution(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("cannot schedule at {time}, current time is {now}")]
    InPast { time: SimTime, now: SimTime },
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("unknown flow {0}")]
    UnknownFlow(FlowId),
    #[error("unknown packet {seq} of flow {flow}")]
    UnknownPacket { flow: FlowId, seq: usize },
    #[error("forward requested at node {0} with an empty buffer")]
    EmptyBuffer(NodeId),
    #[error("unknown failure event #{0}")]
    UnknownFailureEvent(usize),
    #[error("packet {0} is not lost and cannot be retransmitted")]
    NotRetransmittable(PacketId),
}
