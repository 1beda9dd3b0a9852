pub mod analytics;
pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod failure;
pub mod network;
pub mod pipeline;
pub mod routing;
pub mod scenario;
pub mod simulation;
pub mod topology;
pub mod traits;

pub use analytics::{FlowMetric, MetricsCollector, NetworkMetric};
pub use components::flow::{Flow, FlowStatus, LossReason, Packet, PacketRef, PacketStatus, ServiceClass};
pub use components::node::{Node, QueuedPacket};
pub use config::SimConfig;
pub use engine::{Event, Scheduler};
pub use error::{ConfigError, ConfigWarning, ScenarioError, ScheduleError, SimError, TopologyError};
pub use failure::{DurationDistribution, FailureController, FailureEvent, FailureTarget, MAX_PLANNED_FAILURES};
pub use network::{canonical_key, Link};
pub use routing::{LinkView, NetworkState, RoutingAlgorithm, Router, WeightTable};
pub use scenario::{FlowScenario, FlowSpec};
pub use simulation::{NetworkSnapshot, PacketCounters, RunSummary, SimAction, Simulation};
pub use topology::{LinkSpec, NodeSpec, TopologySpec, TopologyStore};
pub use traits::{FlowId, LinkId, NodeId, NoopSink, ObservationSink, PacketId, RoutingStrategy, Status};

/// Simulated time in ticks (Microseconds)
pub type SimTime = u64;

pub const TICKS_PER_SECOND: u64 = 1_000_000;

/// Defaults mirrored by `SimConfig`
pub const DEFAULT_PACKET_SIZE: u32 = 1_500; // bytes
pub const DEFAULT_BUFFER_SIZE: u64 = 1_000_000; // bytes

/// Converts seconds to ticks. Negative and NaN inputs clamp to zero.
pub fn secs(seconds: f64) -> SimTime {
    if seconds.is_nan() || seconds <= 0.0 {
        return 0;
    }
    (seconds * TICKS_PER_SECOND as f64).round() as SimTime
}

pub fn as_secs(time: SimTime) -> f64 {
    time as f64 / TICKS_PER_SECOND as f64
}
