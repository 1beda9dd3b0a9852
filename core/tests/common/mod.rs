#![allow(dead_code)]

use churnsim_core::*;

pub struct TestHarness {
    pub topology: TopologySpec,
    pub scenario: FlowScenario,
    pub config: SimConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::new_with_seed(42)
    }

    pub fn new_with_seed(seed: u64) -> Self {
        Self {
            topology: TopologySpec::default(),
            scenario: FlowScenario::default(),
            config: SimConfig {
                horizon: 100.0,
                random_flows: 0,
                ..Default::default()
            }
            .with_seed(seed),
        }
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.add_node_with_buffer(id, None);
    }

    pub fn add_node_with_buffer(&mut self, id: NodeId, buffer_size: Option<u64>) {
        self.topology.nodes.push(NodeSpec { id, buffer_size });
    }

    /// Link with ample capacity and no jitter; delay in seconds.
    pub fn connect(&mut self, id: LinkId, a: NodeId, b: NodeId, delay: f64) {
        self.connect_with(id, a, b, 1e9, delay, 0.0);
    }

    pub fn connect_with(&mut self, id: LinkId, a: NodeId, b: NodeId, capacity: f64, delay: f64, jitter: f64) {
        self.topology.links.push(LinkSpec {
            id,
            node1: a,
            node2: b,
            capacity,
            delay,
            jitter,
        });
    }

    /// Nodes `1..=n` in a chain, every hop with the same delay.
    pub fn line(&mut self, n: NodeId, delay: f64) {
        for id in 1..=n {
            self.add_node(id);
        }
        for id in 1..n {
            self.connect(id, id, id + 1, delay);
        }
    }

    pub fn add_flow(&mut self, id: FlowId, size: u64, src: NodeId, dst: NodeId, start: f64) {
        self.scenario = std::mem::take(&mut self.scenario).flow(id, size, src, dst, start);
    }

    pub fn build(&self) -> Simulation<MetricsCollector> {
        self.build_with(MetricsCollector::default())
    }

    pub fn build_with<S: ObservationSink>(&self, sink: S) -> Simulation<S> {
        let mut sim = Simulation::new(self.config.clone(), &self.topology, sink).unwrap();
        sim.add_flows(&self.scenario).unwrap();
        sim
    }
}

/// Sink that keeps every callback in order.
#[derive(Default)]
pub struct Recorder {
    pub delivered: Vec<(SimTime, PacketId)>,
    pub resolved: Vec<(SimTime, FlowId, FlowStatus)>,
    pub samples: Vec<NetworkSnapshot>,
}

impl ObservationSink for Recorder {
    fn on_packet_delivered(&mut self, now: SimTime, packet: &Packet) {
        self.delivered.push((now, packet.id));
    }

    fn on_flow_resolved(&mut self, now: SimTime, flow: &Flow) {
        self.resolved.push((now, flow.id, flow.status));
    }

    fn on_sample(&mut self, _now: SimTime, snapshot: &NetworkSnapshot) {
        self.samples.push(snapshot.clone());
    }
}

pub fn assert_invariants<S: ObservationSink>(sim: &Simulation<S>) {
    for link in sim.topology().links() {
        assert!(
            link.load <= link.capacity,
            "link {} over capacity: {}/{}",
            link.id,
            link.load,
            link.capacity
        );
    }
    for node in sim.topology().nodes() {
        assert!(node.is_consistent(), "node {} buffer accounting broken", node.id);
    }
    let c = sim.counters();
    assert!(c.delivered + c.lost <= c.injected);
    assert_eq!(c.losses.values().sum::<u64>(), c.lost);
}

pub fn packet(flow: FlowId, seq: usize) -> PacketRef {
    PacketRef { flow, seq }
}
