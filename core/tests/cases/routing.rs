use crate::common::{packet, TestHarness};
use churnsim_core::routing::ShortestPath;
use churnsim_core::*;

/// Direct 1-4 link that is slow, and a fast two-hop detour through 2.
fn shortcut(algorithm: &str) -> Simulation {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.add_node(4);
    h.connect(1, 1, 4, 1.0);
    h.connect(2, 1, 2, 0.01);
    h.connect(3, 2, 4, 0.01);
    h.config.routing_algorithm = algorithm.to_string();
    h.add_flow(1, 1500, 1, 4, 0.0);
    h.build()
}

#[test]
fn test_shortest_path_takes_the_detour() {
    let mut sim = shortcut("dijkstra");
    sim.run();
    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.route, vec![1, 2, 4]);
    assert_eq!(p.arrived_at, Some(secs(0.02)));
}

#[test]
fn test_hop_count_takes_the_direct_link() {
    let mut sim = shortcut("learned-b");
    assert_eq!(sim.router().strategy_name(), "learned-b");
    sim.run();
    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.route, vec![1, 4]);
    assert_eq!(p.arrived_at, Some(secs(1.0)));
}

#[test]
fn test_unknown_algorithm_fails_fast() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.config.routing_algorithm = "ospf".into();
    let result = Simulation::new(h.config.clone(), &h.topology, NoopSink);
    assert!(matches!(
        result,
        Err(SimError::Config(ConfigError::UnknownRoutingAlgorithm(_)))
    ));
}

#[test]
fn test_unknown_distribution_runs_with_warning() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.config.failure_distribution = "gamma".into();
    h.add_flow(1, 1500, 1, 2, 0.0);
    let mut sim = h.build();
    assert_eq!(
        sim.warnings(),
        &[ConfigWarning::UnknownDistribution("gamma".into())]
    );
    assert_eq!(sim.run().delivered, 1);
}

/// Claims every pair is adjacent.
struct Teleport;

impl RoutingStrategy for Teleport {
    fn name(&self) -> &str {
        "teleport"
    }

    fn compute_weights(&self, state: &NetworkState) -> WeightTable {
        ShortestPath.compute_weights(state)
    }

    fn compute_route(
        &self,
        src: NodeId,
        dst: NodeId,
        _state: &NetworkState,
        _weights: &WeightTable,
    ) -> Option<Vec<NodeId>> {
        Some(vec![src, dst])
    }
}

#[test]
fn test_route_without_link_loses_packets() {
    let mut h = TestHarness::new();
    h.line(3, 0.1);
    h.add_flow(1, 3000, 1, 3, 0.0);
    let mut sim = h.build().with_strategy(Box::new(Teleport));
    let summary = sim.run();

    assert_eq!(sim.router().strategy_name(), "teleport");
    assert_eq!(summary.losses.get(&LossReason::NoLink), Some(&2));
    assert_eq!(sim.flow(1).unwrap().status, FlowStatus::Failed);
}
