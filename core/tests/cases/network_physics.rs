use crate::common::{assert_invariants, packet, TestHarness};
use churnsim_core::*;

#[test]
fn test_two_node_delivery_time() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.add_flow(1, 1500, 1, 2, 0.0);
    let mut sim = h.build();
    let summary = sim.run();

    // Given: one packet over a 100ms link
    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.status, PacketStatus::Delivered);
    assert_eq!(p.sent_at, Some(0));
    assert_eq!(p.arrived_at, Some(secs(0.1)));
    assert_eq!(p.end_to_end_delay(), Some(secs(0.1)));

    assert_eq!(summary.delivered, 1);
    assert_eq!(summary.lost, 0);
    assert_eq!(summary.flows_completed, 1);
    assert_eq!(sim.flow(1).unwrap().status, FlowStatus::Completed);
    assert_eq!(sim.topology().get_link(1).unwrap().load, 0, "load must be released on arrival");
}

#[test]
fn test_capacity_rejects_oversubscription() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.connect_with(1, 1, 2, 1000.0, 0.1, 0.0);
    // Given: 500 bytes in flight, then a 600 byte packet on a 1000 byte link
    h.add_flow(1, 500, 1, 2, 0.0);
    h.add_flow(2, 600, 1, 2, 0.0);
    let mut sim = h.build();
    let summary = sim.run();

    assert_eq!(sim.packet(packet(1, 0)).unwrap().status, PacketStatus::Delivered);
    assert_eq!(
        sim.packet(packet(2, 0)).unwrap().status,
        PacketStatus::Lost(LossReason::LinkSaturated)
    );
    assert_eq!(summary.losses.get(&LossReason::LinkSaturated), Some(&1));
    assert_eq!(sim.flow(2).unwrap().status, FlowStatus::Failed);

    let link = sim.topology().get_link(1).unwrap();
    assert_eq!(link.load, 0);
    assert_eq!(link.saturated_drops, 1);
    assert_eq!(link.carried, 1);
}

#[test]
fn test_packets_are_paced() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.add_flow(1, 4500, 1, 2, 0.0);
    let mut sim = h.build_with(crate::common::Recorder::default());
    sim.run();

    let arrivals: Vec<SimTime> = sim.sink().delivered.iter().map(|(t, _)| *t).collect();
    assert_eq!(arrivals, vec![secs(0.1), secs(0.101), secs(0.102)]);
}

#[test]
fn test_jitter_stays_within_bounds() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.connect_with(1, 1, 2, 1e9, 0.1, 0.02);
    h.add_flow(1, 15_000, 1, 2, 0.0);
    let mut sim = h.build();
    sim.run();

    let flow = sim.flow(1).unwrap();
    assert_eq!(flow.delivered_count(), 10);
    for p in flow.delivered() {
        let delay = p.end_to_end_delay().unwrap();
        assert!(
            (secs(0.08)..=secs(0.12)).contains(&delay),
            "delay {} outside jitter window",
            delay
        );
    }
}

#[test]
fn test_multi_hop_latency_adds_up() {
    let mut h = TestHarness::new();
    h.line(3, 0.1);
    h.add_flow(1, 1500, 1, 3, 1.0);
    let mut sim = h.build();
    sim.run();

    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.route, vec![1, 2, 3]);
    assert_eq!(p.injected_at, Some(secs(1.0)));
    assert_eq!(p.arrived_at, Some(secs(1.2)));
    assert_invariants(&sim);
}

#[test]
fn test_parallel_link_takes_over() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.connect(1, 1, 2, 0.5);
    h.connect(2, 1, 2, 0.1);
    h.add_flow(1, 1500, 1, 2, 0.0);
    let mut sim = h.build();

    // When: the lower-id link is down, the parallel one carries the packet
    assert!(sim.fail(FailureTarget::Link(1), None));
    sim.run();

    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.status, PacketStatus::Delivered);
    assert_eq!(p.arrived_at, Some(secs(0.1)));
    assert_eq!(sim.topology().get_link(2).unwrap().carried, 1);
    assert_eq!(sim.topology().get_link(1).unwrap().carried, 0);
}

#[test]
fn test_parallel_links_use_cheapest() {
    let mut h = TestHarness::new();
    for id in 1..=3 {
        h.add_node(id);
    }
    h.connect(1, 1, 2, 5.0);
    h.connect(2, 1, 2, 0.01);
    h.connect(3, 2, 3, 0.01);
    h.connect(4, 1, 3, 1.0);
    h.add_flow(1, 1500, 1, 3, 0.0);
    let mut sim = h.build();
    sim.run();

    // Then: the packet rides the fast parallel link routing weighed
    let p = sim.packet(packet(1, 0)).unwrap();
    assert_eq!(p.route, vec![1, 2, 3]);
    assert_eq!(p.arrived_at, Some(secs(0.02)));
    assert_eq!(sim.topology().get_link(1).unwrap().carried, 0);
    assert_eq!(sim.topology().get_link(2).unwrap().carried, 1);
}

#[test]
fn test_parallel_link_absorbs_overflow() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.connect_with(1, 1, 2, 1000.0, 0.1, 0.0);
    h.connect_with(2, 1, 2, 1000.0, 0.1, 0.0);
    h.add_flow(1, 500, 1, 2, 0.0);
    h.add_flow(2, 600, 1, 2, 0.0);
    let mut sim = h.build();
    let summary = sim.run();

    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.lost, 0);
    for id in [1, 2] {
        let link = sim.topology().get_link(id).unwrap();
        assert_eq!(link.carried, 1);
        assert_eq!(link.saturated_drops, 0);
        assert_eq!(link.load, 0);
    }
}
