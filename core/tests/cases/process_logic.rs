use std::collections::BTreeSet;

use crate::common::{assert_invariants, packet, Recorder, TestHarness};
use churnsim_core::*;

fn churn_harness() -> TestHarness {
    let mut h = TestHarness::new_with_seed(7);
    for id in 1..=5 {
        h.add_node_with_buffer(id, Some(6000));
    }
    h.connect_with(1, 1, 2, 4000.0, 0.05, 0.01);
    h.connect_with(2, 2, 3, 4000.0, 0.05, 0.01);
    h.connect_with(3, 3, 4, 4000.0, 0.05, 0.01);
    h.connect_with(4, 4, 5, 4000.0, 0.05, 0.01);
    h.connect_with(5, 1, 5, 4000.0, 0.2, 0.0);
    h.connect_with(6, 2, 4, 4000.0, 0.1, 0.0);
    h.config.horizon = 10.0;
    h.config.failure_rate = 1.0;
    for (id, (src, dst)) in [(1, 5), (2, 3), (5, 1), (4, 2), (3, 5), (1, 4)].into_iter().enumerate() {
        h.add_flow(id as FlowId + 1, 15_000, src, dst, id as f64 * 0.7);
    }
    h
}

#[test]
fn test_invariants_hold_after_every_batch() {
    let mut sim = churn_harness().build();
    sim.start();
    let mut batches = 0;
    while sim.step() {
        assert_invariants(&sim);
        batches += 1;
    }
    assert!(batches > 0);
    assert!(sim.summary().end_time <= 10.0);
}

#[test]
fn test_flows_resolve_exactly_once() {
    let mut sim = churn_harness().build_with(Recorder::default());
    let summary = sim.run();

    let mut seen = BTreeSet::new();
    for (_, id, status) in &sim.sink().resolved {
        assert!(seen.insert(*id), "flow {} resolved twice", id);
        assert!(status.is_resolved());
        assert_eq!(sim.flow(*id).unwrap().status, *status);
    }
    assert_eq!(seen.len(), summary.flows_completed + summary.flows_failed);
    for flow in sim.flows() {
        if flow.status.is_resolved() {
            assert!(flow.packets.iter().all(|p| p.is_terminal()));
            assert_eq!(flow.status == FlowStatus::Completed, flow.delivered_count() > 0);
        }
    }
    assert_eq!(sim.sink().delivered.len() as u64, summary.delivered);
}

#[test]
fn test_no_route_fails_flow() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.add_node(3);
    h.connect(1, 1, 2, 0.1);
    h.add_flow(1, 4500, 1, 3, 2.0);
    let mut sim = h.build_with(Recorder::default());
    let summary = sim.run();

    assert_eq!(summary.losses.get(&LossReason::NoRoute), Some(&3));
    assert_eq!(summary.flows_failed, 1);
    assert_eq!(sim.sink().resolved, vec![(secs(2.0), 1, FlowStatus::Failed)]);
    assert_eq!(sim.flow(1).unwrap().resolved_at, Some(secs(2.0)));
}

#[test]
fn test_buffer_overflow_drops_packet() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node_with_buffer(2, Some(1000));
    h.add_node(3);
    h.connect(1, 1, 2, 0.1);
    h.connect(2, 2, 3, 0.1);
    h.add_flow(1, 1500, 1, 3, 0.0);
    let mut sim = h.build();
    let summary = sim.run();

    assert_eq!(
        sim.packet(packet(1, 0)).unwrap().status,
        PacketStatus::Lost(LossReason::BufferOverflow)
    );
    assert_eq!(summary.losses.get(&LossReason::BufferOverflow), Some(&1));
    let node = sim.topology().get_node(2).unwrap();
    assert_eq!(node.overflows, 1);
    assert_eq!(node.occupancy(), 0);
}

#[test]
fn test_sampling_feeds_the_sink() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.config.horizon = 5.0;
    h.config.sample_interval = Some(1.0);
    h.add_flow(1, 1500, 1, 2, 0.0);
    let mut sim = h.build_with(Recorder::default());
    sim.run();

    let times: Vec<SimTime> = sim.sink().samples.iter().map(|s| s.time).collect();
    assert_eq!(times, (1..=5).map(|t| secs(t as f64)).collect::<Vec<_>>());
    let last = sim.sink().samples.last().unwrap();
    assert_eq!(last.delivered, 1);
    assert_eq!(last.resolved_flows, 1);
    assert_eq!(last.state.nodes.len(), 2);
}

#[test]
fn test_retransmit_lost_packet() {
    let mut h = TestHarness::new();
    h.add_node(1);
    h.add_node(2);
    h.connect_with(1, 1, 2, 1000.0, 0.1, 0.0);
    h.add_flow(1, 500, 1, 2, 0.0);
    h.add_flow(2, 600, 1, 2, 0.0);
    let mut sim = h.build();
    sim.run();

    assert!(matches!(
        sim.retransmit(packet(1, 0)),
        Err(SimError::NotRetransmittable(_))
    ));
    assert!(matches!(sim.retransmit(packet(9, 0)), Err(SimError::UnknownFlow(9))));

    // When: the link is idle again, the copy goes through
    let replay = sim.retransmit(packet(2, 0)).unwrap();
    assert_eq!(replay, packet(2, 1));
    let summary = sim.run();

    let original = sim.packet(packet(2, 0)).unwrap();
    let copy = sim.packet(replay).unwrap();
    assert_eq!(original.status, PacketStatus::Lost(LossReason::LinkSaturated));
    assert_eq!(copy.status, PacketStatus::Delivered);
    assert_eq!(copy.retransmit_of, Some(original.id));
    assert_eq!(copy.end_to_end_delay(), Some(secs(0.1)));
    assert_eq!(summary.delivered, 2);
    assert_eq!(sim.flow(2).unwrap().status, FlowStatus::Failed);
}

#[test]
fn test_metrics_collector_measures_flows() {
    let mut h = TestHarness::new();
    h.line(2, 0.1);
    h.add_flow(1, 3000, 1, 2, 0.0);
    let mut sim = h.build();
    sim.run();

    let metrics = sim.sink();
    assert_eq!(metrics.delivered(), 2);
    let m = metrics.flow(1).unwrap();
    assert!((m.delay - 0.1).abs() < 1e-9);
    assert_eq!(m.packet_loss_rate, 0.0);
    assert_eq!(m.jitter, 0.0);
    assert!((m.throughput - 24_000.0 / 0.1).abs() < 1e-6);
    let p99 = metrics.delay_percentile(99.0).unwrap();
    assert!(p99.abs_diff(secs(0.1)) <= 100, "p99={}", p99);
}

#[test]
fn test_generated_flows_fill_empty_scenario() {
    let mut h = TestHarness::new();
    h.line(3, 0.01);
    h.config.horizon = 1.0;
    h.config.random_flows = 4;
    h.config.packet_interval = 0.05;
    let mut sim = h.build();
    sim.start();

    let flows: Vec<_> = sim.flows().collect();
    assert_eq!(flows.len(), 4);
    assert!(flows.iter().all(|f| f.src != f.dst && f.start_time < secs(1.0)));
    let summary = sim.run();
    assert_eq!(summary.flows_completed + summary.flows_failed + summary.flows_unresolved, 4);
}
